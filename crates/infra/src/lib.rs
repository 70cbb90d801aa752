//! Infrastructure layer: datastore, unit of work, order queries, read paths,
//! application services, and the PostgreSQL gateway.

pub mod config;
pub mod error;
pub mod fetch;
pub mod postgres;
pub mod projection;
pub mod query;
pub mod repository;
pub mod seed;
pub mod service;
pub mod store;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use fetch::{FetchStrategy, OrderGraph};
pub use projection::{OrderLineView, OrderSummary, OrderView, SimpleOrderView};
pub use query::{OrderQuery, OrderSearch, Page};
pub use repository::Repository;
pub use service::{ItemService, MemberService, OrderService};
pub use store::{InMemoryDatastore, QueryLog, Session};
