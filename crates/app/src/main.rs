//! Seeds the in-memory datastore, runs every fetch strategy over the same
//! search and prints one JSON report per strategy. With `DATABASE_URL` set,
//! the first page of order summaries is also read from PostgreSQL.

use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;

use orderdesk_infra::postgres::PgOrderStore;
use orderdesk_infra::query::{OrderQuery, OrderSearch, Page};
use orderdesk_infra::seed::sample_orders;
use orderdesk_infra::{FetchStrategy, InMemoryDatastore, OrderService, OrderView, StoreConfig};

#[derive(Debug, Serialize)]
struct StrategyReport {
    strategy: FetchStrategy,
    orders: usize,
    round_trips: usize,
    known_worst: bool,
    views: Vec<OrderView>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    orderdesk_observability::init();

    let config = StoreConfig::from_env();
    let store = Arc::new(InMemoryDatastore::new(config));
    let seeded = sample_orders(&store).context("seeding sample orders")?;
    tracing::info!(orders = seeded.orders.len(), "in-memory datastore ready");

    let service = OrderService::new(store.clone());
    let search = OrderSearch::new();
    for strategy in FetchStrategy::ALL {
        store.query_log().clear();
        let views: Vec<OrderView> = match strategy {
            FetchStrategy::Lazy => service
                .fetch_lazy(&search)?
                .iter()
                .map(OrderView::try_from)
                .collect::<Result<_, _>>()?,
            FetchStrategy::JoinToOneBatched => service
                .fetch_with_member_delivery(&search, None)?
                .iter()
                .map(OrderView::try_from)
                .collect::<Result<_, _>>()?,
            FetchStrategy::JoinCollection => service
                .fetch_with_items(&search)?
                .iter()
                .map(OrderView::try_from)
                .collect::<Result<_, _>>()?,
            FetchStrategy::FlatProjection => {
                let summaries = service.find_order_summaries(&search, None)?;
                let report = serde_json::json!({
                    "strategy": strategy,
                    "orders": summaries.len(),
                    "round_trips": store.query_log().round_trips(),
                    "known_worst": strategy.is_known_worst(),
                    "summaries": summaries,
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
                continue;
            }
        };
        let report = StrategyReport {
            strategy,
            orders: views.len(),
            round_trips: store.query_log().round_trips(),
            known_worst: strategy.is_known_worst(),
            views,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if let Ok(url) = std::env::var("DATABASE_URL") {
        let pg = PgOrderStore::connect(&url, config)
            .await
            .context("connecting to DATABASE_URL")?;
        pg.apply_schema().await?;
        let query = OrderQuery::from_search(&search, config.max_search_results)
            .paginate(Page::new(0, 20));
        let summaries = pg.find_order_summaries(&query).await?;
        tracing::info!(orders = summaries.len(), "postgres summaries loaded");
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        tracing::warn!("DATABASE_URL not set; skipping postgres");
    }

    Ok(())
}
