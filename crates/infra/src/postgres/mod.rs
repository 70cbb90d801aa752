//! PostgreSQL gateway for the same order model.
//!
//! Writes use optimistic version columns the same way the in-memory store
//! does: a stale `UPDATE ... WHERE version = $n` touches no row and surfaces
//! as `DomainError::Conflict`. Reads reuse the assembly code in [`crate::fetch`]
//! so both backends return identical graphs for identical data.

pub mod sql;

mod rows;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use orderdesk_core::{AggregateRoot, DeliveryId, DomainError, ItemId, MemberId, OrderId};
use orderdesk_inventory::Item;
use orderdesk_members::Member;
use orderdesk_sales::{Delivery, Order, OrderItem};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::fetch::{self, OrderGraph};
use crate::projection::OrderSummary;
use crate::query::{CollectionFetch, OrderQuery, Plain, ToOneFetch, Unpaged};

/// Schema applied by [`PgOrderStore::apply_schema`].
pub const SCHEMA: &str = include_str!("../../migrations/0001_orderdesk.sql");

const MAX_CONNECTIONS: u32 = 5;

/// Order datastore backed by a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: Arc<PgPool>,
    config: StoreConfig,
}

impl PgOrderStore {
    pub fn new(pool: PgPool, config: StoreConfig) -> Self {
        Self {
            pool: Arc::new(pool),
            config,
        }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, config: StoreConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, config))
    }

    pub fn config(&self) -> StoreConfig {
        self.config
    }

    /// Create the tables if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn apply_schema(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("apply_schema", e))?;
        info!("schema applied");
        Ok(())
    }

    /// Upsert a member.
    ///
    /// With `unique_member_names`, the name check and the write run in one
    /// transaction holding an advisory lock keyed by the name, so concurrent
    /// saves of the same name are serialized and the later one gets `Conflict`.
    #[instrument(skip(self, member), fields(name = member.name()), err)]
    pub async fn save_member(&self, member: &Member) -> StoreResult<MemberId> {
        let mut tx = self.begin().await?;

        if self.config.unique_member_names {
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
                .bind(member.name())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("lock_member_name", e))?;

            let taken: Option<(Uuid,)> =
                sqlx::query_as("SELECT id FROM members WHERE name = $1 AND id <> $2 LIMIT 1")
                    .bind(member.name())
                    .bind(*member.id_typed().as_uuid())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("check_member_name", e))?;
            if taken.is_some() {
                return Err(DomainError::conflict(format!(
                    "member name '{}' is already taken",
                    member.name()
                ))
                .into());
            }
        }

        let address = member.address();
        sqlx::query(
            r#"
            INSERT INTO members (id, name, city, street, zipcode)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                city = EXCLUDED.city,
                street = EXCLUDED.street,
                zipcode = EXCLUDED.zipcode
            "#,
        )
        .bind(*member.id_typed().as_uuid())
        .bind(member.name())
        .bind(address.map(|a| a.city()))
        .bind(address.map(|a| a.street()))
        .bind(address.map(|a| a.zipcode()))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("save_member", e))?;

        commit(tx).await?;
        Ok(member.id_typed())
    }

    pub async fn find_member(&self, member_id: MemberId) -> StoreResult<Option<Member>> {
        let row = sqlx::query(sql::SELECT_MEMBER)
            .bind(*member_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_member", e))?;
        row.as_ref().map(rows::member).transpose()
    }

    /// Insert a new catalog item at version 1.
    #[instrument(skip(self, item), fields(name = item.name()), err)]
    pub async fn insert_item(&self, item: &Item) -> StoreResult<ItemId> {
        let [author, isbn, artist, etc, director, actor] = rows::kind_columns(item.kind());
        sqlx::query(
            r#"
            INSERT INTO items (
                id, dtype, name, price, stock_quantity, version,
                author, isbn, artist, etc, director, actor
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(*item.id_typed().as_uuid())
        .bind(item.kind().dtype())
        .bind(item.name())
        .bind(rows::to_i64(item.price(), "price")?)
        .bind(rows::to_i32(item.stock_quantity(), "stock_quantity")?)
        .bind(rows::to_i64(item.version() + 1, "version")?)
        .bind(author)
        .bind(isbn)
        .bind(artist)
        .bind(etc)
        .bind(director)
        .bind(actor)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_item", e))?;
        Ok(item.id_typed())
    }

    pub async fn find_item(&self, item_id: ItemId) -> StoreResult<Option<Item>> {
        let row = sqlx::query(sql::SELECT_ITEM)
            .bind(*item_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_item", e))?;
        row.as_ref().map(rows::item).transpose()
    }

    /// Write back an edited item; fails with a conflict if `item` is stale.
    #[instrument(skip(self, item), fields(item_id = %item.id_typed()), err)]
    pub async fn update_item(&self, item: &Item) -> StoreResult<()> {
        let mut tx = self.begin().await?;
        write_item(&mut tx, item).await?;
        commit(tx).await
    }

    /// Place one order with several lines, priced at each item's current price.
    #[instrument(skip(self), err)]
    pub async fn place_order(
        &self,
        member_id: MemberId,
        lines: &[(ItemId, u32)],
    ) -> StoreResult<OrderId> {
        let mut tx = self.begin().await?;

        let member_row = sqlx::query(sql::SELECT_MEMBER)
            .bind(*member_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("find_member", e))?
            .ok_or_else(|| DomainError::not_found("member", member_id))?;
        let member = rows::member(&member_row)?;

        let mut items: BTreeMap<ItemId, Item> = BTreeMap::new();
        for (item_id, _) in lines {
            if items.contains_key(item_id) {
                continue;
            }
            let row = sqlx::query(sql::SELECT_ITEM)
                .bind(*item_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("find_item", e))?
                .ok_or_else(|| DomainError::not_found("item", item_id))?;
            items.insert(*item_id, rows::item(&row)?);
        }

        let delivery = Delivery::to_member(&member)?;
        let mut order_items = Vec::with_capacity(lines.len());
        for (item_id, count) in lines {
            let item = items
                .get_mut(item_id)
                .ok_or_else(|| DomainError::not_found("item", item_id))?;
            let price = item.price();
            order_items.push(OrderItem::create(item, price, *count)?);
        }
        let order = Order::create(&member, delivery, order_items)?;

        for item in items.values() {
            write_item(&mut tx, item).await?;
        }
        insert_order(&mut tx, &order).await?;
        commit(tx).await?;

        info!(order_id = %order.id_typed(), member_id = %member_id, lines = lines.len(), "order placed");
        Ok(order.id_typed())
    }

    /// Cancel an order and return its quantities to stock.
    #[instrument(skip(self), err)]
    pub async fn cancel_order(&self, order_id: OrderId) -> StoreResult<()> {
        let mut tx = self.begin().await?;
        let mut order = lock_order(&mut tx, order_id).await?;

        let item_ids = fetch::distinct_item_ids(order.order_items());
        let mut items: BTreeMap<ItemId, Item> = decode_all(
            sql::items_in(item_ids.iter().map(|id| *id.as_uuid()))
                .build()
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("find_items", e))?,
            rows::item,
        )?
        .into_iter()
        .map(|item| (item.id_typed(), item))
        .collect();

        order.cancel(&mut items)?;

        for item in items.values() {
            write_item(&mut tx, item).await?;
        }
        update_order(&mut tx, &order).await?;
        commit(tx).await?;

        info!(order_id = %order_id, "order cancelled");
        Ok(())
    }

    /// Move the delivery from `READY` to `IN_PROGRESS`.
    #[instrument(skip(self), err)]
    pub async fn start_delivery(&self, order_id: OrderId) -> StoreResult<()> {
        self.advance_delivery(order_id, Order::start_delivery).await
    }

    /// Move the delivery from `IN_PROGRESS` to `DELIVERED`.
    #[instrument(skip(self), err)]
    pub async fn complete_delivery(&self, order_id: OrderId) -> StoreResult<()> {
        self.advance_delivery(order_id, Order::complete_delivery).await
    }

    async fn advance_delivery(
        &self,
        order_id: OrderId,
        change: impl FnOnce(&mut Order) -> orderdesk_core::DomainResult<()>,
    ) -> StoreResult<()> {
        let mut tx = self.begin().await?;
        let mut order = lock_order(&mut tx, order_id).await?;
        let previous = order.delivery().status();
        change(&mut order)?;

        let delivery = order.delivery();
        let updated =
            sqlx::query("UPDATE deliveries SET status = $1 WHERE id = $2 AND status = $3")
                .bind(delivery.status().as_str())
                .bind(*delivery.id().as_uuid())
                .bind(previous.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("update_delivery", e))?;
        if updated.rows_affected() == 0 {
            return Err(stale("delivery", delivery.id()));
        }
        update_order(&mut tx, &order).await?;
        commit(tx).await?;

        debug!(order_id = %order_id, status = delivery.status().as_str(), "delivery advanced");
        Ok(())
    }

    /// Search and assemble complete aggregates: one query for the orders,
    /// then one in-list each for deliveries and lines.
    #[instrument(skip(self, query), err)]
    pub async fn find_orders<P>(&self, query: &OrderQuery<Plain, P>) -> StoreResult<Vec<Order>> {
        let order_rows = decode_all(
            sql::search(query)
                .build()
                .fetch_all(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("search_orders", e))?,
            rows::order_row,
        )?;
        if order_rows.is_empty() {
            return Ok(Vec::new());
        }

        let owners: HashMap<DeliveryId, OrderId> = order_rows
            .iter()
            .map(|row| (row.delivery_id, row.id))
            .collect();
        let mut deliveries: HashMap<DeliveryId, Delivery> = HashMap::new();
        for row in sql::deliveries_in(owners.keys().map(|id| *id.as_uuid()))
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_deliveries", e))?
        {
            let delivery_id = rows::delivery_id(&row)?;
            if let Some(order_id) = owners.get(&delivery_id) {
                deliveries.insert(delivery_id, rows::delivery(&row, *order_id)?);
            }
        }

        let lines = self
            .order_items_in(order_rows.iter().map(|row| row.id).collect())
            .await?;
        let mut lines_by_order: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for line in lines {
            if let Some(order_id) = line.order_id() {
                lines_by_order.entry(order_id).or_default().push(line);
            }
        }

        order_rows
            .into_iter()
            .map(|row| {
                let delivery = deliveries
                    .remove(&row.delivery_id)
                    .ok_or_else(|| DomainError::not_found("delivery", row.delivery_id))?;
                Ok(Order::restore(
                    row.id,
                    row.member_id,
                    lines_by_order.remove(&row.id).unwrap_or_default(),
                    delivery,
                    row.order_date,
                    row.status,
                    row.version,
                ))
            })
            .collect()
    }

    /// Join-fetch member and delivery, then batch lines and items.
    #[instrument(skip(self, query), err)]
    pub async fn fetch_with_member_delivery<P>(
        &self,
        query: &OrderQuery<ToOneFetch, P>,
    ) -> StoreResult<Vec<OrderGraph>> {
        let to_one = decode_all(
            sql::search_fetch_to_one(query)
                .build()
                .fetch_all(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("search_fetch_to_one", e))?,
            rows::to_one,
        )?;
        if to_one.is_empty() {
            return Ok(Vec::new());
        }

        let lines = self
            .order_items_in(to_one.iter().map(|row| row.order.id).collect())
            .await?;
        let item_ids = fetch::distinct_item_ids(&lines);
        let mut items = Vec::with_capacity(item_ids.len());
        for chunk in item_ids.chunks(self.config.batch_fetch_size.max(1)) {
            let batch = sql::items_in(chunk.iter().map(|id| *id.as_uuid()))
                .build()
                .fetch_all(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("find_items", e))?;
            items.extend(decode_all(batch, rows::item)?);
        }

        fetch::assemble_batched(to_one, lines, items)
    }

    /// Single joined query, folded back into one graph per order.
    #[instrument(skip(self, query), err)]
    pub async fn fetch_with_items(
        &self,
        query: &OrderQuery<CollectionFetch, Unpaged>,
    ) -> StoreResult<Vec<OrderGraph>> {
        let exploded = decode_all(
            sql::search_fetch_collection(query)
                .build()
                .fetch_all(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("search_fetch_collection", e))?,
            rows::collection,
        )?;
        debug!(rows = exploded.len(), "collection join returned");
        Ok(fetch::dedup_collection(exploded, query.max_results()))
    }

    /// Display columns only.
    #[instrument(skip(self, query), err)]
    pub async fn find_order_summaries<P>(
        &self,
        query: &OrderQuery<Plain, P>,
    ) -> StoreResult<Vec<OrderSummary>> {
        decode_all(
            sql::select_summaries(query)
                .build()
                .fetch_all(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("select_summaries", e))?,
            rows::summary,
        )
    }

    async fn order_items_in(&self, order_ids: Vec<OrderId>) -> StoreResult<Vec<OrderItem>> {
        let mut lines = Vec::new();
        for chunk in order_ids.chunks(self.config.batch_fetch_size.max(1)) {
            let batch = sql::order_items_in(chunk.iter().map(|id| *id.as_uuid()))
                .build()
                .fetch_all(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("find_order_items", e))?;
            lines.extend(decode_all(batch, rows::order_item)?);
        }
        Ok(lines)
    }

    async fn begin(&self) -> StoreResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

async fn commit(tx: Transaction<'static, Postgres>) -> StoreResult<()> {
    tx.commit()
        .await
        .map_err(|e| map_sqlx_error("commit_transaction", e))
}

/// Load an order aggregate with its row locked until `tx` ends.
async fn lock_order(
    tx: &mut Transaction<'static, Postgres>,
    order_id: OrderId,
) -> StoreResult<Order> {
    let order_row = sqlx::query(sql::SELECT_ORDER_FOR_UPDATE)
        .bind(*order_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("find_order", e))?
        .ok_or_else(|| DomainError::not_found("order", order_id))?;
    let row = rows::order_row(&order_row)?;

    let delivery_row = sqlx::query(sql::SELECT_DELIVERY)
        .bind(*row.delivery_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("find_delivery", e))?
        .ok_or_else(|| DomainError::not_found("delivery", row.delivery_id))?;
    let delivery = rows::delivery(&delivery_row, order_id)?;

    let lines = decode_all(
        sql::order_items_in([*order_id.as_uuid()])
            .build()
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("find_order_items", e))?,
        rows::order_item,
    )?;

    Ok(Order::restore(
        row.id,
        row.member_id,
        lines,
        delivery,
        row.order_date,
        row.status,
        row.version,
    ))
}

/// Persist the order status and bump its version.
async fn update_order(tx: &mut Transaction<'static, Postgres>, order: &Order) -> StoreResult<()> {
    let updated = sqlx::query(
        "UPDATE orders SET status = $1, version = version + 1 WHERE id = $2 AND version = $3",
    )
    .bind(order.status().as_str())
    .bind(*order.id_typed().as_uuid())
    .bind(rows::to_i64(order.version(), "version")?)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("update_order", e))?;
    if updated.rows_affected() == 0 {
        return Err(stale("order", order.id_typed()));
    }
    Ok(())
}

async fn write_item(tx: &mut Transaction<'static, Postgres>, item: &Item) -> StoreResult<()> {
    let [author, isbn, artist, etc, director, actor] = rows::kind_columns(item.kind());
    let updated = sqlx::query(
        r#"
        UPDATE items
        SET name = $1, price = $2, stock_quantity = $3,
            author = $4, isbn = $5, artist = $6, etc = $7, director = $8, actor = $9,
            version = version + 1
        WHERE id = $10 AND version = $11
        "#,
    )
    .bind(item.name())
    .bind(rows::to_i64(item.price(), "price")?)
    .bind(rows::to_i32(item.stock_quantity(), "stock_quantity")?)
    .bind(author)
    .bind(isbn)
    .bind(artist)
    .bind(etc)
    .bind(director)
    .bind(actor)
    .bind(*item.id_typed().as_uuid())
    .bind(rows::to_i64(item.version(), "version")?)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("update_item", e))?;
    if updated.rows_affected() == 0 {
        return Err(stale("item", item.id_typed()));
    }
    Ok(())
}

async fn insert_order(tx: &mut Transaction<'static, Postgres>, order: &Order) -> StoreResult<()> {
    let delivery = order.delivery();
    sqlx::query(
        "INSERT INTO deliveries (id, city, street, zipcode, status) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(*delivery.id().as_uuid())
    .bind(delivery.address().city())
    .bind(delivery.address().street())
    .bind(delivery.address().zipcode())
    .bind(delivery.status().as_str())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_delivery", e))?;

    sqlx::query(
        r#"
        INSERT INTO orders (id, member_id, delivery_id, order_date, status, version)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(*order.id_typed().as_uuid())
    .bind(*order.member_id().as_uuid())
    .bind(*delivery.id().as_uuid())
    .bind(order.order_date())
    .bind(order.status().as_str())
    .bind(rows::to_i64(order.version() + 1, "version")?)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_order", e))?;

    for line in order.order_items() {
        sqlx::query(
            r#"
            INSERT INTO order_items (id, order_id, item_id, order_price, count)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(*line.id().as_uuid())
        .bind(*order.id_typed().as_uuid())
        .bind(*line.item_id().as_uuid())
        .bind(rows::to_i64(line.order_price(), "order_price")?)
        .bind(rows::to_i32(line.count(), "count")?)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order_item", e))?;
    }
    Ok(())
}

fn decode_all<T>(
    rows: Vec<PgRow>,
    decode: impl Fn(&PgRow) -> StoreResult<T>,
) -> StoreResult<Vec<T>> {
    rows.iter().map(decode).collect()
}

fn stale(entity: &'static str, id: impl std::fmt::Display) -> StoreError {
    DomainError::conflict(format!("{entity} {id} was modified concurrently")).into()
}

/// Map SQLx errors onto the store error model.
fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("{operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                // unique violation
                Some("23505") => DomainError::conflict(msg).into(),
                // check violation
                Some("23514") => DomainError::validation(msg).into(),
                _ => StoreError::database(operation, db_err.message()),
            }
        }
        sqlx::Error::PoolClosed => StoreError::database(operation, "connection pool closed"),
        other => StoreError::database(operation, other.to_string()),
    }
}
