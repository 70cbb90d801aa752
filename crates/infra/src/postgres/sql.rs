//! SQL rendering of order queries.
//!
//! Every value is bound; only column lists and fixed keywords are pushed as
//! text. Rows are ordered by `o.id`, matching the in-memory store.

use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::query::{CollectionFetch, OrderQuery, Plain, Predicate, ToOneFetch, Unpaged};

const ORDER_COLUMNS: &str = "o.id AS o_id, o.member_id AS o_member_id, \
    o.delivery_id AS o_delivery_id, o.order_date AS o_order_date, \
    o.status AS o_status, o.version AS o_version";

const MEMBER_COLUMNS: &str = "m.id AS m_id, m.name AS m_name, m.city AS m_city, \
    m.street AS m_street, m.zipcode AS m_zipcode";

const DELIVERY_COLUMNS: &str = "d.id AS d_id, d.city AS d_city, d.street AS d_street, \
    d.zipcode AS d_zipcode, d.status AS d_status";

const LINE_COLUMNS: &str = "oi.id AS oi_id, oi.order_id AS oi_order_id, \
    oi.item_id AS oi_item_id, oi.order_price AS oi_order_price, oi.count AS oi_count";

const ITEM_COLUMNS: &str = "i.id AS i_id, i.dtype AS i_dtype, i.name AS i_name, \
    i.price AS i_price, i.stock_quantity AS i_stock_quantity, i.version AS i_version, \
    i.author AS i_author, i.isbn AS i_isbn, i.artist AS i_artist, i.etc AS i_etc, \
    i.director AS i_director, i.actor AS i_actor";

const FROM_ORDERS: &str = " FROM orders o JOIN members m ON m.id = o.member_id";
const JOIN_DELIVERY: &str = " JOIN deliveries d ON d.id = o.delivery_id";
const JOIN_LINES: &str =
    " JOIN order_items oi ON oi.order_id = o.id JOIN items i ON i.id = oi.item_id";

/// `%needle%` with LIKE metacharacters escaped.
pub fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn push_where(builder: &mut QueryBuilder<'static, Postgres>, predicates: &[Predicate]) {
    for (n, predicate) in predicates.iter().enumerate() {
        builder.push(if n == 0 { " WHERE " } else { " AND " });
        match predicate {
            Predicate::StatusEq(status) => {
                builder.push("o.status = ").push_bind(status.as_str());
            }
            Predicate::MemberNameContains(name) => {
                builder
                    .push("m.name LIKE ")
                    .push_bind(like_pattern(name))
                    .push(" ESCAPE '\\'");
            }
        }
    }
}

fn push_window(builder: &mut QueryBuilder<'static, Postgres>, offset: usize, limit: usize) {
    builder
        .push(" LIMIT ")
        .push_bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .push(" OFFSET ")
        .push_bind(i64::try_from(offset).unwrap_or(i64::MAX));
}

fn push_in_list(
    builder: &mut QueryBuilder<'static, Postgres>,
    column: &str,
    ids: impl IntoIterator<Item = Uuid>,
) {
    builder.push(" WHERE ").push(column).push(" IN (");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");
}

/// Order rows joined to members for filtering.
pub fn search<P>(query: &OrderQuery<Plain, P>) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT {ORDER_COLUMNS}{FROM_ORDERS}"));
    push_where(&mut builder, query.predicates());
    builder.push(" ORDER BY o.id");
    push_window(&mut builder, query.first_result(), query.max_results());
    builder
}

/// Orders with member and delivery columns in the same row.
pub fn search_fetch_to_one<P>(query: &OrderQuery<ToOneFetch, P>) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!(
        "SELECT {ORDER_COLUMNS}, {MEMBER_COLUMNS}, {DELIVERY_COLUMNS}{FROM_ORDERS}{JOIN_DELIVERY}"
    ));
    push_where(&mut builder, query.predicates());
    builder.push(" ORDER BY o.id");
    push_window(&mut builder, query.first_result(), query.max_results());
    builder
}

/// One row per order line; no LIMIT, the cap is applied after deduplication.
pub fn search_fetch_collection(
    query: &OrderQuery<CollectionFetch, Unpaged>,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!(
        "SELECT {ORDER_COLUMNS}, {MEMBER_COLUMNS}, {DELIVERY_COLUMNS}, {LINE_COLUMNS}, \
         {ITEM_COLUMNS}{FROM_ORDERS}{JOIN_DELIVERY}{JOIN_LINES}"
    ));
    push_where(&mut builder, query.predicates());
    builder.push(" ORDER BY o.id, oi.id");
    builder
}

/// Flat display columns.
pub fn select_summaries<P>(query: &OrderQuery<Plain, P>) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!(
        "SELECT o.id AS order_id, m.name AS member_name, o.order_date AS order_date, \
         o.status AS order_status, d.city AS city, d.street AS street, d.zipcode AS zipcode\
         {FROM_ORDERS}{JOIN_DELIVERY}"
    ));
    push_where(&mut builder, query.predicates());
    builder.push(" ORDER BY o.id");
    push_window(&mut builder, query.first_result(), query.max_results());
    builder
}

/// `order_items WHERE order_id IN (...)`. `order_ids` must not be empty.
pub fn order_items_in(order_ids: impl IntoIterator<Item = Uuid>) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT {LINE_COLUMNS} FROM order_items oi"));
    push_in_list(&mut builder, "oi.order_id", order_ids);
    builder.push(" ORDER BY oi.order_id, oi.id");
    builder
}

/// `items WHERE id IN (...)`. `item_ids` must not be empty.
pub fn items_in(item_ids: impl IntoIterator<Item = Uuid>) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT {ITEM_COLUMNS} FROM items i"));
    push_in_list(&mut builder, "i.id", item_ids);
    builder.push(" ORDER BY i.id");
    builder
}

/// `deliveries WHERE id IN (...)`. `delivery_ids` must not be empty.
pub fn deliveries_in(
    delivery_ids: impl IntoIterator<Item = Uuid>,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT {DELIVERY_COLUMNS} FROM deliveries d"));
    push_in_list(&mut builder, "d.id", delivery_ids);
    builder
}

pub const SELECT_MEMBER: &str = "SELECT m.id AS m_id, m.name AS m_name, m.city AS m_city, \
    m.street AS m_street, m.zipcode AS m_zipcode FROM members m WHERE m.id = $1";

pub const SELECT_ITEM: &str = "SELECT i.id AS i_id, i.dtype AS i_dtype, i.name AS i_name, \
    i.price AS i_price, i.stock_quantity AS i_stock_quantity, i.version AS i_version, \
    i.author AS i_author, i.isbn AS i_isbn, i.artist AS i_artist, i.etc AS i_etc, \
    i.director AS i_director, i.actor AS i_actor FROM items i WHERE i.id = $1";

pub const SELECT_ORDER_FOR_UPDATE: &str = "SELECT o.id AS o_id, o.member_id AS o_member_id, \
    o.delivery_id AS o_delivery_id, o.order_date AS o_order_date, o.status AS o_status, \
    o.version AS o_version FROM orders o WHERE o.id = $1 FOR UPDATE";

pub const SELECT_DELIVERY: &str = "SELECT d.id AS d_id, d.city AS d_city, d.street AS d_street, \
    d.zipcode AS d_zipcode, d.status AS d_status FROM deliveries d WHERE d.id = $1";
