//! Row decoding for the prefixed column aliases used in `sql`.

use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

use orderdesk_core::{Address, DeliveryId, ItemId, MemberId, OrderId, OrderItemId};
use orderdesk_inventory::{Item, ItemKind};
use orderdesk_members::Member;
use orderdesk_sales::{Delivery, OrderItem};

use crate::error::{StoreError, StoreResult};
use crate::projection::OrderSummary;
use crate::store::{CollectionRow, OrderRow, ToOneRow};

fn get<'r, T>(row: &'r PgRow, column: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::database("decode_row", format!("{column}: {e}")))
}

fn unsigned64(row: &PgRow, column: &str) -> StoreResult<u64> {
    let value: i64 = get(row, column)?;
    u64::try_from(value)
        .map_err(|_| StoreError::database("decode_row", format!("{column} is negative")))
}

fn unsigned32(row: &PgRow, column: &str) -> StoreResult<u32> {
    let value: i32 = get(row, column)?;
    u32::try_from(value)
        .map_err(|_| StoreError::database("decode_row", format!("{column} is negative")))
}

pub(crate) fn to_i64(value: u64, column: &'static str) -> StoreResult<i64> {
    i64::try_from(value)
        .map_err(|_| StoreError::database("encode_row", format!("{column} out of range")))
}

pub(crate) fn to_i32(value: u32, column: &'static str) -> StoreResult<i32> {
    i32::try_from(value)
        .map_err(|_| StoreError::database("encode_row", format!("{column} out of range")))
}

pub(crate) fn order_row(row: &PgRow) -> StoreResult<OrderRow> {
    let status: String = get(row, "o_status")?;
    Ok(OrderRow {
        id: OrderId::from_uuid(get::<Uuid>(row, "o_id")?),
        member_id: MemberId::from_uuid(get::<Uuid>(row, "o_member_id")?),
        delivery_id: DeliveryId::from_uuid(get::<Uuid>(row, "o_delivery_id")?),
        order_date: get(row, "o_order_date")?,
        status: status.parse()?,
        version: unsigned64(row, "o_version")?,
    })
}

pub(crate) fn member(row: &PgRow) -> StoreResult<Member> {
    let city: Option<String> = get(row, "m_city")?;
    let street: Option<String> = get(row, "m_street")?;
    let zipcode: Option<String> = get(row, "m_zipcode")?;
    let address = match (city, street, zipcode) {
        (Some(city), Some(street), Some(zipcode)) => Some(Address::new(city, street, zipcode)),
        _ => None,
    };
    Ok(Member::restore(
        MemberId::from_uuid(get::<Uuid>(row, "m_id")?),
        get(row, "m_name")?,
        address,
    ))
}

pub(crate) fn delivery_id(row: &PgRow) -> StoreResult<DeliveryId> {
    Ok(DeliveryId::from_uuid(get::<Uuid>(row, "d_id")?))
}

pub(crate) fn delivery(row: &PgRow, order_id: OrderId) -> StoreResult<Delivery> {
    let status: String = get(row, "d_status")?;
    Ok(Delivery::restore(
        delivery_id(row)?,
        order_id,
        Address::new(
            get::<String>(row, "d_city")?,
            get::<String>(row, "d_street")?,
            get::<String>(row, "d_zipcode")?,
        ),
        status.parse()?,
    ))
}

pub(crate) fn order_item(row: &PgRow) -> StoreResult<OrderItem> {
    Ok(OrderItem::restore(
        OrderItemId::from_uuid(get::<Uuid>(row, "oi_id")?),
        ItemId::from_uuid(get::<Uuid>(row, "oi_item_id")?),
        OrderId::from_uuid(get::<Uuid>(row, "oi_order_id")?),
        unsigned64(row, "oi_order_price")?,
        unsigned32(row, "oi_count")?,
    ))
}

pub(crate) fn item(row: &PgRow) -> StoreResult<Item> {
    let text = |column: &str| -> StoreResult<String> {
        Ok(get::<Option<String>>(row, column)?.unwrap_or_default())
    };
    let dtype: String = get(row, "i_dtype")?;
    let kind = match dtype.as_str() {
        "Book" => ItemKind::Book {
            author: text("i_author")?,
            isbn: text("i_isbn")?,
        },
        "Album" => ItemKind::Album {
            artist: text("i_artist")?,
            etc: text("i_etc")?,
        },
        "Movie" => ItemKind::Movie {
            director: text("i_director")?,
            actor: text("i_actor")?,
        },
        other => {
            return Err(StoreError::database(
                "decode_row",
                format!("unknown item dtype '{other}'"),
            ));
        }
    };
    Ok(Item::restore(
        ItemId::from_uuid(get::<Uuid>(row, "i_id")?),
        get(row, "i_name")?,
        unsigned64(row, "i_price")?,
        unsigned32(row, "i_stock_quantity")?,
        kind,
        unsigned64(row, "i_version")?,
    ))
}

pub(crate) fn to_one(row: &PgRow) -> StoreResult<ToOneRow> {
    let order = order_row(row)?;
    let delivery = delivery(row, order.id)?;
    Ok(ToOneRow {
        member: member(row)?,
        delivery,
        order,
    })
}

pub(crate) fn collection(row: &PgRow) -> StoreResult<CollectionRow> {
    let ToOneRow {
        order,
        member,
        delivery,
    } = to_one(row)?;
    Ok(CollectionRow {
        order,
        member,
        delivery,
        line: order_item(row)?,
        item: item(row)?,
    })
}

pub(crate) fn summary(row: &PgRow) -> StoreResult<OrderSummary> {
    let status: String = get(row, "order_status")?;
    Ok(OrderSummary {
        order_id: OrderId::from_uuid(get::<Uuid>(row, "order_id")?),
        member_name: get(row, "member_name")?,
        order_date: get(row, "order_date")?,
        order_status: status.parse()?,
        address: Address::new(
            get::<String>(row, "city")?,
            get::<String>(row, "street")?,
            get::<String>(row, "zipcode")?,
        ),
    })
}

/// Variant columns for an insert/update, in `author, isbn, artist, etc,
/// director, actor` order.
pub(crate) fn kind_columns(kind: &ItemKind) -> [Option<&str>; 6] {
    match kind {
        ItemKind::Book { author, isbn } => [Some(author), Some(isbn), None, None, None, None],
        ItemKind::Album { artist, etc } => [None, None, Some(artist), Some(etc), None, None],
        ItemKind::Movie { director, actor } => {
            [None, None, None, None, Some(director), Some(actor)]
        }
    }
}
