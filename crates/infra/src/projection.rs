//! Flat read models and the entity→view mapping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orderdesk_core::{Address, DomainError, OrderId};
use orderdesk_sales::OrderStatus;

use crate::fetch::OrderGraph;

/// Row selected column-by-column by the flat projection query.
///
/// Read-only: nothing here can be saved back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub member_name: String,
    pub order_date: DateTime<Utc>,
    pub order_status: OrderStatus,
    pub address: Address,
}

/// Same columns as [`OrderSummary`], mapped from a loaded graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleOrderView {
    pub order_id: OrderId,
    pub member_name: String,
    pub order_date: DateTime<Utc>,
    pub order_status: OrderStatus,
    pub address: Address,
}

impl From<&OrderGraph> for SimpleOrderView {
    fn from(graph: &OrderGraph) -> Self {
        Self {
            order_id: graph.order.id_typed(),
            member_name: graph.member.name().to_string(),
            order_date: graph.order.order_date(),
            order_status: graph.order.status(),
            address: graph.order.delivery().address().clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineView {
    pub item_name: String,
    pub order_price: u64,
    pub count: u32,
}

/// Order with its lines, for callers of the graph-loading strategies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderView {
    pub order_id: OrderId,
    pub member_name: String,
    pub order_date: DateTime<Utc>,
    pub order_status: OrderStatus,
    pub address: Address,
    pub order_items: Vec<OrderLineView>,
    pub total_price: u64,
}

impl TryFrom<&OrderGraph> for OrderView {
    type Error = DomainError;

    fn try_from(graph: &OrderGraph) -> Result<Self, Self::Error> {
        let summary = SimpleOrderView::from(graph);
        Ok(Self {
            order_id: summary.order_id,
            member_name: summary.member_name,
            order_date: summary.order_date,
            order_status: summary.order_status,
            address: summary.address,
            order_items: graph
                .lines()
                .map(|(line, item)| OrderLineView {
                    item_name: item.name().to_string(),
                    order_price: line.order_price(),
                    count: line.count(),
                })
                .collect(),
            total_price: graph.order.total_price()?,
        })
    }
}

impl From<SimpleOrderView> for OrderSummary {
    fn from(view: SimpleOrderView) -> Self {
        Self {
            order_id: view.order_id,
            member_name: view.member_name,
            order_date: view.order_date,
            order_status: view.order_status,
            address: view.address,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn summary_serializes_wire_names() {
        let summary = OrderSummary {
            order_id: OrderId::new(),
            member_name: "userA".to_string(),
            order_date: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            order_status: OrderStatus::Cancelled,
            address: Address::new("Seoul", "1", "1111"),
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["member_name"], "userA");
        assert_eq!(json["order_status"], "CANCELLED");
        assert_eq!(json["address"]["city"], "Seoul");
        assert_eq!(json["order_date"], "2024-01-02T03:04:05Z");
    }
}
