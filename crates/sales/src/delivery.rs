use serde::{Deserialize, Serialize};

use orderdesk_core::{Address, DeliveryId, DomainError, DomainResult, OrderId};
use orderdesk_members::Member;

/// Delivery status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Ready,
    InProgress,
    Delivered,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Ready => "READY",
            DeliveryStatus::InProgress => "IN_PROGRESS",
            DeliveryStatus::Delivered => "DELIVERED",
        }
    }
}

impl core::str::FromStr for DeliveryStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "READY" => Ok(DeliveryStatus::Ready),
            "IN_PROGRESS" => Ok(DeliveryStatus::InProgress),
            "DELIVERED" => Ok(DeliveryStatus::Delivered),
            other => Err(DomainError::validation(format!(
                "unknown delivery status '{other}'"
            ))),
        }
    }
}

/// Delivery owned by exactly one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    id: DeliveryId,
    order_id: Option<OrderId>,
    address: Address,
    status: DeliveryStatus,
}

impl Delivery {
    pub fn new(address: Address) -> Self {
        Self {
            id: DeliveryId::new(),
            order_id: None,
            address,
            status: DeliveryStatus::Ready,
        }
    }

    /// Ship to the member's current address (copied, not shared).
    pub fn to_member(member: &Member) -> DomainResult<Self> {
        let address = member.address().cloned().ok_or_else(|| {
            DomainError::validation(format!("member {} has no address", member.name()))
        })?;
        Ok(Self::new(address))
    }

    /// Rebuild a delivery from persisted columns.
    pub fn restore(
        id: DeliveryId,
        order_id: OrderId,
        address: Address,
        status: DeliveryStatus,
    ) -> Self {
        Self {
            id,
            order_id: Some(order_id),
            address,
            status,
        }
    }

    pub fn id(&self) -> DeliveryId {
        self.id
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn status(&self) -> DeliveryStatus {
        self.status
    }

    pub fn is_delivered(&self) -> bool {
        self.status == DeliveryStatus::Delivered
    }

    pub(crate) fn bind(&mut self, order_id: OrderId) {
        self.order_id = Some(order_id);
    }

    pub(crate) fn advance(&mut self, next: DeliveryStatus) -> DomainResult<()> {
        let allowed = matches!(
            (self.status, next),
            (DeliveryStatus::Ready, DeliveryStatus::InProgress)
                | (DeliveryStatus::InProgress, DeliveryStatus::Delivered)
        );
        if !allowed {
            return Err(DomainError::illegal_state(format!(
                "delivery cannot move from {} to {}",
                self.status.as_str(),
                next.as_str()
            )));
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_member_address() {
        let address = Address::new("Seoul", "1", "1111");
        let member = Member::new("userA", Some(address.clone())).unwrap();
        let delivery = Delivery::to_member(&member).unwrap();
        assert_eq!(delivery.address(), &address);
        assert_eq!(delivery.status(), DeliveryStatus::Ready);
        assert_eq!(delivery.order_id(), None);
    }

    #[test]
    fn member_without_address_cannot_receive() {
        let member = Member::new("userA", None).unwrap();
        assert!(matches!(
            Delivery::to_member(&member),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn status_only_moves_forward() {
        let mut delivery = Delivery::new(Address::new("a", "b", "c"));
        assert!(delivery.advance(DeliveryStatus::Delivered).is_err());
        delivery.advance(DeliveryStatus::InProgress).unwrap();
        delivery.advance(DeliveryStatus::Delivered).unwrap();
        assert!(delivery.advance(DeliveryStatus::Ready).is_err());
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(
            serde_json::to_value(DeliveryStatus::InProgress).unwrap(),
            "IN_PROGRESS"
        );
        assert_eq!(
            "DELIVERED".parse::<DeliveryStatus>().unwrap(),
            DeliveryStatus::Delivered
        );
    }
}
