//! Postal address embedded by value into members and deliveries.

use serde::{Deserialize, Serialize};

use crate::value_object::ValueObject;

/// Immutable postal address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    city: String,
    street: String,
    zipcode: String,
}

impl Address {
    pub fn new(
        city: impl Into<String>,
        street: impl Into<String>,
        zipcode: impl Into<String>,
    ) -> Self {
        Self {
            city: city.into(),
            street: street.into(),
            zipcode: zipcode.into(),
        }
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn street(&self) -> &str {
        &self.street
    }

    pub fn zipcode(&self) -> &str {
        &self.zipcode
    }
}

impl ValueObject for Address {}

impl core::fmt::Display for Address {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} {} ({})", self.city, self.street, self.zipcode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_by_value() {
        let a = Address::new("Seoul", "Riverside", "123-123");
        let b = Address::new("Seoul", "Riverside", "123-123");
        assert_eq!(a, b);
        assert_ne!(a, Address::new("Seoul", "Riverside", "999-999"));
    }

    #[test]
    fn serializes_with_plain_field_names() {
        let a = Address::new("Seoul", "1", "1111");
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["city"], "Seoul");
        assert_eq!(json["zipcode"], "1111");
    }
}
