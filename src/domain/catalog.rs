use crate::error::{FulfillmentError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A non-negative monetary value (sale price or upstream cost).
///
/// Wraps `rust_decimal::Decimal` so prices never go negative and serialize
/// as plain decimal strings.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self> {
        if value >= Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(FulfillmentError::InvalidQuantity(format!(
                "money amount must not be negative, got {value}"
            )))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Money {
    type Error = FulfillmentError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    #[default]
    Active,
    Inactive,
}

/// Internal sellable unit.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub denomination: u32,
    pub price: Money,
    pub status: ProductStatus,
}

/// Catalog entry on the upstream storefront.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct UpstreamItem {
    pub id: String,
    /// Key used to locate the clickable element on the storefront page.
    pub external_ref: String,
    pub denomination: u32,
    pub cost: Money,
    pub supplier_id: String,
}

/// Upstream source descriptor. `code` selects the automation adapter.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Supplier {
    pub id: String,
    pub name: String,
    pub code: String,
}

/// Bill-of-materials row: one upstream item, `multiplier` times per product unit.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct RecipeLine {
    pub id: String,
    pub product_id: String,
    pub upstream_item_id: String,
    pub multiplier: u32,
}

impl RecipeLine {
    pub fn new(
        id: impl Into<String>,
        product_id: impl Into<String>,
        upstream_item_id: impl Into<String>,
        multiplier: u32,
    ) -> Result<Self> {
        if multiplier == 0 {
            return Err(FulfillmentError::InvalidQuantity(
                "recipe multiplier must be positive".to_string(),
            ));
        }
        Ok(Self {
            id: id.into(),
            product_id: product_id.into(),
            upstream_item_id: upstream_item_id.into(),
            multiplier,
        })
    }

    /// Units of the upstream item needed for `order_quantity` product units.
    pub fn scaled(&self, order_quantity: u32) -> Result<u32> {
        self.multiplier.checked_mul(order_quantity).ok_or_else(|| {
            FulfillmentError::InvalidQuantity(format!(
                "{} x {} overflows",
                self.multiplier, order_quantity
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_validation() {
        assert!(Money::new(dec!(0.0)).is_ok());
        assert!(Money::new(dec!(12500)).is_ok());
        assert!(matches!(
            Money::new(dec!(-1.0)),
            Err(FulfillmentError::InvalidQuantity(_))
        ));
    }

    #[test]
    fn test_recipe_line_rejects_zero_multiplier() {
        assert!(RecipeLine::new("r1", "p1", "i1", 0).is_err());
        assert!(RecipeLine::new("r1", "p1", "i1", 1).is_ok());
    }

    #[test]
    fn test_recipe_line_scaled() {
        let line = RecipeLine::new("r1", "p1", "i1", 40).unwrap();
        assert_eq!(line.scaled(1).unwrap(), 40);
        assert_eq!(line.scaled(3).unwrap(), 120);
        assert!(line.scaled(u32::MAX).is_err());
    }
}
