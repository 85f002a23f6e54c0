//! Product catalog record.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Price, ProductId};

/// A product row from the catalog sheet.
///
/// `stock` is the only mutable field; it changes when an order line is
/// applied through [`crate::Inventory`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<String>,
    pub price: Decimal,
    pub stock: u32,
}

impl Product {
    /// Unit price in the default currency.
    #[must_use]
    pub fn unit_price(&self) -> Price {
        Price::usd(self.price)
    }

    /// Whether at least `quantity` units are available.
    #[must_use]
    pub const fn has_stock(&self, quantity: u32) -> bool {
        self.stock >= quantity
    }

    /// Text used when embedding or lexically searching the product.
    #[must_use]
    pub fn search_text(&self) -> String {
        let mut text = format!("{} {}", self.name, self.description);
        if let Some(category) = &self.category {
            text.push(' ');
            text.push_str(category);
        }
        if let Some(season) = &self.season {
            text.push(' ');
            text.push_str(season);
        }
        text
    }
}
