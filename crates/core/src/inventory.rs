//! In-memory stock table.
//!
//! Holds the product catalog for one batch run (or one service process) and
//! applies order lines against it. Stock never goes negative: a line whose
//! quantity exceeds the remaining stock is rejected and stock is unchanged.

use std::collections::HashMap;

use thiserror::Error;

use crate::types::{Product, ProductId};

/// Errors from stock table operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    /// Two catalog rows share an ID.
    #[error("duplicate product id: {0}")]
    DuplicateProduct(ProductId),

    /// No product with this ID.
    #[error("unknown product: {0}")]
    UnknownProduct(ProductId),

    /// Requested quantity is zero.
    #[error("quantity must be at least 1")]
    InvalidQuantity,

    /// Not enough stock; nothing was changed.
    #[error("insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },
}

/// A successful stock decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockChange {
    pub previous: u32,
    pub remaining: u32,
}

/// Product catalog with stock counts, indexed by case-insensitive ID.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    products: Vec<Product>,
    index: HashMap<String, usize>,
}

impl Inventory {
    /// Build a stock table from catalog rows, preserving their order.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::DuplicateProduct` if two rows share an ID
    /// (compared case-insensitively).
    pub fn new(products: Vec<Product>) -> Result<Self, InventoryError> {
        let mut index = HashMap::with_capacity(products.len());
        for (position, product) in products.iter().enumerate() {
            if index.insert(index_key(product.id.as_str()), position).is_some() {
                return Err(InventoryError::DuplicateProduct(product.id.clone()));
            }
        }
        Ok(Self { products, index })
    }

    /// All products in catalog order.
    #[must_use]
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.products.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Look up a product by raw ID, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Product> {
        self.index
            .get(&index_key(id))
            .and_then(|&position| self.products.get(position))
    }

    /// Current stock for a product.
    #[must_use]
    pub fn stock(&self, id: &ProductId) -> Option<u32> {
        self.get(id.as_str()).map(|product| product.stock)
    }

    /// Take `quantity` units of a product out of stock.
    ///
    /// # Errors
    ///
    /// - `InvalidQuantity` if `quantity` is zero
    /// - `UnknownProduct` if the ID is not in the catalog
    /// - `InsufficientStock` if fewer than `quantity` units remain; stock is
    ///   left unchanged
    pub fn apply_order(
        &mut self,
        id: &ProductId,
        quantity: u32,
    ) -> Result<StockChange, InventoryError> {
        if quantity == 0 {
            return Err(InventoryError::InvalidQuantity);
        }

        let product = self
            .index
            .get(&index_key(id.as_str()))
            .and_then(|&position| self.products.get_mut(position))
            .ok_or_else(|| InventoryError::UnknownProduct(id.clone()))?;

        let previous = product.stock;
        let remaining =
            previous
                .checked_sub(quantity)
                .ok_or_else(|| InventoryError::InsufficientStock {
                    product_id: product.id.clone(),
                    requested: quantity,
                    available: previous,
                })?;

        product.stock = remaining;
        Ok(StockChange {
            previous,
            remaining,
        })
    }

    /// Products with at least `quantity` units, excluding `exclude`.
    pub fn in_stock<'a>(
        &'a self,
        quantity: u32,
        exclude: Option<&'a ProductId>,
    ) -> impl Iterator<Item = &'a Product> + 'a {
        self.products.iter().filter(move |product| {
            product.has_stock(quantity) && exclude.is_none_or(|id| !id.matches(product.id.as_str()))
        })
    }

    /// Sum of all stock counts.
    #[must_use]
    pub fn total_units(&self) -> u64 {
        self.products
            .iter()
            .map(|product| u64::from(product.stock))
            .sum()
    }
}

fn index_key(id: &str) -> String {
    id.trim().to_ascii_uppercase()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn product(id: &str, stock: u32) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            description: String::new(),
            category: None,
            season: None,
            price: Decimal::new(1999, 2),
            stock,
        }
    }

    fn inventory() -> Inventory {
        Inventory::new(vec![product("LTH0976", 4), product("CBT8901", 0)]).unwrap()
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let inventory = inventory();
        assert!(inventory.get("lth0976").is_some());
        assert!(inventory.get(" LTH0976 ").is_some());
        assert!(inventory.get("XYZ").is_none());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = Inventory::new(vec![product("A1", 1), product("a1", 2)]).unwrap_err();
        assert!(matches!(err, InventoryError::DuplicateProduct(_)));
    }

    #[test]
    fn test_apply_order_decrements_stock() {
        let mut inventory = inventory();
        let change = inventory
            .apply_order(&ProductId::new("LTH0976"), 3)
            .unwrap();
        assert_eq!(change.previous, 4);
        assert_eq!(change.remaining, 1);
        assert_eq!(inventory.stock(&ProductId::new("LTH0976")), Some(1));
    }

    #[test]
    fn test_apply_order_exact_stock_reaches_zero() {
        let mut inventory = inventory();
        let change = inventory
            .apply_order(&ProductId::new("LTH0976"), 4)
            .unwrap();
        assert_eq!(change.remaining, 0);
    }

    #[test]
    fn test_insufficient_stock_leaves_stock_unchanged() {
        let mut inventory = inventory();
        let err = inventory
            .apply_order(&ProductId::new("LTH0976"), 5)
            .unwrap_err();
        assert_eq!(
            err,
            InventoryError::InsufficientStock {
                product_id: ProductId::new("LTH0976"),
                requested: 5,
                available: 4,
            }
        );
        assert_eq!(inventory.stock(&ProductId::new("LTH0976")), Some(4));
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let mut inventory = inventory();
        assert_eq!(
            inventory.apply_order(&ProductId::new("LTH0976"), 0),
            Err(InventoryError::InvalidQuantity)
        );
    }

    #[test]
    fn test_unknown_product() {
        let mut inventory = inventory();
        assert!(matches!(
            inventory.apply_order(&ProductId::new("NOPE"), 1),
            Err(InventoryError::UnknownProduct(_))
        ));
    }

    #[test]
    fn test_stock_never_negative_under_repeated_orders() {
        let mut inventory = inventory();
        let id = ProductId::new("LTH0976");
        let mut created = 0;
        for _ in 0..10 {
            if inventory.apply_order(&id, 1).is_ok() {
                created += 1;
            }
        }
        assert_eq!(created, 4);
        assert_eq!(inventory.stock(&id), Some(0));
        assert_eq!(inventory.total_units(), 0);
    }

    #[test]
    fn test_in_stock_excludes_product_and_empty_stock() {
        let inventory = Inventory::new(vec![
            product("A1", 3),
            product("B2", 0),
            product("C3", 5),
        ])
        .unwrap();
        let exclude = ProductId::new("A1");
        let ids: Vec<_> = inventory
            .in_stock(1, Some(&exclude))
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ids, vec!["C3"]);
    }
}
