//! # Stock Cache
//!
//! The last product list the backend returned. Replaced wholesale on every
//! successful refresh and left untouched when a refresh fails, so a network
//! blip degrades to "slightly stale" rather than "empty shop".

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::types::ProductSnapshot;

/// Last known product list, in backend order.
#[derive(Debug, Clone, Default)]
pub struct StockCache {
    products: Vec<ProductSnapshot>,
    index: HashMap<String, usize>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl StockCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole cache with a fresh backend listing.
    ///
    /// Duplicate ids keep the last occurrence.
    pub fn replace(&mut self, products: Vec<ProductSnapshot>, at: DateTime<Utc>) {
        self.index = HashMap::with_capacity(products.len());
        self.products = Vec::with_capacity(products.len());
        for product in products {
            match self.index.get(&product.id) {
                Some(&pos) => self.products[pos] = product,
                None => {
                    self.index.insert(product.id.clone(), self.products.len());
                    self.products.push(product);
                }
            }
        }
        self.refreshed_at = Some(at);
    }

    pub fn get(&self, product_id: &str) -> Option<&ProductSnapshot> {
        self.index.get(product_id).map(|&i| &self.products[i])
    }

    pub fn products(&self) -> &[ProductSnapshot] {
        &self.products
    }

    /// Products a customer can currently put in a cart.
    pub fn sellable(&self) -> impl Iterator<Item = &ProductSnapshot> {
        self.products.iter().filter(|p| p.is_sellable())
    }

    /// When the cache was last replaced. `None` until the first refresh.
    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_replace_and_get() {
        let mut cache = StockCache::new();
        assert!(cache.refreshed_at().is_none());

        cache.replace(
            vec![
                ProductSnapshot::new("A", "Tea", 500, Decimal::from(3)),
                ProductSnapshot::new("B", "Mug", 900, Decimal::ZERO),
            ],
            Utc::now(),
        );

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("A").map(|p| p.name.as_str()), Some("Tea"));
        assert!(cache.get("C").is_none());
        assert_eq!(cache.sellable().count(), 1);
        assert!(cache.refreshed_at().is_some());
    }

    #[test]
    fn test_replace_drops_previous_products() {
        let mut cache = StockCache::new();
        cache.replace(vec![ProductSnapshot::new("A", "Tea", 500, Decimal::ONE)], Utc::now());
        cache.replace(vec![ProductSnapshot::new("B", "Mug", 900, Decimal::ONE)], Utc::now());

        assert!(cache.get("A").is_none());
        assert!(cache.get("B").is_some());
    }

    #[test]
    fn test_duplicate_ids_keep_last() {
        let mut cache = StockCache::new();
        cache.replace(
            vec![
                ProductSnapshot::new("A", "Tea", 500, Decimal::ONE),
                ProductSnapshot::new("A", "Tea", 500, Decimal::from(7)),
            ],
            Utc::now(),
        );
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("A").map(|p| p.stock), Some(Decimal::from(7)));
    }
}
