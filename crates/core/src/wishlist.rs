//! Shopper wishlist state: a deduplicated, insertion-ordered set of products.

use crate::types::{Product, ProductId};

#[derive(Debug, Clone, Default)]
pub struct WishlistStore {
    items: Vec<Product>,
}

impl WishlistStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Save a product. Already-saved products are left as they are.
    pub fn add(&mut self, product: &Product) {
        if !self.contains(&product.id) {
            self.items.push(product.clone());
        }
    }

    /// Forget a product. Unknown ids are ignored.
    pub fn remove(&mut self, product_id: &ProductId) {
        self.items.retain(|p| p.id != *product_id);
    }

    #[must_use]
    pub fn contains(&self, product_id: &ProductId) -> bool {
        self.items.iter().any(|p| p.id == *product_id)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn items(&self) -> &[Product] {
        &self.items
    }
}
