//! Static product catalog.
//!
//! Loaded once from a JSON file at startup and kept in memory. Products are
//! read-only: carts and wishlists hold clones.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::Deserialize;

use atelier_core::{CurrencyCode, Product, ProductId};

/// Catalog loading errors.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("IO error reading {path}: {message}")]
    Io { path: String, message: String },
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate product id {0}")]
    DuplicateId(ProductId),
    #[error("product {id} is priced in {found:?}, catalog currency is {expected:?}")]
    MixedCurrency {
        id: ProductId,
        expected: CurrencyCode,
        found: CurrencyCode,
    },
}

/// Filters accepted by the product listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogQuery {
    pub category: Option<String>,
    /// Case-insensitive text search over name, category and tags.
    pub q: Option<String>,
    pub featured: Option<bool>,
    pub new: Option<bool>,
    pub bestseller: Option<bool>,
}

/// In-memory product catalog.
#[derive(Debug, Default)]
pub struct Catalog {
    products: Vec<Product>,
    index: HashMap<ProductId, usize>,
}

impl Catalog {
    /// Load the catalog from a JSON array of products.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if it
    /// fails validation (see [`from_products`](Self::from_products)).
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|e| CatalogError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let products: Vec<Product> = serde_json::from_str(&raw)?;
        Self::from_products(products)
    }

    /// Build a catalog, checking ids are unique and all prices share one
    /// currency.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::DuplicateId` or `CatalogError::MixedCurrency`.
    pub fn from_products(products: Vec<Product>) -> Result<Self, CatalogError> {
        let mut index = HashMap::with_capacity(products.len());
        let expected = products.first().map(|p| p.price.currency_code());

        for (position, product) in products.iter().enumerate() {
            if index.insert(product.id, position).is_some() {
                return Err(CatalogError::DuplicateId(product.id));
            }
            let found = product.price.currency_code();
            if let Some(expected) = expected
                && found != expected
            {
                return Err(CatalogError::MixedCurrency {
                    id: product.id,
                    expected,
                    found,
                });
            }
        }

        Ok(Self { products, index })
    }

    #[must_use]
    pub fn all(&self) -> &[Product] {
        &self.products
    }

    #[must_use]
    pub fn get(&self, id: &ProductId) -> Option<&Product> {
        self.index.get(id).and_then(|&i| self.products.get(i))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.products.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Distinct categories, sorted.
    #[must_use]
    pub fn categories(&self) -> BTreeSet<&str> {
        self.products.iter().map(|p| p.category.as_str()).collect()
    }

    /// Catalog currency; the default currency for an empty catalog.
    #[must_use]
    pub fn currency(&self) -> CurrencyCode {
        self.products
            .first()
            .map_or(CurrencyCode::default(), |p| p.price.currency_code())
    }

    /// Products matching every filter set in `query`, in catalog order.
    #[must_use]
    pub fn query(&self, query: &CatalogQuery) -> Vec<&Product> {
        let needle = query
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase);

        self.products
            .iter()
            .filter(|p| {
                query
                    .category
                    .as_deref()
                    .is_none_or(|c| p.category.eq_ignore_ascii_case(c))
            })
            .filter(|p| query.featured.is_none_or(|f| p.is_featured == f))
            .filter(|p| query.new.is_none_or(|n| p.is_new == n))
            .filter(|p| query.bestseller.is_none_or(|b| p.is_bestseller == b))
            .filter(|p| needle.as_deref().is_none_or(|n| matches_text(p, n)))
            .collect()
    }
}

fn matches_text(product: &Product, needle: &str) -> bool {
    product.name.to_lowercase().contains(needle)
        || product.category.to_lowercase().contains(needle)
        || product
            .tags
            .iter()
            .any(|tag| tag.to_lowercase().contains(needle))
}
