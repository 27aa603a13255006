//! Catalog product model.
//!
//! Products are read-only as far as the cart and wishlist are concerned;
//! the storefront loads them from the catalog file at startup.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::price::Price;

/// A color option for a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorVariant {
    /// Display name, also the value stored on cart lines (e.g. "Black").
    pub name: String,
    /// CSS color value used for the swatch (e.g. "#000000").
    pub value: String,
    /// Image shown when this color is selected.
    #[serde(default)]
    pub image: Option<String>,
}

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Current selling price.
    pub price: Price,
    /// Price before a markdown, shown struck through.
    #[serde(default)]
    pub original_price: Option<Price>,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub colors: Vec<ColorVariant>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub is_new: bool,
    #[serde(default)]
    pub is_bestseller: bool,
    #[serde(default)]
    pub is_featured: bool,
}

impl Product {
    /// Whole-percent markdown from `original_price`, if the product is on sale.
    ///
    /// Returns `None` when there is no original price, it is in another
    /// currency, or it is not above the current price.
    #[must_use]
    pub fn discount_percent(&self) -> Option<u32> {
        let original = self.original_price?;
        if original.currency_code() != self.price.currency_code()
            || original.amount() <= self.price.amount()
        {
            return None;
        }
        let off = (original.amount() - self.price.amount())
            .checked_mul(Decimal::ONE_HUNDRED)?
            .checked_div(original.amount())?;
        u32::try_from(off.round().mantissa()).ok()
    }

    /// First image, used for cart and wishlist thumbnails.
    #[must_use]
    pub fn primary_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }

    /// Whether `color` names one of this product's color variants.
    #[must_use]
    pub fn has_color(&self, color: &str) -> bool {
        self.colors.iter().any(|c| c.name == color)
    }

    /// Whether `size` is one of this product's size labels.
    #[must_use]
    pub fn has_size(&self, size: &str) -> bool {
        self.sizes.iter().any(|s| s == size)
    }
}
