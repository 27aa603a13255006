//! Shopper cart state.
//!
//! A cart is an ordered list of [`CartLine`]s keyed by
//! (product, color, size). Two lines for the same product in different
//! colors or sizes are distinct and never merged. Every mutation is
//! tolerant: unknown keys are ignored rather than reported, because
//! several UI elements may race to remove the same line.
//!
//! Totals are computed on read from the lines' *current* product prices,
//! not from a snapshot taken when the line was added. [`CartStore::reprice`]
//! propagates a catalog price change into existing lines.

use serde::Serialize;

use crate::types::{CurrencyCode, Price, Product, ProductId};

/// Identity of a cart line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct LineKey {
    pub product_id: ProductId,
    pub color: String,
    pub size: String,
}

impl LineKey {
    #[must_use]
    pub fn new(product_id: ProductId, color: impl Into<String>, size: impl Into<String>) -> Self {
        Self {
            product_id,
            color: color.into(),
            size: size.into(),
        }
    }

    fn matches(&self, product_id: &ProductId, color: &str, size: &str) -> bool {
        self.product_id == *product_id && self.color == color && self.size == size
    }
}

/// One product/color/size combination with a positive quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    product: Product,
    quantity: u32,
    color: String,
    size: String,
}

impl CartLine {
    #[must_use]
    pub const fn product(&self) -> &Product {
        &self.product
    }

    /// Always at least 1.
    #[must_use]
    pub const fn quantity(&self) -> u32 {
        self.quantity
    }

    #[must_use]
    pub fn color(&self) -> &str {
        &self.color
    }

    #[must_use]
    pub fn size(&self) -> &str {
        &self.size
    }

    #[must_use]
    pub fn key(&self) -> LineKey {
        LineKey::new(self.product.id, self.color.clone(), self.size.clone())
    }

    /// `quantity × product.price` at the product's current price.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.product.price.times(self.quantity)
    }

    fn is(&self, product_id: &ProductId, color: &str, size: &str) -> bool {
        self.product.id == *product_id && self.color == color && self.size == size
    }
}

/// The cart: lines plus the slide-over panel's visibility flag.
#[derive(Debug, Clone, Default)]
pub struct CartStore {
    lines: Vec<CartLine>,
    open: bool,
}

impl CartStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `quantity` units of a product variant and open the cart panel.
    ///
    /// An existing line with the same (product, color, size) has its
    /// quantity increased; otherwise a new line is appended. Color and size
    /// are not checked against the product's variants. A zero quantity
    /// leaves the lines untouched but still opens the panel.
    pub fn add_item(&mut self, product: &Product, color: &str, size: &str, quantity: u32) {
        self.open = true;
        if quantity == 0 {
            return;
        }

        if let Some(line) = self
            .lines
            .iter_mut()
            .find(|line| line.is(&product.id, color, size))
        {
            line.quantity = line.quantity.saturating_add(quantity);
            return;
        }

        self.lines.push(CartLine {
            product: product.clone(),
            quantity,
            color: color.to_owned(),
            size: size.to_owned(),
        });
    }

    /// [`add_item`](Self::add_item) with a quantity of one.
    pub fn add_one(&mut self, product: &Product, color: &str, size: &str) {
        self.add_item(product, color, size, 1);
    }

    /// Remove the matching line. Absent lines are ignored.
    pub fn remove_item(&mut self, product_id: &ProductId, color: &str, size: &str) {
        self.lines.retain(|line| !line.is(product_id, color, size));
    }

    /// Replace the matching line's quantity.
    ///
    /// `quantity <= 0` removes the line, so a non-positive quantity is never
    /// stored. Unlike [`add_item`](Self::add_item) this does not increment
    /// and does not create a missing line.
    pub fn set_quantity(&mut self, product_id: &ProductId, color: &str, size: &str, quantity: i64) {
        if quantity <= 0 {
            self.remove_item(product_id, color, size);
            return;
        }

        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        if let Some(line) = self
            .lines
            .iter_mut()
            .find(|line| line.is(product_id, color, size))
        {
            line.quantity = quantity;
        }
    }

    /// Remove every line. The panel flag is left alone.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Refresh the product carried by every line for `product.id`.
    ///
    /// Returns the number of lines touched.
    pub fn reprice(&mut self, product: &Product) -> usize {
        let mut touched = 0;
        for line in self.lines.iter_mut().filter(|l| l.product.id == product.id) {
            line.product = product.clone();
            touched += 1;
        }
        touched
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    #[must_use]
    pub fn line(&self, key: &LineKey) -> Option<&CartLine> {
        self.lines
            .iter()
            .find(|line| key.matches(&line.product.id, &line.color, &line.size))
    }

    /// Number of distinct lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of quantities over all lines.
    #[must_use]
    pub fn total_item_count(&self) -> u64 {
        self.lines.iter().map(|line| u64::from(line.quantity)).sum()
    }

    /// Sum of `quantity × price` over all lines.
    ///
    /// The catalog holds a single currency; a line in another currency is
    /// left out of the total rather than converted.
    #[must_use]
    pub fn total_price(&self) -> Price {
        let currency = self
            .lines
            .first()
            .map_or(CurrencyCode::default(), |line| line.product.price.currency_code());

        self.lines.iter().fold(Price::zero(currency), |total, line| {
            total.checked_add(&line.subtotal()).unwrap_or(total)
        })
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open
    }

    pub fn set_open(&mut self, open: bool) {
        self.open = open;
    }
}
