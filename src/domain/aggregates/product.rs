//! Product Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use crate::domain::aggregates::cart::Variant;
use crate::domain::events::{DomainEvent, ProductEvent};
use crate::domain::value_objects::slugify;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub sku: String,
    #[serde(default)]
    pub description: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub price: Decimal,
    pub mrp: Option<Decimal>,
    pub stock: u32,
    #[serde(default)]
    pub variants: Vec<ProductVariant>,
    #[serde(default)]
    pub images: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A sellable size/colour combination with its own stock and optional price.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProductVariant {
    pub size: Option<String>,
    pub color: Option<String>,
    pub price: Option<Decimal>,
    pub stock: u32,
}

impl ProductVariant {
    fn matches(&self, variant: &Variant) -> bool { self.size == variant.size && self.color == variant.color }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProductDraft {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 64))]
    pub sku: String,
    #[serde(default)]
    pub description: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub price: Decimal,
    pub mrp: Option<Decimal>,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub variants: Vec<ProductVariant>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool { true }

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductError {
    #[error("Product name is required")]
    MissingName,
    #[error("Price must be greater than 0")]
    InvalidPrice,
    #[error("Product is not available")]
    Unavailable,
    #[error("Variant not offered for this product")]
    UnknownVariant,
    #[error("Insufficient stock for {name}: {available} available")]
    InsufficientInventory { name: String, available: u32 },
}

impl Product {
    pub fn create(id: impl Into<String>, draft: ProductDraft, now: DateTime<Utc>) -> Result<Self, ProductError> {
        check_draft(&draft)?;
        Ok(Self {
            id: id.into(), slug: slugify(&draft.name), name: draft.name, sku: draft.sku.trim().to_uppercase(),
            description: draft.description, brand: draft.brand, category: draft.category, price: draft.price,
            mrp: draft.mrp, stock: draft.stock, variants: draft.variants, images: draft.images,
            is_active: draft.is_active, created_at: now, updated_at: now,
        })
    }

    pub fn apply(&mut self, draft: ProductDraft, now: DateTime<Utc>) -> Result<(), ProductError> {
        check_draft(&draft)?;
        self.slug = slugify(&draft.name);
        self.name = draft.name;
        self.sku = draft.sku.trim().to_uppercase();
        self.description = draft.description;
        self.brand = draft.brand;
        self.category = draft.category;
        self.price = draft.price;
        self.mrp = draft.mrp;
        self.stock = draft.stock;
        self.variants = draft.variants;
        self.images = draft.images;
        self.is_active = draft.is_active;
        self.touch(now);
        Ok(())
    }

    /// Unit price of `variant`, falling back to the product price.
    pub fn price_of(&self, variant: &Variant) -> Result<Decimal, ProductError> {
        if self.variants.is_empty() || *variant == Variant::default() { return Ok(self.price); }
        let v = self.variants.iter().find(|v| v.matches(variant)).ok_or(ProductError::UnknownVariant)?;
        Ok(v.price.unwrap_or(self.price))
    }

    /// Takes `qty` units of `variant` out of stock for an order.
    pub fn remove_inventory(&mut self, variant: &Variant, qty: u32, now: DateTime<Utc>) -> Result<DomainEvent, ProductError> {
        if !self.is_active { return Err(ProductError::Unavailable); }
        let stock = if self.variants.is_empty() || *variant == Variant::default() {
            &mut self.stock
        } else {
            &mut self.variants.iter_mut().find(|v| v.matches(variant)).ok_or(ProductError::UnknownVariant)?.stock
        };
        let available = *stock;
        if available < qty {
            return Err(ProductError::InsufficientInventory { name: self.name.clone(), available });
        }
        *stock = available - qty;
        let remaining = *stock;
        self.touch(now);
        Ok(DomainEvent::Product(ProductEvent::StockAdjusted { product_id: self.id.clone(), stock: remaining }))
    }

    pub fn toggle(&mut self, now: DateTime<Utc>) { self.is_active = !self.is_active; self.touch(now); }
    fn touch(&mut self, now: DateTime<Utc>) { self.updated_at = now; }
}

fn check_draft(draft: &ProductDraft) -> Result<(), ProductError> {
    if draft.name.trim().is_empty() { return Err(ProductError::MissingName); }
    if draft.price <= Decimal::ZERO || draft.variants.iter().any(|v| v.price.is_some_and(|p| p <= Decimal::ZERO)) {
        return Err(ProductError::InvalidPrice);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> ProductDraft {
        ProductDraft {
            name: "Onyx Marble Slab".into(), sku: "onx-001".into(), description: String::new(), brand: None,
            category: None, price: Decimal::from(1999), mrp: None, stock: 5, variants: vec![], images: vec![], is_active: true,
        }
    }

    #[test]
    fn test_product_create() {
        let p = Product::create("P1", draft(), Utc::now()).unwrap();
        assert_eq!(p.name, "Onyx Marble Slab");
        assert_eq!(p.slug, "onyx-marble-slab");
        assert_eq!(p.sku, "ONX-001");
        let mut bad = draft();
        bad.price = Decimal::ZERO;
        assert_eq!(Product::create("P2", bad, Utc::now()), Err(ProductError::InvalidPrice));
    }

    #[test]
    fn test_inventory() {
        let mut p = Product::create("P1", draft(), Utc::now()).unwrap();
        p.remove_inventory(&Variant::default(), 3, Utc::now()).unwrap();
        assert_eq!(p.stock, 2);
        assert_eq!(
            p.remove_inventory(&Variant::default(), 3, Utc::now()),
            Err(ProductError::InsufficientInventory { name: "Onyx Marble Slab".into(), available: 2 })
        );
        assert_eq!(p.stock, 2);
    }

    #[test]
    fn test_variant_stock_and_price() {
        let mut d = draft();
        d.variants = vec![
            ProductVariant { size: Some("600x600".into()), color: None, price: Some(Decimal::from(2499)), stock: 1 },
            ProductVariant { size: Some("300x300".into()), color: None, price: None, stock: 0 },
        ];
        let mut p = Product::create("P1", d, Utc::now()).unwrap();
        let large = Variant { size: Some("600x600".into()), color: None };
        let small = Variant { size: Some("300x300".into()), color: None };
        assert_eq!(p.price_of(&large), Ok(Decimal::from(2499)));
        assert_eq!(p.price_of(&small), Ok(Decimal::from(1999)));
        assert!(p.remove_inventory(&large, 1, Utc::now()).is_ok());
        assert!(p.variants.iter().all(|v| v.stock == 0));
        assert!(matches!(p.remove_inventory(&small, 1, Utc::now()), Err(ProductError::InsufficientInventory { .. })));
        let unknown = Variant { size: Some("1200x600".into()), color: None };
        assert_eq!(p.price_of(&unknown), Err(ProductError::UnknownVariant));
    }
}
