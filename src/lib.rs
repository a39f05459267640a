//! Tilestore commerce
//!
//! Storefront and back office for a tile and home-improvement shop.
//!
//! ## Features
//! - Catalog with a three-level category tree, brands and variant products
//! - Cart and wishlist per user or session, with optimistic client updates
//! - Coupon validation and checkout pricing (GST and shipping)
//! - Order lifecycle with an append-only status history
//! - Admin CRUD over products, categories, brands, coupons, blogs and customers
//!
//! [`api`] serves the JSON contracts, [`client`] speaks them, and [`sync`] plus
//! [`checkout`] are the storefront-side layers built on the client.

use thiserror::Error;

pub mod api;
pub mod checkout;
pub mod client;
pub mod config;
pub mod contracts;
pub mod domain;
pub mod listing;
pub mod store;
pub mod sync;

pub use domain::aggregates::{
    Coupon, CouponError, CouponQuote, Order, OrderStatus, ShippingInfo, TransitionError,
};
pub use domain::pricing::{PriceBreakdown, PricingPolicy};
pub use listing::{ListQuery, Page};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum CommerceError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already exists")]
    Conflict(String),

    #[error("{0} was changed by another request")]
    Stale(&'static str),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Malformed stored document: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sqlx::Error> for CommerceError {
    fn from(error: sqlx::Error) -> Self {
        if matches!(error, sqlx::Error::RowNotFound) {
            return Self::NotFound("record");
        }
        match error.as_database_error().map(|e| e.kind()) {
            Some(sqlx::error::ErrorKind::UniqueViolation) => Self::Conflict("record".to_string()),
            _ => Self::StorageError(error.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for CommerceError {
    fn from(error: sqlx::migrate::MigrateError) -> Self { Self::StorageError(error.to_string()) }
}

pub type Result<T> = std::result::Result<T, CommerceError>;
