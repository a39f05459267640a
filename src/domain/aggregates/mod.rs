//! Aggregates module
pub mod blog;
pub mod brand;
pub mod cart;
pub mod category;
pub mod coupon;
pub mod customer;
pub mod order;
pub mod product;

pub use blog::{Blog, BlogDraft};
pub use brand::{Brand, BrandDraft};
pub use cart::{CartError, CartLine, ItemList, LineId, ListKind, NewLine, Owner, Variant};
pub use category::{Category, CategoryDraft, CategoryError, CategoryLevel, CategoryNode, CategoryTree};
pub use coupon::{validate_coupon, Coupon, CouponDraft, CouponError, CouponQuote, DiscountType};
pub use customer::{Customer, CustomerDraft};
pub use order::{
    Order, OrderItem, OrderStatus, PaymentInfo, PaymentMethod, PaymentState, Progress, ShippingInfo, StatusEntry,
    TransitionError, LIFECYCLE,
};
pub use product::{Product, ProductDraft, ProductError, ProductVariant};
