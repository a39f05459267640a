//! Storefront checkout
//!
//! Prices the cached cart, checks the shipping form and payment choice, then
//! submits the order through an [`OrderGateway`]. On success the cart is
//! emptied; a failing clear only logs, the order stands.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};
use validator::{Validate, ValidationErrors};

use crate::client::ClientError;
use crate::contracts::NewOrderRequest;
use crate::domain::aggregates::{
    CouponQuote, ItemList, ListKind, Order, OrderItem, Owner, PaymentInfo, PaymentMethod, PaymentState, ShippingInfo,
};
use crate::domain::pricing::{AmountOverflow, PriceBreakdown, PricingPolicy};
use crate::sync::ItemCache;

/// Backend calls checkout depends on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn validate_coupon(&self, code: &str, order_amount: Decimal) -> Result<CouponQuote, ClientError>;
    async fn create_order(&self, order: &NewOrderRequest) -> Result<Order, ClientError>;
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Your cart is empty")]
    EmptyCart,
    #[error("Invalid shipping details: {0}")]
    InvalidShipping(ValidationErrors),
    #[error("Please enter your UPI ID")]
    MissingUpiId,
    #[error("Cart total changed since the coupon was applied, please apply it again")]
    StaleCoupon,
    #[error(transparent)]
    Overflow(#[from] AmountOverflow),
    #[error(transparent)]
    Gateway(#[from] ClientError),
}

pub struct Checkout {
    orders: Arc<dyn OrderGateway>,
    cart: Arc<ItemCache>,
    pricing: PricingPolicy,
}

impl Checkout {
    pub fn new(orders: Arc<dyn OrderGateway>, cart: Arc<ItemCache>, pricing: PricingPolicy) -> Self {
        Self { orders, cart, pricing }
    }

    fn cart(&self, owner: &Owner) -> ItemList { self.cart.snapshot(ListKind::Cart, owner) }

    /// Breakdown of the owner's cart as currently cached.
    pub fn quote(&self, owner: &Owner) -> Result<PriceBreakdown, AmountOverflow> {
        self.pricing.price(self.cart(owner).lines().iter().map(|l| (l.price, l.quantity)))
    }

    /// Validates `code` against the current cart total.
    #[instrument(skip(self), fields(%owner))]
    pub async fn apply_coupon(&self, owner: &Owner, code: &str) -> Result<CouponQuote, CheckoutError> {
        let total = self.quote(owner)?.total_amount;
        Ok(self.orders.validate_coupon(code, total).await?)
    }

    #[instrument(skip(self, shipping, payment, coupon), fields(%owner))]
    pub async fn place_order(
        &self,
        owner: &Owner,
        shipping: ShippingInfo,
        payment: PaymentMethod,
        coupon: Option<&CouponQuote>,
    ) -> Result<Order, CheckoutError> {
        let cart = self.cart(owner);
        if cart.is_empty() { return Err(CheckoutError::EmptyCart); }
        shipping.validate().map_err(CheckoutError::InvalidShipping)?;
        if !payment.is_complete() { return Err(CheckoutError::MissingUpiId); }

        let breakdown = self.pricing.price(cart.lines().iter().map(|l| (l.price, l.quantity)))?;
        if coupon.is_some_and(|quote| !breakdown.matches(quote)) {
            return Err(CheckoutError::StaleCoupon);
        }

        let request = NewOrderRequest {
            shipping_info: shipping,
            order_items: cart
                .lines()
                .iter()
                .map(|l| OrderItem {
                    product: l.product_id.clone(), name: l.name.clone(), price: l.price, quantity: l.quantity,
                    image: l.image.clone(), size: l.variant.size.clone(), color: l.variant.color.clone(),
                })
                .collect(),
            payment_info: PaymentInfo { method: payment, status: PaymentState::Pending, transaction_id: None },
            items_price: breakdown.items_price,
            tax_price: breakdown.tax_price,
            shipping_price: breakdown.shipping_price,
            total_price: breakdown.charged(coupon),
            coupon_code: coupon.map(|quote| quote.code.to_string()),
        };
        let order = self.orders.create_order(&request).await?;
        info!(order_id = %order.id, total = %order.total_price, "order placed");

        if let Err(e) = self.cart.clear(ListKind::Cart, owner).await {
            warn!(error = %e, order_id = %order.id, "failed to clear cart after checkout");
        }
        Ok(order)
    }
}
