//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationError};

use crate::domain::aggregates::CouponQuote;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::pricing::PriceBreakdown;
use crate::domain::value_objects::{CouponCode, Pincode};

/// Lifecycle states in the order they are reached. `Cancelled` sits outside it.
pub const LIFECYCLE: [OrderStatus; 6] = [
    OrderStatus::Pending,
    OrderStatus::Confirmed,
    OrderStatus::Processing,
    OrderStatus::Packed,
    OrderStatus::Shipped,
    OrderStatus::Delivered,
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus { #[default] Pending, Confirmed, Processing, Packed, Shipped, Delivered, Cancelled }

impl OrderStatus {
    pub fn is_terminal(self) -> bool { matches!(self, Self::Delivered | Self::Cancelled) }

    /// Position on the linear progress bar; `None` for `Cancelled`.
    pub fn step(self) -> Option<usize> { LIFECYCLE.iter().position(|s| *s == self) }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        if self.is_terminal() || self == next { return false; }
        if next == Self::Cancelled { return true; }
        matches!((self.step(), next.step()), (Some(from), Some(to)) if to > from)
    }

    pub fn allowed_transitions(self) -> Vec<OrderStatus> {
        LIFECYCLE.iter().copied().chain([Self::Cancelled]).filter(|next| self.can_transition_to(*next)).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEntry {
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    pub note: Option<String>,
    pub updated_by: Option<String>,
}

/// Line snapshot taken when the order is placed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product: String,
    pub name: String,
    pub price: Decimal,
    pub quantity: u32,
    pub image: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShippingInfo {
    #[validate(custom(function = "not_blank", message = "full name is required"))]
    pub full_name: String,
    #[validate(custom(function = "not_blank", message = "phone is required"))]
    pub phone: String,
    #[validate(custom(function = "not_blank", message = "address is required"))]
    pub address: String,
    #[validate(custom(function = "not_blank", message = "city is required"))]
    pub city: String,
    #[validate(custom(function = "not_blank", message = "state is required"))]
    pub state: String,
    #[validate(custom = "validate_pincode")]
    pub pincode: String,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String { "India".to_string() }

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() { Err(ValidationError::new("blank")) } else { Ok(()) }
}

fn validate_pincode(value: &str) -> Result<(), ValidationError> {
    Pincode::new(value).map(|_| ()).map_err(|e| {
        let mut error = ValidationError::new("pincode");
        error.message = Some(e.to_string().into());
        error
    })
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum PaymentMethod {
    Cod,
    Upi {
        #[serde(rename = "upiId")]
        upi_id: String,
    },
    Card,
    Netbanking,
}

impl PaymentMethod {
    /// A UPI payment needs the payer's UPI id.
    pub fn is_complete(&self) -> bool {
        match self {
            Self::Upi { upi_id } => !upi_id.trim().is_empty(),
            _ => true,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState { #[default] Pending, Paid, Failed }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfo {
    #[serde(flatten)]
    pub method: PaymentMethod,
    #[serde(default)]
    pub status: PaymentState,
    pub transaction_id: Option<String>,
}

/// Where a read-only view should place the order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    /// `index` of `of` steps along the lifecycle.
    Step { index: usize, of: usize },
    /// Drawn apart from the progress bar; `reached` is the last lifecycle step held.
    Cancelled { reached: Option<OrderStatus> },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub user: String,
    pub order_items: Vec<OrderItem>,
    pub shipping_info: ShippingInfo,
    pub payment_info: PaymentInfo,
    pub items_price: Decimal,
    pub tax_price: Decimal,
    pub shipping_price: Decimal,
    pub total_price: Decimal,
    pub coupon_code: Option<CouponCode>,
    #[serde(default)]
    pub discount_amount: Decimal,
    order_status: OrderStatus,
    status_history: Vec<StatusEntry>,
    pub packed_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Order is already {0:?}")]
    NoOp(OrderStatus),
    #[error("Cannot change order status from {from:?} to {to:?}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}

impl Order {
    /// Creates an order from priced line snapshots. Paid orders start `Confirmed`,
    /// everything else starts `Pending`.
    pub fn place(
        id: impl Into<String>,
        user: impl Into<String>,
        items: Vec<OrderItem>,
        shipping_info: ShippingInfo,
        payment_info: PaymentInfo,
        pricing: PriceBreakdown,
        coupon: Option<&CouponQuote>,
        at: DateTime<Utc>,
    ) -> Self {
        let initial = if payment_info.status == PaymentState::Paid { OrderStatus::Confirmed } else { OrderStatus::Pending };
        let mut order = Self {
            id: id.into(), user: user.into(), order_items: items, shipping_info, payment_info,
            items_price: pricing.items_price, tax_price: pricing.tax_price, shipping_price: pricing.shipping_price,
            total_price: pricing.charged(coupon), coupon_code: coupon.map(|q| q.code.clone()),
            discount_amount: coupon.map_or(Decimal::ZERO, |q| q.discount),
            order_status: initial,
            status_history: vec![StatusEntry { status: initial, timestamp: at, note: None, updated_by: None }],
            packed_at: None, shipped_at: None, delivered_at: None, created_at: at, updated_at: at, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed {
            order_id: order.id.clone(), user: order.user.clone(), total: order.total_price,
        }));
        order
    }

    pub fn status(&self) -> OrderStatus { self.order_status }
    pub fn history(&self) -> &[StatusEntry] { &self.status_history }
    pub fn available_transitions(&self) -> Vec<OrderStatus> { self.order_status.allowed_transitions() }

    /// Moves the order to `next`, recording the change in the history.
    pub fn transition(
        &mut self,
        next: OrderStatus,
        note: Option<String>,
        updated_by: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<&StatusEntry, TransitionError> {
        let from = self.order_status;
        if from == next && !from.is_terminal() { return Err(TransitionError::NoOp(next)); }
        if !from.can_transition_to(next) { return Err(TransitionError::InvalidTransition { from, to: next }); }

        match next {
            OrderStatus::Packed => self.packed_at = Some(at),
            OrderStatus::Shipped => self.shipped_at = Some(at),
            OrderStatus::Delivered => self.delivered_at = Some(at),
            _ => {}
        }
        self.order_status = next;
        self.updated_at = at;
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id.clone(), from, to: next }));
        self.status_history.push(StatusEntry { status: next, timestamp: at, note, updated_by });
        Ok(&self.status_history[self.status_history.len() - 1])
    }

    pub fn progress(&self) -> Progress {
        match self.order_status.step() {
            Some(index) => Progress::Step { index, of: LIFECYCLE.len() },
            None => Progress::Cancelled {
                reached: self.status_history.iter().rev().map(|e| e.status).find(|s| s.step().is_some()),
            },
        }
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pricing::PricingPolicy;

    fn order(payment: PaymentState) -> Order {
        let items = vec![OrderItem {
            product: "P1".into(), name: "Matt Floor Tile".into(), price: Decimal::from(1000), quantity: 2,
            image: None, size: Some("600x600".into()), color: None,
        }];
        let pricing = PricingPolicy::default().price(items.iter().map(|i| (i.price, i.quantity))).unwrap();
        Order::place(
            "O1", "U1", items, ShippingInfo::default(),
            PaymentInfo { method: PaymentMethod::Cod, status: payment, transaction_id: None },
            pricing, None, Utc::now(),
        )
    }

    #[test]
    fn test_initial_state_depends_on_payment() {
        let o = order(PaymentState::Pending);
        assert_eq!(o.status(), OrderStatus::Pending);
        assert_eq!(o.history().len(), 1);
        assert_eq!(o.total_price, Decimal::from(2560));
        assert_eq!(order(PaymentState::Paid).status(), OrderStatus::Confirmed);
    }

    #[test]
    fn test_order_workflow() {
        let mut o = order(PaymentState::Pending);
        for next in [OrderStatus::Confirmed, OrderStatus::Processing, OrderStatus::Packed, OrderStatus::Shipped, OrderStatus::Delivered] {
            let before = o.history().len();
            o.transition(next, None, Some("admin".into()), Utc::now()).unwrap();
            assert_eq!(o.history().len(), before + 1);
            assert_eq!(o.history().last().map(|e| e.status), Some(o.status()));
        }
        assert!(o.packed_at.is_some() && o.shipped_at.is_some() && o.delivered_at.is_some());
        assert!(o.available_transitions().is_empty());
    }

    #[test]
    fn test_forward_skip_allowed_backwards_rejected() {
        let mut o = order(PaymentState::Pending);
        o.transition(OrderStatus::Shipped, Some("courier picked up".into()), None, Utc::now()).unwrap();
        assert!(o.packed_at.is_none());
        assert_eq!(
            o.transition(OrderStatus::Processing, None, None, Utc::now()),
            Err(TransitionError::InvalidTransition { from: OrderStatus::Shipped, to: OrderStatus::Processing })
        );
    }

    #[test]
    fn test_same_status_is_noop() {
        let mut o = order(PaymentState::Pending);
        assert_eq!(o.transition(OrderStatus::Pending, None, None, Utc::now()), Err(TransitionError::NoOp(OrderStatus::Pending)));
        assert_eq!(o.history().len(), 1);
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        for terminal in [OrderStatus::Delivered, OrderStatus::Cancelled] {
            let mut o = order(PaymentState::Pending);
            o.transition(terminal, None, None, Utc::now()).unwrap();
            let snapshot = o.clone();
            for next in LIFECYCLE.iter().copied().chain([OrderStatus::Cancelled]) {
                assert!(matches!(
                    o.transition(next, None, None, Utc::now()),
                    Err(TransitionError::InvalidTransition { .. })
                ));
            }
            assert_eq!(o, snapshot);
        }
    }

    #[test]
    fn test_cancelled_progress_is_separate_branch() {
        let mut o = order(PaymentState::Pending);
        o.transition(OrderStatus::Processing, None, None, Utc::now()).unwrap();
        assert_eq!(o.progress(), Progress::Step { index: 2, of: 6 });
        o.transition(OrderStatus::Cancelled, Some("customer request".into()), None, Utc::now()).unwrap();
        assert_eq!(o.progress(), Progress::Cancelled { reached: Some(OrderStatus::Processing) });
    }

    #[test]
    fn test_events_raised_and_drained() {
        let mut o = order(PaymentState::Pending);
        o.transition(OrderStatus::Confirmed, None, None, Utc::now()).unwrap();
        let events = o.take_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], DomainEvent::Order(OrderEvent::StatusChanged { to: OrderStatus::Confirmed, .. })));
        assert!(o.take_events().is_empty());
    }

    #[test]
    fn test_payment_info_wire_format() {
        let info: PaymentInfo = serde_json::from_str(r#"{"method":"upi","upiId":"tiles@okaxis","status":"paid"}"#).unwrap();
        assert_eq!(info.method, PaymentMethod::Upi { upi_id: "tiles@okaxis".into() });
        assert!(info.method.is_complete());
        assert!(!PaymentMethod::Upi { upi_id: " ".into() }.is_complete());
    }

    #[test]
    fn test_shipping_validation() {
        let mut info = ShippingInfo {
            full_name: "Asha".into(), phone: "9800000000".into(), address: "12 MG Road".into(),
            city: "Bengaluru".into(), state: "Karnataka".into(), pincode: "560001".into(), country: "India".into(),
        };
        assert!(info.validate().is_ok());
        info.pincode = " 560001 ".into();
        assert!(info.validate().is_ok());
        info.pincode = "5600".into();
        assert!(info.validate().is_err());
    }

    #[test]
    fn test_whitespace_only_fields_are_rejected() {
        let info = ShippingInfo {
            full_name: "   ".into(), phone: " ".into(), address: "\t".into(), city: " ".into(), state: " ".into(),
            pincode: "560001".into(), country: "India".into(),
        };
        let errors = info.validate().unwrap_err();
        let fields = errors.field_errors();
        for field in ["full_name", "phone", "address", "city", "state"] {
            assert!(fields.contains_key(field), "{field} accepted");
        }
        assert!(!fields.contains_key("pincode"));
    }
}
