//! Domain events
use crate::domain::aggregates::OrderStatus;
use crate::domain::value_objects::CouponCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "aggregate", rename_all = "lowercase")]
pub enum DomainEvent {
    Order(OrderEvent),
    Coupon(CouponEvent),
    Product(ProductEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: String, user: String, total: Decimal },
    StatusChanged { order_id: String, from: OrderStatus, to: OrderStatus },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CouponEvent {
    Redeemed { code: CouponCode, usage_count: u32 },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProductEvent {
    StockAdjusted { product_id: String, stock: u32 },
}

impl DomainEvent {
    /// Message subject the event is published under.
    pub fn subject(&self) -> String {
        let (aggregate, event) = match self {
            Self::Order(OrderEvent::Placed { .. }) => ("order", "placed"),
            Self::Order(OrderEvent::StatusChanged { .. }) => ("order", "status_changed"),
            Self::Coupon(CouponEvent::Redeemed { .. }) => ("coupon", "redeemed"),
            Self::Product(ProductEvent::StockAdjusted { .. }) => ("product", "stock_adjusted"),
        };
        format!("tilestore.{aggregate}.{event}")
    }
}
