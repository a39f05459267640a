//! Coupon Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use crate::domain::events::{CouponEvent, DomainEvent};
use crate::domain::value_objects::{round_money, CouponCode};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType { Percentage, Fixed }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub code: CouponCode,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    #[serde(default)]
    pub min_purchase_amount: Decimal,
    pub max_discount_amount: Option<Decimal>,
    pub usage_limit: Option<u32>,
    #[serde(default)]
    pub usage_count: u32,
    pub per_user_limit: Option<u32>,
    pub expiry_date: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Admin payload for creating or editing a coupon.
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CouponDraft {
    pub code: CouponCode,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    #[serde(default)]
    pub min_purchase_amount: Decimal,
    pub max_discount_amount: Option<Decimal>,
    pub usage_limit: Option<u32>,
    pub per_user_limit: Option<u32>,
    pub expiry_date: DateTime<Utc>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool { true }

/// Outcome of a successful validation: what the order costs with the coupon.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponQuote {
    pub code: CouponCode,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub order_amount: Decimal,
    pub discount: Decimal,
    pub final_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CouponError {
    #[error("Invalid coupon code")]
    NotFound,
    #[error("Coupon has expired")]
    Expired,
    #[error("Minimum purchase amount of {minimum} required")]
    MinimumNotMet { minimum: Decimal },
    #[error("Coupon usage limit exceeded")]
    UsageExceeded,
    #[error("Invalid order amount")]
    InvalidAmount,
    #[error("Invalid coupon: {0}")]
    InvalidDefinition(&'static str),
}

impl Coupon {
    pub fn create(draft: CouponDraft, now: DateTime<Utc>) -> Result<Self, CouponError> {
        check_definition(&draft)?;
        Ok(Self {
            code: draft.code, description: draft.description, discount_type: draft.discount_type,
            discount_value: draft.discount_value, min_purchase_amount: draft.min_purchase_amount,
            max_discount_amount: draft.max_discount_amount, usage_limit: draft.usage_limit, usage_count: 0,
            per_user_limit: draft.per_user_limit, expiry_date: draft.expiry_date, is_active: draft.is_active,
            created_at: now, updated_at: now,
        })
    }

    /// Replaces the editable terms. The code identifies the coupon and is kept.
    pub fn apply(&mut self, draft: CouponDraft, now: DateTime<Utc>) -> Result<(), CouponError> {
        if draft.code != self.code { return Err(CouponError::InvalidDefinition("code cannot be changed")); }
        check_definition(&draft)?;
        self.description = draft.description;
        self.discount_type = draft.discount_type;
        self.discount_value = draft.discount_value;
        self.min_purchase_amount = draft.min_purchase_amount;
        self.max_discount_amount = draft.max_discount_amount;
        self.usage_limit = draft.usage_limit;
        self.per_user_limit = draft.per_user_limit;
        self.expiry_date = draft.expiry_date;
        self.is_active = draft.is_active;
        self.updated_at = now;
        Ok(())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool { now > self.expiry_date }

    pub fn is_exhausted(&self) -> bool {
        self.usage_limit.is_some_and(|limit| self.usage_count >= limit)
    }

    /// Discount granted on `order_amount`, never more than the amount itself.
    /// `None` when the amount is too large to price.
    pub fn discount_for(&self, order_amount: Decimal) -> Option<Decimal> {
        let discount = match self.discount_type {
            DiscountType::Percentage => {
                let raw = round_money(order_amount.checked_mul(self.discount_value)?.checked_div(Decimal::ONE_HUNDRED)?);
                self.max_discount_amount.map_or(raw, |cap| raw.min(cap))
            }
            DiscountType::Fixed => self.discount_value.min(order_amount),
        };
        Some(discount.max(Decimal::ZERO).min(order_amount))
    }

    pub fn quote(&self, order_amount: Decimal, now: DateTime<Utc>) -> Result<CouponQuote, CouponError> {
        if order_amount < Decimal::ZERO { return Err(CouponError::InvalidAmount); }
        if !self.is_active { return Err(CouponError::NotFound); }
        if self.is_expired(now) { return Err(CouponError::Expired); }
        if order_amount < self.min_purchase_amount {
            return Err(CouponError::MinimumNotMet { minimum: self.min_purchase_amount });
        }
        if self.is_exhausted() { return Err(CouponError::UsageExceeded); }

        let discount = self.discount_for(order_amount).ok_or(CouponError::InvalidAmount)?;
        Ok(CouponQuote {
            code: self.code.clone(),
            discount_type: self.discount_type,
            discount_value: self.discount_value,
            order_amount,
            discount,
            final_amount: order_amount - discount,
        })
    }

    /// Counts one use of the coupon against its limit.
    pub fn record_redemption(&mut self, now: DateTime<Utc>) -> Result<DomainEvent, CouponError> {
        if self.is_exhausted() { return Err(CouponError::UsageExceeded); }
        self.usage_count = self.usage_count.checked_add(1).ok_or(CouponError::UsageExceeded)?;
        self.updated_at = now;
        Ok(DomainEvent::Coupon(CouponEvent::Redeemed { code: self.code.clone(), usage_count: self.usage_count }))
    }

    pub fn toggle(&mut self, now: DateTime<Utc>) { self.is_active = !self.is_active; self.updated_at = now; }
}

/// Validates `coupon` (the result of looking the code up) against an order amount.
pub fn validate_coupon(coupon: Option<&Coupon>, order_amount: Decimal, now: DateTime<Utc>) -> Result<CouponQuote, CouponError> {
    if order_amount < Decimal::ZERO { return Err(CouponError::InvalidAmount); }
    coupon.ok_or(CouponError::NotFound)?.quote(order_amount, now)
}

fn check_definition(draft: &CouponDraft) -> Result<(), CouponError> {
    match draft.discount_type {
        DiscountType::Percentage if draft.discount_value <= Decimal::ZERO || draft.discount_value > Decimal::ONE_HUNDRED => {
            return Err(CouponError::InvalidDefinition("percentage must be greater than 0 and at most 100"));
        }
        DiscountType::Fixed if draft.discount_value <= Decimal::ZERO => {
            return Err(CouponError::InvalidDefinition("fixed discount must be greater than 0"));
        }
        _ => {}
    }
    if draft.min_purchase_amount < Decimal::ZERO {
        return Err(CouponError::InvalidDefinition("minimum purchase amount must not be negative"));
    }
    if draft.max_discount_amount.is_some_and(|cap| cap <= Decimal::ZERO) {
        return Err(CouponError::InvalidDefinition("maximum discount must be greater than 0"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn draft(discount_type: DiscountType, value: i64) -> CouponDraft {
        CouponDraft {
            code: CouponCode::new("TILE20").unwrap(), description: None, discount_type,
            discount_value: Decimal::from(value), min_purchase_amount: Decimal::ZERO, max_discount_amount: None,
            usage_limit: None, per_user_limit: None, expiry_date: Utc::now() + Duration::days(30), is_active: true,
        }
    }

    fn coupon(discount_type: DiscountType, value: i64) -> Coupon {
        Coupon::create(draft(discount_type, value), Utc::now()).unwrap()
    }

    #[test]
    fn test_percentage_discount_is_capped() {
        let mut c = coupon(DiscountType::Percentage, 20);
        c.max_discount_amount = Some(Decimal::from(500));
        let quote = c.quote(Decimal::from(5000), Utc::now()).unwrap();
        assert_eq!(quote.discount, Decimal::from(500));
        assert_eq!(quote.final_amount, Decimal::from(4500));
    }

    #[test]
    fn test_fixed_discount_never_exceeds_amount() {
        let c = coupon(DiscountType::Fixed, 300);
        let quote = c.quote(Decimal::from(200), Utc::now()).unwrap();
        assert_eq!(quote.discount, Decimal::from(200));
        assert_eq!(quote.final_amount, Decimal::ZERO);
    }

    #[test]
    fn test_discount_bounded_for_many_amounts() {
        let now = Utc::now();
        let coupons = [coupon(DiscountType::Percentage, 100), coupon(DiscountType::Percentage, 15), coupon(DiscountType::Fixed, 999)];
        for c in &coupons {
            for amount in [0_i64, 1, 99, 500, 998, 999, 1000, 25_000] {
                let amount = Decimal::from(amount);
                let quote = c.quote(amount, now).unwrap();
                assert!(quote.discount >= Decimal::ZERO && quote.discount <= amount);
                assert_eq!(quote.final_amount, amount - quote.discount);
                assert!(quote.final_amount >= Decimal::ZERO);
            }
        }
    }

    #[test]
    fn test_minimum_purchase_gate() {
        let mut c = coupon(DiscountType::Fixed, 100);
        c.min_purchase_amount = Decimal::from(1000);
        assert_eq!(
            c.quote(Decimal::from(999), Utc::now()),
            Err(CouponError::MinimumNotMet { minimum: Decimal::from(1000) })
        );
        assert!(c.quote(Decimal::from(1000), Utc::now()).is_ok());
    }

    #[test]
    fn test_rejections_in_order() {
        let now = Utc::now();
        assert_eq!(validate_coupon(None, Decimal::from(10), now), Err(CouponError::NotFound));

        let mut c = coupon(DiscountType::Fixed, 100);
        c.is_active = false;
        assert_eq!(c.quote(Decimal::from(10), now), Err(CouponError::NotFound));

        c.is_active = true;
        c.expiry_date = now - Duration::seconds(1);
        assert_eq!(c.quote(Decimal::from(10), now), Err(CouponError::Expired));

        c.expiry_date = now + Duration::days(1);
        c.usage_limit = Some(3);
        c.usage_count = 3;
        assert_eq!(c.quote(Decimal::from(10), now), Err(CouponError::UsageExceeded));
        assert_eq!(c.quote(Decimal::from(-1), now), Err(CouponError::InvalidAmount));
    }

    #[test]
    fn test_redemption_respects_limit() {
        let mut c = coupon(DiscountType::Fixed, 100);
        c.usage_limit = Some(1);
        assert!(c.record_redemption(Utc::now()).is_ok());
        assert_eq!(c.usage_count, 1);
        assert_eq!(c.record_redemption(Utc::now()), Err(CouponError::UsageExceeded));
    }

    #[test]
    fn test_oversized_amount_is_invalid() {
        let now = Utc::now();
        let huge = Decimal::from_str_exact("70000000000000000000000000000").unwrap();
        assert_eq!(coupon(DiscountType::Percentage, 20).quote(huge, now), Err(CouponError::InvalidAmount));
        assert_eq!(coupon(DiscountType::Fixed, 100).quote(huge, now).unwrap().discount, Decimal::from(100));
    }

    #[test]
    fn test_unlimited_redemptions_stop_at_counter_max() {
        let mut c = coupon(DiscountType::Fixed, 100);
        c.usage_count = u32::MAX;
        assert_eq!(c.record_redemption(Utc::now()), Err(CouponError::UsageExceeded));
        assert_eq!(c.usage_count, u32::MAX);
    }

    #[test]
    fn test_definition_checks() {
        assert!(Coupon::create(draft(DiscountType::Percentage, 0), Utc::now()).is_err());
        assert!(Coupon::create(draft(DiscountType::Percentage, 101), Utc::now()).is_err());
        assert!(Coupon::create(draft(DiscountType::Percentage, 100), Utc::now()).is_ok());
        assert!(Coupon::create(draft(DiscountType::Fixed, 0), Utc::now()).is_err());

        let mut c = coupon(DiscountType::Fixed, 50);
        let mut renamed = draft(DiscountType::Fixed, 50);
        renamed.code = CouponCode::new("OTHER").unwrap();
        assert!(c.apply(renamed, Utc::now()).is_err());
    }
}
