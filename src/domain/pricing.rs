//! Checkout pricing: item subtotal, GST, shipping and the coupon-adjusted charge.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::aggregates::CouponQuote;
use crate::domain::value_objects::round_money;

/// Fees applied on top of the item subtotal.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingPolicy {
    /// GST as a fraction of the item subtotal.
    pub tax_rate: Decimal,
    /// Shipping is free when the item subtotal is strictly above this.
    pub free_shipping_above: Decimal,
    pub shipping_fee: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(18, 2),
            free_shipping_above: Decimal::from(5000),
            shipping_fee: Decimal::from(200),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    pub items_price: Decimal,
    pub tax_price: Decimal,
    pub shipping_price: Decimal,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Order amount is too large")]
pub struct AmountOverflow;

impl PricingPolicy {
    /// Prices `(unit price, quantity)` lines.
    pub fn price<I>(&self, lines: I) -> Result<PriceBreakdown, AmountOverflow>
    where
        I: IntoIterator<Item = (Decimal, u32)>,
    {
        let items_price = lines.into_iter().try_fold(Decimal::ZERO, |sum, (price, qty)| {
            price.checked_mul(Decimal::from(qty)).and_then(|line| sum.checked_add(line))
        });
        let items_price = round_money(items_price.ok_or(AmountOverflow)?);
        let tax_price = round_money(items_price.checked_mul(self.tax_rate).ok_or(AmountOverflow)?);
        let shipping_price = if items_price > self.free_shipping_above { Decimal::ZERO } else { self.shipping_fee };
        let total_amount = items_price
            .checked_add(tax_price)
            .and_then(|sum| sum.checked_add(shipping_price))
            .ok_or(AmountOverflow)?;
        Ok(PriceBreakdown { items_price, tax_price, shipping_price, total_amount })
    }
}

impl PriceBreakdown {
    /// Amount actually charged: a coupon's final amount supersedes the total.
    pub fn charged(&self, coupon: Option<&CouponQuote>) -> Decimal {
        coupon.map_or(self.total_amount, |quote| quote.final_amount)
    }

    /// Whether `quote` was computed for this breakdown's total.
    pub fn matches(&self, quote: &CouponQuote) -> bool { quote.order_amount == self.total_amount }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_free_shipping_threshold() {
        let b = PricingPolicy::default().price([(Decimal::from(1000), 2)]).unwrap();
        assert_eq!(b.items_price, Decimal::from(2000));
        assert_eq!(b.tax_price, Decimal::from(360));
        assert_eq!(b.shipping_price, Decimal::from(200));
        assert_eq!(b.total_amount, Decimal::from(2560));
    }

    #[test]
    fn test_threshold_is_strict() {
        let policy = PricingPolicy::default();
        assert_eq!(policy.price([(Decimal::from(5000), 1)]).unwrap().shipping_price, Decimal::from(200));
        assert_eq!(policy.price([(Decimal::new(500001, 2), 1)]).unwrap().shipping_price, Decimal::ZERO);
    }

    #[test]
    fn test_empty_cart_prices_shipping_only() {
        let b = PricingPolicy::default().price(std::iter::empty()).unwrap();
        assert_eq!(b.items_price, Decimal::ZERO);
        assert_eq!(b.total_amount, Decimal::from(200));
    }

    #[test]
    fn test_tax_rounded_to_paise() {
        let b = PricingPolicy::default().price([(Decimal::new(3333, 2), 1)]).unwrap();
        assert_eq!(b.tax_price, Decimal::new(600, 2));
    }

    #[test]
    fn test_overflowing_lines_are_refused() {
        let policy = PricingPolicy::default();
        assert_eq!(policy.price([(Decimal::MAX, 2)]), Err(AmountOverflow));
        assert_eq!(policy.price([(Decimal::MAX, 1), (Decimal::MAX, 1)]), Err(AmountOverflow));
        assert_eq!(policy.price([(Decimal::MAX, 1)]), Err(AmountOverflow));
    }
}
