//! Service configuration from the environment

use chrono::Duration;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::pricing::PricingPolicy;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid {var} value '{value}': {reason}")]
    Invalid { var: &'static str, value: String, reason: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Postgres connection string; without one the service keeps everything in memory.
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    pub admin_token: Option<String>,
    pub cart_ttl: Duration,
    pub pricing: PricingPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8083,
            database_url: None,
            nats_url: None,
            admin_token: None,
            cart_ttl: Duration::hours(72),
            pricing: PricingPolicy::default(),
        }
    }
}

impl AppConfig {
    /// Reads the process environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let cart_ttl_hours: i64 = parse(&get, "CART_TTL_HOURS")?.unwrap_or(72);
        if cart_ttl_hours <= 0 {
            return Err(invalid("CART_TTL_HOURS", cart_ttl_hours.to_string(), "must be positive"));
        }
        let pricing = PricingPolicy {
            tax_rate: parse(&get, "TAX_RATE")?.unwrap_or(defaults.pricing.tax_rate),
            free_shipping_above: parse(&get, "FREE_SHIPPING_ABOVE")?.unwrap_or(defaults.pricing.free_shipping_above),
            shipping_fee: parse(&get, "SHIPPING_FEE")?.unwrap_or(defaults.pricing.shipping_fee),
        };
        if pricing.tax_rate < Decimal::ZERO || pricing.tax_rate >= Decimal::ONE {
            return Err(invalid("TAX_RATE", pricing.tax_rate.to_string(), "must be a fraction between 0 and 1"));
        }

        Ok(Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse(&get, "PORT")?.unwrap_or(defaults.port),
            database_url: get("DATABASE_URL"),
            nats_url: get("NATS_URL"),
            admin_token: get("ADMIN_TOKEN"),
            cart_ttl: Duration::hours(cart_ttl_hours),
            pricing,
        })
    }

    pub fn bind_addr(&self) -> String { format!("{}:{}", self.host, self.port) }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(var).map(|value| value.parse::<T>().map_err(|e| invalid(var, value.clone(), &e.to_string()))).transpose()
}

fn invalid(var: &'static str, value: String, reason: &str) -> ConfigError {
    ConfigError::Invalid { var, value, reason: reason.to_string() }
}
