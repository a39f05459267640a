//! Storefront domain: aggregates, pricing rules, value objects and events.
pub mod aggregates;
pub mod events;
pub mod pricing;
pub mod value_objects;
