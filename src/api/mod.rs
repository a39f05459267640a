//! HTTP service
//!
//! axum router serving the storefront and back-office contracts under
//! `/api/v1`. Handlers are thin: they load aggregates from the [`Store`],
//! call into the domain and persist the result, then publish whatever domain
//! events the aggregates raised.

use axum::{middleware, routing::get, Json, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::domain::aggregates::{Blog, Brand, Coupon, Customer, ListKind, Product};
use crate::domain::events::DomainEvent;
use crate::domain::pricing::PricingPolicy;
use crate::store::Store;

mod admin;
mod cart;
mod catalog;
mod categories;
mod coupons;
pub mod error;
pub mod extract;
mod orders;

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub pricing: PricingPolicy,
    pub events: EventBus,
    /// Bearer token for `/admin` routes; `None` leaves them open.
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(store: Store, pricing: PricingPolicy) -> Self {
        Self { store, pricing, events: EventBus::default(), admin_token: None }
    }

    pub fn with_events(mut self, events: EventBus) -> Self { self.events = events; self }

    pub fn with_admin_token(mut self, token: Option<String>) -> Self {
        self.admin_token = token.filter(|t| !t.is_empty()).map(Arc::from);
        self
    }
}

/// Publishes domain events to NATS when connected. Events are always logged.
#[derive(Clone, Default)]
pub struct EventBus {
    nats: Option<async_nats::Client>,
}

impl EventBus {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    pub async fn publish(&self, events: Vec<DomainEvent>) {
        for event in events {
            let subject = event.subject();
            tracing::info!(%subject, ?event, "domain event");
            let Some(nats) = &self.nats else { continue };
            let payload = match serde_json::to_vec(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(%subject, error = %e, "could not encode event");
                    continue;
                }
            };
            if let Err(e) = nats.publish(subject.clone(), payload.into()).await {
                tracing::warn!(%subject, error = %e, "failed to publish event");
            }
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy", "service": "tilestore"}))
}

pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .merge(orders::admin_routes())
        .merge(categories::admin_routes())
        .merge(admin::routes::<Product>())
        .merge(admin::routes::<Brand>())
        .merge(admin::routes::<Coupon>())
        .merge(admin::routes::<Blog>())
        .merge(admin::routes::<Customer>())
        .route_layer(middleware::from_fn_with_state(state.clone(), extract::require_admin));

    let api = Router::new()
        .route("/health", get(health))
        .merge(coupons::routes())
        .merge(orders::routes())
        .merge(categories::routes())
        .merge(catalog::routes())
        .nest("/cart", cart::routes(ListKind::Cart))
        .nest("/wishlist", cart::routes(ListKind::Wishlist))
        .nest("/admin", admin);

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
