use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::api::extract::CurrentUser;
use crate::api::{ApiError, AppState};
use crate::contracts::{NewOrderRequest, OrderResponse, PageResponse, StatusUpdate, StatusUpdateResponse};
use crate::domain::aggregates::{validate_coupon, Coupon, Order, OrderItem, OrderStatus, Product, Variant};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::CouponCode;
use crate::listing::ListQuery;
use crate::store::{FieldEq, Resource, Tracked, Write};
use crate::CommerceError;

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/order/new", post(create_order))
        .route("/order/:id", get(get_order))
        .route("/orders/me", get(my_orders))
}

pub(crate) fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/order/:id", get(admin_get_order).put(update_status))
}

/// Attempts before a contended order is turned away.
const COMMIT_ATTEMPTS: usize = 8;

/// Commits an order: reprices every line from the catalog, takes the stock,
/// redeems the coupon and stores the order, all in one atomic write.
#[instrument(skip(state, user, req), fields(user = %user.0))]
async fn create_order(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<NewOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    if req.order_items.is_empty() {
        return Err(ApiError::Validation("No order items".into()));
    }
    req.shipping_info.validate()?;
    if !req.payment_info.method.is_complete() {
        return Err(ApiError::Validation("Please provide your UPI ID".into()));
    }
    if let Some(line) = req.order_items.iter().find(|line| line.quantity == 0) {
        return Err(ApiError::Validation(format!("Invalid quantity for {}", line.name)));
    }

    for attempt in 1..=COMMIT_ATTEMPTS {
        let Some((mut order, mut events)) = try_place(&state, &user.0, &req).await? else {
            tracing::debug!(attempt, "order lost a race on stock or coupon, retrying");
            continue;
        };
        tracing::info!(order_id = %order.id, total = %order.total_price, status = ?order.status(), "order placed");
        events.extend(order.take_events());
        state.events.publish(events).await;
        return Ok((StatusCode::CREATED, Json(OrderResponse { success: true, order })));
    }
    tracing::warn!(attempts = COMMIT_ATTEMPTS, "order abandoned under contention");
    Err(ApiError::Conflict("Too many orders at once, please try again".into()))
}

/// One read-check-write pass. `None` when another request changed a product
/// or the coupon in between.
async fn try_place(state: &AppState, user: &str, req: &NewOrderRequest) -> Result<Option<(Order, Vec<DomainEvent>)>, ApiError> {
    let now = Utc::now();
    let catalog = state.store.collection::<Product>();
    let mut products: BTreeMap<String, Tracked<Product>> = BTreeMap::new();
    let mut items = Vec::with_capacity(req.order_items.len());
    let mut events = Vec::new();
    for line in &req.order_items {
        if !products.contains_key(&line.product) {
            let tracked = catalog.track(&line.product).await?.ok_or(CommerceError::NotFound(Product::KIND))?;
            products.insert(line.product.clone(), tracked);
        }
        let Some(product) = products.get_mut(&line.product).map(|t| &mut t.item) else { continue };
        let variant = Variant { size: line.size.clone(), color: line.color.clone() };
        let price = product.price_of(&variant)?;
        events.push(product.remove_inventory(&variant, line.quantity, now)?);
        items.push(OrderItem {
            product: product.id.clone(), name: product.name.clone(), price, quantity: line.quantity,
            image: line.image.clone().or_else(|| product.images.first().cloned()),
            size: variant.size, color: variant.color,
        });
    }

    let breakdown = state.pricing.price(items.iter().map(|i| (i.price, i.quantity)))?;
    let mut coupon = None;
    let quote = match req.coupon_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(raw) => {
            let code = CouponCode::new(raw)?;
            let mut found = state.store.collection::<Coupon>().track(code.as_str()).await?;
            let quote = validate_coupon(found.as_ref().map(|t| &t.item), breakdown.total_amount, now)?;
            if let Some(tracked) = found.as_mut() { events.push(tracked.item.record_redemption(now)?); }
            coupon = found;
            Some(quote)
        }
        None => None,
    };

    let charged = breakdown.charged(quote.as_ref());
    if charged != req.total_price {
        tracing::warn!(%charged, submitted = %req.total_price, "order total mismatch");
        return Err(ApiError::Rejected("Prices have changed, please review your cart".into()));
    }

    let order = Order::place(
        Uuid::now_v7().to_string(), user, items, req.shipping_info.clone(), req.payment_info.clone(), breakdown,
        quote.as_ref(), now,
    );
    let mut writes = products.values().map(Write::replace).collect::<Result<Vec<_>, _>>()?;
    if let Some(coupon) = &coupon {
        writes.push(Write::replace(coupon)?);
    }
    writes.push(Write::insert(&order)?);
    match state.store.documents.commit(writes).await {
        Ok(()) => Ok(Some((order, events))),
        Err(CommerceError::Stale(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[instrument(skip(state))]
async fn get_order(State(state): State<AppState>, user: CurrentUser, Path(id): Path<String>) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.store.collection::<Order>().find(&id).await?;
    if order.user != user.0 {
        return Err(ApiError::NotFound("Order not found".into()));
    }
    Ok(Json(OrderResponse { success: true, order }))
}

#[instrument(skip(state))]
async fn my_orders(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<PageResponse<Order>>, ApiError> {
    let page = state.store.collection::<Order>().list_where(&query, Some(FieldEq { field: "user", value: &user.0 })).await?;
    Ok(Json(PageResponse { success: true, page }))
}

#[derive(Debug, Default, Deserialize)]
struct OrderFilter {
    status: Option<OrderStatus>,
}

#[instrument(skip(state))]
async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<OrderFilter>,
) -> Result<Json<PageResponse<Order>>, ApiError> {
    let status = filter.status.map(serde_json::to_value).transpose()?;
    let status = status.as_ref().and_then(|s| s.as_str());
    let page = state
        .store
        .collection::<Order>()
        .list_where(&query, status.map(|value| FieldEq { field: "orderStatus", value }))
        .await?;
    Ok(Json(PageResponse { success: true, page }))
}

#[instrument(skip(state))]
async fn admin_get_order(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.store.collection::<Order>().find(&id).await?;
    Ok(Json(OrderResponse { success: true, order }))
}

#[instrument(skip(state, body))]
async fn update_status(
    State(state): State<AppState>,
    admin: Option<CurrentUser>,
    Path(id): Path<String>,
    Json(body): Json<StatusUpdate>,
) -> Result<Json<StatusUpdateResponse>, ApiError> {
    let orders = state.store.collection::<Order>();
    let mut order = orders.find(&id).await?;
    let from = order.status();
    let updated_by = admin.map_or_else(|| "admin".to_string(), |a| a.0);
    let note = body.note.filter(|n| !n.trim().is_empty());
    order.transition(body.status, note, Some(updated_by), Utc::now()).inspect_err(|e| {
        tracing::warn!(order_id = %id, ?from, to = ?body.status, reason = %e, "status change rejected");
    })?;
    orders.save(&order).await?;
    state.events.publish(order.take_events()).await;
    Ok(Json(StatusUpdateResponse {
        success: true,
        message: format!("Order status updated to {:?}", order.status()),
        order,
    }))
}
