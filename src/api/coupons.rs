use axum::{extract::State, routing::post, Json, Router};
use chrono::Utc;
use tracing::instrument;

use crate::api::{ApiError, AppState};
use crate::contracts::{CouponValidation, ValidateCouponRequest};
use crate::domain::aggregates::{validate_coupon, Coupon};
use crate::domain::value_objects::CouponCode;

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/validate", post(validate))
        .route("/coupons/validate", post(validate))
}

/// Quotes a coupon against an order amount. Read-only: usage is only counted
/// when an order is placed.
#[instrument(skip(state))]
async fn validate(State(state): State<AppState>, Json(req): Json<ValidateCouponRequest>) -> Result<Json<CouponValidation>, ApiError> {
    if req.code.trim().is_empty() {
        return Err(ApiError::Validation("Please provide a coupon code".into()));
    }
    let coupon = match CouponCode::new(req.code.as_str()) {
        Ok(code) => state.store.collection::<Coupon>().get(code.as_str()).await?,
        Err(_) => None,
    };
    let quote = validate_coupon(coupon.as_ref(), req.order_amount, Utc::now()).inspect_err(|e| {
        tracing::info!(code = %req.code, reason = %e, "coupon rejected");
    })?;
    Ok(Json(CouponValidation { success: true, valid: true, coupon: quote }))
}
