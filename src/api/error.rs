//! Error responses
//!
//! Every failure renders as `{"success": false, "message": ...}` with the
//! status matching its class.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use validator::ValidationErrors;

use crate::contracts::ErrorBody;
use crate::domain::aggregates::{CartError, CategoryError, CouponError, ProductError, TransitionError};
use crate::domain::pricing::AmountOverflow;
use crate::domain::value_objects::CouponCodeError;
use crate::CommerceError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    /// A business rule turned the request down.
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Rejected(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            tracing::error!(%detail, "request failed");
        }
        (self.status(), Json(ErrorBody { success: false, message: self.to_string() })).into_response()
    }
}

impl From<CommerceError> for ApiError {
    fn from(e: CommerceError) -> Self {
        match e {
            CommerceError::NotFound(kind) => Self::NotFound(format!("{} not found", capitalize(kind))),
            CommerceError::Conflict(_) | CommerceError::Stale(_) => Self::Conflict(e.to_string()),
            CommerceError::StorageError(_) | CommerceError::Serialization(_) => Self::Internal(e.to_string()),
        }
    }
}

impl From<CouponError> for ApiError {
    fn from(e: CouponError) -> Self {
        match e {
            CouponError::NotFound => Self::NotFound(e.to_string()),
            CouponError::InvalidAmount | CouponError::InvalidDefinition(_) => Self::Validation(e.to_string()),
            CouponError::Expired | CouponError::MinimumNotMet { .. } | CouponError::UsageExceeded => Self::Rejected(e.to_string()),
        }
    }
}

impl From<CouponCodeError> for ApiError {
    fn from(e: CouponCodeError) -> Self { Self::Validation(format!("Invalid coupon code: {e}")) }
}

impl From<AmountOverflow> for ApiError {
    fn from(e: AmountOverflow) -> Self { Self::Validation(e.to_string()) }
}

impl From<TransitionError> for ApiError {
    fn from(e: TransitionError) -> Self { Self::Rejected(e.to_string()) }
}

impl From<CategoryError> for ApiError {
    fn from(e: CategoryError) -> Self {
        match e {
            CategoryError::NotFound => Self::NotFound(e.to_string()),
            CategoryError::HasChildren => Self::Conflict(e.to_string()),
            CategoryError::Orphan { .. } | CategoryError::LevelMismatch { .. } => Self::Internal(e.to_string()),
            CategoryError::TooDeep | CategoryError::SelfParent | CategoryError::Cycle(_) => Self::Rejected(e.to_string()),
        }
    }
}

impl From<CartError> for ApiError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::ItemNotFound => Self::NotFound(e.to_string()),
            CartError::InvalidQuantity | CartError::InvalidOwner(_) => Self::Validation(e.to_string()),
        }
    }
}

impl From<ProductError> for ApiError {
    fn from(e: ProductError) -> Self {
        match e {
            ProductError::MissingName | ProductError::InvalidPrice => Self::Validation(e.to_string()),
            _ => Self::Rejected(e.to_string()),
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| match &error.message {
                    Some(message) => message.to_string(),
                    None => format!("{field} is invalid"),
                })
            })
            .collect();
        messages.sort();
        Self::Validation(messages.join(", "))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self { Self::Internal(e.to_string()) }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
