//! Public catalog reads. Only active records are visible.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use tracing::instrument;

use crate::api::admin::record;
use crate::api::{ApiError, AppState};
use crate::contracts::PageResponse;
use crate::domain::aggregates::{Blog, Brand, Product};
use crate::listing::ListQuery;
use crate::store::Resource;
use crate::CommerceError;

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list::<Product>))
        .route("/products/:id", get(show::<Product>))
        .route("/brands", get(list::<Brand>))
        .route("/blogs", get(list::<Blog>))
        .route("/blogs/:id", get(show::<Blog>))
}

/// Visibility flag shared by the public resources.
trait Published: Resource {
    fn is_visible(&self) -> bool;
}

impl Published for Product {
    fn is_visible(&self) -> bool { self.is_active }
}

impl Published for Brand {
    fn is_visible(&self) -> bool { self.is_active }
}

impl Published for Blog {
    fn is_visible(&self) -> bool { self.is_active }
}

#[instrument(skip(state), fields(kind = T::KIND))]
async fn list<T: Published>(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Result<Json<PageResponse<T>>, ApiError> {
    let page = state.store.collection::<T>().list(&query.published()).await?;
    Ok(Json(PageResponse { success: true, page }))
}

#[instrument(skip(state), fields(kind = T::KIND))]
async fn show<T: Published>(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    match state.store.collection::<T>().get(&id).await? {
        Some(item) if item.is_visible() => record(&item),
        _ => Err(CommerceError::NotFound(T::KIND).into()),
    }
}
