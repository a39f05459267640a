//! Back-office CRUD shared by products, brands, coupons, blogs and customers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use uuid::Uuid;
use validator::Validate;

use crate::api::{ApiError, AppState};
use crate::contracts::{MessageResponse, PageResponse};
use crate::domain::aggregates::{
    Blog, BlogDraft, Brand, BrandDraft, Coupon, CouponDraft, Customer, CustomerDraft, Product, ProductDraft,
};
use crate::domain::value_objects::CouponCode;
use crate::listing::ListQuery;
use crate::store::Resource;

/// A resource the back office edits through a draft payload.
pub(crate) trait AdminResource: Resource {
    type Draft: DeserializeOwned + Validate + Send + 'static;

    fn create(draft: Self::Draft, now: DateTime<Utc>) -> Result<Self, ApiError>;
    fn apply(&mut self, draft: Self::Draft, now: DateTime<Utc>) -> Result<(), ApiError>;
    fn toggle(&mut self, now: DateTime<Utc>);

    /// Maps a path id onto the stored key.
    fn storage_id(id: String) -> String { id }
}

fn new_id() -> String { Uuid::now_v7().to_string() }

impl AdminResource for Product {
    type Draft = ProductDraft;
    fn create(draft: ProductDraft, now: DateTime<Utc>) -> Result<Self, ApiError> { Ok(Product::create(new_id(), draft, now)?) }
    fn apply(&mut self, draft: ProductDraft, now: DateTime<Utc>) -> Result<(), ApiError> { Ok(Product::apply(self, draft, now)?) }
    fn toggle(&mut self, now: DateTime<Utc>) { Product::toggle(self, now) }
}

impl AdminResource for Brand {
    type Draft = BrandDraft;
    fn create(draft: BrandDraft, now: DateTime<Utc>) -> Result<Self, ApiError> { Ok(Brand::create(new_id(), draft, now)) }
    fn apply(&mut self, draft: BrandDraft, now: DateTime<Utc>) -> Result<(), ApiError> { Brand::apply(self, draft, now); Ok(()) }
    fn toggle(&mut self, now: DateTime<Utc>) { Brand::toggle(self, now) }
}

impl AdminResource for Coupon {
    type Draft = CouponDraft;
    fn create(draft: CouponDraft, now: DateTime<Utc>) -> Result<Self, ApiError> { Ok(Coupon::create(draft, now)?) }
    fn apply(&mut self, draft: CouponDraft, now: DateTime<Utc>) -> Result<(), ApiError> { Ok(Coupon::apply(self, draft, now)?) }
    fn toggle(&mut self, now: DateTime<Utc>) { Coupon::toggle(self, now) }
    fn storage_id(id: String) -> String { CouponCode::new(id.as_str()).map_or(id, String::from) }
}

impl AdminResource for Blog {
    type Draft = BlogDraft;
    fn create(draft: BlogDraft, now: DateTime<Utc>) -> Result<Self, ApiError> { Ok(Blog::create(new_id(), draft, now)) }
    fn apply(&mut self, draft: BlogDraft, now: DateTime<Utc>) -> Result<(), ApiError> { Blog::apply(self, draft, now); Ok(()) }
    fn toggle(&mut self, now: DateTime<Utc>) { Blog::toggle(self, now) }
}

impl AdminResource for Customer {
    type Draft = CustomerDraft;
    fn create(draft: CustomerDraft, now: DateTime<Utc>) -> Result<Self, ApiError> { Ok(Customer::create(new_id(), draft, now)) }
    fn apply(&mut self, draft: CustomerDraft, now: DateTime<Utc>) -> Result<(), ApiError> { Customer::apply(self, draft, now); Ok(()) }
    fn toggle(&mut self, now: DateTime<Utc>) { Customer::toggle(self, now) }
}

/// `GET /{plural}`, `POST /{kind}`, `GET|PUT|DELETE /{kind}/:id` and `PATCH /{kind}/:id/toggle`.
pub(crate) fn routes<T: AdminResource>() -> Router<AppState> {
    Router::new()
        .route(&format!("/{}", T::PLURAL), get(list::<T>))
        .route(&format!("/{}", T::KIND), post(create::<T>))
        .route(&format!("/{}/:id", T::KIND), get(show::<T>).put(update::<T>).delete(remove::<T>))
        .route(&format!("/{}/:id/toggle", T::KIND), patch(toggle::<T>))
}

/// `{"success": true, "<kind>": record}`
pub(crate) fn record<T: Resource>(item: &T) -> Result<Json<Value>, ApiError> {
    let mut body = Map::new();
    body.insert("success".into(), Value::Bool(true));
    body.insert(T::KIND.into(), serde_json::to_value(item)?);
    Ok(Json(Value::Object(body)))
}

async fn list<T: AdminResource>(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Result<Json<PageResponse<T>>, ApiError> {
    let page = state.store.collection::<T>().list(&query).await?;
    Ok(Json(PageResponse { success: true, page }))
}

async fn show<T: AdminResource>(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    record(&state.store.collection::<T>().find(&T::storage_id(id)).await?)
}

async fn create<T: AdminResource>(State(state): State<AppState>, Json(draft): Json<T::Draft>) -> Result<(StatusCode, Json<Value>), ApiError> {
    draft.validate()?;
    let item = T::create(draft, Utc::now())?;
    state.store.collection::<T>().insert(&item).await?;
    tracing::info!(kind = T::KIND, id = item.id(), "created");
    Ok((StatusCode::CREATED, record(&item)?))
}

async fn update<T: AdminResource>(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(draft): Json<T::Draft>,
) -> Result<Json<Value>, ApiError> {
    draft.validate()?;
    let items = state.store.collection::<T>();
    let mut item = items.find(&T::storage_id(id)).await?;
    item.apply(draft, Utc::now())?;
    items.save(&item).await?;
    record(&item)
}

async fn remove<T: AdminResource>(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<MessageResponse>, ApiError> {
    let id = T::storage_id(id);
    if !state.store.collection::<T>().delete(&id).await? {
        return Err(crate::CommerceError::NotFound(T::KIND).into());
    }
    tracing::info!(kind = T::KIND, %id, "deleted");
    Ok(Json(MessageResponse { success: true, message: format!("{} deleted", T::KIND) }))
}

async fn toggle<T: AdminResource>(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let items = state.store.collection::<T>();
    let mut item = items.find(&T::storage_id(id)).await?;
    item.toggle(Utc::now());
    items.save(&item).await?;
    record(&item)
}
