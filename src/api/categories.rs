use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::api::{ApiError, AppState};
use crate::contracts::{CategoryTreeResponse, MessageResponse};
use crate::domain::aggregates::{Category, CategoryDraft, CategoryError, CategoryTree};
use crate::store::Collection;

pub(crate) fn routes() -> Router<AppState> {
    Router::new().route("/categories", get(active_tree))
}

pub(crate) fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/categories", get(full_tree))
        .route("/category", post(create))
        .route("/category/:id", put(update).delete(remove))
        .route("/category/:id/toggle", patch(toggle))
}

async fn load_tree(categories: &Collection<Category>) -> Result<CategoryTree, ApiError> {
    Ok(CategoryTree::build(categories.all().await?)?)
}

#[instrument(skip(state))]
async fn active_tree(State(state): State<AppState>) -> Result<Json<CategoryTreeResponse>, ApiError> {
    let tree = load_tree(&state.store.collection()).await?;
    Ok(Json(CategoryTreeResponse { success: true, categories: tree.active() }))
}

#[instrument(skip(state))]
async fn full_tree(State(state): State<AppState>) -> Result<Json<CategoryTreeResponse>, ApiError> {
    let tree = load_tree(&state.store.collection()).await?;
    Ok(Json(CategoryTreeResponse { success: true, categories: tree.into_roots() }))
}

#[instrument(skip(state, draft))]
async fn create(State(state): State<AppState>, Json(draft): Json<CategoryDraft>) -> Result<(StatusCode, Json<Value>), ApiError> {
    draft.validate()?;
    let categories = state.store.collection::<Category>();
    let tree = load_tree(&categories).await?;
    let parent = match draft.parent.as_deref() {
        Some(id) => Some(tree.get(id).ok_or(CategoryError::NotFound)?),
        None => None,
    };
    let category = Category::create(Uuid::now_v7().to_string(), draft, parent, Utc::now())?;
    categories.insert(&category).await?;
    tracing::info!(id = %category.id, level = ?category.level, "category created");
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "category": category }))))
}

#[instrument(skip(state, draft))]
async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(draft): Json<CategoryDraft>,
) -> Result<Json<Value>, ApiError> {
    draft.validate()?;
    let categories = state.store.collection::<Category>();
    let tree = load_tree(&categories).await?;
    let mut category = tree.get(&id).cloned().ok_or(CategoryError::NotFound)?;
    category.apply(draft, &tree, Utc::now())?;
    categories.save(&category).await?;
    Ok(Json(json!({ "success": true, "category": category })))
}

#[instrument(skip(state))]
async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<MessageResponse>, ApiError> {
    let categories = state.store.collection::<Category>();
    let tree = load_tree(&categories).await?;
    if tree.get(&id).is_none() { return Err(CategoryError::NotFound.into()); }
    if tree.has_children(&id) { return Err(CategoryError::HasChildren.into()); }
    categories.delete(&id).await?;
    Ok(Json(MessageResponse { success: true, message: "Category deleted".into() }))
}

#[instrument(skip(state))]
async fn toggle(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let categories = state.store.collection::<Category>();
    let mut category = categories.get(&id).await?.ok_or(CategoryError::NotFound)?;
    category.toggle(Utc::now());
    categories.save(&category).await?;
    Ok(Json(json!({ "success": true, "category": category })))
}
