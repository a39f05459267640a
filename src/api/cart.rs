use axum::extract::{Path, State};
use axum::routing::{get, put};
use axum::{Extension, Json, Router};
use tracing::instrument;
use validator::Validate;

use crate::api::extract::CurrentUser;
use crate::api::{ApiError, AppState};
use crate::contracts::{ItemResponse, ItemsResponse, MessageResponse, QuantityUpdate};
use crate::domain::aggregates::{ListKind, NewLine, Owner};

/// Routes for one list kind; the kind reaches handlers as an extension.
pub(crate) fn routes(kind: ListKind) -> Router<AppState> {
    Router::new()
        .route("/:owner", get(lines).post(add).delete(clear))
        .route("/:owner/:item", put(set_quantity).delete(remove))
        .layer(Extension(kind))
}

/// A `user:` list is only reachable by that user; session and guest lists
/// are open to whoever holds the key.
fn resolve_owner(raw: &str, caller: Option<&CurrentUser>) -> Result<Owner, ApiError> {
    let owner: Owner = raw.parse()?;
    if let Owner::User(id) = &owner {
        match caller {
            None => return Err(ApiError::Unauthorized("Please login to access this resource".into())),
            Some(user) if &user.0 != id => return Err(ApiError::Forbidden("Not allowed to access this list".into())),
            Some(_) => {}
        }
    }
    Ok(owner)
}

#[instrument(skip(state))]
async fn lines(
    State(state): State<AppState>,
    Extension(kind): Extension<ListKind>,
    caller: Option<CurrentUser>,
    Path(owner): Path<String>,
) -> Result<Json<ItemsResponse>, ApiError> {
    let owner = resolve_owner(&owner, caller.as_ref())?;
    let items = state.store.carts.lines(kind, &owner).await?;
    Ok(Json(ItemsResponse { success: true, items }))
}

#[instrument(skip(state, line))]
async fn add(
    State(state): State<AppState>,
    Extension(kind): Extension<ListKind>,
    caller: Option<CurrentUser>,
    Path(owner): Path<String>,
    Json(line): Json<NewLine>,
) -> Result<Json<ItemResponse>, ApiError> {
    let owner = resolve_owner(&owner, caller.as_ref())?;
    line.validate()?;
    let item = state.store.carts.add(kind, &owner, line).await?;
    tracing::debug!(list = kind.as_str(), %owner, product = %item.product_id, quantity = item.quantity, "item added");
    Ok(Json(ItemResponse { success: true, item: Some(item) }))
}

#[instrument(skip(state))]
async fn set_quantity(
    State(state): State<AppState>,
    Extension(kind): Extension<ListKind>,
    caller: Option<CurrentUser>,
    Path((owner, item)): Path<(String, String)>,
    Json(update): Json<QuantityUpdate>,
) -> Result<Json<ItemResponse>, ApiError> {
    let owner = resolve_owner(&owner, caller.as_ref())?;
    update.validate()?;
    let item = state.store.carts.set_quantity(kind, &owner, &item, update.quantity).await?;
    Ok(Json(ItemResponse { success: true, item }))
}

#[instrument(skip(state))]
async fn remove(
    State(state): State<AppState>,
    Extension(kind): Extension<ListKind>,
    caller: Option<CurrentUser>,
    Path((owner, item)): Path<(String, String)>,
) -> Result<Json<MessageResponse>, ApiError> {
    let owner = resolve_owner(&owner, caller.as_ref())?;
    if !state.store.carts.remove(kind, &owner, &item).await? {
        return Err(ApiError::NotFound("Item not found".into()));
    }
    Ok(Json(MessageResponse { success: true, message: "Item removed".into() }))
}

#[instrument(skip(state))]
async fn clear(
    State(state): State<AppState>,
    Extension(kind): Extension<ListKind>,
    caller: Option<CurrentUser>,
    Path(owner): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let owner = resolve_owner(&owner, caller.as_ref())?;
    state.store.carts.clear(kind, &owner).await?;
    Ok(Json(MessageResponse { success: true, message: format!("{} cleared", capitalize(kind)) }))
}

fn capitalize(kind: ListKind) -> &'static str {
    match kind { ListKind::Cart => "Cart", ListKind::Wishlist => "Wishlist" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_lists_need_matching_caller() {
        let alice = CurrentUser("alice".into());
        assert_eq!(resolve_owner("user:alice", Some(&alice)).unwrap(), Owner::User("alice".into()));
        assert!(matches!(resolve_owner("user:bob", Some(&alice)), Err(ApiError::Forbidden(_))));
        assert!(matches!(resolve_owner("user:alice", None), Err(ApiError::Unauthorized(_))));
        assert_eq!(resolve_owner("session:s1", None).unwrap(), Owner::Session("s1".into()));
        assert!(matches!(resolve_owner("nobody", None), Err(ApiError::Validation(_))));
    }
}
