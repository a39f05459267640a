//! Storefront client
//!
//! Typed calls against the service's JSON contracts. Non-2xx answers become
//! [`ClientError`]s carrying the server's message verbatim.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::checkout::OrderGateway;
use crate::contracts::{
    CategoryTreeResponse, CouponValidation, ErrorBody, ItemResponse, ItemsResponse, MessageResponse, NewOrderRequest,
    OrderResponse, PageResponse, QuantityUpdate, StatusUpdate, StatusUpdateResponse, ValidateCouponRequest,
};
use crate::domain::aggregates::{CartLine, CategoryNode, CouponQuote, ListKind, NewLine, Order, OrderStatus, Owner};
use crate::listing::{ListQuery, Page};
use crate::store::Resource;
use crate::sync::RemoteItems;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Maps a failed response onto the error taxonomy.
    pub fn classify(status: StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorBody>(body)
            .map(|b| b.message)
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("Request failed").to_string());
        match status {
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Self::Validation(message),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Unauthorized(message),
            StatusCode::NOT_FOUND => Self::NotFound(message),
            other => Self::Rejected { status: other.as_u16(), message },
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Clone, Debug)]
pub struct StorefrontClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    user: Option<String>,
}

impl StorefrontClient {
    /// `base_url` is the API root, e.g. `http://localhost:8083/api/v1`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("tilestore/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http, base_url: base_url.into().trim_end_matches('/').to_string(), token: None, user: None }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self { self.token = Some(token.into()); self }
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self { self.user = Some(user_id.into()); self }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut req = self.http.request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = &self.token { req = req.bearer_auth(token); }
        if let Some(user) = &self.user { req = req.header("X-User-Id", user); }
        req
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        let response = req.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            debug!(%status, %body, "request rejected");
            return Err(ClientError::classify(status, &body));
        }
        serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn record<T: Resource>(&self, req: RequestBuilder) -> Result<T> {
        let mut body: Value = self.send(req).await?;
        let record = body.get_mut(T::KIND).map(Value::take).ok_or_else(|| ClientError::Decode(format!("missing '{}'", T::KIND)))?;
        serde_json::from_value(record).map_err(|e| ClientError::Decode(e.to_string()))
    }

    pub async fn health(&self) -> Result<Value> { self.send(self.request(Method::GET, "/health")).await }

    // ---- coupons & orders ----

    pub async fn validate_coupon(&self, code: &str, order_amount: Decimal) -> Result<CouponQuote> {
        let body = ValidateCouponRequest { code: code.to_string(), order_amount };
        let res: CouponValidation = self.send(self.request(Method::POST, "/coupons/validate").json(&body)).await?;
        Ok(res.coupon)
    }

    pub async fn create_order(&self, order: &NewOrderRequest) -> Result<Order> {
        let res: OrderResponse = self.send(self.request(Method::POST, "/order/new").json(order)).await?;
        Ok(res.order)
    }

    pub async fn order(&self, id: &str) -> Result<Order> {
        let res: OrderResponse = self.send(self.request(Method::GET, &format!("/order/{id}"))).await?;
        Ok(res.order)
    }

    pub async fn my_orders(&self, query: &ListQuery) -> Result<Page<Order>> {
        let res: PageResponse<Order> = self.send(self.request(Method::GET, "/orders/me").query(query)).await?;
        Ok(res.page)
    }

    pub async fn admin_orders(&self, query: &ListQuery, status: Option<OrderStatus>) -> Result<Page<Order>> {
        let mut req = self.request(Method::GET, "/admin/orders").query(query);
        if let Some(status) = status { req = req.query(&[("status", format!("{status:?}"))]); }
        let res: PageResponse<Order> = self.send(req).await?;
        Ok(res.page)
    }

    pub async fn update_order_status(&self, id: &str, status: OrderStatus, note: Option<String>) -> Result<StatusUpdateResponse> {
        let body = StatusUpdate { status, note };
        self.send(self.request(Method::PUT, &format!("/admin/order/{id}")).json(&body)).await
    }

    // ---- catalog ----

    /// Active category tree.
    pub async fn categories(&self) -> Result<Vec<CategoryNode>> {
        let res: CategoryTreeResponse = self.send(self.request(Method::GET, "/categories")).await?;
        Ok(res.categories)
    }

    /// Whole category tree, inactive nodes included.
    pub async fn admin_categories(&self) -> Result<Vec<CategoryNode>> {
        let res: CategoryTreeResponse = self.send(self.request(Method::GET, "/admin/categories")).await?;
        Ok(res.categories)
    }

    /// Public listing of active `T` (products, brands, blogs).
    pub async fn browse<T: Resource>(&self, query: &ListQuery) -> Result<Page<T>> {
        let res: PageResponse<T> = self.send(self.request(Method::GET, &format!("/{}", T::PLURAL)).query(query)).await?;
        Ok(res.page)
    }

    pub async fn view<T: Resource>(&self, id: &str) -> Result<T> {
        self.record(self.request(Method::GET, &format!("/{}/{id}", T::PLURAL))).await
    }

    // ---- back office ----

    pub async fn list<T: Resource>(&self, query: &ListQuery) -> Result<Page<T>> {
        let res: PageResponse<T> = self.send(self.request(Method::GET, &format!("/admin/{}", T::PLURAL)).query(query)).await?;
        Ok(res.page)
    }

    pub async fn get<T: Resource>(&self, id: &str) -> Result<T> {
        self.record(self.request(Method::GET, &format!("/admin/{}/{id}", T::KIND))).await
    }

    pub async fn create<T: Resource, D: Serialize + Sync>(&self, draft: &D) -> Result<T> {
        self.record(self.request(Method::POST, &format!("/admin/{}", T::KIND)).json(draft)).await
    }

    pub async fn update<T: Resource, D: Serialize + Sync>(&self, id: &str, draft: &D) -> Result<T> {
        self.record(self.request(Method::PUT, &format!("/admin/{}/{id}", T::KIND)).json(draft)).await
    }

    pub async fn delete<T: Resource>(&self, id: &str) -> Result<String> {
        let res: MessageResponse = self.send(self.request(Method::DELETE, &format!("/admin/{}/{id}", T::KIND))).await?;
        Ok(res.message)
    }

    pub async fn toggle<T: Resource>(&self, id: &str) -> Result<T> {
        self.record(self.request(Method::PATCH, &format!("/admin/{}/{id}/toggle", T::KIND))).await
    }

    // ---- cart & wishlist ----

    fn list_path(list: ListKind, owner: &Owner) -> String { format!("/{}/{owner}", list.as_str()) }

    pub async fn items(&self, list: ListKind, owner: &Owner) -> Result<Vec<CartLine>> {
        let res: ItemsResponse = self.send(self.request(Method::GET, &Self::list_path(list, owner))).await?;
        Ok(res.items)
    }

    pub async fn add_item(&self, list: ListKind, owner: &Owner, line: &NewLine) -> Result<CartLine> {
        let res: ItemResponse = self.send(self.request(Method::POST, &Self::list_path(list, owner)).json(line)).await?;
        res.item.ok_or_else(|| ClientError::Decode("missing 'item'".into()))
    }

    pub async fn update_item(&self, list: ListKind, owner: &Owner, id: &str, quantity: u32) -> Result<Option<CartLine>> {
        let path = format!("{}/{id}", Self::list_path(list, owner));
        let res: ItemResponse = self.send(self.request(Method::PUT, &path).json(&QuantityUpdate { quantity })).await?;
        Ok(res.item)
    }

    pub async fn remove_item(&self, list: ListKind, owner: &Owner, id: &str) -> Result<()> {
        let path = format!("{}/{id}", Self::list_path(list, owner));
        let _: MessageResponse = self.send(self.request(Method::DELETE, &path)).await?;
        Ok(())
    }

    pub async fn clear_items(&self, list: ListKind, owner: &Owner) -> Result<()> {
        let _: MessageResponse = self.send(self.request(Method::DELETE, &Self::list_path(list, owner))).await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteItems for StorefrontClient {
    async fn fetch(&self, list: ListKind, owner: &Owner) -> Result<Vec<CartLine>> { self.items(list, owner).await }
    async fn add(&self, list: ListKind, owner: &Owner, line: NewLine) -> Result<CartLine> { self.add_item(list, owner, &line).await }
    async fn set_quantity(&self, list: ListKind, owner: &Owner, id: &str, quantity: u32) -> Result<Option<CartLine>> {
        self.update_item(list, owner, id, quantity).await
    }
    async fn remove(&self, list: ListKind, owner: &Owner, id: &str) -> Result<()> { self.remove_item(list, owner, id).await }
    async fn clear(&self, list: ListKind, owner: &Owner) -> Result<()> { self.clear_items(list, owner).await }
}

#[async_trait]
impl OrderGateway for StorefrontClient {
    async fn validate_coupon(&self, code: &str, order_amount: Decimal) -> Result<CouponQuote> {
        StorefrontClient::validate_coupon(self, code, order_amount).await
    }
    async fn create_order(&self, order: &NewOrderRequest) -> Result<Order> { StorefrontClient::create_order(self, order).await }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_uses_server_message() {
        let body = r#"{"success":false,"message":"Minimum purchase amount of 1000 required"}"#;
        match ClientError::classify(StatusCode::BAD_REQUEST, body) {
            ClientError::Validation(m) => assert_eq!(m, "Minimum purchase amount of 1000 required"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(ClientError::classify(StatusCode::FORBIDDEN, "{}"), ClientError::Unauthorized(_)));
        assert!(matches!(ClientError::classify(StatusCode::NOT_FOUND, ""), ClientError::NotFound(m) if m == "Not Found"));
    }

    #[test]
    fn test_classify_other_statuses() {
        let err = ClientError::classify(StatusCode::CONFLICT, r#"{"success":false,"message":"coupon 'SAVE' already exists"}"#);
        assert!(matches!(err, ClientError::Rejected { status: 409, .. }));
        assert_eq!(err.to_string(), "coupon 'SAVE' already exists");
        let err = ClientError::classify(StatusCode::INTERNAL_SERVER_ERROR, "<html>");
        assert_eq!(err.to_string(), "Internal Server Error");
    }

    #[test]
    fn test_base_url_is_trimmed() {
        let client = StorefrontClient::new("http://localhost:8083/api/v1/");
        assert_eq!(client.base_url, "http://localhost:8083/api/v1");
        assert_eq!(StorefrontClient::list_path(ListKind::Wishlist, &Owner::User("7".into())), "/wishlist/user:7");
    }
}
