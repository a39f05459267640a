//! Persistence
//!
//! Resources are stored as JSON documents keyed by `(kind, id)`; cart and
//! wishlist lines live in their own keyed table with an expiry. Both stores
//! have a Postgres and an in-memory implementation.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::domain::aggregates::{
    Blog, Brand, CartLine, Category, Coupon, Customer, ListKind, NewLine, Order, Owner, Product,
};
use crate::listing::{ListQuery, Page};
use crate::{CommerceError, Result};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryCartStore, MemoryDocumentStore};
pub use postgres::{PgCartStore, PgDocumentStore};

/// A document type kept in the [`DocumentStore`].
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Storage kind and singular name used in routes and response envelopes.
    const KIND: &'static str;
    /// Plural name used for list routes and envelopes.
    const PLURAL: &'static str;

    fn id(&self) -> &str;
}

impl Resource for Product {
    const KIND: &'static str = "product";
    const PLURAL: &'static str = "products";
    fn id(&self) -> &str { &self.id }
}

impl Resource for Category {
    const KIND: &'static str = "category";
    const PLURAL: &'static str = "categories";
    fn id(&self) -> &str { &self.id }
}

impl Resource for Brand {
    const KIND: &'static str = "brand";
    const PLURAL: &'static str = "brands";
    fn id(&self) -> &str { &self.id }
}

impl Resource for Coupon {
    const KIND: &'static str = "coupon";
    const PLURAL: &'static str = "coupons";
    fn id(&self) -> &str { self.code.as_str() }
}

impl Resource for Blog {
    const KIND: &'static str = "blog";
    const PLURAL: &'static str = "blogs";
    fn id(&self) -> &str { &self.id }
}

impl Resource for Customer {
    const KIND: &'static str = "customer";
    const PLURAL: &'static str = "customers";
    fn id(&self) -> &str { &self.id }
}

impl Resource for Order {
    const KIND: &'static str = "order";
    const PLURAL: &'static str = "orders";
    fn id(&self) -> &str { &self.id }
}

/// Restricts a listing to documents whose top-level string `field` equals `value`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldEq<'a> {
    pub field: &'static str,
    pub value: &'a str,
}

impl FieldEq<'_> {
    pub fn matches(&self, doc: &Value) -> bool { doc.get(self.field).and_then(Value::as_str) == Some(self.value) }
}

/// One write of an atomic [`DocumentStore::commit`].
#[derive(Clone, Debug, PartialEq)]
pub enum Write {
    Insert { kind: &'static str, id: String, body: Value },
    /// Replaces the document only while it still equals `expected`.
    Replace { kind: &'static str, id: String, expected: Value, body: Value },
}

impl Write {
    pub fn insert<T: Resource>(item: &T) -> Result<Self> {
        Ok(Self::Insert { kind: T::KIND, id: item.id().to_string(), body: serde_json::to_value(item)? })
    }

    pub fn replace<T: Resource>(tracked: &Tracked<T>) -> Result<Self> {
        Ok(Self::Replace {
            kind: T::KIND,
            id: tracked.item.id().to_string(),
            expected: tracked.snapshot.clone(),
            body: serde_json::to_value(&tracked.item)?,
        })
    }
}

/// A loaded document together with the stored body it was read from.
#[derive(Clone, Debug)]
pub struct Tracked<T> {
    pub item: T,
    snapshot: Value,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list(&self, kind: &'static str, query: &ListQuery, filter: Option<FieldEq<'_>>) -> Result<Page<Value>>;
    /// Every document of `kind`, for small collections walked whole (the category tree).
    async fn all(&self, kind: &'static str) -> Result<Vec<Value>>;
    async fn get(&self, kind: &'static str, id: &str) -> Result<Option<Value>>;
    /// Fails with [`CommerceError::Conflict`] when the id is taken.
    async fn insert(&self, kind: &'static str, id: &str, body: Value) -> Result<()>;
    /// Returns `false` when no such document exists.
    async fn update(&self, kind: &'static str, id: &str, body: Value) -> Result<bool>;
    async fn delete(&self, kind: &'static str, id: &str) -> Result<bool>;
    /// Applies every write or none. A `Replace` whose document moved on
    /// fails the batch with [`CommerceError::Stale`].
    async fn commit(&self, writes: Vec<Write>) -> Result<()>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn lines(&self, list: ListKind, owner: &Owner) -> Result<Vec<CartLine>>;
    /// Inserts a line or adds to the quantity of the existing line for the same product and variant.
    async fn add(&self, list: ListKind, owner: &Owner, line: NewLine) -> Result<CartLine>;
    /// Zero removes the line and returns `None`.
    async fn set_quantity(&self, list: ListKind, owner: &Owner, id: &str, quantity: u32) -> Result<Option<CartLine>>;
    async fn remove(&self, list: ListKind, owner: &Owner, id: &str) -> Result<bool>;
    async fn clear(&self, list: ListKind, owner: &Owner) -> Result<()>;
    /// Drops lists untouched for longer than the TTL. Returns how many lines went.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Typed view over one kind of document.
pub struct Collection<T> {
    store: Arc<dyn DocumentStore>,
    _kind: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self { Self { store: self.store.clone(), _kind: PhantomData } }
}

impl<T: Resource> Collection<T> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self { Self { store, _kind: PhantomData } }

    pub async fn list(&self, query: &ListQuery) -> Result<Page<T>> { self.list_where(query, None).await }

    pub async fn list_where(&self, query: &ListQuery, filter: Option<FieldEq<'_>>) -> Result<Page<T>> {
        let page = self.store.list(T::KIND, query, filter).await?;
        let data = page.data.into_iter().map(serde_json::from_value).collect::<std::result::Result<Vec<T>, _>>()?;
        Ok(Page { data, total: page.total, page: page.page, limit: page.limit, pages: page.pages })
    }

    pub async fn all(&self) -> Result<Vec<T>> {
        self.store.all(T::KIND).await?.into_iter().map(|v| serde_json::from_value(v).map_err(Into::into)).collect()
    }

    pub async fn get(&self, id: &str) -> Result<Option<T>> {
        self.store.get(T::KIND, id).await?.map(serde_json::from_value).transpose().map_err(Into::into)
    }

    pub async fn find(&self, id: &str) -> Result<T> {
        self.get(id).await?.ok_or(CommerceError::NotFound(T::KIND))
    }

    /// Like [`Collection::get`], keeping the stored body for [`Write::replace`].
    pub async fn track(&self, id: &str) -> Result<Option<Tracked<T>>> {
        match self.store.get(T::KIND, id).await? {
            Some(snapshot) => Ok(Some(Tracked { item: serde_json::from_value(snapshot.clone())?, snapshot })),
            None => Ok(None),
        }
    }

    pub async fn insert(&self, item: &T) -> Result<()> {
        self.store.insert(T::KIND, item.id(), serde_json::to_value(item)?).await
    }

    pub async fn save(&self, item: &T) -> Result<()> {
        if self.store.update(T::KIND, item.id(), serde_json::to_value(item)?).await? {
            Ok(())
        } else {
            Err(CommerceError::NotFound(T::KIND))
        }
    }

    pub async fn delete(&self, id: &str) -> Result<bool> { self.store.delete(T::KIND, id).await }
}

/// Handles to both stores.
#[derive(Clone)]
pub struct Store {
    pub documents: Arc<dyn DocumentStore>,
    pub carts: Arc<dyn CartStore>,
}

impl Store {
    pub fn in_memory(cart_ttl: Duration) -> Self {
        Self { documents: Arc::new(MemoryDocumentStore::default()), carts: Arc::new(MemoryCartStore::new(cart_ttl)) }
    }

    pub fn postgres(pool: sqlx::PgPool, cart_ttl: Duration) -> Self {
        Self { documents: Arc::new(PgDocumentStore::new(pool.clone())), carts: Arc::new(PgCartStore::new(pool, cart_ttl)) }
    }

    pub fn collection<T: Resource>(&self) -> Collection<T> { Collection::new(self.documents.clone()) }
}
