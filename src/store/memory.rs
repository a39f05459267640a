//! In-memory stores for development and tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::domain::aggregates::{CartLine, ItemList, LineId, ListKind, NewLine, Owner};
use crate::listing::{view, ListQuery, Page};
use crate::store::{CartStore, DocumentStore, FieldEq, Write};
use crate::{CommerceError, Result};

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    kinds: RwLock<HashMap<&'static str, BTreeMap<String, Value>>>,
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn list(&self, kind: &'static str, query: &ListQuery, filter: Option<FieldEq<'_>>) -> Result<Page<Value>> {
        let mut docs = self.all(kind).await?;
        if let Some(filter) = filter { docs.retain(|doc| filter.matches(doc)); }
        Ok(view(docs, query))
    }

    async fn all(&self, kind: &'static str) -> Result<Vec<Value>> {
        Ok(self.kinds.read().get(kind).map(|docs| docs.values().cloned().collect()).unwrap_or_default())
    }

    async fn get(&self, kind: &'static str, id: &str) -> Result<Option<Value>> {
        Ok(self.kinds.read().get(kind).and_then(|docs| docs.get(id).cloned()))
    }

    async fn insert(&self, kind: &'static str, id: &str, body: Value) -> Result<()> {
        let mut kinds = self.kinds.write();
        let docs = kinds.entry(kind).or_default();
        if docs.contains_key(id) {
            return Err(CommerceError::Conflict(format!("{kind} '{id}'")));
        }
        docs.insert(id.to_string(), body);
        Ok(())
    }

    async fn update(&self, kind: &'static str, id: &str, body: Value) -> Result<bool> {
        let mut kinds = self.kinds.write();
        match kinds.get_mut(kind).and_then(|docs| docs.get_mut(id)) {
            Some(doc) => {
                *doc = body;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, kind: &'static str, id: &str) -> Result<bool> {
        Ok(self.kinds.write().get_mut(kind).is_some_and(|docs| docs.remove(id).is_some()))
    }

    async fn commit(&self, writes: Vec<Write>) -> Result<()> {
        let mut kinds = self.kinds.write();
        for write in &writes {
            match write {
                Write::Insert { kind, id, .. } => {
                    if kinds.get(kind).is_some_and(|docs| docs.contains_key(id)) {
                        return Err(CommerceError::Conflict(format!("{kind} '{id}'")));
                    }
                }
                Write::Replace { kind, id, expected, .. } => {
                    if kinds.get(kind).and_then(|docs| docs.get(id)) != Some(expected) {
                        return Err(CommerceError::Stale(*kind));
                    }
                }
            }
        }
        for write in writes {
            let (Write::Insert { kind, id, body } | Write::Replace { kind, id, body, .. }) = write;
            kinds.entry(kind).or_default().insert(id, body);
        }
        Ok(())
    }
}

#[derive(Debug)]
struct StoredList {
    items: ItemList,
    expires_at: DateTime<Utc>,
}

/// Per-owner lists with a sliding expiry refreshed on every write.
#[derive(Debug)]
pub struct MemoryCartStore {
    ttl: Duration,
    lists: RwLock<HashMap<(ListKind, Owner), StoredList>>,
}

impl MemoryCartStore {
    pub fn new(ttl: Duration) -> Self { Self { ttl, lists: RwLock::new(HashMap::new()) } }

    fn with_list<R>(&self, list: ListKind, owner: &Owner, f: impl FnOnce(&mut ItemList) -> R) -> R {
        let now = Utc::now();
        let mut lists = self.lists.write();
        let stored = lists.entry((list, owner.clone())).or_insert_with(|| StoredList { items: ItemList::default(), expires_at: now });
        if stored.expires_at <= now { stored.items.clear(); }
        stored.expires_at = now + self.ttl;
        f(&mut stored.items)
    }

    /// Runs `f` on a live list without creating one. Lapsed lists are dropped.
    fn with_existing<R>(&self, list: ListKind, owner: &Owner, f: impl FnOnce(&mut ItemList) -> R) -> Option<R> {
        let now = Utc::now();
        let key = (list, owner.clone());
        let mut lists = self.lists.write();
        let stored = lists.get_mut(&key)?;
        if stored.expires_at <= now {
            lists.remove(&key);
            return None;
        }
        stored.expires_at = now + self.ttl;
        Some(f(&mut stored.items))
    }
}

#[async_trait]
impl CartStore for MemoryCartStore {
    async fn lines(&self, list: ListKind, owner: &Owner) -> Result<Vec<CartLine>> {
        let now = Utc::now();
        Ok(self
            .lists
            .read()
            .get(&(list, owner.clone()))
            .filter(|stored| stored.expires_at > now)
            .map(|stored| stored.items.lines().to_vec())
            .unwrap_or_default())
    }

    async fn add(&self, list: ListKind, owner: &Owner, line: NewLine) -> Result<CartLine> {
        let id = LineId::Persisted(Uuid::now_v7().to_string());
        self.with_list(list, owner, |items| items.add(id, line, Utc::now()).cloned())
            .map_err(|e| CommerceError::Conflict(e.to_string()))
    }

    async fn set_quantity(&self, list: ListKind, owner: &Owner, id: &str, quantity: u32) -> Result<Option<CartLine>> {
        let id = LineId::Persisted(id.to_string());
        self.with_existing(list, owner, |items| match items.set_quantity(&id, quantity, Utc::now()) {
            Ok(line) => Ok(line.cloned()),
            Err(crate::domain::aggregates::CartError::ItemNotFound) => Err(CommerceError::NotFound("cart item")),
            Err(e) => Err(CommerceError::Conflict(e.to_string())),
        })
        .unwrap_or(Err(CommerceError::NotFound("cart item")))
    }

    async fn remove(&self, list: ListKind, owner: &Owner, id: &str) -> Result<bool> {
        let id = LineId::Persisted(id.to_string());
        Ok(self.with_existing(list, owner, |items| items.remove(&id).is_ok()).unwrap_or(false))
    }

    async fn clear(&self, list: ListKind, owner: &Owner) -> Result<()> {
        self.lists.write().remove(&(list, owner.clone()));
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut lists = self.lists.write();
        let mut purged = 0;
        lists.retain(|_, stored| {
            let keep = stored.expires_at > now;
            if !keep { purged += stored.items.len() as u64; }
            keep
        });
        Ok(purged)
    }
}
