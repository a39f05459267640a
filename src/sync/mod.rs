//! Optimistic cart and wishlist cache
//!
//! [`ItemCache`] applies every mutation to its local copy first, then asks
//! the service. A stored line replaces the optimistic one (matched by
//! product and variant, so a temporary id becomes the server's id); a failed
//! or cancelled call puts back exactly the list as it was before the call.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

use crate::client::ClientError;
use crate::domain::aggregates::{CartError, CartLine, ItemList, LineId, ListKind, NewLine, Owner};

/// Service side of the cache.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteItems: Send + Sync {
    async fn fetch(&self, list: ListKind, owner: &Owner) -> Result<Vec<CartLine>, ClientError>;
    async fn add(&self, list: ListKind, owner: &Owner, line: NewLine) -> Result<CartLine, ClientError>;
    async fn set_quantity(&self, list: ListKind, owner: &Owner, id: &str, quantity: u32) -> Result<Option<CartLine>, ClientError>;
    async fn remove(&self, list: ListKind, owner: &Owner, id: &str) -> Result<(), ClientError>;
    async fn clear(&self, list: ListKind, owner: &Owner) -> Result<(), ClientError>;
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] ClientError),
    #[error("Request cancelled")]
    Cancelled,
    #[error("Item is still being saved")]
    NotYetSaved,
    #[error(transparent)]
    List(#[from] CartError),
}

/// Cancellation handle shared by everything a cache has in flight.
#[derive(Clone, Debug)]
pub struct Scope {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for Scope {
    fn default() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }
}

impl Scope {
    pub fn new() -> Self { Self::default() }

    pub fn cancel(&self) { self.tx.send_replace(true); }

    pub fn is_cancelled(&self) -> bool { *self.rx.borrow() }

    /// Runs `fut` unless the scope is cancelled first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, SyncError> {
        if self.is_cancelled() { return Err(SyncError::Cancelled); }
        let mut rx = self.rx.clone();
        tokio::select! {
            out = fut => Ok(out),
            _ = async move {
                while !*rx.borrow_and_update() {
                    if rx.changed().await.is_err() { std::future::pending::<()>().await; }
                }
            } => Err(SyncError::Cancelled),
        }
    }
}

type ListKey = (ListKind, Owner);

pub struct ItemCache {
    remote: Arc<dyn RemoteItems>,
    lists: Mutex<HashMap<ListKey, ItemList>>,
    next_temp: AtomicI64,
    scope: Scope,
}

impl ItemCache {
    pub fn new(remote: Arc<dyn RemoteItems>) -> Self {
        Self { remote, lists: Mutex::new(HashMap::new()), next_temp: AtomicI64::new(-1), scope: Scope::new() }
    }

    pub fn scope(&self) -> &Scope { &self.scope }

    /// Cancels every in-flight call; each one rolls back as if it had failed.
    pub fn shutdown(&self) { self.scope.cancel(); }

    /// Current local view of a list.
    pub fn snapshot(&self, list: ListKind, owner: &Owner) -> ItemList {
        self.lists.lock().get(&(list, owner.clone())).cloned().unwrap_or_default()
    }

    fn with_list<R>(&self, list: ListKind, owner: &Owner, f: impl FnOnce(&mut ItemList) -> R) -> R {
        f(self.lists.lock().entry((list, owner.clone())).or_default())
    }

    fn restore(&self, list: ListKind, owner: &Owner, snapshot: ItemList) {
        tracing::debug!(list = list.as_str(), %owner, "rolling back optimistic update");
        self.lists.lock().insert((list, owner.clone()), snapshot);
    }

    fn temporary_id(&self) -> LineId { LineId::Temporary(self.next_temp.fetch_sub(1, Ordering::Relaxed)) }

    async fn call<T>(&self, fut: impl Future<Output = Result<T, ClientError>>) -> Result<T, SyncError> {
        Ok(self.scope.run(fut).await??)
    }

    /// Replaces the local list with the service's copy.
    pub async fn load(&self, list: ListKind, owner: &Owner) -> Result<ItemList, SyncError> {
        let fresh = ItemList::new(self.call(self.remote.fetch(list, owner)).await?);
        self.with_list(list, owner, |items| *items = fresh.clone());
        Ok(fresh)
    }

    pub async fn add(&self, list: ListKind, owner: &Owner, line: NewLine) -> Result<CartLine, SyncError> {
        let temp = self.temporary_id();
        let snapshot = self.with_list(list, owner, |items| {
            let before = items.clone();
            items.add(temp, line.clone(), Utc::now()).map(|_| before)
        })?;
        match self.call(self.remote.add(list, owner, line)).await {
            Ok(stored) => {
                self.with_list(list, owner, |items| items.reconcile(stored.clone()));
                Ok(stored)
            }
            Err(e) => {
                self.restore(list, owner, snapshot);
                Err(e)
            }
        }
    }

    /// Zero removes the line.
    pub async fn set_quantity(&self, list: ListKind, owner: &Owner, id: &LineId, quantity: u32) -> Result<Option<CartLine>, SyncError> {
        if id.is_temporary() { return Err(SyncError::NotYetSaved); }
        let snapshot = self.with_list(list, owner, |items| {
            let before = items.clone();
            items.set_quantity(id, quantity, Utc::now()).map(|_| before)
        })?;
        match self.call(self.remote.set_quantity(list, owner, &id.to_string(), quantity)).await {
            Ok(stored) => {
                if let Some(line) = &stored {
                    self.with_list(list, owner, |items| items.reconcile(line.clone()));
                }
                Ok(stored)
            }
            Err(e) => {
                self.restore(list, owner, snapshot);
                Err(e)
            }
        }
    }

    pub async fn remove(&self, list: ListKind, owner: &Owner, id: &LineId) -> Result<(), SyncError> {
        if id.is_temporary() { return Err(SyncError::NotYetSaved); }
        let snapshot = self.with_list(list, owner, |items| {
            let before = items.clone();
            items.remove(id).map(|_| before)
        })?;
        self.call(self.remote.remove(list, owner, &id.to_string())).await.inspect_err(|_| self.restore(list, owner, snapshot))
    }

    pub async fn clear(&self, list: ListKind, owner: &Owner) -> Result<(), SyncError> {
        let snapshot = self.with_list(list, owner, |items| {
            let before = items.clone();
            items.clear();
            before
        });
        self.call(self.remote.clear(list, owner)).await.inspect_err(|_| self.restore(list, owner, snapshot))
    }

    /// Moves a wishlist line into the cart. The cart add happens first; if it
    /// fails the wishlist is untouched.
    pub async fn move_to_cart(&self, owner: &Owner, id: &LineId) -> Result<CartLine, SyncError> {
        let line = self.snapshot(ListKind::Wishlist, owner).get(id).cloned().ok_or(CartError::ItemNotFound)?;
        let added = self
            .add(ListKind::Cart, owner, NewLine {
                product_id: line.product_id, variant: line.variant, name: line.name, price: line.price,
                image: line.image, quantity: line.quantity.max(1),
            })
            .await?;
        self.remove(ListKind::Wishlist, owner, id).await?;
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::Variant;
    use rust_decimal::Decimal;
    use std::sync::atomic::AtomicBool;
    use testresult::TestResult;

    /// In-memory service with switchable failure and hang modes.
    #[derive(Default)]
    struct FakeRemote {
        lines: Mutex<HashMap<ListKey, ItemList>>,
        next_id: AtomicI64,
        fail: AtomicBool,
        hang: AtomicBool,
    }

    impl FakeRemote {
        async fn gate(&self) -> Result<(), ClientError> {
            if self.hang.load(Ordering::SeqCst) { std::future::pending::<()>().await; }
            if self.fail.load(Ordering::SeqCst) {
                return Err(ClientError::Rejected { status: 500, message: "Internal server error".into() });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RemoteItems for FakeRemote {
        async fn fetch(&self, list: ListKind, owner: &Owner) -> Result<Vec<CartLine>, ClientError> {
            self.gate().await?;
            Ok(self.lines.lock().get(&(list, owner.clone())).map(|l| l.lines().to_vec()).unwrap_or_default())
        }

        async fn add(&self, list: ListKind, owner: &Owner, line: NewLine) -> Result<CartLine, ClientError> {
            self.gate().await?;
            let id = LineId::Persisted(format!("srv-{}", self.next_id.fetch_add(1, Ordering::SeqCst)));
            let mut lines = self.lines.lock();
            let items = lines.entry((list, owner.clone())).or_default();
            items.add(id, line, Utc::now()).cloned().map_err(|e| ClientError::Validation(e.to_string()))
        }

        async fn set_quantity(&self, list: ListKind, owner: &Owner, id: &str, quantity: u32) -> Result<Option<CartLine>, ClientError> {
            self.gate().await?;
            let mut lines = self.lines.lock();
            let items = lines.entry((list, owner.clone())).or_default();
            items
                .set_quantity(&LineId::Persisted(id.into()), quantity, Utc::now())
                .map(|l| l.cloned())
                .map_err(|e| ClientError::NotFound(e.to_string()))
        }

        async fn remove(&self, list: ListKind, owner: &Owner, id: &str) -> Result<(), ClientError> {
            self.gate().await?;
            let mut lines = self.lines.lock();
            let items = lines.entry((list, owner.clone())).or_default();
            items.remove(&LineId::Persisted(id.into())).map(|_| ()).map_err(|e| ClientError::NotFound(e.to_string()))
        }

        async fn clear(&self, list: ListKind, owner: &Owner) -> Result<(), ClientError> {
            self.gate().await?;
            self.lines.lock().remove(&(list, owner.clone()));
            Ok(())
        }
    }

    fn tile(quantity: u32) -> NewLine {
        NewLine {
            product_id: "P1".into(), variant: Variant { size: Some("600x1200".into()), color: None },
            name: "Statuario Slab".into(), price: Decimal::from(1000), image: None, quantity,
        }
    }

    fn cache() -> (Arc<FakeRemote>, ItemCache) {
        let remote = Arc::new(FakeRemote::default());
        (remote.clone(), ItemCache::new(remote))
    }

    #[tokio::test]
    async fn test_add_reconciles_temporary_id() -> TestResult {
        let (_, cache) = cache();
        let owner = Owner::Guest;
        let stored = cache.add(ListKind::Cart, &owner, tile(2)).await?;
        assert_eq!(stored.id, LineId::Persisted("srv-0".into()));
        let list = cache.snapshot(ListKind::Cart, &owner);
        assert_eq!(list.lines(), &[stored]);
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_add_is_one_line() -> TestResult {
        let (remote, cache) = cache();
        let owner = Owner::User("u1".into());
        cache.add(ListKind::Cart, &owner, tile(2)).await?;
        cache.add(ListKind::Cart, &owner, tile(3)).await?;
        let list = cache.snapshot(ListKind::Cart, &owner);
        assert_eq!(list.len(), 1);
        assert_eq!(list.lines()[0].quantity, 5);
        assert_eq!(remote.fetch(ListKind::Cart, &owner).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_failure_restores_snapshot() -> TestResult {
        let (remote, cache) = cache();
        let owner = Owner::Session("s1".into());
        let line = cache.add(ListKind::Cart, &owner, tile(2)).await?;
        let before = cache.snapshot(ListKind::Cart, &owner);

        remote.fail.store(true, Ordering::SeqCst);
        assert!(matches!(cache.set_quantity(ListKind::Cart, &owner, &line.id, 7).await, Err(SyncError::Remote(_))));
        assert_eq!(cache.snapshot(ListKind::Cart, &owner), before);
        assert!(cache.add(ListKind::Cart, &owner, tile(1)).await.is_err());
        assert_eq!(cache.snapshot(ListKind::Cart, &owner), before);
        assert!(cache.remove(ListKind::Cart, &owner, &line.id).await.is_err());
        assert_eq!(cache.snapshot(ListKind::Cart, &owner), before);
        assert!(cache.clear(ListKind::Cart, &owner).await.is_err());
        assert_eq!(cache.snapshot(ListKind::Cart, &owner), before);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_rolls_back_in_flight_add() {
        let (remote, cache) = cache();
        let owner = Owner::Guest;
        remote.hang.store(true, Ordering::SeqCst);
        let (result, ()) = tokio::join!(cache.add(ListKind::Cart, &owner, tile(1)), async {
            tokio::task::yield_now().await;
            let optimistic = cache.snapshot(ListKind::Cart, &owner);
            assert_eq!(optimistic.len(), 1);
            assert!(optimistic.lines()[0].id.is_temporary());
            cache.shutdown();
        });
        assert!(matches!(result, Err(SyncError::Cancelled)));
        assert!(cache.snapshot(ListKind::Cart, &owner).is_empty());
        assert!(matches!(cache.load(ListKind::Cart, &owner).await, Err(SyncError::Cancelled)));
    }

    #[tokio::test]
    async fn test_temporary_lines_are_rejected_locally() {
        let (_, cache) = cache();
        let result = cache.remove(ListKind::Cart, &Owner::Guest, &LineId::Temporary(-1)).await;
        assert!(matches!(result, Err(SyncError::NotYetSaved)));
    }

    #[tokio::test]
    async fn test_zero_quantity_removes() -> TestResult {
        let (_, cache) = cache();
        let owner = Owner::Guest;
        let line = cache.add(ListKind::Cart, &owner, tile(4)).await?;
        assert_eq!(cache.set_quantity(ListKind::Cart, &owner, &line.id, 0).await?, None);
        assert!(cache.snapshot(ListKind::Cart, &owner).is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_move_to_cart() -> TestResult {
        let (_, cache) = cache();
        let owner = Owner::User("u1".into());
        let wished = cache.add(ListKind::Wishlist, &owner, tile(1)).await?;
        let moved = cache.move_to_cart(&owner, &wished.id).await?;
        assert_eq!(moved.product_id, "P1");
        assert!(cache.snapshot(ListKind::Wishlist, &owner).is_empty());
        assert_eq!(cache.snapshot(ListKind::Cart, &owner).len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_load_replaces_local_list() -> TestResult {
        let (remote, cache) = cache();
        let owner = Owner::Guest;
        remote.add(ListKind::Cart, &owner, tile(3)).await?;
        let list = cache.load(ListKind::Cart, &owner).await?;
        assert_eq!(list.lines()[0].quantity, 3);
        assert_eq!(cache.snapshot(ListKind::Cart, &owner), list);
        Ok(())
    }
}
