//! Entity contexts
//!
//! An [`EntityContext`] binds one entity type to list/get/create/update/delete
//! plus the loading, error and selection state a UI needs. State is published
//! on a watch channel so any number of consumers can follow it.
//!
//! Contexts of the same type share one [`EntityCaches`]: invalidation done by
//! one consumer is seen by all of them. Mutations are not ordered against
//! reads already in flight, so a list fetched during a mutation may be stale
//! until the next invalidation.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::watch;

use crate::cache::{TtlCache, TtlCacheStats, cache_key, namespace_prefix};
use crate::entity::{Entity, EntityService, ListFilter, Patch, Validate};
use crate::error::{Result, ValidationError};

pub mod registry;

pub use registry::{EntityRegistry, Invalidate};

/// List and single-record caches for one entity type
pub struct EntityCaches<E> {
    lists: TtlCache<Vec<E>>,
    items: TtlCache<E>,
    ttl: Duration,
}

impl<E> Clone for EntityCaches<E> {
    fn clone(&self) -> Self {
        Self {
            lists: self.lists.clone(),
            items: self.items.clone(),
            ttl: self.ttl,
        }
    }
}

impl<E: Entity> EntityCaches<E> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            lists: TtlCache::new("lists"),
            items: TtlCache::new("items"),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn list_key(filter: &ListFilter) -> String {
        let params = filter.to_params(E::KIND);
        let params_ref: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
        cache_key(&E::KIND.list_namespace(), &params_ref)
    }

    /// Fresh cached list for `filter`, without touching the network
    pub fn cached_list(&self, filter: &ListFilter) -> Option<Vec<E>> {
        self.lists.get(&Self::list_key(filter))
    }

    /// Drop every cached list page of this type
    pub fn invalidate_lists(&self) {
        let removed = self
            .lists
            .invalidate_prefix(&namespace_prefix(&E::KIND.list_namespace()));
        debug!("Invalidated {} {} list entries", removed, E::KIND);
    }

    /// Drop the cached record `id`
    pub fn invalidate_item(&self, id: &str) {
        self.items.invalidate(&E::KIND.item_key(id));
    }
}

impl<E: Entity> Invalidate for EntityCaches<E> {
    fn invalidate_all(&self) {
        self.lists.invalidate_all();
        self.items.invalidate_all();
    }

    fn stats(&self) -> TtlCacheStats {
        let lists = self.lists.stats();
        let items = self.items.stats();
        TtlCacheStats {
            total_entries: lists.total_entries + items.total_entries,
            fresh_entries: lists.fresh_entries + items.fresh_entries,
            expired_entries: lists.expired_entries + items.expired_entries,
            in_flight: lists.in_flight + items.in_flight,
        }
    }
}

/// Observable state of a context
#[derive(Debug, Clone)]
pub struct ContextState<E> {
    /// Last list result
    pub items: Vec<E>,
    /// Filter that produced `items`
    pub filter: ListFilter,
    /// Last record fetched with `get` (or returned by a mutation)
    pub current: Option<E>,
    /// Record selected in the UI
    pub selected: Option<String>,
    pub loading: bool,
    /// Message of the last failed request
    pub error: Option<String>,
    in_progress: usize,
}

impl<E> Default for ContextState<E> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            filter: ListFilter::default(),
            current: None,
            selected: None,
            loading: false,
            error: None,
            in_progress: 0,
        }
    }
}

/// CRUD operations plus observable state for one entity type
pub struct EntityContext<E: Entity> {
    service: Arc<dyn EntityService<E>>,
    caches: EntityCaches<E>,
    state: watch::Sender<ContextState<E>>,
}

impl<E: Entity> EntityContext<E> {
    pub fn new(service: Arc<dyn EntityService<E>>, caches: EntityCaches<E>) -> Self {
        Self::with_state(service, caches, ContextState::default)
    }

    /// Start from a state built by `initial` instead of the empty default
    pub fn with_state(
        service: Arc<dyn EntityService<E>>,
        caches: EntityCaches<E>,
        initial: impl FnOnce() -> ContextState<E>,
    ) -> Self {
        let (state, _) = watch::channel(initial());
        Self {
            service,
            caches,
            state,
        }
    }

    /// Follow state changes
    pub fn subscribe(&self) -> watch::Receiver<ContextState<E>> {
        self.state.subscribe()
    }

    /// Snapshot of the current state
    pub fn state(&self) -> ContextState<E> {
        self.state.borrow().clone()
    }

    /// Shared caches behind this context
    pub fn caches(&self) -> &EntityCaches<E> {
        &self.caches
    }

    /// List records. A fresh cached result is returned without a request and
    /// without entering the loading state, unless `refresh` is set.
    pub async fn list(&self, filter: &ListFilter, refresh: bool) -> Result<Vec<E>> {
        let key = EntityCaches::<E>::list_key(filter);

        if refresh {
            self.caches.lists.invalidate(&key);
        } else if let Some(items) = self.caches.lists.get(&key) {
            debug!("Serving {} list from cache", E::KIND);
            self.state.send_modify(|s| {
                s.items = items.clone();
                s.filter = filter.clone();
            });
            return Ok(items);
        }

        self.begin();
        let service = Arc::clone(&self.service);
        let owned_filter = filter.clone();
        let result = self
            .caches
            .lists
            .fetch(
                &key,
                move || async move { service.list(&owned_filter).await },
                self.caches.ttl,
            )
            .await;

        self.finish(&result, |s, items| {
            s.items = items.clone();
            s.filter = filter.clone();
        });
        result
    }

    /// Fetch one record through the item cache
    pub async fn get(&self, id: &str, refresh: bool) -> Result<E> {
        let key = E::KIND.item_key(id);

        if refresh {
            self.caches.items.invalidate(&key);
        } else if let Some(record) = self.caches.items.get(&key) {
            self.state.send_modify(|s| s.current = Some(record.clone()));
            return Ok(record);
        }

        self.begin();
        let service = Arc::clone(&self.service);
        let owned_id = id.to_string();
        let result = self
            .caches
            .items
            .fetch(
                &key,
                move || async move { service.get(&owned_id).await },
                self.caches.ttl,
            )
            .await;

        self.finish(&result, |s, record| s.current = Some(record.clone()));
        result
    }

    /// Validate locally, create, then drop cached lists. The new record is not
    /// inserted into any cache; the next list call refetches it with its
    /// server-assigned fields.
    pub async fn create(&self, draft: &E::Draft) -> Result<E> {
        draft.validate()?;

        self.begin();
        let result = self.service.create(draft).await;
        if result.is_ok() {
            self.caches.invalidate_lists();
        }

        self.finish(&result, |s, record| s.current = Some(record.clone()));
        result
    }

    /// Apply a partial update. Blank fields are stripped; a patch with nothing
    /// left is rejected before any request is made.
    pub async fn update(&self, id: &str, patch: &Patch) -> Result<E> {
        if patch.is_empty() {
            return Err(ValidationError::EmptyPatch.into());
        }

        self.begin();
        let result = self.service.update(id, patch).await;
        if result.is_ok() {
            self.caches.invalidate_lists();
            self.caches.invalidate_item(id);
        }

        self.finish(&result, |s, record| {
            if s.current.as_ref().is_some_and(|c| c.id() == record.id()) {
                s.current = Some(record.clone());
            }
        });
        result
    }

    /// Delete a record; clears the selection if it pointed at `id`.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.begin();
        let result = self.service.delete(id).await;
        if result.is_ok() {
            self.caches.invalidate_lists();
            self.caches.invalidate_item(id);
        }

        self.finish(&result, |s, _| {
            s.items.retain(|item| item.id() != id);
            if s.selected.as_deref() == Some(id) {
                s.selected = None;
            }
            if s.current.as_ref().is_some_and(|c| c.id() == id) {
                s.current = None;
            }
        });
        result
    }

    /// Mark a record as selected (or clear the selection)
    pub fn select(&self, id: Option<&str>) {
        self.state
            .send_modify(|s| s.selected = id.map(str::to_string));
    }

    fn begin(&self) {
        self.state.send_modify(|s| {
            s.in_progress += 1;
            s.loading = true;
            s.error = None;
        });
    }

    fn finish<T>(&self, result: &Result<T>, apply: impl FnOnce(&mut ContextState<E>, &T)) {
        self.state.send_modify(|s| {
            s.in_progress = s.in_progress.saturating_sub(1);
            s.loading = s.in_progress > 0;
            match result {
                Ok(value) => apply(s, value),
                Err(err) => {
                    warn!("{} request failed: {}", E::KIND, err);
                    s.error = Some(err.to_string());
                }
            }
        });
    }
}
