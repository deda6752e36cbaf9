//! Process-wide cache registry
//!
//! Holds one [`EntityCaches`] per entity type so every context of a type
//! shares the same entries, plus the organisation caches. Logout clears all
//! of them in one call.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::cache::{CacheTtl, TtlCacheStats};
use crate::client::Transport;
use crate::entity::{Entity, EntityKind, EntityService, OrganizationService, RestEntityService};

use super::{EntityCaches, EntityContext};

/// Cache that can be dropped and inspected without knowing its value type
pub trait Invalidate: Send + Sync {
    fn invalidate_all(&self);
    fn stats(&self) -> TtlCacheStats;
}

type AnyCaches = Arc<dyn Any + Send + Sync>;

pub struct EntityRegistry {
    transport: Arc<dyn Transport>,
    ttl_overrides: HashMap<EntityKind, Duration>,
    caches: Mutex<HashMap<EntityKind, (AnyCaches, Arc<dyn Invalidate>)>>,
    organization: OrganizationService,
}

impl EntityRegistry {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_ttls(transport, HashMap::new())
    }

    /// Registry whose entity caches use `overrides` instead of [`CacheTtl`]
    pub fn with_ttls(
        transport: Arc<dyn Transport>,
        overrides: HashMap<EntityKind, Duration>,
    ) -> Self {
        let organization =
            OrganizationService::new(Arc::clone(&transport), CacheTtl::ORGANIZATION_TREE);
        Self {
            transport,
            ttl_overrides: overrides,
            caches: Mutex::new(HashMap::new()),
            organization,
        }
    }

    /// TTL applied to `kind`
    pub fn ttl_for(&self, kind: EntityKind) -> Duration {
        self.ttl_overrides
            .get(&kind)
            .copied()
            .unwrap_or_else(|| CacheTtl::for_kind(kind))
    }

    /// Shared caches for `E`, created on first use
    pub fn caches<E: Entity>(&self) -> EntityCaches<E> {
        let mut caches = self.caches.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some((any, _)) = caches.get(&E::KIND)
            && let Ok(existing) = Arc::clone(any).downcast::<EntityCaches<E>>()
        {
            return EntityCaches::clone(&existing);
        }

        let created = EntityCaches::<E>::new(self.ttl_for(E::KIND));
        let shared = Arc::new(created.clone());
        caches.insert(E::KIND, (shared.clone() as AnyCaches, shared as Arc<dyn Invalidate>));
        created
    }

    /// New context for `E` backed by the REST service and the shared caches
    pub fn context<E: Entity>(&self) -> EntityContext<E> {
        let service: Arc<dyn EntityService<E>> =
            Arc::new(RestEntityService::new(Arc::clone(&self.transport)));
        EntityContext::new(service, self.caches::<E>())
    }

    pub fn organization(&self) -> &OrganizationService {
        &self.organization
    }

    /// Drop every cached entry of every type
    pub fn invalidate_all(&self) {
        let caches = self.caches.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, invalidate) in caches.values() {
            invalidate.invalidate_all();
        }
        self.organization.invalidate_all();
    }

    /// Occupancy per entity type, in [`EntityKind::ALL`] order
    pub fn stats(&self) -> Vec<(EntityKind, TtlCacheStats)> {
        let caches = self.caches.lock().unwrap_or_else(PoisonError::into_inner);
        EntityKind::ALL
            .iter()
            .map(|kind| {
                let stats = caches
                    .get(kind)
                    .map(|(_, invalidate)| invalidate.stats())
                    .unwrap_or_default();
                (*kind, stats)
            })
            .collect()
    }
}
