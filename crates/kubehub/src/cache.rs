//! Per-identity client cache.
//!
//! Keyed by `(Identity, normalized ClientOptions)`. Each key owns a slot whose client is
//! built at most once at a time: concurrent misses on one key wait for the same build.
//! Entries go stale after `ttl` or when the identity's credential expires, whichever
//! comes first; the cache also holds at most `max_entries` clients, evicting the oldest.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use kubeql_core::{BackendError, ClientOptions, Identity};
use metrics::counter;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::debug;

use crate::{ClientFactory, ClientProvider, DynamicClient};

#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self { Self { ttl: Duration::from_secs(600), max_entries: 256 } }
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    identity: Identity,
    options: ClientOptions,
}

struct CacheEntry {
    client: Arc<dyn DynamicClient>,
    created: Instant,
}

#[derive(Default)]
struct Slot {
    cell: OnceCell<CacheEntry>,
}

impl Slot {
    fn created(&self) -> Option<Instant> { self.cell.get().map(|e| e.created) }

    /// Empty slots (build in flight or failed) are never stale.
    fn is_stale(&self, key: &CacheKey, ttl: Duration, now: Instant) -> bool {
        match self.created() {
            Some(created) => created + ttl <= now || key.identity.is_expired(),
            None => false,
        }
    }
}

pub struct ClientCache<F> {
    factory: F,
    cfg: CacheConfig,
    slots: Mutex<HashMap<CacheKey, Arc<Slot>>>,
}

impl<F: ClientFactory> ClientCache<F> {
    pub fn new(factory: F, cfg: CacheConfig) -> Self {
        Self { factory, cfg, slots: Mutex::new(HashMap::new()) }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Arc<Slot>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Client for `identity` scoped by `options`, built on first use.
    pub async fn get(&self, identity: &Identity, options: &ClientOptions) -> Result<Arc<dyn DynamicClient>, BackendError> {
        if identity.is_blank() {
            return Err(BackendError::InvalidIdentity("empty credential".into()));
        }
        if identity.is_expired() {
            self.evict(identity);
            return Err(BackendError::InvalidIdentity("credential expired".into()));
        }
        let key = CacheKey { identity: identity.clone(), options: options.clone().normalized() };
        let slot = self.slot_for(&key);
        if let Some(entry) = slot.cell.get() {
            counter!("kubeql_client_cache_hits", 1u64);
            return Ok(entry.client.clone());
        }
        match slot.cell.get_or_try_init(|| self.build_entry(&key)).await {
            Ok(entry) => Ok(entry.client.clone()),
            Err(e) => {
                // Failed builds are not cached; drop the empty slot unless another caller already replaced it.
                let mut slots = self.lock();
                if slots.get(&key).map(|s| Arc::ptr_eq(s, &slot) && s.cell.get().is_none()).unwrap_or(false) {
                    slots.remove(&key);
                }
                debug!(error = %e, "client cache: build failed");
                Err(e)
            }
        }
    }

    async fn build_entry(&self, key: &CacheKey) -> Result<CacheEntry, BackendError> {
        counter!("kubeql_client_cache_builds", 1u64);
        debug!(identity = ?key.identity, options = ?key.options, "client cache: building client");
        let client = self.factory.build(&key.identity, &key.options).await?;
        Ok(CacheEntry { client, created: Instant::now() })
    }

    fn slot_for(&self, key: &CacheKey) -> Arc<Slot> {
        let now = Instant::now();
        let mut slots = self.lock();
        if let Some(slot) = slots.get(key) {
            if !slot.is_stale(key, self.cfg.ttl, now) {
                return slot.clone();
            }
            debug!(identity = ?key.identity, "client cache: entry stale, rebuilding");
        }
        let slot = Arc::new(Slot::default());
        slots.insert(key.clone(), slot.clone());
        Self::enforce_bound(&mut slots, self.cfg.max_entries, key);
        slot
    }

    fn enforce_bound(slots: &mut HashMap<CacheKey, Arc<Slot>>, max: usize, keep: &CacheKey) {
        while slots.len() > max.max(1) {
            let oldest = slots
                .iter()
                .filter(|(k, s)| *k != keep && s.created().is_some())
                .min_by_key(|(_, s)| s.created())
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    debug!(identity = ?k.identity, "client cache: evicting oldest entry");
                    slots.remove(&k);
                }
                None => break,
            }
        }
    }

    /// Drop every client of a revoked identity.
    pub fn evict(&self, identity: &Identity) -> usize {
        let mut slots = self.lock();
        let before = slots.len();
        slots.retain(|k, _| &k.identity != identity);
        before - slots.len()
    }

    /// Drop stale entries; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let ttl = self.cfg.ttl;
        let mut slots = self.lock();
        let before = slots.len();
        slots.retain(|k, s| !s.is_stale(k, ttl, now));
        before - slots.len()
    }

    pub fn len(&self) -> usize { self.lock().len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[async_trait::async_trait]
impl<F: ClientFactory> ClientProvider for ClientCache<F> {
    async fn client(&self, identity: &Identity, options: &ClientOptions) -> Result<Arc<dyn DynamicClient>, BackendError> {
        self.get(identity, options).await
    }
}
