//! TTL-based keyed store of entity snapshots. One instance per process; every
//! repository round-trips through it so invalidation is process-wide.
//!
//! Expired entries are not evicted on read: the offline path still serves
//! them (flagged stale) until an explicit `invalidate*` or a `prune_expired`
//! sweep removes them.

mod disk;
mod memory;

pub use disk::SledBackend;
pub use memory::MemoryBackend;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;
use thiserror::Error;

use plaza_protocol::CollectionKey;
use plaza_protocol::Page;
use plaza_protocol::ResourceId;
use plaza_protocol::ResourceKind;

/// Named freshness windows observed across the source domains; call sites
/// pick a class instead of spelling out seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TtlClass {
    /// Profile and category data; changes rarely.
    Profile,
    /// Chat, orders, notifications; anything a user watches for changes.
    Volatile,
    /// Transport-level blobs such as resolved image URLs.
    Media,
}

impl TtlClass {
    pub fn ttl(self) -> Duration {
        match self {
            TtlClass::Profile => Duration::from_secs(300),
            TtlClass::Volatile => Duration::from_secs(60),
            TtlClass::Media => Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
    #[error("store error: {0}")]
    Store(#[from] sled::Error),
}

/// Key-value substrate the store writes encoded records into. In-memory for
/// ephemeral processes, sled for an on-disk cache that survives restarts.
pub trait CacheBackend: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;
    fn store(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError>;
    fn remove(&self, key: &str) -> Result<(), CacheError>;
    fn remove_prefix(&self, prefix: &str) -> Result<u64, CacheError>;
    fn clear(&self) -> Result<(), CacheError>;
    fn keys(&self) -> Result<Vec<String>, CacheError>;
    fn len(&self) -> usize;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    payload: Vec<u8>,
    fetched_at_ms: i64,
    class: TtlClass,
}

/// A value served from the store, with enough provenance for the caller to
/// render staleness.
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    pub fetched_at: DateTime<Utc>,
    pub stale: bool,
}

impl<T> Cached<T> {
    pub(crate) fn fresh(value: T) -> Self {
        Self {
            value,
            fetched_at: Utc::now(),
            stale: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub items: usize,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f32 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 1.0;
        }
        self.hits as f32 / total as f32
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn entity_key(rid: &ResourceId) -> String {
    format!("entity:{rid}")
}

fn page_key(key: &CollectionKey, page: u32) -> String {
    format!("page:{key}:{page}")
}

fn blob_key(rid: &ResourceId) -> String {
    format!("blob:{rid}")
}

pub struct CacheStore {
    backend: Box<dyn CacheBackend>,
    hit_counter: AtomicU64,
    miss_counter: AtomicU64,
}

impl CacheStore {
    pub fn in_memory() -> Self {
        Self::with_backend(Box::new(MemoryBackend::new()))
    }

    pub fn persistent(path: &Path) -> Result<Self, CacheError> {
        Ok(Self::with_backend(Box::new(SledBackend::open(path)?)))
    }

    pub fn with_backend(backend: Box<dyn CacheBackend>) -> Self {
        Self {
            backend,
            hit_counter: AtomicU64::new(0),
            miss_counter: AtomicU64::new(0),
        }
    }

    /// Fresh-only read: `None` if absent or past `ttl`. The entry itself is
    /// left in place either way.
    pub fn get<T>(&self, rid: &ResourceId, ttl: Duration) -> Result<Option<Cached<T>>, CacheError>
    where
        T: DeserializeOwned,
    {
        match self.read::<T>(&entity_key(rid), ttl)? {
            Some(cached) if !cached.stale => {
                self.hit_counter.fetch_add(1, Ordering::Relaxed);
                Ok(Some(cached))
            }
            _ => {
                self.miss_counter.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    /// Degraded-mode read: returns whatever snapshot exists, flagged stale
    /// when past `ttl`. Not counted in the hit/miss stats; those track the
    /// fresh path.
    pub fn lookup<T>(
        &self,
        rid: &ResourceId,
        ttl: Duration,
    ) -> Result<Option<Cached<T>>, CacheError>
    where
        T: DeserializeOwned,
    {
        self.read::<T>(&entity_key(rid), ttl)
    }

    /// Overwrite-on-write; last writer wins, no merge semantics.
    pub fn put<T>(&self, rid: &ResourceId, value: &T, class: TtlClass) -> Result<(), CacheError>
    where
        T: Serialize,
    {
        self.write(&entity_key(rid), value, class)
    }

    pub fn invalidate(&self, rid: &ResourceId) -> Result<(), CacheError> {
        self.backend.remove(&entity_key(rid))
    }

    pub fn invalidate_all(&self) -> Result<(), CacheError> {
        self.hit_counter.store(0, Ordering::Relaxed);
        self.miss_counter.store(0, Ordering::Relaxed);
        self.backend.clear()
    }

    pub fn get_page<T>(
        &self,
        key: &CollectionKey,
        page: u32,
        ttl: Duration,
    ) -> Result<Option<Cached<Page<T>>>, CacheError>
    where
        T: DeserializeOwned,
    {
        match self.read::<Page<T>>(&page_key(key, page), ttl)? {
            Some(cached) if !cached.stale => {
                self.hit_counter.fetch_add(1, Ordering::Relaxed);
                Ok(Some(cached))
            }
            _ => {
                self.miss_counter.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    pub fn lookup_page<T>(
        &self,
        key: &CollectionKey,
        page: u32,
        ttl: Duration,
    ) -> Result<Option<Cached<Page<T>>>, CacheError>
    where
        T: DeserializeOwned,
    {
        self.read::<Page<T>>(&page_key(key, page), ttl)
    }

    pub fn put_page<T>(
        &self,
        key: &CollectionKey,
        page: u32,
        value: &Page<T>,
        class: TtlClass,
    ) -> Result<(), CacheError>
    where
        T: Serialize,
    {
        self.write(&page_key(key, page), value, class)
    }

    /// Drop every cached page of one collection scope.
    pub fn invalidate_collection(&self, key: &CollectionKey) -> Result<u64, CacheError> {
        self.backend.remove_prefix(&format!("page:{key}:"))
    }

    /// Drop every cached page of every collection of `kind`. Used after
    /// mutations, where which scopes contain the resource is unknowable
    /// client-side.
    pub fn invalidate_collections(&self, kind: ResourceKind) -> Result<u64, CacheError> {
        self.backend.remove_prefix(&format!("page:{kind}:"))
    }

    /// Fresh-only read of a cached media blob (`TtlClass::Media` at write
    /// time; freshness window supplied per call like the entity reads).
    pub fn get_blob(
        &self,
        rid: &ResourceId,
        ttl: Duration,
    ) -> Result<Option<Cached<Vec<u8>>>, CacheError> {
        match self.read::<Vec<u8>>(&blob_key(rid), ttl)? {
            Some(cached) if !cached.stale => {
                self.hit_counter.fetch_add(1, Ordering::Relaxed);
                Ok(Some(cached))
            }
            _ => {
                self.miss_counter.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    pub fn lookup_blob(
        &self,
        rid: &ResourceId,
        ttl: Duration,
    ) -> Result<Option<Cached<Vec<u8>>>, CacheError> {
        self.read::<Vec<u8>>(&blob_key(rid), ttl)
    }

    pub fn put_blob(&self, rid: &ResourceId, bytes: &[u8]) -> Result<(), CacheError> {
        self.write(&blob_key(rid), bytes, TtlClass::Media)
    }

    /// Maintenance sweep removing entries past their own class TTL. The read
    /// paths never evict, so this is the only thing that bounds the store
    /// besides explicit invalidation.
    pub fn prune_expired(&self) -> Result<u64, CacheError> {
        let mut removed = 0u64;
        let now = now_ms();
        for key in self.backend.keys()? {
            let Some(raw) = self.backend.load(&key)? else {
                continue;
            };
            let record: StoredRecord = bincode::deserialize(&raw)?;
            let ttl_ms = record.class.ttl().as_millis() as i64;
            if now - record.fetched_at_ms > ttl_ms {
                self.backend.remove(&key)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hit_counter.load(Ordering::Relaxed),
            misses: self.miss_counter.load(Ordering::Relaxed),
            items: self.backend.len(),
        }
    }

    fn read<T>(&self, key: &str, ttl: Duration) -> Result<Option<Cached<T>>, CacheError>
    where
        T: DeserializeOwned,
    {
        let Some(raw) = self.backend.load(key)? else {
            return Ok(None);
        };
        let record: StoredRecord = bincode::deserialize(&raw)?;
        let value: T = bincode::deserialize(&record.payload)?;
        let age_ms = now_ms() - record.fetched_at_ms;
        Ok(Some(Cached {
            value,
            fetched_at: DateTime::<Utc>::from_timestamp_millis(record.fetched_at_ms)
                .unwrap_or_else(Utc::now),
            stale: age_ms > ttl.as_millis() as i64,
        }))
    }

    fn write<T>(&self, key: &str, value: &T, class: TtlClass) -> Result<(), CacheError>
    where
        T: Serialize + ?Sized,
    {
        let record = StoredRecord {
            payload: bincode::serialize(value)?,
            fetched_at_ms: now_ms(),
            class,
        };
        self.backend.store(key, bincode::serialize(&record)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store() -> CacheStore {
        CacheStore::in_memory()
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Snapshot {
        title: String,
    }

    fn snapshot(title: &str) -> Snapshot {
        Snapshot {
            title: title.to_string(),
        }
    }

    #[test]
    fn fresh_hit_within_ttl_then_miss_after_expiry() {
        let cache = store();
        let rid = ResourceId::event("42");
        cache
            .put(&rid, &snapshot("A"), TtlClass::Volatile)
            .expect("put");

        let hit: Option<Cached<Snapshot>> =
            cache.get(&rid, Duration::from_secs(60)).expect("get");
        assert_eq!(hit.map(|c| c.value), Some(snapshot("A")));

        // A zero-width freshness window expires the entry immediately.
        let miss: Option<Cached<Snapshot>> =
            cache.get(&rid, Duration::from_millis(0)).expect("get");
        assert!(miss.is_none());
    }

    #[test]
    fn expired_entries_survive_for_degraded_reads() {
        let cache = store();
        let rid = ResourceId::event("42");
        cache
            .put(&rid, &snapshot("A"), TtlClass::Volatile)
            .expect("put");

        let miss: Option<Cached<Snapshot>> =
            cache.get(&rid, Duration::from_millis(0)).expect("get");
        assert!(miss.is_none());

        let stale: Cached<Snapshot> = cache
            .lookup(&rid, Duration::from_millis(0))
            .expect("lookup")
            .expect("entry retained");
        assert!(stale.stale);
        assert_eq!(stale.value, snapshot("A"));
    }

    #[test]
    fn invalidate_removes_the_entry_outright() {
        let cache = store();
        let rid = ResourceId::order("7");
        cache
            .put(&rid, &snapshot("order"), TtlClass::Volatile)
            .expect("put");
        cache.invalidate(&rid).expect("invalidate");

        let gone: Option<Cached<Snapshot>> = cache
            .lookup(&rid, Duration::from_secs(3600))
            .expect("lookup");
        assert!(gone.is_none());
    }

    #[test]
    fn collection_invalidation_drops_all_pages_of_the_kind() {
        let cache = store();
        let mine = CollectionKey::new(ResourceKind::Order, "mine");
        let business = CollectionKey::new(ResourceKind::Order, "business:17");
        let page = Page {
            items: vec![snapshot("o1")],
            meta: plaza_protocol::PageMeta::single(1),
        };
        cache
            .put_page(&mine, 1, &page, TtlClass::Volatile)
            .expect("put");
        cache
            .put_page(&business, 1, &page, TtlClass::Volatile)
            .expect("put");

        let dropped = cache
            .invalidate_collections(ResourceKind::Order)
            .expect("invalidate");
        assert_eq!(dropped, 2);

        let gone: Option<Cached<Page<Snapshot>>> = cache
            .lookup_page(&mine, 1, Duration::from_secs(60))
            .expect("lookup");
        assert!(gone.is_none());
    }

    #[test]
    fn prune_removes_only_entries_past_their_class_ttl() {
        let cache = store();
        cache
            .put(&ResourceId::event("live"), &snapshot("a"), TtlClass::Media)
            .expect("put");

        // Forge an already-expired record by writing one with a timestamp in
        // the past.
        let expired = StoredRecord {
            payload: bincode::serialize(&snapshot("b")).expect("encode"),
            fetched_at_ms: now_ms() - 120_000,
            class: TtlClass::Volatile,
        };
        cache
            .backend
            .store(
                &entity_key(&ResourceId::event("dead")),
                bincode::serialize(&expired).expect("encode"),
            )
            .expect("store");

        assert_eq!(cache.prune_expired().expect("prune"), 1);
        assert_eq!(cache.stats().items, 1);
    }

    #[test]
    fn stats_count_hits_and_misses() {
        let cache = store();
        let rid = ResourceId::user("u1");
        let _: Option<Cached<Snapshot>> =
            cache.get(&rid, Duration::from_secs(60)).expect("get");
        cache
            .put(&rid, &snapshot("me"), TtlClass::Profile)
            .expect("put");
        let _: Option<Cached<Snapshot>> =
            cache.get(&rid, Duration::from_secs(60)).expect("get");

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }
}
