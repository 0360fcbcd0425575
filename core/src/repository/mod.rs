//! Per-domain façades over one shared fetch/cache/invalidate protocol.
//!
//! Reads degrade silently: a failed fetch with a cached copy returns the copy
//! flagged stale. Writes never degrade: a failed mutation touches nothing and
//! surfaces its error, and a successful mutation's write-through completes
//! even if the caller abandoned the call, because a confirmed mutation is
//! authoritative server state.

mod chat;
mod discovery;
mod events;
mod notifications;
mod orders;
mod payments;
mod users;
mod verification;

pub use chat::ChatRepository;
pub use discovery::DiscoveryRepository;
pub use events::EventsRepository;
pub use notifications::NotificationsRepository;
pub use orders::OrdersRepository;
pub use payments::PaymentsRepository;
pub use users::UsersRepository;
pub use verification::VerificationRepository;

use chrono::Utc;
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;
use tracing::warn;

use plaza_protocol::CollectionKey;
use plaza_protocol::Identify;
use plaza_protocol::Page;
use plaza_protocol::PageMeta;
use plaza_protocol::PageRequest;
use plaza_protocol::ResourceId;
use plaza_protocol::ResourceKind;

use crate::cache::CacheError;
use crate::cache::CacheStore;
use crate::cache::Cached;
use crate::cache::TtlClass;
use crate::connectivity::NetworkOracle;
use crate::error::ApiError;
use crate::transport::ApiClient;
use crate::transport::RequestOptions;

/// Shared plumbing injected into every domain repository. Repositories hold
/// no private entity copies; everything round-trips through the cache store.
#[derive(Clone)]
pub(crate) struct Context {
    pub(crate) api: Arc<ApiClient>,
    pub(crate) cache: Arc<CacheStore>,
    pub(crate) network: Arc<dyn NetworkOracle>,
}

/// Cache failures never fail a repository call; the cache is an optimization,
/// not a source of truth. Log and carry on.
fn swallow<T>(result: Result<T, CacheError>, what: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(error = %err, what, "cache access failed");
            None
        }
    }
}

fn seed_items<T>(cache: &CacheStore, items: &[T], class: TtlClass)
where
    T: Identify + Serialize,
{
    for item in items {
        if swallow(cache.put(&item.resource_id(), item, class), "seed").is_none() {
            break;
        }
    }
}

fn empty_page<T>(request: PageRequest) -> Cached<Page<T>> {
    Cached {
        value: Page {
            items: Vec::new(),
            meta: PageMeta {
                page: request.page,
                limit: request.limit,
                total_count: 0,
                has_more: false,
            },
        },
        fetched_at: Utc::now(),
        stale: true,
    }
}

impl Context {
    /// Canonical single-entity read: offline → cached copy or `Unavailable`;
    /// fresh cache hit → no network call; otherwise fetch, write through, and
    /// on infrastructure failure fall back to whatever snapshot exists.
    pub(crate) async fn read_entity<T>(
        &self,
        rid: &ResourceId,
        path: &str,
        class: TtlClass,
    ) -> Result<Cached<T>, ApiError>
    where
        T: Serialize + DeserializeOwned,
    {
        let ttl = class.ttl();
        if !self.network.is_online() {
            return match swallow(self.cache.lookup::<T>(rid, ttl), "offline lookup").flatten() {
                Some(cached) => Ok(cached),
                None => Err(ApiError::Unavailable),
            };
        }
        if let Some(cached) = swallow(self.cache.get::<T>(rid, ttl), "fresh get").flatten() {
            return Ok(cached);
        }
        match self
            .api
            .entity::<T>(Method::GET, path, RequestOptions::default())
            .await
        {
            Ok(value) => {
                swallow(self.cache.put(rid, &value, class), "write-through");
                Ok(Cached::fresh(value))
            }
            Err(err) if err.allows_stale_fallback() => {
                match swallow(self.cache.lookup::<T>(rid, ttl), "stale lookup").flatten() {
                    Some(cached) => {
                        debug!(%rid, "serving cached copy after fetch failure");
                        Ok(cached)
                    }
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// List read that seeds the cache with every returned item, so follow-up
    /// single-item reads are hits.
    pub(crate) async fn read_page<T>(
        &self,
        key: &CollectionKey,
        path: &str,
        request: PageRequest,
        extra_query: Vec<(String, String)>,
        class: TtlClass,
        empty_on_failure: bool,
    ) -> Result<Cached<Page<T>>, ApiError>
    where
        T: Identify + Serialize + DeserializeOwned,
    {
        self.read_page_inner(
            key,
            path,
            request,
            extra_query,
            class,
            empty_on_failure,
            Some(seed_items::<T>),
        )
        .await
    }

    /// List read for result shapes that are not cacheable entities themselves
    /// (search hits, recommendations); no per-item seeding.
    pub(crate) async fn read_listing<T>(
        &self,
        key: &CollectionKey,
        path: &str,
        request: PageRequest,
        extra_query: Vec<(String, String)>,
        class: TtlClass,
        empty_on_failure: bool,
    ) -> Result<Cached<Page<T>>, ApiError>
    where
        T: Serialize + DeserializeOwned,
    {
        self.read_page_inner(key, path, request, extra_query, class, empty_on_failure, None)
            .await
    }

    #[expect(clippy::too_many_arguments)]
    async fn read_page_inner<T>(
        &self,
        key: &CollectionKey,
        path: &str,
        request: PageRequest,
        extra_query: Vec<(String, String)>,
        class: TtlClass,
        empty_on_failure: bool,
        seed: Option<fn(&CacheStore, &[T], TtlClass)>,
    ) -> Result<Cached<Page<T>>, ApiError>
    where
        T: Serialize + DeserializeOwned,
    {
        let ttl = class.ttl();
        if !self.network.is_online() {
            return match swallow(
                self.cache.lookup_page::<T>(key, request.page, ttl),
                "offline page lookup",
            )
            .flatten()
            {
                Some(cached) => Ok(cached),
                None if empty_on_failure => Ok(empty_page(request)),
                None => Err(ApiError::Unavailable),
            };
        }
        if let Some(cached) = swallow(
            self.cache.get_page::<T>(key, request.page, ttl),
            "fresh page get",
        )
        .flatten()
        {
            return Ok(cached);
        }
        match self
            .api
            .page::<T>(
                Method::GET,
                path,
                request,
                RequestOptions::query(extra_query),
            )
            .await
        {
            Ok(page) => {
                swallow(
                    self.cache.put_page(key, request.page, &page, class),
                    "page write-through",
                );
                if let Some(seed) = seed {
                    seed(&self.cache, &page.items, class);
                }
                Ok(Cached::fresh(page))
            }
            Err(err) if err.allows_stale_fallback() => {
                match swallow(
                    self.cache.lookup_page::<T>(key, request.page, ttl),
                    "stale page lookup",
                )
                .flatten()
                {
                    Some(cached) => {
                        debug!(%key, "serving cached page after fetch failure");
                        Ok(cached)
                    }
                    None if empty_on_failure => Ok(empty_page(request)),
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Media blob read (poster images and the like), long TTL.
    pub(crate) async fn read_blob(
        &self,
        rid: &ResourceId,
        path: &str,
    ) -> Result<Cached<Vec<u8>>, ApiError> {
        let ttl = TtlClass::Media.ttl();
        if !self.network.is_online() {
            return match swallow(self.cache.lookup_blob(rid, ttl), "offline blob").flatten() {
                Some(cached) => Ok(cached),
                None => Err(ApiError::Unavailable),
            };
        }
        if let Some(cached) = swallow(self.cache.get_blob(rid, ttl), "fresh blob").flatten() {
            return Ok(cached);
        }
        match self.api.raw(Method::GET, path).await {
            Ok(bytes) => {
                let bytes = bytes.to_vec();
                swallow(self.cache.put_blob(rid, &bytes), "blob write-through");
                Ok(Cached::fresh(bytes))
            }
            Err(err) if err.allows_stale_fallback() => {
                match swallow(self.cache.lookup_blob(rid, ttl), "stale blob").flatten() {
                    Some(cached) => Ok(cached),
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Canonical write: execute, then overwrite the entity entry with the
    /// server's authoritative record and drop the list caches it may appear
    /// in. Runs detached so dropping the caller's future cannot cancel the
    /// write-through once the request is in flight. No automatic retry.
    pub(crate) async fn mutate<T>(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
        invalidate: Invalidate,
    ) -> Result<T, ApiError>
    where
        T: Identify + Serialize + DeserializeOwned + Send + 'static,
    {
        let ctx = self.clone();
        let path = path.to_string();
        let handle = tokio::spawn(async move {
            let value = ctx.api.entity::<T>(method, &path, options).await?;
            invalidate.apply(&ctx.cache, &value);
            Ok::<T, ApiError>(value)
        });
        match handle.await {
            Ok(result) => result,
            Err(err) => Err(ApiError::Decode(format!("mutation task failed: {err}"))),
        }
    }

    /// Write where the response carries no resource; only invalidation.
    pub(crate) async fn mutate_empty(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
        kinds: Vec<ResourceKind>,
    ) -> Result<(), ApiError> {
        let ctx = self.clone();
        let path = path.to_string();
        let handle = tokio::spawn(async move {
            ctx.api.accept(method, &path, options).await?;
            for kind in kinds {
                swallow(ctx.cache.invalidate_collections(kind), "kind invalidation");
            }
            Ok::<(), ApiError>(())
        });
        match handle.await {
            Ok(result) => result,
            Err(err) => Err(ApiError::Decode(format!("mutation task failed: {err}"))),
        }
    }
}

/// What a successful mutation knocks out of the cache, beyond overwriting the
/// mutated entity itself.
pub(crate) struct Invalidate {
    class: TtlClass,
    entities: Vec<ResourceId>,
    collections: Vec<CollectionKey>,
    kinds: Vec<ResourceKind>,
}

impl Invalidate {
    pub(crate) fn class(class: TtlClass) -> Self {
        Self {
            class,
            entities: Vec::new(),
            collections: Vec::new(),
            kinds: Vec::new(),
        }
    }

    pub(crate) fn entity(mut self, rid: ResourceId) -> Self {
        self.entities.push(rid);
        self
    }

    pub(crate) fn collection(mut self, key: CollectionKey) -> Self {
        self.collections.push(key);
        self
    }

    pub(crate) fn kind(mut self, kind: ResourceKind) -> Self {
        self.kinds.push(kind);
        self
    }

    fn apply<T>(&self, cache: &CacheStore, value: &T)
    where
        T: Identify + Serialize,
    {
        swallow(
            cache.put(&value.resource_id(), value, self.class),
            "mutation write-through",
        );
        for rid in &self.entities {
            swallow(cache.invalidate(rid), "entity invalidation");
        }
        for key in &self.collections {
            swallow(cache.invalidate_collection(key), "collection invalidation");
        }
        for kind in &self.kinds {
            swallow(cache.invalidate_collections(*kind), "kind invalidation");
        }
    }
}
