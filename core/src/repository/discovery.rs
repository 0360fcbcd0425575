use plaza_protocol::CollectionKey;
use plaza_protocol::Page;
use plaza_protocol::PageRequest;
use plaza_protocol::models::Recommendation;
use plaza_protocol::models::SearchHit;

use crate::cache::Cached;
use crate::cache::TtlClass;
use crate::error::ApiError;
use crate::repository::Context;

/// AI-assisted search and recommendations. Result lists are short-lived
/// (volatile class, keyed by query) and degrade to empty rather than error:
/// a search box that throws is worse than one that finds nothing.
pub struct DiscoveryRepository {
    ctx: Context,
}

impl DiscoveryRepository {
    pub(crate) fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    pub async fn search(
        &self,
        query: &str,
        request: PageRequest,
    ) -> Result<Cached<Page<SearchHit>>, ApiError> {
        self.ctx
            .read_listing(
                &CollectionKey::search(query),
                "/search",
                request,
                vec![("q".to_string(), query.to_string())],
                TtlClass::Volatile,
                true,
            )
            .await
    }

    pub async fn recommendations(
        &self,
        request: PageRequest,
    ) -> Result<Cached<Page<Recommendation>>, ApiError> {
        self.ctx
            .read_listing(
                &CollectionKey::recommendations(),
                "/recommendations",
                request,
                Vec::new(),
                TtlClass::Volatile,
                true,
            )
            .await
    }
}
