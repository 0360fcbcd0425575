use reqwest::Method;

use plaza_protocol::CollectionKey;
use plaza_protocol::Page;
use plaza_protocol::PageRequest;
use plaza_protocol::ResourceId;
use plaza_protocol::ResourceKind;
use plaza_protocol::Topic;
use plaza_protocol::models::Event;
use plaza_protocol::models::EventDraft;

use crate::cache::Cached;
use crate::cache::TtlClass;
use crate::error::ApiError;
use crate::live::LiveHub;
use crate::live::LiveStream;
use crate::repository::Context;
use crate::repository::Invalidate;
use crate::transport::RequestOptions;

pub struct EventsRepository {
    ctx: Context,
    live: LiveHub,
}

impl EventsRepository {
    pub(crate) fn new(ctx: Context, live: LiveHub) -> Self {
        Self { ctx, live }
    }

    /// Browse events, optionally narrowed to one category. Pages are cached
    /// per (category, page) and every returned event seeds the entity cache.
    pub async fn list(
        &self,
        category: Option<&str>,
        request: PageRequest,
    ) -> Result<Cached<Page<Event>>, ApiError> {
        let scope = match category {
            Some(category) => format!("category:{category}"),
            None => "all".to_string(),
        };
        let extra = category
            .map(|category| ("category".to_string(), category.to_string()))
            .into_iter()
            .collect();
        self.ctx
            .read_page(
                &CollectionKey::events(scope),
                "/events",
                request,
                extra,
                TtlClass::Volatile,
                false,
            )
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Cached<Event>, ApiError> {
        self.ctx
            .read_entity(
                &ResourceId::event(id),
                &format!("/events/{id}"),
                TtlClass::Profile,
            )
            .await
    }

    /// Poster image bytes, cached under the media TTL class.
    pub async fn poster(&self, id: &str) -> Result<Cached<Vec<u8>>, ApiError> {
        self.ctx
            .read_blob(&ResourceId::event(id), &format!("/events/{id}/poster"))
            .await
    }

    pub async fn create(&self, draft: &EventDraft) -> Result<Event, ApiError> {
        let body = serde_json::to_value(draft)
            .map_err(|err| ApiError::Decode(err.to_string()))?;
        self.ctx
            .mutate(
                Method::POST,
                "/events",
                RequestOptions::json(body),
                Invalidate::class(TtlClass::Profile).kind(ResourceKind::Event),
            )
            .await
    }

    pub async fn update(&self, id: &str, draft: &EventDraft) -> Result<Event, ApiError> {
        let body = serde_json::to_value(draft)
            .map_err(|err| ApiError::Decode(err.to_string()))?;
        self.ctx
            .mutate(
                Method::PUT,
                &format!("/events/{id}"),
                RequestOptions::json(body),
                Invalidate::class(TtlClass::Profile).kind(ResourceKind::Event),
            )
            .await
    }

    pub async fn cancel(&self, id: &str) -> Result<Event, ApiError> {
        self.ctx
            .mutate(
                Method::POST,
                &format!("/events/{id}/cancel"),
                RequestOptions::default(),
                Invalidate::class(TtlClass::Profile).kind(ResourceKind::Event),
            )
            .await
    }

    /// Live updates for one event (status flips, detail edits).
    pub fn observe(&self, id: &str) -> LiveStream {
        self.live.observe(&Topic::event(id))
    }
}
