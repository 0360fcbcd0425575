use reqwest::Method;

use plaza_protocol::CollectionKey;
use plaza_protocol::Page;
use plaza_protocol::PageRequest;
use plaza_protocol::ResourceKind;
use plaza_protocol::Topic;
use plaza_protocol::models::Notification;

use crate::cache::Cached;
use crate::cache::TtlClass;
use crate::error::ApiError;
use crate::live::LiveHub;
use crate::live::LiveStream;
use crate::repository::Context;
use crate::repository::Invalidate;
use crate::transport::RequestOptions;

pub struct NotificationsRepository {
    ctx: Context,
    live: LiveHub,
}

impl NotificationsRepository {
    pub(crate) fn new(ctx: Context, live: LiveHub) -> Self {
        Self { ctx, live }
    }

    /// The notification shade tolerates emptiness but not errors, so a failed
    /// fetch with no cache degrades to an empty page instead of raising.
    pub async fn list(&self, request: PageRequest) -> Result<Cached<Page<Notification>>, ApiError> {
        self.ctx
            .read_page(
                &CollectionKey::notifications(),
                "/notifications",
                request,
                Vec::new(),
                TtlClass::Volatile,
                true,
            )
            .await
    }

    pub async fn mark_read(&self, id: &str) -> Result<Notification, ApiError> {
        self.ctx
            .mutate(
                Method::POST,
                &format!("/notifications/{id}/read"),
                RequestOptions::default(),
                Invalidate::class(TtlClass::Volatile).kind(ResourceKind::Notification),
            )
            .await
    }

    pub async fn mark_all_read(&self) -> Result<(), ApiError> {
        self.ctx
            .mutate_empty(
                Method::POST,
                "/notifications/read-all",
                RequestOptions::default(),
                vec![ResourceKind::Notification],
            )
            .await
    }

    /// Push-delivered notifications for the session user.
    pub fn observe(&self, user_id: &str) -> LiveStream {
        self.live.observe(&Topic::notifications(user_id))
    }
}
