use reqwest::Method;
use uuid::Uuid;

use plaza_protocol::CollectionKey;
use plaza_protocol::Page;
use plaza_protocol::PageRequest;
use plaza_protocol::ResourceId;
use plaza_protocol::Topic;
use plaza_protocol::models::Conversation;
use plaza_protocol::models::Message;

use crate::cache::Cached;
use crate::cache::TtlClass;
use crate::error::ApiError;
use crate::live::LiveHub;
use crate::live::LiveStream;
use crate::repository::Context;
use crate::repository::Invalidate;
use crate::transport::RequestOptions;

/// Chat access. The cache's last-writer-wins semantics give no cross-call
/// ordering: callers that need strict message ordering keep one in-flight
/// mutation per conversation at a time.
pub struct ChatRepository {
    ctx: Context,
    live: LiveHub,
}

impl ChatRepository {
    pub(crate) fn new(ctx: Context, live: LiveHub) -> Self {
        Self { ctx, live }
    }

    pub async fn conversations(
        &self,
        request: PageRequest,
    ) -> Result<Cached<Page<Conversation>>, ApiError> {
        self.ctx
            .read_page(
                &CollectionKey::conversations(),
                "/conversations",
                request,
                Vec::new(),
                TtlClass::Volatile,
                false,
            )
            .await
    }

    pub async fn get_conversation(&self, id: &str) -> Result<Cached<Conversation>, ApiError> {
        self.ctx
            .read_entity(
                &ResourceId::conversation(id),
                &format!("/conversations/{id}"),
                TtlClass::Volatile,
            )
            .await
    }

    pub async fn messages(
        &self,
        conversation_id: &str,
        request: PageRequest,
    ) -> Result<Cached<Page<Message>>, ApiError> {
        self.ctx
            .read_page(
                &CollectionKey::messages(conversation_id),
                &format!("/conversations/{conversation_id}/messages"),
                request,
                Vec::new(),
                TtlClass::Volatile,
                false,
            )
            .await
    }

    pub async fn send(&self, conversation_id: &str, body: &str) -> Result<Message, ApiError> {
        let payload = serde_json::json!({
            "body": body,
            "clientRef": Uuid::new_v4().to_string(),
        });
        self.ctx
            .mutate(
                Method::POST,
                &format!("/conversations/{conversation_id}/messages"),
                RequestOptions::json(payload),
                self.message_invalidations(conversation_id),
            )
            .await
    }

    pub async fn edit(
        &self,
        conversation_id: &str,
        message_id: &str,
        body: &str,
    ) -> Result<Message, ApiError> {
        self.ctx
            .mutate(
                Method::PUT,
                &format!("/messages/{message_id}"),
                RequestOptions::json(serde_json::json!({ "body": body })),
                self.message_invalidations(conversation_id),
            )
            .await
    }

    /// Deletion returns the tombstoned message (`deleted: true`).
    pub async fn delete(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<Message, ApiError> {
        self.ctx
            .mutate(
                Method::DELETE,
                &format!("/messages/{message_id}"),
                RequestOptions::default(),
                self.message_invalidations(conversation_id),
            )
            .await
    }

    /// New, edited, and deleted messages for one conversation.
    pub fn observe(&self, conversation_id: &str) -> LiveStream {
        self.live.observe(&Topic::conversation(conversation_id))
    }

    /// Ephemeral typing indicators; never cached.
    pub fn observe_typing(&self, conversation_id: &str) -> LiveStream {
        self.live.observe(&Topic::typing(conversation_id))
    }

    /// A message mutation moves the conversation's preview and ordering too.
    fn message_invalidations(&self, conversation_id: &str) -> Invalidate {
        Invalidate::class(TtlClass::Volatile)
            .collection(CollectionKey::messages(conversation_id))
            .collection(CollectionKey::conversations())
            .entity(ResourceId::conversation(conversation_id))
    }
}
