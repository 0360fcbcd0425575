use serde::Deserialize;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::ids::ResourceId;
use crate::ids::ResourceKind;
use crate::models::Event;
use crate::models::Message;
use crate::models::Notification;
use crate::models::TypingEvent;

/// One live-update subscription key, `<resourceType>.<id>[.<subresource>]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic {
    pub kind: ResourceKind,
    pub id: String,
    pub facet: Option<String>,
}

impl Topic {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            facet: None,
        }
    }

    pub fn event(id: impl Into<String>) -> Self {
        Self::new(ResourceKind::Event, id)
    }

    pub fn conversation(id: impl Into<String>) -> Self {
        Self::new(ResourceKind::Conversation, id)
    }

    pub fn typing(conversation_id: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Conversation,
            id: conversation_id.into(),
            facet: Some("typing".to_string()),
        }
    }

    pub fn notifications(user_id: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::User,
            id: user_id.into(),
            facet: Some("notifications".to_string()),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.facet {
            Some(facet) => write!(f, "{}.{}.{facet}", self.kind, self.id),
            None => write!(f, "{}.{}", self.kind, self.id),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopicError {
    #[error("empty topic")]
    Empty,
    #[error("unknown resource type `{0}`")]
    UnknownKind(String),
    #[error("topic `{0}` is missing a resource id")]
    MissingId(String),
}

impl FromStr for Topic {
    type Err = TopicError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.is_empty() {
            return Err(TopicError::Empty);
        }
        let mut parts = raw.splitn(3, '.');
        let kind = parts.next().unwrap_or_default();
        let kind = ResourceKind::parse(kind)
            .ok_or_else(|| TopicError::UnknownKind(kind.to_string()))?;
        let id = parts
            .next()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| TopicError::MissingId(raw.to_string()))?;
        Ok(Self {
            kind,
            id: id.to_string(),
            facet: parts.next().map(str::to_string),
        })
    }
}

/// A decoded push frame. The expected shape is picked by topic family, not by
/// a type tag in the payload.
#[derive(Debug, Clone, PartialEq)]
pub enum LivePayload {
    /// `event.<id>` — a full refreshed event record.
    Event(Event),
    /// `conversation.<id>` — a new, edited, or deleted message.
    Message(Message),
    /// `conversation.<id>.typing` — ephemeral typing indicator.
    Typing(TypingEvent),
    /// `user.<id>.notifications` — a notification for the session user.
    Notification(Notification),
}

impl LivePayload {
    pub fn decode(topic: &Topic, data: &serde_json::Value) -> Result<Self, serde_json::Error> {
        match (topic.kind, topic.facet.as_deref()) {
            (ResourceKind::Conversation, Some("typing")) => {
                serde_json::from_value(data.clone()).map(LivePayload::Typing)
            }
            (ResourceKind::Conversation, _) => {
                serde_json::from_value(data.clone()).map(LivePayload::Message)
            }
            (ResourceKind::User, Some("notifications")) => {
                serde_json::from_value(data.clone()).map(LivePayload::Notification)
            }
            _ => serde_json::from_value(data.clone()).map(LivePayload::Event),
        }
    }

    /// The cache entry this payload refreshes; `None` for ephemeral frames.
    pub fn resource_id(&self) -> Option<ResourceId> {
        match self {
            LivePayload::Event(event) => Some(ResourceId::event(&event.id)),
            LivePayload::Message(message) => Some(ResourceId::message(&message.id)),
            LivePayload::Typing(_) => None,
            LivePayload::Notification(notification) => Some(ResourceId::new(
                ResourceKind::Notification,
                &notification.id,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_bare_and_faceted_topics() {
        let plain: Topic = "conversation.77".parse().expect("parse");
        assert_eq!(plain, Topic::conversation("77"));

        let faceted: Topic = "conversation.77.typing".parse().expect("parse");
        assert_eq!(faceted, Topic::typing("77"));
        assert_eq!(faceted.to_string(), "conversation.77.typing");
    }

    #[test]
    fn rejects_malformed_topics() {
        assert_eq!("".parse::<Topic>(), Err(TopicError::Empty));
        assert_eq!(
            "widget.9".parse::<Topic>(),
            Err(TopicError::UnknownKind("widget".to_string()))
        );
        assert_eq!(
            "event".parse::<Topic>(),
            Err(TopicError::MissingId("event".to_string()))
        );
    }

    #[test]
    fn typing_frames_decode_against_the_typing_shape() {
        let topic = Topic::typing("77");
        let data = serde_json::json!({
            "conversationId": "77",
            "userId": "u1",
            "at": "2026-01-10T12:00:00Z",
        });
        let payload = LivePayload::decode(&topic, &data).expect("decode");
        assert!(matches!(payload, LivePayload::Typing(_)));
        assert_eq!(payload.resource_id(), None);
    }
}
