use serde::Deserialize;
use serde::Serialize;
use std::fmt;

/// The kinds of server-side entities the client caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Event,
    Order,
    User,
    Conversation,
    Message,
    Notification,
    Payment,
    Verification,
    Report,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Event => "event",
            ResourceKind::Order => "order",
            ResourceKind::User => "user",
            ResourceKind::Conversation => "conversation",
            ResourceKind::Message => "message",
            ResourceKind::Notification => "notification",
            ResourceKind::Payment => "payment",
            ResourceKind::Verification => "verification",
            ResourceKind::Report => "report",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "event" => Some(ResourceKind::Event),
            "order" => Some(ResourceKind::Order),
            "user" => Some(ResourceKind::User),
            "conversation" => Some(ResourceKind::Conversation),
            "message" => Some(ResourceKind::Message),
            "notification" => Some(ResourceKind::Notification),
            "payment" => Some(ResourceKind::Payment),
            "verification" => Some(ResourceKind::Verification),
            "report" => Some(ResourceKind::Report),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (kind, id) pair addressing exactly one cacheable entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub id: String,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn event(id: impl Into<String>) -> Self {
        Self::new(ResourceKind::Event, id)
    }

    pub fn order(id: impl Into<String>) -> Self {
        Self::new(ResourceKind::Order, id)
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self::new(ResourceKind::User, id)
    }

    pub fn conversation(id: impl Into<String>) -> Self {
        Self::new(ResourceKind::Conversation, id)
    }

    pub fn message(id: impl Into<String>) -> Self {
        Self::new(ResourceKind::Message, id)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.id)
    }
}

/// Addresses one cached list collection, e.g. the orders of one business.
/// `scope` encodes the query that produced the collection; the page number is
/// appended by the cache store, not part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionKey {
    pub kind: ResourceKind,
    pub scope: String,
}

impl CollectionKey {
    pub fn new(kind: ResourceKind, scope: impl Into<String>) -> Self {
        Self {
            kind,
            scope: scope.into(),
        }
    }

    pub fn events(scope: impl Into<String>) -> Self {
        Self::new(ResourceKind::Event, scope)
    }

    pub fn orders_mine() -> Self {
        Self::new(ResourceKind::Order, "mine")
    }

    pub fn orders_for_business(business_id: &str) -> Self {
        Self::new(ResourceKind::Order, format!("business:{business_id}"))
    }

    pub fn conversations() -> Self {
        Self::new(ResourceKind::Conversation, "mine")
    }

    pub fn messages(conversation_id: &str) -> Self {
        Self::new(ResourceKind::Message, format!("conversation:{conversation_id}"))
    }

    pub fn notifications() -> Self {
        Self::new(ResourceKind::Notification, "mine")
    }

    pub fn search(query: &str) -> Self {
        Self::new(ResourceKind::Event, format!("search:{query}"))
    }

    pub fn recommendations() -> Self {
        Self::new(ResourceKind::Event, "recommendations")
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn resource_id_display_round_trips_kind() {
        let rid = ResourceId::event("42");
        assert_eq!(rid.to_string(), "event.42");
        assert_eq!(ResourceKind::parse("event"), Some(ResourceKind::Event));
    }

    #[test]
    fn collection_key_display_includes_scope() {
        let key = CollectionKey::new(ResourceKind::Order, "business:17");
        assert_eq!(key.to_string(), "order:business:17");
    }
}
