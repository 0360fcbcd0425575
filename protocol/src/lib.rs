//! Wire and domain types shared between the plaza data-access core and its
//! frontends. Everything here is a plain serde record; no I/O happens in this
//! crate.

pub mod envelope;
pub mod ids;
pub mod models;
pub mod topic;

pub use envelope::Envelope;
pub use envelope::ListEnvelope;
pub use envelope::Page;
pub use envelope::PageMeta;
pub use envelope::PageRequest;
pub use ids::CollectionKey;
pub use ids::ResourceId;
pub use ids::ResourceKind;
pub use models::Identify;
pub use topic::LivePayload;
pub use topic::Topic;
pub use topic::TopicError;
