//! Push-subscription registry: at most one upstream subscription per topic,
//! fanned out to any number of consumers, torn down when the last consumer
//! detaches. Valid frames are written through the cache store before being
//! re-emitted, so polled reads and live reads converge on the same snapshots.

mod sse;

pub use sse::SseTransport;

use async_trait::async_trait;
use futures::Stream;
use futures::StreamExt;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::Weak;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::warn;

use plaza_protocol::CollectionKey;
use plaza_protocol::LivePayload;
use plaza_protocol::ResourceId;
use plaza_protocol::ResourceKind;
use plaza_protocol::Topic;

use crate::cache::CacheStore;
use crate::cache::TtlClass;
use crate::error::ApiError;

const CHANNEL_CAPACITY: usize = 64;

pub type LiveFrames = Pin<Box<dyn Stream<Item = Result<serde_json::Value, ApiError>> + Send>>;

/// The upstream push channel: opens one frame stream per topic. The hub owns
/// reference counting and fan-out; implementations only speak the wire.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn open(&self, topic: &Topic) -> Result<LiveFrames, ApiError>;
}

/// Per-topic lifecycle. `Unsubscribed` is the absent state: a topic with no
/// registry entry has no upstream channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Subscribing,
    Active,
    Closed,
}

struct TopicChannel {
    state: ChannelState,
    /// Distinguishes this channel from earlier ones on the same topic, so a
    /// straggling consumer of a closed channel cannot release a replacement.
    generation: u64,
    /// Dropped when the upstream ends so consumers observe stream close.
    sender: Option<broadcast::Sender<LivePayload>>,
    consumers: usize,
    task: JoinHandle<()>,
}

#[derive(Clone)]
pub struct LiveHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    transport: Arc<dyn PushTransport>,
    cache: Arc<CacheStore>,
    topics: Mutex<HashMap<Topic, TopicChannel>>,
    generations: AtomicU64,
}

impl LiveHub {
    pub fn new(transport: Arc<dyn PushTransport>, cache: Arc<CacheStore>) -> Self {
        Self {
            inner: Arc::new(HubInner {
                transport,
                cache,
                topics: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
            }),
        }
    }

    /// Attach a consumer to `topic`, creating the upstream subscription on
    /// first attach. Subsequent observers of the same topic share the
    /// existing channel. Must be called from within a tokio runtime.
    pub fn observe(&self, topic: &Topic) -> LiveStream {
        let mut topics = self.inner.lock_topics();
        if let Some(channel) = topics.get_mut(topic)
            && channel.state != ChannelState::Closed
            && let Some(rx) = channel.sender.as_ref().map(|sender| sender.subscribe())
        {
            channel.consumers += 1;
            return LiveStream {
                topic: topic.clone(),
                generation: channel.generation,
                rx,
                hub: Arc::downgrade(&self.inner),
            };
        }

        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let (sender, rx) = broadcast::channel(CHANNEL_CAPACITY);
        let task = tokio::spawn(run_topic(
            Arc::downgrade(&self.inner),
            topic.clone(),
            sender.clone(),
        ));
        topics.insert(
            topic.clone(),
            TopicChannel {
                state: ChannelState::Subscribing,
                generation,
                sender: Some(sender),
                consumers: 1,
                task,
            },
        );
        LiveStream {
            topic: topic.clone(),
            generation,
            rx,
            hub: Arc::downgrade(&self.inner),
        }
    }

    pub fn state(&self, topic: &Topic) -> Option<ChannelState> {
        self.inner.lock_topics().get(topic).map(|c| c.state)
    }
}

impl HubInner {
    fn lock_topics(&self) -> std::sync::MutexGuard<'_, HashMap<Topic, TopicChannel>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, topic: &Topic, generation: u64) {
        let mut topics = self.lock_topics();
        let Some(channel) = topics.get_mut(topic) else {
            return;
        };
        if channel.generation != generation {
            return;
        }
        channel.consumers = channel.consumers.saturating_sub(1);
        if channel.consumers == 0 {
            if let Some(channel) = topics.remove(topic) {
                channel.task.abort();
            }
            debug!(%topic, "live channel released");
        }
    }

    /// Upstream ended or never opened; keep the entry (consumers still hold
    /// references) but drop the sender so their streams terminate.
    fn close(&self, topic: &Topic) {
        let mut topics = self.lock_topics();
        if let Some(channel) = topics.get_mut(topic) {
            channel.state = ChannelState::Closed;
            channel.sender = None;
        }
    }

    fn set_active(&self, topic: &Topic) {
        let mut topics = self.lock_topics();
        if let Some(channel) = topics.get_mut(topic)
            && channel.state == ChannelState::Subscribing
        {
            channel.state = ChannelState::Active;
        }
    }
}

/// One consumer's view of a topic stream. Dropping it detaches the consumer;
/// the upstream subscription closes when the last one goes.
pub struct LiveStream {
    topic: Topic,
    generation: u64,
    rx: broadcast::Receiver<LivePayload>,
    hub: Weak<HubInner>,
}

impl LiveStream {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Next decoded payload, or `None` once the channel is closed. A slow
    /// consumer that lags the fan-out buffer skips to the oldest retained
    /// frame rather than erroring.
    pub async fn next(&mut self) -> Option<LivePayload> {
        loop {
            match self.rx.recv().await {
                Ok(payload) => return Some(payload),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(topic = %self.topic, skipped, "live consumer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for LiveStream {
    fn drop(&mut self) {
        if let Some(inner) = self.hub.upgrade() {
            inner.release(&self.topic, self.generation);
        }
    }
}

async fn run_topic(inner: Weak<HubInner>, topic: Topic, sender: broadcast::Sender<LivePayload>) {
    let Some(hub) = inner.upgrade() else {
        return;
    };
    let transport = Arc::clone(&hub.transport);
    let cache = Arc::clone(&hub.cache);
    drop(hub);

    let mut frames = match transport.open(&topic).await {
        Ok(frames) => frames,
        Err(err) => {
            warn!(%topic, error = %err, "live subscription failed to open");
            close(&inner, &topic);
            return;
        }
    };
    if let Some(hub) = inner.upgrade() {
        hub.set_active(&topic);
    }
    debug!(%topic, "live channel active");

    while let Some(frame) = frames.next().await {
        let data = match frame {
            Ok(data) => data,
            Err(err) => {
                // One bad frame must not take the stream down.
                warn!(%topic, error = %err, "dropping undecodable live frame");
                continue;
            }
        };
        let payload = match LivePayload::decode(&topic, &data) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%topic, error = %err, "dropping malformed live frame");
                continue;
            }
        };
        write_through(&cache, &payload);
        let _ = sender.send(payload);
    }

    close(&inner, &topic);
}

fn close(inner: &Weak<HubInner>, topic: &Topic) {
    if let Some(hub) = inner.upgrade() {
        hub.close(topic);
    }
}

/// Merge a pushed snapshot into the cache so the next polled read agrees with
/// what live consumers saw.
fn write_through(cache: &CacheStore, payload: &LivePayload) {
    let result = match payload {
        LivePayload::Event(event) => {
            cache.put(&ResourceId::event(&event.id), event, TtlClass::Profile)
        }
        LivePayload::Message(message) => cache
            .put(
                &ResourceId::message(&message.id),
                message,
                TtlClass::Volatile,
            )
            .and_then(|()| {
                cache
                    .invalidate_collection(&CollectionKey::messages(&message.conversation_id))
                    .map(|_| ())
            }),
        LivePayload::Typing(_) => Ok(()),
        LivePayload::Notification(notification) => cache
            .put(
                &ResourceId::new(ResourceKind::Notification, &notification.id),
                notification,
                TtlClass::Volatile,
            )
            .and_then(|()| {
                cache
                    .invalidate_collections(ResourceKind::Notification)
                    .map(|_| ())
            }),
    };
    if let Err(err) = result {
        warn!(error = %err, "live cache write-through failed");
    }
}
