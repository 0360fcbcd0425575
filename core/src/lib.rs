//! Offline-aware data-access core for the plaza events/marketplace client:
//! an authenticated transport, a TTL'd cache store, per-domain repositories
//! implementing one fetch/cache/invalidate protocol, and a reference-counted
//! live-update hub that merges pushed deltas into the same cache the
//! request/response paths read.

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod live;
pub mod repository;
pub mod session;
pub mod transport;

pub use cache::CacheStats;
pub use cache::CacheStore;
pub use cache::Cached;
pub use cache::TtlClass;
pub use config::ClientConfig;
pub use connectivity::AlwaysOnline;
pub use connectivity::NetworkOracle;
pub use connectivity::OnlineFlag;
pub use error::ApiError;
pub use live::LiveHub;
pub use live::LiveStream;
pub use live::PushTransport;
pub use live::SseTransport;
pub use session::FileTokenStore;
pub use session::SessionEvent;
pub use session::SessionManager;
pub use session::SessionProvider;

use std::sync::Arc;

use crate::repository::ChatRepository;
use crate::repository::Context;
use crate::repository::DiscoveryRepository;
use crate::repository::EventsRepository;
use crate::repository::NotificationsRepository;
use crate::repository::OrdersRepository;
use crate::repository::PaymentsRepository;
use crate::repository::UsersRepository;
use crate::repository::VerificationRepository;
use crate::transport::ApiClient;

/// One instance per process. All repositories share the same transport,
/// cache store, connectivity oracle, and live hub; nothing here is a global.
pub struct PlazaClient {
    session: Arc<SessionManager>,
    cache: Arc<CacheStore>,
    live: LiveHub,
    events: EventsRepository,
    orders: OrdersRepository,
    users: UsersRepository,
    chat: ChatRepository,
    notifications: NotificationsRepository,
    payments: PaymentsRepository,
    verification: VerificationRepository,
    discovery: DiscoveryRepository,
}

impl PlazaClient {
    pub fn new(
        config: ClientConfig,
        provider: Arc<dyn SessionProvider>,
        cache: CacheStore,
        network: Arc<dyn NetworkOracle>,
    ) -> Result<Self, ApiError> {
        let session = Arc::new(SessionManager::new(provider));
        let push = Arc::new(SseTransport::new(&config, Arc::clone(&session))?);
        Self::with_push_transport(config, session, cache, network, push)
    }

    /// Assembly with an explicit push transport; tests inject scripted ones.
    pub fn with_push_transport(
        config: ClientConfig,
        session: Arc<SessionManager>,
        cache: CacheStore,
        network: Arc<dyn NetworkOracle>,
        push: Arc<dyn PushTransport>,
    ) -> Result<Self, ApiError> {
        let api = Arc::new(ApiClient::new(&config, Arc::clone(&session))?);
        let cache = Arc::new(cache);
        let live = LiveHub::new(push, Arc::clone(&cache));
        let ctx = Context {
            api,
            cache: Arc::clone(&cache),
            network,
        };
        Ok(Self {
            events: EventsRepository::new(ctx.clone(), live.clone()),
            orders: OrdersRepository::new(ctx.clone()),
            users: UsersRepository::new(ctx.clone()),
            chat: ChatRepository::new(ctx.clone(), live.clone()),
            notifications: NotificationsRepository::new(ctx.clone(), live.clone()),
            payments: PaymentsRepository::new(ctx.clone()),
            verification: VerificationRepository::new(ctx.clone()),
            discovery: DiscoveryRepository::new(ctx),
            session,
            cache,
            live,
        })
    }

    pub fn events(&self) -> &EventsRepository {
        &self.events
    }

    pub fn orders(&self) -> &OrdersRepository {
        &self.orders
    }

    pub fn users(&self) -> &UsersRepository {
        &self.users
    }

    pub fn chat(&self) -> &ChatRepository {
        &self.chat
    }

    pub fn notifications(&self) -> &NotificationsRepository {
        &self.notifications
    }

    pub fn payments(&self) -> &PaymentsRepository {
        &self.payments
    }

    pub fn verification(&self) -> &VerificationRepository {
        &self.verification
    }

    pub fn discovery(&self) -> &DiscoveryRepository {
        &self.discovery
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn live(&self) -> &LiveHub {
        &self.live
    }
}
