use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::PoisonError;
use tokio::sync::Mutex;
use tokio::sync::broadcast;
use tracing::warn;
use url::Url;

use plaza_protocol::Envelope;

use crate::error::ApiError;

/// The narrow contract the core consumes from whatever owns credentials:
/// current token, refresh, clear. Everything else about authentication is the
/// platform's business.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn token(&self) -> Option<String>;

    /// Rotate the token pair and return the new bearer token.
    async fn refresh(&self) -> Result<String, ApiError>;

    async fn clear(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Credentials are gone; route the user to re-authentication.
    SignedOut,
}

/// Wraps a [`SessionProvider`] with single-flight refresh: when many
/// concurrent calls 401 at once, exactly one refresh runs and exactly one
/// `SignedOut` is broadcast if it fails. Without this, a burst of failing
/// calls would each trigger their own refresh and logout.
pub struct SessionManager {
    provider: Arc<dyn SessionProvider>,
    refresh_gate: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn SessionProvider>) -> Self {
        let (events, _) = broadcast::channel(8);
        Self {
            provider,
            refresh_gate: Mutex::new(()),
            events,
        }
    }

    pub async fn bearer(&self) -> Option<String> {
        self.provider.token().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Called by the transport after a 401. `stale_token` is the token the
    /// failing request carried; if the session already rotated past it while
    /// this caller waited on the gate, the current token is returned without
    /// another refresh.
    pub async fn refresh(&self, stale_token: Option<&str>) -> Result<String, ApiError> {
        let _gate = self.refresh_gate.lock().await;
        match (self.provider.token().await, stale_token) {
            // Rotated while this caller waited on the gate.
            (Some(current), Some(stale)) if current != stale => return Ok(current),
            (Some(current), None) => return Ok(current),
            // Cleared while waiting: the shared refresh already failed and
            // broadcast; do not refresh or broadcast again.
            (None, Some(_)) => return Err(ApiError::Unauthenticated),
            _ => {}
        }
        match self.provider.refresh().await {
            Ok(token) => Ok(token),
            Err(ApiError::NetworkUnavailable) => {
                // A refresh that never reached the server says nothing about
                // the session; keep the credentials for when we're back.
                Err(ApiError::NetworkUnavailable)
            }
            Err(err) => {
                warn!(error = %err, "token refresh failed; clearing session");
                self.provider.clear().await;
                let _ = self.events.send(SessionEvent::SignedOut);
                Err(ApiError::Unauthenticated)
            }
        }
    }

    /// Explicit user-initiated logout.
    pub async fn sign_out(&self) {
        self.provider.clear().await;
        let _ = self.events.send(SessionEvent::SignedOut);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredTokens {
    access_token: String,
    refresh_token: String,
    last_refresh: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenPair {
    access_token: String,
    refresh_token: String,
}

/// JSON-file-backed [`SessionProvider`]: holds the token pair under the app's
/// data directory and rotates it against the backend's refresh endpoint.
pub struct FileTokenStore {
    path: PathBuf,
    refresh_url: Url,
    http: reqwest::Client,
    tokens: StdMutex<Option<StoredTokens>>,
}

impl FileTokenStore {
    pub fn open(path: impl Into<PathBuf>, refresh_url: Url) -> std::io::Result<Self> {
        let path = path.into();
        let tokens = match std::fs::read(&path) {
            Ok(raw) => serde_json::from_slice(&raw).ok(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => return Err(err),
        };
        Ok(Self {
            path,
            refresh_url,
            http: reqwest::Client::new(),
            tokens: StdMutex::new(tokens),
        })
    }

    /// Persist a token pair obtained out of band (the login flow).
    pub fn save(&self, access_token: String, refresh_token: String) -> std::io::Result<()> {
        let stored = StoredTokens {
            access_token,
            refresh_token,
            last_refresh: Utc::now(),
        };
        self.persist(&stored)?;
        *self.lock() = Some(stored);
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<StoredTokens>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, stored: &StoredTokens) -> std::io::Result<()> {
        let json = serde_json::to_vec(stored)?;
        let mut options = OpenOptions::new();
        options.truncate(true).write(true).create(true);
        #[cfg(unix)]
        {
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;
        file.write_all(&json)?;
        file.flush()
    }
}

#[async_trait]
impl SessionProvider for FileTokenStore {
    async fn token(&self) -> Option<String> {
        self.lock().as_ref().map(|t| t.access_token.clone())
    }

    async fn refresh(&self) -> Result<String, ApiError> {
        let refresh_token = self
            .lock()
            .as_ref()
            .map(|t| t.refresh_token.clone())
            .ok_or(ApiError::Unauthenticated)?;

        let response = self
            .http
            .post(self.refresh_url.clone())
            .json(&RefreshRequest {
                refresh_token: &refresh_token,
            })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::from_status(status.as_u16(), String::new()));
        }
        let envelope: Envelope<TokenPair> = response
            .json()
            .await
            .map_err(|err| ApiError::Decode(err.to_string()))?;
        let pair = envelope
            .data
            .ok_or_else(|| ApiError::Decode("refresh response missing data".to_string()))?;

        let stored = StoredTokens {
            access_token: pair.access_token.clone(),
            refresh_token: pair.refresh_token,
            last_refresh: Utc::now(),
        };
        if let Err(err) = self.persist(&stored) {
            warn!(error = %err, "failed to persist rotated tokens");
        }
        *self.lock() = Some(stored);
        Ok(pair.access_token)
    }

    async fn clear(&self) {
        *self.lock() = None;
        if let Err(err) = std::fs::remove_file(&self.path)
            && err.kind() != std::io::ErrorKind::NotFound
        {
            warn!(error = %err, "failed to remove token file");
        }
    }
}

pub fn default_token_path(base: &Path) -> PathBuf {
    base.join("tokens.json")
}
