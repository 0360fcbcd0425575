use std::time::Duration;
use url::Url;

/// Every request carries this timeout; a timeout is classified as
/// `NetworkUnavailable` and feeds the offline fallback path.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_LIVE_PATH: &str = "/live";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub request_timeout: Duration,
    /// Path prefix of the live-update stream endpoint; topics are appended as
    /// one path segment, e.g. `/live/conversation.42`.
    pub live_path: String,
}

impl ClientConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            request_timeout: REQUEST_TIMEOUT,
            live_path: DEFAULT_LIVE_PATH.to_string(),
        }
    }
}
