use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use plaza_protocol::Topic;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::live::LiveFrames;
use crate::live::PushTransport;
use crate::session::SessionManager;

/// Server-sent-events transport: one long-lived GET per topic, frames as SSE
/// `data:` lines carrying the same JSON resource shapes as the REST API.
pub struct SseTransport {
    http: reqwest::Client,
    base_url: Url,
    live_path: String,
    session: Arc<SessionManager>,
}

impl SseTransport {
    pub fn new(config: &ClientConfig, session: Arc<SessionManager>) -> Result<Self, ApiError> {
        // No request timeout here: the stream is supposed to stay open.
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            live_path: config.live_path.clone(),
            session,
        })
    }

    fn endpoint(&self, topic: &Topic) -> Result<Url, ApiError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = self.live_path.trim_matches('/');
        Url::parse(&format!("{base}/{path}/{topic}"))
            .map_err(|err| ApiError::Decode(format!("invalid live url: {err}")))
    }
}

#[async_trait]
impl PushTransport for SseTransport {
    async fn open(&self, topic: &Topic) -> Result<LiveFrames, ApiError> {
        let url = self.endpoint(topic)?;
        debug!(%topic, "opening live stream");
        let mut request = self.http.get(url);
        if let Some(token) = self.session.bearer().await {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::from_status(status.as_u16(), String::new()));
        }

        let frames = response.bytes_stream().eventsource().map(|event| match event {
            Ok(event) => serde_json::from_str::<serde_json::Value>(&event.data)
                .map_err(|err| ApiError::Decode(err.to_string())),
            Err(err) => Err(ApiError::Decode(err.to_string())),
        });
        Ok(Box::pin(frames))
    }
}
