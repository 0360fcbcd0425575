use bytes::Bytes;
use reqwest::Method;
use reqwest::StatusCode;
use reqwest::multipart::Form;
use reqwest::multipart::Part;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use plaza_protocol::Envelope;
use plaza_protocol::ListEnvelope;
use plaza_protocol::Page;
use plaza_protocol::PageMeta;
use plaza_protocol::PageRequest;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::session::SessionManager;

/// A named binary part of a multipart upload. Owns its bytes so the form can
/// be rebuilt if the request is retried after a token refresh.
#[derive(Debug, Clone)]
pub struct MultipartPart {
    pub name: String,
    pub file_name: String,
    pub mime: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, Default)]
pub struct MultipartBody {
    pub fields: Vec<(String, String)>,
    pub parts: Vec<MultipartPart>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn part(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        bytes: Bytes,
    ) -> Self {
        self.parts.push(MultipartPart {
            name: name.into(),
            file_name: file_name.into(),
            mime: mime.into(),
            bytes,
        });
        self
    }

    fn to_form(&self) -> Form {
        let mut form = Form::new();
        for (name, value) in &self.fields {
            form = form.text(name.clone(), value.clone());
        }
        for part in &self.parts {
            let piece = Part::bytes(part.bytes.to_vec()).file_name(part.file_name.clone());
            let piece = piece.mime_str(&part.mime).unwrap_or_else(|_| {
                Part::bytes(part.bytes.to_vec()).file_name(part.file_name.clone())
            });
            form = form.part(part.name.clone(), piece);
        }
        form
    }
}

#[derive(Debug, Default)]
pub struct RequestOptions {
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub multipart: Option<MultipartBody>,
}

impl RequestOptions {
    pub fn query(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            query: pairs.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn json(body: serde_json::Value) -> Self {
        Self {
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn multipart(body: MultipartBody) -> Self {
        Self {
            multipart: Some(body),
            ..Self::default()
        }
    }
}

/// Authenticated request executor. Stateless apart from immutable
/// configuration; freely shared across concurrent callers.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    session: Arc<SessionManager>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, session: Arc<SessionManager>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            session,
        })
    }

    /// Request + single-resource envelope decode.
    pub async fn entity<T>(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let response = self.execute(method, path, &options).await?;
        decode_entity(response).await
    }

    /// Request + list envelope decode.
    pub async fn page<T>(
        &self,
        method: Method,
        path: &str,
        request: PageRequest,
        mut options: RequestOptions,
    ) -> Result<Page<T>, ApiError>
    where
        T: DeserializeOwned,
    {
        options
            .query
            .extend(request.query().map(|(k, v)| (k.to_string(), v)));
        let response = self.execute(method, path, &options).await?;
        decode_page(response, request).await
    }

    /// Request for a raw body (media blobs); no envelope.
    pub async fn raw(&self, method: Method, path: &str) -> Result<Bytes, ApiError> {
        let response = self
            .execute(method, path, &RequestOptions::default())
            .await?;
        response
            .bytes()
            .await
            .map_err(|err| ApiError::Decode(err.to_string()))
    }

    /// Request where only success/failure matters.
    pub async fn accept(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<(), ApiError> {
        let response = self.execute(method, path, &options).await?;
        let envelope: Envelope<serde_json::Value> = response
            .json()
            .await
            .map_err(|err| ApiError::Decode(err.to_string()))?;
        if envelope.success {
            Ok(())
        } else {
            Err(rejected(envelope.message))
        }
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        options: &RequestOptions,
    ) -> Result<reqwest::Response, ApiError> {
        let token = self.session.bearer().await;
        let response = self
            .send_once(method.clone(), path, options, token.as_deref())
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response).await;
        }

        // One refresh attempt, shared with any other call that 401s at the
        // same moment; a second 401 after the retry is terminal.
        let refreshed = self.session.refresh(token.as_deref()).await?;
        let retried = self
            .send_once(method, path, options, Some(&refreshed))
            .await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthenticated);
        }
        check_status(retried).await
    }

    async fn send_once(
        &self,
        method: Method,
        path: &str,
        options: &RequestOptions,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = self.endpoint(path)?;
        debug!(%method, path, "api request");
        let mut request = self.http.request(method, url);
        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = &options.body {
            request = request.json(body);
        }
        if let Some(multipart) = &options.multipart {
            request = request.multipart(multipart.to_form());
        }
        request.send().await.map_err(ApiError::from)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Url::parse(&format!("{base}/{path}"))
            .map_err(|err| ApiError::Decode(format!("invalid request url: {err}")))
    }
}

fn rejected(message: Option<String>) -> ApiError {
    ApiError::Server {
        status: 200,
        message: message.unwrap_or_else(|| "request rejected".to_string()),
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    debug!(status = status.as_u16(), "api error response");
    let message = response
        .json::<Envelope<serde_json::Value>>()
        .await
        .ok()
        .and_then(|envelope| envelope.message)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
    Err(ApiError::from_status(status.as_u16(), message))
}

async fn decode_entity<T>(response: reqwest::Response) -> Result<T, ApiError>
where
    T: DeserializeOwned,
{
    let envelope: Envelope<T> = response
        .json()
        .await
        .map_err(|err| ApiError::Decode(err.to_string()))?;
    if !envelope.success {
        return Err(rejected(envelope.message));
    }
    envelope
        .data
        .ok_or_else(|| ApiError::Decode("response envelope missing data".to_string()))
}

async fn decode_page<T>(
    response: reqwest::Response,
    request: PageRequest,
) -> Result<Page<T>, ApiError>
where
    T: DeserializeOwned,
{
    let envelope: ListEnvelope<T> = response
        .json()
        .await
        .map_err(|err| ApiError::Decode(err.to_string()))?;
    if !envelope.success {
        return Err(rejected(envelope.message));
    }
    let meta = envelope.metadata.unwrap_or(PageMeta {
        page: request.page,
        limit: request.limit,
        total_count: envelope.data.len() as u64,
        has_more: false,
    });
    Ok(Page {
        items: envelope.data,
        meta,
    })
}
