use bytes::Bytes;
use reqwest::Method;

use plaza_protocol::ResourceId;
use plaza_protocol::ResourceKind;
use plaza_protocol::models::Report;
use plaza_protocol::models::ReportDraft;
use plaza_protocol::models::VerificationCase;

use crate::cache::Cached;
use crate::cache::TtlClass;
use crate::error::ApiError;
use crate::repository::Context;
use crate::repository::Invalidate;
use crate::transport::MultipartBody;
use crate::transport::RequestOptions;

pub struct VerificationRepository {
    ctx: Context,
}

impl VerificationRepository {
    pub(crate) fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Open a verification case with the identity document attached as a
    /// named multipart part.
    pub async fn submit(
        &self,
        file_name: &str,
        mime: &str,
        document: Bytes,
    ) -> Result<VerificationCase, ApiError> {
        let multipart = MultipartBody::new().part("document", file_name, mime, document);
        self.ctx
            .mutate(
                Method::POST,
                "/verification",
                RequestOptions::multipart(multipart),
                Invalidate::class(TtlClass::Volatile),
            )
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Cached<VerificationCase>, ApiError> {
        self.ctx
            .read_entity(
                &ResourceId::new(ResourceKind::Verification, id),
                &format!("/verification/{id}"),
                TtlClass::Volatile,
            )
            .await
    }

    pub async fn report(&self, draft: &ReportDraft) -> Result<Report, ApiError> {
        let body = serde_json::to_value(draft)
            .map_err(|err| ApiError::Decode(err.to_string()))?;
        self.ctx
            .mutate(
                Method::POST,
                "/reports",
                RequestOptions::json(body),
                Invalidate::class(TtlClass::Volatile),
            )
            .await
    }
}
