use reqwest::Method;

use plaza_protocol::ResourceId;
use plaza_protocol::ResourceKind;
use plaza_protocol::models::PaymentDraft;
use plaza_protocol::models::PaymentRecord;

use crate::cache::Cached;
use crate::cache::TtlClass;
use crate::error::ApiError;
use crate::repository::Context;
use crate::repository::Invalidate;
use crate::transport::RequestOptions;

/// Payment state is only ever cached under the volatile class; the provider
/// SDK token inside a draft is opaque and passed through untouched.
pub struct PaymentsRepository {
    ctx: Context,
}

impl PaymentsRepository {
    pub(crate) fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// A settled payment changes the order it pays for, so the order entry
    /// and order lists go too.
    pub async fn create(&self, draft: &PaymentDraft) -> Result<PaymentRecord, ApiError> {
        let body = serde_json::to_value(draft)
            .map_err(|err| ApiError::Decode(err.to_string()))?;
        self.ctx
            .mutate(
                Method::POST,
                "/payments",
                RequestOptions::json(body),
                Invalidate::class(TtlClass::Volatile)
                    .entity(ResourceId::order(&draft.order_id))
                    .kind(ResourceKind::Order),
            )
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Cached<PaymentRecord>, ApiError> {
        self.ctx
            .read_entity(
                &ResourceId::new(ResourceKind::Payment, id),
                &format!("/payments/{id}"),
                TtlClass::Volatile,
            )
            .await
    }
}
