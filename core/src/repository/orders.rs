use reqwest::Method;

use plaza_protocol::CollectionKey;
use plaza_protocol::Page;
use plaza_protocol::PageRequest;
use plaza_protocol::ResourceId;
use plaza_protocol::ResourceKind;
use plaza_protocol::models::Order;
use plaza_protocol::models::OrderDraft;
use plaza_protocol::models::OrderStatus;

use crate::cache::Cached;
use crate::cache::TtlClass;
use crate::error::ApiError;
use crate::repository::Context;
use crate::repository::Invalidate;
use crate::transport::RequestOptions;

pub struct OrdersRepository {
    ctx: Context,
}

impl OrdersRepository {
    pub(crate) fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Orders placed by the session user.
    pub async fn list_mine(&self, request: PageRequest) -> Result<Cached<Page<Order>>, ApiError> {
        self.ctx
            .read_page(
                &CollectionKey::orders_mine(),
                "/orders",
                request,
                Vec::new(),
                TtlClass::Volatile,
                false,
            )
            .await
    }

    /// Incoming orders of one business.
    pub async fn list_for_business(
        &self,
        business_id: &str,
        request: PageRequest,
    ) -> Result<Cached<Page<Order>>, ApiError> {
        self.ctx
            .read_page(
                &CollectionKey::orders_for_business(business_id),
                &format!("/businesses/{business_id}/orders"),
                request,
                Vec::new(),
                TtlClass::Volatile,
                false,
            )
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Cached<Order>, ApiError> {
        self.ctx
            .read_entity(
                &ResourceId::order(id),
                &format!("/orders/{id}"),
                TtlClass::Volatile,
            )
            .await
    }

    pub async fn place(&self, draft: &OrderDraft) -> Result<Order, ApiError> {
        let body = serde_json::to_value(draft)
            .map_err(|err| ApiError::Decode(err.to_string()))?;
        self.ctx
            .mutate(
                Method::POST,
                "/orders",
                RequestOptions::json(body),
                Invalidate::class(TtlClass::Volatile).kind(ResourceKind::Order),
            )
            .await
    }

    /// Advance an order. The server rejects duplicate transitions with 409,
    /// surfaced as [`ApiError::Conflict`]; the cache stays untouched then.
    pub async fn set_status(&self, id: &str, status: OrderStatus) -> Result<Order, ApiError> {
        self.ctx
            .mutate(
                Method::POST,
                &format!("/orders/{id}/status"),
                RequestOptions::json(serde_json::json!({ "status": status })),
                Invalidate::class(TtlClass::Volatile).kind(ResourceKind::Order),
            )
            .await
    }

    pub async fn cancel(&self, id: &str) -> Result<Order, ApiError> {
        self.ctx
            .mutate(
                Method::POST,
                &format!("/orders/{id}/cancel"),
                RequestOptions::default(),
                Invalidate::class(TtlClass::Volatile).kind(ResourceKind::Order),
            )
            .await
    }
}
