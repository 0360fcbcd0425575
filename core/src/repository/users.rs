use bytes::Bytes;
use reqwest::Method;

use plaza_protocol::ResourceId;
use plaza_protocol::models::ProfileUpdate;
use plaza_protocol::models::UserProfile;

use crate::cache::Cached;
use crate::cache::TtlClass;
use crate::error::ApiError;
use crate::repository::Context;
use crate::repository::Invalidate;
use crate::transport::MultipartBody;
use crate::transport::RequestOptions;

/// The session user's profile is cached under the `me` alias as well as its
/// real id, so profile mutations must knock out the alias entry.
const ME: &str = "me";

pub struct UsersRepository {
    ctx: Context,
}

impl UsersRepository {
    pub(crate) fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    pub async fn me(&self) -> Result<Cached<UserProfile>, ApiError> {
        self.ctx
            .read_entity(&ResourceId::user(ME), "/users/me", TtlClass::Profile)
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Cached<UserProfile>, ApiError> {
        self.ctx
            .read_entity(
                &ResourceId::user(id),
                &format!("/users/{id}"),
                TtlClass::Profile,
            )
            .await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, ApiError> {
        let body = serde_json::to_value(update)
            .map_err(|err| ApiError::Decode(err.to_string()))?;
        self.ctx
            .mutate(
                Method::PUT,
                "/users/me",
                RequestOptions::json(body),
                Invalidate::class(TtlClass::Profile).entity(ResourceId::user(ME)),
            )
            .await
    }

    /// Avatar upload as a named multipart part.
    pub async fn upload_avatar(
        &self,
        file_name: &str,
        mime: &str,
        bytes: Bytes,
    ) -> Result<UserProfile, ApiError> {
        let multipart = MultipartBody::new().part("avatar", file_name, mime, bytes);
        self.ctx
            .mutate(
                Method::POST,
                "/users/me/avatar",
                RequestOptions::multipart(multipart),
                Invalidate::class(TtlClass::Profile).entity(ResourceId::user(ME)),
            )
            .await
    }
}
