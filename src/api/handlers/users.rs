use crate::AppState;
use crate::api::error::AppError;
use crate::entities::users;
use crate::utils::auth::Claims;
use axum::{Extension, Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct UserProfileResponse {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    /// Bytes the account may store
    pub storage_quota: i64,
    /// Bytes held by completed files, including those in the recycle bin
    pub storage_used: i64,
    /// Bytes promised to uploads still in progress
    pub storage_reserved: i64,
    pub created_at: DateTime<Utc>,
}

impl UserProfileResponse {
    pub fn from_user(user: users::Model, reserved: i64) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            storage_quota: user.storage_quota,
            storage_used: user.storage_used,
            storage_reserved: reserved,
            created_at: user.created_at,
        }
    }
}

#[utoipa::path(
    get,
    path = "/users/me",
    responses(
        (status = 200, description = "Current user profile", body = UserProfileResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(("jwt" = [])),
    tag = "users"
)]
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UserProfileResponse>, AppError> {
    let user = state.auth_service.profile(&claims.sub).await?;
    let usage = state.quota.usage(&state.db, &claims.sub).await?;
    Ok(Json(UserProfileResponse::from_user(user, usage.reserved)))
}
