use crate::AppState;
use crate::api::error::AppError;
use crate::api::extract::{RequestContext, ValidatedJson};
use crate::api::handlers::users::UserProfileResponse;
use crate::services::auth_service::TokenPair;
use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Deserialize, ToSchema, Validate)]
pub struct RegisterRequest {
    #[validate(custom(function = "crate::utils::validation::validate_username"))]
    pub username: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    #[validate(custom(function = "crate::utils::validation::validate_password"))]
    pub password: String,
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 64))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1, max = 256))]
    pub refresh_token: String,
}

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered successfully", body = UserProfileResponse),
        (status = 409, description = "Username or email already exists"),
        (status = 422, description = "Validation failed")
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    ctx: RequestContext,
    ValidatedJson(payload): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<UserProfileResponse>), AppError> {
    let user = state
        .auth_service
        .register(&payload.username, payload.email.as_deref(), &payload.password)
        .await?;

    tracing::debug!(client_ip = ?ctx.client_ip, "registration for {}", user.username);
    Ok((StatusCode::CREATED, Json(UserProfileResponse::from_user(user, 0))))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenPair),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    ctx: RequestContext,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> Result<Json<TokenPair>, AppError> {
    let result = state
        .auth_service
        .login(&payload.username, &payload.password)
        .await;

    if result.is_err() {
        tracing::warn!(
            client_ip = ?ctx.client_ip,
            user_agent = ?ctx.user_agent,
            "Failed login for {}",
            payload.username
        );
    }

    Ok(Json(result?))
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair issued", body = TokenPair),
        (status = 401, description = "Refresh token invalid, expired or revoked")
    ),
    tag = "auth"
)]
pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RefreshRequest>,
) -> Result<Json<TokenPair>, AppError> {
    let pair = state.auth_service.refresh(&payload.refresh_token).await?;
    Ok(Json(pair))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    request_body = RefreshRequest,
    responses(
        (status = 204, description = "Refresh token revoked")
    ),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RefreshRequest>,
) -> Result<StatusCode, AppError> {
    state.auth_service.logout(&payload.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}
