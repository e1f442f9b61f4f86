use crate::AppState;
use crate::api::error::AppError;
use crate::api::extract::{RequestContext, ValidatedJson};
use crate::api::handlers::files::{FileResponse, PresignedUrlResponse, UploadTicketResponse};
use crate::api::handlers::folders::{FolderContentsResponse, FolderResponse};
use crate::entities::shares;
use crate::services::share_service::{NewShare, SharedItem};
use crate::utils::auth::Claims;
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

// ── Request / Response Types ──────────────────────────────────────────

#[derive(Deserialize, ToSchema, Validate)]
pub struct CreateShareRequest {
    pub file_id: Option<String>,
    pub folder_id: Option<String>,
    #[serde(default = "default_true")]
    pub can_download: bool,
    #[serde(default)]
    pub can_upload: bool,
    #[validate(length(min = 1, max = 128))]
    pub password: Option<String>,
    /// Lifetime in hours (1 to 8760); the link never expires when omitted
    pub expires_in_hours: Option<i64>,
}

fn default_true() -> bool {
    true
}

#[derive(Serialize, ToSchema)]
pub struct ShareResponse {
    pub id: String,
    pub file_id: Option<String>,
    pub folder_id: Option<String>,
    pub token: String,
    pub can_download: bool,
    pub can_upload: bool,
    pub has_password: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<shares::Model> for ShareResponse {
    fn from(share: shares::Model) -> Self {
        Self {
            has_password: share.password_hash.is_some(),
            id: share.id,
            file_id: share.file_id,
            folder_id: share.folder_id,
            token: share.token,
            can_download: share.can_download,
            can_upload: share.can_upload,
            expires_at: share.expires_at,
            created_at: share.created_at,
        }
    }
}

#[derive(Deserialize, ToSchema, Default)]
pub struct ShareAccessRequest {
    pub password: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct PublicShareResponse {
    /// "file" or "folder"
    pub item_type: String,
    pub can_download: bool,
    pub can_upload: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub file: Option<FileResponse>,
    /// Present for file shares that allow downloading
    pub download: Option<PresignedUrlResponse>,
    pub folder: Option<FolderResponse>,
    pub contents: Option<FolderContentsResponse>,
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct PublicUploadRequest {
    pub password: Option<String>,
    #[validate(custom(function = "crate::utils::validation::validate_name"))]
    pub name: String,
    #[validate(range(min = 1))]
    pub size: i64,
    #[validate(length(min = 3, max = 255))]
    pub mime_type: String,
}

// ── Authenticated Endpoints ───────────────────────────────────────────

/// Create a share link for a file or a folder
#[utoipa::path(
    post,
    path = "/shares",
    request_body = CreateShareRequest,
    responses(
        (status = 201, description = "Share link created", body = ShareResponse),
        (status = 400, description = "Bad request"),
        (status = 404, description = "File or folder not found")
    ),
    security(("jwt" = [])),
    tag = "shares"
)]
pub async fn create_share(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ValidatedJson(req): ValidatedJson<CreateShareRequest>,
) -> Result<(StatusCode, Json<ShareResponse>), AppError> {
    let share = state
        .share_service
        .create(
            &claims.sub,
            NewShare {
                file_id: req.file_id,
                folder_id: req.folder_id,
                can_download: req.can_download,
                can_upload: req.can_upload,
                password: req.password,
                expires_in_hours: req.expires_in_hours,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(share.into())))
}

#[utoipa::path(
    get,
    path = "/shares",
    responses(
        (status = 200, description = "Share links of the current user", body = [ShareResponse])
    ),
    security(("jwt" = [])),
    tag = "shares"
)]
pub async fn list_shares(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ShareResponse>>, AppError> {
    let shares = state.share_service.list(&claims.sub).await?;
    Ok(Json(shares.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    delete,
    path = "/shares/{id}",
    params(("id" = String, Path, description = "Share ID")),
    responses(
        (status = 204, description = "Share revoked"),
        (status = 404, description = "Share not found")
    ),
    security(("jwt" = [])),
    tag = "shares"
)]
pub async fn revoke_share(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.share_service.revoke(&claims.sub, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Public Endpoints ──────────────────────────────────────────────────

/// Open a share link. The password travels in the body, never the URL.
#[utoipa::path(
    post,
    path = "/public/shares/{token}",
    params(("token" = String, Path, description = "Share token")),
    request_body = ShareAccessRequest,
    responses(
        (status = 200, description = "Shared item", body = PublicShareResponse),
        (status = 401, description = "Password required or wrong"),
        (status = 404, description = "Unknown share"),
        (status = 410, description = "Share expired or item deleted")
    ),
    tag = "public"
)]
pub async fn resolve_share(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(token): Path<String>,
    body: Option<Json<ShareAccessRequest>>,
) -> Result<Json<PublicShareResponse>, AppError> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let resolved = state
        .share_service
        .resolve(&token, req.password.as_deref())
        .await?;

    tracing::info!(
        client_ip = ?ctx.client_ip,
        "🔗 Share {} opened",
        resolved.share.id
    );

    let share = resolved.share;
    let response = match resolved.item {
        SharedItem::File { file, download } => PublicShareResponse {
            item_type: "file".to_string(),
            can_download: share.can_download,
            can_upload: share.can_upload,
            expires_at: share.expires_at,
            file: Some(file.into()),
            download: download.map(Into::into),
            folder: None,
            contents: None,
        },
        SharedItem::Folder { folder, contents } => PublicShareResponse {
            item_type: "folder".to_string(),
            can_download: share.can_download,
            can_upload: share.can_upload,
            expires_at: share.expires_at,
            file: None,
            download: None,
            folder: Some(folder.into()),
            contents: Some(contents.into()),
        },
    };

    Ok(Json(response))
}

/// Start an upload into a shared folder
#[utoipa::path(
    post,
    path = "/public/shares/{token}/uploads",
    params(("token" = String, Path, description = "Share token")),
    request_body = PublicUploadRequest,
    responses(
        (status = 201, description = "Pending file created", body = UploadTicketResponse),
        (status = 403, description = "Share does not accept uploads"),
        (status = 410, description = "Share expired"),
        (status = 507, description = "Owner's storage quota exceeded")
    ),
    tag = "public"
)]
pub async fn request_public_upload(
    State(state): State<AppState>,
    Path(token): Path<String>,
    ValidatedJson(req): ValidatedJson<PublicUploadRequest>,
) -> Result<(StatusCode, Json<UploadTicketResponse>), AppError> {
    let ticket = state
        .share_service
        .request_upload(
            &token,
            req.password.as_deref(),
            &req.name,
            req.size,
            &req.mime_type,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(ticket.into())))
}

#[utoipa::path(
    post,
    path = "/public/shares/{token}/uploads/{file_id}/complete",
    params(
        ("token" = String, Path, description = "Share token"),
        ("file_id" = String, Path, description = "Pending file ID")
    ),
    request_body = ShareAccessRequest,
    responses(
        (status = 200, description = "File available", body = FileResponse),
        (status = 403, description = "Share does not accept uploads"),
        (status = 404, description = "File not found"),
        (status = 409, description = "Object not uploaded yet")
    ),
    tag = "public"
)]
pub async fn complete_public_upload(
    State(state): State<AppState>,
    Path((token, file_id)): Path<(String, String)>,
    body: Option<Json<ShareAccessRequest>>,
) -> Result<Json<FileResponse>, AppError> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let file = state
        .share_service
        .complete_upload(&token, req.password.as_deref(), &file_id)
        .await?;
    Ok(Json(file.into()))
}
