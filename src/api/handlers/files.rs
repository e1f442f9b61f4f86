use crate::AppState;
use crate::api::error::AppError;
use crate::api::extract::ValidatedJson;
use crate::api::handlers::double_option;
use crate::api::handlers::recycle::RecycleItemResponse;
use crate::entities::files;
use crate::services::file_service::UploadTicket;
use crate::services::storage::PresignedUrl;
use crate::utils::auth::Claims;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

#[derive(Serialize, ToSchema)]
pub struct FileResponse {
    pub id: String,
    pub name: String,
    pub size: i64,
    pub mime_type: String,
    pub folder_id: Option<String>,
    /// "pending" until the upload is completed, then "available"
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<files::Model> for FileResponse {
    fn from(file: files::Model) -> Self {
        Self {
            id: file.id,
            name: file.name,
            size: file.size,
            mime_type: file.mime_type,
            folder_id: file.folder_id,
            status: file.status,
            created_at: file.created_at,
            updated_at: file.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PresignedUrlResponse {
    pub url: String,
    /// HTTP method the URL is signed for
    pub method: String,
    pub expires_at: DateTime<Utc>,
}

impl From<PresignedUrl> for PresignedUrlResponse {
    fn from(url: PresignedUrl) -> Self {
        Self {
            url: url.url,
            method: url.method,
            expires_at: url.expires_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct UploadTicketResponse {
    pub file: FileResponse,
    pub upload: PresignedUrlResponse,
}

impl From<UploadTicket> for UploadTicketResponse {
    fn from(ticket: UploadTicket) -> Self {
        Self {
            file: ticket.file.into(),
            upload: ticket.upload.into(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct DownloadResponse {
    pub file: FileResponse,
    pub download: PresignedUrlResponse,
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct UploadRequest {
    #[validate(custom(function = "crate::utils::validation::validate_name"))]
    pub name: String,
    /// Declared size in bytes; the stored object's size is authoritative
    #[validate(range(min = 1))]
    pub size: i64,
    #[validate(length(min = 3, max = 255))]
    pub mime_type: String,
    pub folder_id: Option<String>,
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct UpdateFileRequest {
    #[validate(custom(function = "crate::utils::validation::validate_name"))]
    pub name: Option<String>,
    /// Target folder; `null` moves the file to the root
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub folder_id: Option<Option<String>>,
}

#[derive(Deserialize, IntoParams)]
pub struct ListFilesQuery {
    /// Folder to list; the root when omitted
    pub folder_id: Option<String>,
}

/// Start an upload: reserves quota and returns a pre-signed PUT URL
#[utoipa::path(
    post,
    path = "/files/uploads",
    request_body = UploadRequest,
    responses(
        (status = 201, description = "Pending file created", body = UploadTicketResponse),
        (status = 409, description = "Name already taken"),
        (status = 413, description = "File too large"),
        (status = 507, description = "Storage quota exceeded")
    ),
    security(("jwt" = [])),
    tag = "files"
)]
pub async fn request_upload(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ValidatedJson(req): ValidatedJson<UploadRequest>,
) -> Result<(StatusCode, Json<UploadTicketResponse>), AppError> {
    let ticket = state
        .file_service
        .request_upload(
            &claims.sub,
            &req.name,
            req.size,
            &req.mime_type,
            req.folder_id.as_deref(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(ticket.into())))
}

/// Confirm the client finished uploading to the pre-signed URL
#[utoipa::path(
    post,
    path = "/files/{id}/complete",
    params(("id" = String, Path, description = "File ID")),
    responses(
        (status = 200, description = "File available", body = FileResponse),
        (status = 404, description = "File not found"),
        (status = 409, description = "Object not uploaded yet or name taken"),
        (status = 507, description = "Storage quota exceeded")
    ),
    security(("jwt" = [])),
    tag = "files"
)]
pub async fn complete_upload(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<FileResponse>, AppError> {
    let file = state.file_service.complete_upload(&claims.sub, &id).await?;
    Ok(Json(file.into()))
}

#[utoipa::path(
    get,
    path = "/files",
    params(ListFilesQuery),
    responses(
        (status = 200, description = "Files in the folder", body = [FileResponse]),
        (status = 404, description = "Folder not found")
    ),
    security(("jwt" = [])),
    tag = "files"
)]
pub async fn list_files(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListFilesQuery>,
) -> Result<Json<Vec<FileResponse>>, AppError> {
    let files = state
        .file_service
        .list(&claims.sub, query.folder_id.as_deref())
        .await?;
    Ok(Json(files.into_iter().map(FileResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/files/{id}",
    params(("id" = String, Path, description = "File ID")),
    responses(
        (status = 200, description = "File metadata", body = FileResponse),
        (status = 404, description = "File not found")
    ),
    security(("jwt" = [])),
    tag = "files"
)]
pub async fn get_file(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<FileResponse>, AppError> {
    let file = state.file_service.get(&claims.sub, &id).await?;
    Ok(Json(file.into()))
}

/// Rename and/or move a file
#[utoipa::path(
    patch,
    path = "/files/{id}",
    params(("id" = String, Path, description = "File ID")),
    request_body = UpdateFileRequest,
    responses(
        (status = 200, description = "File updated", body = FileResponse),
        (status = 404, description = "File or folder not found"),
        (status = 409, description = "Name already taken")
    ),
    security(("jwt" = [])),
    tag = "files"
)]
pub async fn update_file(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateFileRequest>,
) -> Result<Json<FileResponse>, AppError> {
    if req.name.is_none() && req.folder_id.is_none() {
        return Err(AppError::BadRequest("Nothing to update".to_string()));
    }

    let file = state
        .file_service
        .update(
            &claims.sub,
            &id,
            req.name.as_deref(),
            req.folder_id.as_ref().map(|f| f.as_deref()),
        )
        .await?;

    Ok(Json(file.into()))
}

/// Move a file to the recycle bin
#[utoipa::path(
    delete,
    path = "/files/{id}",
    params(("id" = String, Path, description = "File ID")),
    responses(
        (status = 200, description = "File moved to the recycle bin", body = RecycleItemResponse),
        (status = 404, description = "File not found")
    ),
    security(("jwt" = [])),
    tag = "files"
)]
pub async fn delete_file(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<RecycleItemResponse>, AppError> {
    let item = state.file_service.delete(&claims.sub, &id).await?;
    Ok(Json(item.into()))
}

/// Pre-signed GET URL for an available file
#[utoipa::path(
    get,
    path = "/files/{id}/download",
    params(("id" = String, Path, description = "File ID")),
    responses(
        (status = 200, description = "Download URL issued", body = DownloadResponse),
        (status = 404, description = "File not found")
    ),
    security(("jwt" = [])),
    tag = "files"
)]
pub async fn download_file(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<DownloadResponse>, AppError> {
    let (file, url) = state.file_service.download_url(&claims.sub, &id).await?;
    Ok(Json(DownloadResponse {
        file: file.into(),
        download: url.into(),
    }))
}
