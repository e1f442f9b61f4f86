use crate::AppState;
use crate::api::error::AppError;
use crate::api::extract::ValidatedJson;
use crate::api::handlers::double_option;
use crate::api::handlers::files::FileResponse;
use crate::api::handlers::recycle::RecycleItemResponse;
use crate::entities::folders;
use crate::services::folder_service::FolderContents;
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

#[derive(Serialize, ToSchema)]
pub struct FolderResponse {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<folders::Model> for FolderResponse {
    fn from(folder: folders::Model) -> Self {
        Self {
            id: folder.id,
            name: folder.name,
            parent_id: folder.parent_id,
            created_at: folder.created_at,
            updated_at: folder.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct FolderContentsResponse {
    pub folders: Vec<FolderResponse>,
    pub files: Vec<FileResponse>,
}

impl From<FolderContents> for FolderContentsResponse {
    fn from(contents: FolderContents) -> Self {
        Self {
            folders: contents.folders.into_iter().map(Into::into).collect(),
            files: contents.files.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct FolderDetailResponse {
    pub folder: FolderResponse,
    pub contents: FolderContentsResponse,
}

#[derive(Serialize, ToSchema)]
pub struct TreeNode {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct CreateFolderRequest {
    #[validate(custom(function = "crate::utils::validation::validate_name"))]
    pub name: String,
    pub parent_id: Option<String>,
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct UpdateFolderRequest {
    #[validate(custom(function = "crate::utils::validation::validate_name"))]
    pub name: Option<String>,
    /// New parent; `null` moves the folder to the root
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub parent_id: Option<Option<String>>,
}

#[utoipa::path(
    post,
    path = "/folders",
    request_body = CreateFolderRequest,
    responses(
        (status = 201, description = "Folder created", body = FolderResponse),
        (status = 404, description = "Parent folder not found"),
        (status = 409, description = "Name already taken")
    ),
    security(("jwt" = [])),
    tag = "folders"
)]
pub async fn create_folder(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ValidatedJson(req): ValidatedJson<CreateFolderRequest>,
) -> Result<(StatusCode, Json<FolderResponse>), AppError> {
    let folder = state
        .folder_service
        .create(&claims.sub, &req.name, req.parent_id.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(folder.into())))
}

/// Flat list of every folder, to be assembled into a tree client side
#[utoipa::path(
    get,
    path = "/folders/tree",
    responses(
        (status = 200, description = "All live folders", body = [TreeNode])
    ),
    security(("jwt" = [])),
    tag = "folders"
)]
pub async fn folder_tree(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<TreeNode>>, AppError> {
    let folders = state.folder_service.tree(&claims.sub).await?;
    Ok(Json(
        folders
            .into_iter()
            .map(|f| TreeNode {
                id: f.id,
                name: f.name,
                parent_id: f.parent_id,
            })
            .collect(),
    ))
}

/// A folder together with its direct children
#[utoipa::path(
    get,
    path = "/folders/{id}",
    params(("id" = String, Path, description = "Folder ID")),
    responses(
        (status = 200, description = "Folder and contents", body = FolderDetailResponse),
        (status = 404, description = "Folder not found")
    ),
    security(("jwt" = [])),
    tag = "folders"
)]
pub async fn get_folder(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<FolderDetailResponse>, AppError> {
    let folder = state.folder_service.get(&claims.sub, &id).await?;
    let contents = state
        .folder_service
        .list_children(&claims.sub, Some(&id))
        .await?;
    Ok(Json(FolderDetailResponse {
        folder: folder.into(),
        contents: contents.into(),
    }))
}

#[utoipa::path(
    get,
    path = "/folders/{id}/path",
    params(("id" = String, Path, description = "Folder ID")),
    responses(
        (status = 200, description = "Breadcrumb from the root", body = [FolderResponse]),
        (status = 404, description = "Folder not found")
    ),
    security(("jwt" = [])),
    tag = "folders"
)]
pub async fn folder_path(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<Vec<FolderResponse>>, AppError> {
    let path = state.folder_service.path(&claims.sub, &id).await?;
    Ok(Json(path.into_iter().map(Into::into).collect()))
}

/// Rename and/or move a folder
#[utoipa::path(
    patch,
    path = "/folders/{id}",
    params(("id" = String, Path, description = "Folder ID")),
    request_body = UpdateFolderRequest,
    responses(
        (status = 200, description = "Folder updated", body = FolderResponse),
        (status = 400, description = "Move would create a cycle"),
        (status = 404, description = "Folder not found"),
        (status = 409, description = "Name already taken")
    ),
    security(("jwt" = [])),
    tag = "folders"
)]
pub async fn update_folder(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateFolderRequest>,
) -> Result<Json<FolderResponse>, AppError> {
    if req.name.is_none() && req.parent_id.is_none() {
        return Err(AppError::BadRequest("Nothing to update".to_string()));
    }

    let folder = state
        .folder_service
        .update(
            &claims.sub,
            &id,
            req.name.as_deref(),
            req.parent_id.as_ref().map(|p| p.as_deref()),
        )
        .await?;

    Ok(Json(folder.into()))
}

/// Move a folder and its contents to the recycle bin
#[utoipa::path(
    delete,
    path = "/folders/{id}",
    params(("id" = String, Path, description = "Folder ID")),
    responses(
        (status = 200, description = "Folder moved to the recycle bin", body = RecycleItemResponse),
        (status = 404, description = "Folder not found")
    ),
    security(("jwt" = [])),
    tag = "folders"
)]
pub async fn delete_folder(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<RecycleItemResponse>, AppError> {
    let item = state.folder_service.delete(&claims.sub, &id).await?;
    Ok(Json(item.into()))
}
