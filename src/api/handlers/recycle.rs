use crate::AppState;
use crate::api::error::AppError;
use crate::entities::recycle_items;
use crate::services::recycle_service::RestoredItem;
use crate::utils::auth::Claims;
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct RecycleItemResponse {
    pub id: String,
    /// "file" or "folder"
    pub item_type: String,
    pub item_id: String,
    pub name: String,
    pub original_parent_id: Option<String>,
    /// Bytes released when the item is purged
    pub size: i64,
    pub deleted_at: DateTime<Utc>,
    pub purge_after: DateTime<Utc>,
}

impl From<recycle_items::Model> for RecycleItemResponse {
    fn from(item: recycle_items::Model) -> Self {
        Self {
            id: item.id,
            item_type: item.item_type,
            item_id: item.item_id,
            name: item.name,
            original_parent_id: item.original_parent_id,
            size: item.size,
            deleted_at: item.deleted_at,
            purge_after: item.purge_after,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct EmptyBinResponse {
    pub purged: usize,
}

#[utoipa::path(
    get,
    path = "/recycle-bin",
    responses(
        (status = 200, description = "Recycle bin contents, newest first", body = [RecycleItemResponse])
    ),
    security(("jwt" = [])),
    tag = "recycle-bin"
)]
pub async fn list_items(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<RecycleItemResponse>>, AppError> {
    let items = state.recycle_service.list(&claims.sub).await?;
    Ok(Json(items.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    post,
    path = "/recycle-bin/{id}/restore",
    params(("id" = String, Path, description = "Recycle bin item ID")),
    responses(
        (status = 200, description = "Item restored", body = RestoredItem),
        (status = 404, description = "Item not found"),
        (status = 410, description = "Item no longer exists")
    ),
    security(("jwt" = [])),
    tag = "recycle-bin"
)]
pub async fn restore_item(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<RestoredItem>, AppError> {
    let restored = state.recycle_service.restore(&claims.sub, &id).await?;
    Ok(Json(restored))
}

/// Permanently delete one item
#[utoipa::path(
    delete,
    path = "/recycle-bin/{id}",
    params(("id" = String, Path, description = "Recycle bin item ID")),
    responses(
        (status = 204, description = "Item purged"),
        (status = 404, description = "Item not found")
    ),
    security(("jwt" = [])),
    tag = "recycle-bin"
)]
pub async fn purge_item(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.recycle_service.purge(&claims.sub, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Permanently delete everything in the bin
#[utoipa::path(
    delete,
    path = "/recycle-bin",
    responses(
        (status = 200, description = "Recycle bin emptied", body = EmptyBinResponse)
    ),
    security(("jwt" = [])),
    tag = "recycle-bin"
)]
pub async fn empty_bin(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<EmptyBinResponse>, AppError> {
    let purged = state.recycle_service.empty(&claims.sub).await?;
    Ok(Json(EmptyBinResponse { purged }))
}
