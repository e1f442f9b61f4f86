use crate::api::error::AppError;
use crate::entities::{prelude::*, *};
use crate::services::names::{ensure_folder_name_free, in_folder};
use crate::services::recycle_service::RecycleService;
use crate::utils::validation::sanitize_name;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Deepest folder nesting walked before the chain is treated as corrupt.
const MAX_DEPTH: usize = 1024;

/// Live folder owned by the user.
pub async fn find_live_folder<C: ConnectionTrait>(
    conn: &C,
    owner_id: &str,
    folder_id: &str,
) -> Result<folders::Model, AppError> {
    Folders::find_by_id(folder_id)
        .filter(folders::Column::OwnerId.eq(owner_id))
        .filter(folders::Column::DeletedAt.is_null())
        .one(conn)
        .await?
        .ok_or(AppError::NotFound("Folder not found".to_string()))
}

pub struct FolderContents {
    pub folders: Vec<folders::Model>,
    pub files: Vec<files::Model>,
}

pub struct FolderService {
    db: DatabaseConnection,
    recycle: Arc<RecycleService>,
}

impl FolderService {
    pub fn new(db: DatabaseConnection, recycle: Arc<RecycleService>) -> Self {
        Self { db, recycle }
    }

    pub async fn create(
        &self,
        owner_id: &str,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<folders::Model, AppError> {
        let name = sanitize_name(name).map_err(|e| AppError::BadRequest(e.to_string()))?;
        if let Some(parent_id) = parent_id {
            find_live_folder(&self.db, owner_id, parent_id).await?;
        }
        ensure_folder_name_free(&self.db, owner_id, parent_id, &name, None).await?;

        let now = Utc::now();
        let folder = folders::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            owner_id: Set(owner_id.to_string()),
            parent_id: Set(parent_id.map(str::to_string)),
            name: Set(name),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
        }
        .insert(&self.db)
        .await?;

        tracing::info!("📁 Folder created: {} ({})", folder.name, folder.id);
        Ok(folder)
    }

    pub async fn get(&self, owner_id: &str, folder_id: &str) -> Result<folders::Model, AppError> {
        find_live_folder(&self.db, owner_id, folder_id).await
    }

    /// Direct children of a folder, or of the root when `folder_id` is `None`.
    pub async fn list_children(
        &self,
        owner_id: &str,
        folder_id: Option<&str>,
    ) -> Result<FolderContents, AppError> {
        if let Some(folder_id) = folder_id {
            find_live_folder(&self.db, owner_id, folder_id).await?;
        }
        children_of(&self.db, owner_id, folder_id).await
    }

    /// Every live folder of the user, for building a tree client side.
    pub async fn tree(&self, owner_id: &str) -> Result<Vec<folders::Model>, AppError> {
        Ok(Folders::find()
            .filter(folders::Column::OwnerId.eq(owner_id))
            .filter(folders::Column::DeletedAt.is_null())
            .order_by_asc(folders::Column::Name)
            .all(&self.db)
            .await?)
    }

    /// Breadcrumb from the outermost ancestor down to the folder itself.
    pub async fn path(
        &self,
        owner_id: &str,
        folder_id: &str,
    ) -> Result<Vec<folders::Model>, AppError> {
        let mut path = Vec::new();
        let mut current = Some(find_live_folder(&self.db, owner_id, folder_id).await?);

        while let Some(folder) = current {
            if path.len() >= MAX_DEPTH {
                return Err(AppError::Internal(format!(
                    "Folder chain of {} exceeds maximum depth",
                    folder_id
                )));
            }
            current = match folder.parent_id.as_deref() {
                Some(parent_id) => Some(find_live_folder(&self.db, owner_id, parent_id).await?),
                None => None,
            };
            path.push(folder);
        }

        path.reverse();
        Ok(path)
    }

    /// Rename and/or re-parent a folder in a single write. Moving a folder
    /// into itself or below itself is rejected so the hierarchy stays
    /// acyclic.
    pub async fn update(
        &self,
        owner_id: &str,
        folder_id: &str,
        new_name: Option<&str>,
        parent_id: Option<Option<&str>>,
    ) -> Result<folders::Model, AppError> {
        let new_name = new_name
            .map(sanitize_name)
            .transpose()
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        let folder = find_live_folder(&self.db, owner_id, folder_id).await?;

        let target_parent = match parent_id {
            Some(target) => target.map(str::to_string),
            None => folder.parent_id.clone(),
        };
        let target_name = new_name.unwrap_or_else(|| folder.name.clone());
        if target_parent == folder.parent_id && target_name == folder.name {
            return Ok(folder);
        }

        if target_parent != folder.parent_id {
            if let Some(ref parent_id) = target_parent {
                let ancestors = self.path(owner_id, parent_id).await?;
                if ancestors.iter().any(|f| f.id == folder_id) {
                    return Err(AppError::BadRequest(
                        "Cannot move a folder into itself or one of its subfolders".to_string(),
                    ));
                }
            }
        }
        ensure_folder_name_free(
            &self.db,
            owner_id,
            target_parent.as_deref(),
            &target_name,
            Some(folder_id),
        )
        .await?;

        let mut active: folders::ActiveModel = folder.into();
        active.parent_id = Set(target_parent);
        active.name = Set(target_name);
        active.updated_at = Set(Utc::now());
        Ok(active.update(&self.db).await?)
    }

    /// Move a folder and everything below it to the recycle bin.
    pub async fn delete(
        &self,
        owner_id: &str,
        folder_id: &str,
    ) -> Result<recycle_items::Model, AppError> {
        let folder = find_live_folder(&self.db, owner_id, folder_id).await?;
        self.recycle.trash_folder(folder).await
    }
}

pub async fn children_of<C: ConnectionTrait>(
    conn: &C,
    owner_id: &str,
    folder_id: Option<&str>,
) -> Result<FolderContents, AppError> {
    let folders = Folders::find()
        .filter(folders::Column::OwnerId.eq(owner_id))
        .filter(in_folder(folders::Column::ParentId, folder_id))
        .filter(folders::Column::DeletedAt.is_null())
        .order_by_asc(folders::Column::Name)
        .all(conn)
        .await?;

    let files = Files::find()
        .filter(files::Column::OwnerId.eq(owner_id))
        .filter(in_folder(files::Column::FolderId, folder_id))
        .filter(files::Column::Status.eq(files::STATUS_AVAILABLE))
        .filter(files::Column::DeletedAt.is_null())
        .order_by_asc(files::Column::Name)
        .all(conn)
        .await?;

    Ok(FolderContents { folders, files })
}

/// Ids of `root` and all folders below it whose `deleted_at` matches
/// `stamp` (`None` selects live folders).
#[async_recursion::async_recursion]
pub async fn subtree_ids<C: ConnectionTrait + Sync>(
    conn: &C,
    root: &str,
    stamp: Option<chrono::DateTime<Utc>>,
    seen: &mut HashSet<String>,
) -> Result<(), AppError> {
    if !seen.insert(root.to_string()) {
        return Ok(());
    }

    let query = Folders::find().filter(folders::Column::ParentId.eq(root));
    let query = match stamp {
        Some(stamp) => query.filter(folders::Column::DeletedAt.eq(stamp)),
        None => query.filter(folders::Column::DeletedAt.is_null()),
    };

    for child in query.all(conn).await? {
        subtree_ids(conn, &child.id, stamp, seen).await?;
    }
    Ok(())
}
