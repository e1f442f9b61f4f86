use crate::api::error::AppError;
use crate::config::AppConfig;
use crate::entities::{prelude::*, *};
use crate::services::deletions;
use crate::services::folder_service::subtree_ids;
use crate::services::jobs::{Job, JobQueue};
use crate::services::names::free_name;
use crate::services::quota::QuotaService;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    ModelTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
pub struct RestoredItem {
    pub item_type: String,
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
}

/// Deletion stamp shared by an item and everything trashed with it.
/// Millisecond precision survives every supported backend unchanged.
fn deletion_stamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

async fn live_folder_exists<C: ConnectionTrait>(
    conn: &C,
    owner_id: &str,
    folder_id: &str,
) -> Result<bool, AppError> {
    Ok(Folders::find_by_id(folder_id)
        .filter(folders::Column::OwnerId.eq(owner_id))
        .filter(folders::Column::DeletedAt.is_null())
        .one(conn)
        .await?
        .is_some())
}

/// Soft deletion, restore and permanent removal of files and folders.
pub struct RecycleService {
    db: DatabaseConnection,
    config: AppConfig,
    quota: Arc<QuotaService>,
    jobs: JobQueue,
}

impl RecycleService {
    pub fn new(
        db: DatabaseConnection,
        config: AppConfig,
        quota: Arc<QuotaService>,
        jobs: JobQueue,
    ) -> Self {
        Self {
            db,
            config,
            quota,
            jobs,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn recycle_entry(
        &self,
        owner_id: &str,
        item_type: &str,
        item_id: &str,
        original_parent_id: Option<String>,
        name: &str,
        size: i64,
        stamp: DateTime<Utc>,
    ) -> recycle_items::ActiveModel {
        recycle_items::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            owner_id: Set(owner_id.to_string()),
            item_type: Set(item_type.to_string()),
            item_id: Set(item_id.to_string()),
            original_parent_id: Set(original_parent_id),
            name: Set(name.to_string()),
            size: Set(size),
            deleted_at: Set(stamp),
            purge_after: Set(stamp + Duration::days(self.config.recycle_retention_days)),
        }
    }

    pub async fn trash_file(&self, file: files::Model) -> Result<recycle_items::Model, AppError> {
        let stamp = deletion_stamp();
        let txn = self.db.begin().await?;

        Shares::delete_many()
            .filter(shares::Column::FileId.eq(&file.id))
            .exec(&txn)
            .await?;

        let entry = self.recycle_entry(
            &file.owner_id,
            recycle_items::ITEM_FILE,
            &file.id,
            file.folder_id.clone(),
            &file.name,
            file.size,
            stamp,
        );

        let mut active: files::ActiveModel = file.into();
        active.deleted_at = Set(Some(stamp));
        active.update(&txn).await?;

        let entry = entry.insert(&txn).await?;
        txn.commit().await?;

        tracing::info!("🗑️  File {} moved to recycle bin", entry.item_id);
        Ok(entry)
    }

    pub async fn trash_folder(
        &self,
        folder: folders::Model,
    ) -> Result<recycle_items::Model, AppError> {
        let stamp = deletion_stamp();
        let txn = self.db.begin().await?;

        let mut seen = HashSet::new();
        subtree_ids(&txn, &folder.id, None, &mut seen).await?;
        let folder_ids: Vec<String> = seen.into_iter().collect();

        let contained = Files::find()
            .filter(files::Column::FolderId.is_in(folder_ids.clone()))
            .filter(files::Column::DeletedAt.is_null())
            .all(&txn)
            .await?;
        let size: i64 = contained
            .iter()
            .filter(|f| f.is_available())
            .map(|f| f.size)
            .sum();
        let file_ids: Vec<String> = contained.into_iter().map(|f| f.id).collect();

        Shares::delete_many()
            .filter(
                Condition::any()
                    .add(shares::Column::FolderId.is_in(folder_ids.clone()))
                    .add(shares::Column::FileId.is_in(file_ids.clone())),
            )
            .exec(&txn)
            .await?;

        Files::update_many()
            .col_expr(files::Column::DeletedAt, Expr::value(stamp))
            .filter(files::Column::Id.is_in(file_ids))
            .exec(&txn)
            .await?;

        Folders::update_many()
            .col_expr(folders::Column::DeletedAt, Expr::value(stamp))
            .filter(folders::Column::Id.is_in(folder_ids.clone()))
            .filter(folders::Column::DeletedAt.is_null())
            .exec(&txn)
            .await?;

        let entry = self
            .recycle_entry(
                &folder.owner_id,
                recycle_items::ITEM_FOLDER,
                &folder.id,
                folder.parent_id.clone(),
                &folder.name,
                size,
                stamp,
            )
            .insert(&txn)
            .await?;
        txn.commit().await?;

        tracing::info!(
            "🗑️  Folder {} moved to recycle bin with {} subfolders",
            folder.id,
            folder_ids.len() - 1
        );
        Ok(entry)
    }

    pub async fn list(&self, owner_id: &str) -> Result<Vec<recycle_items::Model>, AppError> {
        Ok(RecycleItems::find()
            .filter(recycle_items::Column::OwnerId.eq(owner_id))
            .order_by_desc(recycle_items::Column::DeletedAt)
            .all(&self.db)
            .await?)
    }

    async fn find_item(
        &self,
        owner_id: &str,
        item_id: &str,
    ) -> Result<recycle_items::Model, AppError> {
        RecycleItems::find_by_id(item_id)
            .filter(recycle_items::Column::OwnerId.eq(owner_id))
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound("Recycle bin item not found".to_string()))
    }

    /// Put an item back where it came from. Falls back to the root when the
    /// original folder is gone and renames on collision.
    pub async fn restore(&self, owner_id: &str, item_id: &str) -> Result<RestoredItem, AppError> {
        let item = self.find_item(owner_id, item_id).await?;
        let stamp = item.deleted_at;
        let txn = self.db.begin().await?;

        let parent_id = match item.original_parent_id.as_deref() {
            Some(parent) if live_folder_exists(&txn, owner_id, parent).await? => {
                Some(parent.to_string())
            }
            _ => None,
        };

        let restored = if item.item_type == recycle_items::ITEM_FILE {
            let file = Files::find_by_id(&item.item_id)
                .filter(files::Column::DeletedAt.eq(stamp))
                .one(&txn)
                .await?;
            let Some(file) = file else {
                drop(txn);
                item.delete(&self.db).await?;
                return Err(AppError::Gone("Item no longer exists".to_string()));
            };

            let name = free_name(&txn, owner_id, parent_id.as_deref(), &file.name, &file.id, true)
                .await?;
            let mut active: files::ActiveModel = file.into();
            active.deleted_at = Set(None);
            active.folder_id = Set(parent_id.clone());
            active.name = Set(name);
            active.updated_at = Set(Utc::now());
            let file = active.update(&txn).await?;

            RestoredItem {
                item_type: item.item_type.clone(),
                id: file.id,
                name: file.name,
                parent_id: file.folder_id,
            }
        } else {
            let folder = Folders::find_by_id(&item.item_id)
                .filter(folders::Column::DeletedAt.eq(stamp))
                .one(&txn)
                .await?;
            let Some(folder) = folder else {
                drop(txn);
                item.delete(&self.db).await?;
                return Err(AppError::Gone("Item no longer exists".to_string()));
            };

            let mut seen = HashSet::new();
            subtree_ids(&txn, &folder.id, Some(stamp), &mut seen).await?;
            let folder_ids: Vec<String> = seen.into_iter().collect();

            Files::update_many()
                .col_expr(
                    files::Column::DeletedAt,
                    Expr::value(Option::<DateTime<Utc>>::None),
                )
                .filter(files::Column::FolderId.is_in(folder_ids.clone()))
                .filter(files::Column::DeletedAt.eq(stamp))
                .exec(&txn)
                .await?;

            Folders::update_many()
                .col_expr(
                    folders::Column::DeletedAt,
                    Expr::value(Option::<DateTime<Utc>>::None),
                )
                .filter(folders::Column::Id.is_in(folder_ids))
                .filter(folders::Column::DeletedAt.eq(stamp))
                .exec(&txn)
                .await?;

            let name = free_name(
                &txn,
                owner_id,
                parent_id.as_deref(),
                &folder.name,
                &folder.id,
                false,
            )
            .await?;
            let mut active: folders::ActiveModel = folder.into();
            active.deleted_at = Set(None);
            active.parent_id = Set(parent_id.clone());
            active.name = Set(name);
            active.updated_at = Set(Utc::now());
            let folder = active.update(&txn).await?;

            RestoredItem {
                item_type: item.item_type.clone(),
                id: folder.id,
                name: folder.name,
                parent_id: folder.parent_id,
            }
        };

        item.delete(&txn).await?;
        txn.commit().await?;

        tracing::info!("♻️  Restored {} {}", restored.item_type, restored.id);
        Ok(restored)
    }

    /// Permanently remove an item and everything trashed with it. Objects are
    /// recorded as pending deletions and removed from storage by the worker;
    /// quota is released immediately.
    pub async fn purge(&self, owner_id: &str, item_id: &str) -> Result<(), AppError> {
        let item = self.find_item(owner_id, item_id).await?;
        let stamp = item.deleted_at;

        let _guard = self.quota.lock(owner_id).await;
        let txn = self.db.begin().await?;

        let doomed_files = if item.item_type == recycle_items::ITEM_FILE {
            let doomed = Files::find_by_id(&item.item_id)
                .filter(files::Column::DeletedAt.eq(stamp))
                .all(&txn)
                .await?;
            Files::delete_many()
                .filter(files::Column::Id.is_in(doomed.iter().map(|f| f.id.clone())))
                .exec(&txn)
                .await?;
            doomed
        } else {
            let mut seen = HashSet::new();
            let root_exists = Folders::find_by_id(&item.item_id)
                .filter(folders::Column::DeletedAt.eq(stamp))
                .one(&txn)
                .await?
                .is_some();
            if root_exists {
                subtree_ids(&txn, &item.item_id, Some(stamp), &mut seen).await?;
            }
            let folder_ids: Vec<String> = seen.into_iter().collect();

            let doomed = Files::find()
                .filter(files::Column::FolderId.is_in(folder_ids.clone()))
                .filter(files::Column::DeletedAt.eq(stamp))
                .all(&txn)
                .await?;

            // Items trashed separately keep their own recycle entries, and a
            // live file can land here if an upload raced the trash. Detach
            // both so the folder delete does not cascade into them.
            Files::update_many()
                .col_expr(
                    files::Column::FolderId,
                    Expr::value(Option::<String>::None),
                )
                .filter(files::Column::FolderId.is_in(folder_ids.clone()))
                .filter(
                    Condition::any()
                        .add(files::Column::DeletedAt.ne(stamp))
                        .add(files::Column::DeletedAt.is_null()),
                )
                .exec(&txn)
                .await?;
            Folders::update_many()
                .col_expr(
                    folders::Column::ParentId,
                    Expr::value(Option::<String>::None),
                )
                .filter(folders::Column::ParentId.is_in(folder_ids.clone()))
                .filter(folders::Column::Id.is_not_in(folder_ids.clone()))
                .exec(&txn)
                .await?;

            Files::delete_many()
                .filter(files::Column::Id.is_in(doomed.iter().map(|f| f.id.clone())))
                .exec(&txn)
                .await?;
            Folders::delete_many()
                .filter(folders::Column::Id.is_in(folder_ids))
                .exec(&txn)
                .await?;
            doomed
        };

        let released: i64 = doomed_files
            .iter()
            .filter(|f| f.is_available())
            .map(|f| f.size)
            .sum();
        let keys: Vec<String> = doomed_files
            .iter()
            .map(|f| f.storage_key.clone())
            .collect();
        deletions::schedule(&txn, &keys).await?;
        self.quota.adjust(&txn, owner_id, -released).await?;
        item.delete(&txn).await?;
        txn.commit().await?;

        for key in keys {
            self.jobs.submit(Job::delete_object(key));
        }

        tracing::info!(
            "🔥 Purged recycle item {} ({} files, {} bytes released)",
            item_id,
            doomed_files.len(),
            released
        );
        Ok(())
    }

    /// Purge every item in the user's recycle bin.
    pub async fn empty(&self, owner_id: &str) -> Result<usize, AppError> {
        let items = self.list(owner_id).await?;
        let count = items.len();
        for item in items {
            self.purge(owner_id, &item.id).await?;
        }
        Ok(count)
    }

    /// Purge items whose retention period is over, for all users.
    pub async fn purge_expired(&self) -> Result<usize, AppError> {
        let expired = RecycleItems::find()
            .filter(recycle_items::Column::PurgeAfter.lt(Utc::now()))
            .all(&self.db)
            .await?;

        let mut purged = 0;
        for item in expired {
            match self.purge(&item.owner_id, &item.id).await {
                Ok(()) => purged += 1,
                Err(e) => tracing::error!("Failed to purge recycle item {}: {}", item.id, e),
            }
        }
        Ok(purged)
    }
}
