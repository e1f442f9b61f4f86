use crate::api::error::AppError;
use crate::config::AppConfig;
use crate::entities::{prelude::*, *};
use crate::services::deletions;
use crate::services::folder_service::find_live_folder;
use crate::services::jobs::{Job, JobQueue};
use crate::services::names::{ensure_file_name_free, in_folder};
use crate::services::quota::QuotaService;
use crate::services::recycle_service::RecycleService;
use crate::services::storage::{PresignedUrl, StorageService, object_key};
use crate::utils::validation::{normalize_mime_type, sanitize_name};
use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

/// A pending file together with the URL its bytes must be PUT to.
pub struct UploadTicket {
    pub file: files::Model,
    pub upload: PresignedUrl,
}

pub struct FileService {
    db: DatabaseConnection,
    storage: Arc<dyn StorageService>,
    config: AppConfig,
    quota: Arc<QuotaService>,
    recycle: Arc<RecycleService>,
    jobs: JobQueue,
}

impl FileService {
    pub fn new(
        db: DatabaseConnection,
        storage: Arc<dyn StorageService>,
        config: AppConfig,
        quota: Arc<QuotaService>,
        recycle: Arc<RecycleService>,
        jobs: JobQueue,
    ) -> Self {
        Self {
            db,
            storage,
            config,
            quota,
            recycle,
            jobs,
        }
    }

    fn presign_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.config.presign_ttl_secs)
    }

    /// Reserve quota, record a pending file and hand out a pre-signed PUT URL.
    pub async fn request_upload(
        &self,
        owner_id: &str,
        name: &str,
        size: i64,
        mime_type: &str,
        folder_id: Option<&str>,
    ) -> Result<UploadTicket, AppError> {
        let name = sanitize_name(name).map_err(|e| AppError::BadRequest(e.to_string()))?;
        let mime_type =
            normalize_mime_type(mime_type).map_err(|e| AppError::BadRequest(e.to_string()))?;

        if size <= 0 {
            return Err(AppError::BadRequest("File size must be positive".to_string()));
        }
        if size > self.config.max_upload_size {
            return Err(AppError::PayloadTooLarge(format!(
                "File size {} exceeds the limit of {} bytes",
                size, self.config.max_upload_size
            )));
        }

        if let Some(folder_id) = folder_id {
            find_live_folder(&self.db, owner_id, folder_id).await?;
        }
        ensure_file_name_free(&self.db, owner_id, folder_id, &name, None).await?;

        let _guard = self.quota.lock(owner_id).await;
        self.quota
            .ensure_can_reserve(&self.db, owner_id, size)
            .await?;

        let id = Uuid::new_v4().to_string();
        let storage_key = object_key(owner_id, &id);
        let upload = self
            .storage
            .presign_upload(&storage_key, &mime_type, self.presign_ttl())
            .await
            .map_err(|e| {
                tracing::error!("Failed to presign upload for {}: {}", storage_key, e);
                AppError::Internal("Failed to generate upload URL".to_string())
            })?;

        let now = Utc::now();
        let file = files::ActiveModel {
            id: Set(id),
            owner_id: Set(owner_id.to_string()),
            folder_id: Set(folder_id.map(str::to_string)),
            name: Set(name),
            size: Set(size),
            mime_type: Set(mime_type),
            storage_key: Set(storage_key),
            status: Set(files::STATUS_PENDING.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
        }
        .insert(&self.db)
        .await?;

        tracing::info!(
            "📤 Upload requested: file_id={} user={} size={}",
            file.id,
            owner_id,
            size
        );
        Ok(UploadTicket { file, upload })
    }

    /// Confirm that the client finished its PUT. The object size reported by
    /// the store, not the declared one, is charged against the quota.
    pub async fn complete_upload(
        &self,
        owner_id: &str,
        file_id: &str,
    ) -> Result<files::Model, AppError> {
        let _guard = self.quota.lock(owner_id).await;

        let file = Files::find_by_id(file_id)
            .filter(files::Column::OwnerId.eq(owner_id))
            .filter(files::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound("File not found".to_string()))?;

        if file.is_available() {
            return Ok(file);
        }

        let size = self
            .storage
            .object_size(&file.storage_key)
            .await
            .map_err(|e| AppError::Internal(format!("Storage lookup failed: {}", e)))?
            .ok_or(AppError::Conflict(
                "Upload has not reached storage yet".to_string(),
            ))?;

        if size > self.config.max_upload_size {
            self.discard_pending(file).await?;
            return Err(AppError::PayloadTooLarge(
                "Uploaded object exceeds the size limit".to_string(),
            ));
        }

        let usage = self.quota.usage(&self.db, owner_id).await?;
        if !usage.can_commit(size) {
            self.discard_pending(file).await?;
            return Err(AppError::QuotaExceeded(
                "Uploaded object does not fit in the remaining quota".to_string(),
            ));
        }

        // Names are scoped to one owner, so the held lock makes this check final.
        if let Err(e) = ensure_file_name_free(
            &self.db,
            owner_id,
            file.folder_id.as_deref(),
            &file.name,
            Some(&file.id),
        )
        .await
        {
            self.discard_pending(file).await?;
            return Err(e);
        }

        let txn = self.db.begin().await?;
        let mut active: files::ActiveModel = file.into();
        active.size = Set(size);
        active.status = Set(files::STATUS_AVAILABLE.to_string());
        active.updated_at = Set(Utc::now());
        let file = active.update(&txn).await?;
        self.quota.adjust(&txn, owner_id, size).await?;
        txn.commit().await?;

        tracing::info!(
            "✅ Upload completed: file_id={} user={} size={}",
            file.id,
            owner_id,
            size
        );
        Ok(file)
    }

    async fn discard_pending(&self, file: files::Model) -> Result<(), AppError> {
        let key = file.storage_key.clone();
        let txn = self.db.begin().await?;
        file.delete(&txn).await?;
        deletions::schedule(&txn, std::slice::from_ref(&key)).await?;
        txn.commit().await?;
        self.jobs.submit(Job::delete_object(key));
        Ok(())
    }

    /// Live, available file owned by the user.
    pub async fn get(&self, owner_id: &str, file_id: &str) -> Result<files::Model, AppError> {
        Files::find_by_id(file_id)
            .filter(files::Column::OwnerId.eq(owner_id))
            .filter(files::Column::Status.eq(files::STATUS_AVAILABLE))
            .filter(files::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound("File not found".to_string()))
    }

    pub async fn presign_download(&self, file: &files::Model) -> Result<PresignedUrl, AppError> {
        self.storage
            .presign_download(
                &file.storage_key,
                &file.name,
                &file.mime_type,
                self.presign_ttl(),
            )
            .await
            .map_err(|e| {
                tracing::error!("Failed to presign download for {}: {}", file.id, e);
                AppError::Internal("Failed to generate download URL".to_string())
            })
    }

    pub async fn download_url(
        &self,
        owner_id: &str,
        file_id: &str,
    ) -> Result<(files::Model, PresignedUrl), AppError> {
        let file = self.get(owner_id, file_id).await?;
        let url = self.presign_download(&file).await?;
        tracing::info!("📎 Download URL issued for file_id={} user={}", file_id, owner_id);
        Ok((file, url))
    }

    pub async fn list(
        &self,
        owner_id: &str,
        folder_id: Option<&str>,
    ) -> Result<Vec<files::Model>, AppError> {
        if let Some(folder_id) = folder_id {
            find_live_folder(&self.db, owner_id, folder_id).await?;
        }

        let files = Files::find()
            .filter(files::Column::OwnerId.eq(owner_id))
            .filter(in_folder(files::Column::FolderId, folder_id))
            .filter(files::Column::Status.eq(files::STATUS_AVAILABLE))
            .filter(files::Column::DeletedAt.is_null())
            .order_by_asc(files::Column::Name)
            .all(&self.db)
            .await?;
        Ok(files)
    }

    /// Rename and/or move a file in a single write. `folder_id` is `None`
    /// to stay put and `Some(None)` to move to the root. The final
    /// `(folder, name)` pair is checked before anything changes.
    pub async fn update(
        &self,
        owner_id: &str,
        file_id: &str,
        new_name: Option<&str>,
        folder_id: Option<Option<&str>>,
    ) -> Result<files::Model, AppError> {
        let new_name = new_name
            .map(sanitize_name)
            .transpose()
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        let file = self.get(owner_id, file_id).await?;

        let target_folder = match folder_id {
            Some(target) => target.map(str::to_string),
            None => file.folder_id.clone(),
        };
        let target_name = new_name.unwrap_or_else(|| file.name.clone());
        if target_folder == file.folder_id && target_name == file.name {
            return Ok(file);
        }

        if target_folder != file.folder_id {
            if let Some(ref folder_id) = target_folder {
                find_live_folder(&self.db, owner_id, folder_id).await?;
            }
        }
        ensure_file_name_free(
            &self.db,
            owner_id,
            target_folder.as_deref(),
            &target_name,
            Some(file_id),
        )
        .await?;

        let mut active: files::ActiveModel = file.into();
        active.folder_id = Set(target_folder);
        active.name = Set(target_name);
        active.updated_at = Set(Utc::now());
        Ok(active.update(&self.db).await?)
    }

    /// Move a file to the recycle bin.
    pub async fn delete(
        &self,
        owner_id: &str,
        file_id: &str,
    ) -> Result<recycle_items::Model, AppError> {
        let file = self.get(owner_id, file_id).await?;
        self.recycle.trash_file(file).await
    }

    /// Forget uploads whose URL expired long ago without the client
    /// completing them.
    pub async fn purge_stale_uploads(&self) -> Result<u64, AppError> {
        let cutoff = Utc::now()
            - Duration::seconds(self.config.presign_ttl_secs as i64)
            - Duration::hours(1);

        let stale = Files::find()
            .filter(files::Column::Status.eq(files::STATUS_PENDING))
            .filter(files::Column::CreatedAt.lt(cutoff))
            .all(&self.db)
            .await?;

        let mut purged = 0;
        for file in stale {
            tracing::info!("Discarding stale upload {}", file.id);
            self.discard_pending(file).await?;
            purged += 1;
        }
        Ok(purged)
    }
}
