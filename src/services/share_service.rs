use crate::api::error::AppError;
use crate::entities::{prelude::*, *};
use crate::services::auth_service::{hash_password, verify_password};
use crate::services::file_service::{FileService, UploadTicket};
use crate::services::folder_service::{FolderContents, children_of, find_live_folder};
use crate::services::storage::PresignedUrl;
use crate::utils::auth::random_token;
use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

/// Longest share lifetime: one year.
pub const MAX_EXPIRY_HOURS: i64 = 8760;

#[derive(Debug, Clone, Default)]
pub struct NewShare {
    pub file_id: Option<String>,
    pub folder_id: Option<String>,
    pub can_download: bool,
    pub can_upload: bool,
    pub password: Option<String>,
    pub expires_in_hours: Option<i64>,
}

pub enum SharedItem {
    File {
        file: files::Model,
        download: Option<PresignedUrl>,
    },
    Folder {
        folder: folders::Model,
        contents: FolderContents,
    },
}

pub struct ResolvedShare {
    pub share: shares::Model,
    pub item: SharedItem,
}

pub struct ShareService {
    db: DatabaseConnection,
    files: Arc<FileService>,
}

impl ShareService {
    pub fn new(db: DatabaseConnection, files: Arc<FileService>) -> Self {
        Self { db, files }
    }

    /// Generate a URL-safe random token for share links
    pub fn generate_token() -> String {
        random_token(24)
    }

    pub async fn create(&self, owner_id: &str, req: NewShare) -> Result<shares::Model, AppError> {
        match (&req.file_id, &req.folder_id) {
            (Some(_), None) | (None, Some(_)) => {}
            _ => {
                return Err(AppError::BadRequest(
                    "Exactly one of file_id or folder_id is required".to_string(),
                ));
            }
        }

        let expires_at = match req.expires_in_hours {
            Some(hours) if hours <= 0 => {
                return Err(AppError::BadRequest("Expiry must be positive".to_string()));
            }
            Some(hours) if hours > MAX_EXPIRY_HOURS => {
                return Err(AppError::BadRequest(
                    "Expiry cannot exceed 1 year".to_string(),
                ));
            }
            Some(hours) => Some(Utc::now() + Duration::hours(hours)),
            None => None,
        };

        if let Some(ref file_id) = req.file_id {
            if req.can_upload {
                return Err(AppError::BadRequest(
                    "Uploads can only be allowed on folder shares".to_string(),
                ));
            }
            self.files.get(owner_id, file_id).await?;
        }
        if let Some(ref folder_id) = req.folder_id {
            find_live_folder(&self.db, owner_id, folder_id).await?;
        }

        let password_hash = match req.password {
            Some(ref p) if !p.is_empty() => Some(hash_password(p)?),
            _ => None,
        };

        let share = shares::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            owner_id: Set(owner_id.to_string()),
            file_id: Set(req.file_id),
            folder_id: Set(req.folder_id),
            token: Set(Self::generate_token()),
            can_download: Set(req.can_download),
            can_upload: Set(req.can_upload),
            password_hash: Set(password_hash),
            expires_at: Set(expires_at),
            created_at: Set(Utc::now()),
        }
        .insert(&self.db)
        .await?;

        tracing::info!("🔗 Share {} created by {}", share.id, owner_id);
        Ok(share)
    }

    /// List all shares created by a user, newest first
    pub async fn list(&self, owner_id: &str) -> Result<Vec<shares::Model>, AppError> {
        Ok(Shares::find()
            .filter(shares::Column::OwnerId.eq(owner_id))
            .order_by_desc(shares::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    pub async fn revoke(&self, owner_id: &str, share_id: &str) -> Result<(), AppError> {
        let share = Shares::find_by_id(share_id)
            .filter(shares::Column::OwnerId.eq(owner_id))
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound("Share not found".to_string()))?;

        share.delete(&self.db).await?;
        tracing::info!("🔗 Share {} revoked", share_id);
        Ok(())
    }

    /// Look up a share by token, enforcing expiry and password.
    pub async fn find_active(
        &self,
        token: &str,
        password: Option<&str>,
    ) -> Result<shares::Model, AppError> {
        let share = Shares::find()
            .filter(shares::Column::Token.eq(token))
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound("Share link not found".to_string()))?;

        if share.is_expired(Utc::now()) {
            return Err(AppError::Gone("Share link has expired".to_string()));
        }

        if let Some(ref hash) = share.password_hash {
            let password = password.ok_or(AppError::Unauthorized(
                "This share is password protected".to_string(),
            ))?;
            if !verify_password(password, hash)? {
                return Err(AppError::Unauthorized("Invalid share password".to_string()));
            }
        }

        Ok(share)
    }

    pub async fn resolve(
        &self,
        token: &str,
        password: Option<&str>,
    ) -> Result<ResolvedShare, AppError> {
        let share = self.find_active(token, password).await?;

        let item = if let Some(ref file_id) = share.file_id {
            let file = self
                .files
                .get(&share.owner_id, file_id)
                .await
                .map_err(|_| AppError::Gone("Shared file is no longer available".to_string()))?;
            let download = if share.can_download {
                Some(self.files.presign_download(&file).await?)
            } else {
                None
            };
            SharedItem::File { file, download }
        } else {
            let folder_id = share.folder_id.as_deref().unwrap_or_default();
            let folder = find_live_folder(&self.db, &share.owner_id, folder_id)
                .await
                .map_err(|_| AppError::Gone("Shared folder is no longer available".to_string()))?;
            let contents = children_of(&self.db, &share.owner_id, Some(&folder.id)).await?;
            SharedItem::Folder { folder, contents }
        };

        Ok(ResolvedShare { share, item })
    }

    fn upload_folder(share: &shares::Model) -> Result<&str, AppError> {
        match share.folder_id.as_deref() {
            Some(folder_id) if share.can_upload => Ok(folder_id),
            _ => Err(AppError::Forbidden(
                "This share does not accept uploads".to_string(),
            )),
        }
    }

    /// Upload into a shared folder; the bytes count against the owner's quota.
    pub async fn request_upload(
        &self,
        token: &str,
        password: Option<&str>,
        name: &str,
        size: i64,
        mime_type: &str,
    ) -> Result<UploadTicket, AppError> {
        let share = self.find_active(token, password).await?;
        let folder_id = Self::upload_folder(&share)?;
        self.files
            .request_upload(&share.owner_id, name, size, mime_type, Some(folder_id))
            .await
    }

    pub async fn complete_upload(
        &self,
        token: &str,
        password: Option<&str>,
        file_id: &str,
    ) -> Result<files::Model, AppError> {
        let share = self.find_active(token, password).await?;
        let folder_id = Self::upload_folder(&share)?;

        let belongs_to_share = Files::find_by_id(file_id)
            .filter(files::Column::OwnerId.eq(&share.owner_id))
            .filter(files::Column::FolderId.eq(folder_id))
            .one(&self.db)
            .await?
            .is_some();
        if !belongs_to_share {
            return Err(AppError::NotFound("File not found".to_string()));
        }

        self.files.complete_upload(&share.owner_id, file_id).await
    }

    /// Remove shares past their expiry.
    pub async fn purge_expired(&self) -> Result<u64, AppError> {
        let res = Shares::delete_many()
            .filter(shares::Column::ExpiresAt.lt(Utc::now()))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_unique() {
        let a = ShareService::generate_token();
        let b = ShareService::generate_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
    }

    fn share(expires_at: Option<chrono::DateTime<Utc>>) -> shares::Model {
        shares::Model {
            id: "s".into(),
            owner_id: "o".into(),
            file_id: Some("f".into()),
            folder_id: None,
            token: "t".into(),
            can_download: true,
            can_upload: false,
            password_hash: None,
            expires_at,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_share_expiry() {
        let now = Utc::now();
        assert!(!share(None).is_expired(now));
        assert!(!share(Some(now + Duration::hours(1))).is_expired(now));
        assert!(share(Some(now - Duration::seconds(1))).is_expired(now));
        assert!(share(Some(now)).is_expired(now));
    }

    #[test]
    fn test_upload_requires_folder_share_with_flag() {
        let file_share = share(None);
        assert!(ShareService::upload_folder(&file_share).is_err());

        let mut folder_share = share(None);
        folder_share.file_id = None;
        folder_share.folder_id = Some("d".into());
        assert!(ShareService::upload_folder(&folder_share).is_err());

        folder_share.can_upload = true;
        assert_eq!(ShareService::upload_folder(&folder_share).unwrap(), "d");
    }
}
