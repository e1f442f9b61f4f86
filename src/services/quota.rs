use crate::api::error::AppError;
use crate::entities::{prelude::*, *};
use crate::utils::keyed_mutex::KeyedMutex;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde::Serialize;
use tokio::sync::OwnedMutexGuard;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct QuotaUsage {
    pub quota: i64,
    pub used: i64,
    /// Bytes promised to uploads that have not completed yet.
    pub reserved: i64,
}

impl QuotaUsage {
    pub fn available(&self) -> i64 {
        (self.quota - self.used - self.reserved).max(0)
    }

    pub fn can_reserve(&self, size: i64) -> bool {
        size <= self.available()
    }

    pub fn can_commit(&self, size: i64) -> bool {
        self.used + size <= self.quota
    }
}

/// Storage quota bookkeeping. Every mutation of a user's usage happens
/// while holding that user's lock from [`QuotaService::lock`].
#[derive(Clone, Default)]
pub struct QuotaService {
    locks: KeyedMutex,
}

impl QuotaService {
    pub fn new() -> Self {
        Self {
            locks: KeyedMutex::new(),
        }
    }

    pub async fn lock(&self, user_id: &str) -> OwnedMutexGuard<()> {
        self.locks.lock(user_id).await
    }

    pub fn cleanup(&self) {
        self.locks.cleanup();
    }

    pub async fn usage<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: &str,
    ) -> Result<QuotaUsage, AppError> {
        let user = Users::find_by_id(user_id)
            .one(conn)
            .await?
            .ok_or(AppError::NotFound("User not found".to_string()))?;

        let pending = Files::find()
            .filter(files::Column::OwnerId.eq(user_id))
            .filter(files::Column::Status.eq(files::STATUS_PENDING))
            .filter(files::Column::DeletedAt.is_null())
            .all(conn)
            .await?;

        Ok(QuotaUsage {
            quota: user.storage_quota,
            used: user.storage_used,
            reserved: pending.iter().map(|f| f.size).sum(),
        })
    }

    pub async fn ensure_can_reserve<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: &str,
        size: i64,
    ) -> Result<QuotaUsage, AppError> {
        let usage = self.usage(conn, user_id).await?;
        if !usage.can_reserve(size) {
            return Err(AppError::QuotaExceeded(format!(
                "{} bytes requested, {} bytes available",
                size,
                usage.available()
            )));
        }
        Ok(usage)
    }

    /// Adds `delta` bytes (negative to release) to the user's usage, never
    /// dropping below zero.
    pub async fn adjust<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: &str,
        delta: i64,
    ) -> Result<(), AppError> {
        if delta == 0 {
            return Ok(());
        }

        Users::update_many()
            .col_expr(
                users::Column::StorageUsed,
                Expr::col(users::Column::StorageUsed).add(delta),
            )
            .filter(users::Column::Id.eq(user_id))
            .exec(conn)
            .await?;

        if delta < 0 {
            Users::update_many()
                .col_expr(users::Column::StorageUsed, Expr::value(0i64))
                .filter(users::Column::Id.eq(user_id))
                .filter(users::Column::StorageUsed.lt(0i64))
                .exec(conn)
                .await?;
        }

        tracing::debug!("Adjusted storage usage of {} by {} bytes", user_id, delta);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_accounts_for_reservations() {
        let usage = QuotaUsage {
            quota: 100,
            used: 40,
            reserved: 30,
        };
        assert_eq!(usage.available(), 30);
        assert!(usage.can_reserve(30));
        assert!(!usage.can_reserve(31));
        assert!(usage.can_commit(60));
        assert!(!usage.can_commit(61));
    }

    #[test]
    fn test_available_never_negative() {
        let usage = QuotaUsage {
            quota: 10,
            used: 20,
            reserved: 0,
        };
        assert_eq!(usage.available(), 0);
        assert!(!usage.can_reserve(1));
    }
}
