use crate::api::error::AppError;
use crate::config::AppConfig;
use crate::entities::{prelude::*, *};
use crate::utils::auth::{create_jwt, hash_token, random_token};
use argon2::{
    Argon2,
    password_hash::{PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, Set, SqlErr, TransactionTrait,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// Hash a password using argon2 with a fresh random salt
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(e.to_string()))?
        .to_string();
    Ok(hash)
}

/// Verify a password against a stored argon2 hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed_hash =
        argon2::PasswordHash::new(hash).map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// A registration that loses a race on a unique index is a conflict; any
/// other failure is passed on as a database error.
fn registration_error(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) if detail.contains("email") => {
            AppError::Conflict("Email already registered".to_string())
        }
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            AppError::Conflict("Username already exists".to_string())
        }
        _ => AppError::Database(err),
    }
}

pub struct AuthService {
    db: DatabaseConnection,
    config: AppConfig,
}

impl AuthService {
    pub fn new(db: DatabaseConnection, config: AppConfig) -> Self {
        Self { db, config }
    }

    pub async fn register(
        &self,
        username: &str,
        email: Option<&str>,
        password: &str,
    ) -> Result<users::Model, AppError> {
        let username_taken = Users::find()
            .filter(users::Column::Username.eq(username))
            .count(&self.db)
            .await?
            > 0;
        if username_taken {
            return Err(AppError::Conflict("Username already exists".to_string()));
        }

        let email = email.map(|e| e.trim().to_lowercase());
        if let Some(ref email) = email {
            let email_taken = Users::find()
                .filter(users::Column::Email.eq(email.as_str()))
                .count(&self.db)
                .await?
                > 0;
            if email_taken {
                return Err(AppError::Conflict("Email already registered".to_string()));
            }
        }

        let user = users::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            username: Set(username.to_string()),
            email: Set(email),
            password_hash: Set(hash_password(password)?),
            storage_quota: Set(self.config.default_storage_quota),
            storage_used: Set(0),
            created_at: Set(Utc::now()),
        };

        // The unique indexes still guard against a concurrent registration.
        let user = user.insert(&self.db).await.map_err(registration_error)?;

        tracing::info!("👤 Registered user {} ({})", user.username, user.id);
        Ok(user)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, AppError> {
        let user = Users::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.db)
            .await?
            .ok_or(AppError::Unauthorized("Invalid credentials".to_string()))?;

        if !verify_password(password, &user.password_hash)? {
            return Err(AppError::Unauthorized("Invalid credentials".to_string()));
        }

        self.issue_tokens(&self.db, &user.id).await
    }

    async fn issue_tokens<C: sea_orm::ConnectionTrait>(
        &self,
        conn: &C,
        user_id: &str,
    ) -> Result<TokenPair, AppError> {
        let access_ttl = Duration::minutes(self.config.access_token_ttl_minutes);
        let access_token = create_jwt(user_id, &self.config.jwt_secret, access_ttl)
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let refresh_token = random_token(48);
        let now = Utc::now();
        let record = refresh_tokens::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            user_id: Set(user_id.to_string()),
            token_hash: Set(hash_token(&refresh_token)),
            expires_at: Set(now + Duration::days(self.config.refresh_token_ttl_days)),
            revoked_at: Set(None),
            created_at: Set(now),
        };
        record.insert(conn).await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: access_ttl.num_seconds(),
        })
    }

    /// Exchange a refresh token for a new pair. The presented token is
    /// revoked; presenting a revoked token revokes every token of its user.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        let txn = self.db.begin().await?;
        let now = Utc::now();

        let record = RefreshTokens::find()
            .filter(refresh_tokens::Column::TokenHash.eq(hash_token(refresh_token)))
            .one(&txn)
            .await?
            .ok_or(AppError::Unauthorized("Invalid refresh token".to_string()))?;

        if record.revoked_at.is_some() {
            tracing::warn!(
                "Refresh token reuse detected for user {}, revoking all sessions",
                record.user_id
            );
            RefreshTokens::update_many()
                .col_expr(
                    refresh_tokens::Column::RevokedAt,
                    sea_orm::sea_query::Expr::value(now),
                )
                .filter(refresh_tokens::Column::UserId.eq(&record.user_id))
                .filter(refresh_tokens::Column::RevokedAt.is_null())
                .exec(&txn)
                .await?;
            txn.commit().await?;
            return Err(AppError::Unauthorized("Invalid refresh token".to_string()));
        }

        if record.expires_at <= now {
            return Err(AppError::Unauthorized("Refresh token expired".to_string()));
        }

        let user_id = record.user_id.clone();
        let mut active: refresh_tokens::ActiveModel = record.into();
        active.revoked_at = Set(Some(now));
        active.update(&txn).await?;

        let pair = self.issue_tokens(&txn, &user_id).await?;
        txn.commit().await?;
        Ok(pair)
    }

    /// Revoke a refresh token. Unknown tokens are ignored.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AppError> {
        RefreshTokens::update_many()
            .col_expr(
                refresh_tokens::Column::RevokedAt,
                sea_orm::sea_query::Expr::value(Utc::now()),
            )
            .filter(refresh_tokens::Column::TokenHash.eq(hash_token(refresh_token)))
            .filter(refresh_tokens::Column::RevokedAt.is_null())
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn profile(&self, user_id: &str) -> Result<users::Model, AppError> {
        Users::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound("User not found".to_string()))
    }

    /// Drop refresh tokens past their expiry.
    pub async fn purge_expired_tokens(&self) -> Result<u64, AppError> {
        let res = RefreshTokens::delete_many()
            .filter(refresh_tokens::Column::ExpiresAt.lt(Utc::now()))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected)
    }
}
