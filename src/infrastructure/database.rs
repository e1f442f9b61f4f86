use crate::entities::{
    files, folders, pending_deletions, recycle_items, refresh_tokens, shares, users,
};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm::{ConnectionTrait, Schema};
use std::time::Duration;
use tracing::info;

pub async fn setup_database(db_url: &str) -> anyhow::Result<DatabaseConnection> {
    info!("📂 Database: {}", redact_url(db_url));

    let mut opt = ConnectOptions::new(db_url);
    opt.max_connections(100)
        .min_connections(5)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let db = Database::connect(opt).await?;

    info!("✅ Database connected successfully");

    run_migrations(&db).await?;

    Ok(db)
}

/// Hide the password part of a connection URL before logging it.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => {
            let creds = &url[scheme + 3..at];
            match creds.find(':') {
                Some(colon) => format!(
                    "{}{}:***{}",
                    &url[..scheme + 3],
                    &creds[..colon],
                    &url[at..]
                ),
                None => url.to_string(),
            }
        }
        _ => url.to_string(),
    }
}

pub async fn run_migrations(db: &DatabaseConnection) -> anyhow::Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    info!("🔄 Running auto-migrations...");

    // Order matters for foreign keys: users first, then what references them
    let stmts = vec![
        (
            "users",
            schema
                .create_table_from_entity(users::Entity)
                .if_not_exists()
                .to_owned(),
        ),
        (
            "refresh_tokens",
            schema
                .create_table_from_entity(refresh_tokens::Entity)
                .if_not_exists()
                .to_owned(),
        ),
        (
            "folders",
            schema
                .create_table_from_entity(folders::Entity)
                .if_not_exists()
                .to_owned(),
        ),
        (
            "files",
            schema
                .create_table_from_entity(files::Entity)
                .if_not_exists()
                .to_owned(),
        ),
        (
            "shares",
            schema
                .create_table_from_entity(shares::Entity)
                .if_not_exists()
                .to_owned(),
        ),
        (
            "recycle_items",
            schema
                .create_table_from_entity(recycle_items::Entity)
                .if_not_exists()
                .to_owned(),
        ),
        (
            "pending_deletions",
            schema
                .create_table_from_entity(pending_deletions::Entity)
                .if_not_exists()
                .to_owned(),
        ),
    ];

    for (name, stmt) in stmts {
        let stmt = builder.build(&stmt);
        db.execute(stmt)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create table '{}': {}", name, e))?;
        info!("   - Table '{}' checked/created", name);
    }

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_folders_owner_parent ON folders(owner_id, parent_id)",
        "CREATE INDEX IF NOT EXISTS idx_folders_deleted_at ON folders(deleted_at)",
        "CREATE INDEX IF NOT EXISTS idx_files_owner_folder ON files(owner_id, folder_id)",
        "CREATE INDEX IF NOT EXISTS idx_files_status_created ON files(status, created_at)",
        "CREATE INDEX IF NOT EXISTS idx_files_deleted_at ON files(deleted_at)",
        "CREATE INDEX IF NOT EXISTS idx_shares_owner ON shares(owner_id)",
        "CREATE INDEX IF NOT EXISTS idx_shares_expires_at ON shares(expires_at)",
        "CREATE INDEX IF NOT EXISTS idx_recycle_items_owner ON recycle_items(owner_id)",
        "CREATE INDEX IF NOT EXISTS idx_recycle_items_purge_after ON recycle_items(purge_after)",
        "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user ON refresh_tokens(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_pending_deletions_key ON pending_deletions(storage_key)",
    ];

    for query in indexes {
        match db
            .execute(sea_orm::Statement::from_string(builder, query.to_owned()))
            .await
        {
            Ok(_) => tracing::debug!("   - Executed: {}", query),
            Err(e) => tracing::warn!("   - Index creation warning: {} -> {}", query, e),
        }
    }

    info!("✅ Schema up to date");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_url() {
        assert_eq!(
            redact_url("postgres://drive:hunter2@db:5432/drive"),
            "postgres://drive:***@db:5432/drive"
        );
        assert_eq!(redact_url("sqlite::memory:"), "sqlite::memory:");
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        run_migrations(&db).await.unwrap();
        run_migrations(&db).await.unwrap();
    }
}
