use crate::entities::{prelude::*, *};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

/// Rows per insert, well under SQLite's bound parameter limit.
const INSERT_CHUNK: usize = 200;

/// Record storage objects that must be removed. Call this in the same
/// transaction that drops their file rows; the worker clears each entry
/// once the store has deleted the object.
pub async fn schedule<C: ConnectionTrait>(conn: &C, keys: &[String]) -> Result<(), DbErr> {
    let now = Utc::now();
    for chunk in keys.chunks(INSERT_CHUNK) {
        let rows = chunk.iter().map(|key| pending_deletions::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            storage_key: Set(key.clone()),
            attempts: Set(0),
            created_at: Set(now),
        });
        PendingDeletions::insert_many(rows).exec(conn).await?;
    }
    Ok(())
}

/// Oldest entries first.
pub async fn due<C: ConnectionTrait>(
    conn: &C,
    limit: u64,
) -> Result<Vec<pending_deletions::Model>, DbErr> {
    PendingDeletions::find()
        .order_by_asc(pending_deletions::Column::CreatedAt)
        .limit(limit)
        .all(conn)
        .await
}

/// The object is gone from the store, or has been given up on.
pub async fn forget<C: ConnectionTrait>(conn: &C, key: &str) -> Result<u64, DbErr> {
    let res = PendingDeletions::delete_many()
        .filter(pending_deletions::Column::StorageKey.eq(key))
        .exec(conn)
        .await?;
    Ok(res.rows_affected)
}

pub async fn record_failure<C: ConnectionTrait>(conn: &C, id: &str) -> Result<(), DbErr> {
    PendingDeletions::update_many()
        .col_expr(
            pending_deletions::Column::Attempts,
            Expr::col(pending_deletions::Column::Attempts).add(1),
        )
        .filter(pending_deletions::Column::Id.eq(id))
        .exec(conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::run_migrations;
    use sea_orm::{Database, PaginatorTrait};

    #[tokio::test]
    async fn test_schedule_in_chunks_and_forget() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        run_migrations(&db).await.unwrap();

        let keys: Vec<String> = (0..450).map(|i| format!("users/u/{}", i)).collect();
        schedule(&db, &keys).await.unwrap();
        schedule(&db, &[]).await.unwrap();
        assert_eq!(PendingDeletions::find().count(&db).await.unwrap(), 450);

        assert_eq!(forget(&db, "users/u/7").await.unwrap(), 1);
        assert_eq!(due(&db, 1000).await.unwrap().len(), 449);

        let first = due(&db, 1).await.unwrap().remove(0);
        record_failure(&db, &first.id).await.unwrap();
        let again = PendingDeletions::find_by_id(first.id).one(&db).await.unwrap().unwrap();
        assert_eq!(again.attempts, 1);
    }
}
