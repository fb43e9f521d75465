//! # Watermark Repository
//!
//! Persists the per-collection pull watermark: the timestamp boundary up to
//! which a collection's remote state has been pulled. Missing rows read as
//! zero, which makes a fresh device pull everything.

use sqlx::SqlitePool;

use crate::error::StoreResult;
use hkd_core::{EntityKind, SyncWatermark};

/// Repository for sync watermarks.
#[derive(Debug, Clone)]
pub struct WatermarkRepository {
    pool: SqlitePool,
}

impl WatermarkRepository {
    pub fn new(pool: SqlitePool) -> Self {
        WatermarkRepository { pool }
    }

    /// Gets the watermark for a collection (zero if never synced).
    pub async fn get(&self, collection: EntityKind) -> StoreResult<i64> {
        let value: Option<i64> = sqlx::query_scalar(
            "SELECT last_sync_at FROM sync_watermarks WHERE collection = ?1",
        )
        .bind(collection.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(value.unwrap_or(0))
    }

    /// Advances the watermark for a collection.
    pub async fn set(&self, collection: EntityKind, last_sync_at: i64) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_watermarks (collection, last_sync_at)
            VALUES (?1, ?2)
            ON CONFLICT(collection) DO UPDATE SET last_sync_at = excluded.last_sync_at
            "#,
        )
        .bind(collection.as_str())
        .bind(last_sync_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Loads all stored watermarks.
    pub async fn all(&self) -> StoreResult<Vec<SyncWatermark>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT collection, last_sync_at FROM sync_watermarks")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(name, ts)| {
                name.parse().ok().map(|collection| SyncWatermark {
                    collection,
                    last_sync_at: ts,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::LocalStore;

    #[tokio::test]
    async fn test_missing_watermark_reads_zero() {
        let store = LocalStore::in_memory().await.unwrap();
        let repo = store.watermarks();

        assert_eq!(repo.get(EntityKind::Product).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_set_and_advance() {
        let store = LocalStore::in_memory().await.unwrap();
        let repo = store.watermarks();

        repo.set(EntityKind::Sale, 1_000).await.unwrap();
        assert_eq!(repo.get(EntityKind::Sale).await.unwrap(), 1_000);

        repo.set(EntityKind::Sale, 2_000).await.unwrap();
        assert_eq!(repo.get(EntityKind::Sale).await.unwrap(), 2_000);

        assert_eq!(repo.all().await.unwrap().len(), 1);
    }
}
