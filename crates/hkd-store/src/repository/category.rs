//! # Category Repository
//!
//! Local persistence for product categories. Every owner keeps the fallback
//! category alive; the service layer re-creates it if it ever goes missing.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::StoreResult;
use hkd_core::Category;

/// Repository for category records.
#[derive(Debug, Clone)]
pub struct CategoryRepository {
    pool: SqlitePool,
}

impl CategoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CategoryRepository { pool }
    }

    /// Upserts a category by id.
    pub async fn upsert(&self, category: &Category) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO categories (
                id, owner_id, name, last_updated, deleted, deleted_at, synced
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                name = excluded.name,
                last_updated = excluded.last_updated,
                deleted = excluded.deleted,
                deleted_at = excluded.deleted_at,
                synced = excluded.synced
            "#,
        )
        .bind(&category.id)
        .bind(&category.owner_id)
        .bind(&category.name)
        .bind(category.last_updated)
        .bind(category.deleted)
        .bind(category.deleted_at)
        .bind(category.synced)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a live category by id.
    pub async fn get(&self, id: &str) -> StoreResult<Option<Category>> {
        let category =
            sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = ?1 AND deleted = 0")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(category)
    }

    /// Gets a category by id, tombstones included.
    pub async fn get_any(&self, id: &str) -> StoreResult<Option<Category>> {
        let category = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(category)
    }

    /// Lists all live categories of an owner.
    pub async fn get_all_for_owner(&self, owner_id: &str) -> StoreResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(
            "SELECT * FROM categories WHERE owner_id = ?1 AND deleted = 0 ORDER BY name",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(categories)
    }

    /// Finds a live category of an owner by exact name (fallback-category
    /// invariant check).
    pub async fn find_by_name(&self, owner_id: &str, name: &str) -> StoreResult<Option<Category>> {
        let category = sqlx::query_as::<_, Category>(
            "SELECT * FROM categories WHERE owner_id = ?1 AND name = ?2 AND deleted = 0",
        )
        .bind(owner_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(category)
    }

    /// Marks a category as a local tombstone.
    pub async fn tombstone(&self, id: &str, now: i64) -> StoreResult<()> {
        debug!(id = %id, "Tombstoning category");

        sqlx::query(
            "UPDATE categories SET deleted = 1, deleted_at = ?2, last_updated = ?2, synced = 0 WHERE id = ?1",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Hard-deletes a category row. Products are the caller's cascade.
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM categories WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Hard-deletes every category of an owner (owner cascade).
    pub async fn delete_by_owner(&self, owner_id: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM categories WHERE owner_id = ?1")
            .bind(owner_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Flags a category row as confirmed by the remote store.
    pub async fn set_synced(&self, id: &str) -> StoreResult<()> {
        sqlx::query("UPDATE categories SET synced = 1 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::LocalStore;

    #[tokio::test]
    async fn test_upsert_get_and_name_lookup() {
        let store = LocalStore::in_memory().await.unwrap();
        let repo = store.categories();

        let cat = Category::new("owner-1", "Đồ uống");
        repo.upsert(&cat).await.unwrap();

        assert!(repo.get(&cat.id).await.unwrap().is_some());
        assert!(repo
            .find_by_name("owner-1", "Đồ uống")
            .await
            .unwrap()
            .is_some());
        assert!(repo
            .find_by_name("owner-2", "Đồ uống")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_owner_scoped_listing() {
        let store = LocalStore::in_memory().await.unwrap();
        let repo = store.categories();

        repo.upsert(&Category::new("o1", "A")).await.unwrap();
        repo.upsert(&Category::new("o1", "B")).await.unwrap();
        repo.upsert(&Category::new("o2", "C")).await.unwrap();

        assert_eq!(repo.get_all_for_owner("o1").await.unwrap().len(), 2);
        assert_eq!(repo.get_all_for_owner("o2").await.unwrap().len(), 1);
    }
}
