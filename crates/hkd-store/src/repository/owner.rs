//! # Owner Repository
//!
//! Local persistence for owner (household business) records, including the
//! phone secondary index used for uniqueness checks at registration time.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::StoreResult;
use hkd_core::Owner;

/// Repository for owner records.
#[derive(Debug, Clone)]
pub struct OwnerRepository {
    pool: SqlitePool,
}

impl OwnerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OwnerRepository { pool }
    }

    /// Upserts an owner by id.
    ///
    /// Uses `ON CONFLICT(id)` rather than `INSERT OR REPLACE` so that a
    /// phone collision with a *different* owner surfaces as a
    /// `UniqueViolation` instead of silently replacing that row.
    pub async fn upsert(&self, owner: &Owner) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO owners (
                id, name, phone, address, password_hash, status,
                created_at, last_updated, deleted, deleted_at, synced
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                phone = excluded.phone,
                address = excluded.address,
                password_hash = excluded.password_hash,
                status = excluded.status,
                created_at = excluded.created_at,
                last_updated = excluded.last_updated,
                deleted = excluded.deleted,
                deleted_at = excluded.deleted_at,
                synced = excluded.synced
            "#,
        )
        .bind(&owner.id)
        .bind(&owner.name)
        .bind(&owner.phone)
        .bind(&owner.address)
        .bind(&owner.password_hash)
        .bind(owner.status)
        .bind(owner.created_at)
        .bind(owner.last_updated)
        .bind(owner.deleted)
        .bind(owner.deleted_at)
        .bind(owner.synced)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a live (non-tombstoned) owner by id.
    pub async fn get(&self, id: &str) -> StoreResult<Option<Owner>> {
        let owner = sqlx::query_as::<_, Owner>("SELECT * FROM owners WHERE id = ?1 AND deleted = 0")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(owner)
    }

    /// Gets an owner by id, tombstones included (sync engine use).
    pub async fn get_any(&self, id: &str) -> StoreResult<Option<Owner>> {
        let owner = sqlx::query_as::<_, Owner>("SELECT * FROM owners WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(owner)
    }

    /// Lists all live owners.
    pub async fn get_all(&self) -> StoreResult<Vec<Owner>> {
        let owners =
            sqlx::query_as::<_, Owner>("SELECT * FROM owners WHERE deleted = 0 ORDER BY created_at")
                .fetch_all(&self.pool)
                .await?;

        Ok(owners)
    }

    /// Secondary-index lookup: live owner by phone number.
    pub async fn find_by_phone(&self, phone: &str) -> StoreResult<Option<Owner>> {
        let owner =
            sqlx::query_as::<_, Owner>("SELECT * FROM owners WHERE phone = ?1 AND deleted = 0")
                .bind(phone)
                .fetch_optional(&self.pool)
                .await?;

        Ok(owner)
    }

    /// Marks an owner as a local tombstone.
    pub async fn tombstone(&self, id: &str, now: i64) -> StoreResult<()> {
        debug!(id = %id, "Tombstoning owner");

        sqlx::query(
            "UPDATE owners SET deleted = 1, deleted_at = ?2, last_updated = ?2, synced = 0 WHERE id = ?1",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Hard-deletes an owner row (remote tombstone observed, or true purge).
    /// Contained records are the caller's responsibility to cascade.
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM owners WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Flags an owner row as confirmed by the remote store.
    pub async fn set_synced(&self, id: &str) -> StoreResult<()> {
        sqlx::query("UPDATE owners SET synced = 1 WHERE id = ?1")
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
    use hkd_core::OwnerStatus;

    #[tokio::test]
    async fn test_upsert_and_phone_lookup() {
        let store = LocalStore::in_memory().await.unwrap();
        let repo = store.owners();

        let owner = Owner::new("Mai", "0912345678", "Hà Nội", "hash");
        repo.upsert(&owner).await.unwrap();

        let found = repo.find_by_phone("0912345678").await.unwrap().unwrap();
        assert_eq!(found.id, owner.id);
        assert_eq!(found.status, OwnerStatus::Active);

        assert!(repo.find_by_phone("0999999999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_phone_rejected() {
        let store = LocalStore::in_memory().await.unwrap();
        let repo = store.owners();

        repo.upsert(&Owner::new("Mai", "0912345678", "", "h1"))
            .await
            .unwrap();

        let dup = Owner::new("Hoa", "0912345678", "", "h2");
        let err = repo.upsert(&dup).await.unwrap_err();
        assert!(matches!(err, crate::error::StoreError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_tombstone_hides_from_reads() {
        let store = LocalStore::in_memory().await.unwrap();
        let repo = store.owners();

        let owner = Owner::new("Mai", "0912345678", "", "h");
        repo.upsert(&owner).await.unwrap();
        repo.tombstone(&owner.id, 123).await.unwrap();

        assert!(repo.get(&owner.id).await.unwrap().is_none());
        let any = repo.get_any(&owner.id).await.unwrap().unwrap();
        assert!(any.deleted);
        assert_eq!(any.deleted_at, Some(123));
    }
}
