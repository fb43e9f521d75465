//! # Product Repository
//!
//! Local persistence for products, including the transactional stock
//! decrement used at sale time and the category cascade used when a
//! category's deletion propagates.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::StoreResult;
use hkd_core::Product;

/// Repository for product records.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Upserts a product by id.
    pub async fn upsert(&self, product: &Product) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO products (
                id, owner_id, category_id, name, code, price, cost, stock,
                unit, barcode, created_at, last_updated, deleted, deleted_at, synced
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                category_id = excluded.category_id,
                name = excluded.name,
                code = excluded.code,
                price = excluded.price,
                cost = excluded.cost,
                stock = excluded.stock,
                unit = excluded.unit,
                barcode = excluded.barcode,
                created_at = excluded.created_at,
                last_updated = excluded.last_updated,
                deleted = excluded.deleted,
                deleted_at = excluded.deleted_at,
                synced = excluded.synced
            "#,
        )
        .bind(&product.id)
        .bind(&product.owner_id)
        .bind(&product.category_id)
        .bind(&product.name)
        .bind(&product.code)
        .bind(product.price)
        .bind(product.cost)
        .bind(product.stock)
        .bind(&product.unit)
        .bind(&product.barcode)
        .bind(product.created_at)
        .bind(product.last_updated)
        .bind(product.deleted)
        .bind(product.deleted_at)
        .bind(product.synced)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a live product by id.
    pub async fn get(&self, id: &str) -> StoreResult<Option<Product>> {
        let product =
            sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?1 AND deleted = 0")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(product)
    }

    /// Gets a product by id, tombstones included.
    pub async fn get_any(&self, id: &str) -> StoreResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Lists all live products of an owner.
    pub async fn get_all_for_owner(&self, owner_id: &str) -> StoreResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE owner_id = ?1 AND deleted = 0 ORDER BY name",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Lists all live products in a category.
    pub async fn get_all_for_category(&self, category_id: &str) -> StoreResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE category_id = ?1 AND deleted = 0 ORDER BY name",
        )
        .bind(category_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Decrements stock for a sold product, floored at zero.
    ///
    /// Stock sufficiency is validated *before* the sale commits; the floor
    /// here is the last line of defense against a concurrent decrement.
    pub async fn decrement_stock(&self, id: &str, quantity: i64, now: i64) -> StoreResult<()> {
        debug!(id = %id, quantity, "Decrementing stock");

        sqlx::query(
            r#"
            UPDATE products SET
                stock = MAX(stock - ?2, 0),
                last_updated = ?3,
                synced = 0
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(quantity)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Marks a product as a local tombstone.
    pub async fn tombstone(&self, id: &str, now: i64) -> StoreResult<()> {
        sqlx::query(
            "UPDATE products SET deleted = 1, deleted_at = ?2, last_updated = ?2, synced = 0 WHERE id = ?1",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Hard-deletes a product row.
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Hard-deletes every product of a category (category cascade).
    pub async fn delete_by_category(&self, category_id: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM products WHERE category_id = ?1")
            .bind(category_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Hard-deletes every product of an owner (owner cascade).
    pub async fn delete_by_owner(&self, owner_id: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM products WHERE owner_id = ?1")
            .bind(owner_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Flags a product row as confirmed by the remote store.
    pub async fn set_synced(&self, id: &str) -> StoreResult<()> {
        sqlx::query("UPDATE products SET synced = 1 WHERE id = ?1")
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
    use hkd_core::now_millis;

    fn sample_product(owner: &str, category: &str, stock: i64) -> Product {
        let now = now_millis();
        Product {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner.to_string(),
            category_id: category.to_string(),
            name: "Mì Hảo Hảo".to_string(),
            code: "MI001".to_string(),
            price: 4_000,
            cost: 3_200,
            stock,
            unit: "gói".to_string(),
            barcode: String::new(),
            created_at: now,
            last_updated: now,
            deleted: false,
            deleted_at: None,
            synced: false,
        }
    }

    #[tokio::test]
    async fn test_stock_decrement_floors_at_zero() {
        let store = LocalStore::in_memory().await.unwrap();
        let repo = store.products();

        let product = sample_product("o1", "c1", 3);
        repo.upsert(&product).await.unwrap();

        repo.decrement_stock(&product.id, 2, 100).await.unwrap();
        assert_eq!(repo.get(&product.id).await.unwrap().unwrap().stock, 1);

        // Floor: a concurrent oversell cannot push below zero
        repo.decrement_stock(&product.id, 10, 101).await.unwrap();
        assert_eq!(repo.get(&product.id).await.unwrap().unwrap().stock, 0);
    }

    #[tokio::test]
    async fn test_category_cascade_is_scoped() {
        let store = LocalStore::in_memory().await.unwrap();
        let repo = store.products();

        repo.upsert(&sample_product("o1", "c1", 1)).await.unwrap();
        repo.upsert(&sample_product("o1", "c1", 1)).await.unwrap();
        let keep = sample_product("o1", "c2", 1);
        repo.upsert(&keep).await.unwrap();

        let removed = repo.delete_by_category("c1").await.unwrap();
        assert_eq!(removed, 2);
        assert!(repo.get(&keep.id).await.unwrap().is_some());
    }
}
