//! # Sale Repository
//!
//! Local persistence for completed sales. Line items are stored as a JSON
//! payload column: sales are immutable after creation, so nothing ever
//! queries inside an individual line.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error::StoreResult;
use hkd_core::{PaymentMethod, Sale};

/// Repository for sale records.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

fn row_to_sale(row: &SqliteRow) -> StoreResult<Sale> {
    let items_json: String = row.try_get("items")?;
    let payment: String = row.try_get("payment_method")?;

    Ok(Sale {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        owner_name: row.try_get("owner_name")?,
        customer_name: row.try_get("customer_name")?,
        customer_phone: row.try_get("customer_phone")?,
        items: serde_json::from_str(&items_json)?,
        subtotal: row.try_get("subtotal")?,
        discount: row.try_get("discount")?,
        tax: row.try_get("tax")?,
        total: row.try_get("total")?,
        payment_method: serde_json::from_value(serde_json::Value::String(payment))
            .unwrap_or(PaymentMethod::Cash),
        timestamp: row.try_get("timestamp")?,
        last_updated: row.try_get("last_updated")?,
        synced: row.try_get("synced")?,
    })
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Upserts a sale by id. Sales are immutable; in practice only the
    /// `synced`/`last_updated` bookkeeping changes after creation.
    pub async fn upsert(&self, sale: &Sale) -> StoreResult<()> {
        let items_json = serde_json::to_string(&sale.items)?;
        let payment = serde_json::to_value(sale.payment_method)?
            .as_str()
            .unwrap_or("cash")
            .to_string();

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, owner_id, owner_name, customer_name, customer_phone, items,
                subtotal, discount, tax, total, payment_method,
                timestamp, last_updated, synced
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(id) DO UPDATE SET
                owner_name = excluded.owner_name,
                customer_name = excluded.customer_name,
                customer_phone = excluded.customer_phone,
                items = excluded.items,
                subtotal = excluded.subtotal,
                discount = excluded.discount,
                tax = excluded.tax,
                total = excluded.total,
                payment_method = excluded.payment_method,
                timestamp = excluded.timestamp,
                last_updated = excluded.last_updated,
                synced = excluded.synced
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.owner_id)
        .bind(&sale.owner_name)
        .bind(&sale.customer_name)
        .bind(&sale.customer_phone)
        .bind(items_json)
        .bind(sale.subtotal)
        .bind(sale.discount)
        .bind(sale.tax)
        .bind(sale.total)
        .bind(payment)
        .bind(sale.timestamp)
        .bind(sale.last_updated)
        .bind(sale.synced)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a sale by id.
    pub async fn get(&self, id: &str) -> StoreResult<Option<Sale>> {
        let row = sqlx::query("SELECT * FROM sales WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_sale).transpose()
    }

    /// Lists all sales of an owner, newest first.
    pub async fn get_all_for_owner(&self, owner_id: &str) -> StoreResult<Vec<Sale>> {
        let rows = sqlx::query("SELECT * FROM sales WHERE owner_id = ?1 ORDER BY timestamp DESC")
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_sale).collect()
    }

    /// Lists sales in a time range, across all owners or scoped to one
    /// (cross-owner reporting).
    pub async fn get_range(
        &self,
        owner_id: Option<&str>,
        from: i64,
        to: i64,
    ) -> StoreResult<Vec<Sale>> {
        let rows = match owner_id {
            Some(owner) => {
                sqlx::query(
                    "SELECT * FROM sales WHERE owner_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3 ORDER BY timestamp",
                )
                .bind(owner)
                .bind(from)
                .bind(to)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT * FROM sales WHERE timestamp >= ?1 AND timestamp <= ?2 ORDER BY timestamp",
                )
                .bind(from)
                .bind(to)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(row_to_sale).collect()
    }

    /// Hard-deletes a sale row (remote tombstone observed).
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM sales WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Hard-deletes every sale of an owner (owner cascade).
    pub async fn delete_by_owner(&self, owner_id: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM sales WHERE owner_id = ?1")
            .bind(owner_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Flags a sale as confirmed by the remote store.
    pub async fn set_synced(&self, id: &str) -> StoreResult<()> {
        sqlx::query("UPDATE sales SET synced = 1 WHERE id = ?1")
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
    use hkd_core::{now_millis, LineItem};

    fn sample_sale(owner: &str, total: i64, ts: i64) -> Sale {
        Sale {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner.to_string(),
            owner_name: "Tạp hoá Mai".to_string(),
            customer_name: String::new(),
            customer_phone: String::new(),
            items: vec![LineItem {
                product_id: "p1".to_string(),
                name: "Mì Hảo Hảo".to_string(),
                price: total,
                quantity: 1,
                total,
                ..Default::default()
            }],
            subtotal: total,
            discount: 0,
            tax: 0,
            total,
            payment_method: PaymentMethod::Cash,
            timestamp: ts,
            last_updated: ts,
            synced: false,
        }
    }

    #[tokio::test]
    async fn test_items_round_trip() {
        let store = LocalStore::in_memory().await.unwrap();
        let repo = store.sales();

        let sale = sample_sale("o1", 4_000, now_millis());
        repo.upsert(&sale).await.unwrap();

        let loaded = repo.get(&sale.id).await.unwrap().unwrap();
        assert_eq!(loaded.items.len(), 1);
        assert_eq!(loaded.items[0].name, "Mì Hảo Hảo");
        assert_eq!(loaded.items[0].original_name, ""); // absent → empty string
        assert_eq!(loaded.payment_method, PaymentMethod::Cash);
    }

    #[tokio::test]
    async fn test_range_query_scoping() {
        let store = LocalStore::in_memory().await.unwrap();
        let repo = store.sales();

        repo.upsert(&sample_sale("o1", 100, 10)).await.unwrap();
        repo.upsert(&sample_sale("o1", 200, 20)).await.unwrap();
        repo.upsert(&sample_sale("o2", 300, 15)).await.unwrap();

        let all = repo.get_range(None, 0, 100).await.unwrap();
        assert_eq!(all.len(), 3);

        let o1_window = repo.get_range(Some("o1"), 15, 100).await.unwrap();
        assert_eq!(o1_window.len(), 1);
        assert_eq!(o1_window[0].total, 200);
    }
}
