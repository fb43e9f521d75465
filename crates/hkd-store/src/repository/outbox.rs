//! # Sync Outbox Repository
//!
//! The durable queue of pending mutation intents awaiting transmission to
//! the remote store.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Outbox Lifecycle                                   │
//! │                                                                         │
//! │  LOCAL MUTATION (e.g., record_sale)                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  1. write entity to local table                                         │
//! │  2. enqueue(kind, full entity JSON)        status = pending             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SYNC ENGINE PUSH PHASE (per pass)                                      │
//! │       │                                                                 │
//! │       ├── success ──► mark_synced          status = synced              │
//! │       │                                                                 │
//! │       ├── failure ──► mark_error           status = error,              │
//! │       │               (attempts += 1,       retried next pass after     │
//! │       │                backoff scheduled)   next_attempt_at)            │
//! │       │                                                                 │
//! │       └── budget spent ──► mark_dead       status = dead,               │
//! │                                             surfaced via sync status    │
//! │       ▼                                                                 │
//! │  cleanup_synced(retention) purges old synced entries periodically       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entries drain in `seq` (insertion) order. Duplicate entries for the same
//! entity are fine: each carries the full entity snapshot, so the last one
//! wins at apply time.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use crate::error::StoreResult;
use hkd_core::{OutboxEntry, OutboxStatus};

/// Repository for sync outbox operations.
#[derive(Debug, Clone)]
pub struct OutboxRepository {
    pool: SqlitePool,
}

fn row_to_entry(row: &SqliteRow) -> StoreResult<OutboxEntry> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    let data: String = row.try_get("data")?;

    Ok(OutboxEntry {
        seq: row.try_get("seq")?,
        id: row.try_get("id")?,
        kind: kind
            .parse()
            .map_err(crate::error::StoreError::CorruptPayload)?,
        data: serde_json::from_str(&data)?,
        status: status
            .parse()
            .map_err(crate::error::StoreError::CorruptPayload)?,
        attempts: row.try_get("attempts")?,
        last_error: row.try_get("last_error")?,
        next_attempt_at: row.try_get("next_attempt_at")?,
        created_at: row.try_get("created_at")?,
    })
}

impl OutboxRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OutboxRepository { pool }
    }

    /// Appends a pending entry. Never overwrites existing entries.
    ///
    /// Returns the assigned `seq` (durable insertion order).
    pub async fn enqueue(&self, entry: &OutboxEntry) -> StoreResult<i64> {
        debug!(kind = %entry.kind, id = %entry.id, "Enqueuing outbox entry");

        let data = serde_json::to_string(&entry.data)?;

        let result = sqlx::query(
            r#"
            INSERT INTO sync_outbox (
                id, kind, data, status, attempts, last_error, next_attempt_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&entry.id)
        .bind(entry.kind.to_string())
        .bind(data)
        .bind(entry.status.as_str())
        .bind(entry.attempts)
        .bind(&entry.last_error)
        .bind(entry.next_attempt_at)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Returns entries due for a push attempt, in insertion order:
    /// `pending` entries plus `error` entries whose backoff has elapsed.
    ///
    /// Rows that fail to decode are logged and removed so one corrupt
    /// payload cannot block the queue forever.
    pub async fn due_pending(&self, now: i64, limit: u32) -> StoreResult<Vec<OutboxEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM sync_outbox
            WHERE status IN ('pending', 'error') AND next_attempt_at <= ?1
            ORDER BY seq ASC
            LIMIT ?2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            match row_to_entry(row) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    let seq: i64 = row.try_get("seq").unwrap_or(-1);
                    warn!(seq, error = %e, "Dropping undecodable outbox row");
                    let _ = sqlx::query("DELETE FROM sync_outbox WHERE seq = ?1")
                        .bind(seq)
                        .execute(&self.pool)
                        .await;
                }
            }
        }

        Ok(entries)
    }

    /// Returns all `pending` entries in insertion order.
    pub async fn list_pending(&self) -> StoreResult<Vec<OutboxEntry>> {
        let rows =
            sqlx::query("SELECT * FROM sync_outbox WHERE status = 'pending' ORDER BY seq ASC")
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(row_to_entry).collect()
    }

    /// Marks an entry as successfully transmitted.
    pub async fn mark_synced(&self, id: &str) -> StoreResult<()> {
        sqlx::query("UPDATE sync_outbox SET status = 'synced', last_error = NULL WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Records a failed attempt and schedules the next one.
    pub async fn mark_error(&self, id: &str, error: &str, next_attempt_at: i64) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE sync_outbox SET
                status = 'error',
                attempts = attempts + 1,
                last_error = ?2,
                next_attempt_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(next_attempt_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Moves an entry to the dead-letter state after its attempt budget is
    /// spent. Dead entries are kept for inspection but never retried.
    pub async fn mark_dead(&self, id: &str, error: &str) -> StoreResult<()> {
        warn!(id = %id, error = %error, "Outbox entry moved to dead letter");

        sqlx::query(
            "UPDATE sync_outbox SET status = 'dead', attempts = attempts + 1, last_error = ?2 WHERE id = ?1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Counts entries still awaiting transmission (pending or retrying).
    pub async fn count_unsent(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sync_outbox WHERE status IN ('pending', 'error')",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Counts dead-letter entries.
    pub async fn count_dead(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_outbox WHERE status = 'dead'")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Purges synced entries created before the cutoff. Error and dead
    /// entries are retained.
    pub async fn cleanup_synced(&self, created_before: i64) -> StoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM sync_outbox WHERE status = 'synced' AND created_at < ?1",
        )
        .bind(created_before)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::LocalStore;
    use hkd_core::{EntityKind, OutboxKind};
    use serde_json::json;

    fn entry(kind: OutboxKind, id_marker: &str) -> OutboxEntry {
        OutboxEntry::new(kind, json!({ "id": id_marker }))
    }

    #[tokio::test]
    async fn test_insertion_order_preserved() {
        let store = LocalStore::in_memory().await.unwrap();
        let repo = store.outbox();

        for marker in ["a", "b", "c"] {
            repo.enqueue(&entry(OutboxKind::upsert(EntityKind::Product), marker))
                .await
                .unwrap();
        }

        let due = repo.due_pending(i64::MAX, 100).await.unwrap();
        let markers: Vec<_> = due.iter().map(|e| e.data["id"].as_str().unwrap()).collect();
        assert_eq!(markers, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let store = LocalStore::in_memory().await.unwrap();
        let repo = store.outbox();

        let e = entry(OutboxKind::delete(EntityKind::Category), "x");
        repo.enqueue(&e).await.unwrap();

        repo.mark_error(&e.id, "network down", 500).await.unwrap();

        // Not yet due: backoff holds it back
        assert!(repo.due_pending(100, 10).await.unwrap().is_empty());

        // Due again after backoff elapses, with the attempt recorded
        let due = repo.due_pending(500, 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].attempts, 1);
        assert_eq!(due[0].status, OutboxStatus::Error);

        repo.mark_synced(&e.id).await.unwrap();
        assert!(repo.due_pending(i64::MAX, 10).await.unwrap().is_empty());
        assert_eq!(repo.count_unsent().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dead_letter_excluded_from_drain() {
        let store = LocalStore::in_memory().await.unwrap();
        let repo = store.outbox();

        let e = entry(OutboxKind::upsert(EntityKind::Owner), "x");
        repo.enqueue(&e).await.unwrap();
        repo.mark_dead(&e.id, "gave up").await.unwrap();

        assert!(repo.due_pending(i64::MAX, 10).await.unwrap().is_empty());
        assert_eq!(repo.count_dead().await.unwrap(), 1);
        assert_eq!(repo.count_unsent().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_only_touches_synced() {
        let store = LocalStore::in_memory().await.unwrap();
        let repo = store.outbox();

        let done = entry(OutboxKind::upsert(EntityKind::Sale), "done");
        let stuck = entry(OutboxKind::upsert(EntityKind::Sale), "stuck");
        repo.enqueue(&done).await.unwrap();
        repo.enqueue(&stuck).await.unwrap();
        repo.mark_synced(&done.id).await.unwrap();
        repo.mark_error(&stuck.id, "boom", 0).await.unwrap();

        let purged = repo.cleanup_synced(i64::MAX).await.unwrap();
        assert_eq!(purged, 1);
        assert_eq!(repo.count_unsent().await.unwrap(), 1);
    }
}
