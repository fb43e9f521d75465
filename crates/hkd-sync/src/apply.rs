//! # Remote Change Application
//!
//! Applies a remote record to the local durable store under the conflict
//! policy. Shared by the sync engine's pull phase and the realtime
//! listener, so both sides resolve conflicts identically.
//!
//! Records written here are tagged remote-origin (`synced = true`) and are
//! therefore never re-enqueued to the outbox - the loop-prevention
//! invariant.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use hkd_core::{Category, ConflictPolicy, EntityKind, MergeDecision, Owner, Product, RecordMeta, Sale};
use hkd_store::LocalStore;

use crate::error::{SyncError, SyncResult};
use crate::payload;

// =============================================================================
// Application Outcome
// =============================================================================

/// What applying a remote record did to the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// A record that did not exist locally was inserted. This is the
    /// listener's notification trigger: exactly once per distinct new id.
    Inserted,

    /// An existing local record was overwritten by a newer remote value.
    Updated,

    /// The local record (and its contained records) were hard-deleted
    /// because the remote carries a tombstone.
    Deleted,

    /// The local record won; the remote value was dropped.
    Skipped,
}

impl Applied {
    /// True when the local store changed.
    pub fn changed(&self) -> bool {
        !matches!(self, Applied::Skipped)
    }
}

// =============================================================================
// Remote Applier
// =============================================================================

/// Applies remote values to the local store with last-write-wins merging.
#[derive(Clone)]
pub struct RemoteApplier {
    store: LocalStore,
    policy: Arc<dyn ConflictPolicy>,
}

impl RemoteApplier {
    pub fn new(store: LocalStore, policy: Arc<dyn ConflictPolicy>) -> Self {
        RemoteApplier { store, policy }
    }

    fn decide(&self, kind: EntityKind, id: &str, local: Option<RecordMeta>, remote: RecordMeta) -> MergeDecision {
        let decision = self.policy.decide(local, remote);
        if decision == MergeDecision::KeepLocal && local.is_some() {
            // The losing side of a concurrent edit; debug log is the only surfacing
            debug!(kind = %kind, id = %id, ?local, ?remote, "Remote value lost merge");
        }
        decision
    }

    /// Applies a remote owner `info` node.
    pub async fn apply_owner(&self, owner_id: &str, value: &Value) -> SyncResult<Applied> {
        let remote_meta = payload::record_meta(value);
        let local = self.store.owners().get_any(owner_id).await?;
        let local_meta = local
            .as_ref()
            .map(|o| RecordMeta::new(o.last_updated, o.deleted));

        match self.decide(EntityKind::Owner, owner_id, local_meta, remote_meta) {
            MergeDecision::DeleteLocal => {
                self.delete_owner_cascade(owner_id).await?;
                Ok(Applied::Deleted)
            }
            MergeDecision::KeepLocal => Ok(Applied::Skipped),
            MergeDecision::ApplyRemote => {
                let mut owner: Owner = decode(value, &[("id", owner_id)])?;
                owner.synced = true;
                self.store.owners().upsert(&owner).await?;
                Ok(if local.is_some() {
                    Applied::Updated
                } else {
                    Applied::Inserted
                })
            }
        }
    }

    /// Applies a remote category node (scalar fields only - the caller
    /// strips nested product children first).
    pub async fn apply_category(
        &self,
        owner_id: &str,
        category_id: &str,
        value: &Value,
    ) -> SyncResult<Applied> {
        let remote_meta = payload::record_meta(value);
        let local = self.store.categories().get_any(category_id).await?;
        let local_meta = local
            .as_ref()
            .map(|c| RecordMeta::new(c.last_updated, c.deleted));

        match self.decide(EntityKind::Category, category_id, local_meta, remote_meta) {
            MergeDecision::DeleteLocal => {
                self.delete_category_cascade(category_id).await?;
                Ok(Applied::Deleted)
            }
            MergeDecision::KeepLocal => Ok(Applied::Skipped),
            MergeDecision::ApplyRemote => {
                let mut category: Category =
                    decode(value, &[("id", category_id), ("ownerId", owner_id)])?;
                category.synced = true;
                self.store.categories().upsert(&category).await?;
                Ok(if local.is_some() {
                    Applied::Updated
                } else {
                    Applied::Inserted
                })
            }
        }
    }

    /// Applies a remote product node. `category_id` is path-derived in the
    /// nested layout; in the flat layout the node carries its own.
    pub async fn apply_product(
        &self,
        owner_id: &str,
        category_id: Option<&str>,
        product_id: &str,
        value: &Value,
    ) -> SyncResult<Applied> {
        let remote_meta = payload::record_meta(value);
        let local = self.store.products().get_any(product_id).await?;
        let local_meta = local
            .as_ref()
            .map(|p| RecordMeta::new(p.last_updated, p.deleted));

        match self.decide(EntityKind::Product, product_id, local_meta, remote_meta) {
            MergeDecision::DeleteLocal => {
                self.store.products().delete(product_id).await?;
                Ok(Applied::Deleted)
            }
            MergeDecision::KeepLocal => Ok(Applied::Skipped),
            MergeDecision::ApplyRemote => {
                let mut inject = vec![("id", product_id), ("ownerId", owner_id)];
                if let Some(category_id) = category_id {
                    inject.push(("categoryId", category_id));
                }

                let mut product: Product = decode(value, &inject)?;
                product.synced = true;
                self.store.products().upsert(&product).await?;
                Ok(if local.is_some() {
                    Applied::Updated
                } else {
                    Applied::Inserted
                })
            }
        }
    }

    /// Applies a remote sale node. Sales are immutable, so in practice this
    /// only ever inserts.
    pub async fn apply_sale(&self, owner_id: &str, sale_id: &str, value: &Value) -> SyncResult<Applied> {
        let remote_meta = payload::record_meta(value);
        let local = self.store.sales().get(sale_id).await?;
        let local_meta = local
            .as_ref()
            .map(|s| RecordMeta::live(s.last_updated));

        match self.decide(EntityKind::Sale, sale_id, local_meta, remote_meta) {
            MergeDecision::DeleteLocal => {
                // Sales have no delete flow; honor a tombstone anyway
                self.store.sales().delete(sale_id).await?;
                Ok(Applied::Deleted)
            }
            MergeDecision::KeepLocal => Ok(Applied::Skipped),
            MergeDecision::ApplyRemote => {
                let mut sale: Sale = decode(value, &[("id", sale_id), ("ownerId", owner_id)])?;
                sale.synced = true;
                self.store.sales().upsert(&sale).await?;
                Ok(if local.is_some() {
                    Applied::Updated
                } else {
                    Applied::Inserted
                })
            }
        }
    }

    /// Hard-deletes an owner and everything it contains.
    pub async fn delete_owner_cascade(&self, owner_id: &str) -> SyncResult<()> {
        debug!(owner_id = %owner_id, "Cascading owner delete");

        self.store.products().delete_by_owner(owner_id).await?;
        self.store.categories().delete_by_owner(owner_id).await?;
        self.store.sales().delete_by_owner(owner_id).await?;
        self.store.owners().delete(owner_id).await?;

        Ok(())
    }

    /// Hard-deletes a category and every product it contains.
    pub async fn delete_category_cascade(&self, category_id: &str) -> SyncResult<()> {
        debug!(category_id = %category_id, "Cascading category delete");

        self.store.products().delete_by_category(category_id).await?;
        self.store.categories().delete(category_id).await?;

        Ok(())
    }
}

/// Decodes a remote node into an entity, injecting path-derived identity
/// fields the node does not carry itself.
fn decode<T: serde::de::DeserializeOwned>(value: &Value, inject: &[(&str, &str)]) -> SyncResult<T> {
    let mut obj = value.clone();

    let map = obj
        .as_object_mut()
        .ok_or_else(|| SyncError::Serialization("remote record is not an object".into()))?;

    for (field, val) in inject {
        map.insert((*field).to_string(), Value::String((*val).to_string()));
    }

    Ok(serde_json::from_value(obj)?)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use hkd_core::LastWriteWins;
    use serde_json::json;

    async fn applier() -> RemoteApplier {
        let store = LocalStore::in_memory().await.unwrap();
        RemoteApplier::new(store, Arc::new(LastWriteWins))
    }

    #[test]
    fn test_decode_injects_identity() {
        let value = json!({"name": "Đồ uống", "lastUpdated": 10});
        let category: Category = decode(&value, &[("id", "c1"), ("ownerId", "o1")]).unwrap();
        assert_eq!(category.id, "c1");
        assert_eq!(category.owner_id, "o1");
        assert_eq!(category.name, "Đồ uống");
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let applier = applier().await;
        let value = json!({"name": "Mai", "phone": "0912345678", "lastUpdated": 100});

        assert_eq!(
            applier.apply_owner("o1", &value).await.unwrap(),
            Applied::Inserted
        );
        // Same value again: LWW strict-greater comparison makes it a no-op
        assert_eq!(
            applier.apply_owner("o1", &value).await.unwrap(),
            Applied::Skipped
        );

        let stored = applier.store.owners().get("o1").await.unwrap().unwrap();
        assert!(stored.synced);
        assert_eq!(stored.last_updated, 100);
    }

    #[tokio::test]
    async fn test_remote_tombstone_cascades() {
        let applier = applier().await;

        applier
            .apply_owner("o1", &json!({"name": "Mai", "phone": "09", "lastUpdated": 1}))
            .await
            .unwrap();
        applier
            .apply_category("o1", "c1", &json!({"name": "Đồ uống", "lastUpdated": 1}))
            .await
            .unwrap();
        for pid in ["p1", "p2", "p3"] {
            applier
                .apply_product("o1", Some("c1"), pid, &json!({"name": pid, "lastUpdated": 1}))
                .await
                .unwrap();
        }

        let applied = applier
            .apply_category("o1", "c1", &json!({"_deleted": true, "lastUpdated": 2}))
            .await
            .unwrap();
        assert_eq!(applied, Applied::Deleted);

        assert!(applier.store.categories().get_any("c1").await.unwrap().is_none());
        for pid in ["p1", "p2", "p3"] {
            assert!(applier.store.products().get_any(pid).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_local_tombstone_survives_stale_pull() {
        let applier = applier().await;

        applier
            .apply_product("o1", Some("c1"), "p1", &json!({"name": "Trà", "lastUpdated": 100}))
            .await
            .unwrap();
        applier.store.products().tombstone("p1", 200).await.unwrap();

        // Remote still shows the pre-deletion value
        let applied = applier
            .apply_product("o1", Some("c1"), "p1", &json!({"name": "Trà", "lastUpdated": 100}))
            .await
            .unwrap();
        assert_eq!(applied, Applied::Skipped);

        let local = applier.store.products().get_any("p1").await.unwrap().unwrap();
        assert!(local.deleted);
    }
}
