//! # Remote Store Adapter
//!
//! The seam between the sync engine and the cloud realtime database:
//! path-keyed read/write/delete/subscribe primitives.
//!
//! ## Implementations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    RemoteStore (trait)                                  │
//! │                                                                         │
//! │  ┌──────────────────────────┐   ┌──────────────────────────────────┐   │
//! │  │    MemoryRemoteStore     │   │       RestRemoteStore            │   │
//! │  │    (this module)         │   │       (rest.rs)                  │   │
//! │  │                          │   │                                  │   │
//! │  │  In-process JSON tree    │   │  Hosted realtime DB over REST    │   │
//! │  │  Broadcast change feed   │   │  No change feed: the periodic    │   │
//! │  │  Online/offline switch   │   │  sync engine is the only path    │   │
//! │  │  (tests, embedded hubs)  │   │                                  │   │
//! │  └──────────────────────────┘   └──────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A logical delete on the remote side is a **soft delete** performed by the
//! engine (`merge` of a tombstone payload); `remove` hard-deletes a node and
//! is reserved for the dedicated owner purge and tombstone garbage
//! collection.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, RwLock};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Change Feed Events
// =============================================================================

/// Kind of a child-level change on the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteEventKind {
    ChildAdded,
    ChildChanged,
    ChildRemoved,
}

/// A child-level change event: `{parent}/{key}` was added/changed/removed.
#[derive(Debug, Clone)]
pub struct RemoteEvent {
    /// Path of the parent node (no trailing slash).
    pub parent: String,

    /// Child key under the parent.
    pub key: String,

    pub kind: RemoteEventKind,

    /// New value; `None` for removals.
    pub value: Option<Value>,
}

// =============================================================================
// Remote Store Trait
// =============================================================================

/// Path-keyed remote store primitives.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Reads the node at `path`. `None` when absent.
    async fn get(&self, path: &str) -> SyncResult<Option<Value>>;

    /// Replaces the node at `path`.
    async fn put(&self, path: &str, value: Value) -> SyncResult<()>;

    /// Shallow-merges `value` into the node at `path` (object keys are
    /// overwritten individually; a non-object target is replaced).
    async fn merge(&self, path: &str, value: Value) -> SyncResult<()>;

    /// Hard-removes the node at `path`. Normal deletion flows never use
    /// this; they soft-delete via `merge`.
    async fn remove(&self, path: &str) -> SyncResult<()>;

    /// Lists the children of the node at `path`. Empty when absent.
    async fn list(&self, path: &str) -> SyncResult<BTreeMap<String, Value>>;

    /// Subscribes to the child-level change feed, when the transport has
    /// one. Callers must treat [`SyncError::SubscribeUnsupported`] as a
    /// silent degradation to polling.
    fn subscribe(&self) -> SyncResult<broadcast::Receiver<RemoteEvent>>;
}

// =============================================================================
// In-Memory Remote Store
// =============================================================================

/// An in-process remote store: a JSON tree plus a broadcast change feed.
///
/// Serves as the realtime-capable reference implementation and the test
/// double. The `set_online(false)` switch simulates network loss: every
/// operation fails with [`SyncError::Offline`] until flipped back.
pub struct MemoryRemoteStore {
    tree: RwLock<Value>,
    events: broadcast::Sender<RemoteEvent>,
    online: AtomicBool,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        MemoryRemoteStore {
            tree: RwLock::new(Value::Object(Map::new())),
            events,
            online: AtomicBool::new(true),
        }
    }

    /// Flips the simulated connectivity state.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> SyncResult<()> {
        if self.is_online() {
            Ok(())
        } else {
            Err(SyncError::Offline)
        }
    }

    fn emit(&self, parent: &str, key: &str, kind: RemoteEventKind, value: Option<Value>) {
        // No receivers is fine; the feed is best-effort
        let _ = self.events.send(RemoteEvent {
            parent: parent.to_string(),
            key: key.to_string(),
            kind,
            value,
        });
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn split_parent(path: &str) -> (String, String) {
    let segs = segments(path);
    let key = segs.last().copied().unwrap_or_default().to_string();
    let parent = segs[..segs.len().saturating_sub(1)].join("/");
    (parent, key)
}

fn node_ref<'a>(root: &'a Value, segs: &[&str]) -> Option<&'a Value> {
    let mut cur = root;
    for seg in segs {
        cur = cur.as_object()?.get(*seg)?;
    }
    Some(cur)
}

/// Walks to the node at `segs`, materializing intermediate objects.
fn node_mut<'a>(root: &'a mut Value, segs: &[&str]) -> &'a mut Value {
    let mut cur = root;
    for seg in segs {
        if !cur.is_object() {
            *cur = Value::Object(Map::new());
        }
        cur = cur
            .as_object_mut()
            .expect("just materialized an object")
            .entry(seg.to_string())
            .or_insert(Value::Null);
    }
    cur
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn get(&self, path: &str) -> SyncResult<Option<Value>> {
        self.check_online()?;

        let tree = self.tree.read().await;
        Ok(node_ref(&tree, &segments(path)).cloned())
    }

    async fn put(&self, path: &str, value: Value) -> SyncResult<()> {
        self.check_online()?;

        let (parent, key) = split_parent(path);
        let existed = {
            let mut tree = self.tree.write().await;
            let node = node_mut(&mut tree, &segments(path));
            let existed = !node.is_null();
            *node = value.clone();
            existed
        };

        let kind = if existed {
            RemoteEventKind::ChildChanged
        } else {
            RemoteEventKind::ChildAdded
        };
        self.emit(&parent, &key, kind, Some(value));

        Ok(())
    }

    async fn merge(&self, path: &str, value: Value) -> SyncResult<()> {
        self.check_online()?;

        let (parent, key) = split_parent(path);
        let (existed, merged) = {
            let mut tree = self.tree.write().await;
            let node = node_mut(&mut tree, &segments(path));
            let existed = !node.is_null();

            match value {
                Value::Object(patch) if node.is_object() => {
                    let target = node.as_object_mut().expect("checked is_object");
                    for (k, v) in patch {
                        target.insert(k, v);
                    }
                }
                other => *node = other,
            }

            (existed, node.clone())
        };

        let kind = if existed {
            RemoteEventKind::ChildChanged
        } else {
            RemoteEventKind::ChildAdded
        };
        self.emit(&parent, &key, kind, Some(merged));

        Ok(())
    }

    async fn remove(&self, path: &str) -> SyncResult<()> {
        self.check_online()?;

        let (parent, key) = split_parent(path);
        let removed = {
            let mut tree = self.tree.write().await;
            let parent_segs = segments(&parent);
            match node_mut(&mut tree, &parent_segs).as_object_mut() {
                Some(obj) => obj.remove(&key).is_some(),
                None => false,
            }
        };

        if removed {
            self.emit(&parent, &key, RemoteEventKind::ChildRemoved, None);
        }

        Ok(())
    }

    async fn list(&self, path: &str) -> SyncResult<BTreeMap<String, Value>> {
        self.check_online()?;

        let tree = self.tree.read().await;
        let children = match node_ref(&tree, &segments(path)) {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            _ => BTreeMap::new(),
        };

        Ok(children)
    }

    fn subscribe(&self) -> SyncResult<broadcast::Receiver<RemoteEvent>> {
        Ok(self.events.subscribe())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_get_list() {
        let remote = MemoryRemoteStore::new();

        remote
            .put("hkd/o1/info", json!({"name": "Mai"}))
            .await
            .unwrap();
        remote
            .put("hkd/o1/sales/s1", json!({"total": 100}))
            .await
            .unwrap();

        assert_eq!(
            remote.get("hkd/o1/info").await.unwrap().unwrap()["name"],
            json!("Mai")
        );
        assert!(remote.get("hkd/o2/info").await.unwrap().is_none());

        let sales = remote.list("hkd/o1/sales").await.unwrap();
        assert_eq!(sales.len(), 1);
        assert!(sales.contains_key("s1"));
    }

    #[tokio::test]
    async fn test_merge_is_shallow() {
        let remote = MemoryRemoteStore::new();

        remote
            .put("hkd/o1/info", json!({"name": "Mai", "phone": "0912345678"}))
            .await
            .unwrap();
        remote
            .merge("hkd/o1/info", json!({"_deleted": true}))
            .await
            .unwrap();

        let node = remote.get("hkd/o1/info").await.unwrap().unwrap();
        assert_eq!(node["name"], json!("Mai")); // untouched
        assert_eq!(node["_deleted"], json!(true));
    }

    #[tokio::test]
    async fn test_offline_switch() {
        let remote = MemoryRemoteStore::new();
        remote.set_online(false);

        assert!(matches!(
            remote.get("hkd/o1/info").await,
            Err(SyncError::Offline)
        ));
        assert!(matches!(
            remote.put("hkd/o1/info", json!({})).await,
            Err(SyncError::Offline)
        ));

        remote.set_online(true);
        assert!(remote.get("hkd/o1/info").await.is_ok());
    }

    #[tokio::test]
    async fn test_change_feed_events() {
        let remote = MemoryRemoteStore::new();
        let mut rx = remote.subscribe().unwrap();

        remote
            .put("hkd/o1/sales/s1", json!({"total": 100}))
            .await
            .unwrap();
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.parent, "hkd/o1/sales");
        assert_eq!(ev.key, "s1");
        assert_eq!(ev.kind, RemoteEventKind::ChildAdded);

        remote
            .put("hkd/o1/sales/s1", json!({"total": 200}))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().kind, RemoteEventKind::ChildChanged);

        remote.remove("hkd/o1/sales/s1").await.unwrap();
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, RemoteEventKind::ChildRemoved);
        assert!(ev.value.is_none());
    }
}
