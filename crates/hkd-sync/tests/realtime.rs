//! Realtime listener scenarios: immediate application of remote child
//! events, once-per-id notification de-duplication, and removal cascades.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use hkd_core::now_millis;
use hkd_store::LocalStore;
use hkd_sync::{
    ChangeNotifier, MemoryRemoteStore, RealtimeListener, RemoteStore, SyncConfig, SyncContext,
};

#[derive(Default)]
struct CountingNotifier {
    added: AtomicUsize,
    removed: AtomicUsize,
}

impl ChangeNotifier for CountingNotifier {
    fn entity_added(&self, _kind: hkd_core::EntityKind, _id: &str, _label: &str) {
        self.added.fetch_add(1, Ordering::SeqCst);
    }

    fn entity_removed(&self, _kind: hkd_core::EntityKind, _id: &str) {
        self.removed.fetch_add(1, Ordering::SeqCst);
    }
}

struct Rig {
    store: LocalStore,
    remote: Arc<MemoryRemoteStore>,
    notifier: Arc<CountingNotifier>,
    handle: hkd_sync::RealtimeListenerHandle,
}

async fn rig() -> Rig {
    let store = LocalStore::in_memory().await.unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    let config = SyncConfig::default();
    let ctx = Arc::new(SyncContext::from_config(&config));
    let notifier = Arc::new(CountingNotifier::default());

    let (listener, handle) = RealtimeListener::new(
        store.clone(),
        remote.clone(),
        ctx,
        &config,
        notifier.clone(),
    );
    tokio::spawn(listener.run());

    // Give the listener a beat to subscribe before events start flowing
    tokio::time::sleep(Duration::from_millis(50)).await;

    Rig {
        store,
        remote,
        notifier,
        handle,
    }
}

/// Polls until the listener has drained the event (bounded wait).
async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn incoming_sale_applies_and_notifies_once() {
    let rig = rig().await;
    let mut changes = rig.handle.subscribe_changes();
    let now = now_millis();

    let sale = json!({
        "total": 28_000,
        "subtotal": 30_000,
        "discount": 2_000,
        "timestamp": now,
        "lastUpdated": now,
        "items": [],
    });

    rig.remote
        .put("hkd/o1/sales/s1", sale.clone())
        .await
        .unwrap();
    settle().await;

    // Applied locally, tagged remote-origin
    let stored = rig.store.sales().get("s1").await.unwrap().unwrap();
    assert_eq!(stored.total, 28_000);
    assert_eq!(stored.owner_id, "o1");
    assert!(stored.synced);

    // Exactly one notification, and a view-refresh broadcast
    assert_eq!(rig.notifier.added.load(Ordering::SeqCst), 1);
    let change = changes.recv().await.unwrap();
    assert_eq!(change.id, "s1");
    assert!(!change.deleted);

    // A reconnect replay of the same record must not re-notify: the
    // local "already seen" check de-duplicates
    rig.remote.put("hkd/o1/sales/s1", sale).await.unwrap();
    settle().await;
    assert_eq!(rig.notifier.added.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn newer_remote_change_overwrites_older_local() {
    let rig = rig().await;
    let now = now_millis();

    rig.remote
        .put(
            "hkd/o1/categories/c1",
            json!({"name": "Đồ uống", "lastUpdated": now}),
        )
        .await
        .unwrap();
    settle().await;
    assert_eq!(
        rig.store.categories().get("c1").await.unwrap().unwrap().name,
        "Đồ uống"
    );

    // Older write arrives late (reconnect replay): dropped
    rig.remote
        .put(
            "hkd/o1/categories/c1",
            json!({"name": "Tên cũ", "lastUpdated": now - 10_000}),
        )
        .await
        .unwrap();
    settle().await;
    assert_eq!(
        rig.store.categories().get("c1").await.unwrap().unwrap().name,
        "Đồ uống"
    );

    // Newer write wins
    rig.remote
        .put(
            "hkd/o1/categories/c1",
            json!({"name": "Đồ uống lạnh", "lastUpdated": now + 10_000}),
        )
        .await
        .unwrap();
    settle().await;
    assert_eq!(
        rig.store.categories().get("c1").await.unwrap().unwrap().name,
        "Đồ uống lạnh"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn child_removed_deletes_and_cascades() {
    let rig = rig().await;
    let now = now_millis();

    rig.remote
        .put(
            "hkd/o1/categories/c1",
            json!({"name": "Đồ uống", "lastUpdated": now}),
        )
        .await
        .unwrap();
    rig.remote
        .put(
            "hkd/o1/categories/c1/p1",
            json!({"name": "Trà xanh", "lastUpdated": now}),
        )
        .await
        .unwrap();
    settle().await;
    assert!(rig.store.products().get("p1").await.unwrap().is_some());

    // child_removed on the category: local cascade removes its product too
    rig.remote.remove("hkd/o1/categories/c1").await.unwrap();
    settle().await;

    assert!(rig.store.categories().get_any("c1").await.unwrap().is_none());
    assert!(rig.store.products().get_any("p1").await.unwrap().is_none());
    assert!(rig.notifier.removed.load(Ordering::SeqCst) >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tombstone_event_deletes_local_record() {
    let rig = rig().await;
    let now = now_millis();

    rig.remote
        .put(
            "hkd/o1/categories/c1/p1",
            json!({"name": "Trà xanh", "lastUpdated": now}),
        )
        .await
        .unwrap();
    settle().await;
    assert!(rig.store.products().get("p1").await.unwrap().is_some());

    // Soft-delete arrives through the feed (another device's push)
    rig.remote
        .merge(
            "hkd/o1/categories/c1/p1",
            json!({"_deleted": true, "_deletedAt": now + 1, "lastUpdated": now + 1}),
        )
        .await
        .unwrap();
    settle().await;

    assert!(rig.store.products().get_any("p1").await.unwrap().is_none());
    assert_eq!(rig.notifier.removed.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn owner_purge_event_cascades_locally() {
    let rig = rig().await;
    let now = now_millis();

    rig.remote
        .put(
            "hkd/o1/info",
            json!({"name": "Mai", "phone": "0912345678", "lastUpdated": now}),
        )
        .await
        .unwrap();
    rig.remote
        .put(
            "hkd/o1/categories/c1",
            json!({"name": "Đồ uống", "lastUpdated": now}),
        )
        .await
        .unwrap();
    rig.remote
        .put(
            "hkd/o1/categories/c1/p1",
            json!({"name": "Trà xanh", "lastUpdated": now}),
        )
        .await
        .unwrap();
    settle().await;
    assert!(rig.store.owners().get("o1").await.unwrap().is_some());

    // An admin true delete removes the whole owner subtree remotely
    rig.remote.remove("hkd/o1").await.unwrap();
    settle().await;

    assert!(rig.store.owners().get_any("o1").await.unwrap().is_none());
    assert!(rig.store.categories().get_any("c1").await.unwrap().is_none());
    assert!(rig.store.products().get_any("p1").await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scoped_listener_ignores_other_owners() {
    let store = LocalStore::in_memory().await.unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    let mut config = SyncConfig::default();
    config.owner_id = Some("o1".to_string());
    let ctx = Arc::new(SyncContext::from_config(&config));
    let notifier = Arc::new(CountingNotifier::default());

    let (listener, _handle) = RealtimeListener::new(
        store.clone(),
        remote.clone(),
        ctx,
        &config,
        notifier.clone(),
    );
    tokio::spawn(listener.run());
    tokio::time::sleep(Duration::from_millis(50)).await;

    let now = now_millis();
    remote
        .put(
            "hkd/o2/categories/c9",
            json!({"name": "Của người khác", "lastUpdated": now}),
        )
        .await
        .unwrap();
    settle().await;

    // Out-of-scope events never touch this device's store
    assert!(store.categories().get_any("c9").await.unwrap().is_none());
    assert_eq!(notifier.added.load(Ordering::SeqCst), 0);
}
