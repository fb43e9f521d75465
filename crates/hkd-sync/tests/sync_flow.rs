//! End-to-end sync scenarios over an in-memory local store and an in-memory
//! remote store: offline capture and reconnect drain, two-device
//! last-write-wins convergence, soft-delete cascades, and watermark
//! behavior.

use std::sync::Arc;

use serde_json::json;

use hkd_core::{EntityKind, OutboxEntry, OutboxKind, Owner, PaymentMethod, Product};
use hkd_store::LocalStore;
use hkd_sync::{
    HkdService, MemoryRemoteStore, NewProduct, RecordSaleRequest, RemoteStore, SaleLineRequest,
    SyncConfig, SyncEngine,
};

/// One simulated device: its own local store, engine, and service, all
/// sharing the common remote store.
struct Device {
    store: LocalStore,
    engine: SyncEngine,
    service: HkdService,
}

fn test_config() -> SyncConfig {
    let mut config = SyncConfig::default();
    // Retry immediately in tests; backoff timing is covered by unit tests
    config.sync.backoff_base_ms = 0;
    config
}

async fn device(remote: &Arc<MemoryRemoteStore>) -> Device {
    let store = LocalStore::in_memory().await.unwrap();
    let engine = SyncEngine::new(store.clone(), remote.clone(), test_config());
    let service = HkdService::new(
        store.clone(),
        engine.context(),
        remote.clone(),
        engine.resolver(),
    );

    Device {
        store,
        engine,
        service,
    }
}

async fn seed_owner_with_product(device: &Device) -> (Owner, String, Product) {
    let owner = device
        .service
        .create_owner("Tạp hoá Mai", "0912345678", "Hà Nội", "mat-khau")
        .await
        .unwrap();

    let category = device
        .service
        .add_category(&owner.id, "Đồ uống")
        .await
        .unwrap();

    let product = device
        .service
        .add_product(NewProduct {
            owner_id: owner.id.clone(),
            category_id: Some(category.id.clone()),
            name: "Trà xanh 0 độ".to_string(),
            code: "TX001".to_string(),
            price: 10_000,
            cost: 7_500,
            stock: 20,
            unit: "chai".to_string(),
            barcode: String::new(),
        })
        .await
        .unwrap();

    (owner, category.id, product)
}

// =============================================================================
// Offline capture → reconnect drain
// =============================================================================

#[tokio::test]
async fn offline_owner_creation_drains_on_reconnect() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let admin = device(&remote).await;

    remote.set_online(false);

    let owner = admin
        .service
        .create_owner("Mai", "0912345678", "Hà Nội", "mat-khau")
        .await
        .unwrap();

    // Durable locally even though the remote is unreachable
    assert!(admin.store.owners().get(&owner.id).await.unwrap().is_some());
    // Owner + fallback category are both queued
    assert_eq!(admin.store.outbox().count_unsent().await.unwrap(), 2);

    // First pass fails entry-by-entry; nothing is lost or reordered
    let report = admin.engine.sync_once().await.unwrap();
    assert_eq!(report.pushed, 0);
    assert_eq!(report.failed, 2);
    assert_eq!(admin.store.outbox().count_unsent().await.unwrap(), 2);

    // Connectivity returns
    remote.set_online(true);
    let report = admin.engine.sync_once().await.unwrap();
    assert_eq!(report.pushed, 2);
    assert_eq!(report.failed, 0);

    // Remote owner record matches the local one, with no tombstone marker
    let info = remote
        .get(&format!("hkd/{}/info", owner.id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(info["name"], json!("Mai"));
    assert_eq!(info["phone"], json!("0912345678"));
    assert!(info.get("_deleted").is_none());

    // Login lookup node rides along
    let auth = remote.get("auth/0912345678").await.unwrap().unwrap();
    assert_eq!(auth["ownerId"], json!(owner.id));
}

#[tokio::test]
async fn outbox_preserves_insertion_order_across_offline_window() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let dev = device(&remote).await;
    let (owner, category_id, _) = seed_owner_with_product(&dev).await;
    dev.engine.sync_once().await.unwrap();

    remote.set_online(false);

    let mut expected = Vec::new();
    for name in ["Sting dâu", "Cà phê lon", "Nước suối"] {
        let product = dev
            .service
            .add_product(NewProduct {
                owner_id: owner.id.clone(),
                category_id: Some(category_id.clone()),
                name: name.to_string(),
                code: String::new(),
                price: 10_000,
                cost: 8_000,
                stock: 10,
                unit: "chai".to_string(),
                barcode: String::new(),
            })
            .await
            .unwrap();
        expected.push(product.id);
    }

    // Entries wait in original insertion order
    let due = dev
        .store
        .outbox()
        .due_pending(i64::MAX, 100)
        .await
        .unwrap();
    let queued: Vec<_> = due
        .iter()
        .map(|e| e.data["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(queued, expected);

    remote.set_online(true);
    let report = dev.engine.sync_once().await.unwrap();
    assert_eq!(report.pushed, 3);

    for id in &expected {
        let path = format!("hkd/{}/categories/{}/{}", owner.id, category_id, id);
        assert!(remote.get(&path).await.unwrap().is_some());
    }
}

// =============================================================================
// Two-device last-write-wins convergence
// =============================================================================

#[tokio::test]
async fn concurrent_price_edits_converge_to_newest_write() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let a = device(&remote).await;
    let b = device(&remote).await;

    let (_, _, product) = seed_owner_with_product(&a).await;
    a.engine.sync_once().await.unwrap();
    b.engine.sync_once().await.unwrap();
    assert!(b.store.products().get(&product.id).await.unwrap().is_some());

    // Both devices edit the price "offline" with controlled stamps:
    // A's write is older than B's
    let mut on_a = a.store.products().get(&product.id).await.unwrap().unwrap();
    on_a.price = 11_000;
    on_a.last_updated += 1_000;
    on_a.synced = false;
    a.store.products().upsert(&on_a).await.unwrap();
    a.store
        .outbox()
        .enqueue(&OutboxEntry::new(
            OutboxKind::upsert(EntityKind::Product),
            serde_json::to_value(&on_a).unwrap(),
        ))
        .await
        .unwrap();

    let mut on_b = b.store.products().get(&product.id).await.unwrap().unwrap();
    on_b.price = 22_000;
    on_b.last_updated = on_a.last_updated + 1_000;
    on_b.synced = false;
    b.store.products().upsert(&on_b).await.unwrap();
    b.store
        .outbox()
        .enqueue(&OutboxEntry::new(
            OutboxKind::upsert(EntityKind::Product),
            serde_json::to_value(&on_b).unwrap(),
        ))
        .await
        .unwrap();

    // Both reconnect and sync, in either order, twice so every device
    // observes the final remote state
    a.engine.sync_once().await.unwrap();
    b.engine.sync_once().await.unwrap();
    a.engine.sync_once().await.unwrap();

    let final_a = a.store.products().get(&product.id).await.unwrap().unwrap();
    let final_b = b.store.products().get(&product.id).await.unwrap().unwrap();
    assert_eq!(final_a.price, 22_000);
    assert_eq!(final_b.price, 22_000);
    assert_eq!(final_a.last_updated, on_b.last_updated);
}

// =============================================================================
// Soft-delete propagation
// =============================================================================

#[tokio::test]
async fn category_delete_cascades_to_other_device() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let admin = device(&remote).await;
    let shop = device(&remote).await;

    let (owner, category_id, _) = seed_owner_with_product(&admin).await;

    // Two more products in the doomed category, one in a surviving one
    for name in ["Sting dâu", "Cà phê lon"] {
        admin
            .service
            .add_product(NewProduct {
                owner_id: owner.id.clone(),
                category_id: Some(category_id.clone()),
                name: name.to_string(),
                code: String::new(),
                price: 10_000,
                cost: 8_000,
                stock: 5,
                unit: "chai".to_string(),
                barcode: String::new(),
            })
            .await
            .unwrap();
    }
    let surviving_category = admin
        .service
        .add_category(&owner.id, "Bánh kẹo")
        .await
        .unwrap();
    let survivor = admin
        .service
        .add_product(NewProduct {
            owner_id: owner.id.clone(),
            category_id: Some(surviving_category.id.clone()),
            name: "Chocopie".to_string(),
            code: String::new(),
            price: 48_000,
            cost: 40_000,
            stock: 5,
            unit: "hộp".to_string(),
            barcode: String::new(),
        })
        .await
        .unwrap();

    admin.engine.sync_once().await.unwrap();
    shop.engine.sync_once().await.unwrap();
    assert_eq!(
        shop.store
            .products()
            .get_all_for_category(&category_id)
            .await
            .unwrap()
            .len(),
        3
    );

    // Admin deletes the category; the tombstones propagate on its next push
    admin.service.delete_category(&category_id).await.unwrap();
    admin.engine.sync_once().await.unwrap();

    // The remote node is a tombstone, not a removal, so watermark-based
    // pulls still observe the deletion event
    let node = remote
        .get(&format!("hkd/{}/categories/{}", owner.id, category_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(node["_deleted"], json!(true));

    // The shop device pulls the tombstone: category and its 3 products are
    // gone; the survivor is untouched
    shop.engine.sync_once().await.unwrap();
    assert!(shop
        .store
        .categories()
        .get_any(&category_id)
        .await
        .unwrap()
        .is_none());
    assert!(shop
        .store
        .products()
        .get_all_for_category(&category_id)
        .await
        .unwrap()
        .is_empty());
    assert!(shop
        .store
        .products()
        .get(&survivor.id)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn local_tombstone_wins_over_stale_pull_then_propagates() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let admin = device(&remote).await;
    let shop = device(&remote).await;

    let (_, _, product) = seed_owner_with_product(&admin).await;
    admin.engine.sync_once().await.unwrap();
    shop.engine.sync_once().await.unwrap();

    // Admin deletes the product; the remote still shows the old live value
    admin.service.delete_product(&product.id).await.unwrap();

    // The pull phase of this pass sees the stale remote value but must not
    // resurrect the local tombstone; the push phase then transmits it
    let report = admin.engine.sync_once().await.unwrap();
    assert!(report.pushed >= 1);

    let local = admin.store.products().get_any(&product.id).await.unwrap();
    assert!(local.is_none() || local.unwrap().deleted);

    // The other device observes the round-tripped tombstone and cascades
    shop.engine.sync_once().await.unwrap();
    assert!(shop
        .store
        .products()
        .get_any(&product.id)
        .await
        .unwrap()
        .is_none());
}

// =============================================================================
// Idempotence & watermarks
// =============================================================================

#[tokio::test]
async fn double_pull_is_idempotent() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let admin = device(&remote).await;
    let shop = device(&remote).await;

    let (_, _, product) = seed_owner_with_product(&admin).await;
    admin.engine.sync_once().await.unwrap();

    let first = shop.engine.sync_once().await.unwrap();
    assert!(first.pulled > 0);
    let snapshot = shop.store.products().get(&product.id).await.unwrap().unwrap();

    // Replaying the identical remote state changes nothing
    let second = shop.engine.sync_once().await.unwrap();
    assert_eq!(second.pulled, 0);

    let replayed = shop.store.products().get(&product.id).await.unwrap().unwrap();
    assert_eq!(replayed.price, snapshot.price);
    assert_eq!(replayed.last_updated, snapshot.last_updated);
}

#[tokio::test]
async fn pull_skips_items_below_watermark() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let dev = device(&remote).await;

    let (owner, _, _) = seed_owner_with_product(&dev).await;
    dev.engine.sync_once().await.unwrap();
    assert!(dev.store.watermarks().get(EntityKind::Sale).await.unwrap() > 0);

    // A sale stamped far in the past lands on the remote (e.g. replayed by
    // a device with a stale clock); it is below the watermark and skipped
    remote
        .put(
            &format!("hkd/{}/sales/ancient", owner.id),
            json!({
                "total": 1_000,
                "timestamp": 1_000,
                "lastUpdated": 1_000,
            }),
        )
        .await
        .unwrap();

    let report = dev.engine.sync_once().await.unwrap();
    assert_eq!(report.pulled, 0);
    assert!(dev.store.sales().get("ancient").await.unwrap().is_none());
}

// =============================================================================
// Sales
// =============================================================================

#[tokio::test]
async fn sale_rejected_on_insufficient_stock_without_mutation() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let dev = device(&remote).await;
    let (owner, _, product) = seed_owner_with_product(&dev).await;

    let result = dev
        .service
        .record_sale(RecordSaleRequest {
            owner_id: owner.id.clone(),
            lines: vec![SaleLineRequest {
                product_id: product.id.clone(),
                quantity: product.stock + 1,
            }],
            customer_name: String::new(),
            customer_phone: String::new(),
            payment_method: PaymentMethod::Cash,
            discount: 0,
            tax: 0,
        })
        .await;

    assert!(result.is_err());

    // No stock mutation, no sale, no outbox entry
    let untouched = dev.store.products().get(&product.id).await.unwrap().unwrap();
    assert_eq!(untouched.stock, product.stock);
    assert!(dev.store.sales().get_all_for_owner(&owner.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn sale_decrements_stock_and_mirrors_to_sales_root() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let dev = device(&remote).await;
    let (owner, _, product) = seed_owner_with_product(&dev).await;
    dev.engine.sync_once().await.unwrap();

    let receipt = dev
        .service
        .record_sale(RecordSaleRequest {
            owner_id: owner.id.clone(),
            lines: vec![SaleLineRequest {
                product_id: product.id.clone(),
                quantity: 3,
            }],
            customer_name: "Chị Hoa".to_string(),
            customer_phone: "0987654321".to_string(),
            payment_method: PaymentMethod::Cash,
            discount: 2_000,
            tax: 0,
        })
        .await
        .unwrap();

    assert!(!receipt.saved_offline);
    assert_eq!(receipt.sale.subtotal, 30_000);
    assert_eq!(receipt.sale.total, 28_000);
    assert_eq!(
        dev.store.products().get(&product.id).await.unwrap().unwrap().stock,
        product.stock - 3
    );

    dev.engine.sync_once().await.unwrap();

    // Per-owner node and the cross-owner reporting mirror
    let owned = remote
        .get(&format!("hkd/{}/sales/{}", owner.id, receipt.sale.id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(owned["total"], json!(28_000));
    assert!(owned.get("ownerId").is_none());

    let mirrored = remote
        .get(&format!("sales/{}", receipt.sale.id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mirrored["ownerId"], json!(owner.id));
    assert_eq!(mirrored["ownerName"], json!("Tạp hoá Mai"));

    // The empty-string convention holds on the wire
    assert_eq!(owned["items"][0]["originalName"], json!("Trà xanh 0 độ"));
    assert_eq!(owned["customerName"], json!("Chị Hoa"));
}

#[tokio::test]
async fn offline_sale_reports_saved_offline_and_syncs_later() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let dev = device(&remote).await;
    let (owner, _, product) = seed_owner_with_product(&dev).await;
    dev.engine.sync_once().await.unwrap();

    remote.set_online(false);
    dev.engine.context().set_online(false);

    let receipt = dev
        .service
        .record_sale(RecordSaleRequest {
            owner_id: owner.id.clone(),
            lines: vec![SaleLineRequest {
                product_id: product.id.clone(),
                quantity: 1,
            }],
            customer_name: String::new(),
            customer_phone: String::new(),
            payment_method: PaymentMethod::Transfer,
            discount: 0,
            tax: 0,
        })
        .await
        .unwrap();

    // Local success with the offline indicator
    assert!(receipt.saved_offline);
    assert!(dev.store.sales().get(&receipt.sale.id).await.unwrap().is_some());

    remote.set_online(true);
    dev.engine.context().set_online(true);
    dev.engine.sync_once().await.unwrap();

    assert!(remote
        .get(&format!("hkd/{}/sales/{}", owner.id, receipt.sale.id))
        .await
        .unwrap()
        .is_some());
}

// =============================================================================
// Login & reporting
// =============================================================================

#[tokio::test]
async fn login_verifies_hash_and_respects_status() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let dev = device(&remote).await;

    let owner = dev
        .service
        .create_owner("Mai", "0912345678", "", "mat-khau-123")
        .await
        .unwrap();

    assert!(dev
        .service
        .verify_owner_login("0912345678", "mat-khau-123")
        .await
        .unwrap()
        .is_some());
    assert!(dev
        .service
        .verify_owner_login("0912345678", "sai-mat-khau")
        .await
        .unwrap()
        .is_none());

    dev.service.toggle_owner_status(&owner.id).await.unwrap();
    // Deactivated owners cannot log in, even with the right password
    assert!(dev
        .service
        .verify_owner_login("0912345678", "mat-khau-123")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn sales_report_aggregates_window() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let dev = device(&remote).await;
    let (owner, _, product) = seed_owner_with_product(&dev).await;

    for quantity in [1, 2] {
        dev.service
            .record_sale(RecordSaleRequest {
                owner_id: owner.id.clone(),
                lines: vec![SaleLineRequest {
                    product_id: product.id.clone(),
                    quantity,
                }],
                customer_name: String::new(),
                customer_phone: String::new(),
                payment_method: PaymentMethod::Cash,
                discount: 0,
                tax: 0,
            })
            .await
            .unwrap();
    }

    let report = dev
        .service
        .sales_report(Some(&owner.id), 0, i64::MAX)
        .await
        .unwrap();
    assert_eq!(report.sale_count, 2);
    assert_eq!(report.items_sold, 3);
    assert_eq!(report.revenue, 30_000);
}

// =============================================================================
// Duplicate phone guard
// =============================================================================

#[tokio::test]
async fn duplicate_phone_rejected_before_any_write() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let dev = device(&remote).await;

    dev.service
        .create_owner("Mai", "0912345678", "", "mat-khau")
        .await
        .unwrap();
    let unsent_before = dev.store.outbox().count_unsent().await.unwrap();

    let result = dev
        .service
        .create_owner("Kẻ mạo danh", "0912345678", "", "mat-khau")
        .await;
    assert!(result.is_err());

    // Nothing new was queued by the rejected registration
    assert_eq!(
        dev.store.outbox().count_unsent().await.unwrap(),
        unsent_before
    );
}
