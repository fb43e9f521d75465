//! # Seed Data Generator
//!
//! Populates a local store with a demo owner and shelf stock for
//! development.
//!
//! ## Usage
//! ```bash
//! # Seed the default database (./hkd.db)
//! cargo run -p hkd-store --bin seed
//!
//! # Specify a database path
//! cargo run -p hkd-store --bin seed -- --db ./data/hkd.db
//! ```

use std::env;

use hkd_core::{now_millis, Category, Owner, Product, FALLBACK_CATEGORY_NAME};
use hkd_store::{LocalStore, StoreConfig};
use uuid::Uuid;

/// Category name + products as (name, code, price, cost, stock, unit).
const SHELVES: &[(&str, &[(&str, &str, i64, i64, i64, &str)])] = &[
    (
        "Đồ uống",
        &[
            ("Trà xanh 0 độ", "TX001", 10_000, 7_500, 48, "chai"),
            ("Nước suối Lavie 500ml", "NS001", 5_000, 3_500, 120, "chai"),
            ("Sting dâu", "ST001", 10_000, 8_000, 60, "chai"),
            ("Cà phê sữa lon", "CF001", 12_000, 9_000, 36, "lon"),
        ],
    ),
    (
        "Mì & đồ khô",
        &[
            ("Mì Hảo Hảo tôm chua cay", "MI001", 4_000, 3_200, 200, "gói"),
            ("Mì Omachi bò hầm", "MI002", 8_000, 6_500, 90, "gói"),
            ("Gạo ST25 túi 5kg", "GA001", 160_000, 140_000, 15, "túi"),
            ("Nước mắm Nam Ngư 500ml", "NM001", 28_000, 23_000, 30, "chai"),
        ],
    ),
    (
        "Bánh kẹo",
        &[
            ("Bánh Chocopie hộp 12", "BK001", 48_000, 40_000, 20, "hộp"),
            ("Kẹo Alpenliebe", "BK002", 18_000, 14_000, 40, "gói"),
            ("Bánh mì que", "BK003", 5_000, 3_000, 25, "cái"),
        ],
    ),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let db_path = parse_db_path().unwrap_or_else(|| "./hkd.db".to_string());
    tracing::info!(path = %db_path, "Seeding local store");

    let store = LocalStore::new(StoreConfig::new(&db_path)).await?;

    let password_hash = hkd_core::password::hash_password("123456")?;
    let owner = Owner::new("Tạp hoá Mai", "0912345678", "Ngõ 12, Hà Nội", password_hash);
    store.owners().upsert(&owner).await?;

    // The fallback category must always exist
    let fallback = Category::new(&owner.id, FALLBACK_CATEGORY_NAME);
    store.categories().upsert(&fallback).await?;

    let mut product_count = 0;
    for (shelf_name, products) in SHELVES {
        let category = Category::new(&owner.id, *shelf_name);
        store.categories().upsert(&category).await?;

        for (name, code, price, cost, stock, unit) in *products {
            let now = now_millis();
            let product = Product {
                id: Uuid::new_v4().to_string(),
                owner_id: owner.id.clone(),
                category_id: category.id.clone(),
                name: name.to_string(),
                code: code.to_string(),
                price: *price,
                cost: *cost,
                stock: *stock,
                unit: unit.to_string(),
                barcode: String::new(),
                created_at: now,
                last_updated: now,
                deleted: false,
                deleted_at: None,
                synced: false,
            };
            store.products().upsert(&product).await?;
            product_count += 1;
        }
    }

    tracing::info!(
        owner = %owner.name,
        categories = SHELVES.len() + 1,
        products = product_count,
        "Seed complete"
    );

    store.close().await;
    Ok(())
}

fn parse_db_path() -> Option<String> {
    let args: Vec<String> = env::args().collect();
    args.iter()
        .position(|a| a == "--db")
        .and_then(|i| args.get(i + 1))
        .cloned()
}
