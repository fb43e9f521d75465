//! # hkd-store: Local Durable Store for HKD POS
//!
//! The on-device half of the offline-first sync pair: a key-indexed,
//! per-collection SQLite database holding owners, categories, products,
//! sales, the sync outbox, and the pull watermarks.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       HKD POS Data Flow                                 │
//! │                                                                         │
//! │  Service operation (record_sale)          Sync engine (pull/push)       │
//! │       │                                        │                        │
//! │       ▼                                        ▼                        │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   hkd-store (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐   ┌────────────────┐   ┌───────────────┐   │   │
//! │  │   │  LocalStore   │   │  Repositories  │   │  Migrations   │   │   │
//! │  │   │  (pool.rs)    │◄──│  owner/sale/…  │   │  (embedded)   │   │   │
//! │  │   │  SqlitePool   │   │  outbox        │   │  001_init.sql │   │   │
//! │  │   └───────────────┘   │  watermark     │   └───────────────┘   │   │
//! │  │                       └────────────────┘                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (WAL) on the device - offline is the normal case           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{StoreError, StoreResult};
pub use pool::{LocalStore, StoreConfig};

pub use repository::category::CategoryRepository;
pub use repository::outbox::OutboxRepository;
pub use repository::owner::OwnerRepository;
pub use repository::product::ProductRepository;
pub use repository::sale::SaleRepository;
pub use repository::watermark::WatermarkRepository;
