//! # hkd-sync: Sync Engine for HKD POS
//!
//! Offline-first bidirectional synchronization between the local durable
//! store and the shared remote realtime database: conflict resolution by
//! timestamp, soft-delete propagation, a pending-operation outbox, and
//! realtime push updates with notification de-duplication.
//!
//! ## Data Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  View mutates ──► HkdService ──► LocalStore write ──► Outbox enqueue    │
//! │                                                            │            │
//! │                                                            ▼            │
//! │                                    SyncEngine push ──► RemoteStore      │
//! │                                                            │            │
//! │  View re-reads ◄── LocalStore ◄── SyncEngine pull ◄────────┤            │
//! │        ▲                      ◄── RealtimeListener ◄───────┘            │
//! │        │                            │                                   │
//! │        └── LocalChange broadcast ◄──┘  (+ notification side effects)    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`engine`] - The pull/push/merge loop, triggers, and status
//! - [`listener`] - Realtime change feed application + notifications
//! - [`service`] - Operations consumed by the (out-of-scope) UI layers
//! - [`remote`] - `RemoteStore` trait + in-memory implementation
//! - [`rest`] - REST implementation for the hosted realtime database
//! - [`path`] - `PathResolver`, the single source of remote path truth
//! - [`payload`] - Outbound normalization/stamping, inbound metadata
//! - [`apply`] - Shared remote→local merge application
//! - [`context`] - Explicit shared sync state (scope, in-flight, watermarks)
//! - [`config`] - TOML configuration
//! - [`error`] - Sync error types
//!
//! ## Usage
//! ```rust,ignore
//! use std::sync::Arc;
//! use hkd_store::{LocalStore, StoreConfig};
//! use hkd_sync::{HkdService, RealtimeListener, RestRemoteStore, SyncConfig, SyncEngine};
//!
//! let store = LocalStore::new(StoreConfig::new("./hkd.db")).await?;
//! let config = SyncConfig::load_or_default(None);
//! let remote = Arc::new(RestRemoteStore::new(
//!     config.remote.base_url.clone().unwrap_or_default(),
//! ));
//!
//! let engine = SyncEngine::new(store.clone(), remote.clone(), config.clone());
//! let ctx = engine.context();
//! let resolver = engine.resolver();
//! let handle = engine.start();
//!
//! let service = HkdService::new(store, ctx, remote, resolver);
//! let status = handle.status().await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod apply;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod listener;
pub mod path;
pub mod payload;
pub mod remote;
pub mod rest;
pub mod service;

// =============================================================================
// Re-exports
// =============================================================================

pub use apply::{Applied, RemoteApplier};
pub use config::{DeviceConfig, ProductLayout, RemoteSettings, SyncConfig, SyncSettings};
pub use context::{OwnerScope, SyncContext};
pub use engine::{SyncEngine, SyncEngineHandle, SyncReport, SyncStatus};
pub use error::{SyncError, SyncResult};
pub use listener::{
    ChangeNotifier, LocalChange, NoOpNotifier, RealtimeListener, RealtimeListenerHandle,
};
pub use path::PathResolver;
pub use remote::{MemoryRemoteStore, RemoteEvent, RemoteEventKind, RemoteStore};
pub use rest::RestRemoteStore;
pub use service::{
    HkdService, NewProduct, RecordSaleRequest, SaleLineRequest, SaleReceipt, SalesReport,
    ServiceError, ServiceResult, UpdateOwner, UpdateProduct,
};
