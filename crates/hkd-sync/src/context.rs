//! # Sync Context
//!
//! Explicit shared state for the sync machinery - owner scope, the
//! in-flight mutual-exclusion flag, connectivity, and the watermark map -
//! injected into the engine, the listener, and the service instead of
//! living in module-level globals.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::RwLock;

use hkd_core::{EntityKind, SyncWatermark};

use crate::config::SyncConfig;

// =============================================================================
// Owner Scope
// =============================================================================

/// Which owners this device synchronizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerScope {
    /// The admin/managing device: every owner.
    All,

    /// An HKD storefront device: exactly one owner.
    Single(String),
}

impl OwnerScope {
    pub fn includes(&self, owner_id: &str) -> bool {
        match self {
            OwnerScope::All => true,
            OwnerScope::Single(id) => id == owner_id,
        }
    }
}

// =============================================================================
// Sync Context
// =============================================================================

/// Shared sync state. One instance per device, shared by reference between
/// the engine, the realtime listener, and the service surface.
pub struct SyncContext {
    scope: OwnerScope,

    /// The only explicit lock in the system: at most one full sync pass at
    /// a time. Does not serialize the realtime listener - idempotent LWW
    /// upserts make that interleaving safe.
    in_flight: AtomicBool,

    online: AtomicBool,

    /// Unix millis of the last completed pass; zero means never.
    last_sync_at: AtomicI64,

    /// Per-collection pull watermarks, mirrored to the local store.
    watermarks: RwLock<HashMap<EntityKind, i64>>,
}

impl SyncContext {
    pub fn new(scope: OwnerScope) -> Self {
        SyncContext {
            scope,
            in_flight: AtomicBool::new(false),
            online: AtomicBool::new(true),
            last_sync_at: AtomicI64::new(0),
            watermarks: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        let scope = match &config.owner_id {
            Some(id) => OwnerScope::Single(id.clone()),
            None => OwnerScope::All,
        };
        SyncContext::new(scope)
    }

    pub fn scope(&self) -> &OwnerScope {
        &self.scope
    }

    /// Attempts to start a sync pass. Returns false when one is already
    /// running - the caller must treat that as a silent no-op.
    pub fn try_begin_sync(&self) -> bool {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Marks the current sync pass finished.
    pub fn end_sync(&self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }

    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn set_last_sync(&self, at: i64) {
        self.last_sync_at.store(at, Ordering::SeqCst);
    }

    /// Last completed pass, `None` if the device has never synced.
    pub fn last_sync_at(&self) -> Option<i64> {
        match self.last_sync_at.load(Ordering::SeqCst) {
            0 => None,
            at => Some(at),
        }
    }

    /// Current watermark for a collection (zero when never pulled).
    pub fn watermark(&self, collection: EntityKind) -> i64 {
        self.watermarks
            .read()
            .map(|map| map.get(&collection).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn set_watermark(&self, collection: EntityKind, at: i64) {
        if let Ok(mut map) = self.watermarks.write() {
            map.insert(collection, at);
        }
    }

    /// Loads persisted watermarks (startup hydration).
    pub fn hydrate_watermarks(&self, stored: &[SyncWatermark]) {
        if let Ok(mut map) = self.watermarks.write() {
            for wm in stored {
                map.insert(wm.collection, wm.last_sync_at);
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_guard_is_exclusive() {
        let ctx = SyncContext::new(OwnerScope::All);

        assert!(ctx.try_begin_sync());
        assert!(ctx.is_syncing());
        // Re-entrant request is refused, not queued
        assert!(!ctx.try_begin_sync());

        ctx.end_sync();
        assert!(ctx.try_begin_sync());
    }

    #[test]
    fn test_scope_includes() {
        assert!(OwnerScope::All.includes("anyone"));

        let single = OwnerScope::Single("o1".to_string());
        assert!(single.includes("o1"));
        assert!(!single.includes("o2"));
    }

    #[test]
    fn test_watermark_hydration() {
        let ctx = SyncContext::new(OwnerScope::All);
        assert_eq!(ctx.watermark(EntityKind::Product), 0);

        ctx.hydrate_watermarks(&[SyncWatermark {
            collection: EntityKind::Product,
            last_sync_at: 42,
        }]);
        assert_eq!(ctx.watermark(EntityKind::Product), 42);

        ctx.set_watermark(EntityKind::Product, 99);
        assert_eq!(ctx.watermark(EntityKind::Product), 99);
    }
}
