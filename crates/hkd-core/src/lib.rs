//! # hkd-core: Domain Logic for HKD POS
//!
//! Pure domain layer for the HKD point-of-sale sync core: entity types,
//! validation rules, the conflict-resolution policy, and password hashing.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         HKD POS Layers                                  │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    hkd-core (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐   ┌───────────────┐   ┌──────────────────┐ │   │
//! │  │   │    Types      │   │  Validation   │   │  Conflict Policy │ │   │
//! │  │   │  (types.rs)   │   │(validation.rs)│   │    (merge.rs)    │ │   │
//! │  │   │               │   │               │   │                  │ │   │
//! │  │   │ Owner         │   │ phone format  │   │ LastWriteWins    │ │   │
//! │  │   │ Category      │   │ password len  │   │ tombstone rules  │ │   │
//! │  │   │ Product       │   │ price/qty     │   │                  │ │   │
//! │  │   │ Sale/LineItem │   │               │   │                  │ │   │
//! │  │   │ OutboxEntry   │   │               │   │                  │ │   │
//! │  │   └───────────────┘   └───────────────┘   └──────────────────┘ │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │        │ used by                                                        │
//! │        ▼                                                                │
//! │  hkd-store (local SQLite), hkd-sync (engine, listener, service)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Timestamps
//! Every entity carries a `last_updated` stamp in **unix milliseconds**; it
//! is the sole arbiter of conflict resolution (last write wins). Use
//! [`now_millis`] for all stamping so clocks are taken from one place.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod merge;
pub mod password;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use merge::{ConflictPolicy, LastWriteWins, MergeDecision, RecordMeta};
pub use types::{
    Category, EntityKind, LineItem, OutboxEntry, OutboxKind, OutboxStatus, Owner, OwnerStatus,
    PaymentMethod, Product, Sale, SyncWatermark,
};

// =============================================================================
// Domain Constants
// =============================================================================

/// Name of the fallback category that must always exist for every owner.
/// Products with no usable category land here ("Khác" = "Other").
pub const FALLBACK_CATEGORY_NAME: &str = "Khác";

/// Minimum accepted password length for owner accounts.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Maximum length for owner, category, and product names.
pub const MAX_NAME_LEN: usize = 100;

/// Maximum quantity accepted for a single sale line.
pub const MAX_LINE_QUANTITY: i64 = 9_999;

// =============================================================================
// Clock
// =============================================================================

/// Returns the current time as unix milliseconds.
///
/// All `last_updated`/`created_at` stamps in the system come from this
/// function so that conflict resolution compares values from one clock
/// source.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_millis_is_plausible() {
        // 2020-01-01 in millis; anything earlier means a broken clock source
        let ts = now_millis();
        assert!(ts > 1_577_836_800_000);
    }
}
