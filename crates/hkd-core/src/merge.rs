//! # Conflict Resolution Policy
//!
//! The merge rule applied whenever a remote record meets a local one: during
//! the sync engine's pull phase and in the realtime listener. Pluggable so a
//! future policy (field-level merge, conflict logging) can replace the
//! default without touching engine control flow.
//!
//! ## Decision Table (LastWriteWins)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  remote tombstone?        → DeleteLocal  (deletion outranks edits)      │
//! │  no local record          → ApplyRemote                                 │
//! │  local tombstone          → ApplyRemote only if remote is strictly      │
//! │                             newer (never resurrect from a stale pull)   │
//! │  both live                → ApplyRemote iff remote.lastUpdated is       │
//! │                             strictly greater                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The losing side of a concurrent edit is dropped silently; there is no
//! conflict UI. Callers may log the loss at debug level.

// =============================================================================
// Record Metadata
// =============================================================================

/// The merge-relevant slice of any entity: its LWW stamp and tombstone flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordMeta {
    /// Unix-millisecond last-write-wins stamp.
    pub last_updated: i64,

    /// Soft-delete tombstone flag.
    pub deleted: bool,
}

impl RecordMeta {
    pub fn new(last_updated: i64, deleted: bool) -> Self {
        RecordMeta {
            last_updated,
            deleted,
        }
    }

    /// Metadata for a live (non-deleted) record.
    pub fn live(last_updated: i64) -> Self {
        RecordMeta::new(last_updated, false)
    }

    /// Metadata for a tombstoned record.
    pub fn tombstone(last_updated: i64) -> Self {
        RecordMeta::new(last_updated, true)
    }
}

// =============================================================================
// Merge Decision
// =============================================================================

/// What to do with the local record after comparing it to a remote one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    /// Upsert the remote value locally (tagged remote-origin).
    ApplyRemote,

    /// Keep the local record untouched; drop the remote value.
    KeepLocal,

    /// Hard-delete the local record (and cascade to contained records).
    DeleteLocal,
}

// =============================================================================
// Conflict Policy
// =============================================================================

/// Strategy interface for merge decisions.
pub trait ConflictPolicy: Send + Sync {
    /// Decides the fate of the local record given an incoming remote one.
    /// `local` is `None` when no local record exists (tombstoned rows count
    /// as existing).
    fn decide(&self, local: Option<RecordMeta>, remote: RecordMeta) -> MergeDecision;
}

/// The default policy: last write wins by `last_updated`, tombstones
/// propagate, local tombstones are never resurrected by stale pulls.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastWriteWins;

impl ConflictPolicy for LastWriteWins {
    fn decide(&self, local: Option<RecordMeta>, remote: RecordMeta) -> MergeDecision {
        // A remote tombstone always propagates. A concurrent local edit loses
        // to the deletion; re-creation is an explicit new record, not a merge.
        if remote.deleted {
            return match local {
                Some(_) => MergeDecision::DeleteLocal,
                None => MergeDecision::KeepLocal,
            };
        }

        let local = match local {
            Some(meta) => meta,
            None => return MergeDecision::ApplyRemote,
        };

        // A local tombstone wins over any pull that has not yet observed the
        // deletion round-trip. Only a strictly newer live remote write (a
        // deliberate re-creation) may overwrite it.
        if local.deleted {
            return if remote.last_updated > local.last_updated {
                MergeDecision::ApplyRemote
            } else {
                MergeDecision::KeepLocal
            };
        }

        if remote.last_updated > local.last_updated {
            MergeDecision::ApplyRemote
        } else {
            MergeDecision::KeepLocal
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
