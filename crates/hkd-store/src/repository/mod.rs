//! # Repository Implementations
//!
//! One repository per collection, each a thin `Clone`-able wrapper over the
//! shared [`sqlx::SqlitePool`].
//!
//! ## Read Conventions
//! - Plain accessors (`get`, `get_all*`) filter out tombstoned rows; that is
//!   what application views want.
//! - `*_any` accessors include tombstones; the sync engine needs them to
//!   apply the never-resurrect rule during pulls.
//! - Rows written by the sync engine/listener carry `synced = 1` and are
//!   never re-enqueued to the outbox.

pub mod category;
pub mod outbox;
pub mod owner;
pub mod product;
pub mod sale;
pub mod watermark;
