//! # Domain Types
//!
//! Core entity types for HKD POS.
//!
//! ## Entity Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Entity Hierarchy                                 │
//! │                                                                         │
//! │  ┌───────────┐ 1     n ┌────────────┐ 1     n ┌───────────┐             │
//! │  │   Owner   │────────►│  Category  │────────►│  Product  │             │
//! │  │ (shop)    │         │            │         │           │             │
//! │  └─────┬─────┘         └────────────┘         └───────────┘             │
//! │        │ 1                                                              │
//! │        │ n                                                              │
//! │  ┌─────▼─────┐  items  ┌────────────┐                                   │
//! │  │   Sale    │────────►│  LineItem  │  (frozen product snapshot)        │
//! │  └───────────┘         └────────────┘                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Sync Bookkeeping
//! Every entity carries:
//! - `last_updated` (unix millis) - the last-write-wins arbiter
//! - `deleted`/`deleted_at` - the soft-delete tombstone pair, serialized as
//!   `_deleted`/`_deletedAt` so other devices pulling by watermark still
//!   observe the deletion event
//! - `synced` (`_synced` on the wire, stripped before transmission) - marks
//!   records whose value came from a remote pull, so they are never
//!   re-enqueued to the outbox (sync-loop prevention)
//!
//! Wire field names are camelCase, matching the remote store layout.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::now_millis;

fn is_false(v: &bool) -> bool {
    !*v
}

// =============================================================================
// Owner
// =============================================================================

/// Account status of an owner. Owners are never hard-deleted by normal
/// flows; deactivation (or a tombstone) is used instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum OwnerStatus {
    Active,
    Inactive,
}

impl Default for OwnerStatus {
    fn default() -> Self {
        OwnerStatus::Active
    }
}

impl OwnerStatus {
    /// Returns the opposite status (used by the admin status toggle).
    pub fn toggled(self) -> Self {
        match self {
            OwnerStatus::Active => OwnerStatus::Inactive,
            OwnerStatus::Inactive => OwnerStatus::Active,
        }
    }
}

/// A household business unit (shop). Owns categories, products, and sales.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    /// Unique identifier (UUID v4). Not stored inside the remote `info`
    /// node - it is the path key and gets re-injected on pull.
    #[serde(default)]
    pub id: String,

    pub name: String,

    /// Unique across all owners; enforced by the local secondary index
    /// before any remote round trip.
    pub phone: String,

    #[serde(default)]
    pub address: String,

    /// Argon2 hash of the owner's password.
    #[serde(default)]
    pub password_hash: String,

    #[serde(default)]
    pub status: OwnerStatus,

    #[serde(default)]
    pub created_at: i64,

    pub last_updated: i64,

    /// Soft-delete tombstone marker.
    #[serde(rename = "_deleted", default, skip_serializing_if = "is_false")]
    pub deleted: bool,

    #[serde(rename = "_deletedAt", default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,

    /// True when this record's current value came from the remote store.
    #[serde(rename = "_synced", default, skip_serializing_if = "is_false")]
    pub synced: bool,
}

impl Owner {
    /// Creates a new active owner stamped with the current time.
    pub fn new(
        name: impl Into<String>,
        phone: impl Into<String>,
        address: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        let now = now_millis();
        Owner {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            phone: phone.into(),
            address: address.into(),
            password_hash: password_hash.into(),
            status: OwnerStatus::Active,
            created_at: now,
            last_updated: now,
            deleted: false,
            deleted_at: None,
            synced: false,
        }
    }
}

// =============================================================================
// Category
// =============================================================================

/// A product category, owned by exactly one owner.
///
/// The fallback category [`crate::FALLBACK_CATEGORY_NAME`] must always exist
/// for every owner; products with no usable category land there.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Category {
    #[serde(default)]
    pub id: String,

    /// Path-derived on pull; not stored inside the remote node.
    #[serde(default)]
    pub owner_id: String,

    pub name: String,

    pub last_updated: i64,

    #[serde(rename = "_deleted", default, skip_serializing_if = "is_false")]
    pub deleted: bool,

    #[serde(rename = "_deletedAt", default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,

    #[serde(rename = "_synced", default, skip_serializing_if = "is_false")]
    pub synced: bool,
}

impl Category {
    /// Creates a new category stamped with the current time.
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        Category {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            name: name.into(),
            last_updated: now_millis(),
            deleted: false,
            deleted_at: None,
            synced: false,
        }
    }
}

// =============================================================================
// Product
// =============================================================================

/// A product for sale. Belongs to one owner and one category.
///
/// Prices are integer minor currency units (VND has no fraction). Stock is
/// decremented at sale time and floored at zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub owner_id: String,

    /// Owning category. Required: the nested remote layout addresses
    /// products *through* their category path.
    #[serde(default)]
    pub category_id: String,

    pub name: String,

    #[serde(default)]
    pub code: String,

    #[serde(default)]
    pub price: i64,

    #[serde(default)]
    pub cost: i64,

    #[serde(default)]
    pub stock: i64,

    #[serde(default)]
    pub unit: String,

    #[serde(default)]
    pub barcode: String,

    #[serde(default)]
    pub created_at: i64,

    pub last_updated: i64,

    #[serde(rename = "_deleted", default, skip_serializing_if = "is_false")]
    pub deleted: bool,

    #[serde(rename = "_deletedAt", default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,

    #[serde(rename = "_synced", default, skip_serializing_if = "is_false")]
    pub synced: bool,
}

// =============================================================================
// Sale
// =============================================================================

/// Payment method recorded on a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Transfer,
    Card,
}

impl Default for PaymentMethod {
    fn default() -> Self {
        PaymentMethod::Cash
    }
}

/// A line item in a sale: a frozen snapshot of the product at sale time.
///
/// All string fields default to the empty string rather than being absent -
/// the remote store rejects undefined values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[serde(default)]
    pub product_id: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub name: String,
    /// Product name before any rename, kept for receipt reprints.
    #[serde(default)]
    pub original_name: String,
    #[serde(default)]
    pub price: i64,
    #[serde(default)]
    pub cost: i64,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub total: i64,
}

/// A completed sale. Immutable once created except for the `synced` and
/// `last_updated` bookkeeping fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub owner_id: String,

    /// Owner name snapshot, denormalized for the cross-owner sales mirror.
    #[serde(default)]
    pub owner_name: String,

    #[serde(default)]
    pub customer_name: String,

    #[serde(default)]
    pub customer_phone: String,

    #[serde(default)]
    pub items: Vec<LineItem>,

    #[serde(default)]
    pub subtotal: i64,

    #[serde(default)]
    pub discount: i64,

    #[serde(default)]
    pub tax: i64,

    #[serde(default)]
    pub total: i64,

    #[serde(default)]
    pub payment_method: PaymentMethod,

    /// When the sale happened (unix millis).
    pub timestamp: i64,

    pub last_updated: i64,

    #[serde(rename = "_synced", default, skip_serializing_if = "is_false")]
    pub synced: bool,
}

// =============================================================================
// Entity Kinds
// =============================================================================

/// The four synchronized collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Owner,
    Category,
    Product,
    Sale,
}

impl EntityKind {
    /// All kinds in pull order. Owners come first so that a brand-new owner's
    /// categories/products/sales have their parent present when applied.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Owner,
        EntityKind::Category,
        EntityKind::Product,
        EntityKind::Sale,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Owner => "owner",
            EntityKind::Category => "category",
            EntityKind::Product => "product",
            EntityKind::Sale => "sale",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(EntityKind::Owner),
            "category" => Ok(EntityKind::Category),
            "product" => Ok(EntityKind::Product),
            "sale" => Ok(EntityKind::Sale),
            other => Err(format!("unknown entity kind: '{}'", other)),
        }
    }
}

// =============================================================================
// Sync Outbox
// =============================================================================

/// What an outbox entry intends to do remotely: upsert an entity, or
/// soft-delete it. Stored as text (`product`, `product_delete`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboxKind {
    pub entity: EntityKind,
    pub delete: bool,
}

impl OutboxKind {
    pub fn upsert(entity: EntityKind) -> Self {
        OutboxKind {
            entity,
            delete: false,
        }
    }

    pub fn delete(entity: EntityKind) -> Self {
        OutboxKind {
            entity,
            delete: true,
        }
    }
}

impl std::fmt::Display for OutboxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.delete {
            write!(f, "{}_delete", self.entity)
        } else {
            write!(f, "{}", self.entity)
        }
    }
}

impl std::str::FromStr for OutboxKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (entity, delete) = match s.strip_suffix("_delete") {
            Some(prefix) => (prefix, true),
            None => (s, false),
        };
        Ok(OutboxKind {
            entity: entity.parse()?,
            delete,
        })
    }
}

/// Lifecycle state of an outbox entry.
///
/// `pending → synced` on successful push, `pending → error` on failure
/// (retried with backoff), `error → dead` once the attempt budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    Synced,
    Error,
    Dead,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Synced => "synced",
            OutboxStatus::Error => "error",
            OutboxStatus::Dead => "dead",
        }
    }
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OutboxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OutboxStatus::Pending),
            "synced" => Ok(OutboxStatus::Synced),
            "error" => Ok(OutboxStatus::Error),
            "dead" => Ok(OutboxStatus::Dead),
            other => Err(format!("unknown outbox status: '{}'", other)),
        }
    }
}

/// A pending mutation intent awaiting transmission to the remote store.
///
/// Entries are consumed by the sync engine's push phase and marked `synced`
/// or `error`; nothing else mutates them. Duplicate entries for the same
/// entity are acceptable - the last one wins at apply time.
#[derive(Debug, Clone)]
pub struct OutboxEntry {
    /// Durable insertion order (SQLite rowid).
    pub seq: i64,

    /// Unique identifier (UUID v4).
    pub id: String,

    pub kind: OutboxKind,

    /// Full entity data as JSON at enqueue time.
    pub data: Value,

    pub status: OutboxStatus,

    /// Number of failed push attempts so far.
    pub attempts: i64,

    pub last_error: Option<String>,

    /// Earliest time (unix millis) the next attempt may run. Zero for
    /// brand-new entries; advanced by capped exponential backoff on failure.
    pub next_attempt_at: i64,

    pub created_at: i64,
}

impl OutboxEntry {
    /// Creates a fresh pending entry for the given intent.
    pub fn new(kind: OutboxKind, data: Value) -> Self {
        OutboxEntry {
            seq: 0,
            id: Uuid::new_v4().to_string(),
            kind,
            data,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            next_attempt_at: 0,
            created_at: now_millis(),
        }
    }
}

// =============================================================================
// Sync Watermark
// =============================================================================

/// The timestamp boundary up to which a collection's remote state has been
/// pulled. One per collection.
#[derive(Debug, Clone, Copy)]
pub struct SyncWatermark {
    pub collection: EntityKind,
    pub last_sync_at: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================
