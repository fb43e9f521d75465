//! # Sync Engine
//!
//! The pull/push/merge loop at the center of the system.
//!
//! ## One Sync Pass
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         sync_once()                                     │
//! │                                                                         │
//! │  try_begin_sync() ── already running? ──► silent no-op                  │
//! │       │                                   (next tick catches up)        │
//! │       ▼                                                                 │
//! │  PULL PHASE (remote → local), per owner in scope, per collection        │
//! │  ├── owner info      hkd/{o}/info                                       │
//! │  ├── categories      hkd/{o}/categories   (+ nested products)           │
//! │  ├── products        hkd/{o}/products     (flat layout)                 │
//! │  └── sales           hkd/{o}/sales                                      │
//! │      • _deleted ⇒ hard-delete local + cascade (+ tombstone GC)          │
//! │      • else last-write-wins upsert, tagged remote-origin                │
//! │      • failures isolated per collection/owner                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  PUSH PHASE (local → remote): drain outbox in insertion order           │
//! │      • resolve path via PathResolver                                    │
//! │      • write or soft-delete; mirror sales; maintain auth node           │
//! │      • per-entry failure ⇒ error + backoff (or dead letter),            │
//! │        never aborts the batch                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  advance watermarks (per fully-successful collection) → cleanup →       │
//! │  stamp last_sync_at → release the in-flight flag                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Pull completes before push within a pass, so a push is never immediately
//! overwritten by a stale pull from the same pass. Across devices the only
//! guarantee is last-write-wins convergence by `lastUpdated`.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use hkd_core::{now_millis, ConflictPolicy, EntityKind, LastWriteWins, OutboxEntry};
use hkd_store::LocalStore;

use crate::apply::RemoteApplier;
use crate::config::{ProductLayout, SyncConfig};
use crate::context::{OwnerScope, SyncContext};
use crate::error::{SyncError, SyncResult};
use crate::path::{PathResolver, OWNER_ROOT};
use crate::payload;
use crate::remote::RemoteStore;

// =============================================================================
// Reports & Status
// =============================================================================

/// Outcome counters for one sync pass, reported back on manual sync.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SyncReport {
    /// Remote records applied locally (upserts and deletes).
    pub pulled: usize,

    /// Outbox entries successfully transmitted.
    pub pushed: usize,

    /// Outbox entries that failed this pass.
    pub failed: usize,

    /// True when the pass was refused because another was in flight.
    pub skipped: bool,
}

impl SyncReport {
    fn skipped_busy() -> Self {
        SyncReport {
            skipped: true,
            ..Default::default()
        }
    }
}

/// Queryable sync status for the UI layer.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub online: bool,
    pub syncing: bool,
    /// Unix millis of the last completed pass; `None` if never.
    pub last_sync_at: Option<i64>,
    /// Outbox entries still awaiting transmission (pending + retrying).
    pub pending_count: i64,
    /// Entries abandoned after exhausting their attempt budget.
    pub dead_letter_count: i64,
}

// =============================================================================
// Sync Engine
// =============================================================================

/// The bidirectional sync engine. Construct once per device, then either
/// call [`SyncEngine::sync_once`] manually or [`SyncEngine::start`] the
/// background loop.
pub struct SyncEngine {
    store: LocalStore,
    remote: Arc<dyn RemoteStore>,
    resolver: PathResolver,
    applier: RemoteApplier,
    config: Arc<SyncConfig>,
    ctx: Arc<SyncContext>,
}

impl SyncEngine {
    /// Creates an engine with the default last-write-wins policy.
    pub fn new(store: LocalStore, remote: Arc<dyn RemoteStore>, config: SyncConfig) -> Self {
        Self::with_policy(store, remote, config, Arc::new(LastWriteWins))
    }

    /// Creates an engine with a custom conflict policy.
    pub fn with_policy(
        store: LocalStore,
        remote: Arc<dyn RemoteStore>,
        config: SyncConfig,
        policy: Arc<dyn ConflictPolicy>,
    ) -> Self {
        let ctx = Arc::new(SyncContext::from_config(&config));
        let resolver = PathResolver::new(config.sync.product_layout);
        let applier = RemoteApplier::new(store.clone(), policy);

        SyncEngine {
            store,
            remote,
            resolver,
            applier,
            config: Arc::new(config),
            ctx,
        }
    }

    /// The shared sync context (for the service layer and listener).
    pub fn context(&self) -> Arc<SyncContext> {
        self.ctx.clone()
    }

    pub fn resolver(&self) -> PathResolver {
        self.resolver
    }

    /// Loads persisted watermarks into the context. Call once at startup.
    pub async fn hydrate(&self) -> SyncResult<()> {
        let stored = self.store.watermarks().all().await?;
        self.ctx.hydrate_watermarks(&stored);
        Ok(())
    }

    // =========================================================================
    // One Pass
    // =========================================================================

    /// Runs one full sync pass. A request while another pass is in flight
    /// is a silent no-op (`report.skipped == true`); the next timer tick
    /// catches up.
    pub async fn sync_once(&self) -> SyncResult<SyncReport> {
        if !self.ctx.try_begin_sync() {
            debug!("Sync already in progress, skipping");
            return Ok(SyncReport::skipped_busy());
        }

        let result = self.run_pass().await;
        self.ctx.end_sync();

        result
    }

    async fn run_pass(&self) -> SyncResult<SyncReport> {
        let mut report = SyncReport::default();
        let pass_start = now_millis();

        // Pull always completes before push within a pass
        self.pull_all(pass_start, &mut report).await;
        self.push_outbox(&mut report).await?;

        let retention_cutoff = pass_start - self.config.retention_ms();
        if let Err(e) = self.store.outbox().cleanup_synced(retention_cutoff).await {
            warn!(error = %e, "Outbox cleanup failed");
        }

        self.ctx.set_last_sync(now_millis());
        info!(
            pulled = report.pulled,
            pushed = report.pushed,
            failed = report.failed,
            "Sync pass complete"
        );

        Ok(report)
    }

    // =========================================================================
    // Pull Phase (remote → local)
    // =========================================================================

    async fn pull_all(&self, pass_start: i64, report: &mut SyncReport) {
        let owners = match self.owners_in_scope().await {
            Ok(owners) => owners,
            Err(e) => {
                // Offline is the expected case, not an exception
                debug!(error = %e, "Pull skipped, remote unreachable");
                return;
            }
        };

        let mut collection_ok: HashMap<EntityKind, bool> =
            EntityKind::ALL.iter().map(|k| (*k, true)).collect();

        for owner_id in &owners {
            if let Err(e) = self.pull_owner_info(owner_id, report).await {
                warn!(owner = %owner_id, error = %e, "Owner pull failed");
                collection_ok.insert(EntityKind::Owner, false);
            }

            if let Err(e) = self.pull_categories(owner_id, report).await {
                warn!(owner = %owner_id, error = %e, "Category pull failed");
                collection_ok.insert(EntityKind::Category, false);
                // Nested products ride on the category listing
                if self.resolver.layout() == ProductLayout::Nested {
                    collection_ok.insert(EntityKind::Product, false);
                }
            }

            if self.resolver.layout() == ProductLayout::Flat {
                if let Err(e) = self.pull_flat_products(owner_id, report).await {
                    warn!(owner = %owner_id, error = %e, "Product pull failed");
                    collection_ok.insert(EntityKind::Product, false);
                }
            }

            if let Err(e) = self.pull_sales(owner_id, report).await {
                warn!(owner = %owner_id, error = %e, "Sale pull failed");
                collection_ok.insert(EntityKind::Sale, false);
            }
        }

        // Advance each collection's watermark only after a fully successful
        // pass over every owner in scope; a failed owner keeps it back so
        // the next pass re-covers the gap.
        for kind in EntityKind::ALL {
            if collection_ok.get(&kind).copied().unwrap_or(false) {
                self.ctx.set_watermark(kind, pass_start);
                if let Err(e) = self.store.watermarks().set(kind, pass_start).await {
                    warn!(collection = %kind, error = %e, "Watermark persist failed");
                }
            }
        }
    }

    /// Owners this device pulls: the configured owner, or (admin device)
    /// the union of remote and locally-known owner ids.
    async fn owners_in_scope(&self) -> SyncResult<Vec<String>> {
        match self.ctx.scope() {
            OwnerScope::Single(id) => Ok(vec![id.clone()]),
            OwnerScope::All => {
                let mut ids: BTreeSet<String> =
                    self.remote.list(OWNER_ROOT).await?.into_keys().collect();

                for owner in self.store.owners().get_all().await? {
                    ids.insert(owner.id);
                }

                Ok(ids.into_iter().collect())
            }
        }
    }

    async fn pull_owner_info(&self, owner_id: &str, report: &mut SyncReport) -> SyncResult<()> {
        let path = self.resolver.owner_info(owner_id);
        let Some(value) = self.remote.get(&path).await? else {
            return Ok(());
        };

        let meta = payload::record_meta(&value);
        if payload::sync_stamp(&value) < self.ctx.watermark(EntityKind::Owner) {
            return Ok(());
        }

        if self.applier.apply_owner(owner_id, &value).await?.changed() {
            report.pulled += 1;
        }

        if meta.deleted {
            self.gc_tombstone(&path, &value).await;
        }

        Ok(())
    }

    async fn pull_categories(&self, owner_id: &str, report: &mut SyncReport) -> SyncResult<()> {
        let children = self.remote.list(&self.resolver.categories_of(owner_id)).await?;
        let category_wm = self.ctx.watermark(EntityKind::Category);
        let product_wm = self.ctx.watermark(EntityKind::Product);

        for (category_id, node) in children {
            let scalars = payload::scalar_fields(&node);
            let meta = payload::record_meta(&scalars);

            if payload::sync_stamp(&scalars) >= category_wm {
                if self
                    .applier
                    .apply_category(owner_id, &category_id, &scalars)
                    .await?
                    .changed()
                {
                    report.pulled += 1;
                }

                if meta.deleted {
                    self.gc_tombstone(&self.resolver.category(owner_id, &category_id), &scalars)
                        .await;
                }
            }

            // Nested layout: every object-valued child of a live category
            // node is a product
            if self.resolver.layout() == ProductLayout::Nested && !meta.deleted {
                for (product_id, product_node) in payload::object_children(&node) {
                    let product_meta = payload::record_meta(&product_node);
                    if payload::sync_stamp(&product_node) < product_wm {
                        continue;
                    }

                    if self
                        .applier
                        .apply_product(owner_id, Some(&category_id), &product_id, &product_node)
                        .await?
                        .changed()
                    {
                        report.pulled += 1;
                    }

                    if product_meta.deleted {
                        let path = self
                            .resolver
                            .product(owner_id, Some(&category_id), &product_id)?;
                        self.gc_tombstone(&path, &product_node).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn pull_flat_products(&self, owner_id: &str, report: &mut SyncReport) -> SyncResult<()> {
        let Some(collection) = self.resolver.products_of(owner_id) else {
            return Ok(());
        };

        let children = self.remote.list(&collection).await?;
        let wm = self.ctx.watermark(EntityKind::Product);

        for (product_id, node) in children {
            let meta = payload::record_meta(&node);
            if payload::sync_stamp(&node) < wm {
                continue;
            }

            if self
                .applier
                .apply_product(owner_id, None, &product_id, &node)
                .await?
                .changed()
            {
                report.pulled += 1;
            }

            if meta.deleted {
                self.gc_tombstone(&format!("{}/{}", collection, product_id), &node)
                    .await;
            }
        }

        Ok(())
    }

    async fn pull_sales(&self, owner_id: &str, report: &mut SyncReport) -> SyncResult<()> {
        let children = self.remote.list(&self.resolver.sales_of(owner_id)).await?;
        let wm = self.ctx.watermark(EntityKind::Sale);

        for (sale_id, node) in children {
            if payload::sync_stamp(&node) < wm {
                continue;
            }

            if self
                .applier
                .apply_sale(owner_id, &sale_id, &node)
                .await?
                .changed()
            {
                report.pulled += 1;
            }
        }

        Ok(())
    }

    /// Purges a remote tombstone once it is older than the configured TTL.
    /// Failures are ignored: another device (or the next pass) will retry.
    async fn gc_tombstone(&self, path: &str, value: &Value) {
        let Some(ttl) = self.config.tombstone_ttl_ms() else {
            return;
        };

        if now_millis() - payload::deleted_at(value) > ttl {
            debug!(path = %path, "Purging expired tombstone");
            if let Err(e) = self.remote.remove(path).await {
                debug!(path = %path, error = %e, "Tombstone purge failed");
            }
        }
    }

    // =========================================================================
    // Push Phase (local → remote)
    // =========================================================================

    async fn push_outbox(&self, report: &mut SyncReport) -> SyncResult<()> {
        let now = now_millis();
        let entries = self
            .store
            .outbox()
            .due_pending(now, self.config.sync.batch_size)
            .await?;

        if entries.is_empty() {
            return Ok(());
        }

        info!(count = entries.len(), "Draining outbox");

        for entry in entries {
            match self.push_entry(&entry).await {
                Ok(()) => {
                    self.store.outbox().mark_synced(&entry.id).await?;
                    self.mark_local_synced(&entry).await;
                    report.pushed += 1;
                }
                Err(e) => {
                    // One entry's failure never aborts the batch
                    report.failed += 1;
                    let attempts_after = entry.attempts + 1;

                    if !e.is_retryable() || attempts_after >= self.config.sync.max_attempts {
                        self.store.outbox().mark_dead(&entry.id, &e.to_string()).await?;
                    } else {
                        let next = now + self.config.backoff_ms(entry.attempts);
                        self.store
                            .outbox()
                            .mark_error(&entry.id, &e.to_string(), next)
                            .await?;
                        warn!(
                            id = %entry.id,
                            kind = %entry.kind,
                            attempts = attempts_after,
                            error = %e,
                            "Outbox entry failed, will retry"
                        );
                    }
                }
            }
        }

        Ok(())
    }

    /// Transmits one outbox entry: resolve its path, then write or
    /// soft-delete.
    async fn push_entry(&self, entry: &OutboxEntry) -> SyncResult<()> {
        let data = &entry.data;
        let id = str_field(data, "id")?;
        let now = now_millis();

        debug!(kind = %entry.kind, id = %id, "Pushing outbox entry");

        match (entry.kind.entity, entry.kind.delete) {
            (EntityKind::Owner, false) => {
                let body = payload::outbound(strip(data, &["id"]), now);
                self.remote.merge(&self.resolver.owner_info(&id), body).await?;

                // Keep the login lookup node in step with the owner record
                let phone = str_field(data, "phone")?;
                let auth = serde_json::json!({
                    "ownerId": id,
                    "passwordHash": data.get("passwordHash").cloned().unwrap_or_default(),
                });
                self.remote
                    .put(&self.resolver.auth(&phone), payload::outbound(auth, now))
                    .await?;
            }

            (EntityKind::Owner, true) => {
                let stamp = tombstone_stamp(data, now);
                self.remote
                    .merge(
                        &self.resolver.owner_info(&id),
                        payload::outbound(payload::tombstone(stamp), now),
                    )
                    .await?;
            }

            (EntityKind::Category, false) => {
                let owner_id = str_field(data, "ownerId")?;
                let body = payload::outbound(strip(data, &["id", "ownerId"]), now);
                self.remote
                    .merge(&self.resolver.category(&owner_id, &id), body)
                    .await?;
            }

            (EntityKind::Category, true) => {
                let owner_id = str_field(data, "ownerId")?;
                let stamp = tombstone_stamp(data, now);
                self.remote
                    .merge(
                        &self.resolver.category(&owner_id, &id),
                        payload::outbound(payload::tombstone(stamp), now),
                    )
                    .await?;
            }

            (EntityKind::Product, false) => {
                let owner_id = str_field(data, "ownerId")?;
                let category_id = opt_str_field(data, "categoryId");
                let path = self
                    .resolver
                    .product(&owner_id, category_id.as_deref(), &id)?;

                // The nested path already encodes the category
                let stripped = match self.resolver.layout() {
                    ProductLayout::Nested => strip(data, &["id", "ownerId", "categoryId"]),
                    ProductLayout::Flat => strip(data, &["id", "ownerId"]),
                };
                self.remote.merge(&path, payload::outbound(stripped, now)).await?;
            }

            (EntityKind::Product, true) => {
                let owner_id = str_field(data, "ownerId")?;
                let category_id = opt_str_field(data, "categoryId");
                let path = self
                    .resolver
                    .product(&owner_id, category_id.as_deref(), &id)?;
                self.remote
                    .merge(
                        &path,
                        payload::outbound(payload::tombstone(tombstone_stamp(data, now)), now),
                    )
                    .await?;
            }

            (EntityKind::Sale, false) => {
                let owner_id = str_field(data, "ownerId")?;
                let body = payload::outbound(strip(data, &["id", "ownerId"]), now);
                self.remote
                    .put(&self.resolver.sale(&owner_id, &id), body)
                    .await?;

                // Mirror for cross-owner reporting keeps the owner fields
                let mirror = payload::outbound(strip(data, &["id"]), now);
                self.remote
                    .put(&self.resolver.sale_mirror(&id), mirror)
                    .await?;
            }

            (EntityKind::Sale, true) => {
                let owner_id = str_field(data, "ownerId")?;
                let stamp =
                    payload::outbound(payload::tombstone(tombstone_stamp(data, now)), now);
                self.remote
                    .merge(&self.resolver.sale(&owner_id, &id), stamp.clone())
                    .await?;
                self.remote
                    .merge(&self.resolver.sale_mirror(&id), stamp)
                    .await?;
            }
        }

        Ok(())
    }

    /// After a successful upsert push, flag the local row as confirmed so
    /// the UI can stop showing "saved offline".
    async fn mark_local_synced(&self, entry: &OutboxEntry) {
        if entry.kind.delete {
            return;
        }

        let Some(id) = entry.data.get("id").and_then(Value::as_str) else {
            return;
        };

        let result = match entry.kind.entity {
            EntityKind::Owner => self.store.owners().set_synced(id).await,
            EntityKind::Category => self.store.categories().set_synced(id).await,
            EntityKind::Product => self.store.products().set_synced(id).await,
            EntityKind::Sale => self.store.sales().set_synced(id).await,
        };

        if let Err(e) = result {
            debug!(id = %id, error = %e, "Could not flag local row as synced");
        }
    }

    // =========================================================================
    // Background Loop
    // =========================================================================

    /// Spawns the background sync loop and returns a control handle.
    ///
    /// Triggers: the periodic timer, online transitions (sync immediately on
    /// reconnect), and explicit force-sync requests. Timers stop only on
    /// shutdown.
    pub fn start(self) -> SyncEngineHandle {
        let (force_tx, force_rx) = mpsc::channel(8);
        let (online_tx, online_rx) = watch::channel(self.ctx.is_online());
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let handle = SyncEngineHandle {
            force_tx,
            online_tx,
            shutdown_tx,
            ctx: self.ctx.clone(),
            store: self.store.clone(),
        };

        tokio::spawn(self.run(force_rx, online_rx, shutdown_rx));

        handle
    }

    async fn run(
        self,
        mut force_rx: mpsc::Receiver<oneshot::Sender<SyncResult<SyncReport>>>,
        mut online_rx: watch::Receiver<bool>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        info!(interval_secs = self.config.sync.interval_secs, "Sync engine starting");

        if let Err(e) = self.hydrate().await {
            warn!(error = %e, "Watermark hydration failed, pulling from scratch");
        }

        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.sync.interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if self.ctx.is_online() {
                        if let Err(e) = self.sync_once().await {
                            error!(error = %e, "Periodic sync failed");
                        }
                    } else {
                        debug!("Offline, skipping periodic sync");
                    }
                }

                Some(reply) = force_rx.recv() => {
                    let result = self.sync_once().await;
                    let _ = reply.send(result);
                }

                changed = online_rx.changed() => {
                    if changed.is_err() {
                        break; // handle dropped
                    }

                    let online = *online_rx.borrow();
                    self.ctx.set_online(online);

                    if online {
                        info!("Connectivity restored, syncing");
                        if let Err(e) = self.sync_once().await {
                            error!(error = %e, "Reconnect sync failed");
                        }
                    } else {
                        info!("Connectivity lost, queuing locally");
                    }
                }

                _ = shutdown_rx.recv() => {
                    info!("Sync engine shutting down");
                    break;
                }
            }
        }

        info!("Sync engine stopped");
    }
}

// =============================================================================
// Engine Handle
// =============================================================================

/// Handle for controlling a running sync engine.
#[derive(Clone)]
pub struct SyncEngineHandle {
    force_tx: mpsc::Sender<oneshot::Sender<SyncResult<SyncReport>>>,
    online_tx: watch::Sender<bool>,
    shutdown_tx: mpsc::Sender<()>,
    ctx: Arc<SyncContext>,
    store: LocalStore,
}

impl SyncEngineHandle {
    /// Requests an immediate sync pass and waits for its report (the
    /// manual "force sync" user action).
    pub async fn force_sync(&self) -> SyncResult<SyncReport> {
        let (tx, rx) = oneshot::channel();
        self.force_tx
            .send(tx)
            .await
            .map_err(|_| SyncError::Channel("Sync engine stopped".into()))?;

        rx.await
            .map_err(|_| SyncError::Channel("Sync engine stopped".into()))?
    }

    /// Feeds a connectivity transition to the engine.
    pub fn set_online(&self, online: bool) {
        let _ = self.online_tx.send(online);
    }

    /// Current sync status. Count reads degrade to zero rather than fail.
    pub async fn status(&self) -> SyncStatus {
        let outbox = self.store.outbox();
        SyncStatus {
            online: self.ctx.is_online(),
            syncing: self.ctx.is_syncing(),
            last_sync_at: self.ctx.last_sync_at(),
            pending_count: outbox.count_unsent().await.unwrap_or(0),
            dead_letter_count: outbox.count_dead().await.unwrap_or(0),
        }
    }

    /// Signals the engine to shut down gracefully.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

// =============================================================================
// Payload Helpers
// =============================================================================

fn str_field(data: &Value, field: &str) -> SyncResult<String> {
    data.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SyncError::MalformedEntry(format!("missing field '{}'", field)))
}

fn opt_str_field(data: &Value, field: &str) -> Option<String> {
    data.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Returns a copy of `data` without the path-derived fields.
fn strip(data: &Value, fields: &[&str]) -> Value {
    let mut copy = data.clone();
    if let Some(map) = copy.as_object_mut() {
        for field in fields {
            map.remove(*field);
        }
    }
    copy
}

/// Deletion stamp for a tombstone write: the local tombstone time when the
/// entry carries one, else now.
fn tombstone_stamp(data: &Value, now: i64) -> i64 {
    data.get("_deletedAt")
        .and_then(Value::as_i64)
        .or_else(|| data.get("lastUpdated").and_then(Value::as_i64))
        .unwrap_or(now)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemoteStore;
    use hkd_core::{OutboxKind, Owner};
    use serde_json::json;

    async fn engine_with_memory() -> (SyncEngine, Arc<MemoryRemoteStore>) {
        let store = LocalStore::in_memory().await.unwrap();
        let remote = Arc::new(MemoryRemoteStore::new());
        let engine = SyncEngine::new(store, remote.clone(), SyncConfig::default());
        (engine, remote)
    }

    #[tokio::test]
    async fn test_in_flight_pass_is_silently_skipped() {
        let (engine, _remote) = engine_with_memory().await;

        assert!(engine.ctx.try_begin_sync());
        let report = engine.sync_once().await.unwrap();
        assert!(report.skipped);
        engine.ctx.end_sync();

        let report = engine.sync_once().await.unwrap();
        assert!(!report.skipped);
    }

    #[tokio::test]
    async fn test_owner_push_writes_info_and_auth() {
        let (engine, remote) = engine_with_memory().await;

        let owner = Owner::new("Mai", "0912345678", "Hà Nội", "$argon2$x");
        engine.store.owners().upsert(&owner).await.unwrap();
        engine
            .store
            .outbox()
            .enqueue(&OutboxEntry::new(
                OutboxKind::upsert(EntityKind::Owner),
                serde_json::to_value(&owner).unwrap(),
            ))
            .await
            .unwrap();

        let report = engine.sync_once().await.unwrap();
        assert_eq!(report.pushed, 1);
        assert_eq!(report.failed, 0);

        let info = remote
            .get(&format!("hkd/{}/info", owner.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info["name"], json!("Mai"));
        assert!(info.get("_deleted").is_none());
        assert!(info.get("id").is_none()); // path-derived, not stored

        let auth = remote.get("auth/0912345678").await.unwrap().unwrap();
        assert_eq!(auth["ownerId"], json!(owner.id));

        // Local row flagged as confirmed
        let local = engine.store.owners().get(&owner.id).await.unwrap().unwrap();
        assert!(local.synced);
    }

    #[tokio::test]
    async fn test_product_without_category_goes_to_dead_letter() {
        let (engine, _remote) = engine_with_memory().await;

        let entry = OutboxEntry::new(
            OutboxKind::upsert(EntityKind::Product),
            json!({"id": "p1", "ownerId": "o1", "name": "Trà", "lastUpdated": 1}),
        );
        engine.store.outbox().enqueue(&entry).await.unwrap();

        let report = engine.sync_once().await.unwrap();
        assert_eq!(report.failed, 1);

        // MissingCategory is not retryable: straight to the dead letter,
        // without poisoning the rest of the queue
        assert_eq!(engine.store.outbox().count_dead().await.unwrap(), 1);
        assert_eq!(engine.store.outbox().count_unsent().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_push_keeps_deletion_stamp_but_marks_push_time() {
        let (engine, remote) = engine_with_memory().await;

        // Deletion happened a while ago; the push is only going out now
        let entry = OutboxEntry::new(
            OutboxKind::delete(EntityKind::Category),
            json!({
                "id": "c1",
                "ownerId": "o1",
                "name": "Đồ uống",
                "_deleted": true,
                "_deletedAt": 1_000,
                "lastUpdated": 1_000,
            }),
        );
        engine.store.outbox().enqueue(&entry).await.unwrap();

        let before = now_millis();
        let report = engine.sync_once().await.unwrap();
        assert_eq!(report.pushed, 1);

        let node = remote
            .get("hkd/o1/categories/c1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(node["_deleted"], json!(true));
        // The LWW stamp stays at deletion time; other devices filter pulls
        // on max(lastUpdated, _syncedAt), so a late push is still observed
        assert_eq!(node["lastUpdated"], json!(1_000));
        assert!(node["_syncedAt"].as_i64().unwrap() >= before);
    }

    #[tokio::test]
    async fn test_offline_failure_backs_off_and_retries() {
        let (engine, remote) = engine_with_memory().await;

        let owner = Owner::new("Mai", "0912345678", "", "h");
        engine
            .store
            .outbox()
            .enqueue(&OutboxEntry::new(
                OutboxKind::upsert(EntityKind::Owner),
                serde_json::to_value(&owner).unwrap(),
            ))
            .await
            .unwrap();

        remote.set_online(false);
        let report = engine.sync_once().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(engine.store.outbox().count_unsent().await.unwrap(), 1);

        // Entry is backing off, not dead
        assert_eq!(engine.store.outbox().count_dead().await.unwrap(), 0);

        remote.set_online(true);
        // Immediately due? No: backoff holds it. Drain with the backoff
        // window elapsed by querying far in the future.
        let due = engine
            .store
            .outbox()
            .due_pending(now_millis() + 10_000, 10)
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].attempts, 1);
    }
}
