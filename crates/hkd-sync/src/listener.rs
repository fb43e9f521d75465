//! # Realtime Listener
//!
//! Applies the remote store's child-level change feed to the local store
//! immediately, independent of the polling sync engine, with a side-effect
//! notification fired exactly once per distinct new record.
//!
//! ## De-duplication
//! The notification trigger is [`Applied::Inserted`]: the applier reads the
//! local record before upserting, so a reconnect replay of an
//! already-known record can only produce `Updated`/`Skipped` and never
//! re-notifies.
//!
//! ## Degradation
//! If the remote store has no change feed (or subscribing fails), the
//! listener logs and exits. The periodic sync engine remains the
//! correctness path - realtime is an optimization, never a requirement.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use hkd_core::{ConflictPolicy, EntityKind, LastWriteWins};
use hkd_store::LocalStore;

use crate::apply::{Applied, RemoteApplier};
use crate::config::{ProductLayout, SyncConfig};
use crate::context::SyncContext;
use crate::error::SyncResult;
use crate::path::OWNER_ROOT;
use crate::payload;
use crate::remote::{RemoteEvent, RemoteStore};

// =============================================================================
// Notifications
// =============================================================================

/// Side-effect notifications (sound, toast, badge). Implemented by the UI
/// integration; fired exactly once per distinct new record id.
pub trait ChangeNotifier: Send + Sync {
    fn entity_added(&self, kind: EntityKind, id: &str, label: &str);
    fn entity_removed(&self, kind: EntityKind, id: &str);
}

/// No-op notifier for tests and headless use.
pub struct NoOpNotifier;

impl ChangeNotifier for NoOpNotifier {
    fn entity_added(&self, _kind: EntityKind, _id: &str, _label: &str) {}
    fn entity_removed(&self, _kind: EntityKind, _id: &str) {}
}

/// A change the listener applied to the local store, re-broadcast so views
/// can refresh (`onRemoteChange` registration surface).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalChange {
    pub kind: EntityKind,
    pub owner_id: String,
    pub id: String,
    pub deleted: bool,
}

// =============================================================================
// Realtime Listener
// =============================================================================

/// Subscribes to the remote change feed and applies events locally.
pub struct RealtimeListener {
    remote: Arc<dyn RemoteStore>,
    applier: RemoteApplier,
    ctx: Arc<SyncContext>,
    layout: ProductLayout,
    notifier: Arc<dyn ChangeNotifier>,
    changes_tx: broadcast::Sender<LocalChange>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for the running listener.
#[derive(Clone)]
pub struct RealtimeListenerHandle {
    changes_tx: broadcast::Sender<LocalChange>,
    shutdown_tx: mpsc::Sender<()>,
}

impl RealtimeListenerHandle {
    /// Registers for applied-change events (view refresh hook).
    pub fn subscribe_changes(&self) -> broadcast::Receiver<LocalChange> {
        self.changes_tx.subscribe()
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

impl RealtimeListener {
    /// Creates a listener with the default conflict policy.
    pub fn new(
        store: LocalStore,
        remote: Arc<dyn RemoteStore>,
        ctx: Arc<SyncContext>,
        config: &SyncConfig,
        notifier: Arc<dyn ChangeNotifier>,
    ) -> (Self, RealtimeListenerHandle) {
        Self::with_policy(store, remote, ctx, config, notifier, Arc::new(LastWriteWins))
    }

    /// Creates a listener with a custom conflict policy (must match the
    /// engine's, or the two apply paths diverge).
    pub fn with_policy(
        store: LocalStore,
        remote: Arc<dyn RemoteStore>,
        ctx: Arc<SyncContext>,
        config: &SyncConfig,
        notifier: Arc<dyn ChangeNotifier>,
        policy: Arc<dyn ConflictPolicy>,
    ) -> (Self, RealtimeListenerHandle) {
        let (changes_tx, _) = broadcast::channel(256);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let listener = RealtimeListener {
            remote,
            applier: RemoteApplier::new(store, policy),
            ctx,
            layout: config.sync.product_layout,
            notifier,
            changes_tx: changes_tx.clone(),
            shutdown_rx,
        };

        let handle = RealtimeListenerHandle {
            changes_tx,
            shutdown_tx,
        };

        (listener, handle)
    }

    /// Runs the listener loop. Spawn as a background task.
    pub async fn run(mut self) {
        let mut feed = match self.remote.subscribe() {
            Ok(feed) => feed,
            Err(e) => {
                // Silent degradation: polling covers correctness
                warn!(error = %e, "Realtime feed unavailable, relying on periodic sync");
                return;
            }
        };

        info!("Realtime listener started");

        loop {
            tokio::select! {
                event = feed.recv() => match event {
                    Ok(event) => {
                        if let Err(e) = self.handle_event(event).await {
                            warn!(error = %e, "Failed to apply realtime event");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // The next sync pass repairs anything we missed
                        warn!(missed, "Realtime feed lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Realtime feed closed");
                        break;
                    }
                },

                _ = self.shutdown_rx.recv() => {
                    info!("Realtime listener shutting down");
                    break;
                }
            }
        }

        info!("Realtime listener stopped");
    }

    /// Classifies an event by its parent path and applies it.
    async fn handle_event(&self, event: RemoteEvent) -> SyncResult<()> {
        let parent = event.parent.clone();
        let segments: Vec<&str> = parent.split('/').filter(|s| !s.is_empty()).collect();

        // Only the per-owner entity tree matters; the sales mirror and auth
        // nodes are write-only projections
        if segments.first().copied() != Some(OWNER_ROOT) {
            return Ok(());
        }

        let Some(owner_id) = segments.get(1).copied() else {
            // The root itself is the parent: a removed child is a whole-owner
            // purge (the dedicated true delete)
            if event.value.is_none() && self.ctx.scope().includes(&event.key) {
                let owner_id = event.key.clone();
                return self
                    .apply(EntityKind::Owner, &owner_id, None, &owner_id, event)
                    .await;
            }
            return Ok(());
        };

        if !self.ctx.scope().includes(owner_id) {
            return Ok(());
        }

        match (segments.len(), segments.get(2).copied()) {
            // hkd/{owner} + key "info" → the owner record
            (2, _) if event.key == "info" => {
                self.apply(EntityKind::Owner, owner_id, None, &owner_id.to_string(), event)
                    .await
            }

            // hkd/{owner}/categories + key {categoryId}
            (3, Some("categories")) => {
                let category_id = event.key.clone();
                self.apply(EntityKind::Category, owner_id, None, &category_id, event)
                    .await
            }

            // hkd/{owner}/categories/{categoryId} + key {productId} (nested)
            (4, Some("categories")) => {
                let category_id = segments[3].to_string();
                let product_id = event.key.clone();
                self.apply(
                    EntityKind::Product,
                    owner_id,
                    Some(category_id),
                    &product_id,
                    event,
                )
                .await
            }

            // hkd/{owner}/products + key {productId} (flat)
            (3, Some("products")) if self.layout == ProductLayout::Flat => {
                let product_id = event.key.clone();
                self.apply(EntityKind::Product, owner_id, None, &product_id, event)
                    .await
            }

            // hkd/{owner}/sales + key {saleId}
            (3, Some("sales")) => {
                let sale_id = event.key.clone();
                self.apply(EntityKind::Sale, owner_id, None, &sale_id, event)
                    .await
            }

            _ => Ok(()),
        }
    }

    async fn apply(
        &self,
        kind: EntityKind,
        owner_id: &str,
        category_id: Option<String>,
        id: &str,
        event: RemoteEvent,
    ) -> SyncResult<()> {
        let applied = match &event.value {
            // child_removed: hard delete + cascade
            None => match kind {
                EntityKind::Owner => {
                    self.applier.delete_owner_cascade(id).await?;
                    Applied::Deleted
                }
                EntityKind::Category => {
                    self.applier.delete_category_cascade(id).await?;
                    Applied::Deleted
                }
                EntityKind::Product => {
                    self.applier
                        .apply_product(
                            owner_id,
                            category_id.as_deref(),
                            id,
                            &payload::tombstone(hkd_core::now_millis()),
                        )
                        .await?
                }
                EntityKind::Sale => {
                    // Sales are immutable; a removed node is a purge
                    debug!(id = %id, "Ignoring sale removal event");
                    Applied::Skipped
                }
            },

            // child_added / child_changed: same LWW rule as the pull phase
            Some(value) => match kind {
                EntityKind::Owner => self.applier.apply_owner(id, value).await?,
                EntityKind::Category => {
                    let scalars = payload::scalar_fields(value);
                    let applied = self.applier.apply_category(owner_id, id, &scalars).await?;

                    // A whole-subtree write carries nested products
                    if self.layout == ProductLayout::Nested && applied != Applied::Deleted {
                        for (product_id, node) in payload::object_children(value) {
                            let product_applied = self
                                .applier
                                .apply_product(owner_id, Some(id), &product_id, &node)
                                .await?;
                            self.emit(EntityKind::Product, owner_id, &product_id, node
                                .get("name")
                                .and_then(serde_json::Value::as_str)
                                .unwrap_or(""), product_applied);
                        }
                    }

                    applied
                }
                EntityKind::Product => {
                    self.applier
                        .apply_product(owner_id, category_id.as_deref(), id, value)
                        .await?
                }
                EntityKind::Sale => self.applier.apply_sale(owner_id, id, value).await?,
            },
        };

        let label = event
            .value
            .as_ref()
            .and_then(|v| v.get("name"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or("");

        self.emit(kind, owner_id, id, label, applied);
        Ok(())
    }

    /// Fires the notification side effect and the view-refresh broadcast.
    fn emit(&self, kind: EntityKind, owner_id: &str, id: &str, label: &str, applied: Applied) {
        match applied {
            Applied::Inserted => {
                // Once per distinct new id: the local get-before-put in the
                // applier is the de-duplication check
                self.notifier.entity_added(kind, id, label);
            }
            Applied::Deleted => {
                self.notifier.entity_removed(kind, id);
            }
            Applied::Updated | Applied::Skipped => {}
        }

        if applied.changed() {
            let _ = self.changes_tx.send(LocalChange {
                kind,
                owner_id: owner_id.to_string(),
                id: id.to_string(),
                deleted: applied == Applied::Deleted,
            });
        }
    }
}
