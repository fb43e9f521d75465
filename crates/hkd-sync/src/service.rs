//! # Service Operations
//!
//! The narrow operation set the (out-of-scope) UI layers call: owner
//! registration and login, catalog management, sale recording, reporting,
//! and the dedicated owner purge.
//!
//! ## Write Path
//! ```text
//! validate input → mutate local durable store → enqueue outbox entry
//! ```
//! Every mutation succeeds locally whether or not the remote store is
//! reachable; `saved_offline` on sale receipts tells the UI to show the
//! "saved offline, will sync" indicator. The sync engine drains the outbox
//! later.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use hkd_core::{
    now_millis, password, validation, Category, CoreError, EntityKind, LineItem, OutboxEntry,
    OutboxKind, Owner, OwnerStatus, PaymentMethod, Product, Sale, ValidationError,
    FALLBACK_CATEGORY_NAME,
};
use hkd_store::{LocalStore, StoreError};

use crate::context::SyncContext;
use crate::error::SyncError;
use crate::path::PathResolver;
use crate::remote::RemoteStore;

// =============================================================================
// Service Error
// =============================================================================

/// What a failed operation reports to the UI layer. Validation failures are
/// never retried; storage failures are the caller's retry decision.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

// =============================================================================
// Request / Response Shapes
// =============================================================================

/// One requested sale line, resolved against the product catalog.
#[derive(Debug, Clone)]
pub struct SaleLineRequest {
    pub product_id: String,
    pub quantity: i64,
}

/// A sale recording request.
#[derive(Debug, Clone)]
pub struct RecordSaleRequest {
    pub owner_id: String,
    pub lines: Vec<SaleLineRequest>,
    pub customer_name: String,
    pub customer_phone: String,
    pub payment_method: PaymentMethod,
    pub discount: i64,
    pub tax: i64,
}

/// Outcome of a recorded sale.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleReceipt {
    pub sale: Sale,

    /// True when the device was offline at recording time: the sale is
    /// durable locally and queued for sync.
    pub saved_offline: bool,
}

/// Partial owner update. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateOwner {
    pub name: Option<String>,
    pub address: Option<String>,
    pub password: Option<String>,
}

/// New product input.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub owner_id: String,
    /// Falls back to the owner's fallback category when absent or unknown.
    pub category_id: Option<String>,
    pub name: String,
    pub code: String,
    pub price: i64,
    pub cost: i64,
    pub stock: i64,
    pub unit: String,
    pub barcode: String,
}

/// Partial product update. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateProduct {
    pub category_id: Option<String>,
    pub name: Option<String>,
    pub code: Option<String>,
    pub price: Option<i64>,
    pub cost: Option<i64>,
    pub stock: Option<i64>,
    pub unit: Option<String>,
    pub barcode: Option<String>,
}

/// Aggregates for the cross-owner sales report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesReport {
    pub sale_count: usize,
    pub revenue: i64,
    pub discount_total: i64,
    pub items_sold: i64,
}

// =============================================================================
// HKD Service
// =============================================================================

/// The operation surface consumed by the admin dashboard and storefront
/// views.
#[derive(Clone)]
pub struct HkdService {
    store: LocalStore,
    ctx: Arc<SyncContext>,
    remote: Arc<dyn RemoteStore>,
    resolver: PathResolver,
}

impl HkdService {
    pub fn new(
        store: LocalStore,
        ctx: Arc<SyncContext>,
        remote: Arc<dyn RemoteStore>,
        resolver: PathResolver,
    ) -> Self {
        HkdService {
            store,
            ctx,
            remote,
            resolver,
        }
    }

    /// Serializes an entity and appends it to the outbox.
    async fn enqueue<T: Serialize>(&self, kind: OutboxKind, entity: &T) -> ServiceResult<()> {
        let data = serde_json::to_value(entity).map_err(SyncError::from)?;
        self.store.outbox().enqueue(&OutboxEntry::new(kind, data)).await?;
        Ok(())
    }

    // =========================================================================
    // Owner Operations
    // =========================================================================

    /// Registers a new owner: phone format and uniqueness are checked
    /// against the local secondary index before anything is written.
    pub async fn create_owner(
        &self,
        name: &str,
        phone: &str,
        address: &str,
        plain_password: &str,
    ) -> ServiceResult<Owner> {
        validation::validate_name("name", name)?;
        validation::validate_phone(phone)?;
        validation::validate_password(plain_password)?;

        let phone = phone.trim();
        if self.store.owners().find_by_phone(phone).await?.is_some() {
            return Err(CoreError::DuplicatePhone(phone.to_string()).into());
        }

        let password_hash = password::hash_password(plain_password)?;
        let owner = Owner::new(name.trim(), phone, address.trim(), password_hash);

        self.store.owners().upsert(&owner).await?;
        self.enqueue(OutboxKind::upsert(EntityKind::Owner), &owner).await?;

        // Every owner starts with the fallback category in place
        self.ensure_fallback_category(&owner.id).await?;

        info!(owner = %owner.id, name = %owner.name, "Owner created");
        Ok(owner)
    }

    /// Verifies a storefront login. Returns `None` on a wrong password or
    /// an inactive account; the caller cannot tell the two apart.
    pub async fn verify_owner_login(
        &self,
        phone: &str,
        plain_password: &str,
    ) -> ServiceResult<Option<Owner>> {
        let Some(owner) = self.store.owners().find_by_phone(phone.trim()).await? else {
            return Ok(None);
        };

        if owner.status != OwnerStatus::Active {
            return Ok(None);
        }

        if password::verify_password(plain_password, &owner.password_hash) {
            Ok(Some(owner))
        } else {
            Ok(None)
        }
    }

    /// Applies partial owner edits.
    pub async fn update_owner(&self, owner_id: &str, update: UpdateOwner) -> ServiceResult<Owner> {
        let mut owner = self
            .store
            .owners()
            .get(owner_id)
            .await?
            .ok_or_else(|| CoreError::OwnerNotFound(owner_id.to_string()))?;

        if let Some(name) = update.name {
            validation::validate_name("name", &name)?;
            owner.name = name.trim().to_string();
        }

        if let Some(address) = update.address {
            owner.address = address.trim().to_string();
        }

        if let Some(plain) = update.password {
            validation::validate_password(&plain)?;
            owner.password_hash = password::hash_password(&plain)?;
        }

        owner.last_updated = now_millis();
        owner.synced = false;

        self.store.owners().upsert(&owner).await?;
        self.enqueue(OutboxKind::upsert(EntityKind::Owner), &owner).await?;

        Ok(owner)
    }

    /// Flips an owner between active and inactive (admin action).
    pub async fn toggle_owner_status(&self, owner_id: &str) -> ServiceResult<OwnerStatus> {
        let mut owner = self
            .store
            .owners()
            .get(owner_id)
            .await?
            .ok_or_else(|| CoreError::OwnerNotFound(owner_id.to_string()))?;

        owner.status = owner.status.toggled();
        owner.last_updated = now_millis();
        owner.synced = false;

        self.store.owners().upsert(&owner).await?;
        self.enqueue(OutboxKind::upsert(EntityKind::Owner), &owner).await?;

        info!(owner = %owner_id, status = ?owner.status, "Owner status toggled");
        Ok(owner.status)
    }

    /// The dedicated "true delete": hard-removes the owner's remote subtree
    /// and auth node, then the local records. Requires the remote store to
    /// be reachable; normal flows never use this.
    pub async fn purge_owner(&self, owner_id: &str) -> ServiceResult<()> {
        let owner = self
            .store
            .owners()
            .get_any(owner_id)
            .await?
            .ok_or_else(|| CoreError::OwnerNotFound(owner_id.to_string()))?;

        warn!(owner = %owner_id, "Purging owner (true delete)");

        self.remote.remove(&self.resolver.owner_root(owner_id)).await?;
        self.remote.remove(&self.resolver.auth(&owner.phone)).await?;

        self.store.products().delete_by_owner(owner_id).await?;
        self.store.categories().delete_by_owner(owner_id).await?;
        self.store.sales().delete_by_owner(owner_id).await?;
        self.store.owners().delete(owner_id).await?;

        Ok(())
    }

    // =========================================================================
    // Category Operations
    // =========================================================================

    /// Adds a category for an owner.
    pub async fn add_category(&self, owner_id: &str, name: &str) -> ServiceResult<Category> {
        validation::validate_name("category name", name)?;

        self.store
            .owners()
            .get(owner_id)
            .await?
            .ok_or_else(|| CoreError::OwnerNotFound(owner_id.to_string()))?;

        if let Some(existing) = self.store.categories().find_by_name(owner_id, name.trim()).await? {
            // Idempotent add: the existing category is the result
            return Ok(existing);
        }

        let category = Category::new(owner_id, name.trim());
        self.store.categories().upsert(&category).await?;
        self.enqueue(OutboxKind::upsert(EntityKind::Category), &category).await?;

        Ok(category)
    }

    /// Guarantees the fallback category ("Khác") exists for an owner,
    /// creating and enqueuing it if missing.
    pub async fn ensure_fallback_category(&self, owner_id: &str) -> ServiceResult<Category> {
        if let Some(existing) = self
            .store
            .categories()
            .find_by_name(owner_id, FALLBACK_CATEGORY_NAME)
            .await?
        {
            return Ok(existing);
        }

        let category = Category::new(owner_id, FALLBACK_CATEGORY_NAME);
        self.store.categories().upsert(&category).await?;
        self.enqueue(OutboxKind::upsert(EntityKind::Category), &category).await?;

        Ok(category)
    }

    /// Tombstones a category and every product in it, and enqueues the
    /// deletions. Other devices cascade when they observe the tombstone.
    pub async fn delete_category(&self, category_id: &str) -> ServiceResult<()> {
        let category = self
            .store
            .categories()
            .get(category_id)
            .await?
            .ok_or_else(|| CoreError::CategoryNotFound(category_id.to_string()))?;

        if category.name == FALLBACK_CATEGORY_NAME {
            return Err(ValidationError::InvalidFormat {
                field: "category".to_string(),
                reason: format!("the '{}' category cannot be deleted", FALLBACK_CATEGORY_NAME),
            }
            .into());
        }

        let now = now_millis();

        // Products first, so a crash mid-way leaves orphans that the
        // category tombstone's cascade still covers
        for product in self.store.products().get_all_for_category(category_id).await? {
            self.store.products().tombstone(&product.id, now).await?;
            let mut tombstoned = product.clone();
            tombstoned.deleted = true;
            tombstoned.deleted_at = Some(now);
            tombstoned.last_updated = now;
            self.enqueue(OutboxKind::delete(EntityKind::Product), &tombstoned).await?;
        }

        self.store.categories().tombstone(category_id, now).await?;
        let mut tombstoned = category.clone();
        tombstoned.deleted = true;
        tombstoned.deleted_at = Some(now);
        tombstoned.last_updated = now;
        self.enqueue(OutboxKind::delete(EntityKind::Category), &tombstoned).await?;

        info!(category = %category_id, "Category deleted");
        Ok(())
    }

    /// Lists an owner's live categories.
    pub async fn categories(&self, owner_id: &str) -> ServiceResult<Vec<Category>> {
        Ok(self.store.categories().get_all_for_owner(owner_id).await?)
    }

    // =========================================================================
    // Product Operations
    // =========================================================================

    /// Adds a product. An unknown or absent category falls back to the
    /// owner's "Khác" category rather than failing the add.
    pub async fn add_product(&self, new: NewProduct) -> ServiceResult<Product> {
        validation::validate_name("product name", &new.name)?;
        validation::validate_price("price", new.price)?;
        validation::validate_price("cost", new.cost)?;
        validation::validate_stock(new.stock)?;

        self.store
            .owners()
            .get(&new.owner_id)
            .await?
            .ok_or_else(|| CoreError::OwnerNotFound(new.owner_id.clone()))?;

        let known_category = match &new.category_id {
            Some(id) => self.store.categories().get(id).await?,
            None => None,
        };
        let category_id = match known_category {
            Some(category) => category.id,
            None => self.ensure_fallback_category(&new.owner_id).await?.id,
        };

        let now = now_millis();
        let product = Product {
            id: Uuid::new_v4().to_string(),
            owner_id: new.owner_id,
            category_id,
            name: new.name.trim().to_string(),
            code: new.code.trim().to_string(),
            price: new.price,
            cost: new.cost,
            stock: new.stock,
            unit: new.unit.trim().to_string(),
            barcode: new.barcode.trim().to_string(),
            created_at: now,
            last_updated: now,
            deleted: false,
            deleted_at: None,
            synced: false,
        };

        self.store.products().upsert(&product).await?;
        self.enqueue(OutboxKind::upsert(EntityKind::Product), &product).await?;

        Ok(product)
    }

    /// Applies partial product edits.
    pub async fn update_product(
        &self,
        product_id: &str,
        update: UpdateProduct,
    ) -> ServiceResult<Product> {
        let mut product = self
            .store
            .products()
            .get(product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

        if let Some(category_id) = update.category_id {
            self.store
                .categories()
                .get(&category_id)
                .await?
                .ok_or_else(|| CoreError::CategoryNotFound(category_id.clone()))?;
            product.category_id = category_id;
        }

        if let Some(name) = update.name {
            validation::validate_name("product name", &name)?;
            product.name = name.trim().to_string();
        }
        if let Some(code) = update.code {
            product.code = code.trim().to_string();
        }
        if let Some(price) = update.price {
            validation::validate_price("price", price)?;
            product.price = price;
        }
        if let Some(cost) = update.cost {
            validation::validate_price("cost", cost)?;
            product.cost = cost;
        }
        if let Some(stock) = update.stock {
            validation::validate_stock(stock)?;
            product.stock = stock;
        }
        if let Some(unit) = update.unit {
            product.unit = unit.trim().to_string();
        }
        if let Some(barcode) = update.barcode {
            product.barcode = barcode.trim().to_string();
        }

        product.last_updated = now_millis();
        product.synced = false;

        self.store.products().upsert(&product).await?;
        self.enqueue(OutboxKind::upsert(EntityKind::Product), &product).await?;

        Ok(product)
    }

    /// Corrects a product's stock by a signed delta, clamped at zero.
    pub async fn adjust_stock(&self, product_id: &str, delta: i64) -> ServiceResult<Product> {
        let mut product = self
            .store
            .products()
            .get(product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

        product.stock = (product.stock + delta).max(0);
        product.last_updated = now_millis();
        product.synced = false;

        self.store.products().upsert(&product).await?;
        self.enqueue(OutboxKind::upsert(EntityKind::Product), &product).await?;

        Ok(product)
    }

    /// Tombstones a product and enqueues the deletion.
    pub async fn delete_product(&self, product_id: &str) -> ServiceResult<()> {
        let product = self
            .store
            .products()
            .get(product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

        let now = now_millis();
        self.store.products().tombstone(product_id, now).await?;

        let mut tombstoned = product;
        tombstoned.deleted = true;
        tombstoned.deleted_at = Some(now);
        tombstoned.last_updated = now;
        self.enqueue(OutboxKind::delete(EntityKind::Product), &tombstoned).await?;

        Ok(())
    }

    /// Lists an owner's live products.
    pub async fn products(&self, owner_id: &str) -> ServiceResult<Vec<Product>> {
        Ok(self.store.products().get_all_for_owner(owner_id).await?)
    }

    // =========================================================================
    // Sale Operations
    // =========================================================================

    /// Records a sale.
    ///
    /// Stock sufficiency is validated for every line *before* any mutation:
    /// an insufficient line rejects the whole sale untouched. Valid sales
    /// decrement stock (floored at zero), persist locally, and enqueue the
    /// sale plus every touched product.
    pub async fn record_sale(&self, request: RecordSaleRequest) -> ServiceResult<SaleReceipt> {
        if request.lines.is_empty() {
            return Err(ValidationError::Required {
                field: "items".to_string(),
            }
            .into());
        }

        let owner = self
            .store
            .owners()
            .get(&request.owner_id)
            .await?
            .ok_or_else(|| CoreError::OwnerNotFound(request.owner_id.clone()))?;

        validation::validate_price("discount", request.discount)?;
        validation::validate_price("tax", request.tax)?;

        // Validation pass: no mutation until every line clears
        let mut resolved = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            validation::validate_quantity(line.quantity)?;

            let product = self
                .store
                .products()
                .get(&line.product_id)
                .await?
                .filter(|p| p.owner_id == request.owner_id)
                .ok_or_else(|| CoreError::ProductNotFound(line.product_id.clone()))?;

            if product.stock < line.quantity {
                return Err(CoreError::InsufficientStock {
                    name: product.name.clone(),
                    available: product.stock,
                    requested: line.quantity,
                }
                .into());
            }

            resolved.push((product, line.quantity));
        }

        // Commit pass
        let now = now_millis();
        let mut items = Vec::with_capacity(resolved.len());
        let mut subtotal = 0;

        for (product, quantity) in &resolved {
            let line_total = product.price * quantity;
            subtotal += line_total;

            // All string fields present, empty rather than absent
            items.push(LineItem {
                product_id: product.id.clone(),
                code: product.code.clone(),
                name: product.name.clone(),
                original_name: product.name.clone(),
                price: product.price,
                cost: product.cost,
                quantity: *quantity,
                unit: product.unit.clone(),
                total: line_total,
            });

            self.store
                .products()
                .decrement_stock(&product.id, *quantity, now)
                .await?;
        }

        let total = (subtotal - request.discount + request.tax).max(0);
        let sale = Sale {
            id: Uuid::new_v4().to_string(),
            owner_id: owner.id.clone(),
            owner_name: owner.name.clone(),
            customer_name: request.customer_name.trim().to_string(),
            customer_phone: request.customer_phone.trim().to_string(),
            items,
            subtotal,
            discount: request.discount,
            tax: request.tax,
            total,
            payment_method: request.payment_method,
            timestamp: now,
            last_updated: now,
            synced: false,
        };

        self.store.sales().upsert(&sale).await?;
        self.enqueue(OutboxKind::upsert(EntityKind::Sale), &sale).await?;

        // Stock changes ride along so other devices converge
        for (product, _) in &resolved {
            if let Some(updated) = self.store.products().get(&product.id).await? {
                self.enqueue(OutboxKind::upsert(EntityKind::Product), &updated).await?;
            }
        }

        let saved_offline = !self.ctx.is_online();
        info!(
            sale = %sale.id,
            total = sale.total,
            saved_offline,
            "Sale recorded"
        );

        Ok(SaleReceipt { sale, saved_offline })
    }

    /// Aggregated sales report over a time window, across all owners or
    /// scoped to one.
    pub async fn sales_report(
        &self,
        owner_id: Option<&str>,
        from: i64,
        to: i64,
    ) -> ServiceResult<SalesReport> {
        let sales = self.store.sales().get_range(owner_id, from, to).await?;

        let mut report = SalesReport {
            sale_count: sales.len(),
            revenue: 0,
            discount_total: 0,
            items_sold: 0,
        };

        for sale in &sales {
            report.revenue += sale.total;
            report.discount_total += sale.discount;
            report.items_sold += sale.items.iter().map(|i| i.quantity).sum::<i64>();
        }

        Ok(report)
    }

    /// Lists an owner's sales, newest first.
    pub async fn sales(&self, owner_id: &str) -> ServiceResult<Vec<Sale>> {
        Ok(self.store.sales().get_all_for_owner(owner_id).await?)
    }
}
