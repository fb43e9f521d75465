//! # Remote Path Resolution
//!
//! The single source of truth for remote store paths, used by both the push
//! and pull phases. Path strings are never built anywhere else.
//!
//! ## Remote Wire Layout
//! ```text
//! hkd/
//!   {ownerId}/
//!     info                                   ← owner record
//!     categories/
//!       {categoryId}                         ← category record
//!         {productId}                        ← product (nested layout)
//!     products/
//!       {productId}                          ← product (flat layout)
//!     sales/
//!       {saleId}                             ← sale record
//! sales/
//!   {saleId}                                 ← cross-owner reporting mirror
//! auth/
//!   {phone}: { ownerId, passwordHash }       ← login lookup
//! ```
//!
//! In the nested layout a product is addressed *through its owning
//! category*; resolving a product path without a category id fails fast
//! with [`SyncError::MissingCategory`] instead of writing to a wrong path.

use crate::config::ProductLayout;
use crate::error::{SyncError, SyncResult};

/// Root node for per-owner entity trees.
pub const OWNER_ROOT: &str = "hkd";

/// Root node for the flattened cross-owner sales mirror.
pub const SALES_ROOT: &str = "sales";

/// Root node for phone → owner/password lookups.
pub const AUTH_ROOT: &str = "auth";

/// Resolves entity identities to remote store paths.
#[derive(Debug, Clone, Copy)]
pub struct PathResolver {
    layout: ProductLayout,
}

impl PathResolver {
    pub fn new(layout: ProductLayout) -> Self {
        PathResolver { layout }
    }

    pub fn layout(&self) -> ProductLayout {
        self.layout
    }

    /// `hkd/{ownerId}` - the whole owner subtree (true-delete purge only).
    pub fn owner_root(&self, owner_id: &str) -> String {
        format!("{}/{}", OWNER_ROOT, owner_id)
    }

    /// `hkd/{ownerId}/info` - the owner record itself.
    pub fn owner_info(&self, owner_id: &str) -> String {
        format!("{}/{}/info", OWNER_ROOT, owner_id)
    }

    /// `hkd/{ownerId}/categories` - the category collection node.
    pub fn categories_of(&self, owner_id: &str) -> String {
        format!("{}/{}/categories", OWNER_ROOT, owner_id)
    }

    /// `hkd/{ownerId}/categories/{categoryId}`.
    pub fn category(&self, owner_id: &str, category_id: &str) -> String {
        format!("{}/{}/categories/{}", OWNER_ROOT, owner_id, category_id)
    }

    /// The product collection node in the flat layout; `None` in the nested
    /// layout, where products live under their category nodes.
    pub fn products_of(&self, owner_id: &str) -> Option<String> {
        match self.layout {
            ProductLayout::Flat => Some(format!("{}/{}/products", OWNER_ROOT, owner_id)),
            ProductLayout::Nested => None,
        }
    }

    /// Resolves a product path.
    ///
    /// Nested layout: `hkd/{ownerId}/categories/{categoryId}/{productId}` -
    /// requires a category id. Flat layout:
    /// `hkd/{ownerId}/products/{productId}`.
    pub fn product(
        &self,
        owner_id: &str,
        category_id: Option<&str>,
        product_id: &str,
    ) -> SyncResult<String> {
        match self.layout {
            ProductLayout::Nested => {
                let category_id = category_id.filter(|c| !c.is_empty()).ok_or_else(|| {
                    SyncError::MissingCategory {
                        product_id: product_id.to_string(),
                    }
                })?;
                Ok(format!(
                    "{}/{}/categories/{}/{}",
                    OWNER_ROOT, owner_id, category_id, product_id
                ))
            }
            ProductLayout::Flat => Ok(format!(
                "{}/{}/products/{}",
                OWNER_ROOT, owner_id, product_id
            )),
        }
    }

    /// `hkd/{ownerId}/sales` - the sale collection node.
    pub fn sales_of(&self, owner_id: &str) -> String {
        format!("{}/{}/sales", OWNER_ROOT, owner_id)
    }

    /// `hkd/{ownerId}/sales/{saleId}`.
    pub fn sale(&self, owner_id: &str, sale_id: &str) -> String {
        format!("{}/{}/sales/{}", OWNER_ROOT, owner_id, sale_id)
    }

    /// `sales/{saleId}` - the cross-owner reporting mirror.
    pub fn sale_mirror(&self, sale_id: &str) -> String {
        format!("{}/{}", SALES_ROOT, sale_id)
    }

    /// `auth/{phone}` - the login lookup node.
    pub fn auth(&self, phone: &str) -> String {
        format!("{}/{}", AUTH_ROOT, phone)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_paths() {
        let r = PathResolver::new(ProductLayout::Nested);
        assert_eq!(r.owner_info("o1"), "hkd/o1/info");
        assert_eq!(r.owner_root("o1"), "hkd/o1");
        assert_eq!(r.categories_of("o1"), "hkd/o1/categories");
        assert_eq!(r.category("o1", "c1"), "hkd/o1/categories/c1");
        assert_eq!(r.sales_of("o1"), "hkd/o1/sales");
        assert_eq!(r.sale("o1", "s1"), "hkd/o1/sales/s1");
        assert_eq!(r.sale_mirror("s1"), "sales/s1");
        assert_eq!(r.auth("0912345678"), "auth/0912345678");
    }

    #[test]
    fn test_nested_product_requires_category() {
        let r = PathResolver::new(ProductLayout::Nested);

        assert_eq!(
            r.product("o1", Some("c1"), "p1").unwrap(),
            "hkd/o1/categories/c1/p1"
        );

        assert!(matches!(
            r.product("o1", None, "p1"),
            Err(SyncError::MissingCategory { .. })
        ));
        // An empty category id is as bad as a missing one
        assert!(matches!(
            r.product("o1", Some(""), "p1"),
            Err(SyncError::MissingCategory { .. })
        ));
    }

    #[test]
    fn test_flat_product_ignores_category() {
        let r = PathResolver::new(ProductLayout::Flat);

        assert_eq!(r.product("o1", None, "p1").unwrap(), "hkd/o1/products/p1");
        assert_eq!(
            r.product("o1", Some("c1"), "p1").unwrap(),
            "hkd/o1/products/p1"
        );
        assert_eq!(r.products_of("o1"), Some("hkd/o1/products".to_string()));
        assert_eq!(
            PathResolver::new(ProductLayout::Nested).products_of("o1"),
            None
        );
    }
}
