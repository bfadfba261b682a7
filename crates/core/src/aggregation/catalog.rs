//! Catalog lookup used to decorate aggregation output with display names.
//!
//! The catalog is never consulted by mutations. A failing lookup only drops
//! the display fields it would have filled.

use std::collections::HashMap;

use async_trait::async_trait;
use stockledger_shared::types::{ProductVariantId, SupplierId};
use thiserror::Error;

/// Display data for a product variant.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProductInfo {
    /// Product name.
    pub name: String,
    /// Unit of measure, e.g. "pcs" or "kg".
    pub unit: Option<String>,
    /// Category name.
    pub category: Option<String>,
}

/// Catalog lookup failure.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog could not be reached.
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

/// Read-only source of product and supplier names.
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    /// Display data for a product variant, if known.
    async fn product(&self, id: ProductVariantId) -> Result<Option<ProductInfo>, CatalogError>;

    /// Supplier name, if known.
    async fn supplier_name(&self, id: SupplierId) -> Result<Option<String>, CatalogError>;
}

/// A catalog that knows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCatalog;

#[async_trait]
impl CatalogLookup for NoCatalog {
    async fn product(&self, _id: ProductVariantId) -> Result<Option<ProductInfo>, CatalogError> {
        Ok(None)
    }

    async fn supplier_name(&self, _id: SupplierId) -> Result<Option<String>, CatalogError> {
        Ok(None)
    }
}

/// A fixed in-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    products: HashMap<ProductVariantId, ProductInfo>,
    suppliers: HashMap<SupplierId, String>,
}

impl StaticCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a product.
    #[must_use]
    pub fn with_product(mut self, id: ProductVariantId, info: ProductInfo) -> Self {
        self.products.insert(id, info);
        self
    }

    /// Adds a supplier.
    #[must_use]
    pub fn with_supplier(mut self, id: SupplierId, name: impl Into<String>) -> Self {
        self.suppliers.insert(id, name.into());
        self
    }
}

#[async_trait]
impl CatalogLookup for StaticCatalog {
    async fn product(&self, id: ProductVariantId) -> Result<Option<ProductInfo>, CatalogError> {
        Ok(self.products.get(&id).cloned())
    }

    async fn supplier_name(&self, id: SupplierId) -> Result<Option<String>, CatalogError> {
        Ok(self.suppliers.get(&id).cloned())
    }
}
