//! Product resolution by barcode
//!
//! The pipeline only needs "barcode in, product or miss out". Two
//! implementations are provided:
//! - [`CatalogResolver`]: in-memory catalog, optionally loaded from JSON
//! - [`HttpResolver`]: inventory service lookup over HTTP
//!
//! The HTTP resolver parses responses into a typed record and validates it.
//! Any shape mismatch or transport problem is treated as a miss.

use async_trait::async_trait;
use posw_common::scan::ScannedProduct;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Looks up catalog products by barcode
#[async_trait]
pub trait ProductResolver: Send + Sync {
    /// Resolve a barcode key; `None` means not found
    async fn resolve_by_barcode(&self, key: &str) -> Option<ScannedProduct>;
}

/// In-memory product catalog keyed by barcode
#[derive(Debug, Default, Clone)]
pub struct CatalogResolver {
    products: HashMap<String, ScannedProduct>,
}

impl CatalogResolver {
    pub fn new(products: impl IntoIterator<Item = ScannedProduct>) -> Self {
        Self {
            products: products
                .into_iter()
                .map(|p| (p.barcode.clone(), p))
                .collect(),
        }
    }

    /// Parse a JSON array of products
    pub fn from_json_str(json: &str) -> Result<Self> {
        let products: Vec<ScannedProduct> = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid catalog JSON: {}", e)))?;
        Ok(Self::new(products))
    }

    /// Load a JSON catalog file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_json_str(&content)?;
        info!("Loaded {} products from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    pub fn insert(&mut self, product: ScannedProduct) {
        self.products.insert(product.barcode.clone(), product);
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

#[async_trait]
impl ProductResolver for CatalogResolver {
    async fn resolve_by_barcode(&self, key: &str) -> Option<ScannedProduct> {
        self.products.get(key).cloned()
    }
}

/// Product record as returned by the inventory service
#[derive(Debug, Deserialize)]
struct InventoryProduct {
    barcode: String,
    name: String,
    price: f64,
    stock: i64,
    #[serde(default)]
    category: Option<String>,
}

impl InventoryProduct {
    /// Validate and convert; `None` for records that cannot be sold
    fn into_product(self, requested: &str) -> Option<ScannedProduct> {
        if self.barcode.trim().is_empty() || self.name.trim().is_empty() {
            return None;
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return None;
        }
        if self.barcode != requested {
            debug!(
                "Inventory returned barcode {} for key {}",
                self.barcode, requested
            );
        }

        Some(ScannedProduct {
            barcode: self.barcode,
            name: self.name,
            price: self.price,
            stock: self.stock,
            category: self.category.unwrap_or_default(),
            batch: None,
            expiry_date: None,
            manufacturing_date: None,
            weight: None,
        })
    }
}

/// Inventory service client
///
/// Issues `GET {base_url}/products/barcode/{key}`.
#[derive(Debug, Clone)]
pub struct HttpResolver {
    client: reqwest::Client,
    base_url: reqwest::Url,
}

impl HttpResolver {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = reqwest::Url::parse(base_url)
            .map_err(|e| Error::Config(format!("Invalid inventory URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "Inventory URL {} cannot be used as a base",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Resolver(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    fn lookup_url(&self, key: &str) -> Option<reqwest::Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().ok()?;
            segments.pop_if_empty().extend(["products", "barcode", key]);
        }
        Some(url)
    }
}

#[async_trait]
impl ProductResolver for HttpResolver {
    async fn resolve_by_barcode(&self, key: &str) -> Option<ScannedProduct> {
        let url = self.lookup_url(key)?;

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Inventory lookup for {} failed: {}", key, e);
                return None;
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!("Inventory has no product for {}", key);
            return None;
        }
        if !status.is_success() {
            warn!("Inventory lookup for {} returned HTTP {}", key, status);
            return None;
        }

        match response.json::<InventoryProduct>().await {
            Ok(record) => {
                let product = record.into_product(key);
                if product.is_none() {
                    warn!("Inventory record for {} failed validation", key);
                }
                product
            }
            Err(e) => {
                warn!("Inventory response for {} has unexpected shape: {}", key, e);
                None
            }
        }
    }
}
