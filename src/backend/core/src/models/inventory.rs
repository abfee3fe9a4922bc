//! Stores and products: the two levels below a warehouse.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ids::{ProductId, StoreId, WarehouseId};
use crate::error::{Result, WarehubError};
use crate::storage::StorageRef;

pub const DEFAULT_UNIT: &str = "pcs";
pub const DEFAULT_PRICE: &str = "0";

// ═══════════════════════════════════════════════════════════════════════════════
// Store
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    Plumbing,
    Construction,
    Electric,
    Chemical,
}

impl StoreType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plumbing => "plumbing",
            Self::Construction => "construction",
            Self::Electric => "electric",
            Self::Chemical => "chemical",
        }
    }
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreType {
    type Err = WarehubError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "plumbing" => Ok(Self::Plumbing),
            "construction" => Ok(Self::Construction),
            "electric" => Ok(Self::Electric),
            "chemical" => Ok(Self::Chemical),
            other => Err(WarehubError::validation(format!("Unknown store type: {}", other))),
        }
    }
}

/// A store, child of exactly one warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    pub id: StoreId,
    pub warehouse_id: WarehouseId,
    pub name: String,
    pub store_type: StoreType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStore {
    pub name: String,
    pub store_type: StoreType,
}

impl NewStore {
    pub fn new(name: impl Into<String>, store_type: StoreType) -> Self {
        Self {
            name: name.into(),
            store_type,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(WarehubError::validation("Store name cannot be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub store_type: Option<StoreType>,
}

impl StoreUpdate {
    pub fn validate(&self) -> Result<()> {
        if matches!(&self.name, Some(n) if n.trim().is_empty()) {
            return Err(WarehubError::validation("Store name cannot be empty"));
        }
        Ok(())
    }

    pub fn apply(&self, store: &mut Store) {
        if let Some(name) = &self.name {
            store.name = name.trim().to_string();
        }
        if let Some(store_type) = self.store_type {
            store.store_type = store_type;
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Product
// ═══════════════════════════════════════════════════════════════════════════════

/// Stock alert levels. Interpreted by downstream policy, not ordered here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertThresholds {
    pub low_stock: i64,
    pub out_of_stock: i64,
    pub reorder_point: i64,
    pub critical_low: i64,
    pub overstock: i64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            low_stock: 10,
            out_of_stock: 0,
            reorder_point: 20,
            critical_low: 5,
            overstock: 1000,
        }
    }
}

/// An inventory line, child of exactly one store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub store_id: StoreId,
    pub name: String,
    pub sku: String,
    pub description: String,
    pub quantity: i64,
    pub unit: String,
    /// Decimal string, e.g. `"12.50"`.
    pub price: String,
    pub image_ref: Option<StorageRef>,
    /// Derived artifact; may lag the row.
    #[serde(default, skip_serializing)]
    pub search_vector: Option<Vec<f32>>,
    pub alert_thresholds: AlertThresholds,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Text fed to the embedder.
    pub fn embedding_text(&self) -> String {
        format!("{}. {}", self.name, self.description)
    }

    pub fn has_search_vector(&self) -> bool {
        self.search_vector.as_ref().is_some_and(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub sku: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub image_ref: Option<StorageRef>,
    #[serde(default)]
    pub alert_thresholds: Option<AlertThresholds>,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, sku: impl Into<String>, quantity: i64) -> Self {
        Self {
            name: name.into(),
            sku: sku.into(),
            quantity,
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_price(mut self, price: impl Into<String>) -> Self {
        self.price = Some(price.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(WarehubError::validation("Product name cannot be empty"));
        }
        if self.sku.trim().is_empty() {
            return Err(WarehubError::validation("SKU cannot be empty"));
        }
        validate_quantity(self.quantity)?;
        if let Some(price) = &self.price {
            validate_price(price)?;
        }
        Ok(())
    }

    /// Materialise the row, filling in defaults.
    pub fn into_product(self, store_id: StoreId, now: DateTime<Utc>) -> Product {
        Product {
            id: ProductId::new(),
            store_id,
            name: self.name.trim().to_string(),
            sku: self.sku.trim().to_string(),
            description: self.description,
            quantity: self.quantity,
            unit: self
                .unit
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_UNIT.to_string()),
            price: self
                .price
                .map(|p| p.trim().to_string())
                .unwrap_or_else(|| DEFAULT_PRICE.to_string()),
            image_ref: self.image_ref,
            search_vector: None,
            alert_thresholds: self.alert_thresholds.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    /// Replaces the current image.
    #[serde(default)]
    pub image_ref: Option<StorageRef>,
    /// Drops the current image without a replacement.
    #[serde(default)]
    pub remove_image: bool,
    #[serde(default)]
    pub alert_thresholds: Option<AlertThresholds>,
}

impl ProductUpdate {
    pub fn validate(&self) -> Result<()> {
        if matches!(&self.name, Some(n) if n.trim().is_empty()) {
            return Err(WarehubError::validation("Product name cannot be empty"));
        }
        if matches!(&self.sku, Some(s) if s.trim().is_empty()) {
            return Err(WarehubError::validation("SKU cannot be empty"));
        }
        if let Some(quantity) = self.quantity {
            validate_quantity(quantity)?;
        }
        if let Some(price) = &self.price {
            validate_price(price)?;
        }
        if self.remove_image && self.image_ref.is_some() {
            return Err(WarehubError::validation(
                "Cannot set and remove the image in one update",
            ));
        }
        Ok(())
    }

    /// Whether the update changes the text the search vector is derived from.
    pub fn touches_search_text(&self) -> bool {
        self.name.is_some() || self.description.is_some()
    }

    pub fn touches_image(&self) -> bool {
        self.remove_image || self.image_ref.is_some()
    }

    /// Apply in place. Returns the image reference that was replaced, if any.
    pub fn apply(&self, product: &mut Product, now: DateTime<Utc>) -> Option<StorageRef> {
        if let Some(name) = &self.name {
            product.name = name.trim().to_string();
        }
        if let Some(sku) = &self.sku {
            product.sku = sku.trim().to_string();
        }
        if let Some(description) = &self.description {
            product.description = description.clone();
        }
        if let Some(quantity) = self.quantity {
            product.quantity = quantity;
        }
        if let Some(unit) = &self.unit {
            product.unit = unit.clone();
        }
        if let Some(price) = &self.price {
            product.price = price.trim().to_string();
        }
        if let Some(thresholds) = self.alert_thresholds {
            product.alert_thresholds = thresholds;
        }
        let replaced = if self.remove_image {
            product.image_ref.take()
        } else if let Some(image) = &self.image_ref {
            product.image_ref.replace(image.clone()).filter(|old| old != image)
        } else {
            None
        };
        product.updated_at = now;
        replaced
    }
}

fn validate_quantity(quantity: i64) -> Result<()> {
    if quantity < 0 {
        return Err(WarehubError::validation("Quantity cannot be negative")
            .with_context("quantity", quantity));
    }
    Ok(())
}

fn validate_price(price: &str) -> Result<()> {
    let trimmed = price.trim();
    let valid = !trimmed.is_empty()
        && trimmed.chars().all(|c| c.is_ascii_digit() || c == '.')
        && trimmed.matches('.').count() <= 1
        && trimmed.chars().any(|c| c.is_ascii_digit());
    if !valid {
        return Err(WarehubError::validation("Price must be a non-negative decimal")
            .with_context("price", trimmed));
    }
    Ok(())
}
