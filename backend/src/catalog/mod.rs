//! Product and media records the importer writes into.
//!
//! The pipeline only talks to the catalog through [`ProductCatalog`] and
//! [`AssetLibrary`]; [`sqlite::SqliteCatalog`] is the implementation backed by
//! the importer database.

pub mod sqlite;

use crate::error::ImportResult;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Metadata key holding the raw external identifier of a product.
pub const RAW_ID_META: &str = "_raw_id";
/// Metadata key holding the complete source row as a JSON object.
pub const RAW_DATA_META: &str = "_raw_data";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockStatus {
    InStock,
    OutOfStock,
}

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::InStock => "instock",
            StockStatus::OutOfStock => "outofstock",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "outofstock" => StockStatus::OutOfStock,
            _ => StockStatus::InStock,
        }
    }

    /// A tracked quantity of zero or less means out of stock.
    pub fn for_quantity(quantity: Option<i64>) -> Self {
        match quantity {
            Some(q) if q <= 0 => StockStatus::OutOfStock,
            _ => StockStatus::InStock,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxStatus {
    Taxable,
    Shipping,
    None,
}

impl TaxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxStatus::Taxable => "taxable",
            TaxStatus::Shipping => "shipping",
            TaxStatus::None => "none",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "taxable" => Some(TaxStatus::Taxable),
            "shipping" => Some(TaxStatus::Shipping),
            "none" => Some(TaxStatus::None),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductAttribute {
    pub name: String,
    pub options: Vec<String>,
    pub visible: bool,
}

/// A catalog product. `id` is `None` until the product has been saved.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: Option<i64>,
    pub name: String,
    pub description: String,
    pub sku: String,
    pub regular_price: Option<Decimal>,
    pub sale_price: Option<Decimal>,
    pub manage_stock: bool,
    pub stock_quantity: Option<i64>,
    pub stock_status: StockStatus,
    pub weight: Option<f64>,
    pub length: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub tax_status: TaxStatus,
    pub status: String,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub attributes: Vec<ProductAttribute>,
    pub image_id: Option<i64>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for Product {
    fn default() -> Self {
        Self {
            id: None,
            name: String::new(),
            description: String::new(),
            sku: String::new(),
            regular_price: None,
            sale_price: None,
            manage_stock: true,
            stock_quantity: None,
            stock_status: StockStatus::InStock,
            weight: None,
            length: None,
            width: None,
            height: None,
            tax_status: TaxStatus::Taxable,
            status: "publish".to_string(),
            categories: Vec::new(),
            tags: Vec::new(),
            attributes: Vec::new(),
            image_id: None,
            updated_at: None,
        }
    }
}

/// A processed image ready to be registered in the media library.
#[derive(Debug, Clone)]
pub struct NewAsset {
    pub path: String,
    pub title: String,
    pub mime_type: String,
    pub parent_id: Option<i64>,
    pub width: u32,
    pub height: u32,
}

pub trait ProductCatalog {
    /// Ids of products whose metadata `key` equals `value` exactly, most
    /// recently updated first (ties: highest id first).
    fn find_by_meta(&self, key: &str, value: &str) -> ImportResult<Vec<i64>>;

    fn get_product(&self, id: i64) -> ImportResult<Option<Product>>;

    /// Creates the product when `id` is `None`, otherwise updates it, and
    /// upserts `meta` in the same transaction. Returns the product id.
    fn save_product(&self, product: &Product, meta: &[(&str, String)]) -> ImportResult<i64>;

    fn set_image(&self, product_id: i64, asset_id: i64) -> ImportResult<()>;
}

pub trait AssetLibrary {
    /// Registers the asset, reusing the existing row for the same path.
    fn register_asset(&self, asset: &NewAsset) -> ImportResult<i64>;

    fn asset_exists(&self, asset_id: i64) -> ImportResult<bool>;
}
