use super::{
    AssetLibrary, NewAsset, Product, ProductAttribute, ProductCatalog, StockStatus, TaxStatus,
};
use crate::error::{ImportError, ImportResult};
use crate::store::Store;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Catalog stored in the `products`, `product_meta` and `assets` tables.
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    store: Store,
}

impl SqliteCatalog {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

const PRODUCT_COLUMNS: &str = "id, name, description, sku, regular_price, sale_price, manage_stock, \
     stock_quantity, stock_status, weight, length, width, height, tax_status, status, categories, \
     tags, attributes, image_id, updated_at";

impl ProductCatalog for SqliteCatalog {
    fn find_by_meta(&self, key: &str, value: &str) -> ImportResult<Vec<i64>> {
        let conn = self.store.connect()?;
        let mut stmt = conn.prepare(
            "SELECT p.id FROM product_meta m JOIN products p ON p.id = m.product_id
             WHERE m.meta_key = ?1 AND m.meta_value = ?2
             ORDER BY p.updated_at DESC, p.id DESC",
        )?;
        let ids = stmt
            .query_map(params![key, value], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    fn get_product(&self, id: i64) -> ImportResult<Option<Product>> {
        let conn = self.store.connect()?;
        let row = conn
            .query_row(
                &format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"),
                params![id],
                read_product_row,
            )
            .optional()?;
        let Some(raw) = row else {
            return Ok(None);
        };
        Ok(Some(raw.into_product()?))
    }

    fn save_product(&self, product: &Product, meta: &[(&str, String)]) -> ImportResult<i64> {
        let mut conn = self.store.connect()?;
        let tx = conn.transaction()?;
        let now = Utc::now();
        let categories = serde_json::to_string(&product.categories)?;
        let tags = serde_json::to_string(&product.tags)?;
        let attributes = serde_json::to_string(&product.attributes)?;
        let regular_price = product.regular_price.map(|p| p.to_string());
        let sale_price = product.sale_price.map(|p| p.to_string());

        let id = match product.id {
            Some(id) => {
                let changed = tx.execute(
                    "UPDATE products SET name = ?2, description = ?3, sku = ?4, regular_price = ?5,
                         sale_price = ?6, manage_stock = ?7, stock_quantity = ?8, stock_status = ?9,
                         weight = ?10, length = ?11, width = ?12, height = ?13, tax_status = ?14,
                         status = ?15, categories = ?16, tags = ?17, attributes = ?18, image_id = ?19,
                         updated_at = ?20
                     WHERE id = ?1",
                    params![
                        id,
                        product.name,
                        product.description,
                        product.sku,
                        regular_price,
                        sale_price,
                        product.manage_stock,
                        product.stock_quantity,
                        product.stock_status.as_str(),
                        product.weight,
                        product.length,
                        product.width,
                        product.height,
                        product.tax_status.as_str(),
                        product.status,
                        categories,
                        tags,
                        attributes,
                        product.image_id,
                        now,
                    ],
                )?;
                if changed == 0 {
                    return Err(ImportError::ProductNotFound(id));
                }
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO products (name, description, sku, regular_price, sale_price,
                         manage_stock, stock_quantity, stock_status, weight, length, width, height,
                         tax_status, status, categories, tags, attributes, image_id, created_at,
                         updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                         ?17, ?18, ?19, ?19)",
                    params![
                        product.name,
                        product.description,
                        product.sku,
                        regular_price,
                        sale_price,
                        product.manage_stock,
                        product.stock_quantity,
                        product.stock_status.as_str(),
                        product.weight,
                        product.length,
                        product.width,
                        product.height,
                        product.tax_status.as_str(),
                        product.status,
                        categories,
                        tags,
                        attributes,
                        product.image_id,
                        now,
                    ],
                )?;
                tx.last_insert_rowid()
            }
        };

        {
            let mut stmt = tx.prepare(
                "INSERT INTO product_meta (product_id, meta_key, meta_value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(product_id, meta_key) DO UPDATE SET meta_value = excluded.meta_value",
            )?;
            for (key, value) in meta {
                stmt.execute(params![id, key, value])?;
            }
        }
        tx.commit()?;
        Ok(id)
    }

    fn set_image(&self, product_id: i64, asset_id: i64) -> ImportResult<()> {
        let conn = self.store.connect()?;
        let changed = conn.execute(
            "UPDATE products SET image_id = ?2, updated_at = ?3 WHERE id = ?1",
            params![product_id, asset_id, Utc::now()],
        )?;
        if changed == 0 {
            return Err(ImportError::ProductNotFound(product_id));
        }
        Ok(())
    }
}

impl AssetLibrary for SqliteCatalog {
    fn register_asset(&self, asset: &NewAsset) -> ImportResult<i64> {
        let conn = self.store.connect()?;
        let now = Utc::now();
        let id = conn.query_row(
            "INSERT INTO assets (path, title, mime_type, parent_id, width, height, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(path) DO UPDATE SET title = excluded.title, mime_type = excluded.mime_type,
                 parent_id = excluded.parent_id, width = excluded.width, height = excluded.height,
                 updated_at = excluded.updated_at
             RETURNING id",
            params![
                asset.path,
                asset.title,
                asset.mime_type,
                asset.parent_id,
                asset.width,
                asset.height,
                now
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn asset_exists(&self, asset_id: i64) -> ImportResult<bool> {
        let conn = self.store.connect()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM assets WHERE id = ?1",
                params![asset_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

/// Column values as stored; decoding the JSON and decimal columns happens
/// outside the rusqlite row callback so failures map onto `ImportError`.
struct ProductRow {
    product: Product,
    regular_price: Option<String>,
    sale_price: Option<String>,
    stock_status: String,
    tax_status: String,
    categories: String,
    tags: String,
    attributes: String,
}

fn read_product_row(row: &Row<'_>) -> rusqlite::Result<ProductRow> {
    let product = Product {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        sku: row.get(3)?,
        manage_stock: row.get(6)?,
        stock_quantity: row.get(7)?,
        weight: row.get(9)?,
        length: row.get(10)?,
        width: row.get(11)?,
        height: row.get(12)?,
        status: row.get(14)?,
        image_id: row.get(18)?,
        updated_at: row.get(19)?,
        ..Product::default()
    };
    Ok(ProductRow {
        product,
        regular_price: row.get(4)?,
        sale_price: row.get(5)?,
        stock_status: row.get(8)?,
        tax_status: row.get(13)?,
        categories: row.get(15)?,
        tags: row.get(16)?,
        attributes: row.get(17)?,
    })
}

impl ProductRow {
    fn into_product(self) -> ImportResult<Product> {
        let mut product = self.product;
        product.regular_price = parse_stored_price("regular_price", self.regular_price)?;
        product.sale_price = parse_stored_price("sale_price", self.sale_price)?;
        product.stock_status = StockStatus::parse(&self.stock_status);
        product.tax_status = TaxStatus::parse(&self.tax_status)
            .ok_or_else(|| ImportError::invalid_value("tax_status", &self.tax_status))?;
        product.categories = serde_json::from_str(&self.categories)?;
        product.tags = serde_json::from_str(&self.tags)?;
        product.attributes = serde_json::from_str::<Vec<ProductAttribute>>(&self.attributes)?;
        Ok(product)
    }
}

fn parse_stored_price(field: &str, value: Option<String>) -> ImportResult<Option<Decimal>> {
    value
        .map(|v| Decimal::from_str(&v).map_err(|_| ImportError::invalid_value(field, &v)))
        .transpose()
}
