//! Background import worker.
//!
//! Each drain claims queued rows oldest first and turns them into catalog
//! products. Row-level problems are recorded against the run and never stop
//! the drain; only store failures propagate, leaving the claimed item in
//! `processing` until the next startup returns it to the queue.

use super::batch::QueuedRow;
use super::images::{ImageAssociator, ImageOutcome};
use super::mapper::MappedRow;
use super::progress::{LogLevel, ProgressTracker};
use super::resolver::{IdentifierResolver, Resolution};
use crate::catalog::{
    AssetLibrary, Product, ProductAttribute, ProductCatalog, StockStatus, TaxStatus,
    RAW_DATA_META, RAW_ID_META,
};
use crate::error::{ImportError, ImportResult};
use crate::store::queue::QueueItem;
use crate::store::runs::RunDelta;
use crate::store::Store;
use chrono::Utc;
use common::jobs::ItemState;
use common::model::settings::ImportSettings;
use log::{debug, error};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Upper bounds for a single drain.
#[derive(Debug, Clone, Copy)]
pub struct DrainBudget {
    pub max_items: usize,
    pub max_duration: Duration,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub claimed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items dropped because their run is gone or already finished.
    pub discarded: usize,
}

pub struct ImportWorker<C> {
    store: Store,
    tracker: ProgressTracker,
    catalog: C,
}

impl<C: ProductCatalog + AssetLibrary> ImportWorker<C> {
    pub fn new(store: Store, catalog: C) -> Self {
        Self {
            tracker: ProgressTracker::new(store.clone()),
            store,
            catalog,
        }
    }

    pub fn drain(&self, budget: DrainBudget) -> ImportResult<DrainReport> {
        let started = Instant::now();
        let mut report = DrainReport::default();
        while report.claimed < budget.max_items && started.elapsed() < budget.max_duration {
            let Some(item) = self.store.claim_next_item(Utc::now())? else {
                break;
            };
            report.claimed += 1;
            match self.process_item(item)? {
                Some(ItemState::Succeeded) => report.succeeded += 1,
                Some(_) => report.failed += 1,
                None => report.discarded += 1,
            }
        }
        if report.claimed > 0 {
            debug!("drain finished in {:.2?}: {:?}", started.elapsed(), report);
        }
        Ok(report)
    }

    /// Processes one claimed item and removes it from the queue. Returns
    /// `None` when the item was dropped without touching its run.
    pub fn process_item(&self, item: QueueItem) -> ImportResult<Option<ItemState>> {
        let run_id = item.run_id.as_str();
        let Some(run) = self.tracker.load(run_id)? else {
            let dropped = self.store.discard_run_items(run_id)?;
            self.store.finish_item(item.id)?;
            error!(
                "run {} no longer exists; dropped {} queued rows",
                run_id,
                dropped + 1
            );
            return Ok(None);
        };
        if run.status.is_terminal() {
            self.store.finish_item(item.id)?;
            debug!("run {} is {}; dropping item {}", run_id, run.status.as_str(), item.id);
            return Ok(None);
        }

        let state = match serde_json::from_str::<QueuedRow>(&item.payload) {
            Ok(row) => match self.import_row(&run.settings, &row) {
                Ok(product_id) => {
                    self.tracker.update(run_id, RunDelta::processed(1))?;
                    debug!("run {}: row {} saved as product {}", run_id, row.row_number, product_id);
                    ItemState::Succeeded
                }
                Err(e) => {
                    self.tracker.update(run_id, RunDelta::errors(1))?;
                    let message = format!(
                        "row {} (raw id {}): {}",
                        row.row_number,
                        row.mapped.raw_id().unwrap_or("-"),
                        e
                    );
                    self.tracker.log(run_id, LogLevel::Error, &message);
                    ItemState::Failed(message)
                }
            },
            Err(e) => {
                self.tracker.update(run_id, RunDelta::errors(1))?;
                let message = format!("queue item {} is not a valid row: {}", item.id, e);
                self.tracker.log(run_id, LogLevel::Error, &message);
                ItemState::Failed(message)
            }
        };

        self.store.finish_item(item.id)?;
        self.tracker.try_complete(run_id)?;
        Ok(Some(state))
    }

    /// Creates or updates the product for one row and attaches its image.
    fn import_row(&self, settings: &ImportSettings, row: &QueuedRow) -> ImportResult<i64> {
        let raw_id = row
            .mapped
            .raw_id()
            .ok_or_else(|| ImportError::invalid_value(RAW_ID_META, ""))?;

        let resolution = IdentifierResolver::new(&self.catalog).resolve(raw_id)?;
        let existing = match resolution {
            Resolution::Existing(id) => Some(
                self.catalog
                    .get_product(id)?
                    .ok_or(ImportError::ProductNotFound(id))?,
            ),
            Resolution::New => None,
        };
        let product = build_product(&row.mapped, existing)?;
        let raw_data = serde_json::to_string(&row.raw)?;
        let product_id = self.catalog.save_product(
            &product,
            &[(RAW_ID_META, raw_id.to_string()), (RAW_DATA_META, raw_data)],
        )?;

        match ImageAssociator::new(&self.catalog, settings).associate(raw_id, product_id)? {
            ImageOutcome::Missing => debug!("no image found for {}", raw_id),
            ImageOutcome::Attached { path, .. } => {
                debug!("attached {} to product {}", path.display(), product_id)
            }
            ImageOutcome::Override { asset_id } => {
                debug!("attached override asset {} to product {}", asset_id, product_id)
            }
        }
        Ok(product_id)
    }
}

/// Applies the mapped values onto `existing` (or a new product). Targets that
/// the file does not provide keep their current values.
pub fn build_product(mapped: &MappedRow, existing: Option<Product>) -> ImportResult<Product> {
    let mut product = existing.unwrap_or_default();

    if let Some(name) = mapped.get("name") {
        product.name = name.trim().to_string();
    }
    if let Some(description) = mapped.get("description") {
        product.description = description.to_string();
    }
    if let Some(sku) = mapped.get("sku") {
        product.sku = sku.trim().to_string();
    }
    if let Some(price) = mapped.get("regular_price") {
        product.regular_price = parse_price("regular_price", price)?;
    }
    if let Some(price) = mapped.get("sale_price") {
        product.sale_price = parse_price("sale_price", price)?;
    }
    product.manage_stock = true;
    if let Some(qty) = mapped.get("stock_quantity") {
        product.stock_quantity = parse_stock(qty)?;
    }
    product.stock_status = StockStatus::for_quantity(product.stock_quantity);
    if let Some(weight) = mapped.get("weight") {
        product.weight = parse_measure("weight", weight)?;
    }
    for (member, value) in mapped.group("dimensions") {
        let parsed = parse_measure(member, value)?;
        match member {
            "length" => product.length = parsed,
            "width" => product.width = parsed,
            "height" => product.height = parsed,
            _ => {}
        }
    }
    if let Some(tax) = mapped.get("tax_status") {
        product.tax_status = match tax.trim() {
            "" => TaxStatus::None,
            value => TaxStatus::parse(value)
                .ok_or_else(|| ImportError::invalid_value("tax_status", value))?,
        };
    }
    if let Some(categories) = mapped.get("categories") {
        product.categories = split_terms(categories);
    }
    if let Some(tags) = mapped.get("tags") {
        product.tags = split_terms(tags);
    }
    if mapped.group("attributes").next().is_some() {
        product.attributes = mapped
            .group("attributes")
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(key, value)| ProductAttribute {
                name: attribute_label(key),
                options: vec![value.trim().to_string()],
                visible: true,
            })
            .collect();
    }
    product.status = "publish".to_string();
    Ok(product)
}

/// Accepts `12.50` and `12,50`; blank means no price.
fn parse_price(field: &str, value: &str) -> ImportResult<Option<Decimal>> {
    let normalized = value.trim().replace(',', ".");
    if normalized.is_empty() {
        return Ok(None);
    }
    Decimal::from_str(&normalized)
        .map(Some)
        .map_err(|_| ImportError::invalid_value(field, value))
}

/// Whole units; a decimal quantity is truncated toward zero.
fn parse_stock(value: &str) -> ImportResult<Option<i64>> {
    let normalized = value.trim().replace(',', ".");
    if normalized.is_empty() {
        return Ok(None);
    }
    if let Ok(qty) = normalized.parse::<i64>() {
        return Ok(Some(qty));
    }
    Decimal::from_str(&normalized)
        .ok()
        .and_then(|d| d.trunc().to_i64())
        .map(Some)
        .ok_or_else(|| ImportError::invalid_value("stock_quantity", value))
}

fn parse_measure(field: &str, value: &str) -> ImportResult<Option<f64>> {
    let normalized = value.trim().replace(',', ".");
    if normalized.is_empty() {
        return Ok(None);
    }
    normalized
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(Some)
        .ok_or_else(|| ImportError::invalid_value(field, value))
}

fn split_terms(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(str::to_string)
        .collect()
}

/// `item_type` → `Item Type`.
fn attribute_label(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::sqlite::SqliteCatalog;
    use crate::pipeline::mapper::RawRow;
    use crate::store::testing::temp_store;
    use common::jobs::RunStatus;

    fn mapped(pairs: &[(&str, &str)]) -> MappedRow {
        MappedRow(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn queued(n: u64, pairs: &[(&str, &str)]) -> String {
        serde_json::to_string(&QueuedRow {
            row_number: n,
            raw: RawRow::new(),
            mapped: mapped(pairs),
        })
        .unwrap()
    }

    fn budget() -> DrainBudget {
        DrainBudget {
            max_items: 100,
            max_duration: Duration::from_secs(30),
        }
    }

    fn start_run(store: &Store, dir: &tempfile::TempDir, run_id: &str) -> ProgressTracker {
        let tracker = ProgressTracker::new(store.clone());
        let settings = ImportSettings {
            source_image_dir: dir.path().join("raw"),
            asset_dir: dir.path().join("assets"),
            ..ImportSettings::default()
        };
        tracker.start(run_id, "a.csv", None, settings).unwrap();
        tracker
    }

    #[test]
    fn comma_decimal_prices_are_accepted() {
        let product = build_product(&mapped(&[("regular_price", "12,50")]), None).unwrap();
        assert_eq!(product.regular_price, Some(Decimal::new(1250, 2)));
        assert_eq!(product.regular_price.unwrap().to_string(), "12.50");
    }

    #[test]
    fn stock_and_measures_are_parsed() {
        let product = build_product(
            &mapped(&[
                ("stock_quantity", "7.9"),
                ("weight", "0,25"),
                ("dimensions.length", "10"),
                ("tax_status", "none"),
            ]),
            None,
        )
        .unwrap();
        assert_eq!(product.stock_quantity, Some(7));
        assert_eq!(product.stock_status, StockStatus::InStock);
        assert_eq!(product.weight, Some(0.25));
        assert_eq!(product.length, Some(10.0));
        assert_eq!(product.tax_status, TaxStatus::None);

        let empty = build_product(&mapped(&[("stock_quantity", "0")]), None).unwrap();
        assert_eq!(empty.stock_status, StockStatus::OutOfStock);
    }

    #[test]
    fn invalid_numbers_are_item_errors() {
        let err = build_product(&mapped(&[("regular_price", "abc")]), None).unwrap_err();
        assert!(matches!(err, ImportError::InvalidValue { field, .. } if field == "regular_price"));
        assert!(build_product(&mapped(&[("stock_quantity", "lots")]), None).is_err());
    }

    #[test]
    fn attributes_terms_and_labels() {
        let product = build_product(
            &mapped(&[
                ("categories", "Tools, Hardware ,"),
                ("attributes.item_type", "Bolt"),
                ("attributes.size", ""),
            ]),
            None,
        )
        .unwrap();
        assert_eq!(product.categories, vec!["Tools", "Hardware"]);
        assert_eq!(product.attributes.len(), 1);
        assert_eq!(product.attributes[0].name, "Item Type");
        assert_eq!(product.attributes[0].options, vec!["Bolt"]);
    }

    #[test]
    fn update_keeps_fields_the_file_does_not_provide() {
        let existing = Product {
            id: Some(9),
            description: "kept".to_string(),
            image_id: Some(3),
            ..Product::default()
        };
        let product = build_product(&mapped(&[("name", "New name")]), Some(existing)).unwrap();
        assert_eq!(product.id, Some(9));
        assert_eq!(product.name, "New name");
        assert_eq!(product.description, "kept");
        assert_eq!(product.image_id, Some(3));
    }

    #[test]
    fn drain_processes_rows_and_completes_the_run() {
        let (dir, store) = temp_store();
        let tracker = start_run(&store, &dir, "r1");
        tracker.update("r1", RunDelta::total(2)).unwrap();
        store
            .enqueue_batch(
                "r1",
                &[
                    queued(1, &[("product_id", "A1"), ("name", "Widget"), ("sku", "EAPA1")]),
                    queued(2, &[("product_id", "A2"), ("name", "Gadget"), ("regular_price", "x")]),
                ],
            )
            .unwrap();
        tracker.mark_dispatch_complete("r1").unwrap();

        let worker = ImportWorker::new(store.clone(), SqliteCatalog::new(store.clone()));
        let report = worker.drain(budget()).unwrap();
        assert_eq!((report.claimed, report.succeeded, report.failed), (2, 1, 1));

        let status = tracker.read("r1").unwrap().unwrap();
        assert_eq!(status.status, RunStatus::Completed);
        assert_eq!(status.processed + status.skipped + status.errors, status.total);
        let run = tracker.load("r1").unwrap().unwrap();
        assert!(run.errors[0].contains("row 2 (raw id A2)"));
    }

    #[test]
    fn drain_respects_the_item_budget() {
        let (dir, store) = temp_store();
        start_run(&store, &dir, "r1");
        let rows: Vec<String> = (1..=3)
            .map(|n| {
                let id = format!("A{n}");
                queued(n, &[("product_id", id.as_str()), ("name", "W"), ("sku", id.as_str())])
            })
            .collect();
        store.enqueue_batch("r1", &rows).unwrap();

        let worker = ImportWorker::new(store.clone(), SqliteCatalog::new(store.clone()));
        let report = worker
            .drain(DrainBudget {
                max_items: 2,
                max_duration: Duration::from_secs(30),
            })
            .unwrap();
        assert_eq!(report.claimed, 2);
        assert_eq!(store.pending_items_for_run("r1").unwrap(), 1);
    }

    #[test]
    fn items_of_a_deleted_run_are_discarded() {
        let (dir, store) = temp_store();
        start_run(&store, &dir, "gone");
        store
            .enqueue_batch("gone", &[queued(1, &[]), queued(2, &[])])
            .unwrap();
        store.delete_run("gone").unwrap();

        let worker = ImportWorker::new(store.clone(), SqliteCatalog::new(store.clone()));
        let report = worker.drain(budget()).unwrap();
        assert_eq!((report.claimed, report.discarded), (1, 1));
        assert_eq!(store.pending_items_for_run("gone").unwrap(), 0);
    }

    #[test]
    fn malformed_payload_counts_as_an_error() {
        let (dir, store) = temp_store();
        let tracker = start_run(&store, &dir, "r1");
        tracker.update("r1", RunDelta::total(1)).unwrap();
        store.enqueue_batch("r1", &["[1, 2]".to_string()]).unwrap();
        tracker.mark_dispatch_complete("r1").unwrap();

        let worker = ImportWorker::new(store.clone(), SqliteCatalog::new(store.clone()));
        let report = worker.drain(budget()).unwrap();
        assert_eq!(report.failed, 1);
        let status = tracker.read("r1").unwrap().unwrap();
        assert_eq!((status.errors, status.status), (1, RunStatus::Completed));
    }
}
