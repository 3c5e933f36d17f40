use crate::model::mapping::REQUIRED_TARGETS;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const MAX_BATCH_SIZE: usize = 10_000;
pub const MAX_ROWS_LIMIT: usize = 1_000_000;
pub const MAX_IMAGE_SIDE: u32 = 4096;
pub const MAX_RETENTION_DAYS: u32 = 3650;

/// Import tunables, stored as one JSON value in the settings table and
/// snapshotted into every run when it starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    /// Rows buffered before a batch is handed to the worker queue.
    pub batch_size: usize,
    /// Hard cap on counted rows per file; reading stops once reached.
    pub max_rows: usize,
    pub image_width: u32,
    pub image_height: u32,
    /// `true` crops to fill the target box, `false` fits inside it.
    pub image_crop: bool,
    pub retention_days: u32,
    /// Folder holding `<raw_id>.<ext>` source images.
    pub source_image_dir: PathBuf,
    /// Managed copies land in `<asset_dir>/<product_id>/`.
    pub asset_dir: PathBuf,
    /// Mapped targets that must be non-empty for a row to be imported.
    pub required_fields: Vec<String>,
    /// Raw id → already registered asset id; wins over the source folder.
    pub image_overrides: BTreeMap<String, i64>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_rows: 10_000,
            image_width: 400,
            image_height: 400,
            image_crop: true,
            retention_days: 7,
            source_image_dir: PathBuf::from("uploads/raw-images"),
            asset_dir: PathBuf::from("uploads/products"),
            required_fields: REQUIRED_TARGETS.iter().map(|s| s.to_string()).collect(),
            image_overrides: BTreeMap::new(),
        }
    }
}

impl ImportSettings {
    /// Returns a description of the first invalid value, if any.
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(format!("batch_size must be between 1 and {}", MAX_BATCH_SIZE));
        }
        if !(1..=MAX_ROWS_LIMIT).contains(&self.max_rows) {
            return Err(format!("max_rows must be between 1 and {}", MAX_ROWS_LIMIT));
        }
        if !(1..=MAX_IMAGE_SIDE).contains(&self.image_width)
            || !(1..=MAX_IMAGE_SIDE).contains(&self.image_height)
        {
            return Err(format!(
                "image_width and image_height must be between 1 and {}",
                MAX_IMAGE_SIDE
            ));
        }
        if !(1..=MAX_RETENTION_DAYS).contains(&self.retention_days) {
            return Err(format!(
                "retention_days must be between 1 and {}",
                MAX_RETENTION_DAYS
            ));
        }
        if self.required_fields.iter().any(|f| f.trim().is_empty()) {
            return Err("required_fields must not contain empty names".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let settings: ImportSettings = serde_json::from_str(r#"{ "batch_size": 25 }"#).unwrap();
        assert_eq!(settings.batch_size, 25);
        assert_eq!(settings.image_width, 400);
        assert_eq!(settings.retention_days, 7);
        assert_eq!(settings.required_fields, vec!["product_id", "name", "sku"]);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let settings = ImportSettings {
            batch_size: 0,
            ..ImportSettings::default()
        };
        assert!(settings.validate().is_err());
        assert!(ImportSettings::default().validate().is_ok());
    }

    #[test]
    fn oversized_values_are_rejected() {
        let oversized = [
            ImportSettings {
                batch_size: usize::MAX,
                ..ImportSettings::default()
            },
            ImportSettings {
                max_rows: MAX_ROWS_LIMIT + 1,
                ..ImportSettings::default()
            },
            ImportSettings {
                image_width: 0,
                ..ImportSettings::default()
            },
            ImportSettings {
                image_height: MAX_IMAGE_SIDE + 1,
                ..ImportSettings::default()
            },
            ImportSettings {
                retention_days: u32::MAX,
                ..ImportSettings::default()
            },
        ];
        for settings in oversized {
            assert!(settings.validate().is_err(), "{:?} passed validation", settings);
        }
        let largest = ImportSettings {
            batch_size: MAX_BATCH_SIZE,
            max_rows: MAX_ROWS_LIMIT,
            image_width: MAX_IMAGE_SIDE,
            image_height: MAX_IMAGE_SIDE,
            retention_days: MAX_RETENTION_DAYS,
            ..ImportSettings::default()
        };
        assert!(largest.validate().is_ok());
    }
}
