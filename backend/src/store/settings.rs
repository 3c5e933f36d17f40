use super::Store;
use crate::error::ImportResult;
use chrono::Utc;
use common::model::mapping::MappingConfig;
use common::model::settings::ImportSettings;
use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const MAPPING_KEY: &str = "column_mapping";
pub const IMPORT_SETTINGS_KEY: &str = "import_settings";

impl Store {
    pub fn get_setting<T: DeserializeOwned>(&self, key: &str) -> ImportResult<Option<T>> {
        let conn = self.connect()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn put_setting<T: Serialize>(&self, key: &str, value: &T) -> ImportResult<()> {
        let json = serde_json::to_string(value)?;
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, json, Utc::now()],
        )?;
        Ok(())
    }

    pub fn delete_setting(&self, key: &str) -> ImportResult<()> {
        let conn = self.connect()?;
        conn.execute("DELETE FROM settings WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// The stored mapping, or the built-in default when none was saved.
    pub fn load_mapping(&self) -> ImportResult<MappingConfig> {
        Ok(self.get_setting(MAPPING_KEY)?.unwrap_or_default())
    }

    pub fn load_import_settings(&self) -> ImportResult<ImportSettings> {
        Ok(self.get_setting(IMPORT_SETTINGS_KEY)?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::temp_store;

    #[test]
    fn missing_settings_fall_back_to_defaults() {
        let (_dir, store) = temp_store();
        assert_eq!(store.load_mapping().unwrap(), MappingConfig::default());
        assert_eq!(store.load_import_settings().unwrap(), ImportSettings::default());
    }

    #[test]
    fn saved_values_replace_previous_ones() {
        let (_dir, store) = temp_store();
        let mut settings = ImportSettings::default();
        settings.batch_size = 10;
        store.put_setting(IMPORT_SETTINGS_KEY, &settings).unwrap();
        settings.batch_size = 20;
        store.put_setting(IMPORT_SETTINGS_KEY, &settings).unwrap();

        assert_eq!(store.load_import_settings().unwrap().batch_size, 20);

        store.delete_setting(IMPORT_SETTINGS_KEY).unwrap();
        assert_eq!(store.load_import_settings().unwrap().batch_size, 100);
    }
}
