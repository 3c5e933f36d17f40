//! Column mapping: turns a CSV row keyed by normalized header into a flat
//! record keyed by target field, following the stored mapping configuration.

use crate::error::{ImportError, ImportResult};
use common::model::mapping::{MappingConfig, RAW_ID_TARGET};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One CSV row, normalized header → cell, in file column order.
pub type RawRow = IndexMap<String, String>;

/// Target field → mapped value. A target whose column is missing from the
/// file is absent; a present but empty cell maps to an empty string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappedRow(pub IndexMap<String, String>);

impl MappedRow {
    pub fn get(&self, target: &str) -> Option<&str> {
        self.0.get(target).map(String::as_str)
    }

    /// Value of `target` trimmed, `None` when absent or blank.
    pub fn non_empty(&self, target: &str) -> Option<&str> {
        self.get(target).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn raw_id(&self) -> Option<&str> {
        self.non_empty(RAW_ID_TARGET)
    }

    /// Members of a group target (`attributes.size` → `size`), in mapping order.
    pub fn group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.0.iter().filter_map(move |(target, value)| {
            target
                .strip_prefix(group)
                .and_then(|rest| rest.strip_prefix('.'))
                .map(|member| (member, value.as_str()))
        })
    }
}

/// Built-in value transforms a mapping entry can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Any non-empty value means taxable, empty means no tax.
    TaxStatusMap,
    Decimal,
    Uppercase,
    Lowercase,
    Trim,
}

impl Transform {
    pub fn from_name(name: &str) -> ImportResult<Self> {
        match name {
            "tax_status_map" => Ok(Transform::TaxStatusMap),
            "decimal" => Ok(Transform::Decimal),
            "uppercase" => Ok(Transform::Uppercase),
            "lowercase" => Ok(Transform::Lowercase),
            "trim" => Ok(Transform::Trim),
            other => Err(ImportError::UnknownTransform(other.to_string())),
        }
    }

    pub fn apply(&self, value: &str) -> String {
        match self {
            Transform::TaxStatusMap => {
                if value.trim().is_empty() {
                    "none".to_string()
                } else {
                    "taxable".to_string()
                }
            }
            Transform::Decimal => value.trim().replace(',', "."),
            Transform::Uppercase => value.to_uppercase(),
            Transform::Lowercase => value.to_lowercase(),
            Transform::Trim => value.trim().to_string(),
        }
    }
}

/// Canonical form of a header or a configured column name: trimmed,
/// lowercased, brackets removed, inner whitespace runs collapsed to `_`.
pub fn normalize_header(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .replace(['[', ']'], "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Rejects configurations the importer cannot run with.
pub fn validate_mapping(config: &MappingConfig) -> ImportResult<()> {
    let missing = config.missing_required();
    if !missing.is_empty() {
        return Err(ImportError::InvalidMapping(format!(
            "required targets not mapped: {}",
            missing.join(", ")
        )));
    }
    for entry in config.entries() {
        if normalize_header(&entry.column).is_empty() {
            return Err(ImportError::InvalidMapping(format!(
                "target '{}' has an empty column name",
                entry.target
            )));
        }
        if let Some(name) = &entry.transform {
            Transform::from_name(name)?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct Rule {
    target: String,
    column: String,
    prefix: Option<String>,
    transform: Option<Transform>,
}

#[derive(Debug, Clone)]
pub struct ColumnMapper {
    rules: Vec<Rule>,
}

impl ColumnMapper {
    /// Compiles the configuration once per run; fails on unknown transforms.
    pub fn new(config: &MappingConfig) -> ImportResult<Self> {
        let rules = config
            .entries()
            .into_iter()
            .map(|entry| {
                let transform = entry
                    .transform
                    .as_deref()
                    .map(Transform::from_name)
                    .transpose()?;
                Ok(Rule {
                    target: entry.target,
                    column: normalize_header(&entry.column),
                    prefix: entry.prefix,
                    transform,
                })
            })
            .collect::<ImportResult<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn map_row(&self, row: &RawRow) -> MappedRow {
        let mut mapped = IndexMap::with_capacity(self.rules.len());
        for rule in &self.rules {
            let Some(cell) = row.get(&rule.column) else {
                continue;
            };
            let mut value = match rule.transform {
                Some(transform) => transform.apply(cell),
                None => cell.clone(),
            };
            if let Some(prefix) = &rule.prefix {
                if !value.trim().is_empty() {
                    value = format!("{prefix}{value}");
                }
            }
            mapped.insert(rule.target.clone(), value);
        }
        MappedRow(mapped)
    }
}
