use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Target that carries the raw external identifier of a row.
pub const RAW_ID_TARGET: &str = "product_id";

/// Targets a mapping must always define. Saving a mapping without them is rejected.
pub const REQUIRED_TARGETS: [&str; 3] = [RAW_ID_TARGET, "name", "sku"];

/// Where a target field takes its value from.
///
/// Serialized untagged so stored configurations read naturally:
///
/// ```json
/// {
///   "name": "description",
///   "sku": { "prefix": "EAP", "column": "code" },
///   "tax_status": { "column": "vat", "transform": "tax_status_map" },
///   "attributes": { "size": "size", "country": "country" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldSource {
    Column(String),
    Descriptor(ColumnSpec),
    Group(IndexMap<String, Option<FieldSource>>),
}

/// Structured source: a column plus an optional literal prefix and/or named transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnSpec {
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
}

/// One flattened rule: group members become dotted targets such as `attributes.size`.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingEntry {
    pub target: String,
    pub column: String,
    pub prefix: Option<String>,
    pub transform: Option<String>,
}

/// Ordered target-field → source mapping, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingConfig(pub IndexMap<String, Option<FieldSource>>);

impl MappingConfig {
    /// Flattens the configuration in declaration order, dropping unmapped (`null`) targets.
    pub fn entries(&self) -> Vec<MappingEntry> {
        let mut out = Vec::new();
        flatten_into(&self.0, None, &mut out);
        out
    }

    pub fn get(&self, target: &str) -> Option<&FieldSource> {
        self.0.get(target).and_then(Option::as_ref)
    }

    /// Names of required targets that are absent or mapped to `null`.
    pub fn missing_required(&self) -> Vec<&'static str> {
        REQUIRED_TARGETS
            .iter()
            .copied()
            .filter(|key| self.get(key).is_none())
            .collect()
    }
}

fn flatten_into(
    map: &IndexMap<String, Option<FieldSource>>,
    parent: Option<&str>,
    out: &mut Vec<MappingEntry>,
) {
    for (key, source) in map {
        let target = match parent {
            Some(p) => format!("{p}.{key}"),
            None => key.clone(),
        };
        match source {
            None => {}
            Some(FieldSource::Column(column)) => out.push(MappingEntry {
                target,
                column: column.clone(),
                prefix: None,
                transform: None,
            }),
            Some(FieldSource::Descriptor(spec)) => out.push(MappingEntry {
                target,
                column: spec.column.clone(),
                prefix: spec.prefix.clone(),
                transform: spec.transform.clone(),
            }),
            Some(FieldSource::Group(members)) => flatten_into(members, Some(&target), out),
        }
    }
}

fn column(name: &str) -> Option<FieldSource> {
    Some(FieldSource::Column(name.to_string()))
}

fn group(members: &[(&str, Option<&str>)]) -> Option<FieldSource> {
    Some(FieldSource::Group(
        members
            .iter()
            .map(|(key, col)| (key.to_string(), col.and_then(column)))
            .collect(),
    ))
}

impl Default for MappingConfig {
    /// The supplier export layout the importer was first written against.
    fn default() -> Self {
        let mut map = IndexMap::new();
        map.insert(RAW_ID_TARGET.to_string(), column("code"));
        map.insert("name".to_string(), column("description"));
        map.insert("description".to_string(), column("description_2"));
        map.insert(
            "sku".to_string(),
            Some(FieldSource::Descriptor(ColumnSpec {
                column: "code".to_string(),
                prefix: Some("EAP".to_string()),
                transform: None,
            })),
        );
        map.insert("regular_price".to_string(), column("p_mark"));
        map.insert("sale_price".to_string(), None);
        map.insert("stock_quantity".to_string(), column("qty"));
        map.insert("weight".to_string(), column("kg"));
        map.insert(
            "dimensions".to_string(),
            group(&[("length", None), ("width", None), ("height", None)]),
        );
        map.insert(
            "tax_status".to_string(),
            Some(FieldSource::Descriptor(ColumnSpec {
                column: "vat".to_string(),
                prefix: None,
                transform: Some("tax_status_map".to_string()),
            })),
        );
        map.insert("categories".to_string(), column("cat_code"));
        map.insert("tags".to_string(), None);
        map.insert(
            "attributes".to_string(),
            group(&[
                ("size", Some("size")),
                ("unit1", Some("unit1")),
                ("unit2", Some("unit2")),
                ("item_type", Some("item_type")),
                ("shelf_life", Some("shelf_life")),
                ("country", Some("country")),
            ]),
        );
        MappingConfig(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_json_parses_into_each_source_kind() {
        let json = r#"{
            "product_id": "Code",
            "sku": { "prefix": "EAP", "column": "code" },
            "tax_status": { "column": "vat", "transform": "tax_status_map" },
            "sale_price": null,
            "attributes": { "size": "size", "colour": null }
        }"#;
        let config: MappingConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.get("product_id"), Some(&FieldSource::Column("Code".into())));
        assert!(matches!(config.get("sku"), Some(FieldSource::Descriptor(spec)) if spec.prefix.as_deref() == Some("EAP")));
        assert!(matches!(config.get("attributes"), Some(FieldSource::Group(_))));
        assert_eq!(config.get("sale_price"), None);
    }

    #[test]
    fn entries_flatten_groups_in_declaration_order() {
        let targets: Vec<String> = MappingConfig::default()
            .entries()
            .into_iter()
            .map(|e| e.target)
            .collect();

        assert_eq!(targets.first().map(String::as_str), Some("product_id"));
        assert!(targets.contains(&"attributes.item_type".to_string()));
        assert!(!targets.iter().any(|t| t.starts_with("dimensions")));
        assert!(!targets.contains(&"sale_price".to_string()));
    }

    #[test]
    fn missing_required_lists_null_and_absent_targets() {
        let config: MappingConfig =
            serde_json::from_str(r#"{ "product_id": "code", "name": null }"#).unwrap();
        assert_eq!(config.missing_required(), vec!["name", "sku"]);
        assert!(MappingConfig::default().missing_required().is_empty());
    }

    #[test]
    fn default_mapping_survives_json_storage() {
        let stored = serde_json::to_string(&MappingConfig::default()).unwrap();
        let loaded: MappingConfig = serde_json::from_str(&stored).unwrap();
        assert_eq!(loaded, MappingConfig::default());
        let transforms: Vec<_> = loaded
            .entries()
            .into_iter()
            .filter_map(|entry| entry.transform)
            .collect();
        assert_eq!(transforms, vec!["tax_status_map".to_string()]);
    }
}
