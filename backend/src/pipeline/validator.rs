use super::mapper::MappedRow;
use std::fmt;

/// Why a mapped row was not queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub missing: Vec<String>,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "missing required fields: {}", self.missing.join(", "))
    }
}

/// Checks that every required target carries a non-blank value.
#[derive(Debug, Clone)]
pub struct RowValidator {
    required: Vec<String>,
}

impl RowValidator {
    pub fn new(required: &[String]) -> Self {
        Self {
            required: required.to_vec(),
        }
    }

    pub fn validate(&self, row: &MappedRow) -> Result<(), Rejection> {
        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|target| row.non_empty(target).is_none())
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Rejection { missing })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::model::settings::ImportSettings;

    fn mapped(pairs: &[(&str, &str)]) -> MappedRow {
        MappedRow(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn complete_row_passes() {
        let validator = RowValidator::new(&ImportSettings::default().required_fields);
        let row = mapped(&[("product_id", "A1"), ("name", "Widget"), ("sku", "EAPA1")]);
        assert!(validator.validate(&row).is_ok());
    }

    #[test]
    fn blank_and_absent_required_fields_are_reported() {
        let validator = RowValidator::new(&ImportSettings::default().required_fields);
        let row = mapped(&[("product_id", "A1"), ("name", "   ")]);
        let rejection = validator.validate(&row).unwrap_err();
        assert_eq!(rejection.missing, vec!["name", "sku"]);
        assert_eq!(rejection.to_string(), "missing required fields: name, sku");
    }
}
