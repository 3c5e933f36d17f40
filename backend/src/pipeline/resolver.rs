use crate::catalog::{ProductCatalog, RAW_ID_META};
use crate::error::ImportResult;
use log::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Existing(i64),
    New,
}

/// Maps a raw external identifier to the product that already carries it.
pub struct IdentifierResolver<'a, C: ProductCatalog> {
    catalog: &'a C,
}

impl<'a, C: ProductCatalog> IdentifierResolver<'a, C> {
    pub fn new(catalog: &'a C) -> Self {
        Self { catalog }
    }

    /// Exact, case-sensitive match. When older data holds several products
    /// with the same identifier the most recently updated one wins.
    pub fn resolve(&self, raw_id: &str) -> ImportResult<Resolution> {
        let ids = self.catalog.find_by_meta(RAW_ID_META, raw_id)?;
        match ids.as_slice() {
            [] => Ok(Resolution::New),
            [id] => Ok(Resolution::Existing(*id)),
            [id, others @ ..] => {
                warn!(
                    "raw id {} is held by several products; using {} and ignoring {:?}",
                    raw_id, id, others
                );
                Ok(Resolution::Existing(*id))
            }
        }
    }
}
