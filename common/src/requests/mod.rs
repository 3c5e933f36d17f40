use crate::model::mapping::MappingConfig;
use crate::model::settings::ImportSettings;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize)]
/// Request payload for `POST /api/mapping`.
pub struct SaveMappingRequest {
    pub mapping: MappingConfig,
}

#[derive(Deserialize, Serialize)]
/// Request payload for `POST /api/settings`.
pub struct SaveSettingsRequest {
    pub settings: ImportSettings,
}

#[derive(Deserialize, Serialize)]
/// Returned by the upload endpoint; the id is what the client polls with.
pub struct ImportAccepted {
    pub run_id: String,
}
