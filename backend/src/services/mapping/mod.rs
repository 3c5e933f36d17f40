//! # Column Mapping Service Module
//!
//! Endpoints for reading and changing the column mapping applied to every
//! new import run.
//!
//! - `get`: returns the stored mapping, or the built-in default.
//! - `save`: validates and stores a new mapping, or resets it to the default.

mod get;
mod save;

use actix_web::web::{get, post, scope};
use actix_web::Scope;

const API_PATH: &str = "/api/mapping";

/// Registered routes:
///
/// * **`GET ""`**: current `MappingConfig` as JSON.
/// * **`POST ""`**: body `{"mapping": {...}}`. The mapping must map
///   `product_id`, `name` and `sku`, and may only name known transforms;
///   otherwise `400` and the stored mapping is kept.
/// * **`POST /reset`**: drops the stored mapping and returns the default.
pub fn configure_routes() -> Scope {
    scope(API_PATH)
        .route("", get().to(get::process))
        .route("", post().to(save::process))
        .route("/reset", post().to(save::reset))
}
