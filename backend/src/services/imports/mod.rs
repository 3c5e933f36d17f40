//! HTTP endpoints for starting CSV imports and following their progress.
//!
//! - `POST /api/imports/upload`: multipart/form-data upload with a `file` part
//!   holding the CSV. The header line is validated while the body streams to
//!   disk, then a run is started and its id returned as `{"run_id": "..."}`.
//!   The rows themselves are read in the background.
//!
//! - `GET /api/imports/status/{run_id}`: current `StatusReport` of a run
//!   (status, counters, percent, log tail). Unknown or expired runs are 404.

use actix_web::web::{get, post, scope};
use actix_web::Scope;

mod get_status;
mod upload;

const API_PATH: &str = "/api/imports";

pub fn configure_routes() -> Scope {
    scope(API_PATH)
        .route("/upload", post().to(upload::process))
        .route("/status/{run_id}", get().to(get_status::process))
}
