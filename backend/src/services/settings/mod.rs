//! Import settings endpoints.
//!
//! - `GET /api/settings`: current `ImportSettings`.
//! - `POST /api/settings`: body `{"settings": {...}}`; missing fields take
//!   their defaults. Rejected with `400` when a value is out of range.
//!
//! Saved settings apply to runs started afterwards; a running import keeps
//! the snapshot it started with.

use crate::controller::ImportController;
use actix_web::web::{get, post, scope};
use actix_web::{web, HttpResponse, Responder, ResponseError, Scope};
use common::requests::SaveSettingsRequest;

const API_PATH: &str = "/api/settings";

pub fn configure_routes() -> Scope {
    scope(API_PATH)
        .route("", get().to(get_settings))
        .route("", post().to(save_settings))
}

async fn get_settings(controller: web::Data<ImportController>) -> impl Responder {
    match controller.settings() {
        Ok(settings) => HttpResponse::Ok().json(settings),
        Err(e) => e.error_response(),
    }
}

async fn save_settings(
    payload: web::Json<SaveSettingsRequest>,
    controller: web::Data<ImportController>,
) -> impl Responder {
    match controller.save_settings(payload.into_inner().settings) {
        Ok(settings) => HttpResponse::Ok().json(settings),
        Err(e) => e.error_response(),
    }
}
