//! Error type shared by the store, the pipeline and the HTTP handlers.
//!
//! Whether an error is fatal depends on where it surfaces, not on its variant:
//! the CSV reader turns errors into a failed run, the worker turns them into
//! an error count on a single item, and handlers turn them into responses.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("unable to read CSV headers: {0}")]
    UnreadableHeaders(String),

    #[error("invalid mapping configuration: {0}")]
    InvalidMapping(String),

    #[error("unknown transform '{0}'")]
    UnknownTransform(String),

    #[error("invalid {field} value '{value}'")]
    InvalidValue { field: String, value: String },

    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("import run not found: {0}")]
    RunNotFound(String),

    #[error("product {0} not found")]
    ProductNotFound(i64),

    #[error("background task failed: {0}")]
    Task(String),
}

impl ImportError {
    pub fn invalid_value(field: &str, value: &str) -> Self {
        ImportError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

impl ResponseError for ImportError {
    fn status_code(&self) -> StatusCode {
        match self {
            ImportError::RunNotFound(_) | ImportError::ProductNotFound(_) => StatusCode::NOT_FOUND,
            ImportError::InvalidMapping(_)
            | ImportError::UnknownTransform(_)
            | ImportError::InvalidUpload(_)
            | ImportError::InvalidSettings(_)
            | ImportError::UnreadableHeaders(_)
            | ImportError::InvalidValue { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).body(format!("Error: {}", self))
    }
}

pub type ImportResult<T> = Result<T, ImportError>;
