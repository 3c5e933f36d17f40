use crate::controller::ImportController;
use crate::error::{ImportError, ImportResult};
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse, Responder, ResponseError};
use common::requests::ImportAccepted;
use csv::ReaderBuilder;
use futures_util::StreamExt;
use log::info;
use md5::Context;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Uploads larger than this are rejected.
const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Parses the header line as CSV, quoting included, and rejects it when it
/// holds no cells or an empty one. Names are normalized later by the importer.
fn validate_header_cells(header_str: &str) -> ImportResult<()> {
    let header_str = header_str.trim_start_matches('\u{feff}');
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(header_str.as_bytes());
    let record = match reader.records().next() {
        Some(record) => record
            .map_err(|e| ImportError::InvalidUpload(format!("unreadable CSV header: {}", e)))?,
        None => {
            return Err(ImportError::InvalidUpload(
                "the file has no header row".to_string(),
            ))
        }
    };
    if record.iter().any(|cell| cell.trim().is_empty()) {
        return Err(ImportError::InvalidUpload(
            "CSV header cells must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn header_line(buf: &[u8]) -> ImportResult<String> {
    let mut line = buf.to_vec();
    if line.ends_with(b"\r") {
        line.pop();
    }
    String::from_utf8(line)
        .map_err(|_| ImportError::InvalidUpload("header is not valid UTF-8".to_string()))
}

/// - On success: `200 OK` with `{"run_id": "..."}`.
/// - On failure: the error's status (400 for a rejected upload) and message.
pub async fn process(
    payload: Multipart,
    controller: web::Data<ImportController>,
) -> impl Responder {
    match upload_csv(payload, &controller).await {
        Ok(run_id) => HttpResponse::Ok().json(ImportAccepted { run_id }),
        Err(e) => e.error_response(),
    }
}

/// Streams the `file` part to the upload directory, then submits the import.
pub async fn upload_csv(
    mut payload: Multipart,
    controller: &ImportController,
) -> ImportResult<String> {
    let mut stored: Option<(PathBuf, String)> = None;

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| ImportError::InvalidUpload(e.to_string()))?;
        let name = field
            .content_disposition()
            .and_then(|cd| cd.get_name().map(|n| n.to_string()));
        if name.as_deref() != Some("file") {
            continue;
        }

        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename().map(|f| f.to_string()))
            .unwrap_or_default();
        if !filename.to_lowercase().ends_with(".csv") {
            return Err(ImportError::InvalidUpload(
                "the file must end with .csv".to_string(),
            ));
        }

        fs::create_dir_all(controller.upload_dir())?;
        let target = controller
            .upload_dir()
            .join(format!("{}.csv", uuid::Uuid::new_v4()));

        let mut md5_hasher = Context::new();
        let mut header_buf: Vec<u8> = Vec::new();
        let mut writer: Option<BufWriter<File>> = None;
        let mut written = 0usize;

        let result: ImportResult<()> = async {
            while let Some(chunk) = field.next().await {
                let chunk = chunk.map_err(|e| ImportError::InvalidUpload(e.to_string()))?;
                written += chunk.len();
                if written > MAX_UPLOAD_BYTES {
                    return Err(ImportError::InvalidUpload(
                        "the file exceeds the 100 MB upload limit".to_string(),
                    ));
                }
                md5_hasher.consume(&chunk);

                if let Some(w) = writer.as_mut() {
                    w.write_all(&chunk)?;
                    continue;
                }
                header_buf.extend_from_slice(&chunk);
                if let Some(pos) = header_buf.iter().position(|&b| b == b'\n') {
                    validate_header_cells(&header_line(&header_buf[..pos])?)?;
                    let mut w = BufWriter::new(File::create(&target)?);
                    w.write_all(&header_buf)?;
                    header_buf.clear();
                    writer = Some(w);
                }
            }

            match writer.as_mut() {
                Some(w) => w.flush()?,
                None => {
                    // Header-only upload without a trailing newline.
                    validate_header_cells(&header_line(&header_buf)?)?;
                    let mut w = BufWriter::new(File::create(&target)?);
                    w.write_all(&header_buf)?;
                    w.flush()?;
                }
            }
            Ok::<(), ImportError>(())
        }
        .await;

        if let Err(e) = result {
            remove_partial(&target);
            return Err(e);
        }
        stored = Some((target, format!("{:x}", md5_hasher.finalize())));
        break;
    }

    let (path, md5) = stored.ok_or_else(|| ImportError::InvalidUpload("missing file".to_string()))?;
    info!("stored upload {} (md5 {})", path.display(), md5);
    controller.submit(path, Some(md5))
}

fn remove_partial(path: &Path) {
    if path.exists() {
        let _ = fs::remove_file(path);
    }
}
