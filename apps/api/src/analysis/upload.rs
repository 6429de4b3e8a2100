use axum::extract::multipart::{Field, Multipart, MultipartError};
use axum::http::StatusCode;
use bytes::{Bytes, BytesMut};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::Session;
use crate::errors::AppError;
use crate::models::TargetTier;
use crate::storage::{BlobKind, BlobStore};

const PDF_MAGIC: &[u8] = b"%PDF-";
const ZIP_MAGICS: [&[u8]; 2] = [b"PK\x03\x04", b"PK\x05\x06"];
const MIB: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_pdf_bytes: usize,
    pub max_zip_bytes: usize,
}

/// A validated upload form, fully read into memory.
#[derive(Debug)]
pub struct UploadForm {
    pub pdf: Bytes,
    pub zip: Option<Bytes>,
    pub target_tier: TargetTier,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFileIds {
    pub pdf_file_id: Uuid,
    pub zip_file_id: Option<Uuid>,
    pub target_tier: TargetTier,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    pub file_ids: UploadedFileIds,
}

fn too_large(label: &str, limit: usize) -> AppError {
    AppError::Validation(format!(
        "{label} exceeds the maximum size of {} MB",
        limit / MIB
    ))
}

pub fn check_pdf(data: &[u8], limit: usize) -> Result<(), AppError> {
    if data.len() > limit {
        return Err(too_large("PDF file", limit));
    }
    if !data.starts_with(PDF_MAGIC) {
        return Err(AppError::Validation(
            "PDF file must be a valid PDF document".to_string(),
        ));
    }
    Ok(())
}

pub fn check_zip(data: &[u8], limit: usize) -> Result<(), AppError> {
    if data.len() > limit {
        return Err(too_large("ZIP file", limit));
    }
    if !ZIP_MAGICS.iter().any(|magic| data.starts_with(magic)) {
        return Err(AppError::Validation(
            "ZIP file must be a valid ZIP archive".to_string(),
        ));
    }
    Ok(())
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Upload exceeds the maximum request size".to_string())
    } else {
        AppError::Validation(format!("Invalid multipart body: {}", err.body_text()))
    }
}

/// Reads a file field, bailing out as soon as it grows past `limit`.
async fn read_limited(
    field: &mut Field<'_>,
    label: &str,
    limit: usize,
) -> Result<Bytes, AppError> {
    let mut buffer = BytesMut::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if buffer.len() + chunk.len() > limit {
            return Err(too_large(label, limit));
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer.freeze())
}

/// Reads and validates `pdfFile`, optional `zipFile`, and `targetTier`.
///
/// Every check runs here, before anything is stored or sent anywhere.
pub async fn parse_upload(
    multipart: &mut Multipart,
    limits: UploadLimits,
) -> Result<UploadForm, AppError> {
    let mut pdf: Option<Bytes> = None;
    let mut zip: Option<Bytes> = None;
    let mut tier: Option<String> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("pdfFile") => {
                pdf = Some(read_limited(&mut field, "PDF file", limits.max_pdf_bytes).await?)
            }
            Some("zipFile") => {
                zip = Some(read_limited(&mut field, "ZIP file", limits.max_zip_bytes).await?)
            }
            Some("targetTier") => tier = Some(field.text().await.map_err(multipart_error)?),
            other => warn!("Ignoring unexpected upload field {other:?}"),
        }
    }

    // Browsers send an empty part when no file was picked.
    let pdf = pdf
        .filter(|data| !data.is_empty())
        .ok_or_else(|| AppError::Validation("PDF file is required".to_string()))?;
    let zip = zip.filter(|data| !data.is_empty());
    let tier = tier
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Target tier is required".to_string()))?;

    check_pdf(&pdf, limits.max_pdf_bytes)?;
    if let Some(zip) = &zip {
        check_zip(zip, limits.max_zip_bytes)?;
    }
    let target_tier = tier.parse::<TargetTier>().map_err(AppError::Validation)?;

    Ok(UploadForm {
        pdf,
        zip,
        target_tier,
    })
}

/// Writes a validated form to the caller's blob space.
pub async fn store_upload(
    blobs: &dyn BlobStore,
    session: Session,
    form: UploadForm,
) -> Result<UploadResponse, AppError> {
    let owner = session.user_id;
    let pdf_file_id = blobs.put(owner, BlobKind::Pdf, form.pdf).await?;

    let zip_file_id = match form.zip {
        Some(zip) => match blobs.put(owner, BlobKind::Zip, zip).await {
            Ok(id) => Some(id),
            Err(e) => {
                // Don't leave a half-finished upload behind.
                if let Err(cleanup) = blobs.delete(owner, BlobKind::Pdf, pdf_file_id).await {
                    warn!("Failed to remove orphaned PDF {pdf_file_id}: {cleanup}");
                }
                return Err(e.into());
            }
        },
        None => None,
    };

    info!(
        "Stored upload for user {owner}: pdf={pdf_file_id}, zip={zip_file_id:?}, tier={}",
        form.target_tier
    );

    Ok(UploadResponse {
        message: "Files uploaded successfully".to_string(),
        file_ids: UploadedFileIds {
            pdf_file_id,
            zip_file_id,
            target_tier: form.target_tier,
        },
    })
}
