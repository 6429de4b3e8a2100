//! Analysis dispatch: subscription gate, file loading, model call, persistence.

use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::analysis::{pdf_display_name, zip_display_name};
use crate::auth::Session;
use crate::errors::AppError;
use crate::inference::{AnalysisInput, AnalysisOutput, NamedFile};
use crate::models::{Analysis, TargetTier};
use crate::payments::subscription::check_active_subscription;
use crate::state::AppState;
use crate::storage::BlobKind;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub pdf_file_id: Option<String>,
    pub zip_file_id: Option<String>,
    pub target_tier: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportArtifact {
    /// Set when the report was copied into our storage.
    pub report_id: Option<Uuid>,
    /// Where the client downloads the report from.
    pub url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub analysis_text: String,
    pub report: Option<ReportArtifact>,
    /// `None` when the result could not be recorded.
    pub analysis_id: Option<Uuid>,
}

pub fn report_download_path(report_id: Uuid) -> String {
    format!("/api/reports/{report_id}")
}

/// Best-effort ZIP lookup: any problem degrades to "no ZIP".
async fn load_zip(state: &AppState, owner: Uuid, raw_id: Option<&str>) -> Option<NamedFile> {
    let raw_id = raw_id.map(str::trim).filter(|id| !id.is_empty())?;
    let id = match Uuid::parse_str(raw_id) {
        Ok(id) => id,
        Err(_) => {
            warn!("Ignoring malformed ZIP id '{raw_id}'");
            return None;
        }
    };
    match state.blobs.get(owner, BlobKind::Zip, id).await {
        Ok(Some(data)) => Some(NamedFile {
            name: zip_display_name(id),
            data,
        }),
        Ok(None) => {
            warn!("ZIP {id} not found for user {owner}, continuing without it");
            None
        }
        Err(e) => {
            warn!("Failed to read ZIP {id} for user {owner}, continuing without it: {e}");
            None
        }
    }
}

/// Copies the model's report into the caller's storage. Falls back to the
/// remote URL when the download or the write fails.
async fn keep_report(state: &AppState, owner: Uuid, remote_url: String) -> ReportArtifact {
    let stored = match state.model.fetch_report(&remote_url).await {
        Ok(data) => state.blobs.put(owner, BlobKind::Report, data).await.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    match stored {
        Ok(report_id) => ReportArtifact {
            report_id: Some(report_id),
            url: report_download_path(report_id),
        },
        Err(e) => {
            warn!("Failed to keep report from {remote_url}: {e}");
            ReportArtifact {
                report_id: None,
                url: remote_url,
            }
        }
    }
}

/// Runs an analysis for the caller.
///
/// Without an active subscription this fails before any file is read or the
/// model is contacted.
pub async fn submit(
    state: &AppState,
    session: Session,
    request: SubmitRequest,
) -> Result<SubmitResponse, AppError> {
    let owner = session.user_id;
    let raw_pdf_id = request
        .pdf_file_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::Validation("PDF file ID is required".to_string()))?;
    let tier: TargetTier = request
        .target_tier
        .as_deref()
        .ok_or_else(|| AppError::Validation("Target tier is required".to_string()))?
        .parse()
        .map_err(AppError::Validation)?;

    let subscription = check_active_subscription(state.store.as_ref(), owner, Utc::now()).await?;
    let Some(active) = subscription.subscription else {
        info!("Rejected analysis for user {owner}: no active subscription");
        return Err(AppError::PaymentRequired(
            "Active subscription required. Please complete payment to analyze documents."
                .to_string(),
        ));
    };

    let pdf_missing =
        || AppError::NotFound("PDF file not found or could not be read".to_string());
    let pdf_id = Uuid::parse_str(raw_pdf_id).map_err(|_| pdf_missing())?;
    let pdf: Bytes = state
        .blobs
        .get(owner, BlobKind::Pdf, pdf_id)
        .await
        .map_err(|e| {
            warn!("Failed to read PDF {pdf_id} for user {owner}: {e}");
            pdf_missing()
        })?
        .ok_or_else(pdf_missing)?;

    let zip = load_zip(state, owner, request.zip_file_id.as_deref()).await;
    let pdf_file_name = pdf_display_name(pdf_id);
    let zip_file_name = zip.as_ref().map(|z| z.name.clone());

    let AnalysisOutput {
        analysis_text,
        report_url,
    } = state
        .model
        .analyze(AnalysisInput {
            pdf: NamedFile {
                name: pdf_file_name.clone(),
                data: pdf,
            },
            zip,
            tier,
        })
        .await?;

    let report = match report_url {
        Some(url) => Some(keep_report(state, owner, url).await),
        None => None,
    };

    let analysis = Analysis {
        id: Uuid::new_v4(),
        user_id: owner,
        pdf_file_name,
        zip_file_name,
        target_tier: tier.to_string(),
        analysis_text: analysis_text.clone(),
        report_url: report.as_ref().map(|r| r.url.clone()),
        payment_id: Some(active.id),
        created_at: Utc::now(),
    };

    // The result is returned even if it cannot be recorded.
    let analysis_id = match state.store.insert_analysis(&analysis).await {
        Ok(()) => Some(analysis.id),
        Err(e) => {
            warn!("Failed to record analysis for user {owner}: {e}");
            None
        }
    };

    Ok(SubmitResponse {
        analysis_text,
        report,
        analysis_id,
    })
}
