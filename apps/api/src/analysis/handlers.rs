use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::analysis::dispatch::{self, SubmitRequest, SubmitResponse};
use crate::analysis::files::{self, FileDescription, FilesQuery};
use crate::analysis::records::{self, RecordAnalysisRequest};
use crate::analysis::upload::{self, UploadLimits, UploadResponse};
use crate::auth::Session;
use crate::errors::AppError;
use crate::models::Analysis;
use crate::state::AppState;
use crate::storage::BlobKind;

/// POST /api/upload
pub async fn handle_upload(
    State(state): State<AppState>,
    session: Session,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let limits = UploadLimits {
        max_pdf_bytes: state.config.max_pdf_bytes,
        max_zip_bytes: state.config.max_zip_bytes,
    };
    let form = upload::parse_upload(&mut multipart, limits).await?;
    Ok(Json(
        upload::store_upload(state.blobs.as_ref(), session, form).await?,
    ))
}

/// POST /api/analyze
pub async fn handle_analyze(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, AppError> {
    Ok(Json(dispatch::submit(&state, session, request).await?))
}

/// GET /api/files?pdfFileId=..&zipFileId=..
pub async fn handle_files(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<FilesQuery>,
) -> Result<Json<FileDescription>, AppError> {
    Ok(Json(
        files::describe_files(state.blobs.as_ref(), session, query).await?,
    ))
}

/// POST /api/analysis
pub async fn handle_record_analysis(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<RecordAnalysisRequest>,
) -> Result<(StatusCode, Json<Analysis>), AppError> {
    let analysis = records::record_analysis(state.store.as_ref(), session, request).await?;
    Ok((StatusCode::CREATED, Json(analysis)))
}

/// GET /api/analysis
pub async fn handle_list_analyses(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<Analysis>>, AppError> {
    Ok(Json(
        records::list_analyses(state.store.as_ref(), session).await?,
    ))
}

/// GET /api/reports/:id
pub async fn handle_download_report(
    State(state): State<AppState>,
    session: Session,
    Path(report_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let not_found = || AppError::NotFound("Report not found".to_string());
    let report_id = Uuid::parse_str(&report_id).map_err(|_| not_found())?;
    let data = state
        .blobs
        .get(session.user_id, BlobKind::Report, report_id)
        .await?
        .ok_or_else(not_found)?;

    let disposition = format!("attachment; filename=\"report-{report_id}.pdf\"");
    Ok((
        [
            (header::CONTENT_TYPE, BlobKind::Report.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    ))
}
