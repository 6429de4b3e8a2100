use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::analysis::{pdf_display_name, zip_display_name};
use crate::auth::Session;
use crate::errors::AppError;
use crate::storage::{BlobKind, BlobStore};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesQuery {
    pub pdf_file_id: Option<String>,
    pub zip_file_id: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileDescription {
    pub pdf_file_name: String,
    pub pdf_size: u64,
    pub zip_file_name: Option<String>,
    pub zip_size: Option<u64>,
}

/// Display names and sizes of previously uploaded files.
pub async fn describe_files(
    blobs: &dyn BlobStore,
    session: Session,
    query: FilesQuery,
) -> Result<FileDescription, AppError> {
    let owner = session.user_id;
    let raw_pdf_id = query
        .pdf_file_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::Validation("PDF file ID is required".to_string()))?;

    let pdf_missing =
        || AppError::NotFound("PDF file not found or could not be read".to_string());
    let pdf_id = Uuid::parse_str(raw_pdf_id).map_err(|_| pdf_missing())?;
    let pdf_size = blobs
        .size(owner, BlobKind::Pdf, pdf_id)
        .await?
        .ok_or_else(pdf_missing)?;

    let mut description = FileDescription {
        pdf_file_name: pdf_display_name(pdf_id),
        pdf_size,
        zip_file_name: None,
        zip_size: None,
    };

    let Some(raw_zip_id) = query.zip_file_id.as_deref().map(str::trim) else {
        return Ok(description);
    };
    if raw_zip_id.is_empty() {
        return Ok(description);
    }
    let Ok(zip_id) = Uuid::parse_str(raw_zip_id) else {
        return Ok(description);
    };
    match blobs.size(owner, BlobKind::Zip, zip_id).await {
        Ok(Some(size)) => {
            description.zip_file_name = Some(zip_display_name(zip_id));
            description.zip_size = Some(size);
        }
        Ok(None) => {}
        Err(e) => warn!("Failed to stat ZIP {zip_id} for user {owner}: {e}"),
    }
    Ok(description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    use crate::storage::LocalBlobStore;

    #[tokio::test]
    async fn test_describes_pdf_and_zip() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = LocalBlobStore::new(dir.path()).await.unwrap();
        let session = Session {
            user_id: Uuid::new_v4(),
        };
        let pdf = blobs
            .put(session.user_id, BlobKind::Pdf, Bytes::from_static(b"%PDF-1.7"))
            .await
            .unwrap();
        let zip = blobs
            .put(session.user_id, BlobKind::Zip, Bytes::from_static(b"PK\x03\x04"))
            .await
            .unwrap();

        let description = describe_files(
            &blobs,
            session,
            FilesQuery {
                pdf_file_id: Some(pdf.to_string()),
                zip_file_id: Some(zip.to_string()),
            },
        )
        .await
        .unwrap();

        assert_eq!(description.pdf_size, 8);
        assert!(description.pdf_file_name.starts_with("document-"));
        assert_eq!(description.zip_size, Some(4));
        assert_eq!(description.zip_file_name, Some(zip_display_name(zip)));
    }

    #[tokio::test]
    async fn test_missing_zip_is_omitted_missing_pdf_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = LocalBlobStore::new(dir.path()).await.unwrap();
        let session = Session {
            user_id: Uuid::new_v4(),
        };
        let pdf = blobs
            .put(session.user_id, BlobKind::Pdf, Bytes::from_static(b"%PDF-1.7"))
            .await
            .unwrap();

        let description = describe_files(
            &blobs,
            session,
            FilesQuery {
                pdf_file_id: Some(pdf.to_string()),
                zip_file_id: Some(Uuid::new_v4().to_string()),
            },
        )
        .await
        .unwrap();
        assert_eq!(description.zip_file_name, None);

        let err = describe_files(
            &blobs,
            session,
            FilesQuery {
                pdf_file_id: Some(Uuid::new_v4().to_string()),
                zip_file_id: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = describe_files(&blobs, session, FilesQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
