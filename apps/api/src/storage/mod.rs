//! Owner-scoped blob storage for uploaded documents and fetched reports.
//!
//! Every blob lives at `<owner>/<id>.<ext>`: a blob is only reachable by the
//! user who stored it. Uploads expire after the configured TTL and are removed
//! by the sweeper task started in `main`. Reports back analysis records and
//! are kept.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub mod local;
pub mod s3;
pub mod sweeper;

pub use local::LocalBlobStore;
pub use s3::S3BlobStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("S3 error: {0}")]
    S3(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobKind {
    Pdf,
    Zip,
    Report,
}

impl BlobKind {
    pub fn extension(&self) -> &'static str {
        match self {
            BlobKind::Pdf => "pdf",
            BlobKind::Zip => "zip",
            BlobKind::Report => "report.pdf",
        }
    }

    /// Kind of the blob stored under `file_name`, if it is one of ours.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        // Longest extension first: `.report.pdf` also ends in `.pdf`.
        [BlobKind::Report, BlobKind::Pdf, BlobKind::Zip]
            .into_iter()
            .find(|kind| {
                file_name
                    .strip_suffix(kind.extension())
                    .is_some_and(|stem| stem.ends_with('.'))
            })
    }

    /// Whether the sweeper may collect this kind once it outlives the TTL.
    pub fn expires(&self) -> bool {
        !matches!(self, BlobKind::Report)
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            BlobKind::Pdf | BlobKind::Report => "application/pdf",
            BlobKind::Zip => "application/zip",
        }
    }
}

/// Relative location of a blob inside any backend.
pub fn blob_key(owner: Uuid, kind: BlobKind, id: Uuid) -> String {
    format!("{owner}/{id}.{}", kind.extension())
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Backend name for logs.
    fn kind(&self) -> &'static str;

    /// Stores `data` under a fresh id owned by `owner`.
    async fn put(&self, owner: Uuid, kind: BlobKind, data: Bytes) -> Result<Uuid, StorageError>;

    /// `None` when the blob does not exist for this owner.
    async fn get(&self, owner: Uuid, kind: BlobKind, id: Uuid)
        -> Result<Option<Bytes>, StorageError>;

    /// Size in bytes, `None` when absent.
    async fn size(&self, owner: Uuid, kind: BlobKind, id: Uuid)
        -> Result<Option<u64>, StorageError>;

    async fn delete(&self, owner: Uuid, kind: BlobKind, id: Uuid) -> Result<(), StorageError>;

    /// Removes every expiring blob (uploads and staging leftovers, never
    /// reports) last written before `cutoff`. Returns how many were removed.
    async fn sweep_expired(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError>;
}

/// True when the sweeper may remove the object named `file_name`.
pub fn is_sweepable(file_name: &str) -> bool {
    BlobKind::from_file_name(file_name).map_or(true, |kind| kind.expires())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_file_name() {
        let id = Uuid::new_v4();
        for kind in [BlobKind::Pdf, BlobKind::Zip, BlobKind::Report] {
            let key = blob_key(Uuid::new_v4(), kind, id);
            let file_name = key.rsplit('/').next().unwrap();
            assert_eq!(BlobKind::from_file_name(file_name), Some(kind));
        }
        assert_eq!(BlobKind::from_file_name(&format!("{id}.part")), None);
    }

    #[test]
    fn test_reports_are_never_swept() {
        let id = Uuid::new_v4();
        assert!(!is_sweepable(&format!("{id}.report.pdf")));
        assert!(is_sweepable(&format!("{id}.pdf")));
        assert!(is_sweepable(&format!("{id}.zip")));
        assert!(is_sweepable(&format!("{id}.report.part")));
    }
}
