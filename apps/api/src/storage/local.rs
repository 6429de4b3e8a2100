use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{blob_key, is_sweepable, BlobKind, BlobStore, StorageError};

/// Blob store on the local filesystem, rooted at `UPLOAD_DIR`.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn path_for(&self, owner: Uuid, kind: BlobKind, id: Uuid) -> PathBuf {
        self.root.join(blob_key(owner, kind, id))
    }
}

fn absent_as_none<T>(result: std::io::Result<T>) -> Result<Option<T>, StorageError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn sweep_dir(dir: &Path, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
    let mut removed = 0;
    let mut entries = match absent_as_none(fs::read_dir(dir).await)? {
        Some(entries) => entries,
        None => return Ok(0),
    };
    while let Some(entry) = entries.next_entry().await? {
        if !is_sweepable(&entry.file_name().to_string_lossy()) {
            continue;
        }
        // Removed by a concurrent delete since the listing.
        let Some(metadata) = absent_as_none(entry.metadata().await)? else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let modified: DateTime<Utc> = metadata.modified()?.into();
        if modified < cutoff {
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove expired blob {:?}: {e}", entry.path()),
            }
        }
    }
    Ok(removed)
}

/// Writes `data` to `path` through a staging file. The owner directory may
/// be removed by the sweeper between creation and write, so that case is
/// retried once.
async fn write_blob(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    let staging = path.with_extension("part");
    let mut attempts = 0;
    loop {
        attempts += 1;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let written = match fs::write(&staging, data).await {
            Ok(()) => fs::rename(&staging, path).await,
            Err(e) => Err(e),
        };
        match written {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound && attempts < 2 => {
                debug!("Owner directory vanished while writing {:?}, retrying", path);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    fn kind(&self) -> &'static str {
        "local"
    }

    async fn put(&self, owner: Uuid, kind: BlobKind, data: Bytes) -> Result<Uuid, StorageError> {
        let id = Uuid::new_v4();
        let path = self.path_for(owner, kind, id);

        // Write then rename so readers never observe a partial file.
        write_blob(&path, &data).await?;

        debug!("Stored {} bytes at {:?}", data.len(), path);
        Ok(id)
    }

    async fn get(
        &self,
        owner: Uuid,
        kind: BlobKind,
        id: Uuid,
    ) -> Result<Option<Bytes>, StorageError> {
        let data = absent_as_none(fs::read(self.path_for(owner, kind, id)).await)?;
        Ok(data.map(Bytes::from))
    }

    async fn size(
        &self,
        owner: Uuid,
        kind: BlobKind,
        id: Uuid,
    ) -> Result<Option<u64>, StorageError> {
        let metadata = absent_as_none(fs::metadata(self.path_for(owner, kind, id)).await)?;
        Ok(metadata.map(|m| m.len()))
    }

    async fn delete(&self, owner: Uuid, kind: BlobKind, id: Uuid) -> Result<(), StorageError> {
        absent_as_none(fs::remove_file(self.path_for(owner, kind, id)).await)?;
        Ok(())
    }

    async fn sweep_expired(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        let mut removed = 0;
        let mut owners = fs::read_dir(&self.root).await?;
        while let Some(owner_dir) = owners.next_entry().await? {
            match absent_as_none(owner_dir.file_type().await)? {
                Some(file_type) if file_type.is_dir() => {}
                _ => continue,
            }
            removed += sweep_dir(&owner_dir.path(), cutoff).await?;
            // Only succeeds once the directory is empty.
            let _ = fs::remove_dir(owner_dir.path()).await;
        }
        Ok(removed)
    }
}
