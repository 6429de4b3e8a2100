use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use super::{blob_key, is_sweepable, BlobKind, BlobStore, StorageError};
use crate::config::S3Config;

/// Blob store on S3 / MinIO. Keys are `uploads/<owner>/<id>.<ext>`.
pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

const PREFIX: &str = "uploads/";

impl S3BlobStore {
    /// Constructs a client configured for MinIO (local) or AWS (production).
    pub async fn new(config: &S3Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "resify-static",
        );

        let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(credentials)
            .endpoint_url(&config.endpoint)
            .load()
            .await;

        info!("S3 blob store using bucket {}", config.bucket);
        Self {
            client: Client::new(&s3_config),
            bucket: config.bucket.clone(),
        }
    }

    fn key_for(owner: Uuid, kind: BlobKind, id: Uuid) -> String {
        format!("{PREFIX}{}", blob_key(owner, kind, id))
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    fn kind(&self) -> &'static str {
        "s3"
    }

    async fn put(&self, owner: Uuid, kind: BlobKind, data: Bytes) -> Result<Uuid, StorageError> {
        let id = Uuid::new_v4();
        let key = Self::key_for(owner, kind, id);
        let len = data.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data))
            .content_type(kind.content_type())
            .send()
            .await
            .map_err(|e| StorageError::S3(format!("upload of {key} failed: {e}")))?;

        debug!("Uploaded {len} bytes to s3://{}/{}", self.bucket, key);
        Ok(id)
    }

    async fn get(
        &self,
        owner: Uuid,
        kind: BlobKind,
        id: Uuid,
    ) -> Result<Option<Bytes>, StorageError> {
        let key = Self::key_for(owner, kind, id);
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                return Ok(None)
            }
            Err(e) => return Err(StorageError::S3(format!("download of {key} failed: {e}"))),
        };

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3(format!("reading {key} failed: {e}")))?;
        Ok(Some(data.into_bytes()))
    }

    async fn size(
        &self,
        owner: Uuid,
        kind: BlobKind,
        id: Uuid,
    ) -> Result<Option<u64>, StorageError> {
        let key = Self::key_for(owner, kind, id);
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(output) => Ok(Some(output.content_length().unwrap_or(0).max(0) as u64)),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(None),
            Err(e) => Err(StorageError::S3(format!("head of {key} failed: {e}"))),
        }
    }

    async fn delete(&self, owner: Uuid, kind: BlobKind, id: Uuid) -> Result<(), StorageError> {
        let key = Self::key_for(owner, kind, id);
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| StorageError::S3(format!("delete of {key} failed: {e}")))?;
        Ok(())
    }

    async fn sweep_expired(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        let mut removed = 0;
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(PREFIX)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| StorageError::S3(format!("listing failed: {e}")))?;

            for object in page.contents() {
                let expired = object
                    .last_modified()
                    .is_some_and(|modified| modified.secs() < cutoff.timestamp());
                let Some(key) = object.key() else { continue };
                let file_name = key.rsplit('/').next().unwrap_or(key);
                if !expired || !is_sweepable(file_name) {
                    continue;
                }
                self.client
                    .delete_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .send()
                    .await
                    .map_err(|e| StorageError::S3(format!("delete of {key} failed: {e}")))?;
                removed += 1;
            }

            match page.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        Ok(removed)
    }
}
