use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use opendal::{layers::RetryLayer, ErrorKind, Operator};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::{ObjectMetadata, ObjectStat, ObjectStore, StoreError, BLOB_CONTENT_TYPE};

/// Local files are streamed to the backend in pieces of this size.
const UPLOAD_BUFFER_SIZE: usize = 64 * 1024;

/// Parts of a multipart upload are at least this large.
const UPLOAD_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// An [`ObjectStore`] backed by an [`opendal::Operator`].
#[derive(Debug, Clone)]
pub struct OpendalStore {
    op: Operator,
}

impl OpendalStore {
    /// Wraps an existing operator.
    pub fn new(op: Operator) -> Self {
        Self { op }
    }

    /// Returns the underlying operator.
    pub fn operator(&self) -> &Operator {
        &self.op
    }

    /// Connects to an S3 bucket.
    #[cfg(feature = "s3")]
    pub async fn s3(config: &crate::S3Config) -> Result<Self, StoreError> {
        use opendal::{
            services::{S3Config as OpendalS3Config, S3},
            Configurator,
        };

        if config.bucket.is_empty() {
            return Err(StoreError::Configuration(
                "no bucket was specified".to_string(),
            ));
        }

        let endpoint = config.endpoint();
        let mut s3_config = OpendalS3Config::default();
        s3_config.bucket = config.bucket.clone();
        s3_config.root = config.root.clone();
        s3_config.endpoint = Some(endpoint.clone());
        s3_config.enable_virtual_host_style = !config.force_path_style;

        let mut region = config.region.clone();
        if region.is_none() {
            region = S3::detect_region(&endpoint, &config.bucket).await;
        }
        if region.is_none() {
            tracing::debug!("could not detect the region of {}, using us-east-1", config.bucket);
        }
        s3_config.region = Some(region.unwrap_or_else(|| String::from("us-east-1")));

        if let (Some(access_key_id), Some(secret_access_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            s3_config.access_key_id = Some(access_key_id.clone());
            s3_config.secret_access_key = Some(secret_access_key.clone());
            s3_config.session_token = config.session_token.clone();
        }

        let builder = s3_config.into_builder();
        let op = Operator::new(builder)?.layer(RetryLayer::new()).finish();
        Ok(Self::new(op))
    }

    /// Stores objects as files below `root`. The directory is created if it
    /// does not exist.
    #[cfg(feature = "fs")]
    pub fn local(root: &Path) -> Result<Self, StoreError> {
        use opendal::{services::FsConfig, Configurator};

        fs_err::create_dir_all(root).map_err(StoreError::io(root))?;
        let root = fs_err::canonicalize(root).map_err(StoreError::io(root))?;

        let mut config = FsConfig::default();
        config.root = Some(root.to_string_lossy().to_string());
        let builder = config.into_builder();
        let op = Operator::new(builder)?.finish();
        Ok(Self::new(op))
    }

    async fn upload_file(
        &self,
        writer: &mut opendal::Writer,
        mut file: fs_err::tokio::File,
        source: &Path,
        key: &str,
    ) -> Result<(), StoreError> {
        let mut buffer = vec![0u8; UPLOAD_BUFFER_SIZE];
        let mut total = 0u64;
        loop {
            let read = file.read(&mut buffer).await.map_err(StoreError::io(source))?;
            if read == 0 {
                break;
            }
            writer.write(Bytes::copy_from_slice(&buffer[..read])).await?;
            total += read as u64;
        }
        writer.close().await?;
        tracing::debug!("wrote {total} bytes to {key}");
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for OpendalStore {
    async fn exists_and_stat(&self, key: &str) -> Result<Option<ObjectStat>, StoreError> {
        match self.op.stat(key).await {
            Ok(metadata) => Ok(Some(ObjectStat {
                size: metadata.content_length(),
                metadata: metadata
                    .user_metadata()
                    .and_then(ObjectMetadata::from_user_metadata),
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(
        &self,
        key: &str,
        source: &Path,
        metadata: &ObjectMetadata,
    ) -> Result<(), StoreError> {
        let file = fs_err::tokio::File::open(source)
            .await
            .map_err(StoreError::io(source))?;

        let capability = self.op.info().full_capability();

        let mut request = self.op.writer_with(key).chunk(UPLOAD_CHUNK_SIZE);
        if capability.write_with_content_type {
            request = request.content_type(BLOB_CONTENT_TYPE);
        }
        if capability.write_with_user_metadata {
            request = request.user_metadata(metadata.to_user_metadata());
        } else {
            tracing::trace!("backend does not store user metadata, skipping it for {key}");
        }
        let mut writer = request.await?;

        let result = self.upload_file(&mut writer, file, source, key).await;
        if result.is_err() {
            if let Err(err) = writer.abort().await {
                tracing::debug!("failed to abort the upload of {key}: {err}");
            }
        }
        result
    }

    async fn read(&self, key: &str, destination: &Path) -> Result<u64, StoreError> {
        // Readers are lazy, a missing object would only show up mid-stream.
        if self.exists_and_stat(key).await?.is_none() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        let reader = self.op.reader(key).await?;
        let mut stream = Box::pin(reader.into_bytes_stream(..).await?);

        let mut file = fs_err::tokio::File::create(destination)
            .await
            .map_err(StoreError::io(destination))?;
        let mut total = 0u64;
        while let Some(chunk) = stream
            .try_next()
            .await
            .map_err(|source| StoreError::Transfer {
                key: key.to_string(),
                source,
            })?
        {
            file.write_all(&chunk)
                .await
                .map_err(StoreError::io(destination))?;
            total += chunk.len() as u64;
        }
        file.flush().await.map_err(StoreError::io(destination))?;

        Ok(total)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        Ok(self.op.delete(key).await?)
    }
}
