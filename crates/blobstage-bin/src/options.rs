use std::path::PathBuf;

use blobstage_staging::{CompressionLevel, StagingOptions};
use blobstage_store::{clap::S3ConfigOpts, OpendalStore, S3Config};
use blobstage_upload::{UploadConfig, DEFAULT_KEY_PREFIX};
use miette::{Context, IntoDiagnostic};

/// Selects the object store.
#[derive(Debug, clap::Parser)]
pub struct StoreOpt {
    /// Store blobs in a local directory instead of S3
    #[clap(long, value_name = "DIR")]
    local: Option<PathBuf>,

    #[clap(flatten)]
    s3: S3ConfigOpts,
}

impl StoreOpt {
    pub async fn open(self) -> miette::Result<OpendalStore> {
        if let Some(root) = self.local {
            tracing::debug!("using the local store at {}", root.display());
            return OpendalStore::local(&root)
                .into_diagnostic()
                .with_context(|| format!("failed to open the local store at {}", root.display()));
        }

        let config: Option<S3Config> = self.s3.into();
        let Some(config) = config else {
            return Err(miette::miette!(
                help = "pass --bucket, set S3_BUCKET or use --local <DIR>",
                "no object store was configured"
            ));
        };
        tracing::debug!("using the S3 bucket {}", config.bucket);
        OpendalStore::s3(&config)
            .await
            .into_diagnostic()
            .with_context(|| format!("failed to connect to the bucket {}", config.bucket))
    }
}

/// Controls how blobs are named and staged.
#[derive(Debug, clap::Parser)]
pub struct UploadOpt {
    /// The namespace prefix of the keys
    #[clap(long, default_value = DEFAULT_KEY_PREFIX)]
    prefix: String,

    /// Directory for temporary staging files
    #[clap(long, env = "BLOBSTAGE_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// The gzip compression level (1-9)
    #[clap(long, value_parser = clap::value_parser!(u32).range(1..=9))]
    compression_level: Option<u32>,
}

impl UploadOpt {
    pub fn config(self) -> UploadConfig {
        UploadConfig {
            key_prefix: self.prefix,
            staging: StagingOptions {
                temp_dir: self.temp_dir,
                compression: self
                    .compression_level
                    .map_or(CompressionLevel::Default, CompressionLevel::Numeric),
            },
        }
    }
}
