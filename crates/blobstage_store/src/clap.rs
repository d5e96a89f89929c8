//! Command line options for [`S3Config`].

use clap::Parser;
use url::Url;

use crate::S3Config;

/// S3 connection options. Every option can also be set through the
/// environment.
#[derive(Clone, Debug, PartialEq, Parser)]
pub struct S3ConfigOpts {
    /// The bucket to store blobs in
    #[arg(long, env = "S3_BUCKET", help_heading = "S3 Options")]
    pub bucket: Option<String>,

    /// The endpoint URL of the S3 backend
    #[arg(long, env = "S3_ENDPOINT", help_heading = "S3 Options")]
    pub endpoint_url: Option<Url>,

    /// The region of the S3 backend
    #[arg(long, env = "S3_LOCATION", help_heading = "S3 Options")]
    pub region: Option<String>,

    /// The access key ID for the S3 bucket.
    #[arg(long, env = "S3_KEY", requires_all = ["secret_access_key"], help_heading = "S3 Options")]
    pub access_key_id: Option<String>,

    /// The secret access key for the S3 bucket.
    #[arg(long, env = "S3_SECRET", requires_all = ["access_key_id"], help_heading = "S3 Options")]
    pub secret_access_key: Option<String>,

    /// The session token for the S3 bucket.
    #[arg(long, env = "S3_SESSION_TOKEN", requires_all = ["access_key_id", "secret_access_key"], help_heading = "S3 Options")]
    pub session_token: Option<String>,

    /// Address the bucket in the path instead of the host name
    #[arg(long, env = "S3_FORCE_PATH_STYLE", help_heading = "S3 Options")]
    pub force_path_style: bool,
}

impl From<S3ConfigOpts> for Option<S3Config> {
    fn from(value: S3ConfigOpts) -> Self {
        let bucket = value.bucket?;
        Some(S3Config {
            bucket,
            root: None,
            endpoint_url: value.endpoint_url,
            region: value.region,
            access_key_id: value.access_key_id,
            secret_access_key: value.secret_access_key,
            session_token: value.session_token,
            force_path_style: value.force_path_style,
        })
    }
}
