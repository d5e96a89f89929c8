use url::Url;

/// Connection settings for an S3 compatible bucket.
///
/// The value is constructed once (for instance from command line options, see
/// `S3ConfigOpts` behind the `clap` feature) and handed to
/// [`crate::OpendalStore::s3`].
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct S3Config {
    /// The name of the bucket.
    pub bucket: String,

    /// A prefix inside the bucket under which all keys are stored.
    pub root: Option<String>,

    /// The endpoint of the S3 service. Defaults to AWS.
    pub endpoint_url: Option<Url>,

    /// The region of the bucket. Detected from the endpoint if absent.
    pub region: Option<String>,

    /// The access key id.
    pub access_key_id: Option<String>,

    /// The secret access key.
    pub secret_access_key: Option<String>,

    /// An optional session token for temporary credentials.
    pub session_token: Option<String>,

    /// Address the bucket as part of the path instead of the host name.
    pub force_path_style: bool,
}

impl S3Config {
    /// Creates a configuration for `bucket` with default settings.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Self::default()
        }
    }

    /// The endpoint to connect to.
    pub fn endpoint(&self) -> String {
        self.endpoint_url
            .as_ref()
            .map(|url| url.as_str().trim_end_matches('/').to_string())
            .unwrap_or_else(|| String::from("https://s3.amazonaws.com"))
    }
}
