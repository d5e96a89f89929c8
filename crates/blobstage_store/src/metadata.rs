use std::collections::HashMap;

const UNCOMPRESSED_SIZE_KEY: &str = "uncompressed-size";
const REFERENCE_KEY: &str = "reference-name";
const IS_DIRECTORY_KEY: &str = "is-dir";

/// Metadata attached to every stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectMetadata {
    /// The number of bytes before compression.
    pub uncompressed_size: u64,

    /// The display label of the blob.
    pub reference: String,

    /// Whether the blob is an archive of a directory tree.
    pub is_directory: bool,
}

impl ObjectMetadata {
    /// Converts the metadata to the string map stored alongside the object.
    pub fn to_user_metadata(&self) -> HashMap<String, String> {
        HashMap::from([
            (
                UNCOMPRESSED_SIZE_KEY.to_string(),
                self.uncompressed_size.to_string(),
            ),
            (REFERENCE_KEY.to_string(), self.reference.clone()),
            (IS_DIRECTORY_KEY.to_string(), self.is_directory.to_string()),
        ])
    }

    /// Parses the metadata from a stored string map. Returns `None` if the
    /// size or the directory flag is missing or malformed.
    pub fn from_user_metadata(map: &HashMap<String, String>) -> Option<Self> {
        let uncompressed_size = map.get(UNCOMPRESSED_SIZE_KEY)?.parse().ok()?;
        let is_directory = match map.get(IS_DIRECTORY_KEY)?.as_str() {
            "true" => true,
            "false" => false,
            _ => return None,
        };
        Some(Self {
            uncompressed_size,
            reference: map.get(REFERENCE_KEY).cloned().unwrap_or_default(),
            is_directory,
        })
    }
}
