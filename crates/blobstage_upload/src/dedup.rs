use blobstage_staging::Blob;
use blobstage_store::{ObjectStore, StoreError};

/// The store could not tell whether an object exists.
#[derive(Debug, thiserror::Error)]
#[error("failed to look up '{key}'")]
pub struct DedupLookupError {
    /// The key that was looked up.
    pub key: String,
    /// The error returned by the store.
    #[source]
    pub source: StoreError,
}

/// The result of [`check_duplicate`].
#[derive(Debug)]
pub enum DedupDecision {
    /// An object with the same key and the same compressed size exists.
    Duplicate {
        /// The size of the stored object.
        size: u64,
    },

    /// There is no object under the key.
    Absent,

    /// An object exists under the key but its size differs from the blob.
    SizeMismatch {
        /// The size of the stored object.
        remote: u64,
        /// The compressed size of the local blob.
        local: u64,
    },

    /// The lookup failed. Treated as "not a duplicate".
    LookupFailed(DedupLookupError),
}

impl DedupDecision {
    /// Returns true if uploading the blob can be skipped.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, DedupDecision::Duplicate { .. })
    }
}

/// Determines whether `blob` already exists in `store` under `key`.
///
/// Only an object whose size equals the compressed size of the blob counts as
/// a duplicate. Failing lookups never produce an error. They are logged and
/// reported as [`DedupDecision::LookupFailed`], which means the blob is
/// uploaded again, even when the failure is caused by an unreachable store.
pub async fn check_duplicate<S: ObjectStore + ?Sized>(
    store: &S,
    key: &str,
    blob: &Blob,
) -> DedupDecision {
    let local = blob.compressed_size();
    match store.exists_and_stat(key).await {
        Ok(Some(stat)) if stat.size == local => DedupDecision::Duplicate { size: stat.size },
        Ok(Some(stat)) => {
            tracing::info!(
                "{key} exists but has {} bytes instead of {local}, uploading again",
                stat.size
            );
            DedupDecision::SizeMismatch {
                remote: stat.size,
                local,
            }
        }
        Ok(None) => DedupDecision::Absent,
        Err(source) => {
            let err = DedupLookupError {
                key: key.to_string(),
                source,
            };
            tracing::warn!("{err}: {}, assuming the blob is absent", err.source);
            DedupDecision::LookupFailed(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use blobstage_staging::{write_blob, StagingOptions};
    use blobstage_store::{MemoryStore, ObjectMetadata};

    fn stage(temp_dir: &std::path::Path, data: &str) -> Blob {
        let options = StagingOptions {
            temp_dir: Some(temp_dir.to_path_buf()),
            ..StagingOptions::default()
        };
        write_blob(&options, "test", &mut data.as_bytes(), None).unwrap()
    }

    #[tokio::test]
    async fn test_decisions() {
        let temp_dir = tempfile::tempdir().unwrap();
        let blob = stage(temp_dir.path(), "hello");
        let size = blob.compressed_size();
        let store = MemoryStore::new();

        assert_matches!(
            check_duplicate(&store, "key", &blob).await,
            DedupDecision::Absent
        );

        store.insert("key", vec![0; size as usize], ObjectMetadata::default());
        let decision = check_duplicate(&store, "key", &blob).await;
        assert!(decision.is_duplicate());

        store.insert("key", vec![0; size as usize + 1], ObjectMetadata::default());
        let decision = check_duplicate(&store, "key", &blob).await;
        assert!(!decision.is_duplicate());
        assert_matches!(decision, DedupDecision::SizeMismatch { remote, local } if remote == size + 1 && local == size);

        store.fail_stat(true);
        let decision = check_duplicate(&store, "key", &blob).await;
        assert!(!decision.is_duplicate());
        assert_matches!(decision, DedupDecision::LookupFailed(err) if err.key == "key");
    }
}
