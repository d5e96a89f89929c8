use std::{collections::HashMap, path::Path};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{ObjectMetadata, ObjectStat, ObjectStore, StoreError};

/// An object held by a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// The bytes of the object.
    pub data: Vec<u8>,
    /// The metadata it was uploaded with.
    pub metadata: ObjectMetadata,
}

#[derive(Default)]
struct Inner {
    objects: HashMap<String, StoredObject>,
    puts: usize,
    deletes: usize,
    fail_stat: bool,
    fail_put: bool,
    fail_delete: bool,
}

/// An [`ObjectStore`] that keeps all objects in memory.
///
/// Besides storing objects it counts the mutations it receives and can be
/// told to fail individual operations. A failing `put` leaves a truncated
/// object behind, the way an interrupted upload to a real backend may.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an object directly, without counting it as a `put`.
    pub fn insert(&self, key: impl Into<String>, data: Vec<u8>, metadata: ObjectMetadata) {
        self.inner
            .lock()
            .objects
            .insert(key.into(), StoredObject { data, metadata });
    }

    /// Returns a copy of the object stored under `key`.
    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.inner.lock().objects.get(key).cloned()
    }

    /// Returns all keys in lexical order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.inner.lock().objects.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// The number of stored objects.
    pub fn len(&self) -> usize {
        self.inner.lock().objects.len()
    }

    /// Returns true if the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of `put` calls received, successful or not.
    pub fn put_count(&self) -> usize {
        self.inner.lock().puts
    }

    /// The number of `delete` calls received, successful or not.
    pub fn delete_count(&self) -> usize {
        self.inner.lock().deletes
    }

    /// Makes every following `exists_and_stat` fail.
    pub fn fail_stat(&self, fail: bool) {
        self.inner.lock().fail_stat = fail;
    }

    /// Makes every following `put` fail after writing half of the object.
    pub fn fail_put(&self, fail: bool) {
        self.inner.lock().fail_put = fail;
    }

    /// Makes every following `delete` fail.
    pub fn fail_delete(&self, fail: bool) {
        self.inner.lock().fail_delete = fail;
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn exists_and_stat(&self, key: &str) -> Result<Option<ObjectStat>, StoreError> {
        let inner = self.inner.lock();
        if inner.fail_stat {
            return Err(StoreError::Other(format!("injected stat failure for '{key}'")));
        }
        Ok(inner.objects.get(key).map(|object| ObjectStat {
            size: object.data.len() as u64,
            metadata: Some(object.metadata.clone()),
        }))
    }

    async fn put(
        &self,
        key: &str,
        source: &Path,
        metadata: &ObjectMetadata,
    ) -> Result<(), StoreError> {
        let mut data = fs_err::tokio::read(source)
            .await
            .map_err(StoreError::io(source))?;

        let mut inner = self.inner.lock();
        inner.puts += 1;
        let result = if inner.fail_put {
            data.truncate(data.len() / 2);
            Err(StoreError::Other(format!("injected put failure for '{key}'")))
        } else {
            Ok(())
        };
        inner.objects.insert(
            key.to_string(),
            StoredObject {
                data,
                metadata: metadata.clone(),
            },
        );
        result
    }

    async fn read(&self, key: &str, destination: &Path) -> Result<u64, StoreError> {
        let data = self
            .object(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?
            .data;
        fs_err::tokio::write(destination, &data)
            .await
            .map_err(StoreError::io(destination))?;
        Ok(data.len() as u64)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.deletes += 1;
        if inner.fail_delete {
            return Err(StoreError::Other(format!("injected delete failure for '{key}'")));
        }
        inner.objects.remove(key);
        Ok(())
    }
}
