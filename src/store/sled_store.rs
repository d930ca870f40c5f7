use super::{DocumentStore, StoreError};
use std::path::Path;

/// Embedded durable store backed by sled.
///
/// Writes are flushed to disk before returning so that a queued document
/// survives abrupt process death; the queue invariants depend on an entry
/// existing exactly while it is undelivered.
#[derive(Debug, Clone)]
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// In-memory sled instance, handy for throwaway transports.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    fn key_to_string(key: &sled::IVec) -> Result<String, StoreError> {
        String::from_utf8(key.to_vec())
            .map_err(|e| StoreError::InvalidKey(format!("non-utf8 key in store: {e}")))
    }
}

impl DocumentStore for SledStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.db.get(key)?.map(|value| value.to_vec()))
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.db.insert(key, value)?;
        self.db.flush_async().await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.db.remove(key)?;
        self.db.flush_async().await?;
        Ok(())
    }

    async fn first_with_prefix(
        &self,
        prefix: &str,
    ) -> Result<Option<(String, Vec<u8>)>, StoreError> {
        match self.db.scan_prefix(prefix).next() {
            Some(entry) => {
                let (key, value) = entry?;
                Ok(Some((Self::key_to_string(&key)?, value.to_vec())))
            }
            None => Ok(None),
        }
    }

    async fn count_with_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        let mut count = 0;
        for entry in self.db.scan_prefix(prefix) {
            entry?;
            count += 1;
        }
        Ok(count)
    }
}
