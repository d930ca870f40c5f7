//! Durable local store seam.
//!
//! The upload queue and the log batcher both persist through the
//! `DocumentStore` trait: an embedded, asynchronous key-to-document store
//! with ordered prefix scans. `SledStore` is the production implementation;
//! `MemoryStore` backs tests and ephemeral transports.
//!
//! Key namespaces are owned exclusively: `documents/*` by the uploader, the
//! pending-log key by the batcher. No two components write the same key.

pub mod memory;
pub mod sled_store;

pub use memory::MemoryStore;
pub use sled_store::SledStore;

use std::future::Future;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(#[from] sled::Error),
    #[error("Invalid store key: {0}")]
    InvalidKey(String),
}

/// Asynchronous key-to-document store.
///
/// Implementations are cheap handles: cloning shares the underlying
/// database, which is how the uploader and batcher share one store while
/// owning disjoint key namespaces.
pub trait DocumentStore: Send + Sync + 'static {
    fn get(&self, key: &str)
    -> impl Future<Output = Result<Option<Vec<u8>>, StoreError>> + Send;

    fn put(&self, key: &str, value: &[u8]) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Removing an absent key is not an error.
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// First entry whose key starts with `prefix`, in lexical key order.
    fn first_with_prefix(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Option<(String, Vec<u8>)>, StoreError>> + Send;

    fn count_with_prefix(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;
}
