//! The authoritative queue for outbound documents.
//!
//! `DocumentUploader` persists every save into the local store, acquires a
//! server-issued id per document before its first upload, PUTs the body and
//! removes the entry only on a confirmed 200. All failures degrade to "try
//! again after the retry delay"; nothing is surfaced to the caller of
//! `save`, which is fire-and-forget by contract.

pub mod lazy;

pub use lazy::LazyUploader;

use crate::domain::{
    DOCUMENTS_PREFIX, DeviceInfo, DocumentContents, DocumentType, Priority, ProtocolDocument,
    document_key,
};
use crate::pump::{Pump, RetryTimer};
use crate::sender::ApiClient;
use crate::store::{DocumentStore, StoreError};
use futures::FutureExt;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Delay before a failed or stalled upload attempt is retried.
    pub retry_delay: Duration,
    pub retry_jitter: bool,
    /// Stable per-install identifier stamped into device snapshots.
    pub installation_id: String,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(60),
            retry_jitter: true,
            installation_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// Fire-and-forget handle to an upload queue.
///
/// Object-safe so the batcher can hold it behind `LazyUploader` without
/// caring about the store and client type parameters.
pub trait Uploader: Send + Sync {
    fn save(
        &self,
        local_uid: &str,
        contents: DocumentContents,
        document_type: DocumentType,
        priority: Priority,
    );
}

enum Event {
    Save(SaveEvent),
    UploadNext,
}

struct SaveEvent {
    local_uid: String,
    contents: DocumentContents,
    document_type: DocumentType,
    priority: Priority,
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::Save(save) => {
                write!(f, "Save({})", document_key(save.priority, &save.local_uid))
            }
            Event::UploadNext => write!(f, "UploadNext"),
        }
    }
}

pub struct DocumentUploader<S, A> {
    inner: Arc<UploaderInner<S, A>>,
}

impl<S, A> Clone for DocumentUploader<S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct UploaderInner<S, A> {
    store: S,
    api: A,
    installation_id: String,
    pending_events: Mutex<Vec<Event>>,
    pump: Pump,
    timer: RetryTimer,
}

impl<S, A> DocumentUploader<S, A>
where
    S: DocumentStore,
    A: ApiClient,
{
    pub fn new(store: S, api: A, config: UploaderConfig) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<UploaderInner<S, A>>| {
            let pump = {
                let weak = weak.clone();
                Pump::new("uploader", move || {
                    let weak = weak.clone();
                    async move {
                        if let Some(inner) = weak.upgrade() {
                            inner.pump_events().await;
                        }
                        Ok(())
                    }
                    .boxed()
                })
            };
            let timer = {
                let weak = weak.clone();
                RetryTimer::new(config.retry_delay, config.retry_jitter, move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.fire(Event::UploadNext);
                    }
                })
            };
            UploaderInner {
                store,
                api,
                installation_id: config.installation_id,
                // Drain whatever a previous process run left behind.
                pending_events: Mutex::new(vec![Event::UploadNext]),
                pump,
                timer,
            }
        });
        inner.pump.start();
        Self { inner }
    }

    /// Enqueue a document for eventual delivery. Never blocks, never fails
    /// from the caller's point of view; a later save with the same
    /// `local_uid` and priority supersedes the pending payload.
    pub fn save(
        &self,
        local_uid: &str,
        contents: DocumentContents,
        document_type: DocumentType,
        priority: Priority,
    ) {
        self.inner.fire(Event::Save(SaveEvent {
            local_uid: local_uid.to_string(),
            contents,
            document_type,
            priority,
        }));
    }

    /// Number of entries still awaiting confirmed delivery.
    pub async fn documents_awaiting_upload(&self) -> Result<usize, StoreError> {
        self.inner.store.count_with_prefix(DOCUMENTS_PREFIX).await
    }

    /// Whether a retry is currently armed. Quiet exactly when the queue was
    /// last observed empty.
    pub fn retry_pending(&self) -> bool {
        self.inner.timer.is_pending()
    }
}

impl<S, A> Uploader for DocumentUploader<S, A>
where
    S: DocumentStore,
    A: ApiClient,
{
    fn save(
        &self,
        local_uid: &str,
        contents: DocumentContents,
        document_type: DocumentType,
        priority: Priority,
    ) {
        DocumentUploader::save(self, local_uid, contents, document_type, priority);
    }
}

impl<S, A> UploaderInner<S, A>
where
    S: DocumentStore,
    A: ApiClient,
{
    fn fire(&self, event: Event) {
        tracing::debug!("fire event '{event}'");
        self.pending_events.lock().push(event);
        self.pump.start();
    }

    /// One pump pass: drain the current event batch, then any batch that
    /// arrived while draining, until none remain. Event order within a batch
    /// is submission order.
    async fn pump_events(&self) {
        loop {
            let batch = {
                let mut pending = self.pending_events.lock();
                if pending.is_empty() {
                    break;
                }
                std::mem::take(&mut *pending)
            };
            for event in batch {
                // Fairness: large backlogs must not monopolize the executor.
                tokio::task::yield_now().await;
                let result = match event {
                    Event::Save(save) => self.handle_save(save).await,
                    Event::UploadNext => self.handle_upload_next().await,
                };
                if let Err(e) = result {
                    // Local-store trouble degrades to a retry, like any
                    // delivery failure.
                    tracing::error!("event handling failed: {e}");
                    self.timer.start();
                }
            }
        }
    }

    async fn handle_save(&self, save: SaveEvent) -> Result<(), UploadError> {
        let key = document_key(save.priority, &save.local_uid);
        let device = DeviceInfo::capture(&self.installation_id);
        let body = match self.store.get(&key).await? {
            Some(bytes) => match serde_json::from_slice::<ProtocolDocument>(&bytes) {
                Ok(mut existing) => {
                    // Last write wins on payload and device snapshot; an
                    // already-assigned server id survives the merge, and the
                    // document type stays fixed at first save.
                    existing.device = device;
                    existing.document = save.contents;
                    tracing::debug!("updating existing '{key}'");
                    existing
                }
                Err(e) => {
                    tracing::warn!("replacing unreadable entry at '{key}': {e}");
                    ProtocolDocument::new(save.document_type, device, save.contents)
                }
            },
            None => {
                tracing::debug!("saving new '{key}'");
                ProtocolDocument::new(save.document_type, device, save.contents)
            }
        };
        self.store.put(&key, &serde_json::to_vec(&body)?).await?;
        tracing::debug!("saved '{key}'");
        self.fire(Event::UploadNext);
        Ok(())
    }

    async fn handle_upload_next(&self) -> Result<(), UploadError> {
        let Some((key, bytes)) = self.store.first_with_prefix(DOCUMENTS_PREFIX).await? else {
            // No pending documents: idle until the next save.
            tracing::debug!("done uploading for now");
            self.timer.cancel();
            return Ok(());
        };
        tokio::task::yield_now().await;

        // Until the queue is known to be empty, keep a retry armed so a
        // stalled or silently failed attempt is re-driven later.
        self.timer.start();

        let mut entry: ProtocolDocument = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::error!("unreadable queue entry at '{key}', skipping this pass: {e}");
                return Ok(());
            }
        };

        let Some(csruid) = entry.csruid.clone() else {
            match self.api.fetch_document_id().await {
                Ok(id) => {
                    // Persist the id before any PUT so retries of this entry
                    // reuse it instead of minting duplicates.
                    entry.csruid = Some(id);
                    self.store.put(&key, &serde_json::to_vec(&entry)?).await?;
                    tokio::task::yield_now().await;
                    self.fire(Event::UploadNext);
                }
                Err(e) => {
                    tracing::debug!("could not obtain a server id for '{key}': {e}");
                }
            }
            return Ok(());
        };

        match self.api.put_document(&csruid, &entry).await {
            Ok(()) => {
                tokio::task::yield_now().await;
                if self.store.get(&key).await?.is_some() {
                    self.store.remove(&key).await?;
                    tracing::debug!("removed delivered '{key}'");
                } else {
                    // The store is the source of truth; an absent entry just
                    // means there is nothing left to remove.
                    tracing::warn!("could not retrieve '{key}' when trying to remove");
                }
                self.fire(Event::UploadNext);
            }
            Err(e) => {
                // Silent stop; the armed timer owns the retry.
                tracing::debug!("upload attempt for '{key}' failed: {e}");
            }
        }
        Ok(())
    }
}

impl<S, A> Drop for UploaderInner<S, A> {
    fn drop(&mut self) {
        self.timer.cancel();
    }
}
