//! Application wiring.
//!
//! The source of record for construction order: the store and the lazy
//! uploader reference exist first, the batcher logs into the lazy reference,
//! the uploader is built last and then bound — resolving the
//! uploader-logs-through-batcher / batcher-uploads-through-uploader cycle
//! exactly once at startup. Everything is passed by reference; there are no
//! module-level singletons.

pub mod logging;

pub use logging::init_logging;

use crate::batcher::{BatcherConfig, LogBatcher};
use crate::domain::{
    DocumentContents, DocumentType, FeedbackInfo, LogInfo, Priority,
};
use crate::sender::{ClientConfig, ClientError, HttpApiClient};
use crate::store::{SledStore, StoreError};
use crate::uploader::{DocumentUploader, LazyUploader, UploaderConfig};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Client error: {0}")]
    Client(#[from] ClientError),
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Directory for the embedded queue database.
    pub db_path: PathBuf,
    pub client: ClientConfig,
    pub uploader: UploaderConfig,
    pub batcher: BatcherConfig,
}

impl TransportConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            client: ClientConfig::default(),
            uploader: UploaderConfig::default(),
            batcher: BatcherConfig::default(),
        }
    }
}

/// Typed facade over the upload queue and the batched logger, the only
/// surface business logic needs.
pub struct Transport {
    uploader: DocumentUploader<SledStore, HttpApiClient>,
    logger: LogBatcher<SledStore>,
}

pub fn create_transport(config: TransportConfig) -> Result<Transport, TransportError> {
    let store = SledStore::open(&config.db_path)?;
    let lazy = Arc::new(LazyUploader::new());
    let logger = LogBatcher::new(Arc::clone(&lazy), store.clone(), config.batcher);
    let api = HttpApiClient::new(config.client)?;
    let uploader = DocumentUploader::new(store, api, config.uploader);
    lazy.bind(Arc::new(uploader.clone()));

    Ok(Transport { uploader, logger })
}

impl Transport {
    /// Queue a survey visit document. The payload is opaque to the queue;
    /// repeated saves with the same uid coalesce into one pending upload.
    pub fn save_visit(&self, local_uid: &str, visit: serde_json::Value) {
        self.uploader.save(
            local_uid,
            DocumentContents::Visit(visit),
            DocumentType::Visit,
            Priority::Visit,
        );
    }

    pub fn save_feedback(&self, subject: &str, body: &str) {
        self.uploader.save(
            &Uuid::new_v4().to_string(),
            DocumentContents::Feedback(FeedbackInfo {
                subject: subject.to_string(),
                body: body.to_string(),
            }),
            DocumentType::Feedback,
            Priority::Feedback,
        );
    }

    /// Crash logs jump the queue: priority 0, delivered before anything else.
    pub fn save_crash_log(&self, logentry: &str) {
        self.uploader.save(
            &Uuid::new_v4().to_string(),
            DocumentContents::Log(LogInfo {
                logentry: logentry.to_string(),
            }),
            DocumentType::Log,
            Priority::CrashLog,
        );
    }

    pub async fn documents_awaiting_upload(&self) -> Result<usize, StoreError> {
        self.uploader.documents_awaiting_upload().await
    }

    pub fn logger(&self) -> &LogBatcher<SledStore> {
        &self.logger
    }

    pub fn uploader(&self) -> &DocumentUploader<SledStore, HttpApiClient> {
        &self.uploader
    }
}
