use super::device::DeviceInfo;
use super::log_record::LogRecord;
use serde::{Deserialize, Serialize};

/// Protocol schema revision carried on every persisted and uploaded body.
pub const SCHEMA_ID: u32 = 1;

/// Key prefix under which queued documents live in the local store.
pub const DOCUMENTS_PREFIX: &str = "documents/";

/// Kind of document travelling through the upload queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    Visit,
    Feedback,
    Log,
    LogBatch,
}

/// Delivery precedence of a queued document. Lower values upload first.
///
/// The discriminants are part of the local store key layout
/// (`documents/{priority}/{local_uid}`), so they must stay single-digit and
/// must not be renumbered while queues may hold persisted entries.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum Priority {
    CrashLog = 0,
    Visit = 1,
    Feedback = 2,
    LogBatch = 3,
}

impl Priority {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Local store key for a queued document.
///
/// Lexical order over these keys is the upload order: priority digit first,
/// then local uid.
pub fn document_key(priority: Priority, local_uid: &str) -> String {
    format!("{DOCUMENTS_PREFIX}{priority}/{local_uid}")
}

/// Application payload carried by a queued document.
///
/// Visit payloads are opaque to the queue (their shape belongs to the survey
/// layer), the remaining kinds are structured here. Serialized untagged; the
/// catch-all `Visit` variant must stay last so the structured kinds win on
/// deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentContents {
    Feedback(FeedbackInfo),
    Log(LogInfo),
    LogBatch(LogBatchInfo),
    Visit(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackInfo {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogInfo {
    pub logentry: String,
}

/// One uploaded document aggregating many buffered log records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogBatchInfo {
    /// ISO-8601 timestamp of when the batch was assembled.
    pub timestamp: String,
    /// Chronological, insertion order preserved.
    pub records: Vec<LogRecord>,
}

/// The full body persisted in the local store and PUT to the server.
///
/// `csruid` is `None` until the server issues an id; once set it never
/// changes, so every delivery attempt of the same entry uses the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolDocument {
    pub schema_id: u32,
    pub csruid: Option<String>,
    pub document_type: DocumentType,
    pub device: DeviceInfo,
    pub document: DocumentContents,
}

impl ProtocolDocument {
    pub fn new(document_type: DocumentType, device: DeviceInfo, document: DocumentContents) -> Self {
        Self {
            schema_id: SCHEMA_ID,
            csruid: None,
            document_type,
            device,
            document,
        }
    }
}

/// Durable buffer of not-yet-flushed log records, stored under a single
/// fixed key and owned exclusively by the batcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingLogState {
    pub schema_version: u32,
    /// Running estimate, in characters, of the buffered payload size.
    pub size: usize,
    pub records: Vec<LogRecord>,
}

impl PendingLogState {
    pub fn empty() -> Self {
        Self {
            schema_version: SCHEMA_ID,
            size: 0,
            records: Vec::new(),
        }
    }
}
