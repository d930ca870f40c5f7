//! Domain layer for uplink.
//!
//! Contains the canonical types shared across all modules:
//! - `ProtocolDocument`: the persisted and uploaded document body
//! - `DocumentType` / `Priority`: queue classification and delivery order
//! - `LogRecord` / `LogLevel`: buffered diagnostic records
//! - `DeviceInfo`: device snapshot captured at save time

pub mod device;
pub mod document;
pub mod log_record;

pub use device::DeviceInfo;
pub use document::{
    DOCUMENTS_PREFIX, DocumentContents, DocumentType, FeedbackInfo, LogBatchInfo, LogInfo,
    PendingLogState, Priority, ProtocolDocument, SCHEMA_ID, document_key,
};
pub use log_record::{LogLevel, LogRecord};
