//! Buffered, batched delivery of diagnostic log records.
//!
//! `LogBatcher` decouples high-frequency log writes from the cost of one
//! network upload per line: records accumulate in memory and in a single
//! durable pending-state record, and are handed to the upload queue as one
//! `LogBatch` document once a size or age threshold is crossed (or
//! immediately when a fatal record arrives).

use crate::domain::{
    DocumentContents, DocumentType, LogBatchInfo, LogLevel, LogRecord, PendingLogState, Priority,
    SCHEMA_ID,
};
use crate::pump::Pump;
use crate::store::{DocumentStore, StoreError};
use crate::uploader::LazyUploader;
use futures::FutureExt;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;

const ELLIPSIS: &str = " ... ";

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Failed to persist pending log state: {source}\nWhile writing log batch:\n{summary}")]
    Persist {
        source: StoreError,
        /// Tail of the records involved, so a crash handler still has a
        /// chance to capture what was being flushed.
        summary: String,
    },
    #[error("Failed to encode pending log state: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct BatcherConfig {
    /// Per-record overhead added to the guessed size, covering timestamps,
    /// level names and serialization framing.
    pub guess_record_overhead_chars: usize,
    pub target_batch_size_chars: usize,
    pub target_batch_interval: Duration,
    /// Log lines longer than this are truncated (head + " ... " + tail).
    pub max_line_length: usize,
    pub line_truncate_tail: usize,
    /// Single fixed key under which the pending state is persisted.
    pub state_key: String,
    /// Echo every record through tracing as well, for development.
    pub echo_to_console: bool,
    pub upload_priority: Priority,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            guess_record_overhead_chars: 40,
            target_batch_size_chars: 2 * 1024 * 1024,
            target_batch_interval: Duration::from_secs(20 * 60),
            max_line_length: 256,
            line_truncate_tail: 50,
            state_key: "PendingLogRecords".to_string(),
            echo_to_console: false,
            upload_priority: Priority::LogBatch,
        }
    }
}

pub struct LogBatcher<S> {
    inner: Arc<BatcherInner<S>>,
}

impl<S> Clone for LogBatcher<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct BatcherInner<S> {
    uploader: Arc<LazyUploader>,
    store: S,
    config: BatcherConfig,
    buffer: Mutex<Vec<LogRecord>>,
    pump: Pump,
}

impl<S> LogBatcher<S>
where
    S: DocumentStore,
{
    pub fn new(uploader: Arc<LazyUploader>, store: S, config: BatcherConfig) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<BatcherInner<S>>| {
            let pump = {
                let weak = weak.clone();
                Pump::new("log-batcher", move || {
                    let weak = weak.clone();
                    async move {
                        if let Some(inner) = weak.upgrade() {
                            inner.pump_state().await?;
                        }
                        Ok(())
                    }
                    .boxed()
                })
            };
            BatcherInner {
                uploader,
                store,
                config,
                buffer: Mutex::new(Vec::new()),
                pump,
            }
        });
        Self { inner }
    }

    pub fn debug(&self, text: &str) {
        self.write(LogLevel::Debug, text);
    }

    pub fn info(&self, text: &str) {
        self.write(LogLevel::Info, text);
    }

    pub fn warn(&self, text: &str) {
        self.write(LogLevel::Warn, text);
    }

    pub fn error(&self, text: &str) {
        self.write(LogLevel::Error, text);
    }

    pub fn fatal(&self, text: &str) {
        self.write(LogLevel::Fatal, text);
    }

    /// Synchronous, non-blocking append; delivery happens asynchronously.
    pub fn write(&self, level: LogLevel, text: &str) {
        let record = LogRecord::new(level, self.inner.truncate_line(text));
        self.inner.echo(&record);
        self.write_record(record);
    }

    /// Append a pre-shaped record. No truncation is applied.
    pub fn write_record(&self, record: LogRecord) {
        self.inner.buffer.lock().push(record);
        self.inner.pump.start();
    }
}

impl<S> BatcherInner<S>
where
    S: DocumentStore,
{
    async fn pump_state(&self) -> Result<(), BatchError> {
        loop {
            let new_records = {
                let mut buffer = self.buffer.lock();
                if buffer.is_empty() {
                    break;
                }
                std::mem::take(&mut *buffer)
            };

            let state = self.load_pending().await;
            let added: usize = new_records.iter().map(|r| self.guess_size(r)).sum();
            let size = state.size + added;
            let mut records = state.records;
            records.extend(new_records.iter().cloned());

            let age = records.first().map(record_age).unwrap_or(Duration::ZERO);
            let has_fatal = records.iter().any(|r| r.level == LogLevel::Fatal);
            let uploader = self.uploader.get();
            let needs_upload = size > self.config.target_batch_size_chars
                || age > self.config.target_batch_interval
                || has_fatal;

            if let Some(uploader) = uploader.filter(|_| needs_upload) {
                let batch = LogBatchInfo {
                    timestamp: chrono::Utc::now().to_rfc3339(),
                    records: records.clone(),
                };
                // The upload queue owns these records from here on; only the
                // durable reset can still fail.
                uploader.save(
                    &uuid::Uuid::new_v4().to_string(),
                    DocumentContents::LogBatch(batch),
                    DocumentType::LogBatch,
                    self.config.upload_priority,
                );
                self.persist(&PendingLogState::empty(), &records).await?;
            } else {
                let combined = PendingLogState {
                    schema_version: SCHEMA_ID,
                    size,
                    records: records.clone(),
                };
                if let Err(e) = self.persist(&combined, &records).await {
                    // Keep the drained records buffered so a later attempt
                    // (or a crash handler) can still pick them up.
                    let mut buffer = self.buffer.lock();
                    let mut restored = new_records;
                    restored.append(&mut buffer);
                    *buffer = restored;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn persist(
        &self,
        state: &PendingLogState,
        involved: &[LogRecord],
    ) -> Result<(), BatchError> {
        let bytes = serde_json::to_vec(state)?;
        self.store
            .put(&self.config.state_key, &bytes)
            .await
            .map_err(|source| BatchError::Persist {
                source,
                summary: summarize(involved),
            })
    }

    async fn load_pending(&self) -> PendingLogState {
        match self.store.get(&self.config.state_key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(state) => state,
                Err(e) => {
                    tracing::debug!("pending log state unreadable, starting empty: {e}");
                    PendingLogState::empty()
                }
            },
            Ok(None) => PendingLogState::empty(),
            Err(e) => {
                tracing::debug!("pending log state unavailable, starting empty: {e}");
                PendingLogState::empty()
            }
        }
    }

    fn guess_size(&self, record: &LogRecord) -> usize {
        record.timestamp.len()
            + record.level.as_str().len()
            + record.text.len()
            + self.config.guess_record_overhead_chars
    }

    fn truncate_line(&self, text: &str) -> String {
        let max = self.config.max_line_length;
        let total = text.chars().count();
        if total <= max {
            return text.to_string();
        }
        if max <= ELLIPSIS.len() {
            return text.chars().take(max).collect();
        }
        // The tail is clamped so head + marker + tail never exceeds max.
        let tail = self
            .config
            .line_truncate_tail
            .min(max - ELLIPSIS.len());
        let head = max - ELLIPSIS.len() - tail;
        let head_part: String = text.chars().take(head).collect();
        let tail_part: String = text.chars().skip(total - tail).collect();
        format!("{head_part}{ELLIPSIS}{tail_part}")
    }

    fn echo(&self, record: &LogRecord) {
        if !self.config.echo_to_console {
            return;
        }
        match record.level {
            LogLevel::Debug => tracing::debug!(target: "uplink::log", "{}", record.text),
            LogLevel::Info => tracing::info!(target: "uplink::log", "{}", record.text),
            LogLevel::Warn => tracing::warn!(target: "uplink::log", "{}", record.text),
            LogLevel::Error | LogLevel::Fatal => {
                tracing::error!(target: "uplink::log", "{}", record.text);
            }
        }
    }
}

fn record_age(record: &LogRecord) -> Duration {
    match chrono::DateTime::parse_from_rfc3339(&record.timestamp) {
        Ok(then) => (chrono::Utc::now() - then.with_timezone(&chrono::Utc))
            .to_std()
            .unwrap_or(Duration::ZERO),
        Err(_) => Duration::ZERO,
    }
}

/// Tail summary of a record set, kept short enough to ride along inside an
/// error message.
fn summarize(records: &[LogRecord]) -> String {
    let start = records.len().saturating_sub(40);
    records[start..].iter().fold(String::new(), |mut acc, r| {
        use std::fmt::Write;
        let _ = writeln!(acc, "{}: [{}] {}", r.timestamp, r.level.as_str(), r.text);
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn batcher(config: BatcherConfig) -> LogBatcher<MemoryStore> {
        LogBatcher::new(Arc::new(LazyUploader::new()), MemoryStore::new(), config)
    }

    #[test]
    fn short_lines_pass_through_untouched() {
        let batcher = batcher(BatcherConfig::default());
        assert_eq!(batcher.inner.truncate_line("hello"), "hello");
    }

    #[test]
    fn long_lines_keep_head_and_tail() {
        let config = BatcherConfig {
            max_line_length: 40,
            line_truncate_tail: 10,
            ..BatcherConfig::default()
        };
        let batcher = batcher(config);
        let line = "x".repeat(30) + &"y".repeat(30);
        let truncated = batcher.inner.truncate_line(&line);
        assert_eq!(truncated.chars().count(), 40);
        assert!(truncated.starts_with("xxxxx"));
        assert!(truncated.contains(ELLIPSIS));
        assert!(truncated.ends_with("yyyyyyyyyy"));
    }

    #[test]
    fn truncation_is_char_boundary_safe() {
        let config = BatcherConfig {
            max_line_length: 20,
            line_truncate_tail: 5,
            ..BatcherConfig::default()
        };
        let batcher = batcher(config);
        let line = "é".repeat(50);
        let truncated = batcher.inner.truncate_line(&line);
        assert_eq!(truncated.chars().count(), 20);
    }

    #[test]
    fn oversized_tail_config_still_respects_max_length() {
        let config = BatcherConfig {
            max_line_length: 10,
            line_truncate_tail: 50,
            ..BatcherConfig::default()
        };
        let batcher = batcher(config);
        let line = "a".repeat(100);
        let truncated = batcher.inner.truncate_line(&line);
        assert_eq!(truncated.chars().count(), 10);
        assert!(truncated.ends_with("aaaaa"));
    }

    #[test]
    fn tiny_max_length_degrades_to_a_plain_cut() {
        let config = BatcherConfig {
            max_line_length: 4,
            line_truncate_tail: 50,
            ..BatcherConfig::default()
        };
        let batcher = batcher(config);
        let truncated = batcher.inner.truncate_line(&"b".repeat(100));
        assert_eq!(truncated, "bbbb");
    }

    #[test]
    fn guessed_size_includes_overhead() {
        let batcher = batcher(BatcherConfig {
            guess_record_overhead_chars: 40,
            ..BatcherConfig::default()
        });
        let record = LogRecord::new(LogLevel::Info, "abc");
        let size = batcher.inner.guess_size(&record);
        assert_eq!(size, record.timestamp.len() + "INFO".len() + 3 + 40);
    }

    #[test]
    fn summary_keeps_only_the_tail() {
        let records: Vec<LogRecord> = (0..100)
            .map(|i| LogRecord::new(LogLevel::Debug, format!("line {i}")))
            .collect();
        let summary = summarize(&records);
        assert_eq!(summary.lines().count(), 40);
        assert!(summary.contains("line 99"));
        assert!(!summary.contains("line 59\n"));
    }
}
