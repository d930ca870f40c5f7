#![allow(dead_code)] // Each test binary uses a subset of these helpers.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uplink::domain::{DocumentContents, DocumentType, Priority, ProtocolDocument};
use uplink::sender::{ApiClient, ClientError};
use uplink::uploader::Uploader;

/// Scripted stand-in for the HTTP API. By default every id fetch yields a
/// fresh sequential id and every PUT succeeds; tests can front-load
/// failures that are consumed before the default behavior resumes.
#[derive(Clone, Default)]
pub struct FakeApi {
    state: Arc<Mutex<FakeApiState>>,
}

#[derive(Default)]
struct FakeApiState {
    offline: bool,
    scripted_ids: VecDeque<Result<String, u16>>,
    scripted_puts: VecDeque<Result<(), u16>>,
    id_fetches: u64,
    put_attempts: Vec<(String, serde_json::Value)>,
    successful_puts: Vec<(String, serde_json::Value)>,
    next_id: u64,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next id fetch return exactly this id.
    pub fn script_id(&self, id: &str) {
        self.state
            .lock()
            .scripted_ids
            .push_back(Ok(id.to_string()));
    }

    pub fn fail_next_id_fetches(&self, count: usize) {
        let mut state = self.state.lock();
        for _ in 0..count {
            state.scripted_ids.push_back(Err(503));
        }
    }

    pub fn fail_next_puts(&self, count: usize) {
        let mut state = self.state.lock();
        for _ in 0..count {
            state.scripted_puts.push_back(Err(500));
        }
    }

    /// While offline, every call fails with a retryable error.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    pub fn id_fetch_count(&self) -> u64 {
        self.state.lock().id_fetches
    }

    pub fn put_attempt_count(&self) -> usize {
        self.state.lock().put_attempts.len()
    }

    /// Every attempted `(server_uid, body)` pair, delivered or not.
    pub fn put_attempts(&self) -> Vec<(String, serde_json::Value)> {
        self.state.lock().put_attempts.clone()
    }

    /// Successfully delivered `(server_uid, body)` pairs, in delivery order.
    pub fn successful_puts(&self) -> Vec<(String, serde_json::Value)> {
        self.state.lock().successful_puts.clone()
    }
}

impl ApiClient for FakeApi {
    async fn fetch_document_id(&self) -> Result<String, ClientError> {
        let mut state = self.state.lock();
        state.id_fetches += 1;
        if state.offline {
            return Err(ClientError::UnexpectedStatus { status: 503 });
        }
        match state.scripted_ids.pop_front() {
            Some(Ok(id)) => Ok(id),
            Some(Err(status)) => Err(ClientError::UnexpectedStatus { status }),
            None => {
                state.next_id += 1;
                Ok(format!("server-id-{}", state.next_id))
            }
        }
    }

    async fn put_document(
        &self,
        server_uid: &str,
        body: &ProtocolDocument,
    ) -> Result<(), ClientError> {
        let body_json = serde_json::to_value(body).expect("body serializes");
        let mut state = self.state.lock();
        state
            .put_attempts
            .push((server_uid.to_string(), body_json.clone()));
        if state.offline {
            return Err(ClientError::UnexpectedStatus { status: 503 });
        }
        match state.scripted_puts.pop_front() {
            Some(Err(status)) => Err(ClientError::UnexpectedStatus { status }),
            Some(Ok(())) | None => {
                state
                    .successful_puts
                    .push((server_uid.to_string(), body_json));
                Ok(())
            }
        }
    }
}

#[derive(Clone)]
pub struct RecordedSave {
    pub local_uid: String,
    pub contents: DocumentContents,
    pub document_type: DocumentType,
    pub priority: Priority,
}

/// `Uploader` double that just records what was handed to it.
#[derive(Clone, Default)]
pub struct RecordingUploader {
    saves: Arc<Mutex<Vec<RecordedSave>>>,
}

impl RecordingUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saves(&self) -> Vec<RecordedSave> {
        self.saves.lock().clone()
    }
}

impl Uploader for RecordingUploader {
    fn save(
        &self,
        local_uid: &str,
        contents: DocumentContents,
        document_type: DocumentType,
        priority: Priority,
    ) {
        self.saves.lock().push(RecordedSave {
            local_uid: local_uid.to_string(),
            contents,
            document_type,
            priority,
        });
    }
}

/// Poll until `condition` holds, panicking after `timeout`. The queue works
/// through spawned tasks, so tests observe effects rather than awaiting them.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "condition not met within {timeout:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
