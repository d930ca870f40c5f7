use crate::domain::ProtocolDocument;
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Unexpected HTTP status: {status}")]
    UnexpectedStatus { status: u16 },
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub connection_timeout: Duration,
    pub max_connections: usize,
    pub keep_alive_timeout: Duration,
    pub user_agent: String,
    pub enable_compression: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            timeout: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
            max_connections: 4,
            keep_alive_timeout: Duration::from_secs(60),
            user_agent: concat!("uplink/", env!("CARGO_PKG_VERSION")).to_string(),
            enable_compression: true,
        }
    }
}

/// Counters over the lifetime of one client.
#[derive(Debug, Clone)]
pub struct RequestStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
}

#[derive(Debug, Default)]
struct ClientCounters {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
}

impl ClientCounters {
    fn record(&self, success: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// The two HTTP operations the upload queue consumes.
///
/// Every failure returned here is retryable by definition; classification
/// beyond "not a 200" is the caller's concern, and the caller's answer is
/// always "try again later".
pub trait ApiClient: Send + Sync + 'static {
    fn fetch_document_id(&self) -> impl Future<Output = Result<String, ClientError>> + Send;

    fn put_document(
        &self,
        server_uid: &str,
        body: &ProtocolDocument,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;
}

#[derive(Deserialize)]
struct DocumentIdResponse {
    id: String,
}

#[derive(Debug, Clone)]
pub struct HttpApiClient {
    client: Client,
    base_url: Url,
    stats: Arc<ClientCounters>,
}

impl HttpApiClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let base_url: Url = config
            .base_url
            .parse()
            .map_err(|e| ClientError::InvalidConfiguration(format!("Invalid base URL: {e}")))?;

        let mut client_builder = ClientBuilder::new()
            .timeout(config.timeout)
            .connect_timeout(config.connection_timeout)
            .pool_max_idle_per_host(config.max_connections)
            .pool_idle_timeout(config.keep_alive_timeout)
            .user_agent(&config.user_agent);

        if config.enable_compression {
            client_builder = client_builder.gzip(true);
        }

        let client = client_builder
            .build()
            .map_err(|e| ClientError::InvalidConfiguration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            stats: Arc::new(ClientCounters::default()),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    pub fn request_stats(&self) -> RequestStats {
        RequestStats {
            total_requests: self.stats.total_requests.load(Ordering::Relaxed),
            successful_requests: self.stats.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.stats.failed_requests.load(Ordering::Relaxed),
        }
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let base_path = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{base_path}/{path}"));
        url
    }

    fn check_200(&self, status: StatusCode) -> Result<(), ClientError> {
        // Only 200 counts as delivered; a 2xx redirect-ish status from a
        // captive portal must not be mistaken for an acknowledgement.
        if status == StatusCode::OK {
            self.stats.record(true);
            Ok(())
        } else {
            self.stats.record(false);
            Err(ClientError::UnexpectedStatus {
                status: status.as_u16(),
            })
        }
    }
}

impl ApiClient for HttpApiClient {
    async fn fetch_document_id(&self) -> Result<String, ClientError> {
        let response = self
            .client
            .get(self.endpoint("documentId"))
            .send()
            .await
            .inspect_err(|_| self.stats.record(false))?;
        self.check_200(response.status())?;

        let body: DocumentIdResponse = response
            .json()
            .await
            .map_err(|e| ClientError::MalformedResponse(format!("documentId body: {e}")))?;

        let id = body.id.trim().to_string();
        if id.is_empty() {
            return Err(ClientError::MalformedResponse(
                "documentId body contained an empty id".to_string(),
            ));
        }
        Ok(id)
    }

    async fn put_document(
        &self,
        server_uid: &str,
        body: &ProtocolDocument,
    ) -> Result<(), ClientError> {
        let response = self
            .client
            .put(self.endpoint(&format!("documents/{server_uid}")))
            .json(body)
            .send()
            .await
            .inspect_err(|_| self.stats.record(false))?;
        self.check_200(response.status())
    }
}
