use reqwest::{Client, ClientBuilder};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

#[cfg(test)]
use mockall::automock;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Request timeout: {0}")]
    RequestTimeout(String),
    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
    pub connection_timeout: Duration,
    pub max_connections: usize,
    pub keep_alive_timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
            max_connections: 10,
            keep_alive_timeout: Duration::from_secs(60),
            user_agent: format!("influx-relay/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
}

#[derive(Debug, Default)]
struct StatsInner {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
}

impl StatsInner {
    fn record(&self, success: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Seam for the HTTP write. The dispatcher only ever talks to this trait,
/// so tests can swap in a recording double.
#[cfg_attr(test, automock)]
pub trait Transport: Send + Sync {
    /// Posts one newline-joined line-protocol payload to a destination's
    /// write endpoint. Returns the HTTP status code on success (InfluxDB
    /// answers 204 for a successful write).
    fn send(
        &self,
        endpoint: Url,
        payload: String,
    ) -> impl Future<Output = Result<u16, TransportError>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: TransportConfig,
    stats: Arc<StatsInner>,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .connect_timeout(config.connection_timeout)
            .pool_max_idle_per_host(config.max_connections)
            .pool_idle_timeout(config.keep_alive_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                TransportError::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            config,
            stats: Arc::new(StatsInner::default()),
        })
    }

    pub fn stats(&self) -> TransportStats {
        TransportStats {
            total_requests: self.stats.total_requests.load(Ordering::Relaxed),
            successful_requests: self.stats.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.stats.failed_requests.load(Ordering::Relaxed),
        }
    }
}

impl Transport for HttpTransport {
    async fn send(&self, endpoint: Url, payload: String) -> Result<u16, TransportError> {
        debug!(
            endpoint = %endpoint,
            bytes = payload.len(),
            "writing payload to destination"
        );

        let result = self.client.post(endpoint).body(payload).send().await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.stats.record(false);
                if e.is_timeout() {
                    return Err(TransportError::RequestTimeout(format!(
                        "write timed out after {:?}",
                        self.config.timeout
                    )));
                }
                return Err(TransportError::NetworkError(e));
            }
        };

        let status = response.status();
        self.stats.record(status.is_success());
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(TransportError::HttpError {
                status: status.as_u16(),
                message,
            })
        }
    }
}
