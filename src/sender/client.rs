use super::response::BulkResponse;
use super::serialization::BulkBodySerializer;
use super::{BulkOperation, BulkSink, BulkSummary, SinkError};
use crate::app::config::{ConfigError, ConnectionConfig};
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::header::{AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{Client, ClientBuilder, Method, RequestBuilder, Response};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{SyncSender, sync_channel};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use url::Url;

const NDJSON: &str = "application/x-ndjson";
const ERROR_BODY_LIMIT: usize = 512;

#[derive(Debug, Clone)]
pub struct ConnectionStats {
    pub hosts: usize,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_response_time: Duration,
}

#[derive(Debug, Default)]
pub struct ClientStats {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    total_response_time: AtomicU64,
}

impl ClientStats {
    pub fn record_request(&self, success: bool, response_time: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time
            .fetch_add(response_time.as_millis() as u64, Ordering::Relaxed);

        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn snapshot(&self, hosts: usize) -> ConnectionStats {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let total_response_time = self.total_response_time.load(Ordering::Relaxed);

        let average_response_time = if total_requests > 0 {
            Duration::from_millis(total_response_time / total_requests)
        } else {
            Duration::ZERO
        };

        ConnectionStats {
            hosts,
            total_requests,
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            average_response_time,
        }
    }
}

enum Auth {
    None,
    Basic {
        username: String,
        password: Option<String>,
    },
    ApiKey(String),
}

impl Auth {
    fn from_config(config: &ConnectionConfig) -> Self {
        if let Some(key) = &config.api_key {
            Auth::ApiKey(key.clone())
        } else if let Some(username) = &config.username {
            Auth::Basic {
                username: username.clone(),
                password: config.password.clone(),
            }
        } else {
            Auth::None
        }
    }
}

enum Request {
    Bulk {
        body: Bytes,
        total: usize,
        reply: SyncSender<Result<BulkSummary, SinkError>>,
    },
    Ping {
        reply: SyncSender<bool>,
    },
}

/// The async half: owns the reqwest client and runs on the worker thread.
struct Transport {
    client: Client,
    hosts: Vec<Url>,
    next_host: AtomicUsize,
    auth: Auth,
    compression: bool,
    stats: Arc<ClientStats>,
}

impl Transport {
    async fn handle(&self, request: Request) {
        match request {
            Request::Bulk { body, total, reply } => {
                let start = Instant::now();
                let result = self.send_bulk(body, total).await;
                self.stats.record_request(result.is_ok(), start.elapsed());
                let _ = reply.send(result);
            }
            Request::Ping { reply } => {
                let _ = reply.send(self.ping().await);
            }
        }
    }

    /// Hosts in the order they should be tried for the next request.
    fn rotation(&self) -> impl Iterator<Item = &Url> {
        let start = self.next_host.fetch_add(1, Ordering::Relaxed);
        let count = self.hosts.len();
        (0..count).map(move |offset| &self.hosts[(start + offset) % count])
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.auth {
            Auth::None => builder,
            Auth::Basic { username, password } => builder.basic_auth(username, password.as_deref()),
            Auth::ApiKey(key) => builder.header(AUTHORIZATION, format!("ApiKey {key}")),
        }
    }

    async fn send_bulk(&self, body: Bytes, total: usize) -> Result<BulkSummary, SinkError> {
        let mut last_error = None;

        for host in self.rotation() {
            let url = host
                .join("_bulk")
                .map_err(|e| SinkError::InvalidConfiguration(format!("{host}: {e}")))?;

            let mut request = self
                .request(Method::POST, url)
                .header(CONTENT_TYPE, NDJSON)
                .body(body.clone());
            if self.compression {
                request = request.header(CONTENT_ENCODING, "gzip");
            }

            match request.send().await {
                Ok(response) => return read_bulk_response(response, total).await,
                Err(e) if e.is_connect() => {
                    tracing::debug!(
                        host = %host,
                        error = %e,
                        "Bulk request could not connect, trying next host"
                    );
                    last_error = Some(SinkError::ConnectionFailed(format!("{host}: {e}")));
                }
                Err(e) if e.is_timeout() => {
                    return Err(SinkError::RequestTimeout(format!("{host}: {e}")));
                }
                Err(e) => return Err(SinkError::Network(e)),
            }
        }

        Err(last_error
            .unwrap_or_else(|| SinkError::ConnectionFailed("no hosts configured".to_string())))
    }

    async fn ping(&self) -> bool {
        for host in self.rotation() {
            match self.request(Method::HEAD, host.clone()).send().await {
                Ok(response) => return response.status().is_success(),
                Err(e) if e.is_connect() => {
                    tracing::debug!(host = %host, error = %e, "Ping could not connect");
                }
                Err(_) => return false,
            }
        }
        false
    }
}

async fn read_bulk_response(response: Response, total: usize) -> Result<BulkSummary, SinkError> {
    let status = response.status();
    let bytes = response.bytes().await?;

    if !status.is_success() {
        let end = bytes.len().min(ERROR_BODY_LIMIT);
        return Err(SinkError::Http {
            status: status.as_u16(),
            message: String::from_utf8_lossy(&bytes[..end]).into_owned(),
        });
    }

    let parsed: BulkResponse =
        serde_json::from_slice(&bytes).map_err(|e| SinkError::InvalidResponse(e.to_string()))?;
    Ok(parsed.summarize(total))
}

/// Dedicated thread running a current-thread runtime. Exits once every
/// request sender is dropped.
struct SinkWorker {
    requests: mpsc::UnboundedSender<Request>,
    handle: JoinHandle<()>,
}

impl SinkWorker {
    fn spawn(transport: Arc<Transport>) -> Result<Self, SinkError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SinkError::WorkerUnavailable(format!("failed to build runtime: {e}")))?;
        let (requests, mut inbox) = mpsc::unbounded_channel::<Request>();

        let handle = thread::Builder::new()
            .name("ecs-log-sink".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    while let Some(request) = inbox.recv().await {
                        transport.handle(request).await;
                    }
                });
            })
            .map_err(|e| SinkError::WorkerUnavailable(format!("failed to spawn thread: {e}")))?;

        tracing::debug!("Started bulk sink worker");
        Ok(Self { requests, handle })
    }

    fn stop(self) {
        let Self { requests, handle } = self;
        drop(requests);
        if handle.join().is_err() {
            tracing::error!("Bulk sink worker panicked");
        }
    }
}

/// [`BulkSink`] speaking the Elasticsearch/OpenSearch `_bulk` API over HTTP.
///
/// Callers are synchronous and may well sit inside somebody else's tokio
/// runtime, so requests are handed to a private worker thread and the caller
/// blocks on the reply. The worker starts on first use.
pub struct ElasticsearchSink {
    transport: Arc<Transport>,
    worker: Mutex<Option<SinkWorker>>,
    serializer: BulkBodySerializer,
    compression: bool,
    stats: Arc<ClientStats>,
}

impl ElasticsearchSink {
    pub fn new(config: ConnectionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let hosts = config.parsed_hosts()?;

        let client = ClientBuilder::new()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| ConfigError::InvalidConfig(format!("Failed to build HTTP client: {e}")))?;

        let stats = Arc::new(ClientStats::default());
        let transport = Transport {
            client,
            hosts,
            next_host: AtomicUsize::new(0),
            auth: Auth::from_config(&config),
            compression: config.compression,
            stats: Arc::clone(&stats),
        };

        Ok(Self {
            transport: Arc::new(transport),
            worker: Mutex::new(None),
            serializer: BulkBodySerializer::new(),
            compression: config.compression,
            stats,
        })
    }

    pub fn hosts(&self) -> &[Url] {
        &self.transport.hosts
    }

    pub fn is_started(&self) -> bool {
        self.worker.lock().is_some()
    }

    pub fn connection_stats(&self) -> ConnectionStats {
        self.stats.snapshot(self.transport.hosts.len())
    }

    fn sender(&self) -> Result<mpsc::UnboundedSender<Request>, SinkError> {
        let mut worker = self.worker.lock();
        if let Some(running) = worker.as_ref() {
            return Ok(running.requests.clone());
        }
        let started = SinkWorker::spawn(Arc::clone(&self.transport))?;
        let requests = started.requests.clone();
        *worker = Some(started);
        Ok(requests)
    }

    fn call<T>(&self, make: impl FnOnce(SyncSender<T>) -> Request) -> Result<T, SinkError> {
        let (reply, response) = sync_channel(1);
        let requests = self.sender()?;

        if requests.send(make(reply)).is_err() {
            // The worker died; the next call starts a fresh one.
            let dead = self.worker.lock().take();
            if let Some(dead) = dead {
                dead.stop();
            }
            return Err(SinkError::WorkerUnavailable("worker stopped".to_string()));
        }

        response
            .recv()
            .map_err(|_| SinkError::WorkerUnavailable("request dropped by worker".to_string()))
    }
}

impl BulkSink for ElasticsearchSink {
    fn bulk(&self, operations: &[BulkOperation]) -> Result<BulkSummary, SinkError> {
        if operations.is_empty() {
            return Ok(BulkSummary::default());
        }

        let body = if self.compression {
            self.serializer.serialize_compressed(operations)?
        } else {
            self.serializer.serialize_ndjson(operations)?
        };
        let total = operations.len();

        self.call(|reply| Request::Bulk {
            body: Bytes::from(body),
            total,
            reply,
        })?
    }

    fn ping(&self) -> bool {
        self.call(|reply| Request::Ping { reply }).unwrap_or(false)
    }
}

impl Drop for ElasticsearchSink {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.stop();
        }
    }
}
