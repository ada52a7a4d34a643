//! Breaker-protected outbound WebSocket send channel.
//!
//! Wraps a raw socket sink with circuit breaker admission, bounded retry
//! with linear backoff, an asynchronous bounded send queue, and a periodic
//! liveness probe. The breaker is borrowed from the shared registry; the
//! channel records outcomes into it but never owns it.

use crate::models::error::GatewayError;
use crate::models::settings::WsBreakerSettings;
use crate::services::circuit_breaker::{CircuitBreaker, CircuitState};
use chrono::Utc;
use futures::future::BoxFuture;
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::watch;
use tokio::time::{interval, sleep};
use tokio_tungstenite::tungstenite::protocol::Message as TungsteniteMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Write half of an outbound WebSocket connection.
///
/// The trait exists so the retry and queueing machinery can be exercised
/// against scripted sinks in tests; production code uses
/// [`TungsteniteSink`].
pub trait MessageSink: Send + Sync {
    fn send_text<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<(), GatewayError>>;
    fn send_binary<'a>(&'a self, payload: &'a [u8]) -> BoxFuture<'a, Result<(), GatewayError>>;
    fn close(&self) -> BoxFuture<'_, Result<(), GatewayError>>;
    /// Cheap liveness answer for the health probe; may be stale.
    fn is_connected(&self) -> bool;
}

type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, TungsteniteMessage>;

/// [`MessageSink`] over a tokio-tungstenite client connection.
pub struct TungsteniteSink {
    writer: tokio::sync::Mutex<WsWriter>,
    connected: AtomicBool,
}

impl TungsteniteSink {
    pub fn new(writer: WsWriter) -> Arc<Self> {
        Arc::new(Self {
            writer: tokio::sync::Mutex::new(writer),
            connected: AtomicBool::new(true),
        })
    }

    /// Dials `url` and returns the sink plus the read half for the caller
    /// to drain.
    pub async fn connect(
        url: &str,
    ) -> Result<
        (
            Arc<Self>,
            futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
        ),
        GatewayError,
    > {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|err| GatewayError::Send(format!("connect to {} failed: {}", url, err)))?;
        let (writer, reader) = futures_util::StreamExt::split(stream);
        Ok((Self::new(writer), reader))
    }

    fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Relaxed);
    }
}

impl MessageSink for TungsteniteSink {
    fn send_text<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<(), GatewayError>> {
        Box::pin(async move {
            let mut writer = self.writer.lock().await;
            writer
                .send(TungsteniteMessage::Text(text.to_string()))
                .await
                .map_err(|err| {
                    self.mark_disconnected();
                    GatewayError::Send(err.to_string())
                })
        })
    }

    fn send_binary<'a>(&'a self, payload: &'a [u8]) -> BoxFuture<'a, Result<(), GatewayError>> {
        Box::pin(async move {
            let mut writer = self.writer.lock().await;
            writer
                .send(TungsteniteMessage::Binary(payload.to_vec()))
                .await
                .map_err(|err| {
                    self.mark_disconnected();
                    GatewayError::Send(err.to_string())
                })
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), GatewayError>> {
        Box::pin(async move {
            self.mark_disconnected();
            let mut writer = self.writer.lock().await;
            writer.close().await.map_err(|err| GatewayError::Send(err.to_string()))
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

/// Tuning for one protected channel.
#[derive(Debug, Clone)]
pub struct WsChannelConfig {
    pub max_retries: u32,
    pub retry_backoff_factor: f64,
    pub health_check_interval: Duration,
    pub queue_capacity: usize,
}

impl Default for WsChannelConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff_factor: 2.0,
            health_check_interval: Duration::from_secs(30),
            queue_capacity: 1000,
        }
    }
}

impl From<&WsBreakerSettings> for WsChannelConfig {
    fn from(settings: &WsBreakerSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            retry_backoff_factor: settings.retry_backoff_factor,
            health_check_interval: settings.health_check_interval,
            queue_capacity: settings.message_queue_size,
        }
    }
}

/// Payload accepted by the asynchronous send queue.
#[derive(Debug, Clone)]
pub enum QueuedMessage {
    Text(String),
    Binary(Vec<u8>),
}

/// Counter snapshot for one protected channel.
#[derive(Debug, Clone, Serialize)]
pub struct WsChannelStats {
    pub name: String,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub failure_count: u32,
    pub is_healthy: bool,
    pub breaker_state: CircuitState,
    /// Epoch milliseconds of the last exhausted send, if any.
    pub last_failure_at: Option<i64>,
}

enum Payload<'a> {
    Text(&'a str),
    Binary(&'a [u8]),
}

/// Breaker-fronted sender over one outbound WebSocket connection.
///
/// A fresh channel is inert: [`spawn_workers`](Self::spawn_workers) starts
/// the queue consumer and the health probe. The connection pool does this on
/// registration.
pub struct ProtectedWsChannel {
    name: String,
    sink: Arc<dyn MessageSink>,
    breaker: Arc<CircuitBreaker>,
    config: WsChannelConfig,
    queue_tx: mpsc::Sender<QueuedMessage>,
    queue_rx: Mutex<Option<mpsc::Receiver<QueuedMessage>>>,
    failure_count: AtomicU32,
    total_requests: AtomicU64,
    failed_requests: AtomicU64,
    is_healthy: AtomicBool,
    last_failure_ms: AtomicI64,
    done_tx: watch::Sender<bool>,
    closed: AtomicBool,
}

impl ProtectedWsChannel {
    pub fn new(
        name: String,
        sink: Arc<dyn MessageSink>,
        breaker: Arc<CircuitBreaker>,
        config: WsChannelConfig,
    ) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);
        let (done_tx, _) = watch::channel(false);
        Arc::new(Self {
            name,
            sink,
            breaker,
            config,
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            failure_count: AtomicU32::new(0),
            total_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            is_healthy: AtomicBool::new(true),
            last_failure_ms: AtomicI64::new(0),
            done_tx,
            closed: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Starts the queue consumer and health probe tasks. Calling more than
    /// once is a no-op.
    pub fn spawn_workers(self: &Arc<Self>) {
        let taken = self
            .queue_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(mut queue_rx) = taken else {
            return;
        };

        let channel = self.clone();
        let mut done = self.done_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = done.changed() => break,
                    item = queue_rx.recv() => match item {
                        Some(QueuedMessage::Text(text)) => {
                            if let Err(err) = channel.send_message(&text).await {
                                debug!("queued text send on {} failed: {}", channel.name, err);
                            }
                        }
                        Some(QueuedMessage::Binary(payload)) => {
                            if let Err(err) = channel.send_binary_message(&payload).await {
                                debug!("queued binary send on {} failed: {}", channel.name, err);
                            }
                        }
                        None => break,
                    },
                }
            }
            debug!("send queue worker for {} stopped", channel.name);
        });

        let channel = self.clone();
        let mut done = self.done_tx.subscribe();
        tokio::spawn(async move {
            let mut ticker = interval(channel.config.health_check_interval);
            loop {
                tokio::select! {
                    _ = done.changed() => break,
                    _ = ticker.tick() => {
                        let alive = channel.sink.is_connected();
                        channel.is_healthy.store(alive, Ordering::Relaxed);
                        if !alive {
                            debug!("health probe: {} is down", channel.name);
                        }
                    }
                }
            }
        });
    }

    /// Sends a text frame through the breaker with bounded retry.
    pub async fn send_message(&self, text: &str) -> Result<(), GatewayError> {
        self.send_with_retry(Payload::Text(text)).await
    }

    /// Sends a binary frame through the breaker with bounded retry.
    pub async fn send_binary_message(&self, payload: &[u8]) -> Result<(), GatewayError> {
        self.send_with_retry(Payload::Binary(payload)).await
    }

    async fn send_with_retry(&self, payload: Payload<'_>) -> Result<(), GatewayError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(GatewayError::ConnectionClosed);
        }
        if !self.breaker.allow() {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
            return Err(GatewayError::CircuitOpen);
        }

        let mut last_err = GatewayError::Send("no send attempt made".to_string());
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                // Linear in the attempt number, scaled by the factor.
                let millis = 100.0 * self.config.retry_backoff_factor * f64::from(attempt);
                sleep(Duration::from_millis(millis as u64)).await;
            }
            let outcome = match payload {
                Payload::Text(text) => self.sink.send_text(text).await,
                Payload::Binary(bytes) => self.sink.send_binary(bytes).await,
            };
            match outcome {
                Ok(()) => {
                    self.total_requests.fetch_add(1, Ordering::Relaxed);
                    self.failure_count.store(0, Ordering::Relaxed);
                    self.breaker.record_success();
                    return Ok(());
                }
                Err(err) => {
                    self.failure_count.fetch_add(1, Ordering::Relaxed);
                    debug!("send attempt {} on {} failed: {}", attempt, self.name, err);
                    last_err = err;
                }
            }
        }

        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
        self.last_failure_ms.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        self.breaker.record_failure();
        warn!(
            "giving up on {} after {} attempts: {}",
            self.name,
            self.config.max_retries + 1,
            last_err
        );
        Err(last_err)
    }

    /// Non-blocking enqueue onto the bounded send queue.
    pub fn queue_message(&self, message: QueuedMessage) -> Result<(), GatewayError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(GatewayError::ConnectionClosed);
        }
        self.queue_tx.try_send(message).map_err(|err| match err {
            TrySendError::Full(_) => GatewayError::QueueFull,
            TrySendError::Closed(_) => GatewayError::ConnectionClosed,
        })
    }

    /// Liveness: the probe saw the socket up and the breaker admits traffic.
    pub fn is_healthy(&self) -> bool {
        self.is_healthy.load(Ordering::Relaxed) && self.breaker.state() != CircuitState::Open
    }

    /// Stops the workers, closes the socket, and logs the final counters.
    /// Idempotent: only the first call has any effect.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.done_tx.send(true);
        if let Err(err) = self.sink.close().await {
            debug!("closing socket for {}: {}", self.name, err);
        }
        info!(
            "closed protected channel {}: total={} failed={}",
            self.name,
            self.total_requests.load(Ordering::Relaxed),
            self.failed_requests.load(Ordering::Relaxed)
        );
    }

    pub fn stats(&self) -> WsChannelStats {
        let last_failure = self.last_failure_ms.load(Ordering::Relaxed);
        WsChannelStats {
            name: self.name.clone(),
            total_requests: self.total_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            is_healthy: self.is_healthy(),
            breaker_state: self.breaker.state(),
            last_failure_at: (last_failure != 0).then_some(last_failure),
        }
    }
}
