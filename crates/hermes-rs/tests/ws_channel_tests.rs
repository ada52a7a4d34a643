use futures::future::BoxFuture;
use hermes_rs::models::error::GatewayError;
use hermes_rs::services::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use hermes_rs::services::ws_channel::{
    MessageSink, ProtectedWsChannel, QueuedMessage, WsChannelConfig,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_test::assert_ok;

// Scripted sink: fails the first `fail_first` attempts, then succeeds.
// `pending` simulates a wedged socket that never completes a send.
struct MockSink {
    attempts: AtomicU32,
    fail_first: u32,
    pending: bool,
    close_calls: AtomicU32,
}

impl MockSink {
    fn ok() -> Arc<Self> {
        Self::failing(0)
    }

    fn failing(fail_first: u32) -> Arc<Self> {
        Arc::new(Self {
            attempts: AtomicU32::new(0),
            fail_first,
            pending: false,
            close_calls: AtomicU32::new(0),
        })
    }

    fn wedged() -> Arc<Self> {
        Arc::new(Self {
            attempts: AtomicU32::new(0),
            fail_first: 0,
            pending: true,
            close_calls: AtomicU32::new(0),
        })
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn try_send(&self) -> Result<(), GatewayError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_first {
            Err(GatewayError::Send("scripted failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl MessageSink for MockSink {
    fn send_text<'a>(&'a self, _text: &'a str) -> BoxFuture<'a, Result<(), GatewayError>> {
        Box::pin(async move {
            if self.pending {
                futures::future::pending::<()>().await;
            }
            self.try_send()
        })
    }

    fn send_binary<'a>(&'a self, _payload: &'a [u8]) -> BoxFuture<'a, Result<(), GatewayError>> {
        Box::pin(async move {
            if self.pending {
                futures::future::pending::<()>().await;
            }
            self.try_send()
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), GatewayError>> {
        Box::pin(async move {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn is_connected(&self) -> bool {
        true
    }
}

fn breaker() -> Arc<CircuitBreaker> {
    CircuitBreaker::new("ws-test".to_string(), CircuitBreakerConfig::default())
}

fn channel(
    sink: Arc<MockSink>,
    config: WsChannelConfig,
) -> Arc<ProtectedWsChannel> {
    ProtectedWsChannel::new("conn-1".to_string(), sink, breaker(), config)
}

#[tokio::test]
async fn exhausted_retries_make_exactly_max_plus_one_attempts() {
    let sink = MockSink::failing(u32::MAX);
    let chan = channel(
        sink.clone(),
        WsChannelConfig {
            max_retries: 3,
            retry_backoff_factor: 0.01,
            ..WsChannelConfig::default()
        },
    );

    let result = chan.send_message("hello").await;
    assert!(matches!(result, Err(GatewayError::Send(_))));
    assert_eq!(sink.attempts(), 4);

    let stats = chan.stats();
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.failed_requests, 1);
    assert!(stats.last_failure_at.is_some());
}

#[tokio::test]
async fn retry_backoff_is_linear_in_attempt_number() {
    let sink = MockSink::failing(2);
    let chan = channel(
        sink.clone(),
        WsChannelConfig {
            max_retries: 2,
            retry_backoff_factor: 2.0,
            ..WsChannelConfig::default()
        },
    );

    let started = Instant::now();
    assert_ok!(chan.send_message("hello").await);
    let elapsed = started.elapsed();

    // Sleeps of ~0, 200 ms, 400 ms before the three attempts.
    assert_eq!(sink.attempts(), 3);
    assert!(elapsed >= Duration::from_millis(550), "elapsed: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1200), "elapsed: {:?}", elapsed);

    let stats = chan.stats();
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.failed_requests, 0);
    assert_eq!(stats.failure_count, 0);
}

#[tokio::test]
async fn open_breaker_rejects_before_any_attempt() {
    let sink = MockSink::ok();
    let breaker = CircuitBreaker::new(
        "ws-open".to_string(),
        CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 1,
            volume_threshold: 1,
            timeout: Duration::from_secs(30),
        },
    );
    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Open);

    let chan = ProtectedWsChannel::new(
        "conn-open".to_string(),
        sink.clone(),
        breaker,
        WsChannelConfig::default(),
    );

    let result = chan.send_message("hello").await;
    assert!(matches!(result, Err(GatewayError::CircuitOpen)));
    assert_eq!(sink.attempts(), 0);
    assert_eq!(chan.stats().failed_requests, 1);
    assert!(!chan.is_healthy());
}

#[tokio::test]
async fn queue_rejects_when_full() {
    // Workers not started, so nothing drains the queue.
    let chan = channel(MockSink::ok(), WsChannelConfig::default());

    for i in 0..1000 {
        assert!(
            chan.queue_message(QueuedMessage::Text(format!("m{}", i))).is_ok(),
            "enqueue {} should fit",
            i
        );
    }
    let overflow = chan.queue_message(QueuedMessage::Text("overflow".to_string()));
    match overflow {
        Err(err @ GatewayError::QueueFull) => {
            assert_eq!(err.to_string(), "message queue is full");
        }
        other => panic!("expected queue-full error, got {:?}", other),
    }
}

#[tokio::test]
async fn queue_worker_drains_to_the_sink() {
    let sink = MockSink::ok();
    let chan = channel(sink.clone(), WsChannelConfig::default());
    chan.spawn_workers();

    assert_ok!(chan.queue_message(QueuedMessage::Text("a".to_string())));
    assert_ok!(chan.queue_message(QueuedMessage::Binary(vec![1, 2, 3])));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(sink.attempts(), 2);
    assert_eq!(chan.stats().total_requests, 2);
}

#[tokio::test]
async fn close_is_idempotent() {
    let sink = MockSink::ok();
    let chan = channel(sink.clone(), WsChannelConfig::default());
    chan.spawn_workers();

    chan.close().await;
    chan.close().await;
    assert_eq!(sink.close_calls.load(Ordering::SeqCst), 1);

    assert!(matches!(
        chan.queue_message(QueuedMessage::Text("late".to_string())),
        Err(GatewayError::ConnectionClosed)
    ));
    assert!(matches!(
        chan.send_message("late").await,
        Err(GatewayError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn wedged_sink_does_not_block_enqueue() {
    let chan = channel(
        MockSink::wedged(),
        WsChannelConfig {
            queue_capacity: 4,
            ..WsChannelConfig::default()
        },
    );
    chan.spawn_workers();
    tokio::time::sleep(Duration::from_millis(20)).await;

    // The worker is stuck in one send; enqueues stay non-blocking and fail
    // fast once the small queue fills.
    let mut saw_full = false;
    for i in 0..8 {
        if chan.queue_message(QueuedMessage::Text(format!("m{}", i))).is_err() {
            saw_full = true;
            break;
        }
    }
    assert!(saw_full);
    chan.close().await;
}

#[tokio::test]
async fn failures_feed_the_shared_breaker() {
    let sink = MockSink::failing(u32::MAX);
    let breaker = CircuitBreaker::new(
        "ws-feed".to_string(),
        CircuitBreakerConfig {
            failure_threshold: 2,
            success_threshold: 1,
            volume_threshold: 1,
            timeout: Duration::from_secs(30),
        },
    );
    let chan = ProtectedWsChannel::new(
        "conn-feed".to_string(),
        sink,
        breaker.clone(),
        WsChannelConfig {
            max_retries: 0,
            ..WsChannelConfig::default()
        },
    );

    assert!(chan.send_message("one").await.is_err());
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert!(chan.send_message("two").await.is_err());
    // Two exhausted sends = two breaker failures.
    assert_eq!(breaker.state(), CircuitState::Open);
}
