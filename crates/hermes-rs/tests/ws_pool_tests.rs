use futures::future::BoxFuture;
use hermes_rs::models::error::GatewayError;
use hermes_rs::services::breaker_registry::BreakerRegistry;
use hermes_rs::services::circuit_breaker::CircuitBreakerConfig;
use hermes_rs::services::ws_channel::{MessageSink, WsChannelConfig};
use hermes_rs::services::ws_pool::WsConnectionPool;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct NullSink {
    close_calls: AtomicU32,
}

impl MessageSink for NullSink {
    fn send_text<'a>(&'a self, _text: &'a str) -> BoxFuture<'a, Result<(), GatewayError>> {
        Box::pin(async { Ok(()) })
    }

    fn send_binary<'a>(&'a self, _payload: &'a [u8]) -> BoxFuture<'a, Result<(), GatewayError>> {
        Box::pin(async { Ok(()) })
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

fn registry() -> Arc<BreakerRegistry> {
    BreakerRegistry::new(
        CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 1,
            volume_threshold: 1,
            timeout: Duration::from_secs(30),
        },
        vec![],
        vec![],
    )
}

#[tokio::test]
async fn register_rejects_duplicate_ids() {
    let pool = WsConnectionPool::new(registry());

    let first = pool.register("conn-1", Arc::new(NullSink::default()), WsChannelConfig::default());
    assert!(first.is_ok());

    let second = pool.register("conn-1", Arc::new(NullSink::default()), WsChannelConfig::default());
    assert!(matches!(second, Err(GatewayError::AlreadyRegistered(id)) if id == "conn-1"));

    pool.close().await;
}

#[tokio::test]
async fn unregister_closes_and_forgets() {
    let pool = WsConnectionPool::new(registry());
    let sink = Arc::new(NullSink::default());
    pool.register("conn-1", sink.clone(), WsChannelConfig::default()).unwrap();

    pool.unregister("conn-1").await.unwrap();
    assert_eq!(sink.close_calls.load(Ordering::SeqCst), 1);
    assert!(pool.get_connection("conn-1").is_none());

    assert!(matches!(
        pool.unregister("conn-1").await,
        Err(GatewayError::ConnectionNotFound(id)) if id == "conn-1"
    ));
}

#[tokio::test]
async fn channels_borrow_breakers_from_the_shared_registry() {
    let registry = registry();
    let pool = WsConnectionPool::new(registry.clone());
    let channel = pool
        .register("conn-1", Arc::new(NullSink::default()), WsChannelConfig::default())
        .unwrap();

    // An exhausted send feeds the registry-owned breaker under the same key.
    assert!(channel.send_message("hello").await.is_ok());
    registry.get_breaker("conn-1").record_failure();
    assert!(matches!(
        channel.send_message("again").await,
        Err(GatewayError::CircuitOpen)
    ));

    pool.close().await;
}

#[tokio::test]
async fn stats_aggregate_health_and_counters() {
    let pool = WsConnectionPool::new(registry());
    let a = pool
        .register("conn-a", Arc::new(NullSink::default()), WsChannelConfig::default())
        .unwrap();
    pool.register("conn-b", Arc::new(NullSink::default()), WsChannelConfig::default())
        .unwrap();

    a.send_message("one").await.unwrap();

    let stats = pool.stats();
    assert_eq!(stats.total_connections, 2);
    assert_eq!(stats.healthy_connections, 2);
    let a_stats = stats
        .connections
        .iter()
        .find(|c| c.name == "conn-a")
        .expect("conn-a stats");
    assert_eq!(a_stats.total_requests, 1);

    pool.close().await;
    assert_eq!(pool.stats().total_connections, 0);
}

#[tokio::test]
async fn close_all_closes_every_channel_once() {
    let pool = WsConnectionPool::new(registry());
    let sink_a = Arc::new(NullSink::default());
    let sink_b = Arc::new(NullSink::default());
    pool.register("conn-a", sink_a.clone(), WsChannelConfig::default()).unwrap();
    pool.register("conn-b", sink_b.clone(), WsChannelConfig::default()).unwrap();

    pool.close().await;
    pool.close().await;
    assert_eq!(sink_a.close_calls.load(Ordering::SeqCst), 1);
    assert_eq!(sink_b.close_calls.load(Ordering::SeqCst), 1);
}
