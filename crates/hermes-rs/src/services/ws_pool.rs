//! Pool of breaker-protected outbound WebSocket connections.

use crate::models::error::GatewayError;
use crate::services::breaker_registry::BreakerRegistry;
use crate::services::ws_channel::{MessageSink, ProtectedWsChannel, WsChannelConfig, WsChannelStats};
use ahash::AHashMap;
use log::info;
use serde::Serialize;
use std::sync::{Arc, RwLock};

/// Aggregate view over every pooled connection.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub total_connections: usize,
    pub healthy_connections: usize,
    pub connections: Vec<WsChannelStats>,
}

/// Name -> protected channel map with registration lifecycle.
///
/// Each registered connection borrows a breaker from the shared registry,
/// keyed by the connection id, so breaker history survives re-registration
/// of the same id.
pub struct WsConnectionPool {
    connections: RwLock<AHashMap<String, Arc<ProtectedWsChannel>>>,
    registry: Arc<BreakerRegistry>,
}

impl WsConnectionPool {
    pub fn new(registry: Arc<BreakerRegistry>) -> Arc<Self> {
        Arc::new(Self {
            connections: RwLock::new(AHashMap::new()),
            registry,
        })
    }

    /// Registers a connection and starts its worker tasks.
    ///
    /// Fails with [`GatewayError::AlreadyRegistered`] when the id is taken.
    pub fn register(
        &self,
        id: &str,
        sink: Arc<dyn MessageSink>,
        config: WsChannelConfig,
    ) -> Result<Arc<ProtectedWsChannel>, GatewayError> {
        let mut map = self.write_map();
        if map.contains_key(id) {
            return Err(GatewayError::AlreadyRegistered(id.to_string()));
        }
        let breaker = self.registry.get_breaker(id);
        let channel = ProtectedWsChannel::new(id.to_string(), sink, breaker, config);
        channel.spawn_workers();
        map.insert(id.to_string(), channel.clone());
        info!("registered protected connection {}", id);
        Ok(channel)
    }

    /// Removes and closes a connection.
    ///
    /// Fails with [`GatewayError::ConnectionNotFound`] for unknown ids.
    pub async fn unregister(&self, id: &str) -> Result<(), GatewayError> {
        let removed = self.write_map().remove(id);
        match removed {
            Some(channel) => {
                channel.close().await;
                info!("unregistered protected connection {}", id);
                Ok(())
            }
            None => Err(GatewayError::ConnectionNotFound(id.to_string())),
        }
    }

    pub fn get_connection(&self, id: &str) -> Option<Arc<ProtectedWsChannel>> {
        self.read_map().get(id).cloned()
    }

    pub fn stats(&self) -> PoolStats {
        let connections: Vec<WsChannelStats> =
            self.read_map().values().map(|c| c.stats()).collect();
        let healthy = connections.iter().filter(|c| c.is_healthy).count();
        PoolStats {
            total_connections: connections.len(),
            healthy_connections: healthy,
            connections,
        }
    }

    /// Closes every connection and drops the map.
    pub async fn close(&self) {
        let drained: Vec<Arc<ProtectedWsChannel>> =
            self.write_map().drain().map(|(_, channel)| channel).collect();
        let count = drained.len();
        for channel in drained {
            channel.close().await;
        }
        info!("closed connection pool ({} connections)", count);
    }

    fn read_map(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, AHashMap<String, Arc<ProtectedWsChannel>>> {
        self.connections.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_map(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, AHashMap<String, Arc<ProtectedWsChannel>>> {
        self.connections.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
