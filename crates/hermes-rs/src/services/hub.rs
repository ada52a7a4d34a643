//! Realtime messaging hub.
//!
//! Multiplexes WebSocket clients and SSE subscribers, indexed by user id and
//! ticket id. One run-loop task owns every index; the public methods talk to
//! it over a command conduit, so no lock is ever held across a dispatch.
//! Delivery to a client is a non-blocking enqueue onto its bounded send
//! channel: slow consumers lose messages instead of stalling the loop.

use crate::models::error::GatewayError;
use crate::models::message::{DispatchMode, HubMessage};
use crate::models::settings::HubSettings;
use crate::services::pubsub::PubSubBus;
use ahash::{AHashMap, AHashSet};
use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::interval;
use uuid::Uuid;

/// Presence reported for a connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Away,
    Busy,
    Offline,
}

/// Coarse client platform classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    #[default]
    Web,
    Mobile,
    Desktop,
}

/// Identity and business tags a client connects with.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub client_id: String,
    pub user_id: String,
    pub user_type: String,
    pub role: String,
    pub ticket_id: Option<String>,
    pub department: Option<String>,
    pub client_type: ClientType,
    pub metadata: AHashMap<String, String>,
}

/// One WebSocket subscriber registered with the hub.
///
/// The hub enqueues onto `sender`; the adapter's writer task drains the
/// paired receiver to the socket. `close` is a watch signal so eviction
/// terminates the writer promptly even while reader-side references remain.
pub struct Client {
    pub client_id: String,
    pub user_id: String,
    pub user_type: String,
    pub role: String,
    pub ticket_id: Option<String>,
    pub department: Option<String>,
    pub client_type: ClientType,
    pub node_id: String,
    pub status: PresenceStatus,
    pub metadata: AHashMap<String, String>,
    last_seen_ms: AtomicI64,
    sender: mpsc::Sender<HubMessage>,
    close_tx: watch::Sender<bool>,
}

impl Client {
    /// Builds a client and hands back the receiving half of its send
    /// channel for the writer task.
    pub fn new(info: ClientInfo, node_id: &str, buffer: usize) -> (Arc<Self>, mpsc::Receiver<HubMessage>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let (close_tx, _) = watch::channel(false);
        let client = Arc::new(Self {
            client_id: info.client_id,
            user_id: info.user_id,
            user_type: info.user_type,
            role: info.role,
            ticket_id: info.ticket_id.filter(|t| !t.is_empty()),
            department: info.department,
            client_type: info.client_type,
            node_id: node_id.to_string(),
            status: PresenceStatus::Online,
            metadata: info.metadata,
            last_seen_ms: AtomicI64::new(Utc::now().timestamp_millis()),
            sender,
            close_tx,
        });
        (client, receiver)
    }

    /// Refreshes the liveness stamp; called by the reader on every frame.
    pub fn touch(&self) {
        self.last_seen_ms.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn last_seen_ms(&self) -> i64 {
        self.last_seen_ms.load(Ordering::Relaxed)
    }

    /// Signals the writer task to stop and the socket to close.
    pub fn close(&self) {
        let _ = self.close_tx.send(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.close_tx.borrow()
    }

    /// Watch handle for the writer task's shutdown arm.
    pub fn closed(&self) -> watch::Receiver<bool> {
        self.close_tx.subscribe()
    }

    fn try_deliver(&self, message: HubMessage) -> bool {
        self.sender.try_send(message).is_ok()
    }
}

/// One SSE subscriber; at most one per user, newest wins.
pub struct SseConnection {
    pub user_id: String,
    sender: mpsc::Sender<HubMessage>,
    last_active_ms: Arc<AtomicI64>,
}

impl SseConnection {
    pub fn new(user_id: impl Into<String>, buffer: usize) -> (Self, mpsc::Receiver<HubMessage>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let conn = Self {
            user_id: user_id.into(),
            sender,
            last_active_ms: Arc::new(AtomicI64::new(Utc::now().timestamp_millis())),
        };
        (conn, receiver)
    }

    /// Shared liveness stamp; the SSE handler touches it on every frame it
    /// manages to write.
    pub fn activity_handle(&self) -> Arc<AtomicI64> {
        self.last_active_ms.clone()
    }

    fn last_active_ms(&self) -> i64 {
        self.last_active_ms.load(Ordering::Relaxed)
    }

    fn try_deliver(&self, message: HubMessage) -> bool {
        self.sender.try_send(message).is_ok()
    }
}

/// Hub tuning, usually derived from the `wsc` configuration section.
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub node_id: String,
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
    pub message_buffer_size: usize,
    pub sse_message_buffer: usize,
    pub sse_timeout: Duration,
    /// Bus topic for cross-node fan-out.
    pub bus_topic: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            node_id: format!("node-{}", Uuid::new_v4().simple()),
            heartbeat_interval: Duration::from_secs(30),
            client_timeout: Duration::from_secs(90),
            message_buffer_size: 256,
            sse_message_buffer: 100,
            sse_timeout: Duration::from_secs(120),
            bus_topic: "hub:messages".to_string(),
        }
    }
}

impl HubConfig {
    pub fn from_settings(settings: &HubSettings) -> Self {
        let node_id = if settings.node_ip.is_empty() {
            format!("node-{}", Uuid::new_v4().simple())
        } else {
            format!("{}:{}", settings.node_ip, settings.node_port)
        };
        Self {
            node_id,
            heartbeat_interval: settings.heartbeat_interval,
            client_timeout: settings.client_timeout,
            message_buffer_size: settings.message_buffer_size,
            sse_message_buffer: settings.sse_message_buffer,
            sse_timeout: settings.sse_timeout,
            bus_topic: "hub:messages".to_string(),
        }
    }
}

/// Point-in-time hub counters.
#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
    pub node_id: String,
    pub ws_clients: usize,
    pub sse_clients: usize,
    pub users_online: usize,
    pub messages_in: u64,
    pub messages_out: u64,
    pub messages_dropped: u64,
}

enum Command {
    Register(Arc<Client>),
    Unregister(String),
    RegisterSse(SseConnection),
    UnregisterSse(String),
    Dispatch {
        message: HubMessage,
        forwarded: bool,
        reply: Option<oneshot::Sender<Result<(), GatewayError>>>,
    },
    OnlineUsers(oneshot::Sender<Vec<String>>),
    Stats(oneshot::Sender<HubStats>),
    Shutdown,
}

/// Handle to a running hub.
///
/// Cheap to clone via `Arc`; every method forwards to the run loop. All
/// methods return [`GatewayError::HubUnavailable`] once the hub has shut
/// down.
pub struct Hub {
    cmd_tx: mpsc::Sender<Command>,
    config: HubConfig,
    shutdown: AtomicBool,
}

impl Hub {
    /// Starts a single-node hub.
    pub fn new(config: HubConfig) -> Arc<Self> {
        Self::with_bus(config, None)
    }

    /// Starts a hub that mirrors local traffic onto `bus` and re-fans-out
    /// envelopes published by peer nodes, skipping its own stamps.
    pub fn with_bus(config: HubConfig, bus: Option<Arc<dyn PubSubBus>>) -> Arc<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel(1024);
        let hub = Arc::new(Self {
            cmd_tx: cmd_tx.clone(),
            config: config.clone(),
            shutdown: AtomicBool::new(false),
        });

        if let Some(bus) = bus.clone() {
            let ingress_tx = cmd_tx;
            let topic = config.bus_topic.clone();
            let node_id = config.node_id.clone();
            tokio::spawn(async move {
                let mut subscription = bus.subscribe(&topic).await;
                while let Some(payload) = subscription.recv().await {
                    match serde_json::from_slice::<HubMessage>(&payload) {
                        Ok(message) => {
                            if message.node_id == node_id {
                                continue;
                            }
                            let cmd = Command::Dispatch { message, forwarded: true, reply: None };
                            if ingress_tx.send(cmd).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => warn!("discarding malformed bus envelope: {}", err),
                    }
                }
                debug!("bus ingress for {} stopped", node_id);
            });
        }

        tokio::spawn(run_loop(cmd_rx, config, bus));
        hub
    }

    pub fn node_id(&self) -> &str {
        &self.config.node_id
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub async fn register(&self, client: Arc<Client>) -> Result<(), GatewayError> {
        self.send_cmd(Command::Register(client)).await
    }

    /// Safe to call repeatedly; unknown ids are ignored by the loop.
    pub async fn unregister(&self, client_id: &str) -> Result<(), GatewayError> {
        self.send_cmd(Command::Unregister(client_id.to_string())).await
    }

    pub async fn register_sse(&self, conn: SseConnection) -> Result<(), GatewayError> {
        self.send_cmd(Command::RegisterSse(conn)).await
    }

    pub async fn unregister_sse(&self, user_id: &str) -> Result<(), GatewayError> {
        self.send_cmd(Command::UnregisterSse(user_id.to_string())).await
    }

    /// Delivers to every WebSocket client of `user_id` and its SSE
    /// subscriber. Fails with [`GatewayError::NoSubscriber`] when neither
    /// exists.
    pub async fn send_to_user(&self, user_id: &str, mut message: HubMessage) -> Result<(), GatewayError> {
        message.to = Some(user_id.to_string());
        self.dispatch(message).await
    }

    /// Delivers to every client attached to `ticket_id`. Zero recipients is
    /// not an error.
    pub async fn send_to_ticket(&self, ticket_id: &str, mut message: HubMessage) -> Result<(), GatewayError> {
        message.to = None;
        message.ticket_id = Some(ticket_id.to_string());
        self.dispatch(message).await
    }

    /// Fan-out to every client and SSE subscriber.
    pub async fn broadcast(&self, mut message: HubMessage) -> Result<(), GatewayError> {
        message.to = None;
        message.ticket_id = None;
        self.dispatch(message).await
    }

    /// Routes a message by its own addressing fields (used by the adapter
    /// for frames arriving from clients).
    pub async fn dispatch(&self, message: HubMessage) -> Result<(), GatewayError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_cmd(Command::Dispatch {
            message,
            forwarded: false,
            reply: Some(reply_tx),
        })
        .await?;
        reply_rx.await.map_err(|_| GatewayError::HubUnavailable)?
    }

    /// Distinct user ids with at least one live WebSocket connection.
    pub async fn online_users(&self) -> Result<Vec<String>, GatewayError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_cmd(Command::OnlineUsers(reply_tx)).await?;
        reply_rx.await.map_err(|_| GatewayError::HubUnavailable)
    }

    pub async fn stats(&self) -> Result<HubStats, GatewayError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_cmd(Command::Stats(reply_tx)).await?;
        reply_rx.await.map_err(|_| GatewayError::HubUnavailable)
    }

    /// Stops the run loop and closes every client send channel. Idempotent.
    pub async fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.cmd_tx.send(Command::Shutdown).await;
    }

    async fn send_cmd(&self, cmd: Command) -> Result<(), GatewayError> {
        self.cmd_tx.send(cmd).await.map_err(|_| GatewayError::HubUnavailable)
    }
}

// All index state for the run loop. Only the loop touches this.
struct HubState {
    node_id: String,
    clients: AHashMap<String, Arc<Client>>,
    by_user: AHashMap<String, AHashSet<String>>,
    by_ticket: AHashMap<String, AHashSet<String>>,
    sse_by_user: AHashMap<String, SseConnection>,
    messages_in: u64,
    messages_out: u64,
    messages_dropped: u64,
}

impl HubState {
    fn new(node_id: String) -> Self {
        Self {
            node_id,
            clients: AHashMap::new(),
            by_user: AHashMap::new(),
            by_ticket: AHashMap::new(),
            sse_by_user: AHashMap::new(),
            messages_in: 0,
            messages_out: 0,
            messages_dropped: 0,
        }
    }

    fn register(&mut self, client: Arc<Client>) {
        // Re-registration of the same id replaces the previous connection.
        let client_id = client.client_id.clone();
        if self.clients.contains_key(&client_id) {
            self.unregister(&client_id);
        }
        self.by_user
            .entry(client.user_id.clone())
            .or_default()
            .insert(client.client_id.clone());
        if let Some(ticket) = &client.ticket_id {
            self.by_ticket
                .entry(ticket.clone())
                .or_default()
                .insert(client.client_id.clone());
        }
        debug!(
            "registered client {} (user={}, ticket={:?})",
            client.client_id, client.user_id, client.ticket_id
        );
        self.clients.insert(client.client_id.clone(), client);
    }

    fn unregister(&mut self, client_id: &str) {
        let Some(client) = self.clients.remove(client_id) else {
            return;
        };
        if let Some(ids) = self.by_user.get_mut(&client.user_id) {
            ids.remove(client_id);
            if ids.is_empty() {
                self.by_user.remove(&client.user_id);
            }
        }
        if let Some(ticket) = &client.ticket_id {
            if let Some(ids) = self.by_ticket.get_mut(ticket) {
                ids.remove(client_id);
                if ids.is_empty() {
                    self.by_ticket.remove(ticket);
                }
            }
        }
        client.close();
        debug!("unregistered client {} (user={})", client_id, client.user_id);
    }

    fn register_sse(&mut self, conn: SseConnection) {
        let user_id = conn.user_id.clone();
        if self.sse_by_user.insert(user_id.clone(), conn).is_some() {
            // Dropping the old connection's sender ends its stream.
            debug!("replaced sse subscriber for user {}", user_id);
        } else {
            debug!("registered sse subscriber for user {}", user_id);
        }
    }

    fn unregister_sse(&mut self, user_id: &str) {
        if self.sse_by_user.remove(user_id).is_some() {
            debug!("unregistered sse subscriber for user {}", user_id);
        }
    }

    fn dispatch(&mut self, message: &HubMessage) -> Result<(), GatewayError> {
        match message.dispatch_mode() {
            DispatchMode::ToUser(user_id) => {
                let mut delivered_any = false;
                let client_ids: Vec<String> = self
                    .by_user
                    .get(&user_id)
                    .map(|ids| ids.iter().cloned().collect())
                    .unwrap_or_default();
                for client_id in client_ids {
                    delivered_any = true;
                    self.deliver_to_client(&client_id, message);
                }
                let sse_outcome = self
                    .sse_by_user
                    .get(&user_id)
                    .map(|conn| conn.try_deliver(message.clone()));
                if let Some(delivered) = sse_outcome {
                    delivered_any = true;
                    self.deliver_to_sse(&user_id, delivered);
                }
                if delivered_any {
                    Ok(())
                } else {
                    debug!("no subscriber for user {}", user_id);
                    Err(GatewayError::NoSubscriber(user_id))
                }
            }
            DispatchMode::ToTicket(ticket_id) => {
                let client_ids: Vec<String> = self
                    .by_ticket
                    .get(&ticket_id)
                    .map(|ids| ids.iter().cloned().collect())
                    .unwrap_or_default();
                for client_id in client_ids {
                    self.deliver_to_client(&client_id, message);
                }
                Ok(())
            }
            DispatchMode::Broadcast => {
                let client_ids: Vec<String> = self.clients.keys().cloned().collect();
                for client_id in client_ids {
                    self.deliver_to_client(&client_id, message);
                }
                let results: Vec<(String, bool)> = self
                    .sse_by_user
                    .iter()
                    .map(|(user, conn)| (user.clone(), conn.try_deliver(message.clone())))
                    .collect();
                for (user, ok) in results {
                    self.deliver_to_sse(&user, ok);
                }
                Ok(())
            }
        }
    }

    fn deliver_to_client(&mut self, client_id: &str, message: &HubMessage) {
        let Some(client) = self.clients.get(client_id).cloned() else {
            return;
        };
        if client.try_deliver(message.clone()) {
            self.messages_out += 1;
        } else {
            self.messages_dropped += 1;
            debug!("send channel full, dropping message for client {}", client_id);
        }
    }

    fn deliver_to_sse(&mut self, user_id: &str, delivered: bool) {
        if delivered {
            self.messages_out += 1;
        } else {
            self.messages_dropped += 1;
            debug!("sse buffer full, dropping message for user {}", user_id);
        }
    }

    fn online_users(&self) -> Vec<String> {
        self.by_user.keys().cloned().collect()
    }

    fn stats(&self) -> HubStats {
        HubStats {
            node_id: self.node_id.clone(),
            ws_clients: self.clients.len(),
            sse_clients: self.sse_by_user.len(),
            users_online: self.by_user.len(),
            messages_in: self.messages_in,
            messages_out: self.messages_out,
            messages_dropped: self.messages_dropped,
        }
    }

    fn sweep(&mut self, client_timeout: Duration, sse_timeout: Duration) {
        let now_ms = Utc::now().timestamp_millis();
        let stale: Vec<String> = self
            .clients
            .values()
            .filter(|c| now_ms - c.last_seen_ms() > client_timeout.as_millis() as i64)
            .map(|c| c.client_id.clone())
            .collect();
        for client_id in &stale {
            info!("evicting stale client {}", client_id);
            self.unregister(client_id);
        }
        let stale_sse: Vec<String> = self
            .sse_by_user
            .values()
            .filter(|c| now_ms - c.last_active_ms() > sse_timeout.as_millis() as i64)
            .map(|c| c.user_id.clone())
            .collect();
        for user_id in &stale_sse {
            info!("evicting stale sse subscriber for user {}", user_id);
            self.unregister_sse(user_id);
        }
    }

    fn shutdown(&mut self) {
        for client in self.clients.values() {
            client.close();
        }
        self.clients.clear();
        self.by_user.clear();
        self.by_ticket.clear();
        self.sse_by_user.clear();
    }
}

async fn run_loop(
    mut cmd_rx: mpsc::Receiver<Command>,
    config: HubConfig,
    bus: Option<Arc<dyn PubSubBus>>,
) {
    let mut state = HubState::new(config.node_id.clone());
    let mut ticker = interval(config.heartbeat_interval);
    // The first interval tick fires immediately; burn it so the first sweep
    // happens one full period in.
    ticker.tick().await;
    info!("hub {} started", config.node_id);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                None => break,
                Some(Command::Shutdown) => {
                    state.shutdown();
                    break;
                }
                Some(Command::Register(client)) => state.register(client),
                Some(Command::Unregister(client_id)) => state.unregister(&client_id),
                Some(Command::RegisterSse(conn)) => state.register_sse(conn),
                Some(Command::UnregisterSse(user_id)) => state.unregister_sse(&user_id),
                Some(Command::Dispatch { mut message, forwarded, reply }) => {
                    state.messages_in += 1;
                    if !forwarded {
                        message.node_id = config.node_id.clone();
                        if let Some(bus) = &bus {
                            mirror_to_bus(bus, &config.bus_topic, &message);
                        }
                    }
                    let result = state.dispatch(&message);
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                }
                Some(Command::OnlineUsers(reply)) => {
                    let _ = reply.send(state.online_users());
                }
                Some(Command::Stats(reply)) => {
                    let _ = reply.send(state.stats());
                }
            },
            _ = ticker.tick() => state.sweep(config.client_timeout, config.sse_timeout),
        }
    }
    info!("hub {} stopped", config.node_id);
}

// Publishing must not stall the run loop, so it happens on a detached task.
fn mirror_to_bus(bus: &Arc<dyn PubSubBus>, topic: &str, message: &HubMessage) {
    match serde_json::to_vec(message) {
        Ok(payload) => {
            let bus = bus.clone();
            let topic = topic.to_string();
            tokio::spawn(async move {
                if let Err(err) = bus.publish(&topic, payload).await {
                    warn!("bus publish on {} failed: {}", topic, err);
                }
            });
        }
        Err(err) => warn!("cannot encode envelope for bus: {}", err),
    }
}
