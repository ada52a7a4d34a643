use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Circuit breaker configuration section.
///
/// `prevention_paths` is an ordered prefix list; a request path is gated by a
/// breaker iff it starts with one of the prefixes and is not an exact match
/// in `exclude_paths` (exact exclusion wins).
///
/// # Examples
///
/// ```json
/// {
///   "enabled": true,
///   "failure_threshold": 5,
///   "success_threshold": 3,
///   "volume_threshold": 10,
///   "timeout": 30,
///   "prevention_paths": ["/api/"],
///   "exclude_paths": ["/health"]
/// }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BreakerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Consecutive failures before a Closed breaker may open.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Consecutive Half-Open successes required to close.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// Minimum total requests observed before Closed may open.
    #[serde(default = "default_volume_threshold")]
    pub volume_threshold: u64,

    /// Wait in Open before trial traffic is admitted, in seconds.
    #[serde(default = "default_breaker_timeout", with = "duration_secs")]
    pub timeout: Duration,

    /// Protected path prefixes.
    #[serde(default)]
    pub prevention_paths: Vec<String>,

    /// Exact paths exempt from breaker gating.
    #[serde(default)]
    pub exclude_paths: Vec<String>,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            volume_threshold: default_volume_threshold(),
            timeout: default_breaker_timeout(),
            prevention_paths: Vec::new(),
            exclude_paths: Vec::new(),
        }
    }
}

/// Parameters for the protected outbound WebSocket send channels.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WsBreakerSettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Scales the linear retry backoff (`100 ms × factor × attempt`).
    #[serde(default = "default_backoff_factor")]
    pub retry_backoff_factor: f64,

    /// Liveness probe cadence, in seconds.
    #[serde(default = "default_health_interval", with = "duration_secs")]
    pub health_check_interval: Duration,

    /// Bounded send-queue capacity per connection.
    #[serde(default = "default_queue_size")]
    pub message_queue_size: usize,
}

impl Default for WsBreakerSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_backoff_factor: default_backoff_factor(),
            health_check_interval: default_health_interval(),
            message_queue_size: default_queue_size(),
        }
    }
}

/// Feature gating for the built-in hub API under `/api/wsc`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BuiltinApiSettings {
    #[serde(default = "default_true")]
    pub enable_send: bool,
    #[serde(default = "default_true")]
    pub enable_broadcast: bool,
    #[serde(default = "default_true")]
    pub enable_online: bool,
    #[serde(default = "default_true")]
    pub enable_stats: bool,
    /// Require a resolvable caller identity on every endpoint.
    #[serde(default)]
    pub auth_required: bool,
    /// Restrict broadcast to callers with the admin role.
    #[serde(default)]
    pub admin_only: bool,
}

impl Default for BuiltinApiSettings {
    fn default() -> Self {
        Self {
            enable_send: true,
            enable_broadcast: true,
            enable_online: true,
            enable_stats: true,
            auth_required: false,
            admin_only: false,
        }
    }
}

/// Realtime hub (`wsc`) configuration section.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HubSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Advertised address of this node in a cluster.
    #[serde(default)]
    pub node_ip: String,
    #[serde(default)]
    pub node_port: u16,

    /// Liveness sweep cadence, in seconds.
    #[serde(default = "default_heartbeat_interval", with = "duration_secs")]
    pub heartbeat_interval: Duration,

    /// Idle threshold after which a client is evicted, in seconds.
    #[serde(default = "default_client_timeout", with = "duration_secs")]
    pub client_timeout: Duration,

    /// Per-client send-channel capacity.
    #[serde(default = "default_message_buffer")]
    pub message_buffer_size: usize,

    /// WebSocket origin allow-list; `"*"` allows any origin.
    #[serde(default = "default_origins")]
    pub websocket_origins: Vec<String>,

    /// SSE keepalive comment cadence, in seconds.
    #[serde(default = "default_sse_heartbeat", with = "duration_secs")]
    pub sse_heartbeat: Duration,

    /// Idle threshold after which an SSE subscriber is evicted, in seconds.
    #[serde(default = "default_sse_timeout", with = "duration_secs")]
    pub sse_timeout: Duration,

    /// Per-subscriber SSE message buffer.
    #[serde(default = "default_sse_buffer")]
    pub sse_message_buffer: usize,

    #[serde(default)]
    pub builtin_api: BuiltinApiSettings,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            node_ip: String::new(),
            node_port: 0,
            heartbeat_interval: default_heartbeat_interval(),
            client_timeout: default_client_timeout(),
            message_buffer_size: default_message_buffer(),
            websocket_origins: default_origins(),
            sse_heartbeat: default_sse_heartbeat(),
            sse_timeout: default_sse_timeout(),
            sse_message_buffer: default_sse_buffer(),
            builtin_api: BuiltinApiSettings::default(),
        }
    }
}

/// Complete gateway configuration, loaded from JSON.
///
/// # Examples
///
/// ```rust
/// use hermes_rs::models::settings::Settings;
///
/// let settings = Settings::default();
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Settings {
    /// Configuration schema version.
    #[serde(default)]
    pub version: u8,

    #[serde(default)]
    pub breaker: BreakerSettings,

    #[serde(default)]
    pub websocket_breaker: WsBreakerSettings,

    #[serde(default)]
    pub wsc: HubSettings,
}

impl Settings {
    /// Validates threshold and tuning values before the server starts.
    ///
    /// Returns the first problem found, in configuration order.
    pub fn validate(&self) -> Result<(), String> {
        if self.breaker.failure_threshold == 0 {
            return Err("breaker.failure_threshold must be at least 1".to_string());
        }
        if self.breaker.success_threshold == 0 {
            return Err("breaker.success_threshold must be at least 1".to_string());
        }
        if self.breaker.timeout.is_zero() {
            return Err("breaker.timeout must be positive".to_string());
        }
        for path in self.breaker.prevention_paths.iter().chain(&self.breaker.exclude_paths) {
            if !path.starts_with('/') {
                return Err(format!("breaker path '{}' must start with '/'", path));
            }
        }
        if self.websocket_breaker.retry_backoff_factor <= 0.0 {
            return Err("websocket_breaker.retry_backoff_factor must be positive".to_string());
        }
        if self.websocket_breaker.message_queue_size == 0 {
            return Err("websocket_breaker.message_queue_size must be at least 1".to_string());
        }
        if self.wsc.enabled {
            if self.wsc.heartbeat_interval.is_zero() {
                return Err("wsc.heartbeat_interval must be positive".to_string());
            }
            if self.wsc.client_timeout < self.wsc.heartbeat_interval {
                return Err(
                    "wsc.client_timeout must not be shorter than wsc.heartbeat_interval".to_string(),
                );
            }
            if self.wsc.message_buffer_size == 0 || self.wsc.sse_message_buffer == 0 {
                return Err("wsc message buffers must be at least 1".to_string());
            }
            if self.wsc.websocket_origins.is_empty() {
                return Err(
                    "wsc.websocket_origins must not be empty (use \"*\" to allow any)".to_string(),
                );
            }
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}
fn default_failure_threshold() -> u32 {
    5
}
fn default_success_threshold() -> u32 {
    3
}
fn default_volume_threshold() -> u64 {
    10
}
fn default_breaker_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_factor() -> f64 {
    2.0
}
fn default_health_interval() -> Duration {
    Duration::from_secs(30)
}
fn default_queue_size() -> usize {
    1000
}
fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(30)
}
fn default_client_timeout() -> Duration {
    Duration::from_secs(90)
}
fn default_message_buffer() -> usize {
    256
}
fn default_origins() -> Vec<String> {
    vec!["*".to_string()]
}
fn default_sse_heartbeat() -> Duration {
    Duration::from_secs(15)
}
fn default_sse_timeout() -> Duration {
    Duration::from_secs(120)
}
fn default_sse_buffer() -> usize {
    100
}

/// Second-granularity `Duration` (de)serialization for configuration fields.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
