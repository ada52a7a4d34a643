//! # Hermes-rs Realtime Gateway Core
//!
//! The library behind the hermes gateway: per-route circuit breaking for
//! HTTP traffic and a realtime WebSocket/SSE messaging hub, built on Actix
//! Web and Tokio.
//!
//! ## Quick Start
//!
//! ```rust
//! use hermes_rs::models::settings::Settings;
//! use hermes_rs::services::breaker_registry::BreakerRegistry;
//! use hermes_rs::services::hub::{Hub, HubConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::default();
//!     settings.validate()?;
//!
//!     // Breakers gate protected routes; the hub fans out realtime traffic.
//!     let registry = BreakerRegistry::from_settings(&settings.breaker);
//!     let hub = Hub::new(HubConfig::from_settings(&settings.wsc));
//!
//!     assert!(registry.health_status().is_healthy);
//!     hub.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Core Features
//!
//! ### Circuit Breaking
//! - **Per-route breakers**: one state machine per protected path prefix,
//!   created on demand by a central registry
//! - **Volume-aware opening**: a minimum request volume prevents flapping
//!   on low-traffic routes
//! - **Middleware gating**: open breakers short-circuit with 503 before the
//!   downstream handler runs; responses >= 500 feed back as failures
//! - **Protected WS senders**: outbound sockets wrapped with breaker
//!   admission, bounded retry, and an async send queue
//!
//! ### Realtime Hub
//! - **WebSocket + SSE**: clients indexed by user and ticket, SSE
//!   subscribers keyed per user (newest wins)
//! - **Targeted / ticket / broadcast dispatch** derived from the message
//!   envelope
//! - **Heartbeat sweeping**: idle connections are evicted on a timer
//! - **Cluster fan-out**: optional pub/sub bus mirroring with node-id
//!   deduplication
//!
//! ## Architecture Overview
//!
//! ```text
//! inbound HTTP ──► breaker gate ──(allow/deny)──► handlers
//!                      │ status >= 500 -> failure
//!                      ▼
//!                breaker registry
//!
//! WS upgrade ──► hub adapter ──► hub run loop ──► per-client queues
//! SSE request ─► hub adapter ──►      │        ──► sse buffers
//!                                     ▼
//!                              pub/sub bus (peers)
//! ```
//!
//! ## Module Organization
//!
//! - **[`config`]** - configuration file loading
//! - **[`logs`]** - logger setup
//! - **[`models`]** - error taxonomy, wire envelope, settings
//! - **[`middleware`]** - the circuit breaker gate
//! - **[`services`]** - breakers, registry, protected channels, hub, bus
//! - **[`routes`]** - health, breaker admin, hub endpoints
//! - **[`utils`]** - connection descriptor extraction
//!
//! ## Environment Variables
//!
//! - `HERMES_CONFIG_PATH`: configuration file path (default `./config.json`)
//! - `HERMES_HOST`: server bind address (default `0.0.0.0`)
//! - `HERMES_PORT`: server port (default `5900`)
//! - `NO_COLOR`: disable colored log output

pub mod config;
pub mod logs;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;
