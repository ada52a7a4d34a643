//! Core services of the hermes-rs gateway.
//!
//! - [`circuit_breaker`] - per-route breaker state machine
//! - [`breaker_registry`] - breaker lifecycle and path classification
//! - [`ws_channel`] - breaker-protected outbound WebSocket sender
//! - [`ws_pool`] - lifecycle pool over protected connections
//! - [`hub`] - realtime WebSocket/SSE messaging hub
//! - [`pubsub`] - bus boundary for cross-node hub fan-out

pub mod breaker_registry;
pub mod circuit_breaker;
pub mod hub;
pub mod pubsub;
pub mod ws_channel;
pub mod ws_pool;
