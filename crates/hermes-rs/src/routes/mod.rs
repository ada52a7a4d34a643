//! HTTP route handlers and endpoint definitions for the hermes-rs gateway.
//!
//! - [`health`] - health check endpoints for monitoring and probes
//! - [`breaker_admin`] - aggregate circuit breaker API (stats, health, reset)
//! - [`hub_ws`] - WebSocket upgrade and SSE endpoints bound to the hub
//! - [`hub_api`] - built-in hub API under `/api/wsc`

use serde::Serialize;
use serde_json::Value;

pub mod breaker_admin;
pub mod health;
pub mod hub_api;
pub mod hub_ws;

/// Uniform response envelope for the gateway's own API surfaces.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            error: None,
        }
    }

    pub fn ok_message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
            error: None,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            data: None,
            error: Some(error.into()),
        }
    }
}
