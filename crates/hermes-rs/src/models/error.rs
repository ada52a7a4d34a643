use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde_json::json;

/// Closed error taxonomy for the gateway cores.
///
/// Every failure surfaced by the breaker subsystem, the protected send
/// channels, and the hub maps onto one of these variants. The HTTP
/// translation lives here so handlers and middleware can bubble errors with
/// `?` and still produce the documented wire responses.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("circuit breaker is open")]
    CircuitOpen,
    #[error("message queue is full")]
    QueueFull,
    #[error("connection is closed")]
    ConnectionClosed,
    #[error("connection {0} is already registered")]
    AlreadyRegistered(String),
    #[error("connection {0} not found")]
    ConnectionNotFound(String),
    #[error("no subscriber for user {0}")]
    NoSubscriber(String),
    #[error("user id is missing")]
    MissingUserId,
    #[error("hub is not running")]
    HubUnavailable,
    #[error("send failed: {0}")]
    Send(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl actix_web::error::ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::MissingUserId => StatusCode::UNAUTHORIZED,
            GatewayError::NoSubscriber(_) => StatusCode::NOT_FOUND,
            GatewayError::ConnectionNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::AlreadyRegistered(_) => StatusCode::CONFLICT,
            GatewayError::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            // The breaker body is part of the wire contract and must not drift.
            GatewayError::CircuitOpen => HttpResponse::ServiceUnavailable().json(json!({
                "code": 503,
                "message": "Service temporarily unavailable (circuit breaker open)",
                "success": false
            })),
            GatewayError::MissingUserId => HttpResponse::Unauthorized().json(json!({
                "code": 401,
                "message": self.to_string(),
                "success": false
            })),
            other => HttpResponse::build(other.status_code()).json(json!({
                "success": false,
                "error": other.to_string()
            })),
        }
    }
}
