//! Request-level circuit breaker gate.
//!
//! Looks up the breaker for each protected path, short-circuits with a 503
//! while the breaker is open, and classifies the downstream response to feed
//! the breaker: any status >= 500 is a failure, everything else (including
//! 4xx client errors) is a success, because client mistakes say nothing
//! about backend health.

use crate::models::error::GatewayError;
use crate::services::breaker_registry::BreakerRegistry;
use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    Error as ActixError,
};
use futures::future::{LocalBoxFuture, Ready};
use log::{debug, warn};
use std::sync::Arc;
use std::task::{Context, Poll};

/// Circuit breaker middleware factory.
///
/// # Examples
///
/// ```rust
/// use actix_web::App;
/// use hermes_rs::middleware::circuit_breaker::CircuitBreakerGate;
/// use hermes_rs::services::breaker_registry::BreakerRegistry;
/// use hermes_rs::services::circuit_breaker::CircuitBreakerConfig;
///
/// let registry = BreakerRegistry::new(
///     CircuitBreakerConfig::default(),
///     vec!["/api/".to_string()],
///     vec![],
/// );
/// let app = App::new().wrap(CircuitBreakerGate::new(registry));
/// ```
#[derive(Clone)]
pub struct CircuitBreakerGate {
    registry: Arc<BreakerRegistry>,
}

impl CircuitBreakerGate {
    pub fn new(registry: Arc<BreakerRegistry>) -> Self {
        Self { registry }
    }
}

impl<S, B> Transform<S, ServiceRequest> for CircuitBreakerGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = ActixError;
    type Transform = CircuitBreakerGateMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        futures::future::ready(Ok(CircuitBreakerGateMiddleware {
            service: Arc::new(service),
            registry: self.registry.clone(),
        }))
    }
}

/// Per-request breaker gating logic.
pub struct CircuitBreakerGateMiddleware<S> {
    service: Arc<S>,
    registry: Arc<BreakerRegistry>,
}

impl<S, B> Service<ServiceRequest> for CircuitBreakerGateMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = ActixError;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let registry = self.registry.clone();

        Box::pin(async move {
            let path = req.path().to_string();
            if !registry.is_path_protected(&path) {
                return service.call(req).await;
            }

            let breaker = registry.get_breaker(&path);
            if !breaker.allow() {
                warn!("circuit breaker rejected request to {}", path);
                return Err(GatewayError::CircuitOpen.into());
            }

            let result = service.call(req).await;
            // A rejection above never reaches this point, so every recorded
            // outcome corresponds to one admitted request.
            match &result {
                Ok(response) => {
                    if response.status().is_server_error() {
                        debug!("{} -> {} recorded as failure", path, response.status());
                        breaker.record_failure();
                    } else {
                        breaker.record_success();
                    }
                }
                Err(err) => {
                    let status = err.as_response_error().status_code();
                    if status.is_server_error() {
                        debug!("{} -> {} recorded as failure", path, status);
                        breaker.record_failure();
                    } else {
                        breaker.record_success();
                    }
                }
            }
            result
        })
    }
}
