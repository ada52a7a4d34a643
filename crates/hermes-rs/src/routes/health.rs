use actix_web::{web, HttpResponse, Result};
use once_cell::sync::Lazy;
use serde_json::json;
use std::time::Instant;

static STARTED_AT: Lazy<Instant> = Lazy::new(Instant::now);

/// General health check with service status, version, and uptime.
pub async fn health_check() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime": STARTED_AT.elapsed().as_secs()
    })))
}

/// Readiness probe: the gateway is ready to receive traffic.
pub async fn readiness_check() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "ready",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

/// Liveness probe: the process is alive and should keep running.
pub async fn liveness_check() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "alive",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

/// Registers `GET /health`, `GET /ready`, and `GET /live`.
///
/// # Examples
///
/// ```rust
/// use actix_web::App;
/// use hermes_rs::routes::health::configure_health;
///
/// let app = App::new().configure(configure_health);
/// ```
pub fn configure_health(cfg: &mut web::ServiceConfig) {
    // Touch the start instant so uptime counts from process start, not from
    // the first probe.
    Lazy::force(&STARTED_AT);
    cfg.route("/health", web::get().to(health_check))
        .route("/ready", web::get().to(readiness_check))
        .route("/live", web::get().to(liveness_check));
}
