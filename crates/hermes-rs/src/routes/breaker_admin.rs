//! Aggregate circuit breaker API.
//!
//! HTTP projection of the registry's aggregate operations: per-breaker
//! stats, fleet health, and resets. Responses use the standard envelope.

use actix_web::{get, post, web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;

use crate::routes::ApiResponse;
use crate::services::breaker_registry::BreakerRegistry;

/// Optional reset target; absent name resets every breaker.
#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub name: Option<String>,
}

/// Per-breaker snapshots for every registered breaker.
#[get("/api/breakers")]
async fn list_breakers(registry: web::Data<BreakerRegistry>) -> impl Responder {
    HttpResponse::Ok().json(ApiResponse::ok(json!(registry.stats())))
}

/// Fleet health: healthy iff no breaker is currently open.
#[get("/api/breakers/health")]
async fn breaker_health(registry: web::Data<BreakerRegistry>) -> impl Responder {
    let health = registry.health_status();
    if health.is_healthy {
        HttpResponse::Ok().json(ApiResponse::ok(json!(health)))
    } else {
        HttpResponse::ServiceUnavailable().json(ApiResponse::ok(json!(health)))
    }
}

/// Resets one breaker (by name in the body) or all of them.
#[post("/api/breakers/reset")]
async fn reset_breakers(
    registry: web::Data<BreakerRegistry>,
    body: Option<web::Json<ResetRequest>>,
) -> impl Responder {
    match body.and_then(|b| b.into_inner().name) {
        Some(name) => {
            if registry.reset_breaker(&name) {
                HttpResponse::Ok().json(ApiResponse::ok_message(format!("breaker {} reset", name)))
            } else {
                HttpResponse::NotFound()
                    .json(ApiResponse::error(format!("breaker {} not found", name)))
            }
        }
        None => {
            registry.reset_all();
            HttpResponse::Ok().json(ApiResponse::ok_message("all breakers reset"))
        }
    }
}

/// Registers the breaker admin endpoints.
pub fn configure_breaker_admin(cfg: &mut web::ServiceConfig) {
    cfg.service(list_breakers).service(breaker_health).service(reset_breakers);
}
