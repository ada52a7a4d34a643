//! Hermes Gateway Server
//!
//! Realtime RPC/API gateway built with Rust and Actix Web.
//!
//! This binary wires the hermes-rs cores together: the circuit breaker
//! registry and its HTTP gate, the realtime hub with its WebSocket/SSE
//! endpoints and built-in API, plus health and breaker admin surfaces.

use hermes_rs::config::settings::load_settings;
use hermes_rs::logs::logger::configure_logger;
use hermes_rs::middleware::circuit_breaker::CircuitBreakerGate;
use hermes_rs::models::settings::Settings;
use hermes_rs::routes::hub_api::ApiGate;
use hermes_rs::routes::{breaker_admin, health, hub_api, hub_ws};
use hermes_rs::services::breaker_registry::BreakerRegistry;
use hermes_rs::services::hub::{Hub, HubConfig};

use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::middleware::{Compress, Condition, Logger};
use actix_web::{web, App, HttpServer};
use log::{error, info};
use tokio::signal;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    configure_logger();

    let config: Settings = load_settings().expect("failed to load settings");
    if let Err(err) = config.validate() {
        error!("configuration validation failed: {}", err);
        std::process::exit(1);
    }

    info!("starting hermes gateway v{}", env!("CARGO_PKG_VERSION"));

    let registry = BreakerRegistry::from_settings(&config.breaker);
    let hub = if config.wsc.enabled {
        let hub = Hub::new(HubConfig::from_settings(&config.wsc));
        info!("hub enabled on node {}", hub.node_id());
        Some(hub)
    } else {
        None
    };

    // Fallback rate limiting in front of everything else.
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(100)
        .burst_size(200)
        .finish()
        .expect("invalid governor configuration");

    let host = std::env::var("HERMES_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("HERMES_PORT")
        .unwrap_or_else(|_| "5900".to_string())
        .parse::<u16>()
        .unwrap_or(5900);

    info!(
        "listening on {}:{} (breaker={}, hub={})",
        host,
        port,
        config.breaker.enabled,
        config.wsc.enabled
    );

    let breaker_enabled = config.breaker.enabled;
    let app_registry = registry.clone();
    let app_hub = hub.clone();
    let wsc = config.wsc.clone();

    let server = HttpServer::new(move || {
        let mut app = App::new()
            .app_data(web::Data::from(app_registry.clone()))
            .wrap(Condition::new(
                breaker_enabled,
                CircuitBreakerGate::new(app_registry.clone()),
            ))
            .wrap(Governor::new(&governor_conf))
            .wrap(Logger::new(r#"%a "%r" %s %b "%{Referer}i" "%{User-Agent}i" %T"#))
            .wrap(Compress::default())
            .configure(health::configure_health)
            .configure(breaker_admin::configure_breaker_admin);
        if let Some(hub) = app_hub.clone() {
            let hub_api_hub = hub.clone();
            let api_settings = wsc.builtin_api.clone();
            let ws_settings = wsc.clone();
            app = app
                .configure(move |cfg| hub_ws::configure_hub_ws(cfg, hub, ws_settings))
                .configure(move |cfg| {
                    hub_api::configure_hub_api(cfg, hub_api_hub, ApiGate::new(api_settings))
                });
        }
        app
    })
    .bind((host.as_str(), port))?
    .run();

    info!("server started successfully");

    tokio::select! {
        result = server => {
            match result {
                Ok(_) => info!("server stopped gracefully"),
                Err(err) => error!("server error: {}", err),
            }
        }
        _ = signal::ctrl_c() => {
            info!("received shutdown signal, stopping server...");
        }
    }

    if let Some(hub) = hub {
        hub.shutdown().await;
        info!("hub stopped");
    }

    Ok(())
}
