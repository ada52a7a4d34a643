use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use hermes_rs::routes::breaker_admin::configure_breaker_admin;
use hermes_rs::services::breaker_registry::BreakerRegistry;
use hermes_rs::services::circuit_breaker::CircuitBreakerConfig;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn tripped_registry() -> Arc<BreakerRegistry> {
    let registry = BreakerRegistry::new(
        CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 1,
            volume_threshold: 1,
            timeout: Duration::from_secs(30),
        },
        vec!["/api/".to_string()],
        vec![],
    );
    registry.get_breaker("/api/orders").record_failure();
    registry.get_breaker("/api/users");
    registry
}

#[actix_web::test]
async fn lists_per_breaker_stats() {
    let registry = tripped_registry();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(registry))
            .configure(configure_breaker_admin),
    )
    .await;

    let resp =
        test::call_service(&app, test::TestRequest::get().uri("/api/breakers").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], json!(true));
    let breakers = body["data"].as_array().expect("breaker list");
    assert_eq!(breakers.len(), 2);
    assert_eq!(breakers[0]["name"], json!("/api/orders"));
    assert_eq!(breakers[0]["state"], json!("open"));
    assert_eq!(breakers[1]["state"], json!("closed"));
}

#[actix_web::test]
async fn health_reports_open_breakers_as_unavailable() {
    let registry = tripped_registry();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(registry.clone()))
            .configure(configure_breaker_admin),
    )
    .await;

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/breakers/health").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["is_healthy"], json!(false));
    assert_eq!(body["data"]["open"], json!(1));

    registry.reset_all();
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/breakers/health").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn reset_targets_one_breaker_or_all() {
    let registry = tripped_registry();
    registry.get_breaker("/api/users").record_failure();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(registry.clone()))
            .configure(configure_breaker_admin),
    )
    .await;

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/breakers/reset")
            .set_json(json!({"name": "/api/orders"}))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(registry.count_open(), 1);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/breakers/reset")
            .set_json(json!({"name": "/api/ghost"}))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/breakers/reset")
            .set_json(json!({}))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(registry.count_open(), 0);
}
