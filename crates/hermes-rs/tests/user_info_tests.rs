use actix_web::cookie::Cookie;
use actix_web::test::TestRequest;
use actix_web::HttpMessage;
use hermes_rs::models::error::GatewayError;
use hermes_rs::services::hub::ClientType;
use hermes_rs::utils::user_info::{
    extract_user_info, extract_user_info_with, DeviceType, ExtractorHooks, ReqUser,
};
use std::sync::Arc;

#[actix_web::test]
async fn missing_user_id_is_an_error() {
    let req = TestRequest::default().to_http_request();
    let result = extract_user_info(&req);
    assert!(matches!(result, Err(GatewayError::MissingUserId)));
}

#[actix_web::test]
async fn identity_chain_prefers_context_then_header_then_query_then_cookie() {
    // Context identity wins over everything else.
    let req = TestRequest::default()
        .insert_header(("X-User-ID", "header-user"))
        .uri("/ws?user_id=query-user")
        .to_http_request();
    req.extensions_mut().insert(ReqUser {
        user_id: "ctx-user".to_string(),
        ..ReqUser::default()
    });
    assert_eq!(extract_user_info(&req).unwrap().user_id, "ctx-user");

    // Header beats query.
    let req = TestRequest::default()
        .insert_header(("X-User-ID", "header-user"))
        .uri("/ws?user_id=query-user")
        .to_http_request();
    assert_eq!(extract_user_info(&req).unwrap().user_id, "header-user");

    // Query beats cookie.
    let req = TestRequest::default()
        .uri("/ws?user_id=query-user")
        .cookie(Cookie::new("user_id", "cookie-user"))
        .to_http_request();
    assert_eq!(extract_user_info(&req).unwrap().user_id, "query-user");

    // Cookie is the last resort.
    let req = TestRequest::default()
        .cookie(Cookie::new("user_id", "cookie-user"))
        .to_http_request();
    assert_eq!(extract_user_info(&req).unwrap().user_id, "cookie-user");
}

#[actix_web::test]
async fn client_id_is_derived_from_the_user() {
    let req = TestRequest::default()
        .insert_header(("X-User-ID", "u1"))
        .to_http_request();
    let info = extract_user_info(&req).unwrap();
    assert!(info.client_id.starts_with("client_u1_"));
    assert!(info.client_id.len() > "client_u1_".len());
}

#[actix_web::test]
async fn real_ip_resolution_order() {
    let req = TestRequest::default()
        .insert_header(("X-User-ID", "u1"))
        .insert_header(("X-Real-IP", "10.0.0.1"))
        .insert_header(("X-Forwarded-For", "10.0.0.2, 10.0.0.3"))
        .to_http_request();
    assert_eq!(extract_user_info(&req).unwrap().real_ip, "10.0.0.1");

    let req = TestRequest::default()
        .insert_header(("X-User-ID", "u1"))
        .insert_header(("X-Forwarded-For", "10.0.0.2, 10.0.0.3"))
        .to_http_request();
    assert_eq!(extract_user_info(&req).unwrap().real_ip, "10.0.0.2");
}

#[actix_web::test]
async fn token_comes_from_bearer_header_query_or_cookie() {
    let req = TestRequest::default()
        .insert_header(("X-User-ID", "u1"))
        .insert_header(("Authorization", "Bearer abc123"))
        .uri("/ws?token=query-token")
        .to_http_request();
    assert_eq!(extract_user_info(&req).unwrap().token.as_deref(), Some("abc123"));

    let req = TestRequest::default()
        .insert_header(("X-User-ID", "u1"))
        .uri("/ws?token=query-token")
        .to_http_request();
    assert_eq!(
        extract_user_info(&req).unwrap().token.as_deref(),
        Some("query-token")
    );

    let req = TestRequest::default()
        .insert_header(("X-User-ID", "u1"))
        .cookie(Cookie::new("token", "cookie-token"))
        .to_http_request();
    assert_eq!(
        extract_user_info(&req).unwrap().token.as_deref(),
        Some("cookie-token")
    );
}

#[actix_web::test]
async fn device_and_client_type_from_user_agent() {
    let req = TestRequest::default()
        .insert_header(("X-User-ID", "u1"))
        .insert_header(("User-Agent", "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0) Mobile"))
        .to_http_request();
    let info = extract_user_info(&req).unwrap();
    assert_eq!(info.device_type, DeviceType::Mobile);
    assert_eq!(info.client_type, ClientType::Mobile);

    // An explicit tag overrides the heuristic.
    let req = TestRequest::default()
        .insert_header(("X-User-ID", "u1"))
        .insert_header(("User-Agent", "Mozilla/5.0 (iPhone) Mobile"))
        .insert_header(("X-Client-Type", "desktop"))
        .to_http_request();
    assert_eq!(extract_user_info(&req).unwrap().client_type, ClientType::Desktop);
}

#[actix_web::test]
async fn business_tags_flow_from_context_and_headers() {
    let req = TestRequest::default()
        .insert_header(("X-Ticket-ID", "T-77"))
        .to_http_request();
    req.extensions_mut().insert(ReqUser {
        user_id: "agent-9".to_string(),
        user_type: "agent".to_string(),
        role: "supervisor".to_string(),
        department: Some("support".to_string()),
        skills: vec!["billing".to_string()],
    });

    let info = extract_user_info(&req).unwrap();
    assert_eq!(info.user_type, "agent");
    assert_eq!(info.role, "supervisor");
    assert_eq!(info.department.as_deref(), Some("support"));
    assert_eq!(info.skills, vec!["billing".to_string()]);
    assert_eq!(info.ticket_id.as_deref(), Some("T-77"));
}

#[actix_web::test]
async fn request_metadata_is_captured() {
    let req = TestRequest::default()
        .insert_header(("X-User-ID", "u1"))
        .insert_header(("Origin", "https://app.example.com"))
        .insert_header(("Referer", "https://app.example.com/chat"))
        .insert_header(("Accept-Language", "en-US"))
        .insert_header(("X-Request-ID", "req-1"))
        .to_http_request();

    let info = extract_user_info(&req).unwrap();
    assert_eq!(info.origin, "https://app.example.com");
    assert_eq!(info.referer, "https://app.example.com/chat");
    assert_eq!(info.accept_language, "en-US");
    assert_eq!(info.headers.get("x-request-id").map(String::as_str), Some("req-1"));
}

#[actix_web::test]
async fn hooks_enrich_and_vet() {
    let hooks = ExtractorHooks {
        geo: Some(Arc::new(|ip: &str| {
            (ip == "10.0.0.1").then(|| "eu-west".to_string())
        })),
        device: Some(Arc::new(|_ua: &str| DeviceType::Tablet)),
        token_validator: Some(Arc::new(|token: &str| token == "valid")),
    };

    let req = TestRequest::default()
        .insert_header(("X-User-ID", "u1"))
        .insert_header(("X-Real-IP", "10.0.0.1"))
        .insert_header(("Authorization", "Bearer valid"))
        .to_http_request();
    let info = extract_user_info_with(&req, &hooks).unwrap();
    assert_eq!(info.region.as_deref(), Some("eu-west"));
    assert_eq!(info.device_type, DeviceType::Tablet);
    assert_eq!(info.token.as_deref(), Some("valid"));

    // A rejected token is treated as absent.
    let req = TestRequest::default()
        .insert_header(("X-User-ID", "u1"))
        .insert_header(("Authorization", "Bearer forged"))
        .to_http_request();
    let info = extract_user_info_with(&req, &hooks).unwrap();
    assert_eq!(info.token, None);
}
