//! Connection descriptor extraction.
//!
//! Pure function from an HTTP request to the structured descriptor the hub
//! adapter binds clients with. No side effects: enrichment that needs
//! external data (geo lookups, full device parsing, token validation) plugs
//! in through [`ExtractorHooks`].

use crate::models::error::GatewayError;
use crate::services::hub::ClientType;
use actix_web::{HttpMessage, HttpRequest};
use ahash::AHashMap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Identity placed in request extensions by the upstream authenticator.
#[derive(Debug, Clone, Default)]
pub struct ReqUser {
    pub user_id: String,
    pub user_type: String,
    pub role: String,
    pub department: Option<String>,
    pub skills: Vec<String>,
}

/// Coarse device classification derived from the user agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Mobile,
    Tablet,
    Desktop,
}

/// Everything the gateway knows about a connecting client at bind time.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Stable per-connection identity: `client_<user>_<nanos>`.
    pub client_id: String,
    pub user_id: String,
    pub user_type: String,
    pub role: String,
    pub ticket_id: Option<String>,
    pub department: Option<String>,
    pub skills: Vec<String>,
    pub remote_addr: String,
    /// Best-effort client address: `X-Real-IP`, then the first
    /// `X-Forwarded-For` hop, then the peer address.
    pub real_ip: String,
    pub region: Option<String>,
    pub user_agent: String,
    pub origin: String,
    pub referer: String,
    pub accept_language: String,
    /// Retained subset of request headers.
    pub headers: AHashMap<String, String>,
    pub device_type: DeviceType,
    pub client_type: ClientType,
    pub token: Option<String>,
    pub session_id: Option<String>,
    pub connected_at: DateTime<Utc>,
}

/// Optional enrichment callbacks.
///
/// Absent hooks fall back to built-in heuristics (UA substring device
/// detection) or to no enrichment at all (geo, token validation).
#[derive(Clone, Default)]
pub struct ExtractorHooks {
    /// Resolves a region for the client's real IP.
    pub geo: Option<Arc<dyn Fn(&str) -> Option<String> + Send + Sync>>,
    /// Replaces the built-in user-agent device heuristic.
    pub device: Option<Arc<dyn Fn(&str) -> DeviceType + Send + Sync>>,
    /// Vets the extracted token; a rejected token is treated as absent.
    pub token_validator: Option<Arc<dyn Fn(&str) -> bool + Send + Sync>>,
}

const RETAINED_HEADERS: &[&str] = &[
    "x-request-id",
    "x-trace-id",
    "x-forwarded-for",
    "x-real-ip",
    "sec-websocket-protocol",
];

/// Builds a [`ConnectionInfo`] from the request with default hooks.
///
/// # Errors
///
/// [`GatewayError::MissingUserId`] when no identity can be resolved from the
/// request context, the `X-User-ID` header, the `user_id` query parameter,
/// or the `user_id` cookie (in that order).
pub fn extract_user_info(req: &HttpRequest) -> Result<ConnectionInfo, GatewayError> {
    extract_user_info_with(req, &ExtractorHooks::default())
}

/// Builds a [`ConnectionInfo`] using the supplied enrichment hooks.
pub fn extract_user_info_with(
    req: &HttpRequest,
    hooks: &ExtractorHooks,
) -> Result<ConnectionInfo, GatewayError> {
    let ctx_user = req.extensions().get::<ReqUser>().cloned();

    let user_id = resolve_user_id(req, ctx_user.as_ref()).ok_or(GatewayError::MissingUserId)?;

    let user_agent = header(req, "User-Agent");
    let remote_addr = req.peer_addr().map(|addr| addr.to_string()).unwrap_or_default();
    let real_ip = resolve_real_ip(req, &remote_addr);

    let device_type = match &hooks.device {
        Some(hook) => hook(&user_agent),
        None => device_from_user_agent(&user_agent),
    };
    let client_type = resolve_client_type(req, device_type);

    let token = resolve_token(req).filter(|token| match &hooks.token_validator {
        Some(validate) => validate(token),
        None => true,
    });

    let region = hooks.geo.as_ref().and_then(|hook| hook(&real_ip));

    let mut headers = AHashMap::new();
    for name in RETAINED_HEADERS {
        if let Some(value) = req.headers().get(*name).and_then(|v| v.to_str().ok()) {
            headers.insert((*name).to_string(), value.to_string());
        }
    }

    let ticket_id = query_param(req, "ticket_id")
        .or_else(|| opt_header(req, "X-Ticket-ID"))
        .filter(|t| !t.is_empty());

    let user_type = ctx_user
        .as_ref()
        .map(|u| u.user_type.clone())
        .filter(|t| !t.is_empty())
        .or_else(|| opt_header(req, "X-User-Type"))
        .unwrap_or_else(|| "user".to_string());

    let role = ctx_user
        .as_ref()
        .map(|u| u.role.clone())
        .filter(|r| !r.is_empty())
        .or_else(|| opt_header(req, "X-User-Role"))
        .unwrap_or_default();

    let department = ctx_user
        .as_ref()
        .and_then(|u| u.department.clone())
        .or_else(|| opt_header(req, "X-Department"));

    let skills = ctx_user.map(|u| u.skills).unwrap_or_default();

    let session_id = opt_header(req, "X-Session-ID")
        .or_else(|| req.cookie("session_id").map(|c| c.value().to_string()));

    let now = Utc::now();
    let client_id = format!(
        "client_{}_{}",
        user_id,
        now.timestamp_nanos_opt().unwrap_or_else(|| now.timestamp_millis())
    );

    Ok(ConnectionInfo {
        client_id,
        user_id,
        user_type,
        role,
        ticket_id,
        department,
        skills,
        remote_addr,
        real_ip,
        region,
        user_agent,
        origin: header(req, "Origin"),
        referer: header(req, "Referer"),
        accept_language: header(req, "Accept-Language"),
        headers,
        device_type,
        client_type,
        token,
        session_id,
        connected_at: now,
    })
}

fn resolve_user_id(req: &HttpRequest, ctx_user: Option<&ReqUser>) -> Option<String> {
    if let Some(user) = ctx_user {
        if !user.user_id.is_empty() {
            return Some(user.user_id.clone());
        }
    }
    opt_header(req, "X-User-ID")
        .or_else(|| query_param(req, "user_id"))
        .or_else(|| req.cookie("user_id").map(|c| c.value().to_string()))
        .filter(|id| !id.is_empty())
}

fn resolve_real_ip(req: &HttpRequest, remote_addr: &str) -> String {
    if let Some(ip) = opt_header(req, "X-Real-IP").filter(|ip| !ip.is_empty()) {
        return ip;
    }
    if let Some(forwarded) = opt_header(req, "X-Forwarded-For") {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    // Strip the port from "ip:port" peer addresses.
    remote_addr.rsplit_once(':').map(|(ip, _)| ip.to_string()).unwrap_or_else(|| remote_addr.to_string())
}

fn resolve_client_type(req: &HttpRequest, device: DeviceType) -> ClientType {
    let tag = query_param(req, "client_type").or_else(|| opt_header(req, "X-Client-Type"));
    match tag.as_deref() {
        Some("mobile") => ClientType::Mobile,
        Some("desktop") => ClientType::Desktop,
        Some("web") => ClientType::Web,
        _ => match device {
            DeviceType::Mobile | DeviceType::Tablet => ClientType::Mobile,
            DeviceType::Desktop => ClientType::Web,
        },
    }
}

fn resolve_token(req: &HttpRequest) -> Option<String> {
    if let Some(auth) = opt_header(req, "Authorization") {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }
    query_param(req, "token")
        .or_else(|| req.cookie("token").map(|c| c.value().to_string()))
        .filter(|t| !t.is_empty())
}

fn device_from_user_agent(user_agent: &str) -> DeviceType {
    let ua = user_agent.to_ascii_lowercase();
    if ua.contains("ipad") || ua.contains("tablet") {
        DeviceType::Tablet
    } else if ua.contains("mobile") || ua.contains("iphone") || ua.contains("android") {
        DeviceType::Mobile
    } else {
        DeviceType::Desktop
    }
}

fn header(req: &HttpRequest, name: &str) -> String {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn opt_header(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers().get(name).and_then(|value| value.to_str().ok()).map(str::to_string)
}

fn query_param(req: &HttpRequest, name: &str) -> Option<String> {
    req.query_string().split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}
