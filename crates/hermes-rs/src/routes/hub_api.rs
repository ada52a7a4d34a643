//! Built-in hub API.
//!
//! Small HTTP surface over the hub, mounted under `/api/wsc`: targeted
//! send, broadcast, online-user listing, and stats. Each endpoint is
//! registered only when its feature flag is on; identity and admin gating
//! are applied per request.

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use log::debug;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::error::GatewayError;
use crate::models::message::HubMessage;
use crate::models::settings::BuiltinApiSettings;
use crate::routes::ApiResponse;
use crate::services::hub::Hub;
use crate::utils::user_info::ReqUser;

/// Custom caller-identity resolver, e.g. one that understands bearer tokens.
pub type IdentityResolver = Arc<dyn Fn(&HttpRequest) -> Option<String> + Send + Sync>;

/// Per-request gating for the built-in API.
///
/// The default identity chain reads the request-extension identity left by
/// the upstream authenticator, then the `X-User-ID` header. Deployments
/// that carry identity in bearer tokens plug a resolver in; the gateway
/// itself does not validate tokens.
#[derive(Clone)]
pub struct ApiGate {
    settings: BuiltinApiSettings,
    resolver: Option<IdentityResolver>,
}

impl ApiGate {
    pub fn new(settings: BuiltinApiSettings) -> Self {
        Self { settings, resolver: None }
    }

    pub fn with_resolver(mut self, resolver: IdentityResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn settings(&self) -> &BuiltinApiSettings {
        &self.settings
    }

    fn caller(&self, req: &HttpRequest) -> Option<String> {
        if let Some(resolver) = &self.resolver {
            if let Some(id) = resolver(req) {
                return Some(id);
            }
        }
        if let Some(user) = req.extensions().get::<ReqUser>() {
            if !user.user_id.is_empty() {
                return Some(user.user_id.clone());
            }
        }
        req.headers()
            .get("X-User-ID")
            .and_then(|value| value.to_str().ok())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }

    fn role(&self, req: &HttpRequest) -> Option<String> {
        if let Some(user) = req.extensions().get::<ReqUser>() {
            if !user.role.is_empty() {
                return Some(user.role.clone());
            }
        }
        req.headers()
            .get("X-User-Role")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }

    fn authorize(&self, req: &HttpRequest) -> Result<Option<String>, HttpResponse> {
        let caller = self.caller(req);
        if self.settings.auth_required && caller.is_none() {
            return Err(
                HttpResponse::Unauthorized().json(ApiResponse::error("authentication required"))
            );
        }
        Ok(caller)
    }

    fn authorize_admin(&self, req: &HttpRequest) -> Result<Option<String>, HttpResponse> {
        let caller = self.authorize(req)?;
        if self.settings.admin_only && self.role(req).as_deref() != Some("admin") {
            return Err(HttpResponse::Forbidden().json(ApiResponse::error("admin role required")));
        }
        Ok(caller)
    }
}

/// Body of `POST /api/wsc/send`.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub to: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Body of `POST /api/wsc/broadcast`.
#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

fn build_message(
    kind: Option<String>,
    from: Option<String>,
    content: String,
    data: Option<Value>,
) -> HubMessage {
    let mut message = HubMessage::new(
        kind.unwrap_or_else(|| "text".to_string()),
        from.unwrap_or_else(|| "system".to_string()),
        content,
    );
    message.data = data;
    message.correlation_id = Some(Uuid::new_v4().to_string());
    message
}

async fn send_message(
    req: HttpRequest,
    hub: web::Data<Hub>,
    gate: web::Data<ApiGate>,
    body: web::Json<SendMessageRequest>,
) -> HttpResponse {
    let caller = match gate.authorize(&req) {
        Ok(caller) => caller,
        Err(denied) => return denied,
    };
    let body = body.into_inner();
    if body.to.is_empty() {
        return HttpResponse::BadRequest().json(ApiResponse::error("missing recipient id"));
    }
    let Some(content) = body.content.filter(|c| !c.is_empty()) else {
        return HttpResponse::BadRequest().json(ApiResponse::error("missing message content"));
    };

    let message = build_message(body.kind, caller, content, body.data);
    match hub.send_to_user(&body.to, message).await {
        Ok(()) => HttpResponse::Ok().json(ApiResponse::ok_message("message dispatched")),
        Err(err @ GatewayError::NoSubscriber(_)) => {
            debug!("send to offline user {}", body.to);
            HttpResponse::NotFound().json(ApiResponse::error(err.to_string()))
        }
        Err(err) => HttpResponse::InternalServerError().json(ApiResponse::error(err.to_string())),
    }
}

async fn broadcast_message(
    req: HttpRequest,
    hub: web::Data<Hub>,
    gate: web::Data<ApiGate>,
    body: web::Json<BroadcastRequest>,
) -> HttpResponse {
    let caller = match gate.authorize_admin(&req) {
        Ok(caller) => caller,
        Err(denied) => return denied,
    };
    let body = body.into_inner();
    let Some(content) = body.content.filter(|c| !c.is_empty()) else {
        return HttpResponse::BadRequest().json(ApiResponse::error("missing message content"));
    };

    let message = build_message(body.kind, caller, content, body.data);
    match hub.broadcast(message).await {
        Ok(()) => HttpResponse::Ok().json(ApiResponse::ok_message("broadcast dispatched")),
        Err(err) => HttpResponse::InternalServerError().json(ApiResponse::error(err.to_string())),
    }
}

async fn online_users(req: HttpRequest, hub: web::Data<Hub>, gate: web::Data<ApiGate>) -> HttpResponse {
    if let Err(denied) = gate.authorize(&req) {
        return denied;
    }
    match hub.online_users().await {
        Ok(users) => HttpResponse::Ok().json(ApiResponse::ok(json!({
            "count": users.len(),
            "users": users,
        }))),
        Err(err) => HttpResponse::InternalServerError().json(ApiResponse::error(err.to_string())),
    }
}

async fn hub_stats(req: HttpRequest, hub: web::Data<Hub>, gate: web::Data<ApiGate>) -> HttpResponse {
    if let Err(denied) = gate.authorize(&req) {
        return denied;
    }
    match hub.stats().await {
        Ok(stats) => HttpResponse::Ok().json(ApiResponse::ok(json!(stats))),
        Err(err) => HttpResponse::InternalServerError().json(ApiResponse::error(err.to_string())),
    }
}

/// Mounts the enabled endpoints under `/api/wsc`.
///
/// Endpoints whose flag is off are not registered at all, so a disabled
/// endpoint answers 404 rather than 403.
pub fn configure_hub_api(cfg: &mut web::ServiceConfig, hub: Arc<Hub>, gate: ApiGate) {
    let flags = gate.settings().clone();
    let mut scope = web::scope("/api/wsc")
        .app_data(web::Data::from(hub))
        .app_data(web::Data::new(gate));
    if flags.enable_send {
        scope = scope.route("/send", web::post().to(send_message));
    }
    if flags.enable_broadcast {
        scope = scope.route("/broadcast", web::post().to(broadcast_message));
    }
    if flags.enable_online {
        scope = scope.route("/online", web::get().to(online_users));
    }
    if flags.enable_stats {
        scope = scope.route("/stats", web::get().to(hub_stats));
    }
    cfg.service(scope);
}
