//! Hub adapter: WebSocket upgrade and SSE endpoints.
//!
//! The boundary between the HTTP layer and the hub core. `/ws` upgrades the
//! connection, binds a client built from the request descriptor, and runs
//! one reader and one writer task per connection. `/sse` streams hub
//! messages as `data:` frames with periodic keepalive comments.

use actix_web::{web, Error as ActixError, HttpRequest, HttpResponse};
use actix_ws::{Message, MessageStream, Session};
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use log::{debug, info, warn};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::models::message::HubMessage;
use crate::models::settings::HubSettings;
use crate::routes::ApiResponse;
use crate::services::hub::{Client, ClientInfo, Hub, SseConnection};
use crate::utils::user_info::{extract_user_info, ConnectionInfo};

/// Registers `GET /ws` and `GET /sse`.
pub fn configure_hub_ws(cfg: &mut web::ServiceConfig, hub: Arc<Hub>, settings: HubSettings) {
    cfg.app_data(web::Data::from(hub))
        .app_data(web::Data::new(settings))
        .route("/ws", web::get().to(hub_websocket))
        .route("/sse", web::get().to(hub_sse));
}

/// WebSocket upgrade endpoint.
///
/// Rejects disallowed origins with 403 and missing identity with 401, then
/// registers the client and detaches the reader/writer tasks.
pub async fn hub_websocket(
    req: HttpRequest,
    stream: web::Payload,
    hub: web::Data<Hub>,
    settings: web::Data<HubSettings>,
) -> Result<HttpResponse, ActixError> {
    if !origin_allowed(&req, &settings.websocket_origins) {
        return Ok(HttpResponse::Forbidden().json(ApiResponse::error("origin not allowed")));
    }
    let info = extract_user_info(&req)?;

    let (response, session, msg_stream) = actix_ws::handle(&req, stream)?;
    let (client, receiver) =
        Client::new(client_info(&info), hub.node_id(), settings.message_buffer_size);
    hub.register(client.clone()).await?;
    info!("websocket client {} connected (user={})", client.client_id, client.user_id);

    spawn_writer(session.clone(), receiver, client.clone(), hub.clone());
    spawn_reader(session, msg_stream, client, hub);

    Ok(response)
}

/// Server-sent-events endpoint.
///
/// The first frame is the `connected` acknowledgement; afterwards each hub
/// message becomes one `data: <json>` frame, interleaved with `: heartbeat`
/// comments on the configured cadence. The stream ends when the hub drops
/// the subscriber (replacement, eviction, or shutdown).
pub async fn hub_sse(
    req: HttpRequest,
    hub: web::Data<Hub>,
    settings: web::Data<HubSettings>,
) -> Result<HttpResponse, ActixError> {
    let info = extract_user_info(&req)?;
    let user_id = info.user_id;

    let (conn, receiver) = SseConnection::new(user_id.clone(), settings.sse_message_buffer);
    let activity = conn.activity_handle();
    hub.register_sse(conn).await?;
    info!("sse subscriber connected for user {}", user_id);

    let initial = format!("data: {{\"type\":\"connected\",\"user_id\":\"{}\"}}\n\n", user_id);
    let mut ticker = tokio::time::interval(settings.sse_heartbeat);
    // interval's first tick completes immediately; spend it before streaming.
    ticker.tick().await;

    let frames = stream::unfold(
        (receiver, ticker, activity),
        |(mut receiver, mut ticker, activity)| async move {
            tokio::select! {
                maybe = receiver.recv() => match maybe {
                    Some(message) => {
                        activity.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
                        let frame = match serde_json::to_string(&message) {
                            Ok(json) => format!("data: {}\n\n", json),
                            Err(err) => {
                                warn!("cannot encode sse frame: {}", err);
                                String::new()
                            }
                        };
                        Some((Ok::<web::Bytes, ActixError>(web::Bytes::from(frame)), (receiver, ticker, activity)))
                    }
                    None => None,
                },
                _ = ticker.tick() => {
                    activity.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
                    Some((Ok(web::Bytes::from_static(b": heartbeat\n\n")), (receiver, ticker, activity)))
                }
            }
        },
    );
    let body = stream::once(async move { Ok::<web::Bytes, ActixError>(web::Bytes::from(initial)) })
        .chain(frames);

    Ok(HttpResponse::Ok()
        .insert_header(("Content-Type", "text/event-stream"))
        .insert_header(("Cache-Control", "no-cache"))
        .insert_header(("Connection", "keep-alive"))
        .insert_header(("Access-Control-Allow-Origin", "*"))
        .streaming(body))
}

fn origin_allowed(req: &HttpRequest, allowed: &[String]) -> bool {
    if allowed.iter().any(|origin| origin == "*") {
        return true;
    }
    match req.headers().get("Origin").and_then(|value| value.to_str().ok()) {
        Some(origin) => allowed.iter().any(|candidate| candidate == origin),
        // Non-browser clients send no Origin header; the allow-list only
        // constrains browsers.
        None => true,
    }
}

fn client_info(info: &ConnectionInfo) -> ClientInfo {
    let mut metadata = ahash::AHashMap::new();
    metadata.insert("real_ip".to_string(), info.real_ip.clone());
    if !info.user_agent.is_empty() {
        metadata.insert("user_agent".to_string(), info.user_agent.clone());
    }
    if let Some(region) = &info.region {
        metadata.insert("region".to_string(), region.clone());
    }
    ClientInfo {
        client_id: info.client_id.clone(),
        user_id: info.user_id.clone(),
        user_type: info.user_type.clone(),
        role: info.role.clone(),
        ticket_id: info.ticket_id.clone(),
        department: info.department.clone(),
        client_type: info.client_type,
        metadata,
    }
}

// Decodes inbound frames, refreshes liveness, and forwards messages into
// the hub; exits on socket error or close and unregisters the client.
fn spawn_reader(
    mut session: Session,
    mut msg_stream: MessageStream,
    client: Arc<Client>,
    hub: web::Data<Hub>,
) {
    actix_web::rt::spawn(async move {
        while let Some(Ok(frame)) = msg_stream.next().await {
            match frame {
                Message::Text(text) => {
                    client.touch();
                    match serde_json::from_str::<HubMessage>(&text) {
                        Ok(mut incoming) => {
                            incoming.from = client.user_id.clone();
                            if let Err(err) = hub.dispatch(incoming).await {
                                debug!("dispatch from {} failed: {}", client.client_id, err);
                            }
                        }
                        Err(err) => {
                            debug!("ignoring malformed frame from {}: {}", client.client_id, err);
                        }
                    }
                }
                Message::Ping(bytes) => {
                    client.touch();
                    if session.pong(&bytes).await.is_err() {
                        break;
                    }
                }
                Message::Pong(_) => client.touch(),
                Message::Close(reason) => {
                    debug!("client {} closed: {:?}", client.client_id, reason);
                    break;
                }
                _ => {}
            }
        }
        let _ = hub.unregister(&client.client_id).await;
        debug!("reader for {} finished", client.client_id);
    });
}

// Drains the client's send channel to the socket; exits when the channel
// closes or the hub signals the client closed, then closes the socket.
fn spawn_writer(
    mut session: Session,
    mut receiver: mpsc::Receiver<HubMessage>,
    client: Arc<Client>,
    hub: web::Data<Hub>,
) {
    actix_web::rt::spawn(async move {
        let mut closed = client.closed();
        loop {
            tokio::select! {
                maybe = receiver.recv() => match maybe {
                    Some(message) => match serde_json::to_string(&message) {
                        Ok(json) => {
                            if session.text(json).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => warn!("cannot encode frame for {}: {}", client.client_id, err),
                    },
                    None => break,
                },
                _ = closed.changed() => break,
            }
        }
        let _ = session.close(None).await;
        let _ = hub.unregister(&client.client_id).await;
        debug!("writer for {} finished", client.client_id);
    });
}
