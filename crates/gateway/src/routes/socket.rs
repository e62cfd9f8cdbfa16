//! Live-session endpoint (`/socket.io/`).
//!
//! The connection id is the Engine.IO `sid` when the client has one, or a
//! fresh id for a WebSocket opened before the handshake. Either way it is
//! bound to the HTTP session so the handshake interceptor can find the
//! pending display name. The opening polling request has no `sid` and
//! carries no session messages, so it is not bound.

use axum::{
    body::Bytes,
    extract::{
        Query, Request, State,
        ws::{
            CloseFrame as ClientCloseFrame, Message as ClientMessage, WebSocket, WebSocketUpgrade,
            rejection::WebSocketUpgradeRejection,
        },
    },
    http::{Method, StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio_tungstenite::tungstenite::{
    self, Message as UpstreamMessage,
    client::IntoClientRequest,
    protocol::{CloseFrame as UpstreamCloseFrame, frame::coding::CloseCode},
};
use tower_sessions::Session;
use tracing::{debug, warn};

use padgate_core::ConnectionId;

use crate::error::AppError;
use crate::middleware::session::persisted_session_id;
use crate::routes::proxy::{read_body, request_headers, send_upstream, upstream_url};
use crate::state::AppState;
use crate::transport::{filter_payload, filter_text};

/// Engine.IO query parameters.
#[derive(Debug, Deserialize)]
pub struct EngineParams {
    /// Engine.IO session id, assigned by the editor on handshake.
    pub sid: Option<String>,
}

/// Handle a polling request or WebSocket upgrade on the live endpoint.
///
/// # Errors
///
/// Returns `AppError` if the session store fails, the body is too large or
/// the editor is unreachable.
pub async fn handle(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<EngineParams>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    request: Request,
) -> Result<Response, AppError> {
    let connection = match params.sid.filter(|sid| !sid.is_empty()) {
        Some(sid) => Some(ConnectionId::from(sid)),
        None if upgrade.is_ok() => Some(ConnectionId::generate()),
        None => None,
    };

    if let Some(connection) = &connection
        && let Some(session_id) = persisted_session_id(&session).await?
    {
        state.connections().bind(connection.clone(), session_id).await;
    }
    let connection = connection.unwrap_or_else(ConnectionId::generate);

    let (parts, body) = request.into_parts();

    if let Ok(upgrade) = upgrade {
        let upstream = upstream_request(&state, &parts)?;
        debug!(connection = %connection, "bridging websocket");
        return Ok(upgrade
            .on_upgrade(move |socket| bridge(state, connection, socket, upstream))
            .into_response());
    }

    let body = read_body(&parts.headers, body).await?;
    if parts.method != Method::POST || body.is_empty() {
        return send_upstream(&state, &parts, body).await;
    }

    // The editor decodes polling bodies lossily, so invalid UTF-8 is no
    // reason to skip the filter
    let payload = String::from_utf8_lossy(&body).into_owned();
    let filtered = filter_payload(state.message_hooks(), &connection, &payload).await;
    if filtered.is_empty() {
        // Every packet was suppressed; answer the way the editor would.
        return Ok((StatusCode::OK, "ok").into_response());
    }

    let body = if filtered == payload {
        body
    } else {
        Bytes::from(filtered)
    };
    send_upstream(&state, &parts, body).await
}

/// Build the upstream WebSocket handshake request.
fn upstream_request(
    state: &AppState,
    parts: &Parts,
) -> Result<tungstenite::handshake::client::Request, AppError> {
    let mut url = upstream_url(&state.config().upstream_url, &parts.uri);
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|()| AppError::Internal(format!("cannot derive websocket URL from {url}")))?;

    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| AppError::Internal(format!("invalid upstream websocket request: {e}")))?;

    let identity = parts.extensions.get::<padgate_core::SessionIdentity>();
    for (name, value) in &request_headers(&parts.headers, identity) {
        // The handshake headers are generated by tungstenite
        if name.as_str().starts_with("sec-websocket-") {
            continue;
        }
        request.headers_mut().append(name.clone(), value.clone());
    }
    Ok(request)
}

/// Relay frames between the client and the editor until either side closes.
///
/// Client text frames go through the message hooks; everything else, and
/// the whole editor-to-client direction, is relayed untouched.
async fn bridge(
    state: AppState,
    connection: ConnectionId,
    client: WebSocket,
    request: tungstenite::handshake::client::Request,
) {
    let upstream = match tokio_tungstenite::connect_async(request).await {
        Ok((upstream, _)) => upstream,
        Err(e) => {
            warn!(connection = %connection, error = %e, "upstream websocket connect failed");
            state.connections().release(&connection).await;
            return;
        }
    };

    let (mut client_tx, mut client_rx) = client.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let inbound = async {
        while let Some(Ok(message)) = client_rx.next().await {
            let forwarded = match message {
                ClientMessage::Text(text) => {
                    match filter_text(state.message_hooks(), &connection, text.as_str()).await {
                        Some(text) => UpstreamMessage::Text(text.into()),
                        None => continue,
                    }
                }
                ClientMessage::Binary(data) => UpstreamMessage::Binary(data),
                ClientMessage::Ping(data) => UpstreamMessage::Ping(data),
                ClientMessage::Pong(data) => UpstreamMessage::Pong(data),
                ClientMessage::Close(frame) => {
                    let _ = upstream_tx
                        .send(UpstreamMessage::Close(frame.map(to_upstream_close)))
                        .await;
                    break;
                }
            };
            if upstream_tx.send(forwarded).await.is_err() {
                break;
            }
        }
    };

    let outbound = async {
        while let Some(Ok(message)) = upstream_rx.next().await {
            let forwarded = match message {
                UpstreamMessage::Text(text) => ClientMessage::Text(text.as_str().to_owned().into()),
                UpstreamMessage::Binary(data) => ClientMessage::Binary(data),
                UpstreamMessage::Ping(data) => ClientMessage::Ping(data),
                UpstreamMessage::Pong(data) => ClientMessage::Pong(data),
                UpstreamMessage::Close(frame) => {
                    let _ = client_tx
                        .send(ClientMessage::Close(frame.map(to_client_close)))
                        .await;
                    break;
                }
                UpstreamMessage::Frame(_) => continue,
            };
            if client_tx.send(forwarded).await.is_err() {
                break;
            }
        }
    };

    tokio::select! {
        () = inbound => {},
        () = outbound => {},
    }

    state.connections().release(&connection).await;
    debug!(connection = %connection, "websocket bridge closed");
}

fn to_upstream_close(frame: ClientCloseFrame) -> UpstreamCloseFrame {
    UpstreamCloseFrame {
        code: CloseCode::from(frame.code),
        reason: frame.reason.as_str().to_owned().into(),
    }
}

fn to_client_close(frame: UpstreamCloseFrame) -> ClientCloseFrame {
    ClientCloseFrame {
        code: frame.code.into(),
        reason: frame.reason.as_str().to_owned().into(),
    }
}
