//! WebSocket endpoint for the realtime relay.
//!
//! Flow per connection:
//! 1. Accept WS upgrade
//! 2. Wait for the handshake frame and verify its token
//! 3. Open a session; a writer task drains its outbound queue
//! 4. Event loop: each frame is dispatched to the relay in arrival order
//! 5. On close/error: drop the session guard, releasing all rooms, then
//!    give the writer a moment to flush what is already queued

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::header::ORIGIN;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::stream::SplitStream;
use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::AuthError;
use crate::protocol::{ConnectedPayload, ErrorPayload, Handshake, ServerEvent};
use crate::sessions::ConnectionId;
use crate::state::AppState;

/// Close code sent after a rejected handshake.
pub const CLOSE_AUTH_FAILED: u16 = 4001;

/// How long a closing connection may spend flushing queued events.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Axum handler for GET /ws — upgrades to WebSocket.
///
/// Browsers always send `Origin`; a foreign one is refused before the
/// upgrade. Non-browser clients that send none are let through to the
/// token handshake.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    if let Some(origin) = headers.get(ORIGIN) {
        let allowed = origin
            .to_str()
            .map(|o| state.config.origin_allowed(o))
            .unwrap_or(false);
        if !allowed {
            warn!(origin = ?origin, "realtime upgrade from foreign origin refused");
            return (StatusCode::FORBIDDEN, "Origin not allowed").into_response();
        }
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // ── Phase 1: handshake ──────────────────────────────────
    let email = match wait_for_handshake(&mut receiver, &state).await {
        Ok(email) => email,
        Err(e) => {
            warn!("realtime handshake rejected: {e}");
            let event = ServerEvent::ConnectError(ErrorPayload {
                message: format!("Authentication error: {e}"),
                error: None,
            });
            let _ = send_event(&mut sender, &event).await;
            let _ = sender
                .send(Message::Close(Some(CloseFrame {
                    code: CLOSE_AUTH_FAILED,
                    reason: "Authentication error".into(),
                })))
                .await;
            return;
        }
    };

    // ── Phase 2: session + writer ───────────────────────────
    let (tx, rx) = mpsc::unbounded_channel::<ServerEvent>();
    let session = state.sessions.open(email, tx);
    let conn = session.id();
    info!(conn = %conn, email = %session.email(), "realtime connected");

    let mut writer = tokio::spawn(write_events(sender, rx, conn));

    session.emit(ServerEvent::Connected(ConnectedPayload {
        id: conn,
        email: session.email().to_string(),
    }));

    // ── Phase 3: event loop ─────────────────────────────────
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let Err(e) = state.relay.dispatch(&session, text.as_str()).await {
                    warn!(conn = %conn, email = %session.email(), "event rejected: {e}");
                    session.emit(ServerEvent::from(&e));
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => { /* pings are auto-ponged, binary frames ignored */ }
            Err(e) => {
                warn!(conn = %conn, "ws recv error: {e}");
                break;
            }
        }
    }

    // ── Phase 4: cleanup ────────────────────────────────────
    // Dropping the guard releases every room and closes the queue, so the
    // writer ends once it has sent what was already queued.
    drop(session);
    if tokio::time::timeout(FLUSH_TIMEOUT, &mut writer).await.is_err() {
        debug!(conn = %conn, "writer did not flush in time");
        writer.abort();
    }
    info!(conn = %conn, "realtime disconnected");
}

/// Forward queued events to the socket until the queue closes or a send
/// fails.
async fn write_events<S>(
    mut sink: S,
    mut rx: mpsc::UnboundedReceiver<ServerEvent>,
    conn: ConnectionId,
) where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    while let Some(event) = rx.recv().await {
        if let Err(e) = send_event(&mut sink, &event).await {
            debug!(conn = %conn, "ws send error: {e}");
            break;
        }
    }
}

/// Wait for the first text frame and authenticate it. Timeouts and
/// early closes count as a missing token.
async fn wait_for_handshake(
    receiver: &mut SplitStream<WebSocket>,
    state: &Arc<AppState>,
) -> Result<String, AuthError> {
    let deadline = Instant::now() + Duration::from_secs(state.config.handshake_timeout_secs);

    let text = loop {
        match tokio::time::timeout_at(deadline, receiver.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => break text,
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
            _ => return Err(AuthError::MissingToken),
        }
    };

    let token = Handshake::token_from_frame(text.as_str()).ok_or(AuthError::MissingToken)?;
    let claims = state.tokens.verify(&token)?;
    claims
        .email
        .filter(|e| !e.is_empty())
        .ok_or(AuthError::InvalidToken)
}

async fn send_event<S>(sink: &mut S, event: &ServerEvent) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let json = serde_json::to_string(event).map_err(axum::Error::new)?;
    sink.send(Message::Text(json.into())).await
}
