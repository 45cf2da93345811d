//! WebSocket adapter for streaming sessions.

use super::{AppState, bearer_token};
use crate::error::{LivescribeError, Result};
use crate::session::{Frame, Handshake, ServerMessage, Transport, run_session};
use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{ConnectInfo, Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};

/// Longest close reason a control frame can carry.
const MAX_CLOSE_REASON_BYTES: usize = 123;

#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    pub token: Option<String>,
}

/// Source address for admission control.
///
/// With `trust_forwarded_for`, the first parseable `X-Forwarded-For` entry wins.
pub fn source_address(headers: &HeaderMap, peer: SocketAddr, trust_forwarded_for: bool) -> IpAddr {
    if trust_forwarded_for
        && let Some(ip) = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|first| first.trim().parse().ok())
    {
        return ip;
    }
    peer.ip()
}

/// WebSocket upgrade handler for `/ws`.
pub async fn stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let handshake = Handshake {
        address: source_address(&headers, peer, state.trust_forwarded_for),
        token: query
            .token
            .or_else(|| bearer_token(&headers).map(str::to_string)),
    };
    // Oversized frames must reach the session so it can close with 1009
    let limit = state.session.settings.max_frame_bytes.saturating_mul(2);
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| async move {
            let mut transport = WsTransport::new(socket);
            let outcome = run_session(&mut transport, &state.session, handshake).await;
            tracing::debug!(?outcome, "WebSocket session finished");
        })
}

/// [`Transport`] over an axum WebSocket.
pub struct WsTransport {
    socket: WebSocket,
}

impl WsTransport {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

fn truncate_reason(reason: &str) -> &str {
    if reason.len() <= MAX_CLOSE_REASON_BYTES {
        return reason;
    }
    let mut end = MAX_CLOSE_REASON_BYTES;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}

#[async_trait]
impl Transport for WsTransport {
    async fn recv(&mut self) -> Option<Result<Frame>> {
        loop {
            let message = match self.socket.recv().await? {
                Ok(message) => message,
                Err(e) => {
                    return Some(Err(LivescribeError::Protocol {
                        message: format!("WebSocket receive failed: {e}"),
                    }));
                }
            };
            match message {
                Message::Binary(bytes) => return Some(Ok(Frame::Binary(bytes.to_vec()))),
                Message::Text(text) => return Some(Ok(Frame::Text(text.as_str().to_owned()))),
                Message::Close(_) => return None,
                Message::Ping(_) | Message::Pong(_) => continue,
            }
        }
    }

    async fn send(&mut self, message: &ServerMessage) -> Result<()> {
        let json = message
            .to_json()
            .map_err(|e| LivescribeError::Other(format!("Failed to encode message: {e}")))?;
        self.socket
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| LivescribeError::Other(format!("WebSocket send failed: {e}")))
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        let frame = CloseFrame {
            code,
            reason: truncate_reason(reason).to_owned().into(),
        };
        self.socket
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| LivescribeError::Other(format!("WebSocket close failed: {e}")))
    }
}
