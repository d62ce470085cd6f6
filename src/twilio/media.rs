use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;

use crate::bot::BotSession;
use crate::twilio::events::StreamEvent;
use crate::AppState;

/// WebSocket upgrade handler for GET /ws.
pub async fn handle_media_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_media_stream(socket, state))
}

/// Run the Twilio handshake, then hand the socket to the bot.
async fn handle_media_stream(mut socket: WebSocket, state: AppState) {
    let (stream_sid, call_sid) = match handshake(&mut socket).await {
        Ok(ids) => ids,
        Err(e) => {
            tracing::warn!("Media stream handshake failed: {e}");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    tracing::info!(
        call_sid = %call_sid,
        stream_sid = %stream_sid,
        "WebSocket connection accepted"
    );

    let session = BotSession {
        stream_sid,
        call_sid: call_sid.clone(),
        testing: state.config.bot.testing,
        shutdown: state.shutdown.child_token(),
    };

    if let Err(e) = state.bot.run(socket, session).await {
        tracing::error!(call_sid = %call_sid, "Bot exited with error: {e}");
    }
}

/// Read the `connected` frame and the `start` event; return `(stream_sid, call_sid)`.
async fn handshake(socket: &mut WebSocket) -> Result<(String, String), HandshakeError> {
    let connected = next_text(socket).await?;
    tracing::debug!(frame = %connected, "Stream handshake frame");

    let start = next_text(socket).await?;
    let payload: serde_json::Value = serde_json::from_str(&start)?;
    tracing::info!(payload = %payload, "Stream start");

    let event: StreamEvent = serde_json::from_value(payload)?;
    match event {
        StreamEvent::Start { start, .. } => {
            if let Some(format) = start.media_format.as_ref() {
                tracing::debug!(
                    encoding = ?format.encoding,
                    sample_rate = ?format.sample_rate,
                    channels = ?format.channels,
                    "Stream media format"
                );
            }
            Ok((start.stream_sid, start.call_sid))
        }
        other => Err(HandshakeError::UnexpectedEvent(other.name())),
    }
}

/// Next text frame, skipping control and binary frames.
async fn next_text(socket: &mut WebSocket) -> Result<String, HandshakeError> {
    loop {
        match socket.recv().await {
            Some(Ok(Message::Text(text))) => return Ok(text.to_string()),
            Some(Ok(Message::Close(_))) | None => return Err(HandshakeError::Closed),
            Some(Err(e)) => return Err(HandshakeError::Socket(e)),
            Some(Ok(_)) => continue,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum HandshakeError {
    #[error("connection closed before the start event")]
    Closed,
    #[error("WebSocket error: {0}")]
    Socket(#[from] axum::Error),
    #[error("invalid start event: {0}")]
    Invalid(#[from] serde_json::Error),
    #[error("expected start event, got {0}")]
    UnexpectedEvent(&'static str),
}
