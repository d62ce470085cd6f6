use axum::extract::ws::{Message, WebSocket};
use base64::Engine;
use futures_util::future::BoxFuture;
use serde_json::{json, Value};

use super::{Bot, BotError, BotSession};
use crate::twilio::events::StreamEvent;

/// Built-in bot used when no external runtime is wired in.
///
/// Always tracks the stream. In testing mode it also plays caller audio
/// straight back and acknowledges keypad digits with a named mark, which
/// is enough to verify a phone number end to end without any AI services.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoopbackBot;

impl Bot for LoopbackBot {
    fn run(
        &self,
        socket: WebSocket,
        session: BotSession,
    ) -> BoxFuture<'static, Result<(), BotError>> {
        Box::pin(run_loopback(socket, session))
    }
}

#[derive(Debug, Default, PartialEq)]
struct CallStats {
    media_frames: u64,
    audio_bytes: usize,
    marks: u64,
    digits: String,
}

#[derive(Debug, PartialEq)]
enum Flow {
    /// Keep reading; send these events back to Twilio first.
    Continue(Vec<Value>),
    Stop,
}

async fn run_loopback(mut socket: WebSocket, session: BotSession) -> Result<(), BotError> {
    let BotSession {
        stream_sid,
        call_sid,
        testing,
        shutdown,
    } = session;
    tracing::info!(call_sid = %call_sid, stream_sid = %stream_sid, testing, "Loopback bot started");

    let mut stats = CallStats::default();

    let outcome: Result<(), BotError> = loop {
        let ws_msg = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!(call_sid = %call_sid, "Shutting down, closing media stream");
                let _ = socket.send(Message::Close(None)).await;
                break Ok(());
            }
            ws_msg = socket.recv() => ws_msg,
        };

        let text = match ws_msg {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => {
                tracing::info!(call_sid = %call_sid, "Media stream closed");
                break Ok(());
            }
            Some(Err(e)) => {
                tracing::error!(call_sid = %call_sid, "WebSocket error: {e}");
                break Err(e.into());
            }
            _ => continue,
        };

        let event: StreamEvent = match serde_json::from_str(&text) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("Failed to parse stream event: {e}");
                continue;
            }
        };

        match handle_event(event, &stream_sid, testing, &mut stats) {
            Flow::Continue(replies) => {
                let mut sent = Ok(());
                for reply in replies {
                    if let Err(e) = socket.send(Message::Text(reply.to_string().into())).await {
                        tracing::error!(call_sid = %call_sid, "Failed to send to Twilio: {e}");
                        sent = Err(e);
                        break;
                    }
                }
                if let Err(e) = sent {
                    break Err(e.into());
                }
            }
            Flow::Stop => {
                tracing::info!(call_sid = %call_sid, "Stream stopped");
                break Ok(());
            }
        }
    };

    tracing::info!(
        call_sid = %call_sid,
        media_frames = stats.media_frames,
        audio_bytes = stats.audio_bytes,
        marks = stats.marks,
        digits = %stats.digits,
        "Call finished"
    );
    outcome
}

fn handle_event(
    event: StreamEvent,
    stream_sid: &str,
    testing: bool,
    stats: &mut CallStats,
) -> Flow {
    match event {
        StreamEvent::Media { media, .. } => {
            let audio = match base64::engine::general_purpose::STANDARD.decode(&media.payload) {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!("Failed to decode base64 audio: {e}");
                    return Flow::Continue(Vec::new());
                }
            };
            stats.media_frames += 1;
            stats.audio_bytes += audio.len();

            if !testing || audio.is_empty() {
                return Flow::Continue(Vec::new());
            }
            Flow::Continue(vec![json!({
                "event": "media",
                "streamSid": stream_sid,
                "media": {
                    "payload": base64::engine::general_purpose::STANDARD.encode(&audio)
                }
            })])
        }
        StreamEvent::Dtmf { dtmf, .. } => {
            tracing::info!(digit = %dtmf.digit, "DTMF received");
            stats.digits.push_str(&dtmf.digit);

            if !testing {
                return Flow::Continue(Vec::new());
            }
            Flow::Continue(vec![json!({
                "event": "mark",
                "streamSid": stream_sid,
                "mark": { "name": format!("dtmf-{}", dtmf.digit) }
            })])
        }
        StreamEvent::Mark { mark, .. } => {
            tracing::debug!(name = %mark.name, "Mark played");
            stats.marks += 1;
            Flow::Continue(Vec::new())
        }
        StreamEvent::Stop { .. } => Flow::Stop,
        other => {
            tracing::debug!(event = other.name(), "Ignoring event after handshake");
            Flow::Continue(Vec::new())
        }
    }
}
