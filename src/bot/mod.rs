pub mod loopback;

use axum::extract::ws::WebSocket;
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

pub use loopback::LoopbackBot;

/// Identifiers for a media stream that completed the Twilio handshake.
#[derive(Debug, Clone)]
pub struct BotSession {
    pub stream_sid: String,
    pub call_sid: String,
    /// Process-wide testing flag (`--test` / `bot.testing`).
    pub testing: bool,
    /// Cancelled when the server shuts down.
    pub shutdown: CancellationToken,
}

/// Entry point that takes over a media stream after the handshake.
///
/// The relay owns nothing past this call: the bot reads the remaining
/// stream events, writes any outbound media, and returns when the call ends.
pub trait Bot: Send + Sync {
    fn run(
        &self,
        socket: WebSocket,
        session: BotSession,
    ) -> BoxFuture<'static, Result<(), BotError>>;
}

#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("WebSocket error: {0}")]
    Socket(#[from] axum::Error),
}
