//! Persistent WebSocket connection delivering the raw sample stream.
//!
//! The connection is owned by the ingestion task; nothing else holds a socket.

use async_tungstenite::tokio::{connect_async, ConnectStream};
use async_tungstenite::tungstenite::Message;
use async_tungstenite::WebSocketStream;
use futures::StreamExt;
use std::time::Duration;

use crate::config::ReconnectConfig;
use crate::error::PipelineError;

/// Open WebSocket carrying binary sample payloads.
pub struct StreamConnection {
    socket: WebSocketStream<ConnectStream>,
}

impl StreamConnection {
    /// Opens the WebSocket at `url`.
    ///
    /// # Errors
    /// - `Connection` if the handshake fails
    pub async fn connect(url: &str) -> Result<Self, PipelineError> {
        let (socket, response) = connect_async(url)
            .await
            .map_err(|e| PipelineError::Connection(format!("{url}: {e}")))?;

        tracing::info!("Connected to {} (HTTP {})", url, response.status());
        Ok(Self { socket })
    }

    /// Waits for the next binary payload.
    ///
    /// Text and control messages are skipped. Returns `None` once the peer closes
    /// the connection or the transport fails.
    pub async fn next_payload(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.socket.next().await? {
                Ok(Message::Binary(payload)) => return Some(payload),
                Ok(Message::Close(frame)) => {
                    tracing::info!("Stream closed by peer: {:?}", frame);
                    return None;
                }
                Ok(Message::Text(text)) => {
                    tracing::debug!("Ignoring text message ({} bytes)", text.len());
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Stream read failed: {}", e);
                    return None;
                }
            }
        }
    }

    /// Sends a close frame; errors are logged and ignored.
    pub async fn close(mut self) {
        if let Err(e) = self.socket.close(None).await {
            tracing::debug!("Close handshake failed: {}", e);
        }
    }
}

/// Exponential reconnect schedule.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next attempt, or `None` when reconnecting is disabled or exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.config.enabled {
            return None;
        }
        if self.config.max_attempts != 0 && self.attempt >= self.config.max_attempts {
            return None;
        }

        let factor = 1u64.checked_shl(self.attempt.min(32)).unwrap_or(u64::MAX);
        let delay_ms = self
            .config
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.config.max_delay_ms);
        self.attempt += 1;
        Some(Duration::from_millis(delay_ms))
    }

    /// Called once a connection has delivered data.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
