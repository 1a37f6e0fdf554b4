//! Error types for the chat hub
//!
//! Defines application-level errors and outbound delivery errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// None of these cross an actor boundary: sessions log them and keep
/// serving, the transport handler logs them and tears the connection down.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal for the connection)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An actor's command channel is closed
    #[error("Channel send error")]
    ChannelSend,

    /// An actor dropped the reply channel without answering
    #[error("Channel receive error")]
    ChannelRecv,
}

impl From<tokio::sync::oneshot::error::RecvError> for AppError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        AppError::ChannelRecv
    }
}

/// Outbound delivery errors
///
/// Occurs when a frame cannot be queued for a client.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The client's outbound queue is full (slow consumer)
    #[error("Queue full")]
    QueueFull,
}
