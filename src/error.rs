use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("Failed to decode envelope: {0}")]
    Decode(#[from] DecodeError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Command exchange failed: {0}")]
    Command(#[from] CommandError),

    #[error("Internal channel closed")]
    ChannelClosed,

    #[error("Invalid URL")]
    UrlParseError(#[from] url::ParseError),
}

/// Connection-level failures of the subscription feed.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("WebSocket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Subscriber is disconnected; call reconnect()")]
    Disconnected,

    #[error("Subscriber was closed")]
    Closed,
}

/// A single malformed payload. Never terminates the subscription.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported frame type '{0}'")]
    UnsupportedFrame(String),
}

/// Outcome of a non-blocking receive that produced no envelope.
#[derive(Error, Debug)]
pub enum RecvError {
    #[error("No envelope available")]
    WouldBlock,

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Not connected to backend command socket")]
    NotConnected,

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("Command transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Malformed command payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Backend rejected command: {0}")]
    Rejected(String),
}
