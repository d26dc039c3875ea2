use thiserror::Error;

use crate::codec::FrameType;

/// Échec de décodage d'une trame entrante. Jamais fatal : la session le
/// trace et abandonne la trame.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty frame")]
    Empty,

    #[error("invalid frame length")]
    InvalidLength,

    #[error("truncated frame: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("unknown frame type {0}")]
    UnknownFrameType(u8),

    #[error("unexpected {0:?} frame")]
    UnexpectedFrame(FrameType),

    #[error("protobuf decode failed: {0}")]
    Protobuf(#[from] prost::DecodeError),

    #[error("payload frame without batch")]
    EmptyPayload,

    #[error("unknown message type {0}")]
    UnknownMessageType(i32),

    #[error("message type {0} without body")]
    MissingBody(i32),

    #[error("expected a single command, got {0}")]
    CommandCount(usize),
}

impl DecodeError {
    /// Types de message que ce renderer ne traite pas : à ignorer sans bruit.
    pub fn is_unknown_message(&self) -> bool {
        matches!(self, DecodeError::UnknownMessageType(_))
    }
}

/// Erreur de lien ; chacune déclenche une reconnexion avec backoff.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    #[error("connection timed out after {0} ms")]
    Timeout(u64),

    #[error("connection lost")]
    ConnectionLost,

    #[error("keepalive expired after {0} ms without traffic")]
    KeepaliveExpired(u64),

    #[error("server requested disconnect")]
    Disconnected,

    #[error("handshake failed: {0}")]
    Handshake(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for SessionError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SessionError::WebSocket(Box::new(err))
    }
}
