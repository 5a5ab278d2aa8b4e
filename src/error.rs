//! Error types for the chat session and its collaborators.
//!
//! Every failure here is terminal to the current attempt only. The session
//! itself stays usable and can always be restarted with
//! [`Session::recover`](crate::session::Session::recover).

use crate::session::Status;
use thiserror::Error;

/// Rejections of user actions on the session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// `connect` was called with an empty (or whitespace-only) peer id.
    #[error("target peer id is empty")]
    EmptyTarget,

    /// `connect` requires a registered, idle session.
    #[error("cannot connect while {0}")]
    NotReady(Status),

    /// `send` requires an open connection.
    #[error("cannot send while {0}")]
    NotConnected(Status),

    /// Chat messages must contain text.
    #[error("message is empty")]
    EmptyMessage,

    /// The signaling client could not start a connection attempt.
    #[error("signaling: {0}")]
    Signaling(#[from] SignalingError),

    /// The transport refused the message synchronously.
    #[error("send failed: {0}")]
    SendFailed(#[from] TransportError),

    /// The session task is gone.
    #[error("session has shut down")]
    Closed,
}

/// Failures reported by a signaling client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignalingError {
    /// No registration is active, so no connection can be brokered.
    #[error("not registered with the signaling server")]
    NotRegistered,

    /// The client was destroyed.
    #[error("signaling client destroyed")]
    Destroyed,

    /// The rendezvous server could not be reached or rejected us.
    #[error("signaling server unreachable at {url}: {reason}")]
    Unreachable { url: String, reason: String },

    /// Our identifier is already in use on the server.
    #[error("peer id {0} is already taken")]
    IdTaken(String),

    /// The server reported an error.
    #[error("signaling server error: {0}")]
    Server(String),

    /// A frame from the server could not be understood.
    #[error("malformed signaling message: {0}")]
    Protocol(String),
}

/// Failures of a single transport handle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The data channel is not open yet (or any more).
    #[error("data channel is not open")]
    ChannelNotOpen,

    /// The handle has been closed locally.
    #[error("transport closed")]
    Closed,

    /// The underlying WebRTC stack failed.
    #[error("webrtc: {0}")]
    Rtc(String),
}

impl From<webrtc::Error> for TransportError {
    fn from(e: webrtc::Error) -> Self {
        TransportError::Rtc(e.to_string())
    }
}

/// Invalid session configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("signaling url cannot be empty")]
    EmptySignalingUrl,

    #[error("ICE server {0} has an empty url")]
    EmptyServerUrl(String),

    #[error("TURN server {0} requires username and credential")]
    MissingTurnCredentials(String),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failures decoding an encoded session description.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("decompression failed: {0}")]
    Decompress(#[from] std::io::Error),

    #[error("decoded payload exceeds {0} bytes")]
    TooLarge(u64),

    #[error("invalid payload json: {0}")]
    Json(#[from] serde_json::Error),
}
