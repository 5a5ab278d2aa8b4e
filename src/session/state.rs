use crate::session::log::Message;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a [`Session`](crate::session::Session).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Disconnected,
    AwaitingRegistration,
    Ready,
    Connecting,
    Connected,
    Error,
}

impl Status {
    /// Whether the only way forward is [`Session::recover`](crate::session::Session::recover).
    pub fn needs_recovery(self) -> bool {
        matches!(self, Status::Disconnected | Status::Error)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Disconnected => "disconnected",
            Status::AwaitingRegistration => "awaiting registration",
            Status::Ready => "ready",
            Status::Connecting => "connecting",
            Status::Connected => "connected",
            Status::Error => "in error",
        };
        f.write_str(s)
    }
}

/// Read-only view of a session handed to the presentation layer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub self_id: String,
    pub status: Status,
    pub partner_id: Option<String>,
    pub last_error: Option<String>,
    pub messages: Vec<Message>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            self_id: String::new(),
            status: Status::Disconnected,
            partner_id: None,
            last_error: None,
            messages: Vec::new(),
        }
    }
}

impl SessionSnapshot {
    /// Messages logged after the first `seen`.
    pub fn messages_since(&self, seen: usize) -> &[Message] {
        self.messages.get(seen..).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::log::{MessageLog, Sender};

    #[test]
    fn messages_since_returns_the_tail() {
        let mut log = MessageLog::new();
        for text in ["a", "b", "c"] {
            log.append(text.into(), Sender::Me);
        }
        let snapshot = SessionSnapshot {
            messages: log.entries().to_vec(),
            ..SessionSnapshot::default()
        };

        let tail: Vec<_> = snapshot.messages_since(1).iter().map(Message::text).collect();
        assert_eq!(tail, vec!["b", "c"]);
        assert!(snapshot.messages_since(3).is_empty());
        assert!(snapshot.messages_since(10).is_empty());
    }

    #[test]
    fn only_terminal_states_need_recovery() {
        assert!(Status::Disconnected.needs_recovery());
        assert!(Status::Error.needs_recovery());
        for status in [
            Status::AwaitingRegistration,
            Status::Ready,
            Status::Connecting,
            Status::Connected,
        ] {
            assert!(!status.needs_recovery(), "{status}");
        }
    }
}
