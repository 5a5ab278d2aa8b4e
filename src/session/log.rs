use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Me,
    Partner,
}

/// One chat line. Never empty, never modified after it is logged.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    text: String,
    sender: Sender,
    at: DateTime<Utc>,
}

impl Message {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sender(&self) -> Sender {
        self.sender
    }

    /// Local time the message was logged.
    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }
}

/// Append-only record of the conversation in locally observed order.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    entries: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message; empty text is refused.
    pub fn append(&mut self, text: String, sender: Sender) -> Option<&Message> {
        if text.is_empty() {
            return None;
        }
        self.entries.push(Message {
            text,
            sender,
            at: Utc::now(),
        });
        self.entries.last()
    }

    pub fn entries(&self) -> &[Message] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_insertion_order_and_sender() {
        let mut log = MessageLog::new();
        log.append("hi".into(), Sender::Me);
        log.append("yo".into(), Sender::Partner);
        log.append("hi".into(), Sender::Me);

        let lines: Vec<_> = log
            .entries()
            .iter()
            .map(|m| (m.text(), m.sender()))
            .collect();
        assert_eq!(
            lines,
            vec![("hi", Sender::Me), ("yo", Sender::Partner), ("hi", Sender::Me)]
        );
    }

    #[test]
    fn refuses_empty_text() {
        let mut log = MessageLog::new();
        assert!(log.append(String::new(), Sender::Partner).is_none());
        assert!(log.is_empty());
    }
}
