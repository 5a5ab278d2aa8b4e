//! The transport boundary: one peer-to-peer data channel as seen by the session.
//!
//! A handle reports its lifecycle through [`TransportEvent`]s delivered to the
//! [`TransportNotifier`] installed with [`TransportHandle::attach`]. Events the
//! underlying channel produces before a notifier is attached are kept by an
//! [`EventRelay`] and replayed on attach, so nothing (an early `Open` in
//! particular) is lost between creation and installation.

use crate::error::TransportError;
use crate::session::TransportNotifier;
use bytes::Bytes;
use std::sync::{Mutex, MutexGuard};

/// Raw data received on a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Binary(Bytes),
}

impl Payload {
    /// Chat text carried by this payload, if any.
    pub fn into_text(self) -> Option<String> {
        match self {
            Payload::Text(text) if !text.is_empty() => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Open,
    Data(Payload),
    Close,
    Error(String),
}

pub trait TransportHandle: Send {
    /// Identifier of the remote endpoint.
    fn remote_id(&self) -> &str;

    /// Installs the notifier that receives this handle's events.
    fn attach(&mut self, notifier: TransportNotifier);

    /// Queues `text` for transmission. Fire-and-forget: `Ok` only means the
    /// handle accepted the message.
    fn send(&self, text: &str) -> Result<(), TransportError>;

    /// Starts closing the channel. Further events from it are not expected to
    /// be delivered.
    fn close(&mut self);
}

#[derive(Default)]
struct RelayState {
    notifier: Option<TransportNotifier>,
    backlog: Vec<TransportEvent>,
    detached: bool,
}

/// Forwards transport events to the attached notifier, buffering until one is
/// attached.
#[derive(Default)]
pub struct EventRelay {
    state: Mutex<RelayState>,
}

impl EventRelay {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RelayState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn emit(&self, event: TransportEvent) {
        let mut state = self.lock();
        if state.detached {
            return;
        }
        match &state.notifier {
            Some(notifier) => notifier.notify(event),
            None => state.backlog.push(event),
        }
    }

    pub fn attach(&self, notifier: TransportNotifier) {
        let mut state = self.lock();
        if state.detached {
            return;
        }
        for event in state.backlog.drain(..) {
            notifier.notify(event);
        }
        state.notifier = Some(notifier);
    }

    /// Drops the notifier and any backlog; later events are discarded.
    pub fn detach(&self) {
        let mut state = self.lock();
        state.detached = true;
        state.notifier = None;
        state.backlog.clear();
    }
}
