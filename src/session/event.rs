use crate::signaling::SignalingEvent;
use crate::transport::TransportEvent;
use tokio::sync::mpsc::UnboundedSender;

/// A notification for the session, tagged with the epoch of the resource that
/// produced it. Events whose epoch no longer matches are dropped.
#[derive(Debug)]
pub enum SessionEvent {
    Signaling { epoch: u64, event: SignalingEvent },
    Transport { epoch: u64, event: TransportEvent },
}

/// Delivers events of one signaling client to the session.
#[derive(Debug, Clone)]
pub struct SignalingNotifier {
    epoch: u64,
    tx: UnboundedSender<SessionEvent>,
}

impl SignalingNotifier {
    pub fn new(epoch: u64, tx: UnboundedSender<SessionEvent>) -> Self {
        Self { epoch, tx }
    }

    pub fn notify(&self, event: SignalingEvent) {
        // A closed channel means the session is gone; nothing to deliver to.
        let _ = self.tx.send(SessionEvent::Signaling {
            epoch: self.epoch,
            event,
        });
    }
}

/// Delivers events of one transport handle to the session.
#[derive(Debug, Clone)]
pub struct TransportNotifier {
    epoch: u64,
    tx: UnboundedSender<SessionEvent>,
}

impl TransportNotifier {
    pub fn new(epoch: u64, tx: UnboundedSender<SessionEvent>) -> Self {
        Self { epoch, tx }
    }

    pub fn notify(&self, event: TransportEvent) {
        let _ = self.tx.send(SessionEvent::Transport {
            epoch: self.epoch,
            event,
        });
    }
}
