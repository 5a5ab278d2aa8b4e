use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::session::event::{SessionEvent, SignalingNotifier, TransportNotifier};
use crate::session::log::{Message, MessageLog, Sender};
use crate::session::state::{SessionSnapshot, Status};
use crate::signaling::{SignalingClient, SignalingEvent, SignalingFactory};
use crate::transport::{TransportEvent, TransportHandle};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

pub const CONNECTION_CLOSED: &str = "Connection closed";
pub const SIGNALING_LOST: &str = "Lost connection to the signaling server, restart required";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkPhase {
    /// Installed, channel not open yet.
    Pending,
    Open,
    /// Reported an error. Kept until it closes or the session restarts, but it
    /// can no longer make the session Connected.
    Faulted,
}

struct OwnedTransport {
    epoch: u64,
    phase: LinkPhase,
    handle: Box<dyn TransportHandle>,
}

struct ActiveSignaling {
    epoch: u64,
    client: Box<dyn SignalingClient>,
}

/// This endpoint's participation in signaling plus at most one connection.
///
/// All state changes happen through `&mut self` methods, one at a time: user
/// actions ([`connect`](Self::connect), [`send`](Self::send),
/// [`recover`](Self::recover)) and notifications
/// ([`handle_event`](Self::handle_event)). Every resource the session hands a
/// notifier to gets a fresh epoch; notifications carrying any other epoch are
/// ignored, which keeps late events from torn-down handles out of the state.
pub struct Session {
    config: SessionConfig,
    factory: Box<dyn SignalingFactory>,
    events: UnboundedSender<SessionEvent>,
    signaling: Option<ActiveSignaling>,
    peer: Option<OwnedTransport>,
    self_id: String,
    status: Status,
    partner_id: Option<String>,
    last_error: Option<String>,
    log: MessageLog,
    epoch: u64,
}

impl Session {
    /// Creates an idle session. Nothing happens until [`start`](Self::start).
    pub fn new(
        config: SessionConfig,
        factory: Box<dyn SignalingFactory>,
        events: UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            config,
            factory,
            events,
            signaling: None,
            peer: None,
            self_id: String::new(),
            status: Status::Disconnected,
            partner_id: None,
            last_error: None,
            log: MessageLog::new(),
            epoch: 0,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    pub fn partner_id(&self) -> Option<&str> {
        self.partner_id.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        self.log.entries()
    }

    pub fn has_transport(&self) -> bool {
        self.peer.is_some()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            self_id: self.self_id.clone(),
            status: self.status,
            partner_id: self.partner_id.clone(),
            last_error: self.last_error.clone(),
            messages: self.log.entries().to_vec(),
        }
    }

    fn next_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    /// Tears down whatever is active and registers with the signaling service
    /// from a clean state.
    pub fn start(&mut self) {
        self.teardown();
        let epoch = self.next_epoch();
        let notifier = SignalingNotifier::new(epoch, self.events.clone());
        let client = self.factory.register(&self.config, notifier);
        self.signaling = Some(ActiveSignaling { epoch, client });
        self.status = Status::AwaitingRegistration;
        info!(epoch, "registering with signaling server");
    }

    /// Restarts the whole session. The message log survives.
    pub fn recover(&mut self) {
        info!(from = %self.status, "manual recovery requested");
        self.start();
    }

    /// Releases every resource and leaves the session Disconnected.
    pub fn shutdown(&mut self) {
        self.teardown();
        self.status = Status::Disconnected;
        info!("session shut down");
    }

    fn teardown(&mut self) {
        self.release_transport();
        if let Some(mut signaling) = self.signaling.take() {
            debug!(epoch = signaling.epoch, "destroying signaling client");
            signaling.client.destroy();
        }
        self.self_id.clear();
        self.partner_id = None;
        self.last_error = None;
    }

    fn release_transport(&mut self) {
        if let Some(mut peer) = self.peer.take() {
            debug!(epoch = peer.epoch, remote = peer.handle.remote_id(), "releasing transport");
            peer.handle.close();
        }
    }

    fn install(&mut self, mut handle: Box<dyn TransportHandle>) {
        let epoch = self.next_epoch();
        handle.attach(TransportNotifier::new(epoch, self.events.clone()));
        info!(epoch, remote = handle.remote_id(), "connecting");
        self.peer = Some(OwnedTransport {
            epoch,
            phase: LinkPhase::Pending,
            handle,
        });
        self.status = Status::Connecting;
        self.last_error = None;
    }

    /// Starts an outbound connection to `peer_id`.
    ///
    /// A no-op while a transport is already owned.
    pub fn connect(&mut self, peer_id: &str) -> Result<(), SessionError> {
        let peer_id = peer_id.trim();
        if peer_id.is_empty() {
            return Err(SessionError::EmptyTarget);
        }
        if let Some(peer) = &self.peer {
            debug!(
                peer_id,
                current = peer.handle.remote_id(),
                "connect ignored, a connection is already in progress"
            );
            return Ok(());
        }
        if self.status != Status::Ready {
            warn!(peer_id, status = %self.status, "connect rejected");
            return Err(SessionError::NotReady(self.status));
        }
        let Some(signaling) = self.signaling.as_mut() else {
            return Err(SessionError::NotReady(self.status));
        };
        match signaling.client.connect_to(peer_id) {
            Ok(handle) => {
                self.install(handle);
                Ok(())
            }
            Err(e) => {
                warn!(peer_id, error = %e, "connection attempt failed");
                self.status = Status::Error;
                self.last_error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Sends `text` to the partner and logs it once the transport took it.
    pub fn send(&mut self, text: &str) -> Result<(), SessionError> {
        if self.status != Status::Connected {
            return Err(SessionError::NotConnected(self.status));
        }
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        let Some(peer) = self.peer.as_ref() else {
            return Err(SessionError::NotConnected(self.status));
        };
        if let Err(e) = peer.handle.send(text) {
            warn!(error = %e, "send failed");
            self.last_error = Some(e.to_string());
            return Err(e.into());
        }
        self.log.append(text.to_string(), Sender::Me);
        Ok(())
    }

    /// Single dispatch point for every notification.
    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Signaling { epoch, event } => self.on_signaling(epoch, event),
            SessionEvent::Transport { epoch, event } => self.on_transport(epoch, event),
        }
    }

    fn on_signaling(&mut self, epoch: u64, event: SignalingEvent) {
        if self.signaling.as_ref().map(|s| s.epoch) != Some(epoch) {
            debug!(epoch, ?event, "ignoring event from a stale signaling client");
            if let SignalingEvent::Incoming(mut handle) = event {
                handle.close();
            }
            return;
        }

        match event {
            SignalingEvent::Ready(id) => {
                if !self.self_id.is_empty() {
                    warn!(current = %self.self_id, offered = %id, "already registered, ignoring new id");
                    return;
                }
                if self.status != Status::AwaitingRegistration {
                    debug!(status = %self.status, "late registration ignored");
                    return;
                }
                info!(self_id = %id, "registered");
                self.self_id = id;
                self.status = Status::Ready;
                self.last_error = None;
            }
            SignalingEvent::Incoming(handle) => self.on_incoming(handle),
            SignalingEvent::Error(reason) => self.on_signaling_error(reason),
            SignalingEvent::Disconnected => {
                warn!(status = %self.status, "signaling server connection lapsed");
                self.release_transport();
                self.partner_id = None;
                self.status = Status::Disconnected;
                self.last_error = Some(SIGNALING_LOST.to_string());
            }
        }
    }

    fn on_incoming(&mut self, mut handle: Box<dyn TransportHandle>) {
        let acceptable = self.peer.is_none()
            && !self.self_id.is_empty()
            && matches!(self.status, Status::Ready | Status::Error);
        if !acceptable {
            warn!(
                remote = handle.remote_id(),
                status = %self.status,
                busy = self.peer.is_some(),
                "rejecting incoming connection"
            );
            handle.close();
            return;
        }
        info!(remote = handle.remote_id(), "incoming connection");
        self.install(handle);
    }

    fn on_signaling_error(&mut self, reason: String) {
        match (self.status, self.peer.as_mut()) {
            // The link itself is fine; only the rendezvous side complained.
            (Status::Connected, _) => {
                warn!(%reason, "signaling error while connected");
                self.last_error = Some(reason);
            }
            (_, Some(peer)) if peer.phase == LinkPhase::Pending => {
                warn!(%reason, remote = peer.handle.remote_id(), "connection attempt failed");
                peer.phase = LinkPhase::Faulted;
                self.status = Status::Error;
                self.last_error = Some(reason);
            }
            _ => {
                warn!(%reason, status = %self.status, "signaling error");
                self.status = Status::Error;
                self.last_error = Some(reason);
            }
        }
    }

    fn on_transport(&mut self, epoch: u64, event: TransportEvent) {
        let Some(peer) = self.peer.as_mut().filter(|p| p.epoch == epoch) else {
            debug!(epoch, ?event, "ignoring event from a released transport");
            return;
        };

        match event {
            TransportEvent::Open => match peer.phase {
                LinkPhase::Pending => {
                    peer.phase = LinkPhase::Open;
                    let partner = peer.handle.remote_id().to_string();
                    info!(partner = %partner, "connected");
                    self.partner_id = Some(partner);
                    self.status = Status::Connected;
                    self.last_error = None;
                }
                phase => debug!(?phase, "duplicate open ignored"),
            },
            TransportEvent::Data(payload) => match payload.into_text() {
                Some(text) => {
                    self.log.append(text, Sender::Partner);
                }
                None => debug!("discarding non-text payload"),
            },
            TransportEvent::Close => {
                info!(remote = peer.handle.remote_id(), "connection closed");
                self.release_transport();
                self.partner_id = None;
                self.status = Status::Disconnected;
                self.last_error = Some(CONNECTION_CLOSED.to_string());
            }
            TransportEvent::Error(reason) => {
                warn!(%reason, remote = peer.handle.remote_id(), "transport error");
                peer.phase = LinkPhase::Faulted;
                self.status = Status::Error;
                self.last_error = Some(reason);
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}
