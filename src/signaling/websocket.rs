//! Signaling over a PeerJS-style rendezvous server.
//!
//! One websocket per registration. Offers, answers and candidates are routed
//! to the [`RtcTransport`] that owns the matching connection id.

use crate::config::SessionConfig;
use crate::error::SignalingError;
use crate::peer::codec;
use crate::peer::lock;
use crate::peer::transport::{LinkSignals, RemoteSignal, Role, RtcTransport};
use crate::peer::types::SdpPayload;
use crate::session::SignalingNotifier;
use crate::signaling::protocol::{registration_url, ClientMessage, ServerMessage};
use crate::signaling::{SignalingClient, SignalingEvent, SignalingFactory};
use crate::transport::TransportHandle;
use crate::utils::random_id;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Registers with the rendezvous server named in [`SessionConfig::signaling`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RendezvousFactory;

impl SignalingFactory for RendezvousFactory {
    fn register(
        &self,
        config: &SessionConfig,
        notifier: SignalingNotifier,
    ) -> Box<dyn SignalingClient> {
        let config = Arc::new(config.clone());
        let shared = Arc::new(Shared::default());
        let (outbox, queue) = mpsc::unbounded_channel();

        let link = Rendezvous {
            config: config.clone(),
            id: random_id(),
            notifier,
            shared: shared.clone(),
            outbox: outbox.clone(),
        };
        let task = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => Some(runtime.spawn(link.run(random_id(), queue))),
            Err(_) => {
                link.notifier
                    .notify(SignalingEvent::Error("no async runtime to register on".into()));
                None
            }
        };

        Box::new(RendezvousClient {
            config,
            shared,
            outbox,
            task,
        })
    }
}

#[derive(Debug)]
struct Route {
    remote_id: String,
    tx: mpsc::UnboundedSender<RemoteSignal>,
}

#[derive(Debug, Default)]
struct Shared {
    /// Live connections by connection id.
    routes: Mutex<HashMap<String, Route>>,
    registered: AtomicBool,
    /// The server already told us why it refused the registration.
    refused: AtomicBool,
    destroyed: AtomicBool,
}

impl Shared {
    fn add_route(&self, connection_id: &str, remote_id: &str) -> mpsc::UnboundedReceiver<RemoteSignal> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut routes = lock(&self.routes);
        routes.retain(|_, route| !route.tx.is_closed());
        routes.insert(
            connection_id.to_string(),
            Route {
                remote_id: remote_id.to_string(),
                tx,
            },
        );
        rx
    }

    /// Delivers `signal` to one connection, forgetting it if its transport is gone.
    fn route(&self, connection_id: &str, signal: RemoteSignal) {
        let mut routes = lock(&self.routes);
        let Some(route) = routes.get(connection_id) else {
            debug!(connection = connection_id, "signal for unknown connection dropped");
            return;
        };
        if route.tx.send(signal).is_err() {
            routes.remove(connection_id);
        }
    }

    /// Delivers a signal to every connection with `remote_id`.
    fn route_remote(&self, remote_id: &str, signal: impl Fn() -> RemoteSignal) {
        lock(&self.routes)
            .retain(|_, route| route.remote_id != remote_id || route.tx.send(signal()).is_ok());
    }
}

pub struct RendezvousClient {
    config: Arc<SessionConfig>,
    shared: Arc<Shared>,
    outbox: mpsc::UnboundedSender<ClientMessage>,
    task: Option<JoinHandle<()>>,
}

impl SignalingClient for RendezvousClient {
    fn connect_to(&mut self, target: &str) -> Result<Box<dyn TransportHandle>, SignalingError> {
        if self.shared.destroyed.load(Ordering::Acquire) {
            return Err(SignalingError::Destroyed);
        }
        if !self.shared.registered.load(Ordering::Acquire) {
            return Err(SignalingError::NotRegistered);
        }

        let connection_id = format!("dc_{}", random_id());
        let signals = self.shared.add_route(&connection_id, target);
        info!(remote = target, connection = %connection_id, "connecting to peer");
        let link = LinkSignals {
            remote_id: target.to_string(),
            connection_id,
            label: self.config.channel_label.clone(),
            outbox: self.outbox.clone(),
        };
        Ok(Box::new(RtcTransport::spawn(
            self.config.clone(),
            link,
            Role::Offerer,
            signals,
        )))
    }

    fn destroy(&mut self) {
        if self.shared.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.registered.store(false, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        lock(&self.shared.routes).clear();
        debug!("signaling client destroyed");
    }
}

impl Drop for RendezvousClient {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// The websocket side of one registration.
struct Rendezvous {
    config: Arc<SessionConfig>,
    id: String,
    notifier: SignalingNotifier,
    shared: Arc<Shared>,
    outbox: mpsc::UnboundedSender<ClientMessage>,
}

impl Rendezvous {
    async fn run(self, token: String, mut queue: mpsc::UnboundedReceiver<ClientMessage>) {
        let url = registration_url(&self.config.signaling, &self.id, &token);
        info!(id = %self.id, server = %self.config.signaling.url, "registering with signaling server");

        let (socket, _) = match connect_async(url.as_str()).await {
            Ok(socket) => socket,
            Err(e) => {
                let err = SignalingError::Unreachable {
                    url: self.config.signaling.url.clone(),
                    reason: e.to_string(),
                };
                warn!(error = %err, "registration failed");
                self.notifier.notify(SignalingEvent::Error(err.to_string()));
                return;
            }
        };
        let (mut sink, mut stream) = socket.split();
        let mut heartbeat = tokio::time::interval(self.config.signaling.heartbeat_interval());
        heartbeat.tick().await;

        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_frame(text.as_str()),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "signaling socket failed");
                        break;
                    }
                },
                Some(frame) = queue.recv() => {
                    let text = match serde_json::to_string(&frame) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "could not encode signaling frame");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        warn!(error = %e, "signaling write failed");
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    let Ok(text) = serde_json::to_string(&ClientMessage::Heartbeat) else {
                        continue;
                    };
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
            }
        }

        lock(&self.shared.routes).clear();
        if self.shared.registered.swap(false, Ordering::AcqRel) {
            info!(id = %self.id, "signaling connection lost");
            self.notifier.notify(SignalingEvent::Disconnected);
        } else if self.shared.refused.load(Ordering::Acquire) {
            debug!(id = %self.id, "server closed the connection after refusing registration");
        } else {
            self.notifier.notify(SignalingEvent::Error(
                "signaling server closed the connection before registration".into(),
            ));
        }
    }

    fn refuse(&self, err: SignalingError) {
        if !self.shared.registered.load(Ordering::Acquire) {
            self.shared.refused.store(true, Ordering::Release);
        }
        warn!(error = %err, "signaling server reported an error");
        self.notifier.notify(SignalingEvent::Error(err.to_string()));
    }

    fn handle_frame(&self, text: &str) {
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(frame) => self.handle(frame),
            Err(e) => debug!(error = %e, "dropping unrecognized signaling frame"),
        }
    }

    fn handle(&self, frame: ServerMessage) {
        match frame {
            ServerMessage::Open => {
                self.shared.registered.store(true, Ordering::Release);
                info!(id = %self.id, "registered with signaling server");
                self.notifier.notify(SignalingEvent::Ready(self.id.clone()));
            }
            ServerMessage::IdTaken => self.refuse(SignalingError::IdTaken(self.id.clone())),
            ServerMessage::Error { payload } => self.refuse(SignalingError::Server(payload.msg)),
            ServerMessage::Offer { src, payload } => {
                let offer: SdpPayload = match codec::decode(&payload.sdp) {
                    Ok(offer) => offer,
                    Err(e) => {
                        warn!(remote = %src, error = %e, "undecodable offer dropped");
                        return;
                    }
                };
                info!(remote = %src, connection = %payload.connection_id, "incoming connection");
                let signals = self.shared.add_route(&payload.connection_id, &src);
                let link = LinkSignals {
                    remote_id: src,
                    connection_id: payload.connection_id,
                    label: payload.label,
                    outbox: self.outbox.clone(),
                };
                let transport =
                    RtcTransport::spawn(self.config.clone(), link, Role::Answerer(offer), signals);
                self.notifier
                    .notify(SignalingEvent::Incoming(Box::new(transport)));
            }
            ServerMessage::Answer { src, payload } => match codec::decode::<SdpPayload>(&payload.sdp) {
                Ok(answer) => self
                    .shared
                    .route(&payload.connection_id, RemoteSignal::Answer(answer)),
                Err(e) => warn!(remote = %src, error = %e, "undecodable answer dropped"),
            },
            ServerMessage::Candidate { payload, .. } => self
                .shared
                .route(&payload.connection_id, RemoteSignal::Candidate(payload.candidate)),
            ServerMessage::Leave { src } => self.shared.route_remote(&src, || RemoteSignal::Left),
            ServerMessage::Expire { src } => {
                let reason = format!("could not connect to peer {src}");
                self.shared
                    .route_remote(&src, || RemoteSignal::Gone(reason.clone()));
            }
            ServerMessage::Heartbeat => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::types::IceCandidate;
    use crate::session::SessionEvent;
    use crate::signaling::protocol::{CandidateSignal, ErrorPayload};

    fn rendezvous() -> (
        Rendezvous,
        mpsc::UnboundedReceiver<SessionEvent>,
        mpsc::UnboundedReceiver<ClientMessage>,
    ) {
        let (tx, events) = mpsc::unbounded_channel();
        let (outbox, queue) = mpsc::unbounded_channel();
        let link = Rendezvous {
            config: Arc::new(SessionConfig::default()),
            id: "a1".into(),
            notifier: SignalingNotifier::new(3, tx),
            shared: Arc::new(Shared::default()),
            outbox,
        };
        (link, events, queue)
    }

    fn next_signal(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SignalingEvent {
        match events.try_recv() {
            Ok(SessionEvent::Signaling { epoch, event }) => {
                assert_eq!(epoch, 3);
                event
            }
            other => panic!("expected a signaling event, got {other:?}"),
        }
    }

    #[test]
    fn open_marks_registration_ready() {
        let (link, mut events, _queue) = rendezvous();
        link.handle(ServerMessage::Open);
        assert!(link.shared.registered.load(Ordering::Acquire));
        assert!(matches!(next_signal(&mut events), SignalingEvent::Ready(id) if id == "a1"));
    }

    #[test]
    fn server_errors_are_reported() {
        let (link, mut events, _queue) = rendezvous();
        link.handle(ServerMessage::IdTaken);
        assert!(matches!(
            next_signal(&mut events),
            SignalingEvent::Error(reason) if reason.contains("already taken")
        ));

        link.handle(ServerMessage::Error {
            payload: ErrorPayload {
                msg: "Invalid key provided".into(),
            },
        });
        assert!(matches!(
            next_signal(&mut events),
            SignalingEvent::Error(reason) if reason.contains("Invalid key provided")
        ));
    }

    #[test]
    fn candidates_reach_their_connection_only() {
        let (link, _events, _queue) = rendezvous();
        let mut first = link.shared.add_route("dc_1", "b2");
        let mut second = link.shared.add_route("dc_2", "c3");

        link.handle(ServerMessage::Candidate {
            src: "b2".into(),
            payload: CandidateSignal {
                connection_id: "dc_1".into(),
                candidate: IceCandidate {
                    candidate: "candidate:1 1 udp 2130706431 10.0.0.2 50000 typ host".into(),
                    sdp_mid: Some("0".into()),
                    sdp_mline_index: Some(0),
                    connection_id: "dc_1".into(),
                },
            },
        });

        assert!(matches!(first.try_recv(), Ok(RemoteSignal::Candidate(_))));
        assert!(second.try_recv().is_err());
    }

    #[test]
    fn leave_and_expire_address_every_link_to_the_peer() {
        let (link, _events, _queue) = rendezvous();
        let mut first = link.shared.add_route("dc_1", "b2");
        let mut other = link.shared.add_route("dc_2", "c3");

        link.handle(ServerMessage::Leave { src: "b2".into() });
        assert!(matches!(first.try_recv(), Ok(RemoteSignal::Left)));
        assert!(other.try_recv().is_err());

        link.handle(ServerMessage::Expire { src: "c3".into() });
        assert!(matches!(
            other.try_recv(),
            Ok(RemoteSignal::Gone(reason)) if reason == "could not connect to peer c3"
        ));
    }

    #[test]
    fn routes_of_dropped_transports_are_forgotten() {
        let (link, _events, _queue) = rendezvous();
        drop(link.shared.add_route("dc_1", "b2"));
        link.handle(ServerMessage::Leave { src: "b2".into() });
        assert!(lock(&link.shared.routes).is_empty());
    }

    #[test]
    fn malformed_frames_are_ignored() {
        let (link, mut events, _queue) = rendezvous();
        link.handle_frame(r#"{"type":"GOSSIP"}"#);
        link.handle_frame("not json");
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn connect_before_registration_is_refused() {
        let (tx, _events) = mpsc::unbounded_channel();
        let mut config = SessionConfig::default();
        config.signaling.url = "ws://127.0.0.1:1/peerjs".into();
        let mut client = RendezvousFactory.register(&config, SignalingNotifier::new(1, tx));

        assert!(matches!(
            client.connect_to("b2"),
            Err(SignalingError::NotRegistered)
        ));
        client.destroy();
        assert!(matches!(client.connect_to("b2"), Err(SignalingError::Destroyed)));
    }

    #[tokio::test]
    async fn unreachable_server_reports_an_error() {
        let (tx, mut events) = mpsc::unbounded_channel();
        let mut config = SessionConfig::default();
        config.signaling.url = "ws://127.0.0.1:1/peerjs".into();
        let _client = RendezvousFactory.register(&config, SignalingNotifier::new(1, tx));

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), events.recv())
            .await
            .expect("registration outcome")
            .expect("event channel open");
        assert!(matches!(
            event,
            SessionEvent::Signaling { event: SignalingEvent::Error(reason), .. }
                if reason.contains("unreachable")
        ));
    }

    #[test]
    fn new_routes_prune_closed_ones() {
        let (link, _events, _queue) = rendezvous();
        drop(link.shared.add_route("dc_1", "b2"));
        let _live = link.shared.add_route("dc_2", "c3");

        let routes = lock(&link.shared.routes);
        assert_eq!(routes.len(), 1);
        assert!(routes.contains_key("dc_2"));
    }

    #[tokio::test]
    async fn refused_registration_keeps_the_server_reason() {
        use crate::session::{Session, Status};
        use std::time::Duration;
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let frame = r#"{"type":"ID-TAKEN"}"#.to_string();
            ws.send(Message::Text(frame.into())).await.unwrap();
            let _ = ws.close(None).await;
        });

        let mut config = SessionConfig::default();
        config.signaling.url = format!("ws://{addr}/peerjs");
        let (tx, mut events) = mpsc::unbounded_channel();
        let mut session = Session::new(config, Box::new(RendezvousFactory), tx);
        session.start();
        server.await.unwrap();

        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(500), events.recv()).await
        {
            session.handle_event(event);
        }

        assert_eq!(session.status(), Status::Error);
        let reason = session.last_error().unwrap_or_default();
        assert!(reason.contains("already taken"), "last error was {reason:?}");
    }
}
