//! In-memory rendezvous network: sessions registered on the same
//! [`LoopNetwork`] can reach each other without sockets.

#![allow(dead_code)]

use ssc_chat::error::{SignalingError, TransportError};
use ssc_chat::session::{SignalingNotifier, TransportNotifier};
use ssc_chat::signaling::{SignalingClient, SignalingEvent, SignalingFactory};
use ssc_chat::transport::{EventRelay, Payload, TransportEvent, TransportHandle};
use ssc_chat::{SessionConfig, SessionHandle, SessionSnapshot};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Directory {
    peers: HashMap<String, SignalingNotifier>,
    issued: u32,
}

#[derive(Clone, Default)]
pub struct LoopNetwork(Arc<Mutex<Directory>>);

impl LoopNetwork {
    pub fn online(&self, id: &str) -> bool {
        self.0.lock().unwrap().peers.contains_key(id)
    }
}

impl SignalingFactory for LoopNetwork {
    fn register(
        &self,
        _config: &SessionConfig,
        notifier: SignalingNotifier,
    ) -> Box<dyn SignalingClient> {
        let mut directory = self.0.lock().unwrap();
        directory.issued += 1;
        let id = format!("peer-{}", directory.issued);
        notifier.notify(SignalingEvent::Ready(id.clone()));
        directory.peers.insert(id.clone(), notifier);
        Box::new(LoopClient {
            network: self.clone(),
            id,
            destroyed: false,
        })
    }
}

struct LoopClient {
    network: LoopNetwork,
    id: String,
    destroyed: bool,
}

impl SignalingClient for LoopClient {
    fn connect_to(&mut self, target: &str) -> Result<Box<dyn TransportHandle>, SignalingError> {
        if self.destroyed {
            return Err(SignalingError::Destroyed);
        }
        let directory = self.network.0.lock().unwrap();
        let Some(remote) = directory.peers.get(target) else {
            let (outbound, _) = LoopTransport::pair(target, &self.id);
            outbound
                .own
                .emit(TransportEvent::Error(format!("could not connect to peer {target}")));
            return Ok(Box::new(outbound));
        };
        let (outbound, inbound) = LoopTransport::pair(target, &self.id);
        remote.notify(SignalingEvent::Incoming(Box::new(inbound)));
        Ok(Box::new(outbound))
    }

    fn destroy(&mut self) {
        self.destroyed = true;
        self.network.0.lock().unwrap().peers.remove(&self.id);
    }
}

/// One end of an in-memory channel. The link opens once the inbound end is
/// attached, i.e. accepted by its session.
pub struct LoopTransport {
    remote: String,
    own: Arc<EventRelay>,
    other: Arc<EventRelay>,
    open: Arc<AtomicBool>,
    inbound: bool,
}

impl LoopTransport {
    fn pair(target: &str, caller: &str) -> (Self, Self) {
        let a = Arc::new(EventRelay::new());
        let b = Arc::new(EventRelay::new());
        let open = Arc::new(AtomicBool::new(false));
        let outbound = Self {
            remote: target.into(),
            own: a.clone(),
            other: b.clone(),
            open: open.clone(),
            inbound: false,
        };
        let inbound = Self {
            remote: caller.into(),
            own: b,
            other: a,
            open,
            inbound: true,
        };
        (outbound, inbound)
    }
}

impl TransportHandle for LoopTransport {
    fn remote_id(&self) -> &str {
        &self.remote
    }

    fn attach(&mut self, notifier: TransportNotifier) {
        self.own.attach(notifier);
        if self.inbound {
            self.open.store(true, Ordering::SeqCst);
            self.own.emit(TransportEvent::Open);
            self.other.emit(TransportEvent::Open);
        }
    }

    fn send(&self, text: &str) -> Result<(), TransportError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::ChannelNotOpen);
        }
        self.other
            .emit(TransportEvent::Data(Payload::Text(text.to_string())));
        Ok(())
    }

    fn close(&mut self) {
        self.open.store(false, Ordering::SeqCst);
        self.own.detach();
        self.other.emit(TransportEvent::Close);
    }
}

/// Waits until the published snapshot satisfies `pred`.
pub async fn wait_for(
    session: &SessionHandle,
    what: &str,
    pred: impl Fn(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let mut snapshots = session.subscribe();
    let outcome = tokio::time::timeout(Duration::from_secs(5), async {
        snapshots.wait_for(|s| pred(s)).await.map(|s| s.clone())
    })
    .await;
    match outcome {
        Ok(Ok(snapshot)) => snapshot,
        _ => panic!("timed out waiting for {what}: {:?}", session.snapshot()),
    }
}

pub fn texts(snapshot: &SessionSnapshot) -> Vec<(String, ssc_chat::Sender)> {
    snapshot
        .messages
        .iter()
        .map(|m| (m.text().to_string(), m.sender()))
        .collect()
}
