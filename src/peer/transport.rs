use crate::config::SessionConfig;
use crate::error::TransportError;
use crate::peer::codec;
use crate::peer::connection::new_peer;
use crate::peer::data_channel::{attach_dc, ChannelSlot};
use crate::peer::ice::PendingCandidates;
use crate::peer::lock;
use crate::peer::types::{IceCandidate, SdpPayload};
use crate::session::TransportNotifier;
use crate::signaling::protocol::{CandidateSignal, ClientMessage, SdpSignal};
use crate::transport::{EventRelay, TransportEvent, TransportHandle};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::peer_connection::RTCPeerConnection;

type PeerSlot = Arc<Mutex<Option<Arc<RTCPeerConnection>>>>;

/// Signaling traffic addressed to one connection.
#[derive(Debug)]
pub enum RemoteSignal {
    Answer(SdpPayload),
    Candidate(IceCandidate),
    /// The remote peer left the rendezvous server.
    Left,
    /// The remote peer cannot be reached.
    Gone(String),
}

/// Which side of the offer/answer exchange this end plays.
#[derive(Debug)]
pub enum Role {
    Offerer,
    Answerer(SdpPayload),
}

/// Outgoing signaling for one connection.
#[derive(Debug, Clone)]
pub struct LinkSignals {
    pub remote_id: String,
    pub connection_id: String,
    pub label: String,
    pub outbox: mpsc::UnboundedSender<ClientMessage>,
}

impl LinkSignals {
    fn sdp_signal(&self, payload: &SdpPayload) -> Result<SdpSignal, TransportError> {
        Ok(SdpSignal {
            connection_id: self.connection_id.clone(),
            label: self.label.clone(),
            sdp: codec::encode(payload).map_err(|e| TransportError::Rtc(e.to_string()))?,
        })
    }

    fn post(&self, frame: ClientMessage) -> Result<(), TransportError> {
        self.outbox.send(frame).map_err(|_| TransportError::Closed)
    }

    pub fn send_offer(&self, payload: &SdpPayload) -> Result<(), TransportError> {
        let payload = self.sdp_signal(payload)?;
        self.post(ClientMessage::Offer {
            dst: self.remote_id.clone(),
            payload,
        })
    }

    pub fn send_answer(&self, payload: &SdpPayload) -> Result<(), TransportError> {
        let payload = self.sdp_signal(payload)?;
        self.post(ClientMessage::Answer {
            dst: self.remote_id.clone(),
            payload,
        })
    }

    pub fn send_candidate(&self, candidate: IceCandidate) {
        let frame = ClientMessage::Candidate {
            dst: self.remote_id.clone(),
            payload: CandidateSignal {
                connection_id: self.connection_id.clone(),
                candidate,
            },
        };
        if self.post(frame).is_err() {
            debug!(connection = %self.connection_id, "signaling gone, dropping local candidate");
        }
    }

    /// Tells the remote peer this end is gone.
    pub fn send_leave(&self) {
        let frame = ClientMessage::Leave {
            dst: self.remote_id.clone(),
        };
        if self.post(frame).is_err() {
            debug!(connection = %self.connection_id, "signaling gone, remote not told about close");
        }
    }
}

/// A WebRTC data channel to one remote peer.
///
/// Negotiation runs on a background task; its outcome arrives as transport
/// events. Outgoing text is written by a second task in submission order.
pub struct RtcTransport {
    link: LinkSignals,
    relay: Arc<EventRelay>,
    channel: ChannelSlot,
    peer: PeerSlot,
    writer: mpsc::UnboundedSender<String>,
    tasks: Vec<JoinHandle<()>>,
    closed: bool,
}

impl RtcTransport {
    /// Starts negotiating. Must be called inside a tokio runtime.
    pub fn spawn(
        config: Arc<SessionConfig>,
        link: LinkSignals,
        role: Role,
        signals: mpsc::UnboundedReceiver<RemoteSignal>,
    ) -> Self {
        let relay = Arc::new(EventRelay::new());
        let channel = ChannelSlot::default();
        let peer = PeerSlot::default();
        let (writer, queue) = mpsc::unbounded_channel();

        let negotiation = tokio::spawn(negotiate(
            config,
            link.clone(),
            role,
            signals,
            relay.clone(),
            channel.clone(),
            peer.clone(),
        ));
        let writes = tokio::spawn(write_loop(queue, channel.clone(), relay.clone()));

        Self {
            link,
            relay,
            channel,
            peer,
            writer,
            tasks: vec![negotiation, writes],
            closed: false,
        }
    }
}

impl TransportHandle for RtcTransport {
    fn remote_id(&self) -> &str {
        &self.link.remote_id
    }

    fn attach(&mut self, notifier: TransportNotifier) {
        self.relay.attach(notifier);
    }

    fn send(&self, text: &str) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let open = lock(&self.channel)
            .as_ref()
            .is_some_and(|dc| dc.ready_state() == RTCDataChannelState::Open);
        if !open {
            return Err(TransportError::ChannelNotOpen);
        }
        self.writer
            .send(text.to_string())
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.relay.detach();
        for task in self.tasks.drain(..) {
            task.abort();
        }

        let dc = lock(&self.channel).take();
        let pc = lock(&self.peer).take();
        info!(remote = %self.link.remote_id, connection = %self.link.connection_id, "closing transport");
        self.link.send_leave();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(shutdown(dc, pc));
            }
            Err(_) => warn!("no runtime available, peer connection dropped without closing"),
        }
    }
}

impl Drop for RtcTransport {
    fn drop(&mut self) {
        self.close();
    }
}

async fn shutdown(dc: Option<Arc<RTCDataChannel>>, pc: Option<Arc<RTCPeerConnection>>) {
    if let Some(dc) = dc {
        let _ = dc.close().await;
    }
    if let Some(pc) = pc {
        if let Err(e) = pc.close().await {
            debug!(error = %e, "peer connection close failed");
        }
    }
}

async fn negotiate(
    config: Arc<SessionConfig>,
    link: LinkSignals,
    role: Role,
    signals: mpsc::UnboundedReceiver<RemoteSignal>,
    relay: Arc<EventRelay>,
    channel: ChannelSlot,
    peer: PeerSlot,
) {
    if let Err(e) = run_negotiation(&config, &link, role, signals, &relay, &channel, &peer).await {
        warn!(remote = %link.remote_id, error = %e, "negotiation failed");
        relay.emit(TransportEvent::Error(e.to_string()));
    }
}

async fn run_negotiation(
    config: &SessionConfig,
    link: &LinkSignals,
    role: Role,
    mut signals: mpsc::UnboundedReceiver<RemoteSignal>,
    relay: &Arc<EventRelay>,
    channel: &ChannelSlot,
    peer: &PeerSlot,
) -> Result<(), TransportError> {
    let pc = new_peer(config, link, relay).await?;
    *lock(peer) = Some(pc.clone());
    let mut pending = PendingCandidates::default();

    match role {
        Role::Offerer => {
            let dc = pc
                .create_data_channel(&link.label, Some(RTCDataChannelInit::default()))
                .await?;
            attach_dc(&dc, relay, channel);

            let offer = pc.create_offer(None).await?;
            pc.set_local_description(offer).await?;
            link.send_offer(&local_payload(&pc, link).await?)?;
            debug!(remote = %link.remote_id, "offer sent");
        }
        Role::Answerer(offer) => {
            let relay = relay.clone();
            let channel = channel.clone();
            pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
                attach_dc(&dc, &relay, &channel);
                Box::pin(async {})
            }));

            pc.set_remote_description(offer.sdp).await?;
            let answer = pc.create_answer(None).await?;
            pc.set_local_description(answer).await?;
            link.send_answer(&local_payload(&pc, link).await?)?;
            debug!(remote = %link.remote_id, "answer sent");
        }
    }

    while let Some(signal) = signals.recv().await {
        match signal {
            RemoteSignal::Answer(answer) => {
                pc.set_remote_description(answer.sdp).await?;
                pending.flush(&pc).await;
                debug!(remote = %link.remote_id, "answer applied");
            }
            RemoteSignal::Candidate(candidate) => pending.add(&pc, candidate).await,
            RemoteSignal::Left => {
                info!(remote = %link.remote_id, "remote peer left");
                relay.emit(TransportEvent::Close);
            }
            RemoteSignal::Gone(reason) => relay.emit(TransportEvent::Error(reason)),
        }
    }
    Ok(())
}

async fn local_payload(
    pc: &RTCPeerConnection,
    link: &LinkSignals,
) -> Result<SdpPayload, TransportError> {
    let sdp = pc
        .local_description()
        .await
        .ok_or_else(|| TransportError::Rtc("local description missing".into()))?;
    Ok(SdpPayload {
        sdp,
        id: link.connection_id.clone(),
        ts: chrono::Utc::now().timestamp(),
    })
}

async fn write_loop(
    mut queue: mpsc::UnboundedReceiver<String>,
    channel: ChannelSlot,
    relay: Arc<EventRelay>,
) {
    while let Some(text) = queue.recv().await {
        let dc = lock(&channel).clone();
        let Some(dc) = dc else {
            relay.emit(TransportEvent::Error(TransportError::ChannelNotOpen.to_string()));
            continue;
        };
        if let Err(e) = dc.send_text(text).await {
            warn!(error = %e, "data channel write failed");
            relay.emit(TransportEvent::Error(format!("send failed: {e}")));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closing_tells_the_remote_peer_once() {
        let (outbox, mut frames) = mpsc::unbounded_channel();
        let (_signals, remote) = mpsc::unbounded_channel();
        let link = LinkSignals {
            remote_id: "b2".into(),
            connection_id: "dc_1".into(),
            label: "ssc-data".into(),
            outbox,
        };
        let mut config = SessionConfig::default();
        config.ice_servers.clear();
        let mut transport = RtcTransport::spawn(Arc::new(config), link, Role::Offerer, remote);

        transport.close();
        transport.close();

        let mut leaves = 0;
        while let Ok(frame) = frames.try_recv() {
            if frame == (ClientMessage::Leave { dst: "b2".into() }) {
                leaves += 1;
            }
        }
        assert_eq!(leaves, 1);
        assert_eq!(transport.send("late"), Err(TransportError::Closed));
    }
}
