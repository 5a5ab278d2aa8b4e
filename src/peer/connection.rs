use crate::config::SessionConfig;
use crate::error::TransportError;
use crate::peer::lock;
use crate::peer::transport::LinkSignals;
use crate::peer::types::{IceCandidate, ServerConfig};
use crate::transport::{EventRelay, TransportEvent};
use crate::utils::add_ice_url_scheme;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::RTCPeerConnection;

/// Creates a peer connection wired to `relay`: local candidates are trickled
/// through `link`, connection failures become transport events.
pub async fn new_peer(
    config: &SessionConfig,
    link: &LinkSignals,
    relay: &Arc<EventRelay>,
) -> Result<Arc<RTCPeerConnection>, TransportError> {
    let api = APIBuilder::new().build();
    let pc = Arc::new(api.new_peer_connection(rtc_config(&config.ice_servers)).await?);

    let trickle = link.clone();
    pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
        match cand {
            Some(c) => match c.to_json() {
                Ok(init) => {
                    debug!(candidate = %init.candidate, "local candidate");
                    trickle.send_candidate(IceCandidate::from_init(init, &trickle.connection_id));
                }
                Err(e) => warn!(error = %e, "could not serialize local candidate"),
            },
            // None означает конец сбора
            None => debug!("ICE candidate gathering completed"),
        }
        Box::pin(async {})
    }));

    pc.on_ice_gathering_state_change(Box::new(move |state| {
        debug!(?state, "ICE gathering state changed");
        Box::pin(async {})
    }));

    let weak = Arc::downgrade(&pc);
    let grace = config.grace_period();
    let grace_task: Arc<Mutex<Option<JoinHandle<()>>>> = Arc::default();
    let relay = relay.clone();
    pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
        debug!(state = ?st, "peer connection state changed");
        match st {
            RTCPeerConnectionState::Connected => {
                // отменяем отложенную проверку, если она была
                if let Some(task) = lock(&grace_task).take() {
                    info!("peer connection recovered");
                    task.abort();
                }
            }
            RTCPeerConnectionState::Disconnected => {
                let mut slot = lock(&grace_task);
                // уже ждём восстановления? ничего не делаем
                if slot.as_ref().map_or(true, |t| t.is_finished()) {
                    info!(grace_secs = grace.as_secs(), "peer connection interrupted, waiting for recovery");
                    let weak = weak.clone();
                    let relay = relay.clone();
                    *slot = Some(tokio::spawn(async move {
                        sleep(grace).await;
                        let Some(pc) = weak.upgrade() else {
                            return;
                        };
                        let state = pc.connection_state();
                        if state != RTCPeerConnectionState::Connected {
                            warn!(?state, "peer connection did not recover");
                            relay.emit(TransportEvent::Error("peer connection lost".into()));
                        }
                    }));
                }
            }
            RTCPeerConnectionState::Failed => {
                if let Some(task) = lock(&grace_task).take() {
                    task.abort();
                }
                relay.emit(TransportEvent::Error("peer connection failed".into()));
            }
            RTCPeerConnectionState::Closed => {
                if let Some(task) = lock(&grace_task).take() {
                    task.abort();
                }
                relay.emit(TransportEvent::Close);
            }
            _ => {}
        }
        Box::pin(async {})
    }));

    Ok(pc)
}

/// Конфигурация peer connection с агрессивными настройками ICE.
pub fn rtc_config(servers: &[ServerConfig]) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: ice_servers(servers),
        ice_candidate_pool_size: 10,
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

pub fn ice_servers(servers: &[ServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| RTCIceServer {
            urls: vec![add_ice_url_scheme(config)],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
        })
        .collect()
}
