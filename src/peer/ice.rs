use crate::peer::types::IceCandidate;
use tracing::{debug, warn};
use webrtc::peer_connection::RTCPeerConnection;

/// Remote candidates that arrived before the remote description was set.
#[derive(Debug, Default)]
pub struct PendingCandidates {
    queue: Vec<IceCandidate>,
}

impl PendingCandidates {
    /// Applies `candidate` now if the remote description is known, otherwise
    /// queues it for [`flush`](Self::flush).
    pub async fn add(&mut self, pc: &RTCPeerConnection, candidate: IceCandidate) {
        if pc.remote_description().await.is_some() {
            apply(pc, candidate).await;
        } else {
            // применим после set_remote_description
            debug!("remote description not set yet, queuing candidate");
            self.queue.push(candidate);
        }
    }

    pub async fn flush(&mut self, pc: &RTCPeerConnection) {
        if self.is_empty() {
            return;
        }
        debug!(count = self.len(), "applying queued candidates");
        for candidate in self.queue.drain(..) {
            apply(pc, candidate).await;
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

async fn apply(pc: &RTCPeerConnection, candidate: IceCandidate) {
    debug!(candidate = %candidate.candidate, "applying remote candidate");
    if let Err(e) = pc.add_ice_candidate(candidate.into_init()).await {
        warn!(error = %e, "failed to add ICE candidate");
    }
}
