//! JSON frames exchanged with the rendezvous server.
//!
//! Every frame is an object tagged by `type`. The server stamps `src` on
//! frames it relays; clients address frames with `dst`. Session descriptions
//! travel as [`codec`](crate::peer::codec)-encoded [`SdpPayload`](crate::peer::types::SdpPayload)s.

use crate::config::SignalingConfig;
use crate::peer::types::IceCandidate;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING-KEBAB-CASE")]
pub enum ServerMessage {
    /// Registration accepted.
    Open,
    IdTaken,
    Error {
        payload: ErrorPayload,
    },
    Offer {
        src: String,
        payload: SdpSignal,
    },
    Answer {
        src: String,
        payload: SdpSignal,
    },
    Candidate {
        src: String,
        payload: CandidateSignal,
    },
    /// The peer left the server.
    Leave {
        src: String,
    },
    /// A frame we sent could not be delivered to `src`.
    Expire {
        src: String,
    },
    Heartbeat,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING-KEBAB-CASE")]
pub enum ClientMessage {
    Heartbeat,
    Offer { dst: String, payload: SdpSignal },
    Answer { dst: String, payload: SdpSignal },
    Candidate { dst: String, payload: CandidateSignal },
    Leave { dst: String },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorPayload {
    pub msg: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SdpSignal {
    pub connection_id: String,
    pub label: String,
    /// Encoded `SdpPayload`.
    pub sdp: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSignal {
    pub connection_id: String,
    pub candidate: IceCandidate,
}

/// Websocket url that registers `id` with the server.
pub fn registration_url(config: &SignalingConfig, id: &str, token: &str) -> String {
    let separator = if config.url.contains('?') { '&' } else { '?' };
    format!(
        "{}{}key={}&id={}&token={}",
        config.url.trim_end_matches('/'),
        separator,
        config.key,
        id,
        token
    )
}
