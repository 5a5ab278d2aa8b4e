//! Peer-to-peer text chat over WebRTC data channels.
//!
//! A [`Session`] registers with a rendezvous server, connects to (or accepts)
//! exactly one remote peer at a time and keeps the chat history of its
//! lifetime. [`spawn_session`] runs a session on a tokio task and exposes it
//! through a cloneable [`SessionHandle`].

pub mod config;
pub mod error;
pub mod logger;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod transport;
pub mod utils;

pub use config::SessionConfig;
pub use error::{SessionError, SignalingError, TransportError};
pub use session::{spawn_session, Message, Sender, Session, SessionHandle, SessionSnapshot, Status};
pub use signaling::{RendezvousFactory, SignalingClient, SignalingEvent, SignalingFactory};
pub use transport::{Payload, TransportEvent, TransportHandle};
