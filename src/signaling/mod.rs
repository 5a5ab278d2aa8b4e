//! The signaling boundary.
//!
//! A [`SignalingFactory`] registers this endpoint with a rendezvous service and
//! returns the [`SignalingClient`] for that registration. Outcomes arrive later
//! as [`SignalingEvent`]s through the [`SignalingNotifier`] given at
//! registration.

pub mod protocol;
pub mod websocket;

use crate::config::SessionConfig;
use crate::error::SignalingError;
use crate::session::SignalingNotifier;
use crate::transport::TransportHandle;
use std::fmt;

pub use websocket::RendezvousFactory;

pub enum SignalingEvent {
    /// Registration succeeded under this identifier.
    Ready(String),
    /// A remote peer offered a connection.
    Incoming(Box<dyn TransportHandle>),
    /// Registration failed, or the server reported an error.
    Error(String),
    /// The server connection lapsed after registration.
    Disconnected,
}

impl fmt::Debug for SignalingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalingEvent::Ready(id) => f.debug_tuple("Ready").field(id).finish(),
            SignalingEvent::Incoming(handle) => f
                .debug_tuple("Incoming")
                .field(&handle.remote_id())
                .finish(),
            SignalingEvent::Error(reason) => f.debug_tuple("Error").field(reason).finish(),
            SignalingEvent::Disconnected => f.write_str("Disconnected"),
        }
    }
}

pub trait SignalingFactory: Send {
    /// Starts registering. Never blocks; the outcome is notified later.
    fn register(
        &self,
        config: &SessionConfig,
        notifier: SignalingNotifier,
    ) -> Box<dyn SignalingClient>;
}

pub trait SignalingClient: Send {
    /// Starts a connection attempt to `target` and hands back its transport.
    fn connect_to(&mut self, target: &str) -> Result<Box<dyn TransportHandle>, SignalingError>;

    /// Leaves the rendezvous service and releases everything this client owns.
    fn destroy(&mut self);
}
