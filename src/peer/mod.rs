//! WebRTC implementation of the transport boundary.

pub mod codec;
pub mod connection;
pub mod data_channel;
pub mod ice;
pub mod transport;
pub mod types;

use std::sync::{Mutex, MutexGuard};

pub use transport::{LinkSignals, RemoteSignal, Role, RtcTransport};
pub use types::{IceCandidate, SdpPayload, ServerConfig, ServerKind};

/// Locks `mutex`, ignoring poisoning: every value guarded here stays valid
/// when a holder panics.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
