//! Connection lifecycle of one chat endpoint.

pub mod driver;
pub mod event;
pub mod log;
pub mod machine;
pub mod state;


pub use driver::{spawn_session, SessionHandle};
pub use event::{SessionEvent, SignalingNotifier, TransportNotifier};
pub use log::{Message, MessageLog, Sender};
pub use machine::{Session, CONNECTION_CLOSED, SIGNALING_LOST};
pub use state::{SessionSnapshot, Status};
