//! Runs a [`Session`] on its own task.
//!
//! The task is the only owner of the session. User commands and notifications
//! are processed one at a time, and after each step the new
//! [`SessionSnapshot`] is published on a watch channel.

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::session::event::SessionEvent;
use crate::session::machine::Session;
use crate::session::state::SessionSnapshot;
use crate::signaling::SignalingFactory;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

enum Command {
    Connect {
        peer_id: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Send {
        text: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Recover,
    Shutdown,
}

/// Cloneable front door to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub async fn connect(&self, peer_id: impl Into<String>) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Connect {
                peer_id: peer_id.into(),
                reply,
            })
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    pub async fn send(&self, text: impl Into<String>) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Send {
                text: text.into(),
                reply,
            })
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    pub fn recover(&self) -> Result<(), SessionError> {
        self.commands
            .send(Command::Recover)
            .map_err(|_| SessionError::Closed)
    }

    pub fn shutdown(&self) -> Result<(), SessionError> {
        self.commands
            .send(Command::Shutdown)
            .map_err(|_| SessionError::Closed)
    }

    /// The latest published state.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver that wakes on every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }
}

/// Starts a session on a new task and begins registration right away.
///
/// The task ends after [`SessionHandle::shutdown`] or once every handle is
/// dropped.
pub fn spawn_session(
    config: SessionConfig,
    factory: Box<dyn SignalingFactory>,
) -> (SessionHandle, JoinHandle<()>) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel();

    let mut session = Session::new(config, factory, event_tx);
    session.start();
    let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());

    let task = tokio::spawn(run(session, command_rx, event_rx, snapshot_tx));
    let handle = SessionHandle {
        commands: command_tx,
        snapshots: snapshot_rx,
    };
    (handle, task)
}

async fn run(
    mut session: Session,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    snapshots: watch::Sender<SessionSnapshot>,
) {
    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    debug!("all session handles dropped");
                    break;
                };
                match command {
                    Command::Connect { peer_id, reply } => {
                        let _ = reply.send(session.connect(&peer_id));
                    }
                    Command::Send { text, reply } => {
                        let _ = reply.send(session.send(&text));
                    }
                    Command::Recover => session.recover(),
                    Command::Shutdown => break,
                }
            }
            // The session keeps a sender, so this channel never closes first.
            Some(event) = events.recv() => session.handle_event(event),
        }
        publish(&session, &snapshots);
    }

    session.shutdown();
    publish(&session, &snapshots);
    info!("session task finished");
}

fn publish(session: &Session, snapshots: &watch::Sender<SessionSnapshot>) {
    let next = session.snapshot();
    snapshots.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}
