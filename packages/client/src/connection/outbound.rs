//! Outbound API: the cloneable handle used to send into the open connection.

use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicU64, Ordering},
};

use snoochat_shared::time::Clock;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::{error::SendError, frame::OutboundMessage};

/// Lifecycle of the single chat connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Terminated,
}

struct Link {
    state: ConnectionState,
    writer: Option<mpsc::UnboundedSender<Message>>,
}

/// Sends messages over the current connection.
///
/// Sending only enqueues the frame for the writer task, so it never waits on
/// the receive loop and is safe to call from inside a hook.
#[derive(Clone)]
pub struct Outbound {
    link: Arc<Mutex<Link>>,
    next_req_id: Arc<AtomicU64>,
}

impl Outbound {
    /// Create a disconnected handle whose request ids start at the clock's now.
    pub fn new(clock: &dyn Clock) -> Self {
        Self {
            link: Arc::new(Mutex::new(Link {
                state: ConnectionState::Disconnected,
                writer: None,
            })),
            next_req_id: Arc::new(AtomicU64::new(clock.request_id_seed())),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn send_message(
        &self,
        text: impl Into<String>,
        channel_url: impl Into<String>,
    ) -> Result<(), SendError> {
        self.send(OutboundMessage::text(channel_url, text))
    }

    pub fn send_snoomoji(
        &self,
        snoomoji: impl Into<String>,
        channel_url: impl Into<String>,
    ) -> Result<(), SendError> {
        self.send(OutboundMessage::snoomoji(channel_url, snoomoji))
    }

    /// Frame and enqueue `message`; fails unless the connection is up.
    pub fn send(&self, message: OutboundMessage) -> Result<(), SendError> {
        let link = self.lock();
        let writer = match (&link.state, &link.writer) {
            (ConnectionState::Connected, Some(writer)) => writer,
            _ => return Err(SendError::NotConnected),
        };

        let req_id = self.next_req_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            "Sending message (req_id {}) to {}",
            req_id,
            message.channel_url()
        );
        writer
            .send(Message::Text(message.encode(req_id).into()))
            .map_err(|_| SendError::NotConnected)
    }

    /// Enqueue a control frame (ping, close) regardless of state.
    pub(crate) fn send_control(&self, message: Message) -> Result<(), SendError> {
        self.lock()
            .writer
            .as_ref()
            .ok_or(SendError::NotConnected)?
            .send(message)
            .map_err(|_| SendError::NotConnected)
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.lock().state = state;
    }

    /// Install the writer of a freshly opened connection.
    pub(crate) fn attach(&self, writer: mpsc::UnboundedSender<Message>) {
        let mut link = self.lock();
        link.writer = Some(writer);
        link.state = ConnectionState::Connected;
    }

    /// Drop the writer; the writer task finishes once its queue drains.
    pub(crate) fn detach(&self, state: ConnectionState) {
        let mut link = self.lock();
        link.writer = None;
        link.state = state;
    }

    fn lock(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
