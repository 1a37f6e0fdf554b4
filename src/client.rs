//! Client handle definition
//!
//! A `ClientHandle` is what the server and room actors hold for a
//! connected client: its identity plus the sending half of its outbound
//! queue. It never exposes the session's own state.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::SendError;
use crate::message::ClientInfo;
use crate::types::ClientId;

/// Item on a client's outbound queue
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Encoded frame to write to the transport
    Frame(Arc<str>),
    /// Another session paired this client into a private room
    ///
    /// Processed by the owning session, which runs its own join routine
    /// so that only it ever touches its membership set.
    JoinPrivate {
        room_name: String,
        counterpart: ClientHandle,
    },
}

/// Routing handle for a connected client
///
/// Cheap to clone. Equality and hashing use the client ID only.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    /// Unique identifier for this client
    pub id: ClientId,
    /// Display name from the handshake
    pub name: Arc<str>,
    /// Actor → session queue
    sender: mpsc::Sender<ClientEvent>,
}

impl ClientHandle {
    /// Create a new handle with a fresh ID
    pub fn new(name: impl Into<Arc<str>>, sender: mpsc::Sender<ClientEvent>) -> Self {
        Self::with_id(ClientId::new(), name, sender)
    }

    pub fn with_id(
        id: ClientId,
        name: impl Into<Arc<str>>,
        sender: mpsc::Sender<ClientEvent>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            sender,
        }
    }

    /// Queue an event for this client without waiting
    ///
    /// Fails with `QueueFull` if the client is not keeping up and with
    /// `ChannelClosed` once its session has shut down.
    pub fn deliver(&self, event: ClientEvent) -> Result<(), SendError> {
        self.sender.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Queue an encoded frame, dropping it if it cannot be delivered
    pub fn send_frame(&self, frame: Arc<str>) {
        match self.deliver(ClientEvent::Frame(frame)) {
            Ok(()) => {}
            Err(SendError::QueueFull) => {
                warn!("Outbound queue full for {}, dropping frame", self.id);
            }
            Err(SendError::ChannelClosed) => {
                debug!("Client {} already closed, dropping frame", self.id);
            }
        }
    }

    /// Wire representation used in `sender` fields
    pub fn info(&self) -> ClientInfo {
        ClientInfo {
            id: self.id.to_string(),
            name: self.name.to_string(),
        }
    }
}

impl PartialEq for ClientHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ClientHandle {}

impl std::hash::Hash for ClientHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Action, Message};

    #[tokio::test]
    async fn test_handle_creation() {
        let (tx, _rx) = mpsc::channel(32);
        let client = ClientHandle::new("Alice", tx);

        let info = client.info();
        assert_eq!(info.name, "Alice");
        assert_eq!(info.id, client.id.to_string());
    }

    #[tokio::test]
    async fn test_equality_by_id() {
        let (tx1, _rx1) = mpsc::channel(1);
        let (tx2, _rx2) = mpsc::channel(1);
        let id = ClientId::new();

        let a = ClientHandle::with_id(id, "Alice", tx1);
        let b = ClientHandle::with_id(id, "Someone else", tx2.clone());
        let c = ClientHandle::new("Alice", tx2);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_send_frame_reaches_queue() {
        let (tx, mut rx) = mpsc::channel(4);
        let client = ClientHandle::new("Alice", tx);

        let joined = Message::new(Action::UserJoin).with_sender(Some(client.info()));
        client.send_frame(joined.encode().unwrap());

        match rx.recv().await {
            Some(ClientEvent::Frame(frame)) => {
                let msg = Message::decode(&frame).unwrap();
                assert_eq!(msg.action, Action::UserJoin);
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        let client = ClientHandle::new("Slow", tx);

        assert!(client.deliver(ClientEvent::Frame("one".into())).is_ok());
        assert_eq!(
            client.deliver(ClientEvent::Frame("two".into())),
            Err(SendError::QueueFull)
        );
        client.send_frame("three".into());

        assert!(matches!(rx.try_recv(), Ok(ClientEvent::Frame(f)) if &*f == "one"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_queue() {
        let (tx, rx) = mpsc::channel(4);
        let client = ClientHandle::new("Gone", tx);
        drop(rx);

        assert_eq!(
            client.deliver(ClientEvent::Frame("x".into())),
            Err(SendError::ChannelClosed)
        );
        // Must not panic
        client.send_frame("y".into());
    }
}
