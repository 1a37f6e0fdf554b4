//! Room actor implementation
//!
//! Each room runs as its own task and is the only owner of its membership.
//! Other actors talk to it through a `RoomHandle`.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::client::ClientHandle;
use crate::error::AppError;
use crate::message::{Action, Message, RoomInfo};
use crate::types::{ClientId, RoomId};

/// Commands processed by a room actor
#[derive(Debug)]
pub enum RoomCommand {
    /// Add a client to the room
    Join { client: ClientHandle },
    /// Remove a client from the room
    Leave { client_id: ClientId },
    /// Deliver a message to every member
    Broadcast { message: Message },
    /// Report the current member IDs
    Members { reply: oneshot::Sender<Vec<ClientId>> },
}

/// Routing handle for a room
///
/// Carries the room's immutable identity so lookups never need a round
/// trip to the room task.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    pub id: RoomId,
    pub name: String,
    pub private: bool,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub async fn join(&self, client: ClientHandle) -> Result<(), AppError> {
        self.send(RoomCommand::Join { client }).await
    }

    pub async fn leave(&self, client_id: ClientId) -> Result<(), AppError> {
        self.send(RoomCommand::Leave { client_id }).await
    }

    pub async fn broadcast(&self, message: Message) -> Result<(), AppError> {
        self.send(RoomCommand::Broadcast { message }).await
    }

    /// Current member IDs, in no particular order
    pub async fn members(&self) -> Result<Vec<ClientId>, AppError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Members { reply }).await?;
        Ok(rx.await?)
    }

    /// Wire representation used in `target` fields
    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            id: self.id.to_string(),
            name: self.name.clone(),
            private: self.private,
        }
    }

    async fn send(&self, cmd: RoomCommand) -> Result<(), AppError> {
        self.sender.send(cmd).await.map_err(|_| AppError::ChannelSend)
    }
}

impl PartialEq for RoomHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RoomHandle {}

/// Room actor
///
/// Public rooms announce newcomers to the existing members; private rooms
/// stay silent.
pub struct Room {
    id: RoomId,
    name: String,
    /// Fixed at creation
    private: bool,
    members: HashMap<ClientId, ClientHandle>,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl Room {
    /// Create a room actor and the handle used to reach it
    pub fn new(name: String, private: bool, buffer: usize) -> (Self, RoomHandle) {
        let id = RoomId::new();
        let (sender, receiver) = mpsc::channel(buffer);
        let handle = RoomHandle {
            id,
            name: name.clone(),
            private,
            sender,
        };
        let room = Self {
            id,
            name,
            private,
            members: HashMap::new(),
            receiver,
        };
        (room, handle)
    }

    /// Run the room event loop
    ///
    /// Ends once every handle has been dropped.
    pub async fn run(mut self) {
        debug!("Room {} ({}) started", self.name, self.id);

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        debug!("Room {} ({}) stopped", self.name, self.id);
    }

    fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join { client } => self.handle_join(client),
            RoomCommand::Leave { client_id } => self.handle_leave(client_id),
            RoomCommand::Broadcast { message } => self.handle_broadcast(message),
            RoomCommand::Members { reply } => {
                let _ = reply.send(self.members.keys().copied().collect());
            }
        }
    }

    fn handle_join(&mut self, client: ClientHandle) {
        if !self.private {
            let welcome = Message::new(Action::SendMessage)
                .with_message(format!("{} joined the room", client.name))
                .with_target(Some(self.info()));
            self.broadcast(&welcome);
        }

        info!("Client {} joined room {}", client.id, self.name);
        self.members.insert(client.id, client);
    }

    fn handle_leave(&mut self, client_id: ClientId) {
        if self.members.remove(&client_id).is_some() {
            info!("Client {} left room {}", client_id, self.name);
        }
    }

    fn handle_broadcast(&mut self, mut message: Message) {
        message.target = Some(self.info());
        self.broadcast(&message);
    }

    fn broadcast(&self, message: &Message) {
        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to encode message for room {}: {}", self.name, e);
                return;
            }
        };

        for member in self.members.values() {
            member.send_frame(frame.clone());
        }
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            id: self.id.to_string(),
            name: self.name.clone(),
            private: self.private,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::client::ClientEvent;
    use crate::message::ClientInfo;

    fn spawn_room(name: &str, private: bool) -> RoomHandle {
        let (room, handle) = Room::new(name.to_string(), private, 32);
        tokio::spawn(room.run());
        handle
    }

    fn client(name: &str) -> (ClientHandle, mpsc::Receiver<ClientEvent>) {
        let (tx, rx) = mpsc::channel(32);
        (ClientHandle::new(name, tx), rx)
    }

    async fn next_message(rx: &mut mpsc::Receiver<ClientEvent>) -> Message {
        match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
            Ok(Some(ClientEvent::Frame(frame))) => Message::decode(&frame).unwrap(),
            other => panic!("Expected a frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_room_creation() {
        let room = spawn_room("general", false);

        assert_eq!(room.name, "general");
        assert!(!room.private);
        assert!(room.members().await.unwrap().is_empty());
        assert_eq!(room.info().id, room.id.to_string());
    }

    #[tokio::test]
    async fn test_public_join_announced_to_existing_members() {
        let room = spawn_room("general", false);
        let (alice, mut alice_rx) = client("Alice");
        let (bob, mut bob_rx) = client("Bob");

        room.join(alice.clone()).await.unwrap();
        room.join(bob.clone()).await.unwrap();
        room.members().await.unwrap();

        let welcome = next_message(&mut alice_rx).await;
        assert_eq!(welcome.action, Action::SendMessage);
        assert_eq!(welcome.message, "Bob joined the room");
        assert_eq!(welcome.target.unwrap().id, room.id.to_string());

        // Alice joined an empty room, Bob is not told about himself
        assert!(alice_rx.try_recv().is_err());
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_private_join_is_silent() {
        let room = spawn_room("pair", true);
        let (alice, mut alice_rx) = client("Alice");
        let (bob, _bob_rx) = client("Bob");

        room.join(alice).await.unwrap();
        room.join(bob).await.unwrap();

        assert_eq!(room.members().await.unwrap().len(), 2);
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_members_only() {
        let room = spawn_room("general", false);
        let (a, mut a_rx) = client("A");
        let (b, mut b_rx) = client("B");
        let (c, mut c_rx) = client("C");
        let (_outsider, mut outsider_rx) = client("Outsider");

        for member in [&a, &b, &c] {
            room.join(member.clone()).await.unwrap();
        }
        room.members().await.unwrap();
        // Drain join announcements
        while a_rx.try_recv().is_ok() {}
        while b_rx.try_recv().is_ok() {}

        let message = Message::new(Action::SendMessage)
            .with_message("hello")
            .with_sender(Some(ClientInfo {
                id: a.id.to_string(),
                name: "A".to_string(),
            }));
        room.broadcast(message).await.unwrap();
        room.members().await.unwrap();

        for rx in [&mut a_rx, &mut b_rx, &mut c_rx] {
            let msg = next_message(rx).await;
            assert_eq!(msg.message, "hello");
            assert_eq!(msg.target.unwrap().name, "general");
            assert!(rx.try_recv().is_err());
        }
        assert!(outsider_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_leave_is_idempotent() {
        let room = spawn_room("general", false);
        let (alice, _alice_rx) = client("Alice");
        let (bob, _bob_rx) = client("Bob");

        room.join(alice.clone()).await.unwrap();
        room.leave(bob.id).await.unwrap();
        assert_eq!(room.members().await.unwrap(), vec![alice.id]);

        room.leave(alice.id).await.unwrap();
        room.leave(alice.id).await.unwrap();
        assert!(room.members().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_closed_member_does_not_stop_room() {
        let room = spawn_room("general", false);
        let (gone, gone_rx) = client("Gone");
        let (alice, mut alice_rx) = client("Alice");
        drop(gone_rx);

        room.join(gone).await.unwrap();
        room.join(alice).await.unwrap();
        room.broadcast(Message::new(Action::SendMessage).with_message("still here"))
            .await
            .unwrap();

        assert_eq!(room.members().await.unwrap().len(), 2);
        assert_eq!(next_message(&mut alice_rx).await.message, "still here");
    }
}
