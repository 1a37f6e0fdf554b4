//! ChatServer actor implementation
//!
//! The process-wide registry of connected clients and active rooms.
//! It routes registration, unregistration and global broadcasts, and
//! hands out room handles; it knows nothing about room membership.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::client::ClientHandle;
use crate::config::Config;
use crate::error::AppError;
use crate::message::{Action, ClientInfo, Message};
use crate::room::{Room, RoomHandle};
use crate::types::{ClientId, RoomId};

/// Commands sent from sessions to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// New client connected; replies with everyone registered before it
    Register {
        client: ClientHandle,
        reply: oneshot::Sender<Vec<ClientInfo>>,
    },
    /// Client disconnected
    Unregister { client_id: ClientId },
    /// Deliver an encoded frame to every registered client
    Broadcast { frame: Arc<str> },
    /// Start a new room actor (no name collision check)
    CreateRoom {
        name: String,
        private: bool,
        reply: oneshot::Sender<RoomHandle>,
    },
    /// Look up a room by name, creating it if there is none
    FindOrCreateRoom {
        name: String,
        private: bool,
        reply: oneshot::Sender<RoomHandle>,
    },
    FindRoomByName {
        name: String,
        reply: oneshot::Sender<Option<RoomHandle>>,
    },
    FindRoomById {
        id: RoomId,
        reply: oneshot::Sender<Option<RoomHandle>>,
    },
    FindClientById {
        id: ClientId,
        reply: oneshot::Sender<Option<ClientHandle>>,
    },
}

/// Cloneable front end of the ChatServer actor
#[derive(Debug, Clone)]
pub struct ServerHandle {
    sender: mpsc::Sender<ServerCommand>,
}

impl ServerHandle {
    pub fn new(sender: mpsc::Sender<ServerCommand>) -> Self {
        Self { sender }
    }

    /// Register a client and return the clients that were already connected
    ///
    /// The listing comes back as a reply rather than through the client's
    /// outbound queue, so it is complete however many clients there are.
    pub async fn register(&self, client: ClientHandle) -> Result<Vec<ClientInfo>, AppError> {
        let (reply, rx) = oneshot::channel();
        self.send(ServerCommand::Register { client, reply }).await?;
        Ok(rx.await?)
    }

    pub async fn unregister(&self, client_id: ClientId) -> Result<(), AppError> {
        self.send(ServerCommand::Unregister { client_id }).await
    }

    pub async fn broadcast(&self, frame: Arc<str>) -> Result<(), AppError> {
        self.send(ServerCommand::Broadcast { frame }).await
    }

    pub async fn create_room(&self, name: &str, private: bool) -> Result<RoomHandle, AppError> {
        let (reply, rx) = oneshot::channel();
        self.send(ServerCommand::CreateRoom {
            name: name.to_string(),
            private,
            reply,
        })
        .await?;
        Ok(rx.await?)
    }

    /// Resolve a room by name or create it, as one step of the server loop
    ///
    /// `private` only applies when the room does not exist yet.
    pub async fn find_or_create_room(
        &self,
        name: &str,
        private: bool,
    ) -> Result<RoomHandle, AppError> {
        let (reply, rx) = oneshot::channel();
        self.send(ServerCommand::FindOrCreateRoom {
            name: name.to_string(),
            private,
            reply,
        })
        .await?;
        Ok(rx.await?)
    }

    pub async fn find_room_by_name(&self, name: &str) -> Result<Option<RoomHandle>, AppError> {
        let (reply, rx) = oneshot::channel();
        self.send(ServerCommand::FindRoomByName {
            name: name.to_string(),
            reply,
        })
        .await?;
        Ok(rx.await?)
    }

    pub async fn find_room_by_id(&self, id: RoomId) -> Result<Option<RoomHandle>, AppError> {
        let (reply, rx) = oneshot::channel();
        self.send(ServerCommand::FindRoomById { id, reply }).await?;
        Ok(rx.await?)
    }

    pub async fn find_client_by_id(&self, id: ClientId) -> Result<Option<ClientHandle>, AppError> {
        let (reply, rx) = oneshot::channel();
        self.send(ServerCommand::FindClientById { id, reply }).await?;
        Ok(rx.await?)
    }

    async fn send(&self, cmd: ServerCommand) -> Result<(), AppError> {
        self.sender.send(cmd).await.map_err(|_| AppError::ChannelSend)
    }
}

/// The main ChatServer actor
///
/// Processes one command at a time, which serializes every registry
/// mutation without locks.
pub struct ChatServer {
    /// All connected clients: ClientId -> ClientHandle
    clients: HashMap<ClientId, ClientHandle>,
    /// All rooms ever created: RoomId -> RoomHandle
    rooms: HashMap<RoomId, RoomHandle>,
    /// Command queue capacity for spawned rooms
    room_buffer: usize,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>, room_buffer: usize) -> Self {
        Self {
            clients: HashMap::new(),
            rooms: HashMap::new(),
            room_buffer,
            receiver,
        }
    }

    /// Start the actor on the current runtime and return its handle
    pub fn spawn(config: &Config) -> ServerHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.server_buffer);
        tokio::spawn(Self::new(cmd_rx, config.room_buffer).run());
        ServerHandle::new(cmd_tx)
    }

    /// Run the ChatServer event loop
    ///
    /// Continuously receives and processes commands until all senders are dropped.
    pub async fn run(mut self) {
        info!("ChatServer started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("ChatServer shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Register { client, reply } => {
                let _ = reply.send(self.handle_register(client));
            }
            ServerCommand::Unregister { client_id } => self.handle_unregister(client_id),
            ServerCommand::Broadcast { frame } => self.broadcast_to_clients(&frame),
            ServerCommand::CreateRoom {
                name,
                private,
                reply,
            } => {
                let _ = reply.send(self.create_room(name, private));
            }
            ServerCommand::FindOrCreateRoom {
                name,
                private,
                reply,
            } => {
                let room = match self.find_room_by_name(&name) {
                    Some(room) => room,
                    None => self.create_room(name, private),
                };
                let _ = reply.send(room);
            }
            ServerCommand::FindRoomByName { name, reply } => {
                let _ = reply.send(self.find_room_by_name(&name));
            }
            ServerCommand::FindRoomById { id, reply } => {
                let _ = reply.send(self.rooms.get(&id).cloned());
            }
            ServerCommand::FindClientById { id, reply } => {
                let _ = reply.send(self.clients.get(&id).cloned());
            }
        }
    }

    /// Handle new client registration
    ///
    /// Existing clients hear about the newcomer; the newcomer gets the
    /// list of existing clients back. The list is taken before the insert
    /// so the newcomer is never told about itself.
    fn handle_register(&mut self, client: ClientHandle) -> Vec<ClientInfo> {
        info!("Client {} ({}) registered", client.id, client.name);

        let joined = Message::new(Action::UserJoin).with_sender(Some(client.info()));
        self.broadcast_message(&joined);

        let existing: Vec<ClientInfo> = self.clients.values().map(ClientHandle::info).collect();

        self.clients.insert(client.id, client);
        debug!(
            "Total clients: {}, Total rooms: {}",
            self.clients.len(),
            self.rooms.len()
        );
        existing
    }

    /// Handle client unregistration (no-op if unknown)
    fn handle_unregister(&mut self, client_id: ClientId) {
        let Some(client) = self.clients.get(&client_id) else {
            return;
        };

        info!("Client {} ({}) unregistered", client.id, client.name);

        let left = Message::new(Action::UserLeave).with_sender(Some(client.info()));
        self.broadcast_message(&left);
        self.clients.remove(&client_id);

        debug!(
            "Total clients: {}, Total rooms: {}",
            self.clients.len(),
            self.rooms.len()
        );
    }

    fn create_room(&mut self, name: String, private: bool) -> RoomHandle {
        let (room, handle) = Room::new(name, private, self.room_buffer);
        tokio::spawn(room.run());

        info!(
            "Room {} created ({}, {})",
            handle.id,
            handle.name,
            if private { "private" } else { "public" }
        );

        self.rooms.insert(handle.id, handle.clone());
        handle
    }

    fn find_room_by_name(&self, name: &str) -> Option<RoomHandle> {
        self.rooms.values().find(|room| room.name == name).cloned()
    }

    fn broadcast_message(&self, message: &Message) {
        match message.encode() {
            Ok(frame) => self.broadcast_to_clients(&frame),
            Err(e) => debug!("Failed to encode broadcast: {}", e),
        }
    }

    fn broadcast_to_clients(&self, frame: &Arc<str>) {
        for client in self.clients.values() {
            client.send_frame(frame.clone());
        }
    }
}
