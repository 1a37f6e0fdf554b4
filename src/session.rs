//! Client session
//!
//! One per connection. The session owns the set of rooms its client has
//! joined, turns decoded frames into server and room commands, and hands
//! outbound frames back to the transport.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::{ClientEvent, ClientHandle};
use crate::error::{AppError, SendError};
use crate::message::{Action, Message};
use crate::room::RoomHandle;
use crate::server::ServerHandle;
use crate::types::{ClientId, RoomId};

/// Per-connection state machine
pub struct ClientSession {
    client: ClientHandle,
    server: ServerHandle,
    /// Rooms this client has joined
    rooms: HashMap<RoomId, RoomHandle>,
    /// Outbound queue (receiving half)
    events: mpsc::Receiver<ClientEvent>,
    /// Frames addressed to this client by the session itself; sent ahead
    /// of the outbound queue and never dropped
    pending: VecDeque<Arc<str>>,
}

impl ClientSession {
    /// Create a session for a freshly handshaken connection
    ///
    /// The session is not known to the server until `connect` is called.
    pub fn new(name: impl Into<Arc<str>>, server: ServerHandle, buffer: usize) -> Self {
        let (tx, events) = mpsc::channel(buffer);
        Self {
            client: ClientHandle::new(name, tx),
            server,
            rooms: HashMap::new(),
            events,
            pending: VecDeque::new(),
        }
    }

    /// Register this client with the server
    ///
    /// Queues one `user-join` per client that was already connected.
    pub async fn connect(&mut self) -> Result<(), AppError> {
        let existing = self.server.register(self.client.clone()).await?;
        for info in existing {
            self.queue_message(&Message::new(Action::UserJoin).with_sender(Some(info)));
        }
        Ok(())
    }

    pub fn id(&self) -> ClientId {
        self.client.id
    }

    /// IDs of the rooms this client is a member of
    pub fn joined_rooms(&self) -> impl Iterator<Item = &RoomId> {
        self.rooms.keys()
    }

    /// Wait for the next item on the outbound queue
    ///
    /// Cancel safe: a frame taken from the session's own backlog is
    /// returned on the same poll.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        if let Some(frame) = self.pending.pop_front() {
            return Some(ClientEvent::Frame(frame));
        }
        self.events.recv().await
    }

    /// Process an outbound queue item
    ///
    /// Returns the frame to write to the transport, if any.
    pub async fn handle_event(&mut self, event: ClientEvent) -> Option<Arc<str>> {
        match event {
            ClientEvent::Frame(frame) => Some(frame),
            ClientEvent::JoinPrivate {
                room_name,
                counterpart,
            } => {
                if let Err(e) = self.join_room(&room_name, Some(counterpart)).await {
                    warn!("Private join for {} failed: {}", self.client.id, e);
                }
                None
            }
        }
    }

    /// Handle one inbound text frame
    ///
    /// Never fails: undecodable frames and failed commands are logged and
    /// dropped.
    pub async fn handle_frame(&mut self, text: &str) {
        let message = match Message::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Invalid frame from {}: {}", self.client.id, e);
                return;
            }
        };

        let action = message.action;
        if let Err(e) = self.handle_message(message).await {
            warn!("{:?} from {} failed: {}", action, self.client.id, e);
        }
    }

    async fn handle_message(&mut self, message: Message) -> Result<(), AppError> {
        match message.action {
            Action::SendMessage => self.handle_send_message(message).await,
            Action::JoinRoom => self.join_room(&message.message, None).await,
            Action::LeaveRoom => self.handle_leave_room(&message.message).await,
            Action::JoinRoomPrivate => self.handle_join_room_private(&message.message).await,
            Action::UserJoin | Action::UserLeave | Action::RoomJoined => {
                debug!(
                    "Ignoring {:?} sent by client {}",
                    message.action, self.client.id
                );
                Ok(())
            }
        }
    }

    async fn handle_send_message(&mut self, mut message: Message) -> Result<(), AppError> {
        let Some(room_id) = message
            .target
            .as_ref()
            .and_then(|target| RoomId::parse(&target.id))
        else {
            debug!("send-message from {} without a valid target", self.client.id);
            return Ok(());
        };

        let Some(room) = self.server.find_room_by_id(room_id).await? else {
            debug!("send-message from {} to unknown room {}", self.client.id, room_id);
            return Ok(());
        };

        message.sender = Some(self.client.info());
        room.broadcast(message).await
    }

    async fn handle_leave_room(&mut self, room_id: &str) -> Result<(), AppError> {
        let Some(room_id) = RoomId::parse(room_id) else {
            return Ok(());
        };
        let Some(room) = self.server.find_room_by_id(room_id).await? else {
            return Ok(());
        };

        if self.rooms.remove(&room.id).is_some() {
            info!("Client {} leaving room {}", self.client.id, room.name);
            room.leave(self.client.id).await?;
        }
        Ok(())
    }

    async fn handle_join_room_private(&mut self, target_id: &str) -> Result<(), AppError> {
        let Some(target_id) = ClientId::parse(target_id) else {
            return Ok(());
        };
        let Some(target) = self.server.find_client_by_id(target_id).await? else {
            debug!("Private join target {} not found", target_id);
            return Ok(());
        };

        let room_name = format!("{}{}", target.id, self.client.id);
        self.join_room(&room_name, Some(target.clone())).await?;

        let invite = ClientEvent::JoinPrivate {
            room_name,
            counterpart: self.client.clone(),
        };
        match target.deliver(invite) {
            Ok(()) => {}
            Err(SendError::QueueFull) => {
                warn!("Outbound queue full for {}, private join dropped", target.id);
            }
            Err(SendError::ChannelClosed) => {
                debug!("Private join target {} already gone", target.id);
            }
        }
        Ok(())
    }

    /// Join routine shared by public and private joins
    ///
    /// A counterpart marks the join as private: the room is created
    /// private if missing, and the counterpart is reported as the sender
    /// of the `room-joined` notification.
    async fn join_room(
        &mut self,
        room_name: &str,
        counterpart: Option<ClientHandle>,
    ) -> Result<(), AppError> {
        let room = self
            .server
            .find_or_create_room(room_name, counterpart.is_some())
            .await?;

        if counterpart.is_none() && room.private {
            debug!(
                "Client {} refused public join of private room {}",
                self.client.id, room.id
            );
            return Ok(());
        }

        if self.rooms.contains_key(&room.id) {
            return Ok(());
        }

        self.rooms.insert(room.id, room.clone());
        room.join(self.client.clone()).await?;

        let joined = Message::new(Action::RoomJoined)
            .with_target(Some(room.info()))
            .with_sender(counterpart.map(|c| c.info()));
        self.queue_message(&joined);
        Ok(())
    }

    fn queue_message(&mut self, message: &Message) {
        match message.encode() {
            Ok(frame) => self.pending.push_back(frame),
            Err(e) => debug!("Failed to encode message for {}: {}", self.client.id, e),
        }
    }

    /// Tear the session down
    ///
    /// Consumes the session, so cleanup runs at most once.
    pub async fn disconnect(mut self) {
        if let Err(e) = self.server.unregister(self.client.id).await {
            debug!("Unregister of {} failed: {}", self.client.id, e);
        }

        for room in self.rooms.values() {
            if let Err(e) = room.leave(self.client.id).await {
                debug!("Leave of room {} failed: {}", room.id, e);
            }
        }
        self.rooms.clear();

        self.pending.clear();
        self.events.close();
        info!("Client {} ({}) session closed", self.client.id, self.client.name);
    }
}
