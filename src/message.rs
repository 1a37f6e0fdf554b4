//! Message protocol definitions
//!
//! Every frame exchanged with a transport is a single JSON envelope:
//! `{ "action", "message", "target"?, "sender"? }`. Which fields are
//! meaningful depends on the action.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Action tag of a wire envelope
///
/// The first four are client → server commands, the rest are
/// server → client notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    /// Chat text for a room (also used for room system announcements)
    SendMessage,
    /// Join a public room by name
    JoinRoom,
    /// Leave a room by id
    LeaveRoom,
    /// Open a private room with another client by id
    JoinRoomPrivate,
    /// A client came online
    #[serde(alias = "user-joined")]
    UserJoin,
    /// A client went offline
    #[serde(alias = "user-left")]
    UserLeave,
    /// This client is now a member of `target`
    RoomJoined,
}

/// Room reference as it appears on the wire
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomInfo {
    pub id: String,
    pub name: String,
    pub private: bool,
}

/// Client reference as it appears on the wire
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientInfo {
    pub id: String,
    pub name: String,
}

/// Wire envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub action: Action,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<RoomInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<ClientInfo>,
}

impl Message {
    /// Create an envelope with only the action set
    pub fn new(action: Action) -> Self {
        Self {
            action,
            message: String::new(),
            target: None,
            sender: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_target(mut self, target: Option<RoomInfo>) -> Self {
        self.target = target;
        self
    }

    pub fn with_sender(mut self, sender: Option<ClientInfo>) -> Self {
        self.sender = sender;
        self
    }

    /// Decode one inbound frame
    pub fn decode(text: &str) -> Result<Self, AppError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode into a shareable frame
    ///
    /// The same frame is handed to every recipient of a broadcast.
    pub fn encode(&self) -> Result<Arc<str>, AppError> {
        Ok(serde_json::to_string(self)?.into())
    }
}
