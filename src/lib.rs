//! WebSocket Chat Hub Library
//!
//! A real-time message-fanout hub built with tokio-tungstenite using the
//! Actor pattern for state management.
//!
//! # Features
//! - WebSocket connections identified by a display name (`/ws?name=...`)
//! - Online user list (`user-join` / `user-leave` notifications)
//! - Public rooms joined by name, created on first join
//! - Private 1:1 rooms between two connected clients
//! - Room-scoped message broadcast
//! - Keepalive pings and idle disconnect
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` owns the registry of clients and rooms
//! - Each `Room` runs as its own actor and owns its membership
//! - Each connection runs a `ClientSession` that owns its joined rooms
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use chat_hub::{serve, ChatServer, Config};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Arc::new(Config::default());
//!     let listener = TcpListener::bind(&config.addr).await.unwrap();
//!     let server = ChatServer::spawn(&config);
//!     serve(listener, server, config).await;
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod room;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use client::{ClientEvent, ClientHandle};
pub use config::Config;
pub use error::{AppError, SendError};
pub use handler::{handle_connection, serve};
pub use message::{Action, ClientInfo, Message, RoomInfo};
pub use room::{Room, RoomCommand, RoomHandle};
pub use server::{ChatServer, ServerCommand, ServerHandle};
pub use session::ClientSession;
pub use types::{ClientId, RoomId};
