//! WebSocket Chat Hub - Entry Point
//!
//! Starts the TCP listener and ChatServer actor, accepting connections.

use std::env;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chat_hub::{serve, ChatServer, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_hub=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_hub=info")),
        )
        .init();

    // Bind address from command line or default
    let config = Arc::new(Config::from_args(env::args().skip(1)));

    // Start TCP listener
    let listener = TcpListener::bind(&config.addr).await?;
    info!("WebSocket Chat Hub listening on ws://{}/ws", config.addr);

    // Start ChatServer actor
    let server = ChatServer::spawn(&config);
    info!("ChatServer actor started");

    serve(listener, server, config).await;

    Ok(())
}
