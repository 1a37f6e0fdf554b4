//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake with the
//! `name` query parameter, keepalive, and the loop that races inbound
//! frames against the session's outbound queue.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::server::ServerHandle;
use crate::session::ClientSession;

/// Path accepted for the WebSocket upgrade
pub const UPGRADE_PATH: &str = "/ws";

/// Accept connections forever, one task per connection
pub async fn serve(listener: TcpListener, server: ServerHandle, config: Arc<Config>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("New connection from {}", addr);
                let server = server.clone();
                let config = config.clone();

                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, server, config).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Handle a new TCP connection
pub async fn handle_connection(
    stream: TcpStream,
    server: ServerHandle,
    config: Arc<Config>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    handle_stream(stream, peer_addr, server, config).await
}

/// Run one connection over any byte stream
///
/// Performs the WebSocket handshake, registers a session, and runs it
/// until the peer closes, a transport error occurs, or the connection
/// goes idle or stops reading. Session cleanup runs exactly once on every
/// exit path after registration. A rejected handshake is not an error.
async fn handle_stream<S>(
    stream: S,
    peer_addr: String,
    server: ServerHandle,
    config: Arc<Config>,
) -> Result<(), AppError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(config.max_message_size);

    // WebSocket handshake
    let mut name = None;
    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        if req.uri().path() != UPGRADE_PATH {
            return Err(reject(StatusCode::NOT_FOUND, "Not found"));
        }
        match req.uri().query().and_then(|q| query_param(q, "name")) {
            Some(n) if !n.is_empty() => {
                name = Some(n);
                Ok(resp)
            }
            _ => Err(reject(StatusCode::BAD_REQUEST, "Url Param 'name' is missing")),
        }
    };
    let handshake =
        tokio_tungstenite::accept_hdr_async_with_config(stream, callback, Some(ws_config)).await;
    let ws_stream = match handshake {
        Ok(ws_stream) => ws_stream,
        Err(WsError::Http(response)) => {
            debug!(
                "Rejected handshake from {} with {}",
                peer_addr,
                response.status()
            );
            return Ok(());
        }
        Err(e) => {
            debug!("WebSocket handshake with {} failed: {}", peer_addr, e);
            return Ok(());
        }
    };
    let name = name.unwrap_or_default();

    let mut session = ClientSession::new(name.as_str(), server, config.outbound_buffer);
    session.connect().await?;
    let client_id = session.id();
    info!("Client {} ({}) connected from {}", client_id, name, peer_addr);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let mut ping = time::interval_at(Instant::now() + config.ping_period, config.ping_period);
    let idle = time::sleep(config.pong_wait);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            frame = ws_receiver.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        idle.as_mut().reset(Instant::now() + config.pong_wait);
                        session.handle_frame(text.as_str()).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        debug!("Client {} closed the connection", client_id);
                        break;
                    }
                    Some(Ok(_)) => {
                        // Pings, pongs and binary frames only count as activity
                        idle.as_mut().reset(Instant::now() + config.pong_wait);
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", client_id, e);
                        break;
                    }
                }
            }
            event = session.next_event() => {
                let Some(event) = event else {
                    break;
                };
                if let Some(frame) = session.handle_event(event).await {
                    let write = ws_sender.send(WsMessage::Text(frame.to_string().into()));
                    match time::timeout(config.write_wait, write).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            debug!("WebSocket send failed for {}: {}", client_id, e);
                            break;
                        }
                        Err(_) => {
                            info!("Client {} stopped reading, write timed out", client_id);
                            break;
                        }
                    }
                }
            }
            _ = ping.tick() => {
                let write = ws_sender.send(WsMessage::Ping(Default::default()));
                if !matches!(time::timeout(config.write_wait, write).await, Ok(Ok(()))) {
                    debug!("Ping failed for {}", client_id);
                    break;
                }
            }
            _ = &mut idle => {
                info!("Client {} timed out", client_id);
                break;
            }
        }
    }

    session.disconnect().await;
    let _ = time::timeout(config.write_wait, ws_sender.close()).await;

    info!("Client {} disconnected", client_id);

    Ok(())
}

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}

/// First value of `key` in a URL query string, form-urlencoded
fn query_param(query: &str, key: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio_tungstenite::client_async;

    use super::*;
    use crate::client::{ClientEvent, ClientHandle};
    use crate::message::{Action, Message};
    use crate::server::ChatServer;

    async fn next_message(rx: &mut mpsc::Receiver<ClientEvent>) -> Message {
        match time::timeout(Duration::from_secs(2), rx.recv()).await {
            Ok(Some(ClientEvent::Frame(frame))) => Message::decode(&frame).unwrap(),
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejected_handshake_is_not_an_error() {
        let config = Arc::new(Config::default());
        let server = ChatServer::spawn(&config);

        for url in [
            "ws://localhost/ws",
            "ws://localhost/ws?name=",
            "ws://localhost/chat?name=Alice",
        ] {
            let (client_io, server_io) = tokio::io::duplex(4096);
            let conn = tokio::spawn(handle_stream(
                server_io,
                "test".to_string(),
                server.clone(),
                config.clone(),
            ));

            assert!(client_async(url, client_io).await.is_err());
            assert!(conn.await.unwrap().is_ok());
        }
    }

    #[tokio::test]
    async fn test_stalled_reader_is_dropped() {
        let mut config = Config::default();
        config.write_wait = Duration::from_millis(100);
        let config = Arc::new(config);
        let server = ChatServer::spawn(&config);

        let (observer_tx, mut observer_rx) = mpsc::channel(16);
        server
            .register(ClientHandle::new("Observer", observer_tx))
            .await
            .unwrap();

        // Too small to hold even one outbound frame
        let (client_io, server_io) = tokio::io::duplex(64);
        let conn = tokio::spawn(handle_stream(
            server_io,
            "test".to_string(),
            server.clone(),
            config.clone(),
        ));

        // Handshake, then never read again
        let (socket, _) = client_async("ws://localhost/ws?name=Slow", client_io)
            .await
            .unwrap();

        let joined = next_message(&mut observer_rx).await;
        assert_eq!(joined.action, Action::UserJoin);
        assert_eq!(joined.sender.unwrap().name, "Slow");

        // The listing write to Slow cannot complete, so the session goes away
        let left = next_message(&mut observer_rx).await;
        assert_eq!(left.action, Action::UserLeave);
        assert_eq!(left.sender.unwrap().name, "Slow");

        let result = time::timeout(Duration::from_secs(2), conn)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        drop(socket);
    }

    #[test]
    fn test_query_param() {
        assert_eq!(query_param("name=Alice", "name"), Some("Alice".to_string()));
        assert_eq!(
            query_param("room=x&name=Bob&name=Eve", "name"),
            Some("Bob".to_string())
        );
        assert_eq!(query_param("room=x", "name"), None);
        assert_eq!(query_param("name", "name"), Some(String::new()));
    }

    #[test]
    fn test_query_param_decoding() {
        assert_eq!(query_param("name=Jane+Doe", "name"), Some("Jane Doe".to_string()));
        assert_eq!(query_param("name=Jane%20Doe", "name"), Some("Jane Doe".to_string()));
        assert_eq!(query_param("name=caf%C3%A9", "name"), Some("café".to_string()));
        assert_eq!(query_param("name=100%", "name"), Some("100%".to_string()));
        assert_eq!(query_param("name=%zz", "name"), Some("%zz".to_string()));
        // Not a valid escape, so nothing is decoded to a raw byte
        assert_eq!(query_param("name=a%+1b", "name"), Some("a% 1b".to_string()));
    }
}
