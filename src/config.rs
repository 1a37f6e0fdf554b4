//! Runtime configuration
//!
//! Everything has a default; only the listen address can be overridden
//! from the command line.

use std::time::Duration;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Hub configuration shared by the accept loop and every connection
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address
    pub addr: String,
    /// Capacity of each client's outbound queue
    pub outbound_buffer: usize,
    /// Capacity of the server actor's command queue
    pub server_buffer: usize,
    /// Capacity of each room actor's command queue
    pub room_buffer: usize,
    /// Interval between keepalive pings
    pub ping_period: Duration,
    /// Connection is dropped if nothing arrives for this long
    pub pong_wait: Duration,
    /// Connection is dropped if a single write takes longer than this
    pub write_wait: Duration,
    /// Largest inbound message accepted, in bytes
    pub max_message_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        let pong_wait = Duration::from_secs(60);
        Self {
            addr: DEFAULT_ADDR.to_string(),
            outbound_buffer: 256,
            server_buffer: 256,
            room_buffer: 256,
            // Must be shorter than pong_wait
            ping_period: pong_wait * 9 / 10,
            pong_wait,
            write_wait: Duration::from_secs(10),
            max_message_size: 10_000,
        }
    }
}

impl Config {
    /// Build a config from command line arguments (program name excluded)
    ///
    /// The first argument, if any, is the listen address.
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Self::default();
        if let Some(addr) = args.into_iter().next() {
            config.addr = addr;
        }
        config
    }
}
