//! Basic type definitions for the chat hub
//!
//! Provides newtype wrappers for type safety:
//! - `ClientId`: UUID-based unique client identifier
//! - `RoomId`: UUID-based unique room identifier

use uuid::Uuid;

/// Unique client identifier (newtype pattern)
///
/// Wraps a UUID v4 generated when the connection completes its handshake.
/// Implements Hash and Eq for use as HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Create a new random client ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a client ID from its wire representation
    ///
    /// Only the form produced by `Display` is accepted: lowercase,
    /// hyphenated, no braces, prefix or surrounding whitespace.
    pub fn parse(s: &str) -> Option<Self> {
        parse_canonical(s).map(Self)
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique room identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoomId(pub Uuid);

impl RoomId {
    /// Create a new random room ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a room ID from its wire representation (canonical form only)
    pub fn parse(s: &str) -> Option<Self> {
        parse_canonical(s).map(Self)
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ids are compared as strings on the wire (private room names are built
/// from them), so one id must have exactly one spelling.
fn parse_canonical(s: &str) -> Option<Uuid> {
    Uuid::parse_str(s)
        .ok()
        .filter(|uuid| uuid.hyphenated().to_string() == s)
}
