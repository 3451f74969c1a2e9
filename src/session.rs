//! Communication session management
//!
//! This module defines the trait for tunneling messages between the room
//! engine and connected clients (host, players, spectators). The tunnel
//! abstraction lets the embedding server pick its own transport (WebSocket,
//! SSE, an in-process channel in tests) while the engine stays agnostic.

use super::{SyncMessage, UpdateMessage};

/// Trait for sending messages through a communication tunnel
///
/// One tunnel corresponds to one live connection. A participant that is
/// disconnected simply has no tunnel; the engine keeps their state and the
/// embedder binds a fresh tunnel on reconnect.
pub trait Tunnel {
    /// Sends an update message to the client
    ///
    /// Update messages notify clients about incremental changes that affect
    /// their current view of the room.
    fn send_message(&self, message: &UpdateMessage);

    /// Sends a state synchronization message to the client
    ///
    /// Sync messages carry a complete, role-scoped rendering of the current
    /// room state. They are sent when a client connects or reconnects; the
    /// client must replace any cached state with their contents.
    fn send_state(&self, state: &SyncMessage);

    /// Closes the communication tunnel
    ///
    /// Called when the engine is done with this connection, e.g. on room
    /// teardown or when a newer connection claims the same identity.
    fn close(self);
}
