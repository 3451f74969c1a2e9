//! The table of active rooms
//!
//! One registry owns every active room in the process. The table lock is
//! deliberately narrow: it is taken only to insert, look up, or remove a
//! room entry, never across gameplay. Each room sits behind its own mutex,
//! which is what serializes events per room: one event holds the room for
//! the duration of its processing while other rooms proceed in parallel.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use thiserror::Error as ThisError;
use web_time::SystemTime;

use crate::{
    game::{CloseReason, Room},
    room_code::RoomCode,
    session::Tunnel,
    watcher::Id,
};

/// Errors from room-table operations
#[derive(ThisError, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The code does not belong to any active room
    #[error("room not found")]
    NotFound,
    /// Code generation kept colliding with active rooms
    #[error("no unused room code available")]
    CodesExhausted,
}

/// The set of active rooms, keyed by their join codes
#[derive(Default)]
pub struct Registry {
    rooms: RwLock<HashMap<RoomCode, Arc<Mutex<Room>>>>,
}

impl Registry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a room with a freshly generated, collision-checked code
    ///
    /// # Errors
    ///
    /// Returns [`Error::CodesExhausted`] if no unused code was found after
    /// the configured number of attempts (only plausible with a nearly full
    /// code space).
    pub fn create_room(&self, host_id: Id) -> Result<RoomCode, Error> {
        let mut rooms = self
            .rooms
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        for _ in 0..crate::constants::room::CODE_ATTEMPTS {
            let code = RoomCode::new();
            if let std::collections::hash_map::Entry::Vacant(entry) = rooms.entry(code) {
                entry.insert(Arc::new(Mutex::new(Room::new(code, host_id))));
                return Ok(code);
            }
        }

        Err(Error::CodesExhausted)
    }

    /// Looks up an active room by code
    ///
    /// The returned handle is the room's own lock; callers hold it for
    /// exactly one event's processing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for unknown codes.
    pub fn get(&self, code: RoomCode) -> Result<Arc<Mutex<Room>>, Error> {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&code)
            .cloned()
            .ok_or(Error::NotFound)
    }

    /// Removes a room from the table
    ///
    /// The room itself is returned so the caller can finish notifying
    /// members if it hasn't already.
    pub fn remove(&self, code: RoomCode) -> Option<Arc<Mutex<Room>>> {
        self.rooms
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&code)
    }

    /// Number of active rooms
    pub fn len(&self) -> usize {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no rooms are active
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes and removes rooms whose host stayed away past the grace window
    ///
    /// Rooms are examined outside the table lock so a sweep never stalls
    /// gameplay in unrelated rooms. Every member of a closing room is
    /// notified before their tunnel closes.
    ///
    /// # Returns
    ///
    /// The codes of the rooms that were torn down.
    pub fn sweep<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &self,
        now: SystemTime,
        tunnel_finder: F,
    ) -> Vec<RoomCode> {
        let snapshot: Vec<(RoomCode, Arc<Mutex<Room>>)> = self
            .rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(code, room)| (*code, Arc::clone(room)))
            .collect();

        let mut torn_down = Vec::new();
        for (code, room) in snapshot {
            let mut room = room.lock().unwrap_or_else(PoisonError::into_inner);
            if room.host_abandoned(now) {
                room.close(CloseReason::HostAbandoned, &tunnel_finder);
                torn_down.push(code);
            }
        }

        let mut rooms = self
            .rooms
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for code in &torn_down {
            rooms.remove(code);
        }

        torn_down
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use web_time::Duration;

    #[derive(Debug, Clone)]
    struct NullTunnel;

    impl Tunnel for NullTunnel {
        fn send_message(&self, _message: &crate::UpdateMessage) {}

        fn send_state(&self, _state: &crate::SyncMessage) {}

        fn close(self) {}
    }

    fn no_tunnels(_id: Id) -> Option<NullTunnel> {
        None
    }

    #[test]
    fn test_create_get_remove() {
        let registry = Registry::new();
        let code = registry.create_room(Id::new()).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.get(code).is_ok());

        registry.remove(code);
        assert!(registry.is_empty());
        assert!(matches!(registry.get(code), Err(Error::NotFound)));
    }

    #[test]
    fn test_codes_are_unique_among_active_rooms() {
        let registry = Registry::new();
        let mut codes = std::collections::HashSet::new();

        for _ in 0..50 {
            let code = registry.create_room(Id::new()).unwrap();
            assert!(codes.insert(code), "registry issued a duplicate code");
        }
    }

    #[test]
    fn test_sweep_removes_abandoned_rooms_only() {
        let registry = Registry::new();
        let abandoned_host = Id::new();
        let abandoned = registry.create_room(abandoned_host).unwrap();
        let healthy = registry.create_room(Id::new()).unwrap();

        let t0 = SystemTime::now();
        registry
            .get(abandoned)
            .unwrap()
            .lock()
            .unwrap()
            .handle_disconnect(abandoned_host, t0);

        // Within the grace window nothing happens
        let torn_down = registry.sweep(t0 + Duration::from_secs(10), no_tunnels);
        assert!(torn_down.is_empty());
        assert_eq!(registry.len(), 2);

        // Past the window, only the abandoned room goes
        let torn_down = registry.sweep(
            t0 + Duration::from_secs(crate::constants::room::HOST_GRACE_SECONDS),
            no_tunnels,
        );
        assert_eq!(torn_down, vec![abandoned]);
        assert!(matches!(registry.get(abandoned), Err(Error::NotFound)));
        assert!(registry.get(healthy).is_ok());
    }

    #[test]
    fn test_reclaim_within_grace_prevents_teardown() {
        let registry = Registry::new();
        let host = Id::new();
        let code = registry.create_room(host).unwrap();

        let t0 = SystemTime::now();
        {
            let room = registry.get(code).unwrap();
            let mut room = room.lock().unwrap();
            room.handle_disconnect(host, t0);
            assert!(room.claim_id(host, no_tunnels));
        }

        let torn_down = registry.sweep(
            t0 + Duration::from_secs(crate::constants::room::HOST_GRACE_SECONDS * 2),
            no_tunnels,
        );
        assert!(torn_down.is_empty());
    }
}
