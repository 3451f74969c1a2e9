//! Participant identity and connection management
//!
//! This module manages the participants of one room: the host, the players,
//! and connections that have not yet picked a name. Every participant is
//! identified by a persistent id that is independent of any transport
//! connection, which is what makes disconnect/reconnect recovery possible:
//! the id survives, the tunnel does not.

use std::{
    collections::{HashMap, HashSet},
    fmt::Display,
    str::FromStr,
};

use enum_map::{Enum, EnumMap};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;
use uuid::Uuid;

use super::{SyncMessage, UpdateMessage, session::Tunnel};

/// A persistent identifier for participants in a room
///
/// Minted when a participant first makes contact and presented again on
/// reconnect to reclaim the same seat. Distinct from whatever id the
/// transport layer gives a connection.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct Id(Uuid);

impl Id {
    /// Creates a new random participant id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for Id {
    /// Creates a new random participant id (same as `new()`)
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Id {
    /// Formats the id as a UUID string
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Id {
    type Err = uuid::Error;

    /// Parses an id from a UUID string
    ///
    /// # Errors
    ///
    /// Returns a `uuid::Error` if the string is not a valid UUID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// The role and state of a participant in a room
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    /// A connection that hasn't been assigned a role yet
    Unassigned,
    /// The room host who controls the round flow
    Host,
    /// A participant with an assigned display name
    Player(String),
}

/// The kind of participant without associated data
///
/// Useful for filtering participants by role without the associated data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum, Serialize, Deserialize)]
pub enum ValueKind {
    /// An unassigned connection
    Unassigned,
    /// A room host
    Host,
    /// A named participant
    Player,
}

impl Value {
    /// Returns the kind of this value without the associated data
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Unassigned => ValueKind::Unassigned,
            Value::Host => ValueKind::Host,
            Value::Player(_) => ValueKind::Player,
        }
    }
}

/// Serialization helper for Watchers struct
#[derive(Deserialize)]
struct WatchersSerde {
    mapping: HashMap<Id, Value>,
}

/// Tracks every participant of one room and their role
///
/// Maintains the primary id-to-role mapping plus a reverse index by role
/// kind for efficient filtering. Whether a participant is *connected* is not
/// stored here; that is answered by the embedder's `tunnel_finder`, which
/// returns a live tunnel only for connected ids.
#[derive(Default, Serialize, Deserialize)]
#[serde(from = "WatchersSerde")]
pub struct Watchers {
    /// Primary mapping from participant id to their role/state
    mapping: HashMap<Id, Value>,

    /// Reverse mapping organized by participant kind for efficient filtering
    #[serde(skip_serializing)]
    reverse_mapping: EnumMap<ValueKind, HashSet<Id>>,
}

impl From<WatchersSerde> for Watchers {
    /// Reconstructs the Watchers struct from serialized data
    ///
    /// Rebuilds the reverse mapping from the primary mapping, which is
    /// necessary since the reverse mapping is not serialized.
    fn from(serde: WatchersSerde) -> Self {
        let WatchersSerde { mapping } = serde;
        let mut reverse_mapping: EnumMap<ValueKind, HashSet<Id>> = EnumMap::default();
        for (id, value) in &mapping {
            reverse_mapping[value.kind()].insert(*id);
        }
        Self {
            mapping,
            reverse_mapping,
        }
    }
}

/// Errors that can occur when managing watchers
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The room has reached the maximum number of allowed participants
    #[error("maximum number of players reached")]
    MaximumPlayers,
}

impl Watchers {
    /// Creates a new Watchers instance with a host already assigned
    pub fn with_host_id(host_id: Id) -> Self {
        Self {
            mapping: {
                let mut map = HashMap::default();
                map.insert(host_id, Value::Host);
                map
            },
            reverse_mapping: {
                let mut map: EnumMap<ValueKind, HashSet<Id>> = EnumMap::default();
                map[ValueKind::Host].insert(host_id);
                map
            },
        }
    }

    /// Gets all participants that currently have a live tunnel
    ///
    /// # Returns
    ///
    /// Vector of (id, tunnel, value) tuples for all connected participants
    pub fn vec<T: Tunnel, F: Fn(Id) -> Option<T>>(&self, tunnel_finder: F) -> Vec<(Id, T, Value)> {
        self.reverse_mapping
            .values()
            .flat_map(|v| v.iter())
            .filter_map(|x| match (tunnel_finder(*x), self.mapping.get(x)) {
                (Some(t), Some(v)) => Some((*x, t, v.to_owned())),
                _ => None,
            })
            .collect_vec()
    }

    /// Gets connected participants of a specific kind
    pub fn specific_vec<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &self,
        filter: ValueKind,
        tunnel_finder: F,
    ) -> Vec<(Id, T, Value)> {
        self.reverse_mapping[filter]
            .iter()
            .filter_map(|x| match (tunnel_finder(*x), self.mapping.get(x)) {
                (Some(t), Some(v)) => Some((*x, t, v.to_owned())),
                _ => None,
            })
            .collect_vec()
    }

    /// Gets the count of participants of a specific kind, connected or not
    pub fn specific_count(&self, filter: ValueKind) -> usize {
        self.reverse_mapping[filter].len()
    }

    /// Adds a new watcher to the room
    ///
    /// # Errors
    ///
    /// Returns `Error::MaximumPlayers` if adding this watcher would exceed
    /// the maximum allowed number of participants.
    pub fn add_watcher(&mut self, watcher_id: Id, watcher_value: Value) -> Result<(), Error> {
        let kind = watcher_value.kind();

        if self.mapping.len() >= crate::constants::room::MAX_PLAYER_COUNT {
            return Err(Error::MaximumPlayers);
        }

        self.mapping.insert(watcher_id, watcher_value);
        self.reverse_mapping[kind].insert(watcher_id);

        Ok(())
    }

    /// Updates the role/state of an existing watcher
    ///
    /// Moves the watcher between kind categories when the role changes.
    pub fn update_watcher_value(&mut self, watcher_id: Id, watcher_value: Value) {
        let old_kind = match self.mapping.get(&watcher_id) {
            Some(v) => v.kind(),
            _ => return,
        };
        let new_kind = watcher_value.kind();
        if old_kind != new_kind {
            self.reverse_mapping[old_kind].remove(&watcher_id);
            self.reverse_mapping[new_kind].insert(watcher_id);
        }
        self.mapping.insert(watcher_id, watcher_value);
    }

    /// Gets the role/state of a specific watcher
    pub fn get_watcher_value(&self, watcher_id: Id) -> Option<Value> {
        self.mapping.get(&watcher_id).map(|v| v.to_owned())
    }

    /// Checks if a watcher exists in the room
    pub fn has_watcher(&self, watcher_id: Id) -> bool {
        self.mapping.contains_key(&watcher_id)
    }

    /// Checks if a watcher has a live connection
    pub fn is_alive<T: Tunnel, F: Fn(Id) -> Option<T>>(watcher_id: Id, tunnel_finder: F) -> bool {
        tunnel_finder(watcher_id).is_some()
    }

    /// Closes a watcher's tunnel if one is live
    pub fn remove_watcher_session<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        watcher_id: &Id,
        tunnel_finder: F,
    ) {
        if let Some(x) = tunnel_finder(*watcher_id) {
            x.close();
        }
    }

    /// Sends an update message to a specific watcher
    ///
    /// Silently skipped if the watcher has no live tunnel; authoritative
    /// state is unaffected and the watcher catches up on reconnect.
    pub fn send_message<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &self,
        message: &UpdateMessage,
        watcher_id: Id,
        tunnel_finder: F,
    ) {
        let Some(session) = tunnel_finder(watcher_id) else {
            return;
        };

        session.send_message(message);
    }

    /// Sends a state synchronization message to a specific watcher
    pub fn send_state<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &self,
        message: &SyncMessage,
        watcher_id: Id,
        tunnel_finder: F,
    ) {
        let Some(session) = tunnel_finder(watcher_id) else {
            return;
        };

        session.send_state(message);
    }

    /// Gets the display name of a watcher
    ///
    /// Only named participants have one; hosts and unassigned connections
    /// return `None`.
    pub fn get_name(&self, watcher_id: Id) -> Option<String> {
        self.get_watcher_value(watcher_id).and_then(|v| match v {
            Value::Player(name) => Some(name),
            _ => None,
        })
    }

    /// Sends personalized messages to all connected watchers
    ///
    /// The sender function is called per watcher and can return a different
    /// message based on the watcher's id and kind, or `None` to skip.
    pub fn announce_with<S, T: Tunnel, F: Fn(Id) -> Option<T>>(&self, sender: S, tunnel_finder: F)
    where
        S: Fn(Id, ValueKind) -> Option<super::UpdateMessage>,
    {
        for (watcher, session, v) in self.vec(tunnel_finder) {
            let Some(message) = sender(watcher, v.kind()) else {
                continue;
            };

            session.send_message(&message);
        }
    }

    /// Broadcasts an update message to all watchers except unassigned ones
    pub fn announce<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &self,
        message: &super::UpdateMessage,
        tunnel_finder: F,
    ) {
        self.announce_with(
            |_, value_kind| {
                if matches!(value_kind, ValueKind::Unassigned) {
                    None
                } else {
                    Some(message.to_owned())
                }
            },
            tunnel_finder,
        );
    }

    /// Sends an update message to all connected watchers of a specific kind
    pub fn announce_specific<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &self,
        filter: ValueKind,
        message: &super::UpdateMessage,
        tunnel_finder: F,
    ) {
        for (_, session, _) in self.specific_vec(filter, tunnel_finder) {
            session.send_message(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_round_trips_through_strings() {
        let id = Id::new();
        let parsed = Id::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_with_host_id_registers_host() {
        let host = Id::new();
        let watchers = Watchers::with_host_id(host);

        assert!(watchers.has_watcher(host));
        assert_eq!(watchers.get_watcher_value(host), Some(Value::Host));
        assert_eq!(watchers.specific_count(ValueKind::Host), 1);
    }

    #[test]
    fn test_update_watcher_value_moves_kinds() {
        let host = Id::new();
        let mut watchers = Watchers::with_host_id(host);

        let joiner = Id::new();
        watchers.add_watcher(joiner, Value::Unassigned).unwrap();
        assert_eq!(watchers.specific_count(ValueKind::Unassigned), 1);

        watchers.update_watcher_value(joiner, Value::Player("Ada".to_owned()));
        assert_eq!(watchers.specific_count(ValueKind::Unassigned), 0);
        assert_eq!(watchers.specific_count(ValueKind::Player), 1);
        assert_eq!(watchers.get_name(joiner), Some("Ada".to_owned()));
    }

    #[test]
    fn test_max_player_bound() {
        let mut watchers = Watchers::with_host_id(Id::new());

        for _ in 1..crate::constants::room::MAX_PLAYER_COUNT {
            watchers.add_watcher(Id::new(), Value::Unassigned).unwrap();
        }

        assert_eq!(
            watchers.add_watcher(Id::new(), Value::Unassigned),
            Err(Error::MaximumPlayers)
        );
    }

    #[test]
    fn test_serde_rebuilds_reverse_mapping() {
        let host = Id::new();
        let mut watchers = Watchers::with_host_id(host);
        let player = Id::new();
        watchers
            .add_watcher(player, Value::Player("Ada".to_owned()))
            .unwrap();

        let serialized = serde_json::to_string(&watchers).unwrap();
        let deserialized: Watchers = serde_json::from_str(&serialized).unwrap();

        assert_eq!(deserialized.specific_count(ValueKind::Host), 1);
        assert_eq!(deserialized.specific_count(ValueKind::Player), 1);
        assert_eq!(deserialized.get_name(player), Some("Ada".to_owned()));
    }
}
