//! # Quizroom Game Library
//!
//! This library provides the authoritative backend engine for a live,
//! classroom-style quiz game: rooms joined by short codes, a host driving
//! timed question rounds, players answering with text and drawings,
//! host-graded or community-voted evaluation, lives and score tracking,
//! and a navigable post-game recap. The embedding server supplies the
//! transport (one [`session::Tunnel`] per connection) and a timer; the
//! engine owns every piece of game state and keeps all connected clients
//! synchronized, including across disconnects.

#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::ignored_unit_patterns)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::wildcard_imports)]
use derive_where::derive_where;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

pub mod constants;

pub mod game;
pub mod names;
pub mod player;
pub mod question;
pub mod recap;
pub mod registry;
pub mod room_code;
pub mod round;
pub mod score;
pub mod session;
pub mod watcher;

/// Messages sent to synchronize a client's state with the room
///
/// A sync message is a complete, role-scoped rendering of the current
/// state. It is pushed when a client connects or reconnects and must
/// replace whatever the client had cached.
#[derive(Debug, Serialize, Clone, derive_more::From)]
pub enum SyncMessage {
    /// Room-level synchronization (lobby, conclusion, recap, metadata)
    Game(game::SyncMessage),
    /// Current-round synchronization (question, evaluation, results)
    Round(round::SyncMessage),
}

impl SyncMessage {
    /// Converts the sync message to a JSON string for transmission
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}

/// Messages sent to update specific aspects of a client's view
///
/// Update messages notify clients about incremental changes: a new
/// question, a submitted answer count, a verdict, fresh standings.
#[derive(Debug, Serialize, Clone, derive_more::From)]
pub enum UpdateMessage {
    /// Room-level updates (roster, errors, conclusion, recap pages)
    Game(game::UpdateMessage),
    /// Current-round updates (announcements, previews, verdicts)
    Round(round::UpdateMessage),
}

impl UpdateMessage {
    /// Converts the update message to a JSON string for transmission
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}

/// Alarm messages for timed events
///
/// Scheduled through the embedder's timer and delivered back into the
/// owning room through [`game::Room::receive_alarm`], on the same
/// serialized path as client events.
#[derive(Debug, Clone, derive_more::From, Serialize, Deserialize)]
pub enum AlarmMessage {
    /// Round deadline alarms
    Round(round::AlarmMessage),
}

/// A truncated vector that maintains the exact count while limiting items
///
/// Useful for displaying a bounded number of items while still showing the
/// total, e.g. "87 players" with only the first 50 names listed.
#[derive(Debug, Clone, Serialize)]
#[derive_where(Default)]
pub struct TruncatedVec<T> {
    /// The exact total count of items
    exact_count: usize,
    /// The truncated list of items (up to the limit)
    items: Vec<T>,
}

impl<T: Clone> TruncatedVec<T> {
    /// Creates a new truncated vector from an iterator
    ///
    /// # Arguments
    ///
    /// * `list` - An iterator over items to include
    /// * `limit` - Maximum number of items kept
    /// * `exact_count` - The exact total count (may exceed the limit)
    pub fn new<I: Iterator<Item = T>>(list: I, limit: usize, exact_count: usize) -> Self {
        let items = list.take(limit).collect_vec();
        Self { exact_count, items }
    }

    /// Maps a function over the kept items
    pub fn map<F, U>(self, f: F) -> TruncatedVec<U>
    where
        F: Fn(T) -> U,
    {
        TruncatedVec {
            exact_count: self.exact_count,
            items: self.items.into_iter().map(f).collect_vec(),
        }
    }

    /// Returns the exact count of items
    pub fn exact_count(&self) -> usize {
        self.exact_count
    }

    /// Returns the kept items
    pub fn items(&self) -> &[T] {
        &self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_vec_new() {
        let data = vec![1, 2, 3, 4, 5];
        let truncated = TruncatedVec::new(data.into_iter(), 3, 5);

        assert_eq!(truncated.exact_count(), 5);
        assert_eq!(truncated.items(), &[1, 2, 3]);
    }

    #[test]
    fn test_truncated_vec_new_limit_larger_than_items() {
        let data = vec![1, 2, 3];
        let truncated = TruncatedVec::new(data.into_iter(), 5, 3);

        assert_eq!(truncated.exact_count(), 3);
        assert_eq!(truncated.items(), &[1, 2, 3]);
    }

    #[test]
    fn test_truncated_vec_map() {
        let data = vec![1, 2, 3];
        let truncated = TruncatedVec::new(data.into_iter(), 3, 5);
        let mapped = truncated.map(|x| x * 2);

        assert_eq!(mapped.exact_count(), 5);
        assert_eq!(mapped.items(), &[2, 4, 6]);
    }

    #[test]
    fn test_sync_message_to_message() {
        let players = TruncatedVec::new(
            vec!["Ada".to_string(), "Grace".to_string()].into_iter(),
            10,
            2,
        );
        let sync_msg = SyncMessage::Game(game::SyncMessage::WaitingScreen(players));
        let json_str = sync_msg.to_message();

        assert!(json_str.contains("Game"));
        assert!(json_str.contains("WaitingScreen"));
    }

    #[test]
    fn test_update_message_to_message() {
        let players = TruncatedVec::new(vec!["Ada".to_string()].into_iter(), 10, 1);
        let update_msg = UpdateMessage::Game(game::UpdateMessage::WaitingScreen(players));
        let json_str = update_msg.to_message();

        assert!(json_str.contains("Game"));
        assert!(json_str.contains("WaitingScreen"));
        assert!(json_str.contains("Ada"));
    }
}
