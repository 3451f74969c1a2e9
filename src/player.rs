//! Player roster: lives, streaks, and roles
//!
//! The roster is the authoritative record of every named participant's
//! gameplay state. It owns the life counter and the elimination rules;
//! points live in the score history (see [`crate::recap`]) so that the two
//! concerns can be reversed independently when the host corrects a verdict.

use std::collections::HashMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use web_time::SystemTime;

use super::watcher::Id;

/// What part a participant currently plays in the game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Competing: submits answers, loses lives, can win
    Active,
    /// Watching only; never submits or votes (e.g. joined mid-game)
    Spectator,
    /// Out of lives; retained so a host correction can bring them back
    Eliminated,
}

/// Gameplay state for one named participant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerState {
    /// Remaining lives; zero means eliminated
    pub lives: u8,
    /// Consecutive correct answers, feeding the score multiplier
    pub streak: u32,
    /// Current role
    pub role: Role,
    /// When the participant's connection dropped, if currently offline
    pub disconnected_since: Option<SystemTime>,
}

/// Result of charging a life for an incorrect answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifeCharge {
    /// Whether a life was actually deducted
    pub life_lost: bool,
    /// Whether this deduction was the one that eliminated the player
    pub eliminated: bool,
}

/// The authoritative per-room record of player gameplay state
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Roster {
    mapping: HashMap<Id, PlayerState>,
}

impl Roster {
    /// Adds a competing player with the given number of starting lives
    pub fn add_active(&mut self, id: Id, lives: u8) {
        self.mapping.insert(
            id,
            PlayerState {
                lives,
                streak: 0,
                role: Role::Active,
                disconnected_since: None,
            },
        );
    }

    /// Adds a watching-only participant
    pub fn add_spectator(&mut self, id: Id) {
        self.mapping.insert(
            id,
            PlayerState {
                lives: 0,
                streak: 0,
                role: Role::Spectator,
                disconnected_since: None,
            },
        );
    }

    /// Gets the state of a participant
    pub fn get(&self, id: Id) -> Option<&PlayerState> {
        self.mapping.get(&id)
    }

    /// Gets the role of a participant
    pub fn role(&self, id: Id) -> Option<Role> {
        self.mapping.get(&id).map(|p| p.role)
    }

    /// All participants in the roster
    pub fn ids(&self) -> Vec<Id> {
        self.mapping.keys().copied().collect_vec()
    }

    /// Ids of all competing players
    pub fn active_ids(&self) -> Vec<Id> {
        self.mapping
            .iter()
            .filter(|(_, p)| p.role == Role::Active)
            .map(|(id, _)| *id)
            .collect_vec()
    }

    /// Number of competing players
    pub fn active_count(&self) -> usize {
        self.mapping
            .values()
            .filter(|p| p.role == Role::Active)
            .count()
    }

    /// The one remaining competitor, if the field has narrowed to exactly one
    pub fn sole_active(&self) -> Option<Id> {
        let mut actives = self
            .mapping
            .iter()
            .filter(|(_, p)| p.role == Role::Active)
            .map(|(id, _)| *id);
        match (actives.next(), actives.next()) {
            (Some(id), None) => Some(id),
            _ => None,
        }
    }

    /// Records a correct answer: extends the streak
    ///
    /// # Returns
    ///
    /// The streak length including this answer, or `None` for unknown ids.
    pub fn record_correct(&mut self, id: Id) -> Option<u32> {
        let player = self.mapping.get_mut(&id)?;
        player.streak += 1;
        Some(player.streak)
    }

    /// Records an incorrect answer: resets the streak and charges a life
    ///
    /// A player whose last life is charged flips to [`Role::Eliminated`].
    /// Players who are not active lose nothing.
    pub fn record_incorrect(&mut self, id: Id) -> LifeCharge {
        let Some(player) = self.mapping.get_mut(&id) else {
            return LifeCharge {
                life_lost: false,
                eliminated: false,
            };
        };

        player.streak = 0;

        if player.role != Role::Active || player.lives == 0 {
            return LifeCharge {
                life_lost: false,
                eliminated: false,
            };
        }

        player.lives -= 1;
        let eliminated = player.lives == 0;
        if eliminated {
            player.role = Role::Eliminated;
        }

        LifeCharge {
            life_lost: true,
            eliminated,
        }
    }

    /// Records a round that passed without a submission: the streak breaks
    pub fn record_unanswered(&mut self, id: Id) {
        if let Some(player) = self.mapping.get_mut(&id) {
            player.streak = 0;
        }
    }

    /// Reverses a previously recorded verdict ahead of a host correction
    ///
    /// Restores the streak to its value before the answer was evaluated,
    /// refunds a charged life, and un-eliminates the player iff the
    /// reversed charge was the eliminating one.
    pub fn reverse_evaluation(&mut self, id: Id, streak_before: u32, charge: LifeCharge) {
        let Some(player) = self.mapping.get_mut(&id) else {
            return;
        };

        player.streak = streak_before;
        if charge.life_lost {
            player.lives += 1;
        }
        if charge.eliminated && player.role == Role::Eliminated {
            player.role = Role::Active;
        }
    }

    /// Marks a participant as offline from the given instant
    pub fn mark_disconnected(&mut self, id: Id, now: SystemTime) {
        if let Some(player) = self.mapping.get_mut(&id) {
            player.disconnected_since = Some(now);
        }
    }

    /// Marks a participant as back online
    pub fn mark_connected(&mut self, id: Id) {
        if let Some(player) = self.mapping.get_mut(&id) {
            player.disconnected_since = None;
        }
    }

    /// Resets every participant for a fresh game in the same room
    ///
    /// Spectators who joined mid-game become competitors in the new game.
    pub fn reset_for_restart(&mut self, lives: u8) {
        for player in self.mapping.values_mut() {
            player.lives = lives;
            player.streak = 0;
            player.role = Role::Active;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_life_charge_and_elimination() {
        let mut roster = Roster::default();
        let id = Id::new();
        roster.add_active(id, 2);

        let first = roster.record_incorrect(id);
        assert_eq!(
            first,
            LifeCharge {
                life_lost: true,
                eliminated: false
            }
        );
        assert_eq!(roster.get(id).unwrap().lives, 1);

        let second = roster.record_incorrect(id);
        assert_eq!(
            second,
            LifeCharge {
                life_lost: true,
                eliminated: true
            }
        );
        assert_eq!(roster.role(id), Some(Role::Eliminated));

        // Once eliminated, further incorrect answers charge nothing
        let third = roster.record_incorrect(id);
        assert_eq!(
            third,
            LifeCharge {
                life_lost: false,
                eliminated: false
            }
        );
    }

    #[test]
    fn test_streak_grows_and_breaks() {
        let mut roster = Roster::default();
        let id = Id::new();
        roster.add_active(id, 3);

        assert_eq!(roster.record_correct(id), Some(1));
        assert_eq!(roster.record_correct(id), Some(2));

        roster.record_incorrect(id);
        assert_eq!(roster.get(id).unwrap().streak, 0);

        assert_eq!(roster.record_correct(id), Some(1));
        roster.record_unanswered(id);
        assert_eq!(roster.get(id).unwrap().streak, 0);
    }

    #[test]
    fn test_reverse_evaluation_restores_life_and_role() {
        let mut roster = Roster::default();
        let id = Id::new();
        roster.add_active(id, 1);

        let charge = roster.record_incorrect(id);
        assert_eq!(roster.role(id), Some(Role::Eliminated));

        roster.reverse_evaluation(id, 2, charge);
        let player = roster.get(id).unwrap();
        assert_eq!(player.lives, 1);
        assert_eq!(player.streak, 2);
        assert_eq!(player.role, Role::Active);
    }

    #[test]
    fn test_reverse_evaluation_without_elimination_keeps_role() {
        let mut roster = Roster::default();
        let id = Id::new();
        roster.add_active(id, 3);

        let charge = roster.record_incorrect(id);
        roster.reverse_evaluation(id, 1, charge);

        let player = roster.get(id).unwrap();
        assert_eq!(player.lives, 3);
        assert_eq!(player.role, Role::Active);
    }

    #[test]
    fn test_sole_active_detection() {
        let mut roster = Roster::default();
        let a = Id::new();
        let b = Id::new();
        roster.add_active(a, 1);
        roster.add_active(b, 1);

        assert_eq!(roster.sole_active(), None);

        roster.record_incorrect(a);
        assert_eq!(roster.sole_active(), Some(b));

        roster.record_incorrect(b);
        assert_eq!(roster.sole_active(), None);
    }

    #[test]
    fn test_spectators_do_not_compete() {
        let mut roster = Roster::default();
        let player = Id::new();
        let watcher = Id::new();
        roster.add_active(player, 3);
        roster.add_spectator(watcher);

        assert_eq!(roster.active_count(), 1);
        assert_eq!(roster.active_ids(), vec![player]);

        let charge = roster.record_incorrect(watcher);
        assert!(!charge.life_lost);
    }

    #[test]
    fn test_restart_resets_everyone_to_active() {
        let mut roster = Roster::default();
        let a = Id::new();
        let b = Id::new();
        roster.add_active(a, 1);
        roster.add_spectator(b);

        roster.record_incorrect(a);
        assert_eq!(roster.role(a), Some(Role::Eliminated));

        roster.reset_for_restart(3);
        assert_eq!(roster.role(a), Some(Role::Active));
        assert_eq!(roster.role(b), Some(Role::Active));
        assert_eq!(roster.get(a).unwrap().lives, 3);
        assert_eq!(roster.get(a).unwrap().streak, 0);
    }
}
