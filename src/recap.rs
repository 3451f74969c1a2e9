//! Score history, standings, and the post-game recap
//!
//! This module tracks the points earned by every player across rounds,
//! maintains sorted standings with a previous-round comparison, and builds
//! the immutable round-by-round recap shown after the game concludes. Recap
//! navigation is room state: the host's selected round is stored here so
//! every viewer stays on the same page.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::{TruncatedVec, question::Question, round::Verdict, score::PointsBreakdown, watcher::Id};

/// Score information for a single player
///
/// Contains the player's running total and their position in the standings
/// (0-indexed).
#[derive(Debug, Serialize, Clone, Copy)]
pub struct ScoreMessage {
    /// Total points earned so far
    pub points: u64,
    /// Position in the standings, best first
    pub position: usize,
}

/// Standings rendered for clients, names resolved
#[derive(Debug, Serialize, Clone)]
pub struct StandingsMessage {
    /// Current standings in descending score order
    pub current: TruncatedVec<(String, u64)>,
    /// Standings before the latest round, for movement display
    pub prior: TruncatedVec<(String, u64)>,
}

/// Serialization helper for History struct
#[derive(Deserialize)]
struct HistorySerde {
    points_earned: Vec<Vec<(Id, u64)>>,
}

/// Final per-player summary of a concluded game
///
/// Computed lazily once the game is over; rounds cannot change afterwards.
#[derive(Debug, Clone)]
struct FinalSummary {
    /// For each player, the points earned in each round
    mapping: HashMap<Id, Vec<u64>>,
}

/// Points earned per player per round, with cached standings
///
/// One row is appended when a round finishes. A host correction may amend
/// the most recent row, which recomputes the cached orderings.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(from = "HistorySerde")]
pub struct History {
    /// Points earned by each player for each finished round
    points_earned: Vec<Vec<(Id, u64)>>,

    /// Previous round's totals in descending order (cached)
    #[serde(skip)]
    previous_scores_descending: Vec<(Id, u64)>,
    /// Current totals in descending order (cached)
    #[serde(skip)]
    scores_descending: Vec<(Id, u64)>,
    /// Mapping from player id to total and position (cached)
    #[serde(skip)]
    score_and_position: HashMap<Id, (u64, usize)>,
    /// Final per-player summary (computed once after the game concludes)
    #[serde(skip)]
    final_summary: once_cell_serde::sync::OnceCell<FinalSummary>,
}

impl From<HistorySerde> for History {
    /// Reconstructs the History from serialized data, rebuilding caches
    fn from(serde: HistorySerde) -> Self {
        let mut history = History {
            points_earned: serde.points_earned,
            ..History::default()
        };
        history.rebuild_caches();
        history
    }
}

impl History {
    /// Sums the first `rounds` rows into a per-player total
    fn totals_up_to(&self, rounds: usize) -> HashMap<Id, u64> {
        let mut totals: HashMap<Id, u64> = HashMap::new();
        for row in self.points_earned.iter().take(rounds) {
            for (id, points) in row {
                *totals.entry(*id).or_default() += points;
            }
        }
        totals
    }

    /// Recomputes both cached orderings and the position mapping
    fn rebuild_caches(&mut self) {
        let descending = |totals: HashMap<Id, u64>| {
            totals
                .into_iter()
                .sorted_by_key(|(_, points)| *points)
                .rev()
                .collect_vec()
        };

        self.scores_descending = descending(self.totals_up_to(self.points_earned.len()));
        self.previous_scores_descending =
            descending(self.totals_up_to(self.points_earned.len().saturating_sub(1)));
        self.score_and_position = self
            .scores_descending
            .iter()
            .enumerate()
            .map(|(position, (id, points))| (*id, (*points, position)))
            .collect();
    }

    /// Appends the scores of a finished round and updates the standings
    ///
    /// Players who earned nothing should still appear with zero so the
    /// recap can show a complete per-round breakdown.
    pub fn add_scores(&mut self, scores: &[(Id, u64)]) {
        self.points_earned.push(scores.to_vec());
        self.rebuild_caches();
    }

    /// Amends one player's entry in the most recent round
    ///
    /// Used when the host corrects a verdict after the round summary went
    /// out. Does nothing if no round has been recorded yet.
    pub fn amend_last(&mut self, id: Id, points: u64) {
        let Some(last) = self.points_earned.last_mut() else {
            return;
        };
        match last.iter_mut().find(|(entry_id, _)| *entry_id == id) {
            Some(entry) => entry.1 = points,
            None => last.push((id, points)),
        }
        self.rebuild_caches();
    }

    /// Number of finished rounds recorded
    pub fn rounds_recorded(&self) -> usize {
        self.points_earned.len()
    }

    /// The player currently at the top of the standings
    pub fn leader(&self) -> Option<Id> {
        self.scores_descending.first().map(|(id, _)| *id)
    }

    /// Returns the current and previous standings
    ///
    /// # Returns
    ///
    /// An array of [current, previous] standings as (id, total) in
    /// descending order.
    pub fn last_two_scores_descending(&self) -> [TruncatedVec<(Id, u64)>; 2] {
        const LIMIT: usize = 50;

        [
            TruncatedVec::new(
                self.scores_descending.iter().copied(),
                LIMIT,
                self.scores_descending.len(),
            ),
            TruncatedVec::new(
                self.previous_scores_descending.iter().copied(),
                LIMIT,
                self.previous_scores_descending.len(),
            ),
        ]
    }

    /// Per-round points for one player, zero-filled for missed rounds
    pub fn player_points_by_round(&self, id: Id) -> Vec<u64> {
        self.points_earned
            .iter()
            .map(|row| {
                row.iter()
                    .find(|(entry_id, _)| *entry_id == id)
                    .map_or(0, |(_, points)| *points)
            })
            .collect_vec()
    }

    /// Per-round points for one player in a concluded game
    ///
    /// The summary is computed on first access and cached; call only once
    /// rounds can no longer change.
    pub fn player_summary(&self, id: Id) -> Vec<u64> {
        self.final_summary
            .get_or_init(|| FinalSummary {
                mapping: {
                    let ids: HashSet<Id> = self
                        .points_earned
                        .iter()
                        .flat_map(|row| row.iter().map(|(id, _)| *id))
                        .collect();
                    ids.into_iter()
                        .map(|id| (id, self.player_points_by_round(id)))
                        .collect()
                },
            })
            .mapping
            .get(&id)
            .map_or(vec![0; self.points_earned.len()], Clone::clone)
    }

    /// Gets the current total and position for a player
    ///
    /// # Returns
    ///
    /// `Some(ScoreMessage)` if the player has any recorded rounds,
    /// otherwise `None`.
    pub fn score(&self, id: Id) -> Option<ScoreMessage> {
        let (points, position) = self.score_and_position.get(&id)?;
        Some(ScoreMessage {
            points: *points,
            position: *position,
        })
    }

    /// Clears all recorded rounds, for a game restart
    pub fn reset(&mut self) {
        self.points_earned.clear();
        self.final_summary = once_cell_serde::sync::OnceCell::new();
        self.rebuild_caches();
    }
}

/// One player's answer as it appears in the recap
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecapAnswer {
    /// The answering player
    pub player: Id,
    /// Display name at the time the round was played
    pub name: String,
    /// Submitted answer text
    pub text: String,
    /// Whether a drawing accompanied the answer
    pub has_drawing: bool,
    /// Final verdict, `None` if the round ended without one
    pub evaluation: Option<Verdict>,
    /// Points awarded, itemized
    pub points: PointsBreakdown,
}

/// Immutable aggregate of one finished round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecapEntry {
    /// Zero-based round number
    pub index: usize,
    /// The question that was asked
    pub question: Question,
    /// Every submitted answer with its outcome, in submission order
    pub answers: Vec<RecapAnswer>,
}

/// The navigable post-game recap
///
/// Entries are appended as rounds finish and never change afterwards. The
/// selected index is authoritative state: host navigation broadcasts it so
/// projector and player devices show the same round.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Recap {
    entries: Vec<RecapEntry>,
    selected: usize,
}

impl Recap {
    /// Appends the aggregate of a finished round
    pub fn push(&mut self, entry: RecapEntry) {
        self.entries.push(entry);
    }

    /// The recorded entries, in play order
    pub fn entries(&self) -> &[RecapEntry] {
        &self.entries
    }

    /// Currently selected round index
    pub fn selected(&self) -> usize {
        self.selected
    }

    /// Selects a round for display
    ///
    /// # Returns
    ///
    /// `true` if the index was in range and the selection changed state.
    pub fn navigate(&mut self, index: usize) -> bool {
        if index < self.entries.len() {
            self.selected = index;
            true
        } else {
            false
        }
    }

    /// Drops all entries and resets the selection, for a game restart
    pub fn reset(&mut self) {
        self.entries.clear();
        self.selected = 0;
    }
}
