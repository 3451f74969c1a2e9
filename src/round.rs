//! One question's full lifecycle: submissions, evaluation, results
//!
//! A round owns everything that belongs to the current question: submitted
//! answers with their timing and order, the latest drawing per player, cast
//! votes in community mode, and the deadline. It moves through three phases
//! (accepting answers, evaluating, over) with guarded transitions, and it is
//! only ever mutated through the owning room, so no event can observe a
//! half-applied change.

use std::collections::HashMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use web_time::{Duration, SystemTime};

use crate::{
    player::{LifeCharge, Role, Roster},
    question::Question,
    recap::{History, RecapAnswer, RecapEntry, ScoreMessage, StandingsMessage},
    score::{self, PointsBreakdown},
    session::Tunnel,
    watcher::{Id, ValueKind, Watchers},
};

use super::game::Error;

/// Phase of the current round
///
/// Transitions only move forward: answers are accepted, then evaluated,
/// then the round is over and waits for the host to advance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Phase {
    /// Accepting answer submissions and board updates
    #[default]
    Active,
    /// Submissions closed; host grading or community voting in progress
    Evaluating,
    /// Every verdict is terminal; waiting for the host to advance
    Over,
}

/// How answers get their verdicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvaluationMode {
    /// The host marks each answer correct or incorrect
    HostEvaluates,
    /// Eligible players vote; majority decides, ties resolve to incorrect
    CommunityVote,
}

/// A terminal verdict on an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    /// The answer was accepted as correct
    Correct,
    /// The answer was rejected as incorrect
    Incorrect,
}

/// Content that is visible to some recipients and withheld from others
#[derive(Debug, Serialize, Clone)]
pub enum PossiblyHidden<T> {
    /// Content is visible to the recipient
    Visible(T),
    /// Content is withheld from the recipient
    Hidden,
}

/// One submitted answer with everything needed to evaluate and reverse it
#[serde_with::serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    /// Submitted answer text
    pub text: String,
    /// Whether a drawing accompanied the answer
    pub has_drawing: bool,
    /// Serialized drawing payload, if any
    pub drawing: Option<String>,
    /// Zero-based rank of this submission within the round
    pub submission_order: usize,
    /// Time from round start to submission
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub submitted_after: Duration,
    /// Terminal verdict, `None` until evaluated
    pub evaluation: Option<Verdict>,
    /// Points awarded for this answer, itemized
    pub points: PointsBreakdown,
    /// The player's streak before this answer was evaluated, for reversal
    pub streak_before: u32,
    /// The life deduction this verdict caused, for reversal
    pub life_charge: LifeCharge,
}

/// An answer as shown to evaluators, voters, and in round results
#[skip_serializing_none]
#[derive(Debug, Serialize, Clone)]
pub struct AnswerSummary {
    /// The answering player
    pub player: Id,
    /// Display name of the answering player
    pub name: String,
    /// Submitted answer text
    pub text: String,
    /// Whether a drawing accompanied the answer
    pub has_drawing: bool,
    /// The drawing itself; only included for recipients allowed to see it
    pub drawing: Option<String>,
    /// Verdict, once one exists
    pub evaluation: Option<Verdict>,
    /// Awarded points, once evaluated
    pub points: Option<PointsBreakdown>,
}

/// A player's own answer, as echoed back to them in snapshots
#[serde_with::serde_as]
#[skip_serializing_none]
#[derive(Debug, Serialize, Clone)]
pub struct OwnAnswer {
    /// Submitted answer text
    pub text: String,
    /// Whether a drawing accompanied the answer
    pub has_drawing: bool,
    /// The player's own drawing payload
    pub drawing: Option<String>,
    /// Zero-based submission rank
    pub submission_order: usize,
    /// Own verdict, once evaluated
    pub evaluation: Option<Verdict>,
    /// Own points, once evaluated
    pub points: Option<PointsBreakdown>,
}

/// A player's latest board, for the host's live preview
#[derive(Debug, Serialize, Clone)]
pub struct BoardView {
    /// The drawing player
    pub player: Id,
    /// Display name of the drawing player
    pub name: String,
    /// Serialized drawing payload
    pub board: String,
}

/// Vote counts for one answer, host view
#[derive(Debug, Serialize, Clone)]
pub struct VoteTally {
    /// The answer's owner
    pub owner: Id,
    /// Display name of the owner
    pub name: String,
    /// Votes for correct
    pub correct: usize,
    /// Votes for incorrect
    pub incorrect: usize,
    /// Number of players eligible to vote on this answer
    pub eligible: usize,
}

/// One vote as echoed back to the voter in snapshots
#[derive(Debug, Serialize, Clone)]
pub struct CastVote {
    /// Whose answer the vote is about
    pub owner: Id,
    /// The voter's verdict
    pub verdict: Verdict,
}

/// Update messages sent to participants during a round
#[serde_with::serde_as]
#[skip_serializing_none]
#[derive(Debug, Serialize, Clone)]
pub enum UpdateMessage {
    /// Announces the question when the round starts
    QuestionAnnouncement {
        /// Zero-based round number
        index: usize,
        /// Total number of questions in the game
        count: usize,
        /// The question prompt
        prompt: String,
        /// Reference answer (withheld from players while the round is open)
        reference: PossiblyHidden<Option<String>>,
        /// Time limit, if the round is timed
        #[serde_as(as = "Option<serde_with::DurationMilliSeconds<u64>>")]
        time_limit: Option<Duration>,
    },
    /// (HOST ONLY) Number of answers submitted so far
    AnswersCount(usize),
    /// (HOST ONLY) A player's latest drawing
    BoardPreview(BoardView),
    /// The deadline passed; submissions are closed
    TimeUp,
    /// Submissions closed, evaluation/voting begins
    EvaluationAnnouncement {
        /// How verdicts will be decided
        mode: EvaluationMode,
        /// Submitted answers; empty for recipients who take no part
        answers: Vec<AnswerSummary>,
    },
    /// A verdict landed on an answer (sent to the host and the owner)
    AnswerEvaluated {
        /// The answer's owner
        player: Id,
        /// Display name of the owner
        name: String,
        /// The verdict
        verdict: Verdict,
        /// Total points this verdict awarded
        points: u64,
    },
    /// (HOST ONLY) Voting progress on one answer
    VoteProgress {
        /// The answer's owner
        owner: Id,
        /// Votes cast so far
        cast: usize,
        /// Number of eligible voters
        eligible: usize,
    },
    /// Refreshed standings after a correction changed recorded points
    Standings(StandingsMessage),
    /// Round results for the host and spectators
    RoundResults {
        /// All answers with verdicts and points
        answers: Vec<AnswerSummary>,
        /// Standings including this round
        standings: StandingsMessage,
    },
    /// Round results for a player: own outcome plus public standings
    OwnResult {
        /// The player's own answer and outcome, if they submitted
        answer: Option<OwnAnswer>,
        /// The player's running score and position
        score: Option<ScoreMessage>,
        /// Standings including this round
        standings: StandingsMessage,
    },
}

/// Alarm messages for the round deadline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AlarmMessage {
    /// The configured time limit for a round ran out
    RoundDeadline {
        /// Round the deadline belongs to
        index: usize,
        /// Generation the deadline belongs to; stale generations are ignored
        generation: u64,
    },
}

/// Sync messages carrying the complete round state for one participant
#[serde_with::serde_as]
#[skip_serializing_none]
#[derive(Debug, Serialize, Clone)]
pub enum SyncMessage {
    /// Round is accepting answers
    Question {
        /// Zero-based round number
        index: usize,
        /// Total number of questions in the game
        count: usize,
        /// The question prompt
        prompt: String,
        /// Reference answer, host only
        reference: Option<String>,
        /// Time limit, if the round is timed
        #[serde_as(as = "Option<serde_with::DurationMilliSeconds<u64>>")]
        time_limit: Option<Duration>,
        /// Remaining time, if the round is timed
        #[serde_as(as = "Option<serde_with::DurationMilliSeconds<u64>>")]
        remaining: Option<Duration>,
        /// Number of answers submitted so far
        answered_count: usize,
        /// The recipient's own submitted answer, if any
        own_answer: Option<OwnAnswer>,
        /// The recipient's own latest board, if any
        own_board: Option<String>,
        /// All live boards, host only
        boards: Option<Vec<BoardView>>,
    },
    /// Submissions closed; verdicts are being decided
    Evaluation {
        /// Zero-based round number
        index: usize,
        /// Total number of questions in the game
        count: usize,
        /// The question prompt
        prompt: String,
        /// Reference answer; host always, voters in community mode
        reference: Option<String>,
        /// How verdicts are decided
        mode: EvaluationMode,
        /// Submitted answers; empty for recipients who take no part
        answers: Vec<AnswerSummary>,
        /// The recipient's own submitted answer, if any
        own_answer: Option<OwnAnswer>,
        /// Votes the recipient has already cast, community mode only
        own_votes: Option<Vec<CastVote>>,
        /// Per-answer tallies, host only
        tallies: Option<Vec<VoteTally>>,
    },
    /// Round is over; all verdicts are terminal
    Results {
        /// Zero-based round number
        index: usize,
        /// Total number of questions in the game
        count: usize,
        /// The question prompt
        prompt: String,
        /// Reference answer, public once the round is over
        reference: Option<String>,
        /// All answers with outcomes; host and spectators only
        answers: Option<Vec<AnswerSummary>>,
        /// The recipient's own answer and outcome
        own_answer: Option<OwnAnswer>,
        /// The recipient's running score
        score: Option<ScoreMessage>,
        /// Standings including this round
        standings: StandingsMessage,
    },
}

/// Runtime state of the current round
#[serde_with::serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    /// Zero-based round number
    index: usize,
    /// Timer generation this round owns; alarms from other generations are stale
    generation: u64,
    /// The question being asked
    question: Question,
    /// Time limit, `None` for untimed rounds
    #[serde_as(as = "Option<serde_with::DurationMilliSeconds<u64>>")]
    time_limit: Option<Duration>,
    /// How verdicts are decided this game
    mode: EvaluationMode,
    /// Whether points are being awarded this game
    points_enabled: bool,
    /// When the round started accepting answers
    started_at: SystemTime,
    /// Submitted answers by owner
    answers: HashMap<Id, Answer>,
    /// Latest board by player, independent of answer submission
    boards: HashMap<Id, String>,
    /// Cast votes: answer owner to voter to verdict
    votes: HashMap<Id, HashMap<Id, Verdict>>,
    /// Current phase
    phase: Phase,
}

impl Round {
    /// Creates a round for the given question, accepting answers immediately
    pub fn new(
        index: usize,
        generation: u64,
        question: Question,
        time_limit: Option<Duration>,
        mode: EvaluationMode,
        points_enabled: bool,
    ) -> Self {
        Self {
            index,
            generation,
            question,
            time_limit,
            mode,
            points_enabled,
            started_at: SystemTime::now(),
            answers: HashMap::new(),
            boards: HashMap::new(),
            votes: HashMap::new(),
            phase: Phase::Active,
        }
    }

    /// Zero-based round number
    pub fn index(&self) -> usize {
        self.index
    }

    /// The timer generation this round owns
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The question being asked
    pub fn question(&self) -> &Question {
        &self.question
    }

    /// Number of answers submitted so far
    pub fn answer_count(&self) -> usize {
        self.answers.len()
    }

    /// Attempts to transition from one phase to another
    ///
    /// # Returns
    ///
    /// `true` if the transition happened, `false` if the current phase
    /// didn't match.
    fn change_phase(&mut self, before: Phase, after: Phase) -> bool {
        if self.phase == before {
            self.phase = after;
            true
        } else {
            false
        }
    }

    /// Time elapsed since the round started
    fn elapsed(&self) -> Duration {
        self.started_at.elapsed().unwrap_or_default()
    }

    /// Remaining time before the deadline, if the round is timed
    fn remaining(&self) -> Option<Duration> {
        self.time_limit.map(|l| l.saturating_sub(self.elapsed()))
    }

    /// Players eligible to vote on the given owner's answer
    fn eligible_voters(&self, owner: Id, roster: &Roster) -> usize {
        roster
            .active_ids()
            .into_iter()
            .filter(|id| *id != owner)
            .count()
    }

    /// The recipient's own answer, rendered for snapshots
    fn own_answer(&self, id: Id) -> Option<OwnAnswer> {
        self.answers.get(&id).map(|a| OwnAnswer {
            text: a.text.clone(),
            has_drawing: a.has_drawing,
            drawing: a.drawing.clone(),
            submission_order: a.submission_order,
            evaluation: a.evaluation,
            points: a.evaluation.map(|_| a.points),
        })
    }

    /// All answers rendered for evaluators, in submission order
    ///
    /// # Arguments
    ///
    /// * `include_drawings` - whether drawing payloads are included (host)
    /// * `include_outcomes` - whether verdicts and points are included
    fn answer_summaries(
        &self,
        watchers: &Watchers,
        include_drawings: bool,
        include_outcomes: bool,
    ) -> Vec<AnswerSummary> {
        self.answers
            .iter()
            .sorted_by_key(|(_, a)| a.submission_order)
            .map(|(id, a)| AnswerSummary {
                player: *id,
                name: watchers.get_name(*id).unwrap_or_else(|| "Unknown".to_owned()),
                text: a.text.clone(),
                has_drawing: a.has_drawing,
                drawing: if include_drawings {
                    a.drawing.clone()
                } else {
                    None
                },
                evaluation: if include_outcomes { a.evaluation } else { None },
                points: if include_outcomes {
                    a.evaluation.map(|_| a.points)
                } else {
                    None
                },
            })
            .collect_vec()
    }

    /// All live boards rendered for the host preview
    fn board_views(&self, watchers: &Watchers) -> Vec<BoardView> {
        self.boards
            .iter()
            .map(|(id, board)| BoardView {
                player: *id,
                name: watchers.get_name(*id).unwrap_or_else(|| "Unknown".to_owned()),
                board: board.clone(),
            })
            .collect_vec()
    }

    /// Standings rendered with display names
    fn standings_message(history: &History, watchers: &Watchers) -> StandingsMessage {
        let [current, prior] = history.last_two_scores_descending();

        let id_map = |id| {
            watchers
                .get_name(id)
                .unwrap_or_else(|| "Unknown".to_owned())
        };
        let id_score_map = |(id, s)| (id_map(id), s);

        StandingsMessage {
            current: current.map(id_score_map),
            prior: prior.map(id_score_map),
        }
    }

    /// Starts the round: announces the question and schedules the deadline
    pub fn play<T: Tunnel, F: Fn(Id) -> Option<T>, S: FnMut(crate::AlarmMessage, Duration)>(
        &mut self,
        watchers: &Watchers,
        mut schedule_message: S,
        tunnel_finder: F,
        count: usize,
    ) {
        watchers.announce_with(
            |_, kind| match kind {
                ValueKind::Host | ValueKind::Player => Some(
                    UpdateMessage::QuestionAnnouncement {
                        index: self.index,
                        count,
                        prompt: self.question.prompt.clone(),
                        reference: match kind {
                            ValueKind::Host => {
                                PossiblyHidden::Visible(self.question.reference_answer.clone())
                            }
                            _ => PossiblyHidden::Hidden,
                        },
                        time_limit: self.time_limit,
                    }
                    .into(),
                ),
                ValueKind::Unassigned => None,
            },
            &tunnel_finder,
        );

        if let Some(limit) = self.time_limit {
            schedule_message(
                AlarmMessage::RoundDeadline {
                    index: self.index,
                    generation: self.generation,
                }
                .into(),
                limit,
            );
        }
    }

    /// Accepts an answer submission from a player
    ///
    /// The submission is rejected while the round is not accepting answers,
    /// when the player is not competing, when they already answered, or when
    /// the payload exceeds the configured bounds. The round moves on to
    /// evaluation once every connected competing player has answered.
    ///
    /// # Returns
    ///
    /// `true` if this submission finished the round (it can, when the
    /// evaluation phase turns out to have nothing left to decide).
    ///
    /// # Errors
    ///
    /// See [`Error`] for the rejection taxonomy.
    pub fn submit<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        watcher_id: Id,
        text: String,
        has_drawing: bool,
        drawing: Option<String>,
        roster: &mut Roster,
        history: &mut History,
        watchers: &Watchers,
        tunnel_finder: F,
    ) -> Result<bool, Error> {
        if self.phase != Phase::Active {
            return Err(Error::StateConflict);
        }
        if roster.role(watcher_id) != Some(Role::Active) {
            return Err(Error::NotCompeting);
        }
        if text.len() > crate::constants::answer::MAX_TEXT_LENGTH {
            return Err(Error::AnswerTooLong);
        }
        if drawing
            .as_ref()
            .is_some_and(|d| d.len() > crate::constants::drawing::MAX_BYTES)
        {
            return Err(Error::DrawingTooLarge);
        }
        if self.answers.contains_key(&watcher_id) {
            return Err(Error::AlreadyAnswered);
        }

        if let Some(drawing) = &drawing {
            self.boards.insert(watcher_id, drawing.clone());
        }

        let submission_order = self.answers.len();
        self.answers.insert(
            watcher_id,
            Answer {
                text,
                has_drawing,
                drawing,
                submission_order,
                submitted_after: self.elapsed(),
                evaluation: None,
                points: PointsBreakdown::zero(),
                streak_before: 0,
                life_charge: LifeCharge {
                    life_lost: false,
                    eliminated: false,
                },
            },
        );

        let connected_active = roster
            .active_ids()
            .into_iter()
            .filter(|id| Watchers::is_alive(*id, &tunnel_finder))
            .collect_vec();
        let all_answered = !connected_active.is_empty()
            && connected_active
                .iter()
                .all(|id| self.answers.contains_key(id));

        if all_answered {
            Ok(self.begin_evaluation(roster, history, watchers, &tunnel_finder))
        } else {
            watchers.announce_specific(
                ValueKind::Host,
                &UpdateMessage::AnswersCount(self.answers.len()).into(),
                &tunnel_finder,
            );
            Ok(false)
        }
    }

    /// Stores a player's latest drawing and previews it to the host
    ///
    /// Boards always overwrite; unlike answers they carry no order or
    /// timing, so the latest stroke state is the only one that matters.
    ///
    /// # Errors
    ///
    /// Rejected outside the answering phase, for non-competing players, and
    /// for oversized payloads.
    pub fn board_update<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        watcher_id: Id,
        board: String,
        roster: &Roster,
        watchers: &Watchers,
        tunnel_finder: F,
    ) -> Result<(), Error> {
        if self.phase != Phase::Active {
            return Err(Error::StateConflict);
        }
        if roster.role(watcher_id) != Some(Role::Active) {
            return Err(Error::NotCompeting);
        }
        if board.len() > crate::constants::drawing::MAX_BYTES {
            return Err(Error::DrawingTooLarge);
        }

        self.boards.insert(watcher_id, board.clone());

        watchers.announce_specific(
            ValueKind::Host,
            &UpdateMessage::BoardPreview(BoardView {
                player: watcher_id,
                name: watchers
                    .get_name(watcher_id)
                    .unwrap_or_else(|| "Unknown".to_owned()),
                board,
            })
            .into(),
            &tunnel_finder,
        );

        Ok(())
    }

    /// Closes submissions and opens evaluation
    ///
    /// A round with no answers at all has nothing to decide and finishes
    /// immediately.
    ///
    /// # Returns
    ///
    /// `true` if the round finished as a result.
    fn begin_evaluation<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        roster: &mut Roster,
        history: &mut History,
        watchers: &Watchers,
        tunnel_finder: F,
    ) -> bool {
        if !self.change_phase(Phase::Active, Phase::Evaluating) {
            return false;
        }

        if self.answers.is_empty() {
            return self.finish(roster, history, watchers, &tunnel_finder);
        }

        let mode = self.mode;
        watchers.announce_with(
            |id, kind| match kind {
                ValueKind::Host => Some(
                    UpdateMessage::EvaluationAnnouncement {
                        mode,
                        answers: self.answer_summaries(watchers, true, false),
                    }
                    .into(),
                ),
                ValueKind::Player => Some(
                    UpdateMessage::EvaluationAnnouncement {
                        mode,
                        answers: match mode {
                            // Voters see the texts they are judging
                            EvaluationMode::CommunityVote
                                if roster.role(id) == Some(Role::Active) =>
                            {
                                self.answer_summaries(watchers, false, false)
                            }
                            _ => Vec::new(),
                        },
                    }
                    .into(),
                ),
                ValueKind::Unassigned => None,
            },
            &tunnel_finder,
        );

        false
    }

    /// Applies a verdict to an answer: streak, life, and points bookkeeping
    ///
    /// Captures the pre-verdict streak and the life charge on the answer so
    /// a later correction can reverse this application exactly.
    fn apply_verdict(&mut self, target: Id, verdict: Verdict, roster: &mut Roster) {
        let streak_before = roster.get(target).map_or(0, |p| p.streak);
        let (points, life_charge) = match verdict {
            Verdict::Correct => {
                let streak = roster.record_correct(target).unwrap_or(1);
                let answer = &self.answers[&target];
                let points = if self.points_enabled {
                    score::correct_answer(
                        answer.submitted_after,
                        self.time_limit,
                        answer.submission_order,
                        streak,
                    )
                } else {
                    PointsBreakdown::zero()
                };
                (
                    points,
                    LifeCharge {
                        life_lost: false,
                        eliminated: false,
                    },
                )
            }
            Verdict::Incorrect => (PointsBreakdown::zero(), roster.record_incorrect(target)),
        };

        if let Some(answer) = self.answers.get_mut(&target) {
            answer.evaluation = Some(verdict);
            answer.points = points;
            answer.streak_before = streak_before;
            answer.life_charge = life_charge;
        }
    }

    /// Handles a host verdict: a fresh evaluation or a correction
    ///
    /// A fresh verdict is only valid in host-evaluated games while the
    /// round is evaluating. A correction (re-evaluating an answer that
    /// already has a verdict) is valid in either mode until the host
    /// advances past the round; it reverses the prior score and life
    /// effects exactly before applying the new verdict.
    ///
    /// # Returns
    ///
    /// `true` if this verdict finished the round.
    ///
    /// # Errors
    ///
    /// See [`Error`] for the rejection taxonomy.
    pub fn evaluate<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        target: Id,
        verdict: Verdict,
        roster: &mut Roster,
        history: &mut History,
        watchers: &Watchers,
        tunnel_finder: F,
    ) -> Result<bool, Error> {
        let Some(answer) = self.answers.get(&target) else {
            return Err(Error::NoSuchAnswer);
        };

        let correction = answer.evaluation.is_some();
        if correction {
            if self.phase == Phase::Active {
                return Err(Error::StateConflict);
            }

            let (streak_before, life_charge) = (answer.streak_before, answer.life_charge);
            roster.reverse_evaluation(target, streak_before, life_charge);
        } else {
            if self.mode != EvaluationMode::HostEvaluates || self.phase != Phase::Evaluating {
                return Err(Error::StateConflict);
            }
        }

        self.apply_verdict(target, verdict, roster);

        let points = self.answers[&target].points.total;
        let name = watchers
            .get_name(target)
            .unwrap_or_else(|| "Unknown".to_owned());
        let evaluated = UpdateMessage::AnswerEvaluated {
            player: target,
            name,
            verdict,
            points,
        };
        watchers.announce_specific(ValueKind::Host, &evaluated.clone().into(), &tunnel_finder);
        watchers.send_message(&evaluated.into(), target, &tunnel_finder);

        if correction && self.phase == Phase::Over {
            // The round summary already went out with the old numbers
            history.amend_last(target, points);
            watchers.announce(
                &UpdateMessage::Standings(Self::standings_message(history, watchers)).into(),
                &tunnel_finder,
            );
            return Ok(false);
        }

        if self.all_evaluated() {
            return Ok(self.finish(roster, history, watchers, &tunnel_finder));
        }

        Ok(false)
    }

    /// Records a community vote on an answer
    ///
    /// Voters must be competing and may not vote on their own answer. A
    /// repeated vote replaces the earlier one until tallies are finalized.
    /// Voting finalizes automatically once every answer has a vote from
    /// every eligible voter.
    ///
    /// # Returns
    ///
    /// `true` if this vote finished the round.
    ///
    /// # Errors
    ///
    /// See [`Error`] for the rejection taxonomy.
    pub fn vote<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        voter: Id,
        owner: Id,
        verdict: Verdict,
        roster: &mut Roster,
        history: &mut History,
        watchers: &Watchers,
        tunnel_finder: F,
    ) -> Result<bool, Error> {
        if self.mode != EvaluationMode::CommunityVote || self.phase != Phase::Evaluating {
            return Err(Error::StateConflict);
        }
        if roster.role(voter) != Some(Role::Active) {
            return Err(Error::NotCompeting);
        }
        if voter == owner {
            return Err(Error::SelfVote);
        }
        let Some(answer) = self.answers.get(&owner) else {
            return Err(Error::NoSuchAnswer);
        };
        if answer.evaluation.is_some() {
            return Err(Error::StateConflict);
        }

        self.votes.entry(owner).or_default().insert(voter, verdict);

        let cast = self.votes.get(&owner).map_or(0, HashMap::len);
        let eligible = self.eligible_voters(owner, roster);
        watchers.announce_specific(
            ValueKind::Host,
            &UpdateMessage::VoteProgress {
                owner,
                cast,
                eligible,
            }
            .into(),
            &tunnel_finder,
        );

        let complete = self.answers.keys().all(|owner| {
            self.votes.get(owner).map_or(0, HashMap::len) >= self.eligible_voters(*owner, roster)
        });
        if complete {
            self.finalize_votes(roster);
            return Ok(self.finish(roster, history, watchers, &tunnel_finder));
        }

        Ok(false)
    }

    /// Turns current tallies into terminal verdicts
    ///
    /// Majority rules; ties, including no votes at all, resolve to
    /// incorrect.
    fn finalize_votes(&mut self, roster: &mut Roster) {
        let owners = self
            .answers
            .iter()
            .filter(|(_, a)| a.evaluation.is_none())
            .map(|(id, _)| *id)
            .sorted_by_key(|id| self.answers[id].submission_order)
            .collect_vec();

        for owner in owners {
            let (correct, incorrect) = self.tally(owner);
            let verdict = if correct > incorrect {
                Verdict::Correct
            } else {
                Verdict::Incorrect
            };
            self.apply_verdict(owner, verdict, roster);
        }
    }

    /// Counts (correct, incorrect) votes for one answer
    fn tally(&self, owner: Id) -> (usize, usize) {
        match self.votes.get(&owner) {
            Some(votes) => {
                let correct = votes.values().filter(|v| **v == Verdict::Correct).count();
                (correct, votes.len() - correct)
            }
            None => (0, 0),
        }
    }

    /// Whether every submitted answer has a terminal verdict
    fn all_evaluated(&self) -> bool {
        self.answers.values().all(|a| a.evaluation.is_some())
    }

    /// Host force-end: closes whatever stage the round is in
    ///
    /// During answering this closes submissions (like the deadline does);
    /// during evaluation it finalizes community tallies or, in
    /// host-evaluated games, leaves unevaluated answers without a verdict;
    /// they score nothing and charge nothing, like a missed round.
    ///
    /// # Returns
    ///
    /// `true` if the round finished as a result.
    ///
    /// # Errors
    ///
    /// Rejected once the round is already over.
    pub fn force_end<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        roster: &mut Roster,
        history: &mut History,
        watchers: &Watchers,
        tunnel_finder: F,
    ) -> Result<bool, Error> {
        match self.phase {
            Phase::Active => Ok(self.begin_evaluation(roster, history, watchers, &tunnel_finder)),
            Phase::Evaluating => {
                if self.mode == EvaluationMode::CommunityVote {
                    self.finalize_votes(roster);
                }
                Ok(self.finish(roster, history, watchers, &tunnel_finder))
            }
            Phase::Over => Err(Error::StateConflict),
        }
    }

    /// Handles the round deadline alarm
    ///
    /// Ignored unless the generation matches this round and submissions are
    /// still open, which is what makes a stale timer from an
    /// earlier round harmless.
    ///
    /// # Returns
    ///
    /// `true` if the round finished as a result.
    pub fn receive_alarm<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        message: &AlarmMessage,
        roster: &mut Roster,
        history: &mut History,
        watchers: &Watchers,
        tunnel_finder: F,
    ) -> bool {
        let AlarmMessage::RoundDeadline { generation, .. } = message;

        if *generation != self.generation || self.phase != Phase::Active {
            return false;
        }

        watchers.announce(&UpdateMessage::TimeUp.into(), &tunnel_finder);
        self.begin_evaluation(roster, history, watchers, &tunnel_finder)
    }

    /// Closes the round: streak bookkeeping, score recording, results
    ///
    /// Competing players who never submitted lose their streak (but no
    /// life). Every competitor gets a row in the score history so the recap
    /// shows complete rounds.
    ///
    /// # Returns
    ///
    /// Always `true`; the round is over.
    fn finish<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        roster: &mut Roster,
        history: &mut History,
        watchers: &Watchers,
        tunnel_finder: F,
    ) -> bool {
        if !self.change_phase(Phase::Evaluating, Phase::Over) {
            return false;
        }

        for id in roster.active_ids() {
            if !self.answers.contains_key(&id) {
                roster.record_unanswered(id);
            }
        }

        let scores = roster
            .ids()
            .into_iter()
            .filter(|id| roster.role(*id) != Some(Role::Spectator))
            .map(|id| {
                (
                    id,
                    self.answers.get(&id).map_or(0, |a| {
                        a.evaluation
                            .map_or(0, |_| a.points.total)
                    }),
                )
            })
            .collect_vec();
        history.add_scores(&scores);

        let standings = Self::standings_message(history, watchers);
        watchers.announce_with(
            |id, kind| match kind {
                ValueKind::Host => Some(
                    UpdateMessage::RoundResults {
                        answers: self.answer_summaries(watchers, true, true),
                        standings: standings.clone(),
                    }
                    .into(),
                ),
                ValueKind::Player => match roster.role(id) {
                    Some(Role::Spectator) => Some(
                        UpdateMessage::RoundResults {
                            answers: self.answer_summaries(watchers, false, true),
                            standings: standings.clone(),
                        }
                        .into(),
                    ),
                    _ => Some(
                        UpdateMessage::OwnResult {
                            answer: self.own_answer(id),
                            score: history.score(id),
                            standings: standings.clone(),
                        }
                        .into(),
                    ),
                },
                ValueKind::Unassigned => None,
            },
            &tunnel_finder,
        );

        true
    }

    /// Builds the immutable recap aggregate for this round
    pub fn to_recap_entry(&self, watchers: &Watchers) -> RecapEntry {
        RecapEntry {
            index: self.index,
            question: self.question.clone(),
            answers: self
                .answers
                .iter()
                .sorted_by_key(|(_, a)| a.submission_order)
                .map(|(id, a)| RecapAnswer {
                    player: *id,
                    name: watchers.get_name(*id).unwrap_or_else(|| "Unknown".to_owned()),
                    text: a.text.clone(),
                    has_drawing: a.has_drawing,
                    evaluation: a.evaluation,
                    points: a.points,
                })
                .collect_vec(),
        }
    }

    /// Builds the complete round state for one participant
    ///
    /// The message depends on the phase and on who is asking: the host sees
    /// drawings, tallies, and the reference answer; players see their own
    /// answer and what is public in the current phase.
    pub fn state_message<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &self,
        watcher_id: Id,
        watcher_kind: ValueKind,
        roster: &Roster,
        history: &History,
        watchers: &Watchers,
        count: usize,
        _tunnel_finder: F,
    ) -> SyncMessage {
        let is_host = matches!(watcher_kind, ValueKind::Host);

        match self.phase {
            Phase::Active => SyncMessage::Question {
                index: self.index,
                count,
                prompt: self.question.prompt.clone(),
                reference: if is_host {
                    self.question.reference_answer.clone()
                } else {
                    None
                },
                time_limit: self.time_limit,
                remaining: self.remaining(),
                answered_count: self.answers.len(),
                own_answer: self.own_answer(watcher_id),
                own_board: self.boards.get(&watcher_id).cloned(),
                boards: is_host.then(|| self.board_views(watchers)),
            },
            Phase::Evaluating => {
                let voter = self.mode == EvaluationMode::CommunityVote
                    && roster.role(watcher_id) == Some(Role::Active);
                SyncMessage::Evaluation {
                    index: self.index,
                    count,
                    prompt: self.question.prompt.clone(),
                    reference: if is_host || voter {
                        self.question.reference_answer.clone()
                    } else {
                        None
                    },
                    mode: self.mode,
                    answers: if is_host {
                        self.answer_summaries(watchers, true, false)
                    } else if voter {
                        self.answer_summaries(watchers, false, false)
                    } else {
                        Vec::new()
                    },
                    own_answer: self.own_answer(watcher_id),
                    own_votes: voter.then(|| {
                        self.votes
                            .iter()
                            .filter_map(|(owner, votes)| {
                                votes.get(&watcher_id).map(|verdict| CastVote {
                                    owner: *owner,
                                    verdict: *verdict,
                                })
                            })
                            .collect_vec()
                    }),
                    tallies: is_host.then(|| {
                        self.answers
                            .keys()
                            .sorted_by_key(|id| self.answers[id].submission_order)
                            .map(|owner| {
                                let (correct, incorrect) = self.tally(*owner);
                                VoteTally {
                                    owner: *owner,
                                    name: watchers
                                        .get_name(*owner)
                                        .unwrap_or_else(|| "Unknown".to_owned()),
                                    correct,
                                    incorrect,
                                    eligible: self.eligible_voters(*owner, roster),
                                }
                            })
                            .collect_vec()
                    }),
                }
            }
            Phase::Over => {
                let spectating = roster.role(watcher_id) == Some(Role::Spectator);
                SyncMessage::Results {
                    index: self.index,
                    count,
                    prompt: self.question.prompt.clone(),
                    reference: self.question.reference_answer.clone(),
                    answers: if is_host {
                        Some(self.answer_summaries(watchers, true, true))
                    } else if spectating {
                        Some(self.answer_summaries(watchers, false, true))
                    } else {
                        None
                    },
                    own_answer: self.own_answer(watcher_id),
                    score: history.score(watcher_id),
                    standings: Self::standings_message(history, watchers),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::Value;

    #[derive(Debug, Clone)]
    struct MockTunnel {
        messages:
            std::sync::Arc<std::sync::Mutex<std::collections::VecDeque<crate::UpdateMessage>>>,
    }

    impl MockTunnel {
        fn new() -> Self {
            Self {
                messages: std::sync::Arc::new(std::sync::Mutex::new(
                    std::collections::VecDeque::new(),
                )),
            }
        }
    }

    impl Tunnel for MockTunnel {
        fn send_message(&self, message: &crate::UpdateMessage) {
            self.messages.lock().unwrap().push_back(message.clone());
        }

        fn send_state(&self, _state: &crate::SyncMessage) {}

        fn close(self) {}
    }

    fn finder() -> impl Fn(Id) -> Option<MockTunnel> {
        move |_id| Some(MockTunnel::new())
    }

    fn question(prompt: &str) -> Question {
        Question {
            prompt: prompt.to_owned(),
            reference_answer: Some("42".to_owned()),
            subject: None,
            grade: None,
            language: None,
        }
    }

    struct Fixture {
        round: Round,
        roster: Roster,
        history: History,
        watchers: Watchers,
        host: Id,
        players: Vec<Id>,
    }

    fn fixture(mode: EvaluationMode, player_count: usize, lives: u8) -> Fixture {
        let host = Id::new();
        let mut watchers = Watchers::with_host_id(host);
        let mut roster = Roster::default();
        let mut players = Vec::new();

        for i in 0..player_count {
            let id = Id::new();
            watchers
                .add_watcher(id, Value::Player(format!("player-{i}")))
                .unwrap();
            roster.add_active(id, lives);
            players.push(id);
        }

        Fixture {
            round: Round::new(
                0,
                1,
                question("What is 6 x 7?"),
                Some(Duration::from_secs(30)),
                mode,
                true,
            ),
            roster,
            history: History::default(),
            watchers,
            host,
            players,
        }
    }

    fn submit(f: &mut Fixture, player: Id, text: &str) -> Result<bool, Error> {
        f.round.submit(
            player,
            text.to_owned(),
            false,
            None,
            &mut f.roster,
            &mut f.history,
            &f.watchers,
            finder(),
        )
    }

    #[test]
    fn test_submit_records_order_and_timing() {
        let mut f = fixture(EvaluationMode::HostEvaluates, 3, 3);
        let (a, b) = (f.players[0], f.players[1]);

        submit(&mut f, a, "forty-two").unwrap();
        submit(&mut f, b, "41").unwrap();

        assert_eq!(f.round.answers[&a].submission_order, 0);
        assert_eq!(f.round.answers[&b].submission_order, 1);
        assert_eq!(f.round.phase(), Phase::Active);
    }

    #[test]
    fn test_second_submission_rejected() {
        let mut f = fixture(EvaluationMode::HostEvaluates, 3, 3);
        let a = f.players[0];

        submit(&mut f, a, "first").unwrap();
        assert_eq!(submit(&mut f, a, "second"), Err(Error::AlreadyAnswered));
        assert_eq!(f.round.answers[&a].text, "first");
    }

    #[test]
    fn test_spectators_cannot_submit() {
        let mut f = fixture(EvaluationMode::HostEvaluates, 2, 3);
        let watcher = Id::new();
        f.watchers
            .add_watcher(watcher, Value::Player("late-joiner".to_owned()))
            .unwrap();
        f.roster.add_spectator(watcher);

        assert_eq!(submit(&mut f, watcher, "me too"), Err(Error::NotCompeting));
    }

    #[test]
    fn test_all_answered_moves_to_evaluation() {
        let mut f = fixture(EvaluationMode::HostEvaluates, 2, 3);
        let (a, b) = (f.players[0], f.players[1]);

        assert_eq!(submit(&mut f, a, "forty-two"), Ok(false));
        assert_eq!(f.round.phase(), Phase::Active);

        assert_eq!(submit(&mut f, b, "41"), Ok(false));
        assert_eq!(f.round.phase(), Phase::Evaluating);
    }

    #[test]
    fn test_deadline_closes_submissions_once() {
        let mut f = fixture(EvaluationMode::HostEvaluates, 2, 3);
        let a = f.players[0];

        submit(&mut f, a, "forty-two").unwrap();

        let alarm = AlarmMessage::RoundDeadline {
            index: 0,
            generation: 1,
        };
        f.round
            .receive_alarm(&alarm, &mut f.roster, &mut f.history, &f.watchers, finder());
        assert_eq!(f.round.phase(), Phase::Evaluating);

        // Submissions after the deadline are rejected
        let b = f.players[1];
        assert_eq!(
            submit(&mut f, b, "too late"),
            Err(Error::StateConflict)
        );
    }

    #[test]
    fn test_stale_generation_alarm_is_ignored() {
        let mut f = fixture(EvaluationMode::HostEvaluates, 2, 3);

        let stale = AlarmMessage::RoundDeadline {
            index: 0,
            generation: 0,
        };
        f.round
            .receive_alarm(&stale, &mut f.roster, &mut f.history, &f.watchers, finder());
        assert_eq!(f.round.phase(), Phase::Active);
    }

    #[test]
    fn test_deadline_with_no_answers_finishes_round() {
        let mut f = fixture(EvaluationMode::HostEvaluates, 2, 3);

        let alarm = AlarmMessage::RoundDeadline {
            index: 0,
            generation: 1,
        };
        let finished =
            f.round
                .receive_alarm(&alarm, &mut f.roster, &mut f.history, &f.watchers, finder());
        assert!(finished);
        assert_eq!(f.round.phase(), Phase::Over);
        assert_eq!(f.history.rounds_recorded(), 1);
    }

    #[test]
    fn test_host_evaluation_awards_points_and_lives() {
        let mut f = fixture(EvaluationMode::HostEvaluates, 2, 3);
        let (a, b) = (f.players[0], f.players[1]);

        submit(&mut f, a, "forty-two").unwrap();
        submit(&mut f, b, "41").unwrap();

        f.round
            .evaluate(
                a,
                Verdict::Correct,
                &mut f.roster,
                &mut f.history,
                &f.watchers,
                finder(),
            )
            .unwrap();
        let finished = f
            .round
            .evaluate(
                b,
                Verdict::Incorrect,
                &mut f.roster,
                &mut f.history,
                &f.watchers,
                finder(),
            )
            .unwrap();

        assert!(finished);
        assert_eq!(f.round.phase(), Phase::Over);
        assert!(f.round.answers[&a].points.total > 0);
        assert_eq!(f.round.answers[&b].points.total, 0);
        assert_eq!(f.roster.get(b).unwrap().lives, 2);
        assert!(f.history.score(a).unwrap().points > 0);
    }

    #[test]
    fn test_correction_reverses_exactly() {
        let mut f = fixture(EvaluationMode::HostEvaluates, 2, 1);
        let (a, b) = (f.players[0], f.players[1]);

        submit(&mut f, a, "forty-two").unwrap();
        submit(&mut f, b, "41").unwrap();

        f.round
            .evaluate(
                a,
                Verdict::Correct,
                &mut f.roster,
                &mut f.history,
                &f.watchers,
                finder(),
            )
            .unwrap();
        // b's last life goes: eliminated
        f.round
            .evaluate(
                b,
                Verdict::Incorrect,
                &mut f.roster,
                &mut f.history,
                &f.watchers,
                finder(),
            )
            .unwrap();
        assert_eq!(f.roster.role(b), Some(Role::Eliminated));
        assert_eq!(f.history.score(b).unwrap().points, 0);

        // The host corrects the verdict: life restored, points granted
        f.round
            .evaluate(
                b,
                Verdict::Correct,
                &mut f.roster,
                &mut f.history,
                &f.watchers,
                finder(),
            )
            .unwrap();
        assert_eq!(f.roster.role(b), Some(Role::Active));
        assert_eq!(f.roster.get(b).unwrap().lives, 1);
        assert!(f.history.score(b).unwrap().points > 0);

        // Correcting back down re-applies the elimination
        f.round
            .evaluate(
                b,
                Verdict::Incorrect,
                &mut f.roster,
                &mut f.history,
                &f.watchers,
                finder(),
            )
            .unwrap();
        assert_eq!(f.roster.role(b), Some(Role::Eliminated));
        assert_eq!(f.history.score(b).unwrap().points, 0);
    }

    #[test]
    fn test_community_vote_majority_and_tie_break() {
        let mut f = fixture(EvaluationMode::CommunityVote, 3, 3);
        let (a, b, c) = (f.players[0], f.players[1], f.players[2]);

        submit(&mut f, a, "forty-two").unwrap();
        submit(&mut f, b, "41").unwrap();
        submit(&mut f, c, "42!").unwrap();
        assert_eq!(f.round.phase(), Phase::Evaluating);

        let vote = |voter: Id, owner: Id, verdict: Verdict, f: &mut Fixture| {
            f.round
                .vote(
                    voter,
                    owner,
                    verdict,
                    &mut f.roster,
                    &mut f.history,
                    &f.watchers,
                    finder(),
                )
                .unwrap()
        };

        // a's answer: both voters agree it is correct
        vote(b, a, Verdict::Correct, &mut f);
        vote(c, a, Verdict::Correct, &mut f);
        // b's answer: both voters reject it
        vote(a, b, Verdict::Incorrect, &mut f);
        vote(c, b, Verdict::Incorrect, &mut f);
        // c's answer: a split vote, so the tie resolves to incorrect
        vote(a, c, Verdict::Correct, &mut f);
        let finished = vote(b, c, Verdict::Incorrect, &mut f);

        assert!(finished);
        assert_eq!(f.round.answers[&a].evaluation, Some(Verdict::Correct));
        assert_eq!(f.round.answers[&b].evaluation, Some(Verdict::Incorrect));
        assert_eq!(f.round.answers[&c].evaluation, Some(Verdict::Incorrect));
        assert_eq!(f.roster.get(b).unwrap().lives, 2);
        assert_eq!(f.roster.get(c).unwrap().lives, 2);
    }

    #[test]
    fn test_self_vote_rejected() {
        let mut f = fixture(EvaluationMode::CommunityVote, 2, 3);
        let (a, b) = (f.players[0], f.players[1]);

        submit(&mut f, a, "forty-two").unwrap();
        submit(&mut f, b, "41").unwrap();

        let result = f.round.vote(
            a,
            a,
            Verdict::Correct,
            &mut f.roster,
            &mut f.history,
            &f.watchers,
            finder(),
        );
        assert_eq!(result, Err(Error::SelfVote));
    }

    #[test]
    fn test_vote_can_change_until_finalized() {
        let mut f = fixture(EvaluationMode::CommunityVote, 3, 3);
        let (a, b) = (f.players[0], f.players[1]);

        submit(&mut f, a, "forty-two").unwrap();
        submit(&mut f, b, "41").unwrap();
        // Only two of three answered; the deadline closes submissions
        let alarm = AlarmMessage::RoundDeadline {
            index: 0,
            generation: 1,
        };
        f.round
            .receive_alarm(&alarm, &mut f.roster, &mut f.history, &f.watchers, finder());

        f.round
            .vote(
                b,
                a,
                Verdict::Incorrect,
                &mut f.roster,
                &mut f.history,
                &f.watchers,
                finder(),
            )
            .unwrap();
        f.round
            .vote(
                b,
                a,
                Verdict::Correct,
                &mut f.roster,
                &mut f.history,
                &f.watchers,
                finder(),
            )
            .unwrap();

        assert_eq!(f.round.tally(a), (1, 0));
    }

    #[test]
    fn test_force_end_finalizes_community_tallies() {
        let mut f = fixture(EvaluationMode::CommunityVote, 3, 3);
        let (a, b, c) = (f.players[0], f.players[1], f.players[2]);

        submit(&mut f, a, "forty-two").unwrap();
        submit(&mut f, b, "41").unwrap();
        submit(&mut f, c, "42!").unwrap();

        f.round
            .vote(
                b,
                a,
                Verdict::Correct,
                &mut f.roster,
                &mut f.history,
                &f.watchers,
                finder(),
            )
            .unwrap();

        let finished = f
            .round
            .force_end(&mut f.roster, &mut f.history, &f.watchers, finder())
            .unwrap();

        assert!(finished);
        // a had a 1-0 majority; b and c finalize on empty tallies: incorrect
        assert_eq!(f.round.answers[&a].evaluation, Some(Verdict::Correct));
        assert_eq!(f.round.answers[&b].evaluation, Some(Verdict::Incorrect));
        assert_eq!(f.round.answers[&c].evaluation, Some(Verdict::Incorrect));
    }

    #[test]
    fn test_force_end_in_host_mode_leaves_unevaluated_unscored() {
        let mut f = fixture(EvaluationMode::HostEvaluates, 2, 3);
        let (a, b) = (f.players[0], f.players[1]);

        submit(&mut f, a, "forty-two").unwrap();
        submit(&mut f, b, "41").unwrap();

        f.round
            .evaluate(
                a,
                Verdict::Correct,
                &mut f.roster,
                &mut f.history,
                &f.watchers,
                finder(),
            )
            .unwrap();
        let finished = f
            .round
            .force_end(&mut f.roster, &mut f.history, &f.watchers, finder())
            .unwrap();

        assert!(finished);
        assert_eq!(f.round.answers[&b].evaluation, None);
        // No verdict: no life charged, no points
        assert_eq!(f.roster.get(b).unwrap().lives, 3);
        assert_eq!(f.history.score(b).unwrap().points, 0);
    }

    #[test]
    fn test_unanswered_round_breaks_streak() {
        let mut f = fixture(EvaluationMode::HostEvaluates, 2, 3);
        let (a, b) = (f.players[0], f.players[1]);
        f.roster.record_correct(b);
        assert_eq!(f.roster.get(b).unwrap().streak, 1);

        submit(&mut f, a, "forty-two").unwrap();
        f.round
            .force_end(&mut f.roster, &mut f.history, &f.watchers, finder())
            .unwrap();
        f.round
            .evaluate(
                a,
                Verdict::Correct,
                &mut f.roster,
                &mut f.history,
                &f.watchers,
                finder(),
            )
            .unwrap();

        assert_eq!(f.roster.get(b).unwrap().streak, 0);
    }

    #[test]
    fn test_board_updates_overwrite_and_survive_submission() {
        let mut f = fixture(EvaluationMode::HostEvaluates, 2, 3);
        let a = f.players[0];

        f.round
            .board_update(a, "stroke-1".to_owned(), &f.roster, &f.watchers, finder())
            .unwrap();
        f.round
            .board_update(a, "stroke-2".to_owned(), &f.roster, &f.watchers, finder())
            .unwrap();

        assert_eq!(f.round.boards[&a], "stroke-2");
    }

    #[test]
    fn test_oversized_payloads_rejected() {
        let mut f = fixture(EvaluationMode::HostEvaluates, 2, 3);
        let a = f.players[0];

        let long_text = "a".repeat(crate::constants::answer::MAX_TEXT_LENGTH + 1);
        assert_eq!(submit(&mut f, a, &long_text), Err(Error::AnswerTooLong));

        let huge_board = "b".repeat(crate::constants::drawing::MAX_BYTES + 1);
        assert_eq!(
            f.round
                .board_update(a, huge_board, &f.roster, &f.watchers, finder()),
            Err(Error::DrawingTooLarge)
        );
    }

    #[test]
    fn test_evaluate_unknown_answer_rejected() {
        let mut f = fixture(EvaluationMode::HostEvaluates, 2, 3);
        let a = f.players[0];

        submit(&mut f, a, "forty-two").unwrap();
        f.round
            .force_end(&mut f.roster, &mut f.history, &f.watchers, finder())
            .unwrap();

        let result = f.round.evaluate(
            f.players[1],
            Verdict::Correct,
            &mut f.roster,
            &mut f.history,
            &f.watchers,
            finder(),
        );
        assert_eq!(result, Err(Error::NoSuchAnswer));
    }

    #[test]
    fn test_correction_after_round_over_amends_history() {
        let mut f = fixture(EvaluationMode::HostEvaluates, 2, 3);
        let (a, b) = (f.players[0], f.players[1]);

        submit(&mut f, a, "forty-two").unwrap();
        submit(&mut f, b, "41").unwrap();

        f.round
            .evaluate(
                a,
                Verdict::Correct,
                &mut f.roster,
                &mut f.history,
                &f.watchers,
                finder(),
            )
            .unwrap();
        f.round
            .evaluate(
                b,
                Verdict::Incorrect,
                &mut f.roster,
                &mut f.history,
                &f.watchers,
                finder(),
            )
            .unwrap();
        assert_eq!(f.round.phase(), Phase::Over);
        assert_eq!(f.history.score(b).unwrap().points, 0);

        f.round
            .evaluate(
                b,
                Verdict::Correct,
                &mut f.roster,
                &mut f.history,
                &f.watchers,
                finder(),
            )
            .unwrap();
        assert!(f.history.score(b).unwrap().points > 0);
    }

    #[test]
    fn test_state_message_role_scoping_during_question() {
        let mut f = fixture(EvaluationMode::HostEvaluates, 2, 3);
        let a = f.players[0];
        submit(&mut f, a, "forty-two").unwrap();

        let host_view = f.round.state_message(
            f.host,
            ValueKind::Host,
            &f.roster,
            &f.history,
            &f.watchers,
            1,
            finder(),
        );
        match host_view {
            SyncMessage::Question {
                reference, boards, ..
            } => {
                assert_eq!(reference, Some("42".to_owned()));
                assert!(boards.is_some());
            }
            other => panic!("expected question sync, got {other:?}"),
        }

        let player_view = f.round.state_message(
            f.players[1],
            ValueKind::Player,
            &f.roster,
            &f.history,
            &f.watchers,
            1,
            finder(),
        );
        match player_view {
            SyncMessage::Question {
                reference,
                boards,
                own_answer,
                answered_count,
                ..
            } => {
                assert_eq!(reference, None);
                assert!(boards.is_none());
                assert!(own_answer.is_none());
                assert_eq!(answered_count, 1);
            }
            other => panic!("expected question sync, got {other:?}"),
        }
    }

    #[test]
    fn test_state_message_restores_own_answer_after_reconnect() {
        let mut f = fixture(EvaluationMode::HostEvaluates, 2, 3);
        let a = f.players[0];
        submit(&mut f, a, "forty-two").unwrap();
        f.round
            .board_update(a, "sketch".to_owned(), &f.roster, &f.watchers, finder())
            .unwrap();

        let view = f.round.state_message(
            a,
            ValueKind::Player,
            &f.roster,
            &f.history,
            &f.watchers,
            1,
            finder(),
        );
        match view {
            SyncMessage::Question {
                own_answer,
                own_board,
                ..
            } => {
                let own = own_answer.expect("own answer present");
                assert_eq!(own.text, "forty-two");
                assert_eq!(own_board, Some("sketch".to_owned()));
            }
            other => panic!("expected question sync, got {other:?}"),
        }
    }
}
