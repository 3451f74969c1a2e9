//! Room lifecycle and event routing
//!
//! This module contains the room struct: the single authoritative owner of
//! one game session's state. Every inbound event, client messages and
//! timer alarms alike, enters through `receive_message`/`receive_alarm` on
//! `&mut Room`, so events for one room can never interleave; whatever lock
//! or task the embedder wraps a room in, one event runs at a time. The room
//! validates the sender's role, drives the lifecycle state machine, and
//! pushes role-scoped updates and snapshots to everyone connected.

use std::fmt::Debug;

use garde::Validate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use thiserror::Error as ThisError;
use web_time::{Duration, SystemTime};

use super::{
    TruncatedVec,
    names::{self, Names},
    player::{Role, Roster},
    question::Question,
    recap::{History, Recap, RecapEntry, StandingsMessage},
    room_code::RoomCode,
    round::{EvaluationMode, Round, Verdict},
    session::Tunnel,
    watcher::{self, Id, Value, ValueKind, Watchers},
};

/// Represents the current phase of a room's life
///
/// A room starts in the lobby, runs a round per question, concludes, and
/// can show a recap before being reset for another game. The round itself
/// carries its own sub-phases (answering, evaluating, over).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum State {
    /// Waiting for players to join before the host starts the game
    Lobby,
    /// A question is being played (answering, evaluating, or just finished)
    Round(Box<Round>),
    /// The game is over; the winner (if any) has been declared
    Concluded {
        /// Winner by attrition or by final standings, if one was determined
        winner: Option<Id>,
    },
    /// The round-by-round recap is on display
    RecapShown,
}

/// Options affecting the overall behavior of a game
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate)]
pub struct RoomOptions {
    /// Whether points are awarded (lives are always tracked)
    #[garde(skip)]
    pub points: bool,
    /// Lives each player starts with
    #[garde(range(min = 1, max = crate::constants::room::MAX_LIVES))]
    pub lives: u8,
}

impl Default for RoomOptions {
    /// Points on, default lives
    fn default() -> Self {
        Self {
            points: true,
            lives: crate::constants::room::DEFAULT_LIVES,
        }
    }
}

/// Validates an optional round time limit against the configured bounds
fn validate_time_limit(val: &Option<Duration>, _ctx: &()) -> garde::Result {
    match val {
        None => Ok(()),
        Some(limit)
            if (crate::constants::timing::MIN_TIME_LIMIT
                ..=crate::constants::timing::MAX_TIME_LIMIT)
                .contains(&limit.as_secs()) =>
        {
            Ok(())
        }
        Some(_) => Err(garde::Error::new(format!(
            "time limit is outside of the bounds [{},{}]",
            crate::constants::timing::MIN_TIME_LIMIT,
            crate::constants::timing::MAX_TIME_LIMIT
        ))),
    }
}

/// Everything the host supplies to start a game
#[serde_with::serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StartConfig {
    /// The questions to play, in order
    #[garde(length(min = 1, max = crate::constants::room::MAX_QUESTION_COUNT), dive)]
    pub questions: Vec<Question>,
    /// Per-round time limit; `None` runs untimed rounds
    #[garde(custom(validate_time_limit))]
    #[serde_as(as = "Option<serde_with::DurationMilliSeconds<u64>>")]
    pub time_limit: Option<Duration>,
    /// How answers get their verdicts
    #[garde(skip)]
    pub evaluation_mode: EvaluationMode,
    /// Game options
    #[garde(dive)]
    pub options: RoomOptions,
}

/// Why a room was torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    /// The host disconnected and did not return within the grace window
    HostAbandoned,
}

/// Recoverable faults reported to the client that caused them
///
/// None of these affect the room or any other client; the offender gets an
/// error notice and authoritative state stays as it was.
#[derive(ThisError, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The sender's role may not perform this action
    #[error("action not allowed for this role")]
    Unauthorized,
    /// The action does not apply to the room's current state
    #[error("that action is not available right now")]
    StateConflict,
    /// Starting needs at least two competing players
    #[error("at least two players are required to start")]
    NotEnoughPlayers,
    /// The start configuration failed validation
    #[error("invalid game configuration")]
    InvalidConfig,
    /// Only competing players can submit, draw, and vote
    #[error("only competing players can do that")]
    NotCompeting,
    /// One answer per player per round
    #[error("an answer was already submitted this round")]
    AlreadyAnswered,
    /// Submitted answer text exceeds the length bound
    #[error("answer text is too long")]
    AnswerTooLong,
    /// Drawing payload exceeds the size bound
    #[error("drawing exceeds the maximum allowed size")]
    DrawingTooLarge,
    /// Players cannot vote on their own answer
    #[error("players cannot vote on their own answer")]
    SelfVote,
    /// The referenced player has no answer this round
    #[error("no answer from that player this round")]
    NoSuchAnswer,
    /// Recap navigation outside the recorded rounds
    #[error("no such recap page")]
    RecapOutOfRange,
}

/// Messages received from different types of participants
///
/// Incoming messages are categorized by the sender's role; a message is
/// only processed when its category matches the sender's registered role.
#[derive(Debug, Deserialize, Clone)]
pub enum IncomingMessage {
    /// Messages from disconnected clients trying to reconnect
    Ghost(IncomingGhostMessage),
    /// Messages from the room host
    Host(IncomingHostMessage),
    /// Messages from connections that have not picked a name yet
    Unassigned(IncomingUnassignedMessage),
    /// Messages from named participants
    Player(IncomingPlayerMessage),
}

impl IncomingMessage {
    /// Validates that a message matches the sender's participant type
    fn follows(&self, sender_kind: ValueKind) -> bool {
        matches!(
            (self, sender_kind),
            (IncomingMessage::Host(_), ValueKind::Host)
                | (IncomingMessage::Player(_), ValueKind::Player)
                | (IncomingMessage::Unassigned(_), ValueKind::Unassigned)
        )
    }
}

/// Messages that can be sent by named participants
#[derive(Debug, Deserialize, Clone)]
pub enum IncomingPlayerMessage {
    /// Submit the answer for the current round
    SubmitAnswer {
        /// The answer text
        text: String,
        /// Whether a drawing accompanies the answer
        has_drawing: bool,
        /// The drawing payload, if any
        drawing: Option<String>,
    },
    /// Replace the player's live board with a new drawing state
    BoardUpdate(String),
    /// Cast or change a vote on another player's answer (community mode)
    Vote {
        /// Whose answer the vote is about
        owner: Id,
        /// The voter's verdict
        verdict: Verdict,
    },
}

/// Messages that can be sent by unassigned connections
#[derive(Debug, Deserialize, Clone)]
pub enum IncomingUnassignedMessage {
    /// Request a display name and become a participant
    NameRequest(String),
}

/// Messages that can be sent by disconnected clients trying to reconnect
///
/// These are resolved by the embedder against the registry (claiming an
/// identity rebinds the transport) and therefore never reach
/// `receive_message`; the variants document the wire protocol.
#[derive(Debug, Deserialize, Clone)]
pub enum IncomingGhostMessage {
    /// Request a fresh identity
    DemandId,
    /// Reclaim an existing identity after a disconnect
    ClaimId(Id),
}

/// Messages that can be sent by the room host
#[derive(Debug, Deserialize, Clone)]
pub enum IncomingHostMessage {
    /// Start the game with the given questions and settings (lobby only)
    Start(StartConfig),
    /// Advance past a finished round to the next question or to conclusion
    Next,
    /// Close the current stage of the round early
    ForceEnd,
    /// Deliver or correct a verdict on a player's answer
    Evaluate {
        /// The answer's owner
        player: Id,
        /// The verdict
        verdict: Verdict,
    },
    /// Move from the concluded screen to the recap
    ShowRecap,
    /// Navigate the recap to a specific round (broadcast to all viewers)
    RecapNavigate(usize),
    /// Reset the room for a fresh game with the same participants
    Restart,
    /// Lock or unlock the room to new participants
    Lock(bool),
}

/// Update messages sent to participants about room-level changes
#[skip_serializing_none]
#[derive(Debug, Serialize, Clone)]
pub enum UpdateMessage {
    /// Assign a persistent identity to a participant
    IdAssign(Id),
    /// Prompt the participant to choose a name
    NameChoose,
    /// Confirm a name assignment
    NameAssign(String),
    /// Report an error with name validation
    NameError(names::Error),
    /// Report a recoverable fault to the participant who caused it
    Error(Error),
    /// Update the lobby roster
    WaitingScreen(TruncatedVec<String>),
    /// The game is over
    GameConcluded {
        /// Display name of the winner, if one was determined
        winner: Option<String>,
        /// Final standings
        standings: StandingsMessage,
    },
    /// Show a recap page (sent on recap start and on every navigation)
    Recap {
        /// Zero-based index of the shown round
        index: usize,
        /// Total number of recorded rounds
        count: usize,
        /// The round's immutable aggregate
        entry: RecapEntry,
    },
    /// The room is being torn down
    RoomClosed(CloseReason),
}

/// Sync messages carrying complete room-level state for one participant
#[skip_serializing_none]
#[derive(Debug, Serialize, Clone)]
pub enum SyncMessage {
    /// Sync the lobby roster
    WaitingScreen(TruncatedVec<String>),
    /// Sync the concluded screen
    Concluded {
        /// Display name of the winner, if one was determined
        winner: Option<String>,
        /// Final standings
        standings: StandingsMessage,
        /// The recipient's own points per round, players only
        points_by_round: Option<Vec<u64>>,
    },
    /// Sync the currently shown recap page
    Recap {
        /// Zero-based index of the shown round
        index: usize,
        /// Total number of recorded rounds
        count: usize,
        /// The round's immutable aggregate, absent if nothing was recorded
        entry: Option<RecapEntry>,
    },
    /// Sync metadata about the participant's own standing in the room
    Metainfo(MetainfoMessage),
    /// Participant is not allowed to view the room right now
    NotAllowed,
}

/// Metadata about the recipient's own standing in the room
#[derive(Debug, Serialize, Clone)]
pub enum MetainfoMessage {
    /// Information for the room host
    Host {
        /// Whether the room is locked to new participants
        locked: bool,
    },
    /// Information for a named participant
    Player {
        /// Remaining lives
        lives: u8,
        /// Total points earned
        score: u64,
        /// Current streak of consecutive correct answers
        streak: u32,
        /// Current role
        role: Role,
    },
}

/// Decision carried out of the borrow of the current round
enum AfterRound {
    /// Nothing further to do
    Nothing,
    /// The game must conclude with this winner
    Conclude(Option<Id>),
}

/// The authoritative state of one room
///
/// Owns every piece of game state: participants, names, roster, score
/// history, the current round, and the recap. Clients only ever hold
/// projections of it, pushed as updates and snapshots.
#[derive(Serialize, Deserialize)]
pub struct Room {
    /// The room's join code
    code: RoomCode,
    /// Persistent identity of the host; survives host reconnects
    host_id: Id,
    /// Participants and their connections
    pub watchers: Watchers,
    /// Display name assignments
    names: Names,
    /// Lives, streaks, and roles
    roster: Roster,
    /// Points per round with standings
    history: History,
    /// Round-by-round recap, filled as rounds finish
    recap: Recap,
    /// Current lifecycle state
    pub state: State,
    /// Whether the room is locked to new participants
    locked: bool,
    /// Questions of the current game, set at start
    questions: Vec<Question>,
    /// Per-round time limit of the current game
    time_limit: Option<Duration>,
    /// How answers get their verdicts in the current game
    evaluation_mode: EvaluationMode,
    /// Game options of the current game
    options: RoomOptions,
    /// Bumped whenever the room leaves a timed context, making older
    /// deadline alarms detectably stale
    timer_generation: u64,
    /// When the host's connection dropped, if they are currently absent
    host_absent_since: Option<SystemTime>,
}

impl Debug for Room {
    /// Custom debug implementation that avoids printing large amounts of data
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("code", &self.code)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Room {
    /// Creates a room in the lobby, owned by the given host identity
    pub fn new(code: RoomCode, host_id: Id) -> Self {
        Self {
            code,
            host_id,
            watchers: Watchers::with_host_id(host_id),
            names: Names::default(),
            roster: Roster::default(),
            history: History::default(),
            recap: Recap::default(),
            state: State::Lobby,
            locked: false,
            questions: Vec::new(),
            time_limit: None,
            evaluation_mode: EvaluationMode::HostEvaluates,
            options: RoomOptions::default(),
            timer_generation: 0,
            host_absent_since: None,
        }
    }

    /// The room's join code
    pub fn code(&self) -> RoomCode {
        self.code
    }

    /// Persistent identity of the host
    pub fn host_id(&self) -> Id {
        self.host_id
    }

    /// Reports a recoverable fault to the participant who caused it
    fn report<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &self,
        error: Error,
        watcher_id: Id,
        tunnel_finder: F,
    ) {
        self.watchers
            .send_message(&UpdateMessage::Error(error).into(), watcher_id, tunnel_finder);
    }

    /// Generates the lobby roster for the waiting screen
    fn waiting_screen_names<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &self,
        tunnel_finder: F,
    ) -> TruncatedVec<String> {
        const LIMIT: usize = 50;

        let player_names = self
            .watchers
            .specific_vec(ValueKind::Player, tunnel_finder)
            .into_iter()
            .filter_map(|(_, _, x)| match x {
                Value::Player(name) => Some(name),
                _ => None,
            })
            .unique();

        TruncatedVec::new(
            player_names,
            LIMIT,
            self.watchers.specific_count(ValueKind::Player),
        )
    }

    /// Sends a participant their own metadata
    fn update_with_metainfo<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &self,
        watcher_id: Id,
        tunnel_finder: F,
    ) {
        let message = if watcher_id == self.host_id {
            MetainfoMessage::Host {
                locked: self.locked,
            }
        } else {
            let Some(player) = self.roster.get(watcher_id) else {
                return;
            };
            MetainfoMessage::Player {
                lives: player.lives,
                score: self.history.score(watcher_id).map_or(0, |s| s.points),
                streak: player.streak,
                role: player.role,
            }
        };

        self.watchers
            .send_state(&SyncMessage::Metainfo(message).into(), watcher_id, tunnel_finder);
    }

    /// Resolves a participant id to a display name
    fn display_name(&self, id: Id) -> String {
        self.watchers
            .get_name(id)
            .unwrap_or_else(|| "Unknown".to_owned())
    }

    /// Standings rendered with display names
    fn standings_message(&self) -> StandingsMessage {
        let [current, prior] = self.history.last_two_scores_descending();
        let id_score_map = |(id, s)| (self.display_name(id), s);
        StandingsMessage {
            current: current.map(id_score_map),
            prior: prior.map(id_score_map),
        }
    }

    /// Assigns a name and promotes the connection to a participant
    ///
    /// In the lobby the newcomer joins as a competitor; while a game is in
    /// progress they join as a spectator and compete from the next restart.
    fn assign_player_name<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        watcher_id: Id,
        name: &str,
        tunnel_finder: F,
    ) -> Result<(), names::Error> {
        let name = self.names.set_name(watcher_id, name)?;

        self.watchers
            .update_watcher_value(watcher_id, Value::Player(name.clone()));

        match self.state {
            State::Lobby => {
                self.roster
                    .add_active(watcher_id, crate::constants::room::DEFAULT_LIVES);
            }
            _ => self.roster.add_spectator(watcher_id),
        }

        self.watchers.send_message(
            &UpdateMessage::NameAssign(name).into(),
            watcher_id,
            &tunnel_finder,
        );

        self.update_with_metainfo(watcher_id, &tunnel_finder);

        if matches!(self.state, State::Lobby) {
            self.watchers.announce(
                &UpdateMessage::WaitingScreen(self.waiting_screen_names(&tunnel_finder)).into(),
                &tunnel_finder,
            );
        }

        self.watchers.send_state(
            &self.state_message(watcher_id, ValueKind::Player, &tunnel_finder),
            watcher_id,
            tunnel_finder,
        );

        Ok(())
    }

    /// Adds a new unassigned connection to the room
    ///
    /// If the room is not locked, the connection is prompted to choose a
    /// name.
    ///
    /// # Errors
    ///
    /// Returns a `watcher::Error` if the room is full.
    pub fn add_unassigned<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        watcher: Id,
        tunnel_finder: F,
    ) -> Result<(), watcher::Error> {
        self.watchers.add_watcher(watcher, Value::Unassigned)?;

        self.watchers
            .send_message(&UpdateMessage::IdAssign(watcher).into(), watcher, &tunnel_finder);

        if !self.locked {
            self.watchers
                .send_message(&UpdateMessage::NameChoose.into(), watcher, tunnel_finder);
        }

        Ok(())
    }

    /// Starts the round at `index`, scheduling its deadline if timed
    fn start_round<T: Tunnel, F: Fn(Id) -> Option<T>, S: FnMut(crate::AlarmMessage, Duration)>(
        &mut self,
        index: usize,
        schedule_message: S,
        tunnel_finder: F,
    ) {
        self.timer_generation += 1;
        let mut round = Round::new(
            index,
            self.timer_generation,
            self.questions[index].clone(),
            self.time_limit,
            self.evaluation_mode,
            self.options.points,
        );
        round.play(
            &self.watchers,
            schedule_message,
            &tunnel_finder,
            self.questions.len(),
        );
        self.state = State::Round(Box::new(round));
    }

    /// Handles the host's start request
    fn start_game<T: Tunnel, F: Fn(Id) -> Option<T>, S: FnMut(crate::AlarmMessage, Duration)>(
        &mut self,
        config: StartConfig,
        schedule_message: S,
        tunnel_finder: F,
    ) -> Result<(), Error> {
        if !matches!(self.state, State::Lobby) {
            return Err(Error::StateConflict);
        }
        if config.validate().is_err() {
            return Err(Error::InvalidConfig);
        }
        if self.roster.active_count() < 2 {
            return Err(Error::NotEnoughPlayers);
        }

        let StartConfig {
            questions,
            time_limit,
            evaluation_mode,
            options,
        } = config;

        self.questions = questions;
        self.time_limit = time_limit;
        self.evaluation_mode = evaluation_mode;
        self.options = options;
        self.roster.reset_for_restart(options.lives);
        self.history.reset();
        self.recap.reset();

        self.start_round(0, schedule_message, tunnel_finder);

        Ok(())
    }

    /// Concludes the game, pushing the current round into the recap
    ///
    /// Without an attrition winner, the top of the standings wins in points
    /// mode; lives-only games conclude without a single winner.
    fn conclude<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        winner: Option<Id>,
        tunnel_finder: F,
    ) {
        self.timer_generation += 1;

        let winner = winner.or_else(|| self.options.points.then(|| self.history.leader()).flatten());

        let prior = std::mem::replace(&mut self.state, State::Concluded { winner });
        if let State::Round(round) = prior {
            self.recap.push(round.to_recap_entry(&self.watchers));
        }

        self.watchers.announce(
            &UpdateMessage::GameConcluded {
                winner: winner.map(|id| self.display_name(id)),
                standings: self.standings_message(),
            }
            .into(),
            tunnel_finder,
        );
    }

    /// Broadcasts the currently selected recap page to every viewer
    fn announce_recap_page<T: Tunnel, F: Fn(Id) -> Option<T>>(&self, tunnel_finder: F) {
        let Some(entry) = self.recap.entries().get(self.recap.selected()) else {
            return;
        };

        self.watchers.announce(
            &UpdateMessage::Recap {
                index: self.recap.selected(),
                count: self.recap.entries().len(),
                entry: entry.clone(),
            }
            .into(),
            tunnel_finder,
        );
    }

    /// Handles incoming messages from participants
    ///
    /// Validates that the message matches the sender's role, dispatches on
    /// the current lifecycle state, and reports recoverable faults back to
    /// the sender only. Events for one room are applied one at a time; the
    /// timer alarm goes through the same path (`receive_alarm`), so a
    /// submission and a deadline racing each other resolve in whatever
    /// order they were serialized, never interleaved.
    pub fn receive_message<
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(crate::AlarmMessage, Duration),
    >(
        &mut self,
        watcher_id: Id,
        message: IncomingMessage,
        schedule_message: S,
        tunnel_finder: F,
    ) {
        let Some(watcher_value) = self.watchers.get_watcher_value(watcher_id) else {
            return;
        };

        if !message.follows(watcher_value.kind()) {
            self.report(Error::Unauthorized, watcher_id, &tunnel_finder);
            return;
        }

        match message {
            IncomingMessage::Unassigned(_) if self.locked => {}
            IncomingMessage::Host(IncomingHostMessage::Lock(lock_state)) => {
                self.locked = lock_state;
            }
            IncomingMessage::Unassigned(IncomingUnassignedMessage::NameRequest(s)) => {
                if let Err(e) = self.assign_player_name(watcher_id, &s, &tunnel_finder) {
                    self.watchers.send_message(
                        &UpdateMessage::NameError(e).into(),
                        watcher_id,
                        tunnel_finder,
                    );
                }
            }
            IncomingMessage::Host(IncomingHostMessage::Start(config)) => {
                if let Err(e) = self.start_game(config, schedule_message, &tunnel_finder) {
                    self.report(e, watcher_id, &tunnel_finder);
                }
            }
            IncomingMessage::Host(IncomingHostMessage::ShowRecap) => {
                if matches!(self.state, State::Concluded { .. }) {
                    self.state = State::RecapShown;
                    self.announce_recap_page(&tunnel_finder);
                } else {
                    self.report(Error::StateConflict, watcher_id, &tunnel_finder);
                }
            }
            IncomingMessage::Host(IncomingHostMessage::RecapNavigate(index)) => {
                if !matches!(self.state, State::RecapShown) {
                    self.report(Error::StateConflict, watcher_id, &tunnel_finder);
                } else if self.recap.navigate(index) {
                    self.announce_recap_page(&tunnel_finder);
                } else {
                    self.report(Error::RecapOutOfRange, watcher_id, &tunnel_finder);
                }
            }
            IncomingMessage::Host(IncomingHostMessage::Restart) => {
                if matches!(self.state, State::RecapShown) {
                    self.restart(&tunnel_finder);
                } else {
                    self.report(Error::StateConflict, watcher_id, &tunnel_finder);
                }
            }
            message => self.receive_round_message(watcher_id, message, schedule_message, tunnel_finder),
        }
    }

    /// Dispatches messages that act on the current round
    fn receive_round_message<
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(crate::AlarmMessage, Duration),
    >(
        &mut self,
        watcher_id: Id,
        message: IncomingMessage,
        schedule_message: S,
        tunnel_finder: F,
    ) {
        let after = {
            let State::Round(round) = &mut self.state else {
                match message {
                    // A stray host Next in the lobby or after conclusion
                    IncomingMessage::Host(_) | IncomingMessage::Player(_) => {
                        self.report(Error::StateConflict, watcher_id, &tunnel_finder);
                    }
                    _ => {}
                }
                return;
            };

            let result = match message {
                IncomingMessage::Player(IncomingPlayerMessage::SubmitAnswer {
                    text,
                    has_drawing,
                    drawing,
                }) => round.submit(
                    watcher_id,
                    text,
                    has_drawing,
                    drawing,
                    &mut self.roster,
                    &mut self.history,
                    &self.watchers,
                    &tunnel_finder,
                ),
                IncomingMessage::Player(IncomingPlayerMessage::BoardUpdate(board)) => round
                    .board_update(
                        watcher_id,
                        board,
                        &self.roster,
                        &self.watchers,
                        &tunnel_finder,
                    )
                    .map(|()| false),
                IncomingMessage::Player(IncomingPlayerMessage::Vote { owner, verdict }) => round
                    .vote(
                        watcher_id,
                        owner,
                        verdict,
                        &mut self.roster,
                        &mut self.history,
                        &self.watchers,
                        &tunnel_finder,
                    ),
                IncomingMessage::Host(IncomingHostMessage::Evaluate { player, verdict }) => round
                    .evaluate(
                        player,
                        verdict,
                        &mut self.roster,
                        &mut self.history,
                        &self.watchers,
                        &tunnel_finder,
                    ),
                IncomingMessage::Host(IncomingHostMessage::ForceEnd) => round.force_end(
                    &mut self.roster,
                    &mut self.history,
                    &self.watchers,
                    &tunnel_finder,
                ),
                IncomingMessage::Host(IncomingHostMessage::Next) => {
                    if round.phase() == crate::round::Phase::Over {
                        let next_index = round.index() + 1;
                        if next_index < self.questions.len() {
                            let entry = round.to_recap_entry(&self.watchers);
                            self.recap.push(entry);
                            self.start_round(next_index, schedule_message, &tunnel_finder);
                        } else {
                            self.conclude(None, &tunnel_finder);
                        }
                        return;
                    }
                    Err(Error::StateConflict)
                }
                _ => return,
            };

            match result {
                Err(e) => {
                    self.report(e, watcher_id, &tunnel_finder);
                    return;
                }
                Ok(_) => {
                    // A mid-game field of one ends the game on the spot,
                    // regardless of remaining questions or round phase. A
                    // field of zero (a batch eliminated everyone) ends it
                    // too, with no winner.
                    match self.roster.sole_active() {
                        Some(survivor) => AfterRound::Conclude(Some(survivor)),
                        None if self.roster.active_count() == 0 => AfterRound::Conclude(None),
                        None => AfterRound::Nothing,
                    }
                }
            }
        };

        match after {
            AfterRound::Nothing => {}
            AfterRound::Conclude(winner) => self.conclude(winner, &tunnel_finder),
        }
    }

    /// Handles scheduled alarm messages for timed round deadlines
    ///
    /// The alarm re-enters the room through the same serialized path as
    /// client events, and it is ignored unless its generation matches the
    /// current round's: a deadline scheduled for an earlier round can
    /// never fire against a later one.
    pub fn receive_alarm<
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(crate::AlarmMessage, Duration),
    >(
        &mut self,
        message: crate::AlarmMessage,
        _schedule_message: S,
        tunnel_finder: F,
    ) {
        let crate::AlarmMessage::Round(alarm) = message;

        if let State::Round(round) = &mut self.state {
            round.receive_alarm(
                &alarm,
                &mut self.roster,
                &mut self.history,
                &self.watchers,
                &tunnel_finder,
            );
        }
    }

    /// Resets the room for a fresh game with the same participants
    fn restart<T: Tunnel, F: Fn(Id) -> Option<T>>(&mut self, tunnel_finder: F) {
        self.timer_generation += 1;
        self.roster.reset_for_restart(self.options.lives);
        self.history.reset();
        self.recap.reset();
        self.state = State::Lobby;

        self.watchers.announce(
            &UpdateMessage::WaitingScreen(self.waiting_screen_names(&tunnel_finder)).into(),
            &tunnel_finder,
        );
    }

    /// Returns the message necessary to synchronize a participant's state
    ///
    /// Builds the complete role-scoped snapshot for the current lifecycle
    /// state. This is what a reconnecting client receives; it must replace
    /// any cached state with it.
    pub fn state_message<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &self,
        watcher_id: Id,
        watcher_kind: ValueKind,
        tunnel_finder: F,
    ) -> super::SyncMessage {
        match &self.state {
            State::Lobby => {
                SyncMessage::WaitingScreen(self.waiting_screen_names(tunnel_finder)).into()
            }
            State::Round(round) => round
                .state_message(
                    watcher_id,
                    watcher_kind,
                    &self.roster,
                    &self.history,
                    &self.watchers,
                    self.questions.len(),
                    tunnel_finder,
                )
                .into(),
            State::Concluded { winner } => SyncMessage::Concluded {
                winner: winner.map(|id| self.display_name(id)),
                standings: self.standings_message(),
                points_by_round: matches!(watcher_kind, ValueKind::Player)
                    .then(|| self.history.player_summary(watcher_id)),
            }
            .into(),
            State::RecapShown => SyncMessage::Recap {
                index: self.recap.selected(),
                count: self.recap.entries().len(),
                entry: self.recap.entries().get(self.recap.selected()).cloned(),
            }
            .into(),
        }
    }

    /// Pushes a complete snapshot to a (re)connecting participant
    ///
    /// The participant must not assume any cached state is valid: name,
    /// metadata, and the full state snapshot are all pushed again.
    pub fn update_session<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        watcher_id: Id,
        tunnel_finder: F,
    ) {
        let Some(watcher_value) = self.watchers.get_watcher_value(watcher_id) else {
            return;
        };

        match watcher_value.clone() {
            Value::Host => {
                self.watchers.send_state(
                    &self.state_message(watcher_id, watcher_value.kind(), &tunnel_finder),
                    watcher_id,
                    &tunnel_finder,
                );
                self.update_with_metainfo(watcher_id, tunnel_finder);
            }
            Value::Player(name) => {
                self.watchers.send_message(
                    &UpdateMessage::NameAssign(name).into(),
                    watcher_id,
                    &tunnel_finder,
                );
                self.update_with_metainfo(watcher_id, &tunnel_finder);
                self.watchers.send_state(
                    &self.state_message(watcher_id, watcher_value.kind(), &tunnel_finder),
                    watcher_id,
                    &tunnel_finder,
                );
            }
            Value::Unassigned if self.locked => {}
            Value::Unassigned => {
                self.watchers
                    .send_message(&UpdateMessage::NameChoose.into(), watcher_id, tunnel_finder);
            }
        }
    }

    /// Rebinds a persistent identity after a reconnect
    ///
    /// The embedder calls this once the new tunnel answers for the claimed
    /// id. Unknown ids are rejected so a stranger cannot claim a seat; the
    /// embedder then falls back to the fresh-identity path. Reclaiming the
    /// host identity clears the abandonment clock with room state
    /// untouched.
    ///
    /// # Returns
    ///
    /// `true` if the id was known and the session was synchronized.
    pub fn claim_id<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        claimed: Id,
        tunnel_finder: F,
    ) -> bool {
        if !self.watchers.has_watcher(claimed) {
            return false;
        }

        if claimed == self.host_id {
            self.host_absent_since = None;
        }
        self.roster.mark_connected(claimed);
        self.update_session(claimed, tunnel_finder);

        true
    }

    /// Notes a dropped connection
    ///
    /// State is retained in full; a host disconnect starts the abandonment
    /// clock checked by the registry sweep.
    pub fn handle_disconnect(&mut self, watcher_id: Id, now: SystemTime) {
        self.roster.mark_disconnected(watcher_id, now);
        if watcher_id == self.host_id {
            self.host_absent_since = Some(now);
        }
    }

    /// Whether the host has been absent past the grace window
    pub fn host_abandoned(&self, now: SystemTime) -> bool {
        self.host_absent_since.is_some_and(|since| {
            now.duration_since(since).unwrap_or_default()
                >= Duration::from_secs(crate::constants::room::HOST_GRACE_SECONDS)
        })
    }

    /// Tears the room down, notifying every member before their tunnel closes
    pub fn close<T: Tunnel, F: Fn(Id) -> Option<T>>(&mut self, reason: CloseReason, tunnel_finder: F) {
        self.timer_generation += 1;

        self.watchers
            .announce(&UpdateMessage::RoomClosed(reason).into(), &tunnel_finder);

        let watchers = self
            .watchers
            .vec(&tunnel_finder)
            .iter()
            .map(|(x, _, _)| *x)
            .collect_vec();

        for watcher in watchers {
            self.watchers
                .remove_watcher_session(&watcher, &tunnel_finder);
        }
    }
}
