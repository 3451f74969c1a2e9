//! Configuration constants for the quizroom game system
//!
//! This module contains all the configuration limits and constraints
//! used throughout the game system to ensure data integrity and
//! provide consistent boundaries for different game components.

/// Room-level configuration constants
pub mod room {
    /// Maximum number of participants allowed in a single room
    pub const MAX_PLAYER_COUNT: usize = 200;
    /// Maximum number of questions a single game may be started with
    pub const MAX_QUESTION_COUNT: usize = 100;
    /// Seconds a room survives without a live host connection before it closes
    pub const HOST_GRACE_SECONDS: u64 = 90;
    /// Attempts made to find an unused room code before giving up
    pub const CODE_ATTEMPTS: usize = 64;
    /// Default number of lives a player starts the game with
    pub const DEFAULT_LIVES: u8 = 3;
    /// Maximum configurable number of starting lives
    pub const MAX_LIVES: u8 = 9;
}

/// Round timing constants
pub mod timing {
    /// Minimum time limit in seconds for a timed round
    pub const MIN_TIME_LIMIT: u64 = 5;
    /// Maximum time limit in seconds for a timed round
    pub const MAX_TIME_LIMIT: u64 = 600;
}

/// Question content constants
pub mod question {
    /// Maximum length of a question prompt in characters
    pub const MAX_PROMPT_LENGTH: usize = 500;
    /// Maximum length of a reference answer in characters
    pub const MAX_REFERENCE_LENGTH: usize = 500;
    /// Maximum length of a subject/grade/language tag
    pub const MAX_TAG_LENGTH: usize = 100;
}

/// Answer submission constants
pub mod answer {
    /// Maximum length of a submitted answer text in characters
    pub const MAX_TEXT_LENGTH: usize = 1000;
}

/// Drawing payload constants
pub mod drawing {
    /// Maximum size of a serialized drawing payload in bytes
    pub const MAX_BYTES: usize = 4 * 1024 * 1024;
}

/// Display name constants
pub mod name {
    /// Maximum length of a display name in characters
    pub const MAX_LENGTH: usize = 30;
}

/// Scoring constants (used when the room runs in points mode)
pub mod score {
    /// Base points for a correct answer
    pub const BASE_POINTS: u64 = 100;
    /// Maximum time bonus, decaying linearly to zero over the time limit
    pub const TIME_BONUS_MAX: u64 = 50;
    /// Order bonus for the first submission; each later rank gets one step less
    pub const ORDER_BONUS_MAX: u64 = 30;
    /// How much the order bonus shrinks per submission rank
    pub const ORDER_BONUS_STEP: u64 = 10;
    /// Streak multiplier growth per consecutive correct answer, in percent
    pub const STREAK_STEP_PERCENT: u32 = 10;
    /// Number of consecutive correct answers after which the multiplier stops growing
    pub const STREAK_CAP: u32 = 5;
}
