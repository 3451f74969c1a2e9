//! Room code generation and management
//!
//! This module provides the short, human-typeable identifiers used to join
//! active rooms. Codes are six decimal digits so they can be read off a
//! projector and typed on a phone keypad without ambiguity.

use std::{fmt::Display, num::ParseIntError, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize};

/// Minimum value for generated room codes (first six-digit number)
const MIN_VALUE: u32 = 100_000;
/// Exclusive maximum value for generated room codes
const MAX_VALUE: u32 = 1_000_000;

/// A short identifier for one active room
///
/// Codes are generated randomly within the six-digit range. Uniqueness among
/// active rooms is the registry's responsibility; a code may be reused after
/// its room is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoomCode(u32);

impl RoomCode {
    /// Creates a new random room code
    pub fn new() -> Self {
        Self(fastrand::u32(MIN_VALUE..MAX_VALUE))
    }
}

impl Default for RoomCode {
    /// Creates a new random room code (same as `new()`)
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RoomCode {
    /// Formats the room code as a six-digit decimal number
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

impl Serialize for RoomCode {
    /// Serializes the room code as a decimal string
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RoomCode {
    /// Deserializes a room code from a decimal string
    fn deserialize<D>(deserializer: D) -> Result<RoomCode, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        RoomCode::from_str(&s).map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}

impl FromStr for RoomCode {
    type Err = ParseIntError;

    /// Parses a room code from its decimal string representation
    ///
    /// # Errors
    ///
    /// Returns a `ParseIntError` if the string is not a decimal number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}
