//! Player name management and validation
//!
//! This module handles the assignment and validation of display names within
//! a room. It enforces case-insensitive uniqueness, filters inappropriate
//! content, and maintains bidirectional mappings between participant ids and
//! names.

use std::collections::{HashMap, HashSet, hash_map::Entry};

use rustrict::CensorStr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::watcher::Id;

/// Serialization helper for Names struct
#[derive(Deserialize)]
struct NamesSerde {
    mapping: HashMap<Id, String>,
}

/// Manages display names and their associations with participant ids
///
/// Uniqueness is case-insensitive: "Ada" and "ada" are the same name. The
/// original casing is preserved for display.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(from = "NamesSerde")]
pub struct Names {
    /// Primary mapping from participant id to display name
    mapping: HashMap<Id, String>,

    /// Reverse mapping from lowercased name to participant id (not serialized)
    #[serde(skip_serializing)]
    reverse_mapping: HashMap<String, Id>,
    /// Set of lowercased names for uniqueness checks (not serialized)
    #[serde(skip_serializing)]
    existing: HashSet<String>,
}

impl From<NamesSerde> for Names {
    /// Reconstructs the Names struct from serialized data
    ///
    /// This rebuilds the reverse mapping and existing-names set from the
    /// primary mapping, since those fields are not serialized.
    fn from(serde: NamesSerde) -> Self {
        let NamesSerde { mapping } = serde;
        let mut reverse_mapping = HashMap::new();
        let mut existing = HashSet::new();
        for (id, name) in &mapping {
            reverse_mapping.insert(name.to_lowercase(), *id);
            existing.insert(name.to_lowercase());
        }
        Self {
            mapping,
            reverse_mapping,
            existing,
        }
    }
}

/// Errors that can occur during name validation and assignment
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The requested name is already in use by another participant
    #[error("name already in-use")]
    Used,
    /// The participant already has an assigned name
    #[error("player has an existing name")]
    Assigned,
    /// The name is empty or contains only whitespace
    #[error("name cannot be empty")]
    Empty,
    /// The name contains inappropriate content
    #[error("name is inappropriate")]
    Sinful,
    /// The name exceeds the maximum allowed length
    #[error("name is too long")]
    TooLong,
}

impl Names {
    /// Retrieves the display name associated with a participant id
    pub fn get_name(&self, id: &Id) -> Option<String> {
        self.mapping.get(id).map(std::borrow::ToOwned::to_owned)
    }

    /// Assigns a name to a participant after validation
    ///
    /// The name is trimmed, checked for length and content, and compared
    /// case-insensitively against every name already in the room.
    ///
    /// # Returns
    ///
    /// The cleaned and assigned name on success.
    ///
    /// # Errors
    ///
    /// * `Error::TooLong` - name exceeds [`crate::constants::name::MAX_LENGTH`]
    /// * `Error::Empty` - name is empty after trimming whitespace
    /// * `Error::Sinful` - name contains inappropriate content
    /// * `Error::Used` - name is already taken (ignoring case)
    /// * `Error::Assigned` - participant already has a name
    pub fn set_name(&mut self, id: Id, name: &str) -> Result<String, Error> {
        if name.len() > crate::constants::name::MAX_LENGTH {
            return Err(Error::TooLong);
        }
        let name = rustrict::trim_whitespace(name);
        if name.is_empty() {
            return Err(Error::Empty);
        }
        if name.is_inappropriate() {
            return Err(Error::Sinful);
        }
        let folded = name.to_lowercase();
        if self.existing.contains(&folded) {
            return Err(Error::Used);
        }
        match self.mapping.entry(id) {
            Entry::Occupied(_) => Err(Error::Assigned),
            Entry::Vacant(v) => {
                v.insert(name.to_owned());
                self.existing.insert(folded.clone());
                self.reverse_mapping.insert(folded, id);
                Ok(name.to_owned())
            }
        }
    }

    /// Retrieves the participant id associated with a name (ignoring case)
    pub fn get_id(&self, name: &str) -> Option<Id> {
        self.reverse_mapping.get(&name.to_lowercase()).copied()
    }
}
