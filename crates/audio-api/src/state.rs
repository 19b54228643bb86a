//! Lifecycle state of an audio session.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical lifecycle state of an audio session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioSessionState {
    /// The session has no active streams.
    Inactive,
    /// At least one stream in the session is running.
    Active,
    /// The session has no streams and no remaining control handles.
    Expired,
}

impl AudioSessionState {
    /// Translates a native state code.
    ///
    /// The subsystem reports 0 for inactive, 1 for active and 2 for expired.
    /// Any other value yields `None`.
    pub fn from_native(code: u32) -> Option<Self> {
        match code {
            0 => Some(AudioSessionState::Inactive),
            1 => Some(AudioSessionState::Active),
            2 => Some(AudioSessionState::Expired),
            _ => None,
        }
    }

    /// Returns the native state code for this state.
    pub fn as_native(self) -> u32 {
        match self {
            AudioSessionState::Inactive => 0,
            AudioSessionState::Active => 1,
            AudioSessionState::Expired => 2,
        }
    }
}

impl fmt::Display for AudioSessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AudioSessionState::Inactive => "inactive",
            AudioSessionState::Active => "active",
            AudioSessionState::Expired => "expired",
        };
        f.write_str(name)
    }
}
