//! Participant identifiers and initiator arbitration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier the signaling channel assigns to each connected client.
///
/// Unique for the lifetime of a signaling session and never reused, but not
/// stable across sessions: use it to address and arbitrate, not to persist.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Returns true when the local side sends the first offer to `remote`.
///
/// The greater identifier initiates. Both participants evaluate the same
/// comparison independently, so exactly one of them offers and no extra
/// negotiation round is needed to avoid glare.
pub fn is_initiator(local: &PeerId, remote: &PeerId) -> bool {
    local > remote
}
