//! Correlation key shared by a command and every event that answers it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Random id stamped on an outbound command.
///
/// The robot echoes it in the `transactionId` field of each result, which
/// is how the router finds the waiting callback. It is also the handle a
/// caller passes to `cancel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(uuid::Uuid);

impl TransactionId {
    /// Draws a fresh v4 id.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

/// Accepts any UUID spelling the robot may echo back (hyphenated, simple,
/// upper or lower case).
impl FromStr for TransactionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s).map(Self)
    }
}
