//! Deployment slot identifiers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::SlotError;

/// One of the two symmetric deployment slots.
///
/// Slot A is `blue` and slot B is `green`; those are the names the reverse
/// proxy's upstreams and routing directive use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    #[default]
    Blue,
    Green,
}

impl Slot {
    /// Both slots, in A/B order
    pub const ALL: [Slot; 2] = [Slot::Blue, Slot::Green];

    /// The opposite slot
    pub fn other(self) -> Slot {
        match self {
            Slot::Blue => Slot::Green,
            Slot::Green => Slot::Blue,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Slot::Blue => "blue",
            Slot::Green => "green",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Slot {
    type Err = SlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "blue" | "a" => Ok(Slot::Blue),
            "green" | "b" => Ok(Slot::Green),
            _ => Err(SlotError::ValidationError(format!(
                "Invalid slot: {:?}. Must be 'blue' (A) or 'green' (B)",
                s
            ))),
        }
    }
}
