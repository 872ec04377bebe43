// Core protocol types shared by both sides of the wire.
//
// `Seat` and `RestartChoice` appear directly in protocol messages
// (`message.rs`); `ConnId` is the server-side connection handle used by the
// session registry (`tictac_server::session`). These are session-scoped
// values — the server assigns compact ids to sockets for bookkeeping, and
// nothing survives a reconnect.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the two player identities in a game. `X` is assigned first and
/// always moves first in a fresh game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Seat {
    X,
    O,
}

impl Seat {
    /// The opposing seat.
    pub fn other(self) -> Self {
        match self {
            Seat::X => Seat::O,
            Seat::O => Seat::X,
        }
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seat::X => write!(f, "X"),
            Seat::O => write!(f, "O"),
        }
    }
}

/// A rematch vote. Serializes as `"y"` / `"n"` on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartChoice {
    #[serde(rename = "y")]
    Yes,
    #[serde(rename = "n")]
    No,
}

/// Server-assigned connection id (compact u32, never reused within a run).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnId(pub u32);
