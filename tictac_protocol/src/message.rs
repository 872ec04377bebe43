// Protocol messages for client-server communication.
//
// Two enums define the full protocol vocabulary:
// - `ClientMessage`: sent by game clients to the session server.
// - `ServerMessage`: sent by the session server to game clients.
//
// Every wire line is a JSON object with a `type` discriminant
// (`#[serde(tag = "type")]`), e.g. `{"type":"move","position":5}`. Clients
// key their behavior off `type` alone — no text sniffing. Server messages
// all carry a human-readable `message` string for display; messages that
// describe the game state add a 9-cell `board` array.

use serde::{Deserialize, Serialize};

use crate::types::{RestartChoice, Seat};

/// A board snapshot on the wire: 9 cells, row-major, `null` when empty.
pub type BoardCells = [Option<Seat>; 9];

/// Messages sent by a client to the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Supplies the display name asked for by `username_request`.
    UsernameResponse { username: String },
    /// Attempt to claim a cell (positions 1-9).
    Move { position: u8 },
    /// Vote on a rematch after the game concluded.
    RestartDecision { decision: RestartChoice },
    /// Voluntary termination of the whole session.
    Quit,
}

/// Messages sent by the server to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Ask the peer to identify itself.
    UsernameRequest { message: String },
    /// Informational ack (seat assignment and the like).
    Response { message: String },
    /// Game (re)started; board included.
    Start { message: String, board: BoardCells },
    /// A move was accepted; next player's turn.
    Turn { message: String, board: BoardCells },
    /// Request rejected, no state change.
    Error { message: String },
    /// Game or session terminated. Carries the final board when one exists.
    End {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        board: Option<BoardCells>,
    },
    /// Ask both peers to vote on a rematch.
    PromptRestart { message: String },
    /// Informs a remaining peer that the opponent left.
    DisconnectNotice { message: String },
}
