// Game board: a 9-cell grid with placement rules and outcome detection.
//
// Positions are 1-based on the wire (cells 1-9, row-major) and 0-based
// internally. The board knows nothing about turn order — `session.rs`
// enforces whose move it is before calling `place`.

use std::fmt;

use tictac_protocol::message::BoardCells;
use tictac_protocol::types::Seat;

/// The 8 winning lines: 3 rows, 3 columns, 2 diagonals (0-based cells).
const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// Why a placement was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaceError {
    /// Position outside 1..=9.
    OutOfRange,
    /// Target cell already holds a symbol.
    Occupied,
}

impl fmt::Display for PlaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaceError::OutOfRange => write!(f, "Invalid position: choose a cell from 1 to 9."),
            PlaceError::Occupied => write!(f, "That position is already taken."),
        }
    }
}

impl std::error::Error for PlaceError {}

/// A decided game.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Win(Seat),
    Draw,
}

/// The 9-cell grid.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Board {
    cells: [Option<Seat>; 9],
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place `seat` at `position` (1-based, as on the wire).
    pub fn place(&mut self, position: u8, seat: Seat) -> Result<(), PlaceError> {
        if !(1..=9).contains(&position) {
            return Err(PlaceError::OutOfRange);
        }
        let cell = &mut self.cells[usize::from(position) - 1];
        if cell.is_some() {
            return Err(PlaceError::Occupied);
        }
        *cell = Some(seat);
        Ok(())
    }

    /// Win/draw detection. A line fully owned by one seat wins; a full
    /// board with no winner is a draw; otherwise the game is still open.
    pub fn outcome(&self) -> Option<Outcome> {
        for [a, b, c] in LINES {
            if let Some(seat) = self.cells[a] {
                if self.cells[b] == Some(seat) && self.cells[c] == Some(seat) {
                    return Some(Outcome::Win(seat));
                }
            }
        }
        if self.cells.iter().all(Option::is_some) {
            return Some(Outcome::Draw);
        }
        None
    }

    /// Clear all 9 cells.
    pub fn reset(&mut self) {
        self.cells = [None; 9];
    }

    /// Snapshot for the wire.
    pub fn cells(&self) -> BoardCells {
        self.cells
    }
}
