//! Ship definitions and placement geometry.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{BOARD_SIZE, MAX_SHIP_LENGTH, MIN_SHIP_LENGTH};

/// Orientation of a ship on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// Errors building a ship from a placement request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShipError {
    #[error("ship length {0} is outside 1..=4")]
    InvalidLength(usize),
    #[error("ship of length {length} at ({row}, {col}) leaves the board")]
    OutOfBounds { length: usize, row: usize, col: usize },
}

/// A requested ship position, as submitted by a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipPlacement {
    pub length: usize,
    pub orientation: Orientation,
    pub row: usize,
    pub col: usize,
}

impl ShipPlacement {
    pub const fn new(length: usize, orientation: Orientation, row: usize, col: usize) -> Self {
        Self {
            length,
            orientation,
            row,
            col,
        }
    }

    pub const fn horizontal(length: usize, row: usize, col: usize) -> Self {
        Self::new(length, Orientation::Horizontal, row, col)
    }

    pub const fn vertical(length: usize, row: usize, col: usize) -> Self {
        Self::new(length, Orientation::Vertical, row, col)
    }
}

/// A ship placed on the board, tracking how many of its segments were hit.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Ship {
    length: usize,
    orientation: Orientation,
    row: usize,
    col: usize,
    hits: usize,
}

impl Ship {
    /// Place a ship at (`row`, `col`) with `orientation`, checking length and bounds.
    pub fn new(
        length: usize,
        orientation: Orientation,
        row: usize,
        col: usize,
    ) -> Result<Self, ShipError> {
        if !(MIN_SHIP_LENGTH..=MAX_SHIP_LENGTH).contains(&length) {
            return Err(ShipError::InvalidLength(length));
        }
        let (end_row, end_col) = match orientation {
            Orientation::Horizontal => (Some(row), col.checked_add(length - 1)),
            Orientation::Vertical => (row.checked_add(length - 1), Some(col)),
        };
        match (end_row, end_col) {
            (Some(r), Some(c)) if r < BOARD_SIZE && c < BOARD_SIZE => {}
            _ => return Err(ShipError::OutOfBounds { length, row, col }),
        }
        Ok(Ship {
            length,
            orientation,
            row,
            col,
            hits: 0,
        })
    }

    pub fn from_placement(p: &ShipPlacement) -> Result<Self, ShipError> {
        Self::new(p.length, p.orientation, p.row, p.col)
    }

    /// Coordinates covered by the ship, anchor first.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.length).map(move |i| match self.orientation {
            Orientation::Horizontal => (self.row, self.col + i),
            Orientation::Vertical => (self.row + i, self.col),
        })
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.cells().any(|cell| cell == (row, col))
    }

    /// Count one more hit segment.
    pub fn register_hit(&mut self) {
        self.hits += 1;
    }

    pub fn is_sunk(&self) -> bool {
        self.hits >= self.length
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn origin(&self) -> (usize, usize) {
        (self.row, self.col)
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn placement(&self) -> ShipPlacement {
        ShipPlacement::new(self.length, self.orientation, self.row, self.col)
    }
}

impl fmt::Debug for Ship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ship {{ length: {}, origin: ({}, {}), orientation: {:?}, hits: {} }}",
            self.length, self.row, self.col, self.orientation, self.hits,
        )
    }
}
