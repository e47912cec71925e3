//! Game board: cell grid, fleet placement and shot resolution.

use core::fmt;

use log::{debug, error};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::common::{CellStatus, GameError, Result, ShotResult};
use crate::config::{
    required_count, BOARD_SIZE, FLEET, FLEET_SIZE, MAX_SHIP_LENGTH, MIN_SHIP_LENGTH,
    PLACEMENT_ATTEMPTS_PER_SHIP, PLACEMENT_MAX_RESTARTS,
};
use crate::ship::{Orientation, Ship, ShipError, ShipPlacement};

/// Per-cell statuses of a whole board, indexed `[row][col]`.
pub type BoardView = [[CellStatus; BOARD_SIZE]; BOARD_SIZE];

type Occupancy = [[Option<usize>; BOARD_SIZE]; BOARD_SIZE];

/// One square of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
    pub status: CellStatus,
    /// Index of the occupying ship in the board's ship list, for lookup only.
    pub ship: Option<usize>,
}

/// Reasons a submitted fleet is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FleetError {
    #[error(transparent)]
    Ship(#[from] ShipError),
    #[error("ship overlaps another ship at ({row}, {col})")]
    Overlap { row: usize, col: usize },
    #[error("ship touches another ship next to ({row}, {col})")]
    Adjacent { row: usize, col: usize },
    #[error("fleet must be 1x4, 2x3, 3x2 and 4x1 ships")]
    Composition,
}

/// A participant's board: the grid, its ships, and the owner's name.
#[derive(Clone)]
pub struct Board {
    owner: String,
    cells: [[Cell; BOARD_SIZE]; BOARD_SIZE],
    ships: Vec<Ship>,
}

impl Board {
    /// Create an empty board (no ships placed).
    pub fn new(owner: impl Into<String>) -> Self {
        let cells = core::array::from_fn(|row| {
            core::array::from_fn(|col| Cell {
                row,
                col,
                status: CellStatus::Empty,
                ship: None,
            })
        });
        Board {
            owner: owner.into(),
            cells,
            ships: Vec::new(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn ships(&self) -> &[Ship] {
        &self.ships
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.cells.get(row).and_then(|r| r.get(col))
    }

    /// Ship occupying (row, col), if any.
    pub fn ship_at(&self, row: usize, col: usize) -> Option<&Ship> {
        self.cell(row, col)
            .and_then(|c| c.ship)
            .and_then(|idx| self.ships.get(idx))
    }

    /// `true` once a complete, valid fleet has been placed.
    pub fn has_fleet(&self) -> bool {
        self.ships.len() == FLEET_SIZE
    }

    /// Check a fleet against bounds, overlap, adjacency and composition rules
    /// without touching the board.
    pub fn validate_fleet(placements: &[ShipPlacement]) -> core::result::Result<(), FleetError> {
        Self::layout(placements).map(|_| ())
    }

    /// Replace the fleet with `placements`. Returns `false` and leaves the board
    /// untouched if any rule is violated.
    pub fn place_fleet(&mut self, placements: &[ShipPlacement]) -> bool {
        match Self::layout(placements) {
            Ok(ships) => {
                self.commit(ships);
                true
            }
            Err(e) => {
                debug!("{}: fleet rejected: {}", self.owner, e);
                false
            }
        }
    }

    /// Place the standard fleet at random valid positions.
    pub fn place_fleet_automatically<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        self.place_fleet_automatically_with(rng, PLACEMENT_ATTEMPTS_PER_SHIP, PLACEMENT_MAX_RESTARTS)
    }

    /// Random placement with explicit budgets. Each ship gets `attempts_per_ship`
    /// tries; running out restarts from an empty layout, at most `max_restarts` times.
    pub fn place_fleet_automatically_with<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        attempts_per_ship: usize,
        max_restarts: usize,
    ) -> Result<()> {
        for restart in 0..max_restarts {
            if let Some(ships) = Self::random_layout(rng, attempts_per_ship) {
                self.commit(ships);
                return Ok(());
            }
            debug!("{}: random layout attempt {} failed, restarting", self.owner, restart + 1);
        }
        error!(
            "{}: automatic placement exhausted {} restarts",
            self.owner, max_restarts
        );
        Err(GameError::PlacementExhausted {
            restarts: max_restarts,
        })
    }

    /// Resolve a shot at (row, col). Shooting an already resolved cell is a no-op.
    pub fn take_shot(&mut self, row: usize, col: usize) -> Result<ShotResult> {
        if row >= BOARD_SIZE || col >= BOARD_SIZE {
            return Err(GameError::InvalidArgument(format!(
                "coordinates ({row}, {col}) are outside the {BOARD_SIZE}x{BOARD_SIZE} board"
            )));
        }
        let cell = &mut self.cells[row][col];
        match cell.status {
            CellStatus::Ship => {
                cell.status = CellStatus::Hit;
                let Some(ship) = cell.ship.and_then(|idx| self.ships.get_mut(idx)) else {
                    return Ok(ShotResult::Hit);
                };
                ship.register_hit();
                if ship.is_sunk() {
                    Ok(ShotResult::Sink(ship.length()))
                } else {
                    Ok(ShotResult::Hit)
                }
            }
            CellStatus::Empty => {
                cell.status = CellStatus::Miss;
                Ok(ShotResult::Miss)
            }
            CellStatus::Hit | CellStatus::Miss => Ok(ShotResult::Repeat),
        }
    }

    /// Returns `true` when every ship has been hit along its whole length.
    /// An empty board is vacuously sunk.
    pub fn all_sunk(&self) -> bool {
        self.ships.iter().all(Ship::is_sunk)
    }

    /// Lengths of ships still afloat, longest first.
    pub fn remaining_lengths(&self) -> Vec<usize> {
        let mut lens: Vec<usize> = self
            .ships
            .iter()
            .filter(|s| !s.is_sunk())
            .map(Ship::length)
            .collect();
        lens.sort_unstable_by(|a, b| b.cmp(a));
        lens
    }

    /// Full view, as seen by the owner.
    pub fn owner_view(&self) -> BoardView {
        core::array::from_fn(|r| core::array::from_fn(|c| self.cells[r][c].status))
    }

    /// View for the opponent: ship cells not yet hit read as empty.
    pub fn redacted_view(&self) -> BoardView {
        core::array::from_fn(|r| {
            core::array::from_fn(|c| match self.cells[r][c].status {
                CellStatus::Ship => CellStatus::Empty,
                other => other,
            })
        })
    }

    fn commit(&mut self, ships: Vec<Ship>) {
        for row in self.cells.iter_mut() {
            for cell in row.iter_mut() {
                cell.status = CellStatus::Empty;
                cell.ship = None;
            }
        }
        for (idx, ship) in ships.iter().enumerate() {
            for (r, c) in ship.cells() {
                self.cells[r][c].status = CellStatus::Ship;
                self.cells[r][c].ship = Some(idx);
            }
        }
        self.ships = ships;
    }

    fn layout(placements: &[ShipPlacement]) -> core::result::Result<Vec<Ship>, FleetError> {
        let mut grid: Occupancy = [[None; BOARD_SIZE]; BOARD_SIZE];
        let mut ships = Vec::with_capacity(placements.len());
        for p in placements {
            let ship = Ship::from_placement(p)?;
            check_clearance(&grid, &ship)?;
            occupy(&mut grid, &ship, ships.len());
            ships.push(ship);
        }
        let composition_ok = ships.len() == FLEET_SIZE
            && (MIN_SHIP_LENGTH..=MAX_SHIP_LENGTH)
                .all(|len| ships.iter().filter(|s| s.length() == len).count() == required_count(len));
        if !composition_ok {
            return Err(FleetError::Composition);
        }
        Ok(ships)
    }

    fn random_layout<R: Rng + ?Sized>(rng: &mut R, attempts_per_ship: usize) -> Option<Vec<Ship>> {
        let mut grid: Occupancy = [[None; BOARD_SIZE]; BOARD_SIZE];
        let mut ships = Vec::with_capacity(FLEET_SIZE);
        for &length in FLEET.iter() {
            let mut placed = false;
            for _ in 0..attempts_per_ship {
                let orient = if rng.random() {
                    Orientation::Horizontal
                } else {
                    Orientation::Vertical
                };
                let max_r = match orient {
                    Orientation::Vertical => BOARD_SIZE - length,
                    Orientation::Horizontal => BOARD_SIZE - 1,
                };
                let max_c = match orient {
                    Orientation::Horizontal => BOARD_SIZE - length,
                    Orientation::Vertical => BOARD_SIZE - 1,
                };
                let r = rng.random_range(0..=max_r);
                let c = rng.random_range(0..=max_c);
                let Ok(ship) = Ship::new(length, orient, r, c) else {
                    continue;
                };
                if check_clearance(&grid, &ship).is_ok() {
                    occupy(&mut grid, &ship, ships.len());
                    ships.push(ship);
                    placed = true;
                    break;
                }
            }
            if !placed {
                return None;
            }
        }
        Some(ships)
    }
}

/// Ensure no cell of `ship`, nor any of its eight neighbours, is occupied.
fn check_clearance(grid: &Occupancy, ship: &Ship) -> core::result::Result<(), FleetError> {
    for (row, col) in ship.cells() {
        if grid[row][col].is_some() {
            return Err(FleetError::Overlap { row, col });
        }
        for r in row.saturating_sub(1)..=(row + 1).min(BOARD_SIZE - 1) {
            for c in col.saturating_sub(1)..=(col + 1).min(BOARD_SIZE - 1) {
                if grid[r][c].is_some() {
                    return Err(FleetError::Adjacent { row, col });
                }
            }
        }
    }
    Ok(())
}

fn occupy(grid: &mut Occupancy, ship: &Ship, idx: usize) {
    for (r, c) in ship.cells() {
        grid[r][c] = Some(idx);
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Board {{ owner: {:?}, ships: {:?} }}", self.owner, self.ships)?;
        for row in self.cells.iter() {
            for cell in row.iter() {
                let ch = match cell.status {
                    CellStatus::Empty => '.',
                    CellStatus::Ship => '#',
                    CellStatus::Hit => 'X',
                    CellStatus::Miss => 'o',
                };
                write!(f, "{ch}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clearance_checks_diagonal_neighbours() {
        let mut grid: Occupancy = [[None; BOARD_SIZE]; BOARD_SIZE];
        let a = Ship::new(1, Orientation::Horizontal, 4, 4).unwrap();
        occupy(&mut grid, &a, 0);
        let diag = Ship::new(1, Orientation::Horizontal, 5, 5).unwrap();
        assert_eq!(
            check_clearance(&grid, &diag),
            Err(FleetError::Adjacent { row: 5, col: 5 })
        );
        let clear = Ship::new(1, Orientation::Horizontal, 6, 6).unwrap();
        assert!(check_clearance(&grid, &clear).is_ok());
    }

    #[test]
    fn clearance_at_board_corner() {
        let mut grid: Occupancy = [[None; BOARD_SIZE]; BOARD_SIZE];
        let corner = Ship::new(2, Orientation::Vertical, 8, 9).unwrap();
        occupy(&mut grid, &corner, 0);
        let far = Ship::new(1, Orientation::Horizontal, 0, 0).unwrap();
        assert!(check_clearance(&grid, &far).is_ok());
        let overlap = Ship::new(1, Orientation::Horizontal, 9, 9).unwrap();
        assert_eq!(
            check_clearance(&grid, &overlap),
            Err(FleetError::Overlap { row: 9, col: 9 })
        );
    }
}
