#![allow(dead_code)]

use seabattle::{ShipPlacement, BOARD_SIZE};

/// A legal fleet laid out in rows 0, 2 and 4. Row 9 is left empty.
pub fn standard_fleet() -> Vec<ShipPlacement> {
    vec![
        ShipPlacement::horizontal(4, 0, 0),
        ShipPlacement::horizontal(3, 0, 5),
        ShipPlacement::horizontal(3, 2, 0),
        ShipPlacement::horizontal(2, 2, 4),
        ShipPlacement::horizontal(2, 2, 7),
        ShipPlacement::horizontal(2, 4, 0),
        ShipPlacement::horizontal(1, 4, 3),
        ShipPlacement::horizontal(1, 4, 5),
        ShipPlacement::horizontal(1, 4, 7),
        ShipPlacement::horizontal(1, 4, 9),
    ]
}

/// Every square covered by `fleet`.
pub fn fleet_cells(fleet: &[ShipPlacement]) -> Vec<(usize, usize)> {
    let mut cells = Vec::new();
    for p in fleet {
        for i in 0..p.length {
            match p.orientation {
                seabattle::Orientation::Horizontal => cells.push((p.row, p.col + i)),
                seabattle::Orientation::Vertical => cells.push((p.row + i, p.col)),
            }
        }
    }
    cells
}

/// A square no ship of `standard_fleet` touches.
pub const OPEN_WATER: (usize, usize) = (BOARD_SIZE - 1, BOARD_SIZE - 1);
