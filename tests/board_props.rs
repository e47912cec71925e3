mod common;

use common::{fleet_cells, standard_fleet};
use proptest::prelude::*;
use rand::{rngs::SmallRng, SeedableRng};
use seabattle::{Board, CellStatus, ShipPlacement, BOARD_SIZE, TOTAL_SHIP_CELLS};

fn random_board(seed: u64) -> Board {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut board = Board::new("prop");
    board.place_fleet_automatically(&mut rng).unwrap();
    board
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn automatic_fleet_keeps_ships_apart(seed in any::<u64>()) {
        let board = random_board(seed);
        let view = board.owner_view();
        prop_assert_eq!(view.iter().flatten().filter(|&&s| s == CellStatus::Ship).count(), TOTAL_SHIP_CELLS);
        for r in 0..BOARD_SIZE {
            for c in 0..BOARD_SIZE {
                let Some(ship) = board.ship_at(r, c) else { continue };
                for dr in -1i32..=1 {
                    for dc in -1i32..=1 {
                        let (nr, nc) = (r as i32 + dr, c as i32 + dc);
                        if nr < 0 || nc < 0 || nr >= BOARD_SIZE as i32 || nc >= BOARD_SIZE as i32 {
                            continue;
                        }
                        if let Some(other) = board.ship_at(nr as usize, nc as usize) {
                            prop_assert_eq!(other.origin(), ship.origin());
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn invalid_fleet_leaves_board_unchanged(
        seed in any::<u64>(),
        idx in 0usize..10,
        len in 0usize..6,
        row in 0usize..BOARD_SIZE,
        col in 0usize..BOARD_SIZE,
        vertical in any::<bool>(),
    ) {
        let mut board = random_board(seed);
        let before = board.owner_view();
        let mut fleet = standard_fleet();
        fleet[idx] = if vertical {
            ShipPlacement::vertical(len, row, col)
        } else {
            ShipPlacement::horizontal(len, row, col)
        };
        let accepted = board.place_fleet(&fleet);
        prop_assert_eq!(accepted, Board::validate_fleet(&fleet).is_ok());
        if !accepted {
            prop_assert_eq!(board.owner_view(), before);
        }
    }

    #[test]
    fn all_sunk_iff_every_ship_cell_hit(shots in proptest::collection::vec((0usize..BOARD_SIZE, 0usize..BOARD_SIZE), 0..120)) {
        let fleet = standard_fleet();
        let mut board = Board::new("prop");
        prop_assert!(board.place_fleet(&fleet));
        for &(r, c) in &shots {
            board.take_shot(r, c).unwrap();
        }
        let covered = fleet_cells(&fleet).iter().all(|cell| shots.contains(cell));
        prop_assert_eq!(board.all_sunk(), covered);
    }

    #[test]
    fn repeat_shot_changes_nothing(seed in any::<u64>(), row in 0usize..BOARD_SIZE, col in 0usize..BOARD_SIZE) {
        let mut board = random_board(seed);
        board.take_shot(row, col).unwrap();
        let after_first = board.owner_view();
        let remaining = board.remaining_lengths();
        let second = board.take_shot(row, col).unwrap();
        prop_assert!(!second.is_hit());
        prop_assert_eq!(board.owner_view(), after_first);
        prop_assert_eq!(board.remaining_lengths(), remaining);
    }
}
