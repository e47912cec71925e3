use rand::rngs::SmallRng;
use rand::SeedableRng;
use seabattle::{Board, ProbabilityStrategy, RandomStrategy, ShotStrategy, BOARD_SIZE};

fn play_out(strategy: &dyn ShotStrategy, seed: u64) -> usize {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut board = Board::new("target");
    board.place_fleet_automatically(&mut rng).unwrap();

    let mut shots = 0;
    while !board.all_sunk() {
        let view = board.redacted_view();
        let (r, c) = strategy
            .select_target(&mut rng, &view, &board.remaining_lengths())
            .expect("strategy gave up with ships afloat");
        assert!(!view[r][c].is_resolved(), "shot ({r}, {c}) twice");
        let result = board.take_shot(r, c).unwrap();
        strategy.handle_shot_result((r, c), result);
        shots += 1;
        assert!(shots <= BOARD_SIZE * BOARD_SIZE);
    }
    shots
}

#[test]
fn test_probability_strategy_clears_board() {
    for seed in 0..10 {
        play_out(&ProbabilityStrategy::new(), seed);
    }
}

#[test]
fn test_probability_beats_random_on_average() {
    let seeds = 0..20u64;
    let smart: usize = seeds.clone().map(|s| play_out(&ProbabilityStrategy::new(), s)).sum();
    let random: usize = seeds.map(|s| play_out(&RandomStrategy, s)).sum();
    assert!(smart < random, "probability {} vs random {}", smart, random);
}

#[test]
fn test_strategy_returns_none_when_nothing_is_left() {
    let mut rng = SmallRng::seed_from_u64(5);
    let view = [[seabattle::CellStatus::Miss; BOARD_SIZE]; BOARD_SIZE];
    assert!(ProbabilityStrategy::new()
        .select_target(&mut rng, &view, &[])
        .is_none());
    assert!(RandomStrategy.select_target(&mut rng, &view, &[]).is_none());
}
