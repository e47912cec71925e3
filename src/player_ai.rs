use rand::{rngs::SmallRng, Rng};

use crate::{ai, board::BoardView, player::ShotStrategy};

/// Default AI opponent: probability-density targeting.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProbabilityStrategy;

impl ProbabilityStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl ShotStrategy for ProbabilityStrategy {
    fn select_target(
        &self,
        rng: &mut SmallRng,
        view: &BoardView,
        remaining: &[usize],
    ) -> Option<(usize, usize)> {
        ai::calc_pdf_and_guess(view, remaining, rng)
    }
}

/// Picks uniformly among unresolved squares. Used by bots that do not need to
/// play well.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomStrategy;

impl ShotStrategy for RandomStrategy {
    fn select_target(
        &self,
        rng: &mut SmallRng,
        view: &BoardView,
        _remaining: &[usize],
    ) -> Option<(usize, usize)> {
        let open: Vec<(usize, usize)> = view
            .iter()
            .enumerate()
            .flat_map(|(r, row)| {
                row.iter()
                    .enumerate()
                    .filter(|(_, s)| !s.is_resolved())
                    .map(move |(c, _)| (r, c))
            })
            .collect();
        if open.is_empty() {
            return None;
        }
        Some(open[rng.random_range(0..open.len())])
    }
}
