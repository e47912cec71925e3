use rand::rngs::SmallRng;

use crate::{board::BoardView, common::ShotResult};

/// Pluggable "choose next shot" logic for automated participants.
///
/// Strategies only see what the shooter is allowed to see: the opponent's
/// redacted board and the lengths of the opponent's ships still afloat.
pub trait ShotStrategy: Send + Sync {
    /// Choose the next target. Must return an unresolved square of `view`,
    /// or `None` when no such square remains.
    fn select_target(
        &self,
        rng: &mut SmallRng,
        view: &BoardView,
        remaining: &[usize],
    ) -> Option<(usize, usize)>;

    /// Inform the strategy of the result of its last shot.
    fn handle_shot_result(&self, _coord: (usize, usize), _result: ShotResult) {}
}
