//! Common types: errors, cell status, shot results and match ids.

use core::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a match in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatchId(Uuid);

impl MatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl core::str::FromStr for MatchId {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(MatchId)
            .map_err(|e| GameError::InvalidArgument(format!("malformed match id {s:?}: {e}")))
    }
}

/// Errors surfaced by the board, match and registry operations.
///
/// Everything except [`GameError::PlacementExhausted`] is an ordinary rejection
/// the caller can report and recover from.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("player {0} is already in an active game")]
    AlreadyActive(String),

    #[error("maximum active sessions reached ({max})")]
    CapacityExceeded { max: usize },

    #[error("game session {0} not found")]
    NotFound(MatchId),

    /// Automatic placement ran out of restarts. The ruleset or the placement
    /// code is broken; this is never a normal game outcome.
    #[error("automatic fleet placement failed after {restarts} restarts")]
    PlacementExhausted { restarts: usize },
}

impl GameError {
    /// `true` for conditions that indicate a bug rather than a rejected request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GameError::PlacementExhausted { .. })
    }
}

pub type Result<T, E = GameError> = core::result::Result<T, E>;

/// Status of a single board cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CellStatus {
    Empty,
    Ship,
    Hit,
    Miss,
}

impl CellStatus {
    /// `true` once a shot has landed on the cell.
    pub fn is_resolved(self) -> bool {
        matches!(self, CellStatus::Hit | CellStatus::Miss)
    }
}

/// Outcome of one shot against a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotResult {
    /// Shot hit a ship segment that still has other segments afloat.
    Hit,
    /// Shot landed on open water.
    Miss,
    /// Shot hit the last segment of a ship, carrying its length.
    Sink(usize),
    /// Cell had already been resolved; nothing changed.
    Repeat,
}

impl ShotResult {
    pub fn is_hit(self) -> bool {
        matches!(self, ShotResult::Hit | ShotResult::Sink(_))
    }

    pub fn is_sink(self) -> bool {
        matches!(self, ShotResult::Sink(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        assert_eq!(
            GameError::CapacityExceeded { max: 10 }.to_string(),
            "maximum active sessions reached (10)"
        );
        assert_eq!(
            GameError::AlreadyActive("alice".into()).to_string(),
            "player alice is already in an active game"
        );
    }

    #[test]
    fn only_placement_exhaustion_is_fatal() {
        assert!(GameError::PlacementExhausted { restarts: 3 }.is_fatal());
        assert!(!GameError::InvalidState("x".into()).is_fatal());
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GameError>();
    }

    #[test]
    fn match_id_parses_its_display_form() {
        let id = MatchId::new();
        let parsed: MatchId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<MatchId>().is_err());
    }

    #[test]
    fn repeat_and_miss_are_not_hits() {
        assert!(ShotResult::Sink(2).is_hit());
        assert!(ShotResult::Hit.is_hit());
        assert!(!ShotResult::Miss.is_hit());
        assert!(!ShotResult::Repeat.is_hit());
    }
}
