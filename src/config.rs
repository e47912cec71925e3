//! Rule constants and runtime settings.

use std::time::Duration;

use crate::common::GameError;

pub const BOARD_SIZE: usize = 10;

/// Required fleet, longest ship first: 1×4, 2×3, 3×2, 4×1.
pub const FLEET: [usize; FLEET_SIZE] = [4, 3, 3, 2, 2, 2, 1, 1, 1, 1];
pub const FLEET_SIZE: usize = 10;

/// Total number of ship segments in the required fleet.
pub const TOTAL_SHIP_CELLS: usize = 4 + 3 + 3 + 2 + 2 + 2 + 1 + 1 + 1 + 1;

pub const MIN_SHIP_LENGTH: usize = 1;
pub const MAX_SHIP_LENGTH: usize = 4;

/// Random positions tried for a single ship before the whole board restarts.
pub const PLACEMENT_ATTEMPTS_PER_SHIP: usize = 1000;
/// Board restarts allowed before automatic placement gives up.
pub const PLACEMENT_MAX_RESTARTS: usize = 100;

/// Number of ships of `length` the fleet requires.
pub fn required_count(length: usize) -> usize {
    FLEET.iter().filter(|&&l| l == length).count()
}

/// Conventional class name for a ship of the given length.
pub fn ship_class_name(length: usize) -> &'static str {
    match length {
        4 => "Battleship",
        3 => "Cruiser",
        2 => "Destroyer",
        1 => "Submarine",
        _ => "Unknown",
    }
}

/// Runtime settings for the registry and the notification fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Matches allowed in the active set, finished-but-not-evicted included.
    pub max_active_sessions: usize,
    /// Active count considered healthy. Only used for status reporting.
    pub min_active_sessions: usize,
    pub subscriber_idle_timeout: Duration,
    pub sweep_interval: Duration,
    /// Grace window between a match finishing and its removal.
    pub eviction_delay: Duration,
    pub long_poll_timeout: Duration,
    pub queue_capacity: usize,
    pub push_buffer: usize,
    pub worker_threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_active_sessions: 10,
            min_active_sessions: 1,
            subscriber_idle_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(60),
            eviction_delay: Duration::from_secs(60),
            long_poll_timeout: Duration::from_secs(30),
            queue_capacity: 256,
            push_buffer: 64,
            worker_threads: 4,
        }
    }
}

impl Config {
    pub fn with_max_active_sessions(mut self, max: usize) -> Self {
        self.max_active_sessions = max;
        self
    }

    pub fn with_min_active_sessions(mut self, min: usize) -> Self {
        self.min_active_sessions = min;
        self
    }

    pub fn with_subscriber_idle_timeout(mut self, timeout: Duration) -> Self {
        self.subscriber_idle_timeout = timeout;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_eviction_delay(mut self, delay: Duration) -> Self {
        self.eviction_delay = delay;
        self
    }

    pub fn with_long_poll_timeout(mut self, timeout: Duration) -> Self {
        self.long_poll_timeout = timeout;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Reject settings the services cannot run with.
    pub fn validate(&self) -> Result<(), GameError> {
        if self.max_active_sessions == 0 {
            return Err(GameError::InvalidArgument(
                "max_active_sessions must be at least 1".into(),
            ));
        }
        if self.min_active_sessions > self.max_active_sessions {
            return Err(GameError::InvalidArgument(format!(
                "min_active_sessions ({}) exceeds max_active_sessions ({})",
                self.min_active_sessions, self.max_active_sessions
            )));
        }
        if self.sweep_interval.is_zero() {
            return Err(GameError::InvalidArgument(
                "sweep_interval must be non-zero".into(),
            ));
        }
        if self.queue_capacity == 0 || self.push_buffer == 0 {
            return Err(GameError::InvalidArgument(
                "queue_capacity and push_buffer must be non-zero".into(),
            ));
        }
        if self.worker_threads == 0 {
            return Err(GameError::InvalidArgument(
                "worker_threads must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fleet_constants_agree() {
        assert_eq!(FLEET.iter().sum::<usize>(), TOTAL_SHIP_CELLS);
        assert_eq!(required_count(4), 1);
        assert_eq!(required_count(3), 2);
        assert_eq!(required_count(2), 3);
        assert_eq!(required_count(1), 4);
        assert_eq!(required_count(5), 0);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn min_above_max_is_rejected() {
        let cfg = Config::default()
            .with_max_active_sessions(2)
            .with_min_active_sessions(3);
        assert!(matches!(cfg.validate(), Err(GameError::InvalidArgument(_))));
    }
}
