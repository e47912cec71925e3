use std::env;
use std::io::Write;

use chrono::Utc;
use log::{Level, LevelFilter, Metadata, Record};

/// Dependencies only get through at warn and above, whatever the crate level.
const DEPENDENCY_LEVEL: LevelFilter = LevelFilter::Warn;

struct StderrLogger;

fn admits(target: &str, level: Level, max: LevelFilter) -> bool {
    let limit = if target.starts_with(env!("CARGO_CRATE_NAME")) {
        max
    } else {
        max.min(DEPENDENCY_LEVEL)
    };
    level <= limit
}

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        admits(metadata.target(), metadata.level(), log::max_level())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let thread = std::thread::current();
        // stdout carries the JSON summaries, so logs go to stderr.
        let _ = writeln!(
            std::io::stderr().lock(),
            "{} {:<5} [{}] {} - {}",
            Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            record.level(),
            thread.name().unwrap_or("-"),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: StderrLogger = StderrLogger;

/// Install the stderr logger. The level for this crate comes from
/// `SEABATTLE_LOG` (default `info`); other crates are capped at `warn`.
pub fn init_logging() {
    let level = env::var("SEABATTLE_LOG")
        .ok()
        .and_then(|lvl| lvl.parse().ok())
        .unwrap_or(LevelFilter::Info);
    let _ = log::set_logger(&LOGGER).map(|()| log::set_max_level(level));
}
