mod ai;
mod board;
mod common;
mod config;
mod game;
mod logging;
pub mod notify;
mod player;
mod player_ai;
pub mod registry;
pub mod service;
mod ship;

pub use ai::*;
pub use board::*;
pub use common::*;
pub use config::*;
pub use game::*;
pub use logging::init_logging;
pub use notify::{Event, EventKind, EventSink, Notifier, PushMessage, SweepReport};
pub use player::*;
pub use player_ai::*;
pub use registry::{MatchHandle, SessionRegistry, SessionStats};
pub use service::{CreateResponse, GameService, JoinResponse, MaintenanceReport};
pub use ship::*;
