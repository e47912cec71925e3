//! Inbound operations: route to the registry and the match, then publish what
//! changed to the match's human participants.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error, info, trace, warn};
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant};

use crate::board::BoardView;
use crate::common::{GameError, MatchId, Result};
use crate::config::Config;
use crate::game::{
    FireResult, Match, MatchKind, MatchSnapshot, MatchSummary, Outcome, Participant, Phase,
    SeatState,
};
use crate::notify::{Event, EventKind, EventSink, Notifier, PushMessage, SweepReport};
use crate::player::ShotStrategy;
use crate::player_ai::ProbabilityStrategy;
use crate::registry::{SessionRegistry, SessionStats};
use crate::ship::ShipPlacement;

/// Reply to a successful create.
#[derive(Debug, Clone, Serialize)]
pub struct CreateResponse {
    pub match_id: MatchId,
    pub message: String,
    /// Where a second player joins; player-vs-player only.
    pub join_reference: Option<String>,
}

/// Reply to a successful join.
#[derive(Debug, Clone, Serialize)]
pub struct JoinResponse {
    pub match_id: MatchId,
    pub opponent: String,
    pub message: String,
}

/// Counts from one sweeper pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub matches_evicted: usize,
    pub notifications: SweepReport,
}

pub struct GameService {
    registry: Arc<SessionRegistry>,
    notifier: Arc<Notifier>,
    strategy: Arc<dyn ShotStrategy>,
    config: Config,
    shutdown: AtomicBool,
}

impl GameService {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(SessionRegistry::new(config.clone()), config))
    }

    /// Service whose matches draw randomness from `seed`.
    pub fn with_seed(config: Config, seed: u64) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(
            SessionRegistry::with_seed(config.clone(), seed),
            config,
        ))
    }

    fn assemble(registry: Arc<SessionRegistry>, config: Config) -> Self {
        Self {
            registry,
            notifier: Arc::new(Notifier::new(&config)),
            strategy: Arc::new(ProbabilityStrategy::new()),
            config,
            shutdown: AtomicBool::new(false),
        }
    }

    /// Replace the AI's targeting strategy.
    pub fn with_strategy(mut self, strategy: Arc<dyn ShotStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Share the service and start the background sweeper on the current runtime.
    pub fn start(self) -> Arc<Self> {
        let service = Arc::new(self);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(run_sweeper(Arc::downgrade(&service)));
            }
            Err(_) => warn!("no tokio runtime, sweeper not started"),
        }
        service
    }

    /// Stop the sweeper after its current pass.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// Evict expired matches and idle subscribers once.
    pub fn run_maintenance(&self, now: Instant) -> MaintenanceReport {
        let report = MaintenanceReport {
            matches_evicted: self.registry.evict_expired(now),
            notifications: self.notifier.sweep(now),
        };
        trace!("maintenance pass: {:?}", report);
        report
    }

    pub fn create(&self, name: &str, kind: MatchKind) -> Result<CreateResponse> {
        check_name(name)?;
        let handle = self.registry.create_match(Participant::human(name), kind)?;
        let id = handle.id();
        let response = match kind {
            MatchKind::PlayerVsPlayer => {
                let join = format!("/api/game/{id}/join");
                CreateResponse {
                    match_id: id,
                    message: format!("Game created. Waiting for second player. Share this URL: {join}"),
                    join_reference: Some(join),
                }
            }
            MatchKind::PlayerVsAi => {
                let game = handle.lock();
                let opponent = game.second().map(|p| p.name().to_string()).unwrap_or_default();
                self.publish(
                    &game,
                    EventKind::PlayerJoined,
                    json!({ "player": opponent, "message": format!("{opponent} joined the game") }),
                );
                CreateResponse {
                    match_id: id,
                    message: format!("Game against {opponent} created. Place your ships to start."),
                    join_reference: None,
                }
            }
        };
        Ok(response)
    }

    pub fn join(&self, id: MatchId, name: &str) -> Result<JoinResponse> {
        check_name(name)?;
        let mut opponent = String::new();
        self.registry.join_match_with(id, name, |game| {
            opponent = game.first().name().to_string();
            self.publish(
                game,
                EventKind::PlayerJoined,
                json!({ "player": name, "message": format!("{name} joined the game") }),
            );
        })?;
        Ok(JoinResponse {
            match_id: id,
            message: format!("Joined {opponent}'s game. Place your ships."),
            opponent,
        })
    }

    /// Submit a fleet. `Ok(false)` means the fleet was rejected and nothing changed.
    pub fn place_fleet(&self, id: MatchId, name: &str, ships: &[ShipPlacement]) -> Result<bool> {
        let handle = self.registry.get(id)?;
        let mut game = handle.lock();
        let was_started = game.phase() == &Phase::InProgress;
        if !game.place_fleet(name, ships)? {
            debug!("match {}: fleet from {} rejected", id, name);
            return Ok(false);
        }
        self.after_ready(&game, name, was_started);
        Ok(true)
    }

    pub fn place_fleet_automatically(&self, id: MatchId, name: &str) -> Result<()> {
        let handle = self.registry.get(id)?;
        let mut game = handle.lock();
        let was_started = game.phase() == &Phase::InProgress;
        if let Err(e) = game.place_fleet_automatically(name) {
            if e.is_fatal() {
                error!("match {}: automatic placement for {} failed: {}", id, name, e);
            }
            return Err(e);
        }
        self.after_ready(&game, name, was_started);
        Ok(())
    }

    fn after_ready(&self, game: &Match, name: &str, was_started: bool) {
        self.publish(game, EventKind::PlayerReady, json!({ "player": name }));
        if !was_started && game.phase() == &Phase::InProgress {
            self.publish(
                game,
                EventKind::GameStarted,
                json!({ "message": "Game started!", "currentTurn": game.current_turn() }),
            );
        }
    }

    /// Fire at the opponent. In a player-vs-AI match the AI answers straight
    /// away once the turn passes to it.
    pub fn fire(&self, id: MatchId, name: &str, row: usize, col: usize) -> Result<FireResult> {
        let handle = self.registry.get(id)?;
        let mut game = handle.lock();
        let shot = game.fire(name, row, col)?;
        self.publish_shot(&game, &shot);
        if game.kind() == MatchKind::PlayerVsAi && !shot.game_over && shot.next_turn != name {
            // The human shot stands whatever the AI does.
            match game.play_ai_turns(self.strategy.as_ref()) {
                Ok(replies) => {
                    for reply in &replies {
                        self.publish_shot(&game, reply);
                    }
                }
                Err(e) => error!("match {}: AI turn failed: {}", id, e),
            }
        }
        if game.phase().is_terminal() && self.registry.release_ended(id) {
            info!("match {} ended ({})", id, game.phase().name());
        }
        Ok(shot)
    }

    fn publish_shot(&self, game: &Match, shot: &FireResult) {
        self.publish(
            game,
            EventKind::ShotFired,
            json!({
                "shooter": shot.shooter,
                "target": shot.target,
                "row": shot.row,
                "col": shot.col,
                "hit": shot.hit,
                "sunk": shot.sunk,
                "message": shot.message(),
            }),
        );
        if shot.game_over {
            self.publish_game_over(game);
        } else if shot.next_turn != shot.shooter {
            self.publish(
                game,
                EventKind::TurnChanged,
                json!({ "currentTurn": shot.next_turn }),
            );
        }
    }

    fn publish_game_over(&self, game: &Match) {
        if let Some(outcome) = game.outcome() {
            self.publish(
                game,
                EventKind::GameOver,
                json!({ "winner": outcome.winner, "loser": outcome.loser }),
            );
        }
    }

    /// Cancel an unfinished match and release its participants.
    pub fn cancel(&self, id: MatchId) -> Result<()> {
        self.registry.cancel_match_with(id, |game| {
            self.publish(
                game,
                EventKind::GameCancelled,
                json!({ "message": "Game session cancelled" }),
            );
        })
    }

    /// End the match with `name`'s opponent as winner.
    pub fn forfeit(&self, id: MatchId, name: &str) -> Result<Outcome> {
        let handle = self.registry.get(id)?;
        let outcome = {
            let game = handle.lock();
            let opponent = game.opponent_of(name)?;
            Outcome {
                winner: opponent.name().to_string(),
                loser: name.to_string(),
            }
        };
        self.registry
            .finish_match_with(id, outcome.clone(), |game| self.publish_game_over(game))?;
        info!("match {}: {} forfeited", id, name);
        Ok(outcome)
    }

    pub fn list_active(&self) -> Vec<MatchSummary> {
        self.registry.list_active()
    }

    pub fn list_waiting(&self) -> Vec<MatchSummary> {
        self.registry.list_waiting()
    }

    pub fn stats(&self) -> SessionStats {
        self.registry.stats()
    }

    /// Long-poll for the next event newer than `last_seen`. `Ok(None)` means
    /// nothing arrived within the configured timeout.
    pub async fn subscribe(
        &self,
        name: &str,
        id: Option<MatchId>,
        last_seen: u64,
    ) -> Result<Option<Event>> {
        check_name(name)?;
        if let Some(id) = id {
            // An evicted match may still have events queued.
            if let Ok(handle) = self.registry.get(id) {
                if !handle.lock().is_participant(name) {
                    return Err(GameError::InvalidArgument(format!(
                        "{name} is not a participant of match {id}"
                    )));
                }
            }
        }
        Ok(self
            .notifier
            .fetch_since(name, id, last_seen, self.config.long_poll_timeout)
            .await)
    }

    /// Open a live channel for `name`, replacing any previous one.
    pub fn subscribe_live(&self, name: &str) -> Result<mpsc::Receiver<PushMessage>> {
        check_name(name)?;
        Ok(self.notifier.subscribe_channel(name, self.config.push_buffer))
    }

    /// Attach a caller-provided live sink for `name`.
    pub fn subscribe_sink(&self, name: &str, sink: Arc<dyn EventSink>) -> Result<()> {
        check_name(name)?;
        self.notifier.subscribe_live(name, sink);
        Ok(())
    }

    pub fn unsubscribe(&self, name: &str) {
        self.notifier.unsubscribe(name);
    }

    pub fn board_view(&self, id: MatchId, name: &str, own: bool) -> Result<BoardView> {
        self.registry.get(id)?.lock().board_view(name, own)
    }

    pub fn snapshot(&self, id: MatchId, name: &str) -> Result<MatchSnapshot> {
        self.registry.get(id)?.lock().snapshot_for(name)
    }

    pub fn ready_status(&self, id: MatchId) -> Result<Vec<SeatState>> {
        Ok(self.registry.get(id)?.lock().ready_states())
    }

    fn publish(&self, game: &Match, kind: EventKind, payload: serde_json::Value) -> u64 {
        self.notifier
            .publish(game.id(), kind, payload, &game.human_names())
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(GameError::InvalidArgument("player name must not be empty".into()));
    }
    Ok(())
}

async fn run_sweeper(service: std::sync::Weak<GameService>) {
    let period = match service.upgrade() {
        Some(s) => s.config.sweep_interval,
        None => return,
    };
    let mut ticker = interval(period);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(service) = service.upgrade() else {
            break;
        };
        if service.is_shutdown() {
            break;
        }
        let report = service.run_maintenance(Instant::now());
        if report.matches_evicted > 0 || report.notifications != SweepReport::default() {
            debug!("sweeper: {:?}", report);
        }
    }
    debug!("sweeper stopped");
}
