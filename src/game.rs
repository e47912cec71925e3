//! Per-match state machine: seats, phases, turn ownership and win detection.

use std::time::{Duration, SystemTime};

use log::{debug, info};
use rand::rngs::SmallRng;
use serde::Serialize;

use crate::{
    board::{Board, BoardView},
    common::{GameError, MatchId, Result, ShotResult},
    config::BOARD_SIZE,
    player::ShotStrategy,
    ship::ShipPlacement,
};

/// Who the second seat is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchKind {
    PlayerVsPlayer,
    PlayerVsAi,
}

/// A named participant. Immutable once seated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Participant {
    name: String,
    is_ai: bool,
}

impl Participant {
    pub fn human(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_ai: false,
        }
    }

    pub fn ai(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_ai: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_ai(&self) -> bool {
        self.is_ai
    }
}

/// Result of a finished match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub winner: String,
    pub loser: String,
}

/// Stage of a match. Only moves forward; `Cancelled` ends any unfinished match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    AwaitingOpponent,
    PlacingShips,
    InProgress,
    Finished(Outcome),
    Cancelled,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Finished(_) | Phase::Cancelled)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Phase::AwaitingOpponent => "AWAITING_OPPONENT",
            Phase::PlacingShips => "PLACING_SHIPS",
            Phase::InProgress => "IN_PROGRESS",
            Phase::Finished(_) => "FINISHED",
            Phase::Cancelled => "CANCELLED",
        }
    }
}

/// Result of one shot, as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FireResult {
    pub shooter: String,
    pub target: String,
    pub row: usize,
    pub col: usize,
    pub hit: bool,
    pub sunk: bool,
    /// Length of the ship this shot sank.
    pub sunk_length: Option<usize>,
    pub game_over: bool,
    /// The cell had already been shot; nothing changed on the board.
    pub repeat: bool,
    /// Whose turn it is after this shot.
    pub next_turn: String,
}

impl FireResult {
    /// Short human-readable verdict.
    pub fn message(&self) -> String {
        let mut msg = String::from(match (self.hit, self.sunk, self.repeat) {
            (_, _, true) => "Already shot there.",
            (true, true, _) => "Hit! Ship sunk!",
            (true, false, _) => "Hit!",
            (false, _, _) => "Miss!",
        });
        if self.game_over {
            msg.push_str(" Game over!");
        }
        msg
    }
}

/// Per-participant ready state, for snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeatState {
    pub name: String,
    pub ready: bool,
    pub is_ai: bool,
}

/// What a participant is allowed to know about their match.
#[derive(Debug, Clone, Serialize)]
pub struct MatchSnapshot {
    pub id: MatchId,
    pub kind: MatchKind,
    pub phase: Phase,
    pub current_turn: Option<String>,
    pub seats: Vec<SeatState>,
    pub own_board: BoardView,
    pub opponent_board: Option<BoardView>,
    pub created_at: SystemTime,
    pub started_at: Option<SystemTime>,
    pub finished_at: Option<SystemTime>,
}

/// Registry listing entry.
#[derive(Debug, Clone, Serialize)]
pub struct MatchSummary {
    pub id: MatchId,
    pub players: Vec<String>,
    pub kind: MatchKind,
    pub phase: Phase,
    pub created_at: SystemTime,
    /// Time spent waiting for an opponent; only set while awaiting one.
    pub waiting_for: Option<Duration>,
}

struct Seat {
    participant: Participant,
    board: Board,
    ready: bool,
}

impl Seat {
    fn new(participant: Participant) -> Self {
        let board = Board::new(participant.name());
        Self {
            participant,
            board,
            ready: false,
        }
    }
}

/// One two-player match.
pub struct Match {
    id: MatchId,
    kind: MatchKind,
    first: Seat,
    second: Option<Seat>,
    phase: Phase,
    current_turn: Option<String>,
    created_at: SystemTime,
    started_at: Option<SystemTime>,
    finished_at: Option<SystemTime>,
    rng: SmallRng,
}

impl Match {
    /// New match awaiting its second participant.
    pub fn new(id: MatchId, first: Participant, kind: MatchKind, rng: SmallRng) -> Self {
        Self {
            id,
            kind,
            first: Seat::new(first),
            second: None,
            phase: Phase::AwaitingOpponent,
            current_turn: None,
            created_at: SystemTime::now(),
            started_at: None,
            finished_at: None,
            rng,
        }
    }

    pub fn id(&self) -> MatchId {
        self.id
    }

    pub fn kind(&self) -> MatchKind {
        self.kind
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn current_turn(&self) -> Option<&str> {
        self.current_turn.as_deref()
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn started_at(&self) -> Option<SystemTime> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<SystemTime> {
        self.finished_at
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        match &self.phase {
            Phase::Finished(outcome) => Some(outcome),
            _ => None,
        }
    }

    pub fn first(&self) -> &Participant {
        &self.first.participant
    }

    pub fn second(&self) -> Option<&Participant> {
        self.second.as_ref().map(|s| &s.participant)
    }

    /// Both seated participants, creator first.
    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        core::iter::once(&self.first.participant).chain(self.second.as_ref().map(|s| &s.participant))
    }

    /// Names of the seated humans, the only ones who receive notifications.
    pub fn human_names(&self) -> Vec<String> {
        self.participants()
            .filter(|p| !p.is_ai())
            .map(|p| p.name().to_string())
            .collect()
    }

    pub fn is_participant(&self, name: &str) -> bool {
        self.participants().any(|p| p.name() == name)
    }

    /// Seat the second participant and open ship placement. An AI opponent
    /// gets its fleet placed and is marked ready straight away.
    pub fn connect_second_participant(&mut self, participant: Participant) -> Result<()> {
        if self.second.is_some() {
            return Err(GameError::InvalidState(
                "second participant already connected".into(),
            ));
        }
        if self.phase != Phase::AwaitingOpponent {
            return Err(GameError::InvalidState(format!(
                "cannot join a match in phase {}",
                self.phase.name()
            )));
        }
        if participant.name() == self.first.participant.name() {
            return Err(GameError::InvalidArgument(format!(
                "{} is already seated in this match",
                participant.name()
            )));
        }
        match (self.kind, participant.is_ai()) {
            (MatchKind::PlayerVsAi, false) => {
                return Err(GameError::InvalidArgument(
                    "player-vs-AI matches take an AI opponent".into(),
                ))
            }
            (MatchKind::PlayerVsPlayer, true) => {
                return Err(GameError::InvalidArgument(
                    "player-vs-player matches take a human opponent".into(),
                ))
            }
            _ => {}
        }

        let mut seat = Seat::new(participant);
        if seat.participant.is_ai() {
            seat.board.place_fleet_automatically(&mut self.rng)?;
            seat.ready = true;
        }
        debug!("match {}: {} connected", self.id, seat.participant.name());
        self.second = Some(seat);
        self.phase = Phase::PlacingShips;
        self.try_start();
        Ok(())
    }

    /// Submit a fleet for `name`. A valid fleet marks the participant ready.
    /// Returns whether the fleet was accepted; a rejected fleet changes nothing.
    pub fn place_fleet(&mut self, name: &str, placements: &[ShipPlacement]) -> Result<bool> {
        self.ensure_placement_open()?;
        let seat = self.seat_mut(name)?;
        if !seat.board.place_fleet(placements) {
            return Ok(false);
        }
        self.mark_ready(name)?;
        Ok(true)
    }

    /// Place a random valid fleet for `name` and mark them ready.
    pub fn place_fleet_automatically(&mut self, name: &str) -> Result<()> {
        self.ensure_placement_open()?;
        let seat = match (&mut self.second, self.first.participant.name() == name) {
            (_, true) => &mut self.first,
            (Some(second), false) if second.participant.name() == name => second,
            _ => return Err(unknown_participant(name)),
        };
        seat.board.place_fleet_automatically(&mut self.rng)?;
        self.mark_ready(name)
    }

    /// Mark `name` ready once their board holds a valid fleet. Starts the match
    /// when both participants are ready.
    pub fn mark_ready(&mut self, name: &str) -> Result<()> {
        self.ensure_placement_open()?;
        let seat = self.seat_mut(name)?;
        if !seat.board.has_fleet() {
            return Err(GameError::InvalidState(format!(
                "{name} has not placed a valid fleet"
            )));
        }
        seat.ready = true;
        self.try_start();
        Ok(())
    }

    pub fn is_ready(&self, name: &str) -> Result<bool> {
        self.seat(name).map(|s| s.ready)
    }

    /// Ready flags of the seated participants, creator first.
    pub fn ready_states(&self) -> Vec<SeatState> {
        core::iter::once(&self.first)
            .chain(self.second.as_ref())
            .map(|s| SeatState {
                name: s.participant.name().to_string(),
                ready: s.ready,
                is_ai: s.participant.is_ai(),
            })
            .collect()
    }

    fn try_start(&mut self) {
        let both_ready = self.first.ready && self.second.as_ref().is_some_and(|s| s.ready);
        if self.phase == Phase::PlacingShips && both_ready {
            self.phase = Phase::InProgress;
            self.started_at = Some(SystemTime::now());
            self.current_turn = Some(self.first.participant.name().to_string());
            info!(
                "match {}: started, {} moves first",
                self.id,
                self.first.participant.name()
            );
        }
    }

    /// Fire at the shooter's opponent. A hit keeps the turn, anything else
    /// passes it; sinking the last ship finishes the match.
    pub fn fire(&mut self, shooter: &str, row: usize, col: usize) -> Result<FireResult> {
        if self.phase != Phase::InProgress {
            return Err(GameError::InvalidState(format!(
                "game is not in progress ({})",
                self.phase.name()
            )));
        }
        if !self.is_participant(shooter) {
            return Err(unknown_participant(shooter));
        }
        if self.current_turn.as_deref() != Some(shooter) {
            return Err(GameError::InvalidState(format!("it is not {shooter}'s turn")));
        }

        let id = self.id;
        let target = self.opponent_seat_mut(shooter)?;
        let result = target.board.take_shot(row, col)?;
        let target_name = target.participant.name().to_string();
        let hit = result.is_hit();
        let game_over = hit && target.board.all_sunk();

        if game_over {
            self.phase = Phase::Finished(Outcome {
                winner: shooter.to_string(),
                loser: target_name.clone(),
            });
            self.finished_at = Some(SystemTime::now());
            info!("match {id}: {shooter} sank the last ship of {target_name}");
        } else if !hit {
            self.current_turn = Some(target_name.clone());
        }

        Ok(FireResult {
            shooter: shooter.to_string(),
            next_turn: if hit {
                shooter.to_string()
            } else {
                target_name.clone()
            },
            target: target_name,
            row,
            col,
            hit,
            sunk: result.is_sink(),
            sunk_length: match result {
                ShotResult::Sink(len) => Some(len),
                _ => None,
            },
            game_over,
            repeat: result == ShotResult::Repeat,
        })
    }

    /// Let the AI participant shoot for as long as it holds the turn.
    pub fn play_ai_turns(&mut self, strategy: &dyn ShotStrategy) -> Result<Vec<FireResult>> {
        let mut shots = Vec::new();
        for _ in 0..BOARD_SIZE * BOARD_SIZE {
            if self.phase != Phase::InProgress {
                break;
            }
            let Some(ai_name) = self
                .current_turn
                .clone()
                .filter(|name| self.participants().any(|p| p.is_ai() && p.name() == name))
            else {
                break;
            };
            let (view, remaining) = {
                let board = &self.opponent_seat(&ai_name)?.board;
                (board.redacted_view(), board.remaining_lengths())
            };
            let target = strategy
                .select_target(&mut self.rng, &view, &remaining)
                .filter(|&(r, c)| r < BOARD_SIZE && c < BOARD_SIZE && !view[r][c].is_resolved())
                .or_else(|| first_open_square(&view));
            let Some((r, c)) = target else {
                break;
            };
            let shot = self.fire(&ai_name, r, c)?;
            let result = if let Some(len) = shot.sunk_length {
                ShotResult::Sink(len)
            } else if shot.repeat {
                ShotResult::Repeat
            } else if shot.hit {
                ShotResult::Hit
            } else {
                ShotResult::Miss
            };
            strategy.handle_shot_result((r, c), result);
            shots.push(shot);
        }
        Ok(shots)
    }

    /// Finish with the given outcome. Repeating the recorded outcome is a no-op.
    pub fn finish(&mut self, outcome: Outcome) -> Result<()> {
        if !self.is_participant(&outcome.winner) || !self.is_participant(&outcome.loser) {
            return Err(GameError::InvalidArgument(format!(
                "outcome {} over {} does not name this match's participants",
                outcome.winner, outcome.loser
            )));
        }
        if outcome.winner == outcome.loser {
            return Err(GameError::InvalidArgument("winner and loser must differ".into()));
        }
        match &self.phase {
            Phase::Finished(existing) if *existing == outcome => Ok(()),
            Phase::Finished(_) | Phase::Cancelled => Err(GameError::InvalidState(format!(
                "match already ended ({})",
                self.phase.name()
            ))),
            _ => {
                self.phase = Phase::Finished(outcome);
                self.finished_at = Some(SystemTime::now());
                Ok(())
            }
        }
    }

    /// Cancel an unfinished match.
    pub fn cancel(&mut self) -> Result<()> {
        if self.phase.is_terminal() {
            return Err(GameError::InvalidState(format!(
                "match already ended ({})",
                self.phase.name()
            )));
        }
        self.phase = Phase::Cancelled;
        self.finished_at = Some(SystemTime::now());
        Ok(())
    }

    pub fn opponent_of(&self, name: &str) -> Result<&Participant> {
        self.opponent_seat(name).map(|s| &s.participant)
    }

    pub fn board_of(&self, name: &str) -> Result<&Board> {
        self.seat(name).map(|s| &s.board)
    }

    pub fn is_turn_of(&self, name: &str) -> Result<bool> {
        self.seat(name)?;
        Ok(self.current_turn.as_deref() == Some(name))
    }

    /// The owner's full board, or the opponent's board redacted.
    pub fn board_view(&self, name: &str, own: bool) -> Result<BoardView> {
        if own {
            Ok(self.board_of(name)?.owner_view())
        } else {
            Ok(self.opponent_seat(name)?.board.redacted_view())
        }
    }

    pub fn snapshot_for(&self, name: &str) -> Result<MatchSnapshot> {
        let own_board = self.board_of(name)?.owner_view();
        let opponent_board = self.opponent_seat(name).ok().map(|s| s.board.redacted_view());
        Ok(MatchSnapshot {
            id: self.id,
            kind: self.kind,
            phase: self.phase.clone(),
            current_turn: self.current_turn.clone(),
            seats: self.ready_states(),
            own_board,
            opponent_board,
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
        })
    }

    pub fn summary(&self) -> MatchSummary {
        let waiting_for = (self.phase == Phase::AwaitingOpponent)
            .then(|| self.created_at.elapsed().unwrap_or_default());
        MatchSummary {
            id: self.id,
            players: self.participants().map(|p| p.name().to_string()).collect(),
            kind: self.kind,
            phase: self.phase.clone(),
            created_at: self.created_at,
            waiting_for,
        }
    }

    fn ensure_placement_open(&self) -> Result<()> {
        match self.phase {
            Phase::AwaitingOpponent | Phase::PlacingShips => Ok(()),
            _ => Err(GameError::InvalidState(format!(
                "cannot place ships, match is {}",
                self.phase.name()
            ))),
        }
    }

    fn seat(&self, name: &str) -> Result<&Seat> {
        if self.first.participant.name() == name {
            return Ok(&self.first);
        }
        match &self.second {
            Some(seat) if seat.participant.name() == name => Ok(seat),
            _ => Err(unknown_participant(name)),
        }
    }

    fn seat_mut(&mut self, name: &str) -> Result<&mut Seat> {
        if self.first.participant.name() == name {
            return Ok(&mut self.first);
        }
        match &mut self.second {
            Some(seat) if seat.participant.name() == name => Ok(seat),
            _ => Err(unknown_participant(name)),
        }
    }

    fn opponent_seat(&self, name: &str) -> Result<&Seat> {
        self.seat(name)?;
        if self.first.participant.name() == name {
            self.second
                .as_ref()
                .ok_or_else(|| GameError::InvalidState("no opponent has joined yet".into()))
        } else {
            Ok(&self.first)
        }
    }

    fn opponent_seat_mut(&mut self, name: &str) -> Result<&mut Seat> {
        self.seat(name)?;
        if self.first.participant.name() == name {
            self.second
                .as_mut()
                .ok_or_else(|| GameError::InvalidState("no opponent has joined yet".into()))
        } else {
            Ok(&mut self.first)
        }
    }
}

fn unknown_participant(name: &str) -> GameError {
    GameError::InvalidArgument(format!("{name} is not a participant of this match"))
}

fn first_open_square(view: &BoardView) -> Option<(usize, usize)> {
    (0..BOARD_SIZE)
        .flat_map(|r| (0..BOARD_SIZE).map(move |c| (r, c)))
        .find(|&(r, c)| !view[r][c].is_resolved())
}
