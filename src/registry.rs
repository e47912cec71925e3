//! Concurrent store of matches and participant bindings.
//!
//! Two lock tiers: the index lock guards the match table and the
//! participant-to-match bindings; each match has its own mutex. A match lock
//! may be held while the index lock is taken, never the other way round, so a
//! busy match never stalls lookups of the others.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::{Mutex, MutexGuard, RwLock};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::Serialize;
use tokio::time::Instant;

use crate::common::{GameError, MatchId, Result};
use crate::config::Config;
use crate::game::{Match, MatchKind, MatchSummary, Outcome, Participant, Phase};

/// A stored match and its lock.
pub struct MatchHandle {
    id: MatchId,
    game: Mutex<Match>,
}

impl std::fmt::Debug for MatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl MatchHandle {
    pub fn id(&self) -> MatchId {
        self.id
    }

    /// Lock the match for reading or mutation.
    pub fn lock(&self) -> MutexGuard<'_, Match> {
        self.game.lock()
    }
}

struct Entry {
    handle: Arc<MatchHandle>,
    evict_at: Option<Instant>,
}

#[derive(Default)]
struct Indices {
    matches: HashMap<MatchId, Entry>,
    bindings: HashMap<String, MatchId>,
}

impl Indices {
    fn bound_match(&self, name: &str) -> Option<MatchId> {
        self.bindings.get(name).copied()
    }

    fn unbind_all(&mut self, id: MatchId) {
        self.bindings.retain(|_, bound| *bound != id);
    }
}

/// Counts over the active set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub total: usize,
    pub awaiting_opponent: usize,
    pub placing_ships: usize,
    pub in_progress: usize,
    /// Finished or cancelled, waiting for eviction.
    pub ended: usize,
    pub player_vs_player: usize,
    pub player_vs_ai: usize,
    pub bound_participants: usize,
    pub max_active: usize,
    pub min_active: usize,
    pub healthy: bool,
}

pub struct SessionRegistry {
    indices: RwLock<Indices>,
    config: Config,
    ai_counter: Mutex<u64>,
    rng: Mutex<SmallRng>,
    this: Weak<SessionRegistry>,
}

impl SessionRegistry {
    pub fn new(config: Config) -> Arc<Self> {
        Self::with_rng(config, SmallRng::from_os_rng())
    }

    /// Registry whose match RNGs derive from `seed`, for reproducible runs.
    pub fn with_seed(config: Config, seed: u64) -> Arc<Self> {
        Self::with_rng(config, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(config: Config, rng: SmallRng) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            indices: RwLock::new(Indices::default()),
            config,
            ai_counter: Mutex::new(0),
            rng: Mutex::new(rng),
            this: this.clone(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Allocate a match for `first` and bind them to it. A player-vs-AI match
    /// gets its AI opponent straight away.
    pub fn create_match(&self, first: Participant, kind: MatchKind) -> Result<Arc<MatchHandle>> {
        if first.is_ai() {
            return Err(GameError::InvalidArgument(
                "matches are created by human participants".into(),
            ));
        }
        let mut indices = self.indices.write();
        if indices.matches.len() >= self.config.max_active_sessions {
            debug!("create for {} rejected: registry full", first.name());
            return Err(GameError::CapacityExceeded {
                max: self.config.max_active_sessions,
            });
        }
        if indices.bound_match(first.name()).is_some() {
            debug!("create for {} rejected: already active", first.name());
            return Err(GameError::AlreadyActive(first.name().to_string()));
        }

        let id = MatchId::new();
        let seed: u64 = self.rng.lock().random();
        let name = first.name().to_string();
        let mut game = Match::new(id, first, kind, SmallRng::seed_from_u64(seed));
        if kind == MatchKind::PlayerVsAi {
            game.connect_second_participant(Participant::ai(self.next_ai_name()))?;
        }

        let handle = Arc::new(MatchHandle {
            id,
            game: Mutex::new(game),
        });
        indices.matches.insert(
            id,
            Entry {
                handle: handle.clone(),
                evict_at: None,
            },
        );
        indices.bindings.insert(name.clone(), id);
        info!("match {} created by {} ({:?})", id, name, kind);
        Ok(handle)
    }

    pub fn join_match(&self, id: MatchId, name: &str) -> Result<Arc<MatchHandle>> {
        self.join_match_with(id, name, |_| {})
    }

    /// Seat `name` as the second participant. `on_joined` runs while the match
    /// is still locked, so anything it publishes precedes later updates.
    pub fn join_match_with(
        &self,
        id: MatchId,
        name: &str,
        on_joined: impl FnOnce(&Match),
    ) -> Result<Arc<MatchHandle>> {
        let handle = self.get(id)?;
        let mut game = handle.lock();
        if game.kind() != MatchKind::PlayerVsPlayer {
            return Err(GameError::InvalidState(
                "player-vs-AI matches cannot be joined".into(),
            ));
        }
        if *game.phase() != Phase::AwaitingOpponent {
            return Err(GameError::InvalidState(format!(
                "match is {}",
                game.phase().name()
            )));
        }
        {
            let mut indices = self.indices.write();
            if indices.bound_match(name).is_some() {
                debug!("join of {} by {} rejected: already active", id, name);
                return Err(GameError::AlreadyActive(name.to_string()));
            }
            game.connect_second_participant(Participant::human(name))?;
            indices.bindings.insert(name.to_string(), id);
        }
        info!("match {}: {} joined", id, name);
        on_joined(&*game);
        drop(game);
        Ok(handle)
    }

    /// Record `outcome`, release both participants and schedule eviction.
    pub fn finish_match(&self, id: MatchId, outcome: Outcome) -> Result<()> {
        self.finish_match_with(id, outcome, |_| {})
    }

    /// As [`finish_match`](Self::finish_match); `on_ended` runs under the match lock.
    pub fn finish_match_with(
        &self,
        id: MatchId,
        outcome: Outcome,
        on_ended: impl FnOnce(&Match),
    ) -> Result<()> {
        self.retire(id, |game| game.finish(outcome), on_ended)
    }

    /// Cancel an unfinished match, release its participants and schedule eviction.
    pub fn cancel_match(&self, id: MatchId) -> Result<()> {
        self.cancel_match_with(id, |_| {})
    }

    pub fn cancel_match_with(&self, id: MatchId, on_ended: impl FnOnce(&Match)) -> Result<()> {
        self.retire(id, Match::cancel, on_ended)
    }

    fn retire(
        &self,
        id: MatchId,
        transition: impl FnOnce(&mut Match) -> Result<()>,
        on_ended: impl FnOnce(&Match),
    ) -> Result<()> {
        let handle = self.get(id)?;
        let mut game = handle.lock();
        transition(&mut *game)?;
        if self.release_ended(id) {
            info!("match {} ended ({})", id, game.phase().name());
            on_ended(&*game);
        }
        Ok(())
    }

    /// Unbind the participants of an ended match and schedule its eviction.
    /// The caller holds the match lock. Returns false when the match was
    /// already released.
    pub(crate) fn release_ended(&self, id: MatchId) -> bool {
        let delay = self.config.eviction_delay;
        {
            let mut indices = self.indices.write();
            indices.unbind_all(id);
            match indices.matches.get_mut(&id) {
                Some(entry) if entry.evict_at.is_none() => {
                    entry.evict_at = Some(Instant::now() + delay);
                }
                _ => return false,
            }
        }
        self.schedule_eviction(id, delay);
        true
    }

    fn schedule_eviction(&self, id: MatchId, delay: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime, match {} waits for the sweeper", id);
            return;
        };
        let registry = self.this.clone();
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(registry) = registry.upgrade() {
                registry.evict_expired(Instant::now());
            }
        });
    }

    /// Remove ended matches whose grace window has passed. Returns how many went.
    pub fn evict_expired(&self, now: Instant) -> usize {
        let mut indices = self.indices.write();
        let before = indices.matches.len();
        indices.matches.retain(|id, entry| {
            let expired = entry.evict_at.is_some_and(|at| at <= now);
            if expired {
                info!("match {} evicted", id);
            }
            !expired
        });
        before - indices.matches.len()
    }

    pub fn get(&self, id: MatchId) -> Result<Arc<MatchHandle>> {
        self.indices
            .read()
            .matches
            .get(&id)
            .map(|e| e.handle.clone())
            .ok_or(GameError::NotFound(id))
    }

    /// Match `name` is currently bound to.
    pub fn match_of(&self, name: &str) -> Option<MatchId> {
        self.indices.read().bound_match(name)
    }

    fn handles(&self) -> Vec<Arc<MatchHandle>> {
        self.indices
            .read()
            .matches
            .values()
            .map(|e| e.handle.clone())
            .collect()
    }

    /// Summaries of every stored match, ended ones awaiting eviction included.
    pub fn list_active(&self) -> Vec<MatchSummary> {
        let mut list: Vec<MatchSummary> = self.handles().iter().map(|h| h.lock().summary()).collect();
        list.sort_by_key(|s| s.created_at);
        list
    }

    /// Matches still waiting for an opponent, longest waiting first.
    pub fn list_waiting(&self) -> Vec<MatchSummary> {
        self.list_active()
            .into_iter()
            .filter(|s| s.phase == Phase::AwaitingOpponent)
            .collect()
    }

    pub fn count_active(&self) -> usize {
        self.indices.read().matches.len()
    }

    pub fn is_participant_active(&self, name: &str) -> bool {
        self.indices.read().bindings.contains_key(name)
    }

    pub fn stats(&self) -> SessionStats {
        let (handles, bound) = {
            let indices = self.indices.read();
            let handles: Vec<_> = indices.matches.values().map(|e| e.handle.clone()).collect();
            (handles, indices.bindings.len())
        };
        let mut stats = SessionStats {
            total: handles.len(),
            bound_participants: bound,
            max_active: self.config.max_active_sessions,
            min_active: self.config.min_active_sessions,
            ..SessionStats::default()
        };
        for handle in &handles {
            let game = handle.lock();
            match game.phase() {
                Phase::AwaitingOpponent => stats.awaiting_opponent += 1,
                Phase::PlacingShips => stats.placing_ships += 1,
                Phase::InProgress => stats.in_progress += 1,
                Phase::Finished(_) | Phase::Cancelled => stats.ended += 1,
            }
            match game.kind() {
                MatchKind::PlayerVsPlayer => stats.player_vs_player += 1,
                MatchKind::PlayerVsAi => stats.player_vs_ai += 1,
            }
        }
        stats.healthy = stats.total >= stats.min_active;
        if !stats.healthy {
            warn!(
                "active sessions ({}) below healthy minimum ({})",
                stats.total, stats.min_active
            );
        }
        stats
    }

    fn next_ai_name(&self) -> String {
        let mut counter = self.ai_counter.lock();
        *counter += 1;
        format!("AI_Player_{}", *counter)
    }
}
