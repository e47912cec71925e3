use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use log::{debug, info};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde_json::json;
use tokio::time::{sleep, timeout, Duration};

use seabattle::{
    init_logging, Config, EventKind, GameError, GameService, MatchId, MatchKind, Phase,
    ProbabilityStrategy, PushMessage, ShotStrategy, FLEET,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Debug)]
struct ServiceArgs {
    #[arg(long, help = "Fix RNG seed for reproducible games (e.g., --seed 12345)")]
    seed: Option<u64>,
    #[arg(long, default_value_t = 10)]
    max_active: usize,
    #[arg(long, default_value_t = 1)]
    min_active: usize,
    #[arg(long, default_value_t = 200, help = "Grace window before a finished match is evicted")]
    eviction_delay_ms: u64,
    #[arg(long, default_value_t = 1000)]
    sweep_interval_ms: u64,
    #[arg(long, default_value_t = 30_000)]
    idle_timeout_ms: u64,
    #[arg(long, default_value_t = 5_000)]
    long_poll_ms: u64,
    #[arg(long, default_value_t = 4)]
    workers: usize,
}

impl ServiceArgs {
    fn config(&self) -> Config {
        let mut config = Config::default()
            .with_max_active_sessions(self.max_active)
            .with_min_active_sessions(self.min_active)
            .with_eviction_delay(Duration::from_millis(self.eviction_delay_ms))
            .with_sweep_interval(Duration::from_millis(self.sweep_interval_ms))
            .with_subscriber_idle_timeout(Duration::from_millis(self.idle_timeout_ms))
            .with_long_poll_timeout(Duration::from_millis(self.long_poll_ms));
        config.worker_threads = self.workers;
        config
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run many player-vs-AI matches at once, each watched through long-polling.
    Local {
        #[arg(long, default_value_t = 8)]
        matches: usize,
        #[command(flatten)]
        service: ServiceArgs,
    },
    /// Play one player-vs-player match between two bots on live channels.
    Duel {
        #[command(flatten)]
        service: ServiceArgs,
    },
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    let service_args = match &cli.command {
        Commands::Local { service, .. } | Commands::Duel { service } => service.clone(),
    };
    let config = service_args.config();
    config.validate().context("invalid settings")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()
        .context("failed to build runtime")?;

    runtime.block_on(async move {
        let seed = service_args.seed.unwrap_or_else(|| rand::rng().random());
        info!("using seed {}", seed);
        let service = GameService::with_seed(config, seed)?.start();
        let summary = match cli.command {
            Commands::Local { matches, .. } => run_local(service.clone(), matches, seed).await?,
            Commands::Duel { .. } => run_duel(service.clone(), seed).await?,
        };
        service.shutdown();
        println!("{}", serde_json::to_string(&summary)?);
        Ok::<(), anyhow::Error>(())
    })
}

/// Scripted participant that plays through the service like a client would.
struct Bot {
    name: String,
    rng: SmallRng,
    remaining: Vec<usize>,
    strategy: ProbabilityStrategy,
    shots: usize,
}

impl Bot {
    fn new(name: impl Into<String>, seed: u64) -> Self {
        Self {
            name: name.into(),
            rng: SmallRng::seed_from_u64(seed),
            remaining: FLEET.to_vec(),
            strategy: ProbabilityStrategy::new(),
            shots: 0,
        }
    }

    /// Fire while holding the turn. Returns `true` once the match has ended.
    fn play_turn(&mut self, service: &GameService, id: MatchId) -> anyhow::Result<bool> {
        loop {
            let snapshot = service.snapshot(id, &self.name)?;
            if snapshot.phase.is_terminal() {
                return Ok(true);
            }
            if snapshot.phase != Phase::InProgress
                || snapshot.current_turn.as_deref() != Some(self.name.as_str())
            {
                return Ok(false);
            }
            let view = service.board_view(id, &self.name, false)?;
            let (row, col) = self
                .strategy
                .select_target(&mut self.rng, &view, &self.remaining)
                .context("no open square left to shoot")?;
            let shot = match service.fire(id, &self.name, row, col) {
                Ok(shot) => shot,
                Err(GameError::InvalidState(reason)) => {
                    debug!("{} lost the race to fire: {}", self.name, reason);
                    return Ok(false);
                }
                Err(e) => return Err(e.into()),
            };
            self.shots += 1;
            if let Some(len) = shot.sunk_length {
                if let Some(pos) = self.remaining.iter().position(|&l| l == len) {
                    self.remaining.remove(pos);
                }
            }
            if shot.game_over {
                return Ok(true);
            }
        }
    }
}

async fn run_local(
    service: Arc<GameService>,
    matches: usize,
    seed: u64,
) -> anyhow::Result<serde_json::Value> {
    let mut tasks = Vec::new();
    for n in 0..matches {
        let service = service.clone();
        let bot_seed = seed.wrapping_add(n as u64 + 1);
        tasks.push(tokio::spawn(async move {
            play_against_ai(service, format!("player{}", n + 1), bot_seed).await
        }));
    }

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.context("match task panicked")??);
    }
    let human_wins = results.iter().filter(|r| r["human_won"] == true).count();
    let stats = service.stats();
    Ok(json!({
        "matches": results.len(),
        "human_wins": human_wins,
        "ai_wins": results.len() - human_wins,
        "results": results,
        "active_after": stats.total,
    }))
}

async fn play_against_ai(
    service: Arc<GameService>,
    name: String,
    seed: u64,
) -> anyhow::Result<serde_json::Value> {
    let created = loop {
        match service.create(&name, MatchKind::PlayerVsAi) {
            Ok(created) => break created,
            Err(GameError::CapacityExceeded { .. }) => sleep(Duration::from_millis(20)).await,
            Err(e) => return Err(e).context("create failed"),
        }
    };
    let id = created.match_id;
    info!("{}: {}", name, created.message);

    let listener = {
        let service = service.clone();
        let name = name.clone();
        tokio::spawn(async move { watch_events(service, name, id).await })
    };

    service.place_fleet_automatically(id, &name)?;
    let mut bot = Bot::new(name.clone(), seed);
    while !bot.play_turn(&service, id)? {
        // The AI answers inside the same call, so holding the turn again is immediate.
        tokio::task::yield_now().await;
    }

    let snapshot = service.snapshot(id, &name)?;
    let winner = match &snapshot.phase {
        Phase::Finished(outcome) => Some(outcome.winner.clone()),
        _ => None,
    };
    let events = listener.await.context("listener panicked")?;
    Ok(json!({
        "player": name,
        "match": id,
        "shots": bot.shots,
        "events": events,
        "winner": winner,
        "human_won": winner.as_deref() == Some(name.as_str()),
    }))
}

/// Long-poll until the match ends. Returns how many events arrived.
async fn watch_events(service: Arc<GameService>, name: String, id: MatchId) -> usize {
    let mut last_seen = 0;
    let mut seen = 0;
    loop {
        match service.subscribe(&name, Some(id), last_seen).await {
            Ok(Some(event)) => {
                last_seen = event.id;
                seen += 1;
                if matches!(event.kind, EventKind::GameOver | EventKind::GameCancelled) {
                    break;
                }
            }
            Ok(None) => {
                if service.registry().match_of(&name) != Some(id) {
                    break;
                }
            }
            Err(e) => {
                debug!("{} stopped watching: {}", name, e);
                break;
            }
        }
    }
    service.unsubscribe(&name);
    seen
}

async fn run_duel(service: Arc<GameService>, seed: u64) -> anyhow::Result<serde_json::Value> {
    let created = service.create("alice", MatchKind::PlayerVsPlayer)?;
    let id = created.match_id;
    info!("{}", created.message);

    let alice_rx = service.subscribe_live("alice")?;
    let bob_rx = service.subscribe_live("bob")?;
    let joined = service.join(id, "bob")?;
    info!("bob joined {}'s game", joined.opponent);

    let alice = tokio::spawn(duel_bot(service.clone(), Bot::new("alice", seed), id, alice_rx));
    let bob = tokio::spawn(duel_bot(
        service.clone(),
        Bot::new("bob", seed.wrapping_add(1)),
        id,
        bob_rx,
    ));
    service.place_fleet_automatically(id, "alice")?;
    service.place_fleet_automatically(id, "bob")?;

    let (alice_shots, alice_events) = alice.await.context("alice panicked")??;
    let (bob_shots, bob_events) = bob.await.context("bob panicked")??;
    let winner = match service.snapshot(id, "alice").map(|s| s.phase) {
        Ok(Phase::Finished(outcome)) => Some(outcome.winner),
        _ => None,
    };
    Ok(json!({
        "match": id,
        "alice": {"shots": alice_shots, "messages": alice_events},
        "bob": {"shots": bob_shots, "messages": bob_events},
        "winner": winner,
    }))
}

async fn duel_bot(
    service: Arc<GameService>,
    mut bot: Bot,
    id: MatchId,
    mut rx: tokio::sync::mpsc::Receiver<PushMessage>,
) -> anyhow::Result<(usize, usize)> {
    let quiet = service.config().long_poll_timeout;
    let mut received = 0;
    loop {
        let msg = match timeout(quiet, rx.recv()).await {
            Ok(Some(msg)) => msg,
            Ok(None) => break,
            Err(_) => {
                // A full channel drops updates, so catch up from the match itself.
                debug!("{} heard nothing for {:?}, checking the match", bot.name, quiet);
                if bot.play_turn(&service, id)? {
                    break;
                }
                continue;
            }
        };
        received += 1;
        let PushMessage::Event(event) = msg else {
            continue;
        };
        if matches!(event.kind, EventKind::GameOver | EventKind::GameCancelled) {
            break;
        }
        if matches!(event.kind, EventKind::GameStarted | EventKind::TurnChanged)
            && bot.play_turn(&service, id)?
        {
            break;
        }
    }
    service.unsubscribe(&bot.name);
    Ok((bot.shots, received))
}
