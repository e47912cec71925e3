//! Notification fan-out: ordered events delivered per participant through a
//! long-poll queue (pull) or a live subscriber handle (push).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use log::trace;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::common::MatchId;
use crate::config::Config;

pub mod pull;
pub mod push;

pub use pull::PullQueues;
pub use push::{ChannelSink, EventSink, PushHub, PushMessage};

/// What changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    PlayerJoined,
    PlayerReady,
    GameStarted,
    ShotFired,
    TurnChanged,
    GameOver,
    GameCancelled,
}

/// An immutable notification. Ids come from a single counter and are never reused.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: u64,
    pub match_id: MatchId,
    pub kind: EventKind,
    pub payload: serde_json::Value,
    pub created_at: SystemTime,
}

/// Counts from one maintenance pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub queues_evicted: usize,
    pub handles_dropped: usize,
    pub pings_sent: usize,
}

/// Owns the event counter and both delivery mechanisms.
pub struct Notifier {
    next_id: AtomicU64,
    // Held while an id is taken and enqueued so queues see ids in order.
    publish_lock: Mutex<()>,
    pull: PullQueues,
    push: PushHub,
    idle_timeout: Duration,
}

impl Notifier {
    pub fn new(config: &Config) -> Self {
        Self {
            next_id: AtomicU64::new(0),
            publish_lock: Mutex::new(()),
            pull: PullQueues::new(config.queue_capacity),
            push: PushHub::new(),
            idle_timeout: config.subscriber_idle_timeout,
        }
    }

    /// Emit one event to `recipients`. Returns its id.
    pub fn publish(
        &self,
        match_id: MatchId,
        kind: EventKind,
        payload: serde_json::Value,
        recipients: &[String],
    ) -> u64 {
        let _guard = self.publish_lock.lock();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let event = Event {
            id,
            match_id,
            kind,
            payload,
            created_at: SystemTime::now(),
        };
        trace!("event {} {:?} for match {} -> {:?}", id, kind, match_id, recipients);
        for name in recipients {
            self.pull.enqueue(name, event.clone());
            self.push.dispatch(name, PushMessage::Event(event.clone()));
        }
        id
    }

    /// Id of the most recently published event, 0 if none.
    pub fn last_event_id(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    /// Oldest queued event for `participant` newer than `last_seen`, waiting up
    /// to `wait` for one to arrive. A zero `wait` checks without suspending.
    /// Events of other matches are skipped when `match_id` is given.
    pub async fn fetch_since(
        &self,
        participant: &str,
        match_id: Option<MatchId>,
        last_seen: u64,
        wait: Duration,
    ) -> Option<Event> {
        self.pull.fetch(participant, match_id, last_seen, wait).await
    }

    /// Register a live handle for `participant`, replacing any previous one.
    pub fn subscribe_live(&self, participant: &str, sink: Arc<dyn EventSink>) {
        self.push.register(participant, sink);
    }

    /// Register a channel-backed live handle and return its receiving end.
    pub fn subscribe_channel(&self, participant: &str, buffer: usize) -> mpsc::Receiver<PushMessage> {
        let (sink, rx) = ChannelSink::pair(buffer);
        self.subscribe_live(participant, Arc::new(sink));
        rx
    }

    /// Drop the participant's queue and live handle. Pending waits return nothing.
    pub fn unsubscribe(&self, participant: &str) {
        self.pull.remove(participant);
        self.push.remove(participant);
    }

    pub fn has_queue(&self, participant: &str) -> bool {
        self.pull.contains(participant)
    }

    pub fn has_live_handle(&self, participant: &str) -> bool {
        self.push.contains(participant)
    }

    /// Evict idle queues, drop dead handles and ping the live ones.
    pub fn sweep(&self, now: Instant) -> SweepReport {
        let queues_evicted = self.pull.evict_idle(now, self.idle_timeout);
        let (handles_dropped, pings_sent) = self.push.sweep(now, self.idle_timeout);
        SweepReport {
            queues_evicted,
            handles_dropped,
            pings_sent,
        }
    }
}
