use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};

use super::Event;
use crate::common::MatchId;

/// Bounded per-participant event queues served by long-poll fetches.
pub struct PullQueues {
    capacity: usize,
    queues: Mutex<HashMap<String, Arc<ParticipantQueue>>>,
}

struct ParticipantQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

struct QueueState {
    events: VecDeque<Event>,
    last_activity: Instant,
    closed: bool,
}

impl QueueState {
    /// Pop the next deliverable event, discarding ones already seen or
    /// belonging to another match.
    fn take_next(&mut self, last_seen: u64, match_id: Option<MatchId>) -> Option<Event> {
        while let Some(event) = self.events.pop_front() {
            if event.id <= last_seen {
                continue;
            }
            if match_id.is_some_and(|id| id != event.match_id) {
                continue;
            }
            return Some(event);
        }
        None
    }
}

impl PullQueues {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queues: Mutex::new(HashMap::new()),
        }
    }

    fn queue(&self, participant: &str) -> Arc<ParticipantQueue> {
        let mut queues = self.queues.lock();
        queues
            .entry(participant.to_string())
            .or_insert_with(|| {
                Arc::new(ParticipantQueue {
                    state: Mutex::new(QueueState {
                        events: VecDeque::new(),
                        last_activity: Instant::now(),
                        closed: false,
                    }),
                    notify: Notify::new(),
                })
            })
            .clone()
    }

    pub fn enqueue(&self, participant: &str, event: Event) {
        let queue = self.queue(participant);
        {
            let mut state = queue.state.lock();
            if state.events.len() >= self.capacity {
                if let Some(dropped) = state.events.pop_front() {
                    warn!(
                        "event queue for {} full, dropping event {}",
                        participant, dropped.id
                    );
                }
            }
            state.events.push_back(event);
            state.last_activity = Instant::now();
        }
        queue.notify.notify_waiters();
    }

    pub async fn fetch(
        &self,
        participant: &str,
        match_id: Option<MatchId>,
        last_seen: u64,
        wait: Duration,
    ) -> Option<Event> {
        let queue = self.queue(participant);
        let deadline = Instant::now() + wait;
        loop {
            let notified = queue.notify.notified();
            tokio::pin!(notified);
            // Register interest before looking, so an enqueue in between still wakes us.
            notified.as_mut().enable();
            {
                let mut state = queue.state.lock();
                if state.closed {
                    return None;
                }
                state.last_activity = Instant::now();
                if let Some(event) = state.take_next(last_seen, match_id) {
                    return Some(event);
                }
            }
            if wait.is_zero() || timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    pub fn remove(&self, participant: &str) {
        let removed = self.queues.lock().remove(participant);
        if let Some(queue) = removed {
            close(&queue);
        }
    }

    pub fn contains(&self, participant: &str) -> bool {
        self.queues.lock().contains_key(participant)
    }

    /// Drop queues with no fetch or event for longer than `idle`.
    pub fn evict_idle(&self, now: Instant, idle: Duration) -> usize {
        let mut evicted = Vec::new();
        self.queues.lock().retain(|name, queue| {
            let last = queue.state.lock().last_activity;
            let keep = now.saturating_duration_since(last) <= idle;
            if !keep {
                evicted.push((name.clone(), queue.clone()));
            }
            keep
        });
        for (name, queue) in &evicted {
            debug!("evicting idle event queue for {}", name);
            close(queue);
        }
        evicted.len()
    }
}

fn close(queue: &ParticipantQueue) {
    queue.state.lock().closed = true;
    queue.notify.notify_waiters();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::EventKind;
    use std::time::SystemTime;

    fn event(id: u64, match_id: MatchId) -> Event {
        Event {
            id,
            match_id,
            kind: EventKind::TurnChanged,
            payload: serde_json::Value::Null,
            created_at: SystemTime::now(),
        }
    }

    #[test]
    fn take_next_skips_seen_and_foreign_events() {
        let mine = MatchId::new();
        let other = MatchId::new();
        let mut state = QueueState {
            events: VecDeque::from(vec![event(1, mine), event(2, other), event(3, mine)]),
            last_activity: Instant::now(),
            closed: false,
        };
        let next = state.take_next(1, Some(mine)).unwrap();
        assert_eq!(next.id, 3);
        assert!(state.events.is_empty());
    }

    #[tokio::test]
    async fn full_queue_drops_oldest() {
        let queues = PullQueues::new(2);
        let id = MatchId::new();
        for n in 1..=3 {
            queues.enqueue("alice", event(n, id));
        }
        let first = queues.fetch("alice", None, 0, Duration::ZERO).await.unwrap();
        assert_eq!(first.id, 2);
    }
}
