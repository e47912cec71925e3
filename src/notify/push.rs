use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;

use super::Event;

/// Messages delivered to a live subscriber.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PushMessage {
    /// First message on a new handle.
    Connected { participant: String },
    Event(Event),
    /// Liveness probe sent on every sweep.
    Ping,
}

/// Remote end of a live subscription.
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one message. An error means the remote end is gone.
    async fn send(&self, msg: PushMessage) -> anyhow::Result<()>;

    /// `true` once the remote end is known to be gone.
    fn is_closed(&self) -> bool {
        false
    }
}

/// Sink backed by a bounded tokio channel.
pub struct ChannelSink {
    tx: mpsc::Sender<PushMessage>,
}

impl ChannelSink {
    pub fn pair(buffer: usize) -> (Self, mpsc::Receiver<PushMessage>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl EventSink for ChannelSink {
    async fn send(&self, msg: PushMessage) -> anyhow::Result<()> {
        match self.tx.try_send(msg) {
            Ok(()) => Ok(()),
            // Best effort: a lagging reader loses the message but keeps the handle.
            Err(TrySendError::Full(_)) => {
                warn!("live subscriber is lagging, message dropped");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(anyhow::anyhow!("live subscriber has gone away")),
        }
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

struct Handle {
    sink: Arc<dyn EventSink>,
    generation: u64,
    last_activity: Instant,
}

type Handles = Arc<Mutex<HashMap<String, Handle>>>;

struct Dispatch {
    participant: String,
    generation: u64,
    sink: Arc<dyn EventSink>,
    msg: PushMessage,
}

/// Live per-participant handles. Publishing never waits on a sink: messages
/// go through a single dispatcher task, which keeps per-participant order and
/// drops handles whose send fails.
pub struct PushHub {
    handles: Handles,
    next_generation: AtomicU64,
    dispatch_tx: mpsc::UnboundedSender<Dispatch>,
    dispatch_rx: Mutex<Option<mpsc::UnboundedReceiver<Dispatch>>>,
}

impl Default for PushHub {
    fn default() -> Self {
        Self::new()
    }
}

impl PushHub {
    pub fn new() -> Self {
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        Self {
            handles: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
            dispatch_tx,
            dispatch_rx: Mutex::new(Some(dispatch_rx)),
        }
    }

    /// Install `sink` for `participant`, replacing any previous handle.
    pub fn register(&self, participant: &str, sink: Arc<dyn EventSink>) {
        self.ensure_dispatcher();
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let replaced = self.handles.lock().insert(
            participant.to_string(),
            Handle {
                sink,
                generation,
                last_activity: Instant::now(),
            },
        );
        if replaced.is_some() {
            debug!("replaced live handle for {}", participant);
        } else {
            info!("live handle registered for {}", participant);
        }
        self.dispatch(
            participant,
            PushMessage::Connected {
                participant: participant.to_string(),
            },
        );
    }

    pub fn remove(&self, participant: &str) {
        if self.handles.lock().remove(participant).is_some() {
            debug!("live handle for {} removed", participant);
        }
    }

    pub fn contains(&self, participant: &str) -> bool {
        self.handles.lock().contains_key(participant)
    }

    /// Queue `msg` for the participant's handle, if they have one.
    pub fn dispatch(&self, participant: &str, msg: PushMessage) {
        let target = self
            .handles
            .lock()
            .get(participant)
            .map(|h| (h.sink.clone(), h.generation));
        let Some((sink, generation)) = target else {
            return;
        };
        let _ = self.dispatch_tx.send(Dispatch {
            participant: participant.to_string(),
            generation,
            sink,
            msg,
        });
    }

    /// Drop closed or long-idle handles and ping the rest.
    /// Returns (handles dropped, pings queued).
    pub fn sweep(&self, now: Instant, idle: Duration) -> (usize, usize) {
        let mut dropped = 0;
        let mut alive = Vec::new();
        self.handles.lock().retain(|name, handle| {
            let stale = now.saturating_duration_since(handle.last_activity) > idle;
            if handle.sink.is_closed() || stale {
                dropped += 1;
                debug!("dropping live handle for {}", name);
                false
            } else {
                alive.push(name.clone());
                true
            }
        });
        for name in &alive {
            self.dispatch(name, PushMessage::Ping);
        }
        (dropped, alive.len())
    }

    fn ensure_dispatcher(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no tokio runtime; live messages are held until one is available");
            return;
        };
        if let Some(rx) = self.dispatch_rx.lock().take() {
            runtime.spawn(run_dispatcher(rx, self.handles.clone()));
        }
    }
}

async fn run_dispatcher(mut rx: mpsc::UnboundedReceiver<Dispatch>, handles: Handles) {
    while let Some(job) = rx.recv().await {
        let result = job.sink.send(job.msg).await;
        let mut handles = handles.lock();
        let current = handles
            .get(&job.participant)
            .is_some_and(|h| h.generation == job.generation);
        match result {
            Ok(()) => {
                if let Some(handle) = handles.get_mut(&job.participant).filter(|_| current) {
                    handle.last_activity = Instant::now();
                }
            }
            Err(e) => {
                if current {
                    handles.remove(&job.participant);
                    warn!("dropping live handle for {}: {}", job.participant, e);
                }
            }
        }
    }
    debug!("push dispatcher stopped");
}
