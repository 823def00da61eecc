//! EventWorker - asynchronous notification delivery.
//!
//! When the SLAM pipeline raises notifications from its own threads, they
//! are queued on a bounded channel and applied one at a time by a dedicated
//! worker thread that owns the [`EventHub`]. The channel preserves the order
//! in which notifications were raised.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::dispatcher::EventHub;
use super::messages::SlamEvent;
use super::synchronizer::PlacementQueue;

/// Errors returned when handing a notification to the worker.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("event worker has shut down, dropped {0} event")]
    Disconnected(&'static str),

    #[error("event queue full, dropped {0} event")]
    QueueFull(&'static str),
}

/// Configuration for the event worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventWorkerConfig {
    /// Capacity of the notification queue. Senders block when it is full.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// How long the worker waits for a notification before re-checking the
    /// shutdown flag (ms).
    #[serde(default = "default_recv_timeout_ms")]
    pub recv_timeout_ms: u64,
}

fn default_queue_capacity() -> usize {
    64
}

fn default_recv_timeout_ms() -> u64 {
    100
}

impl Default for EventWorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            recv_timeout_ms: default_recv_timeout_ms(),
        }
    }
}

/// Pipeline-side handle for queueing notifications.
#[derive(Clone)]
pub struct EventSender {
    sender: Sender<SlamEvent>,
    /// Cleared by [`EventWorker::shutdown`]; held shared for the duration of
    /// every send so nothing is queued after the final drain started.
    open: Arc<RwLock<bool>>,
    placements: Option<PlacementQueue>,
}

impl EventSender {
    /// Attach pending anchor placements to every frame sent from now on.
    pub(crate) fn with_placements(mut self, placements: PlacementQueue) -> Self {
        self.placements = Some(placements);
        self
    }

    fn prepare(&self, event: impl Into<SlamEvent>) -> SlamEvent {
        let mut event = event.into();
        if let Some(placements) = &self.placements {
            placements.stamp(&mut event);
        }
        event
    }

    /// Queue a notification, blocking while the queue is full.
    pub fn send(&self, event: impl Into<SlamEvent>) -> Result<(), DispatchError> {
        let open = self.open.read();
        if !*open {
            return Err(DispatchError::Disconnected(event.into().kind()));
        }
        let event = self.prepare(event);
        let kind = event.kind();
        self.sender
            .send(event)
            .map_err(|_| DispatchError::Disconnected(kind))
    }

    /// Queue a notification without blocking.
    ///
    /// On a full queue, placement requests carried by a rejected frame are
    /// kept for the next one.
    pub fn try_send(&self, event: impl Into<SlamEvent>) -> Result<(), DispatchError> {
        let open = self.open.read();
        if !*open {
            return Err(DispatchError::Disconnected(event.into().kind()));
        }
        let event = self.prepare(event);
        let kind = event.kind();
        self.sender.try_send(event).map_err(|e| match e {
            TrySendError::Full(event) => {
                if let Some(placements) = &self.placements {
                    placements.requeue(event);
                }
                DispatchError::QueueFull(kind)
            }
            TrySendError::Disconnected(_) => DispatchError::Disconnected(kind),
        })
    }

    /// Notifications waiting to be applied.
    pub fn pending(&self) -> usize {
        self.sender.len()
    }
}

/// Background thread applying queued notifications.
pub struct EventWorker {
    open: Arc<RwLock<bool>>,
    shutdown: Arc<AtomicBool>,
    processed: Arc<AtomicU64>,
    handle: Option<JoinHandle<EventHub>>,
}

impl EventWorker {
    /// Spawn the worker thread. It takes ownership of `hub`.
    pub fn spawn(hub: EventHub, config: &EventWorkerConfig) -> (Self, EventSender) {
        let (sender, receiver) = bounded::<SlamEvent>(config.queue_capacity.max(1));
        let open = Arc::new(RwLock::new(true));
        let shutdown = Arc::new(AtomicBool::new(false));
        let processed = Arc::new(AtomicU64::new(0));
        let timeout = Duration::from_millis(config.recv_timeout_ms);

        let handle = {
            let shutdown = Arc::clone(&shutdown);
            let processed = Arc::clone(&processed);
            thread::Builder::new()
                .name("slam-event-worker".to_string())
                .spawn(move || run(hub, receiver, shutdown, processed, timeout))
        };

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!("Failed to spawn event worker: {}", e);
                None
            }
        };

        (
            Self {
                open: Arc::clone(&open),
                shutdown,
                processed,
                handle,
            },
            EventSender {
                sender,
                open,
                placements: None,
            },
        )
    }

    /// Number of notifications applied so far.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the worker after it has applied everything already queued.
    ///
    /// Every send that returned `Ok` is applied; sends from here on fail.
    /// Returns the hub so subscribers can be inspected or reused.
    pub fn shutdown(&mut self) -> Option<EventHub> {
        // Waits for in-flight sends to finish queueing.
        *self.open.write() = false;
        self.shutdown.store(true, Ordering::SeqCst);
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(hub) => Some(hub),
            Err(_) => {
                tracing::error!("Event worker panicked");
                None
            }
        }
    }
}

impl Drop for EventWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    mut hub: EventHub,
    receiver: Receiver<SlamEvent>,
    shutdown: Arc<AtomicBool>,
    processed: Arc<AtomicU64>,
    timeout: Duration,
) -> EventHub {
    tracing::info!("Event worker started");

    let mut apply = |event: SlamEvent| {
        tracing::debug!("Applying {}", event.kind());
        hub.publish(&event);
        processed.fetch_add(1, Ordering::SeqCst);
    };

    loop {
        if shutdown.load(Ordering::SeqCst) {
            // Accepted notifications always run to completion.
            for event in receiver.try_iter() {
                apply(event);
            }
            break;
        }

        match receiver.recv_timeout(timeout) {
            Ok(event) => apply(event),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                tracing::info!("Event channel disconnected");
                break;
            }
        }
    }

    tracing::info!(
        "Event worker exiting after {} events",
        processed.load(Ordering::SeqCst)
    );
    hub
}
