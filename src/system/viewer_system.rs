//! Viewer System - entry point wiring the scene to the SLAM pipeline.
//!
//! The `ViewerSystem` owns the shared scene, the synchronizer that applies
//! pipeline notifications to it, and (in worker mode) the thread that
//! drains the notification queue.

use std::sync::Arc;

use crate::config::{DispatchMode, ViewerConfig};
use crate::evaluation::DriftReport;
use crate::viz::snapshot::RenderSnapshot;

use super::backend::SlamBackend;
use super::dispatcher::EventHub;
use super::messages::SlamEvent;
use super::shared_state::SceneState;
use super::synchronizer::{PlacementTrigger, SceneSynchronizer, SyncStats};
use super::worker::{DispatchError, EventSender, EventWorker};

/// How notifications reach the synchronizer.
enum Delivery {
    /// Published on the caller's thread.
    Inline(EventHub),
    /// Queued to the worker thread.
    Worker {
        worker: EventWorker,
        sender: EventSender,
    },
}

/// Scene synchronization for one SLAM session.
pub struct ViewerSystem {
    /// Scene shared with the render loop.
    state: Arc<SceneState>,

    /// Applies notifications to `state`.
    synchronizer: Arc<SceneSynchronizer>,

    delivery: Delivery,
}

impl ViewerSystem {
    /// Create a viewer system for `backend`.
    pub fn new(config: &ViewerConfig, backend: Arc<dyn SlamBackend>) -> Self {
        Self::new_with_hub(config, backend, EventHub::new())
    }

    /// Create a viewer system whose hub already carries other subscribers.
    ///
    /// The synchronizer's own subscribers are added after the existing ones.
    pub fn new_with_hub(
        config: &ViewerConfig,
        backend: Arc<dyn SlamBackend>,
        mut hub: EventHub,
    ) -> Self {
        let state = SceneState::new(config.scene.path_registry_config());
        let synchronizer = Arc::new(SceneSynchronizer::new(
            Arc::clone(&state),
            backend,
            config.scene.anchors.clone(),
        ));
        synchronizer.register(&mut hub);

        let delivery = match config.dispatch.mode {
            DispatchMode::Inline => Delivery::Inline(hub),
            DispatchMode::Worker => {
                let (worker, sender) = EventWorker::spawn(hub, &config.dispatch.worker);
                let sender = sender.with_placements(synchronizer.placement_queue());
                Delivery::Worker { worker, sender }
            }
        };

        tracing::info!(
            "Viewer system started ({:?} dispatch, inactive maps: {:?})",
            config.dispatch.mode,
            config.scene.inactive_map_policy()
        );

        Self {
            state,
            synchronizer,
            delivery,
        }
    }

    /// Hand a notification to the synchronizer.
    ///
    /// Pending anchor placements are attached to the frame here, so they
    /// land on the pose the user saw. Inline mode applies the notification
    /// before returning. Worker mode queues it, blocking while the queue is
    /// full.
    pub fn push_event(&mut self, event: impl Into<SlamEvent>) -> Result<(), DispatchError> {
        match &mut self.delivery {
            Delivery::Inline(hub) => {
                let mut event = event.into();
                self.synchronizer.placement_queue().stamp(&mut event);
                hub.publish(&event);
                Ok(())
            }
            Delivery::Worker { sender, .. } => sender.send(event),
        }
    }

    /// Sender for pipeline threads. `None` in inline mode.
    ///
    /// Frames sent through it carry the placements pending at send time.
    pub fn event_sender(&self) -> Option<EventSender> {
        match &self.delivery {
            Delivery::Inline(_) => None,
            Delivery::Worker { sender, .. } => Some(sender.clone()),
        }
    }

    /// Handle for the input layer to request anchors.
    pub fn placement_trigger(&self) -> PlacementTrigger {
        self.synchronizer.placement_trigger()
    }

    /// Shared scene for the render loop.
    pub fn scene(&self) -> &Arc<SceneState> {
        &self.state
    }

    pub fn snapshot(&self) -> RenderSnapshot {
        self.state.snapshot()
    }

    pub fn stats(&self) -> SyncStats {
        self.synchronizer.stats()
    }

    /// Drift between the first and last error marker placed so far.
    pub fn drift_report(&self) -> Option<DriftReport> {
        self.state.read().drift().report()
    }

    /// Apply everything already queued and stop the worker.
    ///
    /// Notifications pushed afterwards are rejected in worker mode.
    pub fn shutdown(&mut self) {
        if let Delivery::Worker { worker, .. } = &mut self.delivery {
            if worker.shutdown().is_some() {
                tracing::info!(
                    "Viewer system stopped after {} events",
                    self.state.events_applied()
                );
            }
        }
    }
}

impl Drop for ViewerSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}
