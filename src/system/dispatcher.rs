//! Typed event subscription.
//!
//! Every notification kind has its own list of named subscriber slots.
//! Registering under an existing name replaces that subscriber in place, so
//! a component can re-register without being called twice. Subscribers of a
//! kind are invoked in registration order.

use super::messages::{FrameAvailable, LoopClosureDetected, SlamEvent, SparseMapMerged};

type Handler<E> = Box<dyn FnMut(&E) + Send>;

/// Named subscribers for one event kind.
pub struct HandlerSlots<E> {
    slots: Vec<(String, Handler<E>)>,
}

impl<E> HandlerSlots<E> {
    fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Register `handler` under `name`. Returns true if it replaced one.
    pub fn insert<F>(&mut self, name: impl Into<String>, handler: F) -> bool
    where
        F: FnMut(&E) + Send + 'static,
    {
        let name = name.into();
        let handler: Handler<E> = Box::new(handler);
        match self.slots.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => {
                slot.1 = handler;
                true
            }
            None => {
                self.slots.push((name, handler));
                false
            }
        }
    }

    /// Unregister the subscriber named `name`.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.slots.len();
        self.slots.retain(|(n, _)| n != name);
        self.slots.len() != before
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Subscriber names in invocation order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|(n, _)| n.as_str())
    }

    fn notify(&mut self, event: &E) {
        for (_, handler) in &mut self.slots {
            handler(event);
        }
    }
}

/// Subscriber registry for all pipeline notifications.
pub struct EventHub {
    pub frame_available: HandlerSlots<FrameAvailable>,
    pub loop_closure_detected: HandlerSlots<LoopClosureDetected>,
    pub sparse_map_merged: HandlerSlots<SparseMapMerged>,
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            frame_available: HandlerSlots::new(),
            loop_closure_detected: HandlerSlots::new(),
            sparse_map_merged: HandlerSlots::new(),
        }
    }

    pub fn add_frame_available_handler<F>(&mut self, name: impl Into<String>, handler: F) -> bool
    where
        F: FnMut(&FrameAvailable) + Send + 'static,
    {
        self.frame_available.insert(name, handler)
    }

    pub fn add_loop_closure_handler<F>(&mut self, name: impl Into<String>, handler: F) -> bool
    where
        F: FnMut(&LoopClosureDetected) + Send + 'static,
    {
        self.loop_closure_detected.insert(name, handler)
    }

    pub fn add_map_merge_handler<F>(&mut self, name: impl Into<String>, handler: F) -> bool
    where
        F: FnMut(&SparseMapMerged) + Send + 'static,
    {
        self.sparse_map_merged.insert(name, handler)
    }

    /// Deliver one event to the subscribers of its kind.
    pub fn publish(&mut self, event: &SlamEvent) {
        match event {
            SlamEvent::FrameAvailable(ev) => self.frame_available.notify(ev),
            SlamEvent::LoopClosureDetected(ev) => self.loop_closure_detected.notify(ev),
            SlamEvent::SparseMapMerged(ev) => self.sparse_map_merged.notify(ev),
        }
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;

    #[test]
    fn test_publish_routes_by_kind() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut hub = EventHub::new();

        let l = Arc::clone(&log);
        hub.add_loop_closure_handler("loop", move |_| l.lock().push("loop".to_string()));
        let l = Arc::clone(&log);
        hub.add_map_merge_handler("merge", move |ev| {
            l.lock().push(format!("merge {}->{}", ev.deleted, ev.surviving))
        });

        hub.publish(&SlamEvent::SparseMapMerged(SparseMapMerged {
            deleted: 1,
            surviving: 0,
        }));
        hub.publish(&LoopClosureDetected.into());

        assert_eq!(*log.lock(), vec!["merge 1->0".to_string(), "loop".to_string()]);
    }

    #[test]
    fn test_same_name_replaces_subscriber() {
        let count = Arc::new(Mutex::new(0));
        let mut hub = EventHub::new();

        let c = Arc::clone(&count);
        assert!(!hub.add_loop_closure_handler("update", move |_| *c.lock() += 1));
        let c = Arc::clone(&count);
        assert!(hub.add_loop_closure_handler("update", move |_| *c.lock() += 10));

        hub.publish(&LoopClosureDetected.into());
        assert_eq!(*count.lock(), 10);
        assert_eq!(hub.loop_closure_detected.len(), 1);
    }

    #[test]
    fn test_subscribers_run_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut hub = EventHub::new();
        for name in ["a", "b", "c"] {
            let o = Arc::clone(&order);
            hub.add_loop_closure_handler(name, move |_| o.lock().push(name));
        }

        hub.publish(&LoopClosureDetected.into());
        assert_eq!(*order.lock(), vec!["a", "b", "c"]);
        assert_eq!(hub.loop_closure_detected.names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_remove_subscriber() {
        let mut hub = EventHub::new();
        hub.add_map_merge_handler("merge", |_| {});

        assert!(hub.sparse_map_merged.remove("merge"));
        assert!(!hub.sparse_map_merged.remove("merge"));
        assert!(hub.sparse_map_merged.is_empty());
    }
}
