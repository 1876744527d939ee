//! Buffered change notifications for one in-flight update.
//!
//! Nothing is published while the update is still running; the queue is
//! flushed to the bus only after the store commit succeeds, deeper
//! subtrees first.

use lattice_eventbus::Topic;

use crate::node::ConfigPayload;

#[derive(Default)]
pub struct EventQueue {
    events: Vec<(Topic, ConfigPayload)>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, topic: Topic, payload: ConfigPayload) {
        self.events.push((topic, payload));
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_events(self) -> Vec<(Topic, ConfigPayload)> {
        self.events
    }
}
