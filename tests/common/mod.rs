// tests/common/mod.rs

//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use pipedag::{Event, Listener, Pipeline};

/// Listener that records every event it receives, in order.
pub struct RecordingListener {
    events: Mutex<Vec<Event>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: Event) -> usize {
        self.events.lock().unwrap().iter().filter(|e| **e == event).count()
    }

    /// Index of the first occurrence of `event`, if any.
    pub fn first_index(&self, event: Event) -> Option<usize> {
        self.events.lock().unwrap().iter().position(|e| *e == event)
    }

    /// Index of the last occurrence of `event`, if any.
    pub fn last_index(&self, event: Event) -> Option<usize> {
        let events = self.events.lock().unwrap();
        events.iter().rposition(|e| *e == event)
    }
}

impl Listener for RecordingListener {
    fn handle(&self, _pipeline: &Pipeline, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}
