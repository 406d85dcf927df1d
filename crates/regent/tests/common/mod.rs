// Shared fixtures for the integration tests.
//
// Lifecycle calls are recorded in a per-test `Journal` rather than in
// global counters, so tests can run in parallel.

#![allow(dead_code)]

use regent::{Capabilities, Finaliser, Managed, Notified, Object, ObjectStack};
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

/// A type with no references and no optional operations.
pub struct Leaf;

impl Managed for Leaf {}

/// A singly linked node.
pub struct Node {
    pub value: u64,
    pub next: Option<NonNull<Object>>,
}

impl Node {
    pub fn new(value: u64) -> Self {
        Node { value, next: None }
    }

    pub fn linked(value: u64, next: NonNull<Object>) -> Self {
        Node {
            value,
            next: Some(next),
        }
    }
}

impl Managed for Node {
    fn trace(&self, stack: &mut ObjectStack) {
        if let Some(next) = self.next {
            stack.push(next);
        }
    }
}

/// A lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Finalised {
        id: usize,
        region: NonNull<Object>,
    },
    Notified(usize),
    Dropped(usize),
}

// SAFETY: events only carry pointers as identities.
unsafe impl Send for Event {}

/// Ordered record of lifecycle events.
#[derive(Debug, Default, Clone)]
pub struct Journal(Arc<Mutex<Vec<Event>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn finalised(&self) -> usize {
        self.count(|e| matches!(e, Event::Finalised { .. }))
    }

    pub fn notified(&self) -> usize {
        self.count(|e| matches!(e, Event::Notified(_)))
    }

    pub fn dropped(&self) -> usize {
        self.count(|e| matches!(e, Event::Dropped(_)))
    }

    fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.0.lock().unwrap().iter().filter(|e| pred(e)).count()
    }
}

/// Binds every optional operation and records each call.
pub struct Watched {
    pub id: usize,
    pub journal: Journal,
}

impl Watched {
    pub fn new(id: usize, journal: &Journal) -> Self {
        Watched {
            id,
            journal: journal.clone(),
        }
    }
}

impl Managed for Watched {
    const CAPABILITIES: Capabilities<Self> = Capabilities::NONE.finaliser().notified();
}

impl Finaliser for Watched {
    fn finaliser(&mut self, region: NonNull<Object>, _sub_regions: &mut ObjectStack) {
        self.journal.record(Event::Finalised {
            id: self.id,
            region,
        });
    }
}

impl Notified for Watched {
    fn notified(&mut self, _this: NonNull<Object>) {
        self.journal.record(Event::Notified(self.id));
    }
}

impl Drop for Watched {
    fn drop(&mut self) {
        self.journal.record(Event::Dropped(self.id));
    }
}

/// Only has drop glue; binds nothing.
pub struct DropOnly {
    pub id: usize,
    pub journal: Journal,
}

impl Managed for DropOnly {}

impl Drop for DropOnly {
    fn drop(&mut self) {
        self.journal.record(Event::Dropped(self.id));
    }
}

/// Owns a nested region, reported to teardown through its finaliser.
pub struct Nest {
    pub child: Option<NonNull<Object>>,
}

impl Managed for Nest {
    const CAPABILITIES: Capabilities<Self> = Capabilities::NONE.finaliser();

    fn trace(&self, stack: &mut ObjectStack) {
        if let Some(child) = self.child {
            stack.push(child);
        }
    }
}

impl Finaliser for Nest {
    fn finaliser(&mut self, _region: NonNull<Object>, sub_regions: &mut ObjectStack) {
        if let Some(child) = self.child.take() {
            sub_regions.push(child);
        }
    }
}
