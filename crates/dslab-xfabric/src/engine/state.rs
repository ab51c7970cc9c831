use std::collections::BinaryHeap;

use rustc_hash::FxHashSet;

use super::event::{Event, EventData, EventId};
use super::log::log_incorrect_event;
use super::Id;

/// Epsilon to compare floating point times for equality.
pub const EPSILON: f64 = 1e-12;

pub(crate) struct SimulationState {
    clock: f64,
    events: BinaryHeap<Event>,
    canceled_events: FxHashSet<EventId>,
    event_count: u64,
}

impl SimulationState {
    pub fn new() -> Self {
        Self {
            clock: 0.,
            events: BinaryHeap::new(),
            canceled_events: FxHashSet::default(),
            event_count: 0,
        }
    }

    pub fn time(&self) -> f64 {
        self.clock
    }

    pub fn add_event<T: EventData>(&mut self, data: T, src: Id, dst: Id, delay: f64) -> EventId {
        let event = Event {
            id: self.event_count,
            time: self.clock + delay.max(0.),
            src,
            dst,
            data: Box::new(data),
        };
        if delay < -EPSILON {
            log_incorrect_event(event, &format!("negative delay {}", delay));
            panic!("Event delay is negative! It is not allowed to add events from the past.");
        }
        let id = event.id;
        self.events.push(event);
        self.event_count += 1;
        id
    }

    pub fn cancel_event(&mut self, id: EventId) {
        self.canceled_events.insert(id);
    }

    pub fn next_event(&mut self) -> Option<Event> {
        while let Some(event) = self.events.pop() {
            if !self.canceled_events.remove(&event.id) {
                self.clock = event.time;
                return Some(event);
            }
        }
        None
    }

    pub fn peek_time(&mut self) -> Option<f64> {
        while let Some(event) = self.events.peek() {
            if self.canceled_events.contains(&event.id) {
                let id = event.id;
                self.events.pop();
                self.canceled_events.remove(&id);
            } else {
                return Some(event.time);
            }
        }
        None
    }

    pub fn event_count(&self) -> u64 {
        self.event_count
    }
}
