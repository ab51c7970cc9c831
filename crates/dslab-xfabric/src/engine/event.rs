//! Simulation events.

use std::cmp::Ordering;

use downcast_rs::{impl_downcast, Downcast};
use serde::ser::Serialize;

use super::Id;

/// Event identifier, assigned sequentially by the engine.
pub type EventId = u64;

/// Payload of an event. Implemented for every serializable `'static` type.
pub trait EventData: Downcast + erased_serde::Serialize {}

impl_downcast!(EventData);

erased_serde::serialize_trait_object!(EventData);

impl<T: Serialize + 'static> EventData for T {}

/// Event scheduled for delivery to a component at some simulation time.
pub struct Event {
    /// Unique event id.
    pub id: EventId,
    /// Delivery time.
    pub time: f64,
    /// Component which produced the event.
    pub src: Id,
    /// Component the event is delivered to.
    pub dst: Id,
    /// Event payload.
    pub data: Box<dyn EventData>,
}

impl Eq for Event {}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

// Reversed so that `BinaryHeap` pops the earliest event; equal times are delivered in emission order.
impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        other.time.total_cmp(&self.time).then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
