//! Accessing the simulation from components.

use std::cell::RefCell;
use std::rc::Rc;

use super::event::{EventData, EventId};
use super::state::SimulationState;
use super::Id;

/// A facade for reading the simulation clock and producing events from a component.
pub struct SimulationContext {
    id: Id,
    name: String,
    sim_state: Rc<RefCell<SimulationState>>,
}

impl SimulationContext {
    pub(crate) fn new(id: Id, name: &str, sim_state: Rc<RefCell<SimulationState>>) -> Self {
        Self {
            id,
            name: name.to_owned(),
            sim_state,
        }
    }

    /// Returns the identifier of the component owning this context.
    pub fn id(&self) -> Id {
        self.id
    }

    /// Returns the name of the component owning this context.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> f64 {
        self.sim_state.borrow().time()
    }

    /// Emits an event for `dst` delivered after `delay`.
    pub fn emit<T: EventData>(&mut self, data: T, dst: Id, delay: f64) -> EventId {
        self.sim_state.borrow_mut().add_event(data, self.id, dst, delay)
    }

    /// Emits an event for `dst` delivered at the current time.
    pub fn emit_now<T: EventData>(&mut self, data: T, dst: Id) -> EventId {
        self.emit(data, dst, 0.)
    }

    /// Emits an event for the owning component delivered after `delay`.
    pub fn emit_self<T: EventData>(&mut self, data: T, delay: f64) -> EventId {
        self.emit(data, self.id, delay)
    }

    /// Emits an event for the owning component delivered at the current time.
    pub fn emit_self_now<T: EventData>(&mut self, data: T) -> EventId {
        self.emit(data, self.id, 0.)
    }

    /// Cancels a pending event. Canceling an already delivered event has no effect.
    pub fn cancel_event(&mut self, id: EventId) {
        self.sim_state.borrow_mut().cancel_event(id);
    }
}
