//! Simulation setup and execution.

use std::cell::RefCell;
use std::rc::Rc;

use log::Level::Trace;
use log::{debug, log_enabled, trace};
use rustc_hash::FxHashMap;
use serde_json::json;
use serde_type_name::type_name;

use super::context::SimulationContext;
use super::handler::EventHandler;
use super::log::{get_colored, log_undelivered_event, Color};
use super::state::SimulationState;
use super::Id;

/// Owns the event queue and the registered components, and delivers events in time order.
pub struct Simulation {
    sim_state: Rc<RefCell<SimulationState>>,
    name_to_id: FxHashMap<String, Id>,
    names: Vec<String>,
    handlers: Vec<Option<Rc<RefCell<dyn EventHandler>>>>,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulation {
    pub fn new() -> Self {
        Self {
            sim_state: Rc::new(RefCell::new(SimulationState::new())),
            name_to_id: FxHashMap::default(),
            names: Vec::new(),
            handlers: Vec::new(),
        }
    }

    fn register(&mut self, name: &str) -> Id {
        if let Some(&id) = self.name_to_id.get(name) {
            return id;
        }
        let id = self.names.len() as Id;
        self.name_to_id.insert(name.to_owned(), id);
        self.names.push(name.to_owned());
        self.handlers.push(None);
        id
    }

    /// Creates a context for the component with the specified name.
    ///
    /// Ids are assigned sequentially starting from 0, repeated names reuse the existing id.
    pub fn create_context<S: AsRef<str>>(&mut self, name: S) -> SimulationContext {
        let id = self.register(name.as_ref());
        debug!(
            target: "simulation",
            "[{:.6} {} simulation] Created context: {}",
            self.time(),
            get_colored("DEBUG", Color::Blue),
            json!({"name": name.as_ref(), "id": id})
        );
        SimulationContext::new(id, name.as_ref(), self.sim_state.clone())
    }

    /// Registers the event handler of the named component and returns the component id.
    pub fn add_handler<S: AsRef<str>>(&mut self, name: S, handler: Rc<RefCell<dyn EventHandler>>) -> Id {
        let id = self.register(name.as_ref());
        self.handlers[id as usize] = Some(handler);
        debug!(
            target: "simulation",
            "[{:.6} {} simulation] Added handler: {}",
            self.time(),
            get_colored("DEBUG", Color::Blue),
            json!({"name": name.as_ref(), "id": id})
        );
        id
    }

    /// Returns the name of the component with the specified id.
    pub fn lookup_name(&self, id: Id) -> &str {
        &self.names[id as usize]
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> f64 {
        self.sim_state.borrow().time()
    }

    /// Returns the total number of events created so far.
    pub fn event_count(&self) -> u64 {
        self.sim_state.borrow().event_count()
    }

    /// Delivers the next pending event, advancing the clock to its time.
    ///
    /// Returns `false` if there are no pending events.
    pub fn step(&mut self) -> bool {
        let next = self.sim_state.borrow_mut().next_event();
        let Some(event) = next else {
            return false;
        };
        match self.handlers.get(event.dst as usize) {
            Some(Some(handler)) => {
                if log_enabled!(Trace) {
                    let dst_name = self.lookup_name(event.dst);
                    trace!(
                        target: dst_name,
                        "[{:.6} {} {}] {}",
                        event.time,
                        get_colored("EVENT", Color::BrightBlack),
                        dst_name,
                        json!({"type": type_name(&event.data).ok(), "data": event.data, "src": self.lookup_name(event.src)})
                    );
                }
                handler.borrow_mut().on(event);
            }
            _ => log_undelivered_event(event),
        }
        true
    }

    /// Delivers events until the queue is empty.
    pub fn step_until_no_events(&mut self) {
        while self.step() {}
    }

    /// Delivers all events with time not greater than `time`.
    ///
    /// Returns `true` if there are still pending events after this time.
    pub fn step_until_time(&mut self, time: f64) -> bool {
        loop {
            let next_time = self.sim_state.borrow_mut().peek_time();
            match next_time {
                Some(t) if t <= time => {
                    self.step();
                }
                Some(_) => return true,
                None => return false,
            }
        }
    }
}
