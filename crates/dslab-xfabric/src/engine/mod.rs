//! Discrete-event engine.
//!
//! Components register an [`EventHandler`] and produce events through their [`SimulationContext`].
//! Events are delivered one at a time in non-decreasing time order; events with equal time are
//! delivered in the order they were emitted.

mod context;
mod event;
mod handler;
pub mod log;
mod simulation;
mod state;

/// Component identifier.
pub type Id = u32;

pub use context::SimulationContext;
pub use event::{Event, EventData, EventId};
pub use handler::EventHandler;
pub use simulation::Simulation;
pub use state::EPSILON;

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use serde::Serialize;

    use super::*;
    use crate::cast;

    #[derive(Serialize)]
    struct Ping {
        seq: u32,
    }

    struct Recorder {
        seen: Vec<(f64, u32)>,
        ctx: SimulationContext,
    }

    impl EventHandler for Recorder {
        fn on(&mut self, event: Event) {
            cast!(match event.data {
                Ping { seq } => {
                    self.seen.push((self.ctx.time(), seq));
                }
            })
        }
    }

    fn recorder(sim: &mut Simulation) -> (Rc<RefCell<Recorder>>, Id) {
        let ctx = sim.create_context("recorder");
        let rec = Rc::new(RefCell::new(Recorder { seen: Vec::new(), ctx }));
        let id = sim.add_handler("recorder", rec.clone());
        (rec, id)
    }

    #[test]
    fn events_are_delivered_in_time_order_fifo_on_ties() {
        let mut sim = Simulation::new();
        let (rec, id) = recorder(&mut sim);
        let mut client = sim.create_context("client");
        client.emit(Ping { seq: 1 }, id, 2.0);
        client.emit(Ping { seq: 2 }, id, 1.0);
        client.emit(Ping { seq: 3 }, id, 1.0);
        client.emit_now(Ping { seq: 4 }, id);
        sim.step_until_no_events();
        assert_eq!(rec.borrow().seen, vec![(0.0, 4), (1.0, 2), (1.0, 3), (2.0, 1)]);
        assert_eq!(sim.time(), 2.0);
    }

    #[test]
    fn canceled_events_are_skipped() {
        let mut sim = Simulation::new();
        let (rec, id) = recorder(&mut sim);
        let mut client = sim.create_context("client");
        let first = client.emit(Ping { seq: 1 }, id, 1.0);
        client.emit(Ping { seq: 2 }, id, 3.0);
        client.cancel_event(first);
        assert!(sim.step_until_time(2.0));
        assert!(rec.borrow().seen.is_empty());
        assert!(!sim.step_until_time(5.0));
        assert_eq!(rec.borrow().seen, vec![(3.0, 2)]);
    }

    #[test]
    fn context_ids_are_sequential_and_reused() {
        let mut sim = Simulation::new();
        let a = sim.create_context("a");
        let b = sim.create_context("b");
        let a2 = sim.create_context("a");
        assert_eq!((a.id(), b.id(), a2.id()), (0, 1, 0));
        assert_eq!(sim.lookup_name(0), "a");
        assert_eq!(sim.lookup_name(1), "b");
    }

    #[test]
    #[should_panic]
    fn negative_delay_is_rejected() {
        let mut sim = Simulation::new();
        let mut ctx = sim.create_context("comp");
        ctx.emit_self(Ping { seq: 0 }, -1.0);
    }
}
