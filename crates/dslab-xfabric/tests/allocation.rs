use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;

use approx::assert_relative_eq;
use rustc_hash::FxHashMap;
use sugars::{boxed, rc, refcell};

use dslab_xfabric::allocator::{AllocatorConfig, FlowController, RateAllocator, SendPath};
use dslab_xfabric::engine::{Id, Simulation, SimulationContext};
use dslab_xfabric::events::{FlowArrival, FlowCompleted};
use dslab_xfabric::flow::{FlowId, FlowRecord};
use dslab_xfabric::network::Topology;
use dslab_xfabric::weights::{FixedWeights, SequenceWeights, WeightAssigner};

const GBPS: f64 = 1e9;
const CUTOFF: f64 = 1e6;

#[derive(Default)]
struct SendLog {
    installed: Vec<(FlowId, f64, f64)>,
    rates: FxHashMap<FlowId, f64>,
}

struct LoggingPath {
    log: Rc<RefCell<SendLog>>,
    ctx: SimulationContext,
}

impl SendPath for LoggingPath {
    fn install(&mut self, flow: &FlowRecord, _address: Ipv4Addr, initial_rate: f64) {
        self.log
            .borrow_mut()
            .installed
            .push((flow.flow_id, self.ctx.time(), initial_rate));
    }

    fn change_rate(&mut self, flow_id: FlowId, rate: f64) {
        self.log.borrow_mut().rates.insert(flow_id, rate);
    }
}

struct Tester {
    sim: Simulation,
    controller: Rc<RefCell<FlowController>>,
    controller_id: Id,
    client: SimulationContext,
    log: Rc<RefCell<SendLog>>,
}

impl Tester {
    fn new(config: AllocatorConfig, weights: Box<dyn WeightAssigner>) -> Self {
        let mut sim = Simulation::new();
        let log = rc!(refcell!(SendLog::default()));
        let path = rc!(refcell!(LoggingPath {
            log: log.clone(),
            ctx: sim.create_context("senders"),
        }));
        let allocator = RateAllocator::new(config, weights, Topology::dumbbell(2, 2), path);
        let controller = rc!(refcell!(FlowController::new(allocator, sim.create_context("controller"))));
        let controller_id = sim.add_handler("controller", controller.clone());
        let client = sim.create_context("client");
        Self {
            sim,
            controller,
            controller_id,
            client,
            log,
        }
    }

    fn start(&mut self, flow_id: FlowId, size: u64, time: f64) {
        let flow = FlowRecord::classified(flow_id, 2, 4, size, time, CUTOFF, true);
        let delay = time - self.client.time();
        self.client.emit(FlowArrival { flow }, self.controller_id, delay);
    }

    fn stop(&mut self, flow_id: FlowId, time: f64) {
        let delay = time - self.client.time();
        self.client.emit(
            FlowCompleted {
                flow_id,
                bytes_received: 0,
            },
            self.controller_id,
            delay,
        );
    }

    fn rate(&self, flow_id: FlowId) -> Option<f64> {
        self.controller.borrow().allocator().rate(flow_id)
    }

    fn weight(&self, flow_id: FlowId) -> Option<f64> {
        self.controller.borrow().allocator().weight(flow_id)
    }
}

fn config(unknown_load: f64, normalized: bool) -> AllocatorConfig {
    let mut config = AllocatorConfig::new(10. * GBPS);
    config.unknown_load = unknown_load;
    config.weight_normalized = normalized;
    config
}

#[test]
fn two_known_flows_get_weighted_shares() {
    let weights = FixedWeights::new(1.).with_weight(1, 3.).with_weight(2, 7.);
    let mut tester = Tester::new(config(0., false), boxed!(weights));
    tester.start(1, 5_000_000, 0.);
    tester.start(2, 5_000_000, 0.);
    tester.sim.step_until_no_events();

    assert_relative_eq!(tester.rate(1).unwrap(), 3. * GBPS, max_relative = 1e-12);
    assert_relative_eq!(tester.rate(2).unwrap(), 7. * GBPS, max_relative = 1e-12);
    let log = tester.log.borrow();
    assert_relative_eq!(log.rates[&1], 3. * GBPS, max_relative = 1e-12);
    assert_relative_eq!(log.rates[&2], 7. * GBPS, max_relative = 1e-12);
}

#[test]
fn unknown_load_is_reserved() {
    let weights = FixedWeights::new(1.).with_weight(1, 3.).with_weight(2, 7.);
    let mut tester = Tester::new(config(0.2, false), boxed!(weights));
    tester.start(1, 5_000_000, 0.);
    tester.start(2, 5_000_000, 0.);
    tester.sim.step_until_no_events();

    assert_relative_eq!(tester.rate(1).unwrap(), 2.4 * GBPS, max_relative = 1e-12);
    assert_relative_eq!(tester.rate(2).unwrap(), 5.6 * GBPS, max_relative = 1e-12);
}

#[test]
fn normalized_weights_of_three_flows() {
    let mut tester = Tester::new(config(0., true), boxed!(SequenceWeights::new([2., 4., 6.])));
    for id in 1..=3 {
        tester.start(id, 2_000_000, 0.5);
    }
    tester.sim.step_until_no_events();

    assert_eq!(tester.controller.borrow().allocator().total_weight(), 6.);
    for (id, weight) in [(1, 1.), (2, 2.), (3, 3.)] {
        assert_eq!(tester.weight(id), Some(weight));
        assert_relative_eq!(tester.rate(id).unwrap(), weight / 6. * 10. * GBPS, max_relative = 1e-12);
    }
}

#[test]
#[should_panic(expected = "flow 5 is not active")]
fn stop_without_start_aborts_the_run() {
    let mut tester = Tester::new(config(0., false), boxed!(FixedWeights::new(1.)));
    tester.stop(5, 1.);
    tester.sim.step_until_no_events();
}

#[test]
#[should_panic(expected = "flow 1 is already active")]
fn repeated_start_aborts_the_run() {
    let mut tester = Tester::new(config(0., false), boxed!(FixedWeights::new(1.)));
    tester.start(1, 5_000_000, 1.);
    tester.start(1, 5_000_000, 2.);
    tester.sim.step_until_no_events();
}

#[test]
fn flow_id_is_reused_after_completion() {
    let mut tester = Tester::new(config(0., false), boxed!(FixedWeights::new(1.)));
    tester.start(1, 5_000_000, 0.25);
    tester.start(3, 10_000, 0.25);
    tester.stop(1, 0.5);
    tester.stop(3, 0.5);
    tester.start(1, 5_000_000, 1.);
    tester.start(3, 10_000, 1.);
    tester.sim.step_until_no_events();

    assert_relative_eq!(tester.rate(1).unwrap(), 10. * GBPS, max_relative = 1e-12);
    assert_eq!(tester.weight(3), Some(1.));
    let installed: Vec<(FlowId, f64)> = tester.log.borrow().installed.iter().map(|i| (i.0, i.1)).collect();
    assert_eq!(installed, vec![(1, 0.25), (3, 0.25), (1, 1.), (3, 1.)]);

    let controller = tester.controller.borrow();
    let completed = controller.allocator().tracker().completed();
    assert_eq!(completed.len(), 2);
    assert!(completed.iter().all(|c| c.start_time == 0.25 && c.stop_time == 0.5));
}

#[test]
fn unknown_flow_is_installed_without_touching_known_flows() {
    let weights = FixedWeights::new(1.).with_weight(1, 3.).with_weight(2, 7.);
    let mut tester = Tester::new(config(0.1, false), boxed!(weights));
    tester.start(1, 5_000_000, 0.);
    tester.start(2, 5_000_000, 0.);
    tester.start(3, 1_000_000, 1.);
    tester.sim.step_until_time(0.5);
    let rates_before = tester.log.borrow().rates.clone();

    tester.sim.step_until_no_events();
    assert_eq!(tester.weight(3), Some(1.));
    assert_eq!(tester.log.borrow().rates, rates_before);
    assert_eq!(tester.log.borrow().installed.last(), Some(&(3, 1., 10. * GBPS)));
    assert_relative_eq!(tester.rate(1).unwrap(), 2.7 * GBPS, max_relative = 1e-12);
    assert!(!tester.controller.borrow().allocator().tracker().is_active(3));
}

#[test]
fn survivors_absorb_freed_capacity() {
    let weights = FixedWeights::new(1.).with_weight(1, 1.).with_weight(2, 4.);
    let mut tester = Tester::new(config(0., false), boxed!(weights));
    tester.start(1, 5_000_000, 0.);
    tester.start(2, 5_000_000, 0.1);
    tester.start(3, 10_000, 0.2);
    tester.stop(3, 0.3);
    tester.stop(1, 0.4);
    tester.sim.step_until_time(0.35);
    assert_relative_eq!(tester.rate(2).unwrap(), 8. * GBPS, max_relative = 1e-12);

    tester.sim.step_until_no_events();
    assert_eq!(tester.rate(1), None);
    assert_relative_eq!(tester.rate(2).unwrap(), 10. * GBPS, max_relative = 1e-12);
    assert_relative_eq!(tester.log.borrow().rates[&2], 10. * GBPS, max_relative = 1e-12);

    let controller = tester.controller.borrow();
    let completed = controller.allocator().tracker().completed();
    let stopped: Vec<(FlowId, f64)> = completed.iter().map(|c| (c.flow_id, c.stop_time)).collect();
    assert_eq!(stopped, vec![(3, 0.3), (1, 0.4)]);
}
