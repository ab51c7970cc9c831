//! Complete static traffic experiment: arrivals, rate control, and the packet-level fabric.

use std::cell::RefCell;
use std::rc::Rc;

use log::info;
use serde::Serialize;
use sugars::{boxed, rc, refcell};

use crate::allocator::{FlowController, RateAllocator};
use crate::arrivals::{ArrivalGenerator, ArrivalParams};
use crate::config::SimulationConfig;
use crate::engine::{Id, Simulation, SimulationContext};
use crate::error::FabricError;
use crate::events::FlowArrival;
use crate::flow::FlowRecord;
use crate::monitoring::QueueProbe;
use crate::network::{BottleneckLink, FlowCompletionRecord, PacketSink, SenderPool, SenderStats, Topology};
use crate::queue::{make_queue, LinkKey, QueueDiscipline, QueueStats};
use crate::weights::{UniformWeights, WeightAssigner};

/// Aggregated flow completion times of one flow class.
#[derive(Clone, Debug, Default, Serialize)]
pub struct FctSummary {
    pub flows: usize,
    pub mean: f64,
    pub max: f64,
}

impl FctSummary {
    fn of<'a, I: Iterator<Item = &'a FlowCompletionRecord>>(records: I) -> Self {
        let mut summary = Self::default();
        let mut total = 0.;
        for record in records {
            summary.flows += 1;
            total += record.fct;
            summary.max = summary.max.max(record.fct);
        }
        if summary.flows > 0 {
            summary.mean = total / summary.flows as f64;
        }
        summary
    }
}

/// Outcome of a finished experiment.
#[derive(Clone, Debug, Serialize)]
pub struct ExperimentReport {
    pub flows_generated: usize,
    pub flows_completed: usize,
    pub known: FctSummary,
    pub unknown: FctSummary,
    pub bottleneck: LinkKey,
    pub queue: QueueStats,
    pub peak_queue_bytes: u64,
    pub transmitted_bytes: u64,
    pub finish_time: f64,
    pub event_count: u64,
    pub completions: Vec<FlowCompletionRecord>,
    pub senders: Vec<SenderStats>,
}

impl ExperimentReport {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!(self)
    }
}

/// Dumbbell fabric with rate-controlled flows, built from [`SimulationConfig`].
pub struct FabricSimulation {
    config: SimulationConfig,
    topology: Topology,
    generator: ArrivalGenerator,
    controller: Rc<RefCell<FlowController>>,
    controller_id: Id,
    senders: Rc<RefCell<SenderPool>>,
    sink: Rc<RefCell<PacketSink>>,
    link: Rc<RefCell<BottleneckLink>>,
    queue: Rc<RefCell<dyn QueueDiscipline>>,
    probe: Rc<RefCell<QueueProbe>>,
    flows_generated: usize,
    sim: Simulation,
    ctx: SimulationContext,
}

impl FabricSimulation {
    /// Builds the fabric with weights drawn uniformly from the configured range.
    pub fn new(config: SimulationConfig) -> Result<Self, FabricError> {
        let (min, max) = config.weight_range;
        let weights = boxed!(UniformWeights::new(min, max, config.seed.wrapping_add(1)));
        Self::with_weights(config, weights)
    }

    /// Builds the fabric with the given weight assignment strategy.
    pub fn with_weights(config: SimulationConfig, weights: Box<dyn WeightAssigner>) -> Result<Self, FabricError> {
        let mut sim = Simulation::new();
        let topology = Topology::dumbbell(config.sources, config.sinks);
        let distribution = config.flow_size_distribution()?;
        let generator = ArrivalGenerator::new(
            topology.clone(),
            distribution,
            ArrivalParams {
                load: config.load,
                link_capacity: config.link_rate,
                horizon: config.sim_time,
                start_time: config.flow_start_time,
                cutoff: config.unknown_flow_size_cutoff,
                flows_tcp: config.flows_tcp,
                seed: config.seed,
                first_flow_id: 1,
            },
        )?;
        info!(
            target: "experiment",
            "{} sources, {} sinks, arrival rate {:.3} flows/s per pair",
            config.sources,
            config.sinks,
            generator.rate_per_pair()
        );

        let controller_ctx = sim.create_context("controller");
        let sink_ctx = sim.create_context("sink");
        let link_ctx = sim.create_context("bottleneck");
        let sender_ctx = sim.create_context("senders");
        let probe_ctx = sim.create_context("probe");
        let ctx = sim.create_context("experiment");

        // Receivers
        let sink = rc!(refcell!(PacketSink::new(controller_ctx.id(), sink_ctx)));
        let sink_id = sim.add_handler("sink", sink.clone());

        // Bottleneck
        let queue = make_queue(topology.bottleneck(), &config.queue);
        let link = rc!(refcell!(BottleneckLink::new(
            queue.clone(),
            config.link_rate,
            config.link_delay,
            sender_ctx.id(),
            sink_id,
            link_ctx,
        )));
        let link_id = sim.add_handler("bottleneck", link.clone());

        // Senders
        let senders = rc!(refcell!(SenderPool::new(
            config.pkt_size,
            config.link_delay,
            link_id,
            sink.clone(),
            sender_ctx,
        )));
        sim.add_handler("senders", senders.clone());

        // Rate control
        let mut allocator = RateAllocator::new(config.allocator_config(), weights, topology.clone(), senders.clone());
        allocator.add_queue(queue.clone());
        let controller = rc!(refcell!(FlowController::new(allocator, controller_ctx)));
        let controller_id = sim.add_handler("controller", controller.clone());

        // Monitoring
        let probe = rc!(refcell!(QueueProbe::new(config.sampling_interval, config.sim_time, probe_ctx)));
        probe.borrow_mut().add_queue(queue.clone());
        probe.borrow_mut().start(config.flow_start_time);
        sim.add_handler("probe", probe.clone());

        Ok(Self {
            config,
            topology,
            generator,
            controller,
            controller_id,
            senders,
            sink,
            link,
            queue,
            probe,
            flows_generated: 0,
            sim,
            ctx,
        })
    }

    /// Schedules the arrivals of all generated flows. Returns the number of flows.
    pub fn generate_flows(&mut self) -> usize {
        let count = self.generator.schedule(&mut self.ctx, self.controller_id);
        self.flows_generated += count;
        info!(target: "experiment", "scheduled {} flows", count);
        count
    }

    /// Schedules the start of a single flow at its start time.
    pub fn add_flow(&mut self, flow: FlowRecord) {
        let delay = (flow.start_time - self.ctx.time()).max(0.);
        self.ctx.emit(FlowArrival { flow }, self.controller_id, delay);
        self.flows_generated += 1;
    }

    pub fn step_until_time(&mut self, time: f64) -> bool {
        self.sim.step_until_time(time)
    }

    pub fn step_until_no_events(&mut self) {
        self.sim.step_until_no_events();
    }

    /// Generates the flows, runs the simulation until all of them complete and reports the results.
    pub fn run(&mut self) -> ExperimentReport {
        if self.flows_generated == 0 {
            self.generate_flows();
        }
        self.step_until_no_events();
        self.report()
    }

    pub fn report(&self) -> ExperimentReport {
        let sink = self.sink.borrow();
        let completions = sink.completions().to_vec();
        let queue = self.queue.borrow();
        let bottleneck = *queue.link();
        ExperimentReport {
            flows_generated: self.flows_generated,
            flows_completed: completions.len(),
            known: FctSummary::of(completions.iter().filter(|r| r.known)),
            unknown: FctSummary::of(completions.iter().filter(|r| !r.known)),
            bottleneck,
            queue: queue.stats().clone(),
            peak_queue_bytes: self.probe.borrow().peak_bytes(&bottleneck),
            transmitted_bytes: self.link.borrow().transmitted_bytes(),
            finish_time: self.sim.time(),
            event_count: self.sim.event_count(),
            completions,
            senders: self.senders.borrow().stats(),
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn generator(&self) -> &ArrivalGenerator {
        &self.generator
    }

    pub fn controller(&self) -> Rc<RefCell<FlowController>> {
        self.controller.clone()
    }

    pub fn senders(&self) -> Rc<RefCell<SenderPool>> {
        self.senders.clone()
    }

    pub fn sink(&self) -> Rc<RefCell<PacketSink>> {
        self.sink.clone()
    }

    pub fn queue(&self) -> Rc<RefCell<dyn QueueDiscipline>> {
        self.queue.clone()
    }

    pub fn probe(&self) -> Rc<RefCell<QueueProbe>> {
        self.probe.clone()
    }

    pub fn time(&self) -> f64 {
        self.sim.time()
    }
}
