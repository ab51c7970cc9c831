//! Weighted fair rate allocation among known flows.

use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::cast;
use crate::engine::{Event, EventHandler, SimulationContext};
use crate::error::FabricError;
use crate::events::{FlowArrival, FlowCompleted};
use crate::flow::{FlowId, FlowRecord};
use crate::network::Topology;
use crate::queue::QueueDiscipline;
use crate::tracker::{FlowClass, FlowEvent, FlowTracker};
use crate::weights::WeightAssigner;
use crate::{log_debug, log_error, log_info};

/// Sending side of the fabric as seen by the allocator.
pub trait SendPath {
    /// Opens the sending application of a flow towards `address`. Called exactly once per flow.
    fn install(&mut self, flow: &FlowRecord, address: Ipv4Addr, initial_rate: f64);

    /// Changes the pacing rate (bits per second) of an installed flow.
    fn change_rate(&mut self, flow_id: FlowId, rate: f64);
}

/// Where the computed allocation is enforced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Enforcement {
    /// Senders are paced at the ideal rate, queue weights are set as well.
    Pacing,
    /// Only queue weights enforce the split, ideal rates are advisory.
    Weighted,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AllocatorConfig {
    /// Bottleneck capacity in bits per second.
    pub link_capacity: f64,
    /// Fraction of capacity reserved for unknown flows.
    pub unknown_load: f64,
    /// Divide all weights by the smallest one.
    pub weight_normalized: bool,
    pub enforcement: Enforcement,
    /// Rate sending applications start with, bits per second.
    pub application_rate: f64,
}

impl AllocatorConfig {
    pub fn new(link_capacity: f64) -> Self {
        Self {
            link_capacity,
            unknown_load: 0.,
            weight_normalized: false,
            enforcement: Enforcement::Pacing,
            application_rate: link_capacity,
        }
    }
}

/// Effective weight and ideal rate of a flow.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RateEntry {
    pub weight: f64,
    pub ideal_rate: f64,
}

/// Result of one recomputation, in admission order.
#[derive(Clone, Debug, Default, Serialize)]
pub struct AllocationSummary {
    pub total_weight: f64,
    /// Rate of a flow with weight 1 if the whole capacity were shared.
    pub base_rate: f64,
    pub allocations: Vec<(FlowId, RateEntry)>,
    /// Flows whose send path was installed by this recomputation.
    pub installed: Vec<FlowId>,
}

/// Admits and removes flows and splits the bottleneck capacity among active known flows in proportion
/// to their weights.
///
/// Unknown flows are installed right away with weight 1 and never take part in the split, a fixed
/// fraction of capacity is reserved for them instead.
pub struct RateAllocator {
    config: AllocatorConfig,
    tracker: FlowTracker,
    weights: Box<dyn WeightAssigner>,
    rates: FxHashMap<FlowId, RateEntry>,
    total_weight: f64,
    topology: Topology,
    send_path: Rc<RefCell<dyn SendPath>>,
    queues: Vec<Rc<RefCell<dyn QueueDiscipline>>>,
}

impl RateAllocator {
    pub fn new(
        config: AllocatorConfig,
        weights: Box<dyn WeightAssigner>,
        topology: Topology,
        send_path: Rc<RefCell<dyn SendPath>>,
    ) -> Self {
        assert!(
            (0. ..1.).contains(&config.unknown_load),
            "Unknown load must be in [0, 1), got {}",
            config.unknown_load
        );
        Self {
            config,
            tracker: FlowTracker::new(),
            weights,
            rates: FxHashMap::default(),
            total_weight: 0.,
            topology,
            send_path,
            queues: Vec::new(),
        }
    }

    /// Adds a queue that receives the flow weights.
    pub fn add_queue(&mut self, queue: Rc<RefCell<dyn QueueDiscipline>>) {
        self.queues.push(queue);
    }

    /// Admits a starting flow.
    ///
    /// Returns the resulting allocation for known flows and `None` for unknown flows.
    pub fn on_flow_start(&mut self, flow: FlowRecord) -> Result<Option<AllocationSummary>, FabricError> {
        if self.tracker.is_admitted(flow.flow_id) {
            return Err(FabricError::DuplicateFlow { flow_id: flow.flow_id });
        }
        if !flow.known {
            self.tracker
                .classify(flow.flow_id, FlowClass::Unknown, flow.start_time);
            let address = self.topology.address(flow.dest);
            self.send_path
                .borrow_mut()
                .install(&flow, address, self.config.application_rate);
            self.rates.insert(
                flow.flow_id,
                RateEntry {
                    weight: 1.,
                    ideal_rate: self.config.application_rate,
                },
            );
            self.propagate_one(flow.flow_id, 1., false);
            return Ok(None);
        }
        self.tracker.register_event(FlowEvent::Start(flow))?;
        Ok(Some(self.recompute()))
    }

    /// Removes a departing flow and gives its share to the remaining flows.
    ///
    /// Returns the resulting allocation if the flow was known.
    pub fn on_flow_stop(&mut self, flow_id: FlowId, time: f64) -> Result<Option<AllocationSummary>, FabricError> {
        match self.tracker.class_of(flow_id) {
            None => Err(FabricError::UnknownFlow { flow_id }),
            Some(FlowClass::Unknown) => {
                self.tracker.record_departure(flow_id, time)?;
                self.forget(flow_id);
                Ok(None)
            }
            Some(FlowClass::Known) => {
                self.tracker.register_event(FlowEvent::Stop { flow_id, time })?;
                self.forget(flow_id);
                Ok(Some(self.recompute()))
            }
        }
    }

    /// Recomputes weights and ideal rates of all active known flows and pushes them to senders and
    /// queues.
    ///
    /// Flows that are already running keep their weights, so calling this twice in a row yields the
    /// same rate table.
    pub fn recompute(&mut self) -> AllocationSummary {
        let snapshot = self.tracker.active_flows();

        let mut raw_weights = Vec::with_capacity(snapshot.len());
        let mut min_weight = f64::MAX;
        for &flow_id in &snapshot {
            let Some(flow) = self.tracker.flow_mut(flow_id) else {
                continue;
            };
            if !flow.is_running() {
                let weight = self.weights.assign(flow);
                flow.set_weight(weight);
            }
            min_weight = min_weight.min(flow.weight());
            raw_weights.push((flow_id, flow.weight()));
        }

        let mut weights = Vec::with_capacity(raw_weights.len());
        let mut total_weight = 0.;
        for (flow_id, raw) in raw_weights {
            let weight = if self.config.weight_normalized {
                raw / min_weight
            } else {
                raw
            };
            total_weight += weight;
            weights.push((flow_id, weight));
        }
        self.total_weight = total_weight;

        let mut installed = Vec::new();
        for &(flow_id, _) in &weights {
            if let Some(flow) = self.tracker.flow_mut(flow_id) {
                if !flow.is_running() {
                    let address = self.topology.address(flow.dest);
                    self.send_path
                        .borrow_mut()
                        .install(flow, address, self.config.application_rate);
                    flow.mark_running();
                    installed.push(flow_id);
                }
            }
        }

        let share = (1. - self.config.unknown_load) * self.config.link_capacity;
        let mut allocations = Vec::with_capacity(weights.len());
        for &(flow_id, weight) in &weights {
            let entry = RateEntry {
                weight,
                ideal_rate: weight / total_weight * share,
            };
            if self.config.enforcement == Enforcement::Pacing {
                self.send_path.borrow_mut().change_rate(flow_id, entry.ideal_rate);
            }
            self.rates.insert(flow_id, entry);
            allocations.push((flow_id, entry));
        }

        for &(flow_id, weight) in &weights {
            self.propagate_one(flow_id, weight, true);
        }

        AllocationSummary {
            total_weight,
            base_rate: if total_weight > 0. {
                self.config.link_capacity / total_weight
            } else {
                0.
            },
            allocations,
            installed,
        }
    }

    fn propagate_one(&self, flow_id: FlowId, weight: f64, known: bool) {
        for queue in &self.queues {
            let mut queue = queue.borrow_mut();
            let link = *queue.link();
            queue.set_flow_descriptor(&link, flow_id, weight, known);
        }
    }

    fn forget(&mut self, flow_id: FlowId) {
        self.rates.remove(&flow_id);
        for queue in &self.queues {
            let mut queue = queue.borrow_mut();
            let link = *queue.link();
            queue.remove_flow_descriptor(&link, flow_id);
        }
    }

    pub fn rate(&self, flow_id: FlowId) -> Option<f64> {
        self.rates.get(&flow_id).map(|entry| entry.ideal_rate)
    }

    pub fn weight(&self, flow_id: FlowId) -> Option<f64> {
        self.rates.get(&flow_id).map(|entry| entry.weight)
    }

    pub fn rate_table(&self) -> &FxHashMap<FlowId, RateEntry> {
        &self.rates
    }

    /// Sum of effective weights of active known flows after the last recomputation.
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn tracker(&self) -> &FlowTracker {
        &self.tracker
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }
}

/// Event-driven front of [`RateAllocator`]: admits flows on arrival and removes them on completion.
///
/// Allocation errors mean that arrivals or completions are inconsistent, they abort the simulation.
pub struct FlowController {
    allocator: RateAllocator,
    ctx: SimulationContext,
}

impl FlowController {
    pub fn new(allocator: RateAllocator, ctx: SimulationContext) -> Self {
        Self { allocator, ctx }
    }

    pub fn allocator(&self) -> &RateAllocator {
        &self.allocator
    }

    fn on_flow_arrival(&mut self, flow: FlowRecord) {
        log_info!(
            self.ctx,
            "flow {} start: {} -> {} size {} known {} transport {:?}",
            flow.flow_id,
            flow.source,
            flow.dest,
            flow.size,
            flow.known,
            flow.transport
        );
        let flow_id = flow.flow_id;
        match self.allocator.on_flow_start(flow) {
            Ok(Some(summary)) => self.log_summary(&summary),
            Ok(None) => log_debug!(self.ctx, "unknown flow {} installed with weight 1", flow_id),
            Err(e) => self.abort(e),
        }
        self.allocator.tracker().dump_state();
    }

    fn on_flow_completed(&mut self, flow_id: FlowId, bytes_received: u64) {
        let class = self.allocator.tracker().class_of(flow_id);
        log_info!(
            self.ctx,
            "flow {} stop: {:?} flow departed after {} bytes",
            flow_id,
            class,
            bytes_received
        );
        match self.allocator.on_flow_stop(flow_id, self.ctx.time()) {
            Ok(Some(summary)) => self.log_summary(&summary),
            Ok(None) => {}
            Err(e) => self.abort(e),
        }
    }

    fn log_summary(&self, summary: &AllocationSummary) {
        log_info!(
            self.ctx,
            "base rate {:.3} total weight {} active flows {}",
            summary.base_rate,
            summary.total_weight,
            summary.allocations.len()
        );
        for flow_id in &summary.installed {
            log_debug!(self.ctx, "installed send path of flow {}", flow_id);
        }
        for (flow_id, entry) in &summary.allocations {
            log_debug!(
                self.ctx,
                "flow {} weight {} rate {:.3}",
                flow_id,
                entry.weight,
                entry.ideal_rate
            );
        }
    }

    fn abort(&self, error: FabricError) -> ! {
        log_error!(self.ctx, "inconsistent flow events: {}", error);
        panic!("Inconsistent flow events: {}", error);
    }
}

impl EventHandler for FlowController {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            FlowArrival { flow } => {
                self.on_flow_arrival(flow);
            }
            FlowCompleted { flow_id, bytes_received } => {
                self.on_flow_completed(flow_id, bytes_received);
            }
        })
    }
}
