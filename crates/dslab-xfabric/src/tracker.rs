//! Bookkeeping of active flows.

use indexmap::IndexMap;
use log::debug;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::error::FabricError;
use crate::flow::{FlowId, FlowRecord};

/// Flow lifecycle event registered with the tracker.
#[derive(Clone, Debug)]
pub enum FlowEvent {
    Start(FlowRecord),
    Stop { flow_id: FlowId, time: f64 },
}

/// Known/unknown classification remembered for every flow ever seen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum FlowClass {
    Known,
    Unknown,
}

impl FlowClass {
    pub fn of(known: bool) -> Self {
        if known {
            FlowClass::Known
        } else {
            FlowClass::Unknown
        }
    }
}

/// Departure of a flow.
#[derive(Clone, Debug, Serialize)]
pub struct CompletedFlow {
    pub flow_id: FlowId,
    pub class: FlowClass,
    pub start_time: f64,
    pub stop_time: f64,
}

/// Owns the canonical records of active known flows.
///
/// Iteration order of the active set is the order of admission, removals keep the relative order
/// of the remaining flows.
#[derive(Default)]
pub struct FlowTracker {
    active: IndexMap<FlowId, FlowRecord>,
    classes: FxHashMap<FlowId, FlowClass>,
    start_times: FxHashMap<FlowId, f64>,
    completed: Vec<CompletedFlow>,
}

impl FlowTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a start or stop event. A start takes effect at the start time of its record.
    pub fn register_event(&mut self, event: FlowEvent) -> Result<(), FabricError> {
        match event {
            FlowEvent::Start(flow) => {
                if self.active.contains_key(&flow.flow_id) {
                    return Err(FabricError::DuplicateFlow { flow_id: flow.flow_id });
                }
                self.classify(flow.flow_id, FlowClass::of(flow.known), flow.start_time);
                self.active.insert(flow.flow_id, flow);
                Ok(())
            }
            FlowEvent::Stop { flow_id, time } => {
                let flow = self
                    .active
                    .shift_remove(&flow_id)
                    .ok_or(FabricError::UnknownFlow { flow_id })?;
                self.start_times.remove(&flow_id);
                self.completed.push(CompletedFlow {
                    flow_id,
                    class: FlowClass::of(flow.known),
                    start_time: flow.start_time,
                    stop_time: time,
                });
                Ok(())
            }
        }
    }

    /// Remembers the class of a flow, including flows which never enter the active set.
    pub fn classify(&mut self, flow_id: FlowId, class: FlowClass, start_time: f64) {
        self.classes.insert(flow_id, class);
        self.start_times.insert(flow_id, start_time);
    }

    /// Checks whether a flow has started and not departed yet, in either class.
    pub fn is_admitted(&self, flow_id: FlowId) -> bool {
        self.start_times.contains_key(&flow_id)
    }

    pub fn class_of(&self, flow_id: FlowId) -> Option<FlowClass> {
        self.classes.get(&flow_id).copied()
    }

    /// Records the departure of a flow that was classified but never tracked as active.
    pub fn record_departure(&mut self, flow_id: FlowId, time: f64) -> Result<(), FabricError> {
        let class = self.class_of(flow_id).ok_or(FabricError::UnknownFlow { flow_id })?;
        if self.active.contains_key(&flow_id) {
            return Err(FabricError::UnknownFlow { flow_id });
        }
        // departed flows have no start time left
        let start_time = self
            .start_times
            .remove(&flow_id)
            .ok_or(FabricError::UnknownFlow { flow_id })?;
        self.completed.push(CompletedFlow {
            flow_id,
            class,
            start_time,
            stop_time: time,
        });
        Ok(())
    }

    /// Returns a snapshot of active flow ids in admission order.
    pub fn active_flows(&self) -> Vec<FlowId> {
        self.active.keys().copied().collect()
    }

    pub fn flow(&self, flow_id: FlowId) -> Option<&FlowRecord> {
        self.active.get(&flow_id)
    }

    pub fn flow_mut(&mut self, flow_id: FlowId) -> Option<&mut FlowRecord> {
        self.active.get_mut(&flow_id)
    }

    pub fn is_active(&self, flow_id: FlowId) -> bool {
        self.active.contains_key(&flow_id)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn completed(&self) -> &[CompletedFlow] {
        &self.completed
    }

    /// Prints active flows at debug level.
    pub fn dump_state(&self) {
        debug!(target: "tracker", "{} active flows", self.active.len());
        for flow in self.active.values() {
            debug!(
                target: "tracker",
                "flow {} {} -> {} size {} start {:.6} weight {} running {}",
                flow.flow_id,
                flow.source,
                flow.dest,
                flow.size,
                flow.start_time,
                flow.weight(),
                flow.is_running()
            );
        }
    }
}
