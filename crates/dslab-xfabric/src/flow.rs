//! Flow records.

use serde::Serialize;

/// Globally unique flow id, assigned monotonically starting from 1.
pub type FlowId = u64;

/// Opaque network node id.
pub type NodeId = u32;

/// Transport used by the sending application of a flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TransportMode {
    /// Lost segments are retransmitted.
    Reliable,
    /// Lost segments are not recovered, except for the final one.
    Unreliable,
}

impl TransportMode {
    /// Transport chosen for a new flow.
    ///
    /// Known flows run unreliable transport when the `flows_tcp` policy is off, everything else is reliable.
    pub fn for_flow(known: bool, flows_tcp: bool) -> Self {
        if known && !flows_tcp {
            TransportMode::Unreliable
        } else {
            TransportMode::Reliable
        }
    }
}

/// Returns true if a flow of `size` bytes is known, i.e. eligible for explicit rate control.
///
/// Sizes equal to the cutoff are unknown.
pub fn is_known(size: u64, cutoff: f64) -> bool {
    size as f64 > cutoff
}

/// Identity and scheduling state of a single flow.
#[derive(Clone, Debug, Serialize)]
pub struct FlowRecord {
    pub flow_id: FlowId,
    pub source: NodeId,
    pub dest: NodeId,
    /// Flow size in bytes.
    pub size: u64,
    /// Time the flow is scheduled to start.
    pub start_time: f64,
    pub known: bool,
    pub transport: TransportMode,
    weight: f64,
    running: bool,
}

impl FlowRecord {
    /// Creates a record with weight 1 that is not running yet.
    pub fn new(
        flow_id: FlowId,
        source: NodeId,
        dest: NodeId,
        size: u64,
        start_time: f64,
        known: bool,
        transport: TransportMode,
    ) -> Self {
        Self {
            flow_id,
            source,
            dest,
            size,
            start_time,
            known,
            transport,
            weight: 1.,
            running: false,
        }
    }

    /// Creates a record classified against `cutoff` with transport chosen by the `flows_tcp` policy.
    pub fn classified(
        flow_id: FlowId,
        source: NodeId,
        dest: NodeId,
        size: u64,
        start_time: f64,
        cutoff: f64,
        flows_tcp: bool,
    ) -> Self {
        let known = is_known(size, cutoff);
        Self::new(
            flow_id,
            source,
            dest,
            size,
            start_time,
            known,
            TransportMode::for_flow(known, flows_tcp),
        )
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: f64) {
        assert!(weight > 0., "Flow weight must be positive, got {}", weight);
        self.weight = weight;
    }

    /// Returns true once the send path of the flow has been installed.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Marks the send path as installed. There is no way back.
    pub fn mark_running(&mut self) {
        self.running = true;
    }
}
