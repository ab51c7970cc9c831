//! Events exchanged by fabric components.

use serde::Serialize;

use crate::flow::{FlowId, FlowRecord};
use crate::queue::Packet;

// Flow events

#[derive(Clone, Serialize)]
/// Scheduled start of a flow. Source: arrival generator, destination: flow controller.
pub struct FlowArrival {
    pub flow: FlowRecord,
}

#[derive(Clone, Serialize)]
/// All bytes of a flow have been received. Source: packet sink, destination: flow controller.
pub struct FlowCompleted {
    pub flow_id: FlowId,
    pub bytes_received: u64,
}

// Packet events

#[derive(Clone, Serialize)]
/// Time to emit the next segment of a flow. Source and destination: sender pool.
pub struct SendSegment {
    pub flow_id: FlowId,
}

#[derive(Clone, Serialize)]
/// Packet reached the bottleneck queue. Source: sender pool, destination: bottleneck link.
pub struct PacketSent {
    pub packet: Packet,
}

#[derive(Clone, Serialize)]
/// Packet left the bottleneck queue and was serialized onto the wire. Source and destination:
/// bottleneck link.
pub struct TransmissionCompleted {
    pub packet: Packet,
}

#[derive(Clone, Serialize)]
/// Packet reached the receiver. Source: bottleneck link, destination: packet sink.
pub struct PacketDelivered {
    pub packet: Packet,
}

#[derive(Clone, Serialize)]
/// Packet was rejected by the bottleneck queue. Source: bottleneck link, destination: sender pool.
pub struct PacketDropped {
    pub flow_id: FlowId,
    pub seq: u64,
    pub size: u64,
    pub fin: bool,
}

// Monitoring events

#[derive(Clone, Serialize)]
/// Periodic sampling tick. Source and destination: queue probe.
pub struct ProbeTick {}
