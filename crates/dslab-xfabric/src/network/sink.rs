use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::cast;
use crate::engine::{Event, EventHandler, Id, SimulationContext};
use crate::events::{FlowCompleted, PacketDelivered};
use crate::flow::{FlowId, FlowRecord, TransportMode};
use crate::queue::Packet;
use crate::{log_debug, log_warn};

/// Completion of a flow as observed by the receiver.
#[derive(Clone, Debug, Serialize)]
pub struct FlowCompletionRecord {
    pub flow_id: FlowId,
    pub known: bool,
    pub size: u64,
    pub start_time: f64,
    pub finish_time: f64,
    /// Flow completion time.
    pub fct: f64,
    pub bytes_received: u64,
    pub marked_packets: u64,
}

struct ReceivingFlow {
    size: u64,
    known: bool,
    transport: TransportMode,
    start_time: f64,
    bytes_received: u64,
    marked_packets: u64,
    completed: bool,
}

/// Receiving endpoints of all flows.
///
/// Counts delivered bytes per flow and notifies the flow controller exactly once when a flow is
/// complete: all bytes arrived, or for unreliable transport the final segment arrived.
pub struct PacketSink {
    flows: FxHashMap<FlowId, ReceivingFlow>,
    completions: Vec<FlowCompletionRecord>,
    controller_id: Id,
    ctx: SimulationContext,
}

impl PacketSink {
    pub fn new(controller_id: Id, ctx: SimulationContext) -> Self {
        Self {
            flows: FxHashMap::default(),
            completions: Vec::new(),
            controller_id,
            ctx,
        }
    }

    /// Opens the receiving endpoint of a flow.
    pub fn expect_flow(&mut self, flow: &FlowRecord, start_time: f64) {
        self.flows.insert(
            flow.flow_id,
            ReceivingFlow {
                size: flow.size,
                known: flow.known,
                transport: flow.transport,
                start_time,
                bytes_received: 0,
                marked_packets: 0,
                completed: false,
            },
        );
    }

    pub fn completions(&self) -> &[FlowCompletionRecord] {
        &self.completions
    }

    pub fn bytes_received(&self, flow_id: FlowId) -> Option<u64> {
        self.flows.get(&flow_id).map(|flow| flow.bytes_received)
    }

    /// Returns the number of flows whose endpoint is open and not complete yet.
    pub fn pending_flows(&self) -> usize {
        self.flows.values().filter(|flow| !flow.completed).count()
    }

    fn on_packet_delivered(&mut self, packet: Packet) {
        let now = self.ctx.time();
        let Some(flow) = self.flows.get_mut(&packet.flow_id) else {
            log_warn!(self.ctx, "packet of unexpected flow {}", packet.flow_id);
            return;
        };
        flow.bytes_received += packet.size;
        if packet.ecn_ce {
            flow.marked_packets += 1;
        }
        let done = flow.bytes_received >= flow.size || (flow.transport == TransportMode::Unreliable && packet.fin);
        if flow.completed || !done {
            return;
        }
        flow.completed = true;
        let record = FlowCompletionRecord {
            flow_id: packet.flow_id,
            known: flow.known,
            size: flow.size,
            start_time: flow.start_time,
            finish_time: now,
            fct: now - flow.start_time,
            bytes_received: flow.bytes_received,
            marked_packets: flow.marked_packets,
        };
        log_debug!(
            self.ctx,
            "flow {} received {} of {} bytes, fct {:.6}",
            record.flow_id,
            record.bytes_received,
            record.size,
            record.fct
        );
        self.ctx.emit_now(
            FlowCompleted {
                flow_id: record.flow_id,
                bytes_received: record.bytes_received,
            },
            self.controller_id,
        );
        self.completions.push(record);
    }
}

impl EventHandler for PacketSink {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            PacketDelivered { packet } => {
                self.on_packet_delivered(packet);
            }
        })
    }
}
