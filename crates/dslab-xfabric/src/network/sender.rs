use std::cell::RefCell;
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::allocator::SendPath;
use crate::cast;
use crate::engine::{Event, EventHandler, EventId, Id, SimulationContext};
use crate::events::{PacketDropped, PacketSent, SendSegment};
use crate::flow::{FlowId, FlowRecord, NodeId, TransportMode};
use crate::queue::Packet;
use crate::{log_debug, log_trace, log_warn};

use super::sink::PacketSink;

#[derive(Clone, Copy, Debug)]
struct Segment {
    seq: u64,
    size: u64,
    fin: bool,
}

/// Per-flow counters of a sending application.
#[derive(Clone, Debug, Serialize)]
pub struct SenderStats {
    pub flow_id: FlowId,
    pub source: NodeId,
    pub address: Ipv4Addr,
    /// Current pacing rate, bits per second.
    pub rate: f64,
    pub packets_sent: u64,
    pub retransmissions: u64,
}

struct SendingApp {
    size: u64,
    known: bool,
    transport: TransportMode,
    next_seq: u64,
    retransmit: VecDeque<Segment>,
    timer: Option<EventId>,
    last_sent_at: f64,
    last_size: u64,
    stats: SenderStats,
}

impl SendingApp {
    fn has_data(&self) -> bool {
        !self.retransmit.is_empty() || self.next_seq < self.size
    }

    fn next_segment(&mut self, pkt_size: u64) -> Option<(Segment, bool)> {
        if let Some(segment) = self.retransmit.pop_front() {
            return Some((segment, true));
        }
        if self.next_seq >= self.size {
            return None;
        }
        let size = pkt_size.min(self.size - self.next_seq);
        let segment = Segment {
            seq: self.next_seq,
            size,
            fin: self.next_seq + size == self.size,
        };
        self.next_seq += size;
        Some((segment, false))
    }
}

/// Sending applications of all flows.
///
/// Each flow emits segments of `pkt_size` bytes paced at its current rate. Segments lost at the
/// bottleneck are sent again by reliable flows. Unreliable flows only resend the final segment, so
/// that the receiver still learns about the end of the flow.
pub struct SenderPool {
    apps: FxHashMap<FlowId, SendingApp>,
    pkt_size: u64,
    access_delay: f64,
    link_id: Id,
    sink: Rc<RefCell<PacketSink>>,
    ctx: SimulationContext,
}

impl SenderPool {
    pub fn new(
        pkt_size: u64,
        access_delay: f64,
        link_id: Id,
        sink: Rc<RefCell<PacketSink>>,
        ctx: SimulationContext,
    ) -> Self {
        assert!(pkt_size > 0, "Packet size must be positive");
        Self {
            apps: FxHashMap::default(),
            pkt_size,
            access_delay,
            link_id,
            sink,
            ctx,
        }
    }

    pub fn current_rate(&self, flow_id: FlowId) -> Option<f64> {
        self.apps.get(&flow_id).map(|app| app.stats.rate)
    }

    pub fn stats(&self) -> Vec<SenderStats> {
        let mut stats: Vec<SenderStats> = self.apps.values().map(|app| app.stats.clone()).collect();
        stats.sort_by_key(|s| s.flow_id);
        stats
    }

    fn send_segment(&mut self, flow_id: FlowId) {
        let now = self.ctx.time();
        let Some(app) = self.apps.get_mut(&flow_id) else {
            log_warn!(self.ctx, "send timer of unknown flow {}", flow_id);
            return;
        };
        app.timer = None;
        let Some((segment, retransmission)) = app.next_segment(self.pkt_size) else {
            return;
        };
        let packet = Packet {
            flow_id,
            seq: segment.seq,
            size: segment.size,
            known: app.known,
            priority: app.size - segment.seq,
            ecn_ce: false,
            fin: segment.fin,
            sent_at: now,
        };
        app.stats.packets_sent += 1;
        if retransmission {
            app.stats.retransmissions += 1;
        }
        app.last_sent_at = now;
        app.last_size = segment.size;
        let gap = segment.size as f64 * 8. / app.stats.rate;
        let more = app.has_data();
        log_trace!(
            self.ctx,
            "flow {} sends seq {} size {}{}",
            flow_id,
            segment.seq,
            segment.size,
            if retransmission { " (retransmission)" } else { "" }
        );
        self.ctx.emit(PacketSent { packet }, self.link_id, self.access_delay);
        if more {
            let timer = self.ctx.emit_self(SendSegment { flow_id }, gap);
            if let Some(app) = self.apps.get_mut(&flow_id) {
                app.timer = Some(timer);
            }
        }
    }

    fn on_packet_dropped(&mut self, flow_id: FlowId, seq: u64, size: u64, fin: bool) {
        let Some(app) = self.apps.get_mut(&flow_id) else {
            log_warn!(self.ctx, "drop notification for unknown flow {}", flow_id);
            return;
        };
        if app.transport == TransportMode::Unreliable && !fin {
            return;
        }
        app.retransmit.push_back(Segment { seq, size, fin });
        if app.timer.is_none() {
            let timer = self.ctx.emit_self_now(SendSegment { flow_id });
            if let Some(app) = self.apps.get_mut(&flow_id) {
                app.timer = Some(timer);
            }
        }
    }
}

impl SendPath for SenderPool {
    fn install(&mut self, flow: &FlowRecord, address: Ipv4Addr, initial_rate: f64) {
        assert!(initial_rate > 0., "Sending rate must be positive");
        if self.apps.contains_key(&flow.flow_id) {
            log_warn!(self.ctx, "flow {} is already installed", flow.flow_id);
            return;
        }
        self.sink.borrow_mut().expect_flow(flow, self.ctx.time());
        let timer = self.ctx.emit_self_now(SendSegment { flow_id: flow.flow_id });
        self.apps.insert(
            flow.flow_id,
            SendingApp {
                size: flow.size,
                known: flow.known,
                transport: flow.transport,
                next_seq: 0,
                retransmit: VecDeque::new(),
                timer: Some(timer),
                last_sent_at: self.ctx.time(),
                last_size: 0,
                stats: SenderStats {
                    flow_id: flow.flow_id,
                    source: flow.source,
                    address,
                    rate: initial_rate,
                    packets_sent: 0,
                    retransmissions: 0,
                },
            },
        );
        log_debug!(
            self.ctx,
            "installed flow {} from {} to {} at rate {}",
            flow.flow_id,
            flow.source,
            address,
            initial_rate
        );
    }

    fn change_rate(&mut self, flow_id: FlowId, rate: f64) {
        assert!(rate > 0., "Sending rate must be positive");
        let now = self.ctx.time();
        let Some(app) = self.apps.get_mut(&flow_id) else {
            log_warn!(self.ctx, "rate change for unknown flow {}", flow_id);
            return;
        };
        app.stats.rate = rate;
        // the pending send is moved to match the new rate
        if let Some(timer) = app.timer.take() {
            let next_at = app.last_sent_at + app.last_size as f64 * 8. / rate;
            self.ctx.cancel_event(timer);
            let timer = self.ctx.emit_self(SendSegment { flow_id }, (next_at - now).max(0.));
            if let Some(app) = self.apps.get_mut(&flow_id) {
                app.timer = Some(timer);
            }
        }
    }
}

impl EventHandler for SenderPool {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            SendSegment { flow_id } => {
                self.send_segment(flow_id);
            }
            PacketDropped { flow_id, seq, size, fin } => {
                self.on_packet_dropped(flow_id, seq, size, fin);
            }
        })
    }
}
