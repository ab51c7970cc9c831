//! Queueing disciplines of the bottleneck link.
//!
//! All variants share byte-bounded admission with optional ECN marking and differ only in the order
//! packets are dequeued. Weights are written by the rate allocator through
//! [`QueueDiscipline::set_flow_descriptor`] and only read on dequeue.

mod fifo;
mod hybrid;
mod priority;
mod wfq;

use std::cell::RefCell;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::flow::{FlowId, NodeId};

pub use fifo::FifoQueue;
pub use hybrid::HybridQueue;
pub use priority::PriorityQueue;
pub use wfq::WeightedFairQueue;

/// Directed link served by a queue: the node owning the queue and the ordered endpoint pair.
///
/// Both directions of a physical link are distinct keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct LinkKey {
    pub owner: NodeId,
    pub from: NodeId,
    pub to: NodeId,
}

impl LinkKey {
    pub fn new(owner: NodeId, from: NodeId, to: NodeId) -> Self {
        Self { owner, from, to }
    }

    /// Key of the queue at the other endpoint of the same link.
    ///
    /// The endpoint pair stays as is, only the owner changes.
    pub fn reverse(&self) -> Self {
        let owner = if self.owner == self.from { self.to } else { self.from };
        Self {
            owner,
            from: self.from,
            to: self.to,
        }
    }
}

impl Display for LinkKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}_{}", self.owner, self.from, self.to)
    }
}

/// Data segment of a flow.
#[derive(Clone, Debug, Serialize)]
pub struct Packet {
    pub flow_id: FlowId,
    /// Offset of the first payload byte within the flow.
    pub seq: u64,
    /// Size in bytes.
    pub size: u64,
    pub known: bool,
    /// Scheduling priority, lower is served first. Senders put the remaining flow bytes here.
    pub priority: u64,
    /// Congestion experienced mark.
    pub ecn_ce: bool,
    /// Last segment of the flow.
    pub fin: bool,
    pub sent_at: f64,
}

/// Result of offering a packet to a queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum EnqueueOutcome {
    Enqueued,
    /// Enqueued with the congestion experienced mark set.
    Marked,
    /// Rejected because the queue is full.
    Dropped,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub enqueued_packets: u64,
    pub enqueued_bytes: u64,
    pub dequeued_packets: u64,
    pub dequeued_bytes: u64,
    pub dropped_packets: u64,
    pub dropped_bytes: u64,
    pub marked_packets: u64,
}

/// Registered weight of a flow on a queue.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FlowDescriptor {
    pub weight: f64,
    pub known: bool,
}

/// Common interface of queueing disciplines.
pub trait QueueDiscipline {
    /// Returns the link served by this queue.
    fn link(&self) -> &LinkKey;

    /// Registers or overwrites the weight of a flow. Descriptors for other links are ignored.
    fn set_flow_descriptor(&mut self, link: &LinkKey, flow_id: FlowId, weight: f64, known: bool);

    /// Forgets the weight of a flow. Its queued packets are scheduled with the default weight.
    fn remove_flow_descriptor(&mut self, link: &LinkKey, flow_id: FlowId);

    fn flow_descriptor(&self, flow_id: FlowId) -> Option<FlowDescriptor>;

    fn enqueue(&mut self, packet: Packet) -> EnqueueOutcome;

    fn dequeue(&mut self) -> Option<Packet>;

    /// Returns the number of queued bytes.
    fn len_bytes(&self) -> u64;

    /// Returns the number of queued packets.
    fn len_packets(&self) -> usize;

    fn stats(&self) -> &QueueStats;
}

/// Queueing discipline variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    Fifo,
    Wfq,
    Priority,
    Hybrid,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueueConfig {
    pub kind: QueueKind,
    /// Capacity in bytes.
    pub max_bytes: u64,
    /// Occupancy above which admitted packets are marked, no marking if `None`.
    pub ecn_threshold_bytes: Option<u64>,
    /// Schedule all unknown flows as a single participant with weight 1.
    pub aggregate_unknown: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            kind: QueueKind::Wfq,
            max_bytes: 150_000,
            ecn_threshold_bytes: None,
            aggregate_unknown: false,
        }
    }
}

/// Creates a queue of the configured variant serving `link`.
pub fn make_queue(link: LinkKey, config: &QueueConfig) -> Rc<RefCell<dyn QueueDiscipline>> {
    let admission = Admission::new(config.max_bytes, config.ecn_threshold_bytes);
    match config.kind {
        QueueKind::Fifo => Rc::new(RefCell::new(FifoQueue::new(link, admission))),
        QueueKind::Wfq => Rc::new(RefCell::new(WeightedFairQueue::new(
            link,
            admission,
            config.aggregate_unknown,
        ))),
        QueueKind::Priority => Rc::new(RefCell::new(PriorityQueue::new(link, admission))),
        QueueKind::Hybrid => Rc::new(RefCell::new(HybridQueue::new(
            link,
            admission,
            config.aggregate_unknown,
        ))),
    }
}

/// Byte-bounded admission control shared by all variants.
#[derive(Clone, Debug)]
pub struct Admission {
    max_bytes: u64,
    ecn_threshold_bytes: Option<u64>,
    bytes: u64,
    packets: usize,
    stats: QueueStats,
}

impl Admission {
    pub fn new(max_bytes: u64, ecn_threshold_bytes: Option<u64>) -> Self {
        Self {
            max_bytes,
            ecn_threshold_bytes,
            bytes: 0,
            packets: 0,
            stats: QueueStats::default(),
        }
    }

    /// Decides whether the packet fits and marks it if the queue is congested.
    pub fn admit(&mut self, packet: &mut Packet) -> EnqueueOutcome {
        if self.bytes + packet.size > self.max_bytes {
            self.stats.dropped_packets += 1;
            self.stats.dropped_bytes += packet.size;
            return EnqueueOutcome::Dropped;
        }
        let marked = matches!(self.ecn_threshold_bytes, Some(threshold) if self.bytes > threshold);
        self.bytes += packet.size;
        self.packets += 1;
        self.stats.enqueued_packets += 1;
        self.stats.enqueued_bytes += packet.size;
        if marked {
            packet.ecn_ce = true;
            self.stats.marked_packets += 1;
            EnqueueOutcome::Marked
        } else {
            EnqueueOutcome::Enqueued
        }
    }

    /// Accounts for a packet leaving the queue.
    pub fn release(&mut self, packet: &Packet) {
        self.bytes -= packet.size;
        self.packets -= 1;
        self.stats.dequeued_packets += 1;
        self.stats.dequeued_bytes += packet.size;
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn packets(&self) -> usize {
        self.packets
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }
}

#[cfg(test)]
pub(crate) fn test_packet(flow_id: FlowId, seq: u64, size: u64) -> Packet {
    Packet {
        flow_id,
        seq,
        size,
        known: true,
        priority: 0,
        ecn_ce: false,
        fin: false,
        sent_at: 0.,
    }
}
