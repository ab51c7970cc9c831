use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use super::{Admission, EnqueueOutcome, FlowDescriptor, LinkKey, Packet, QueueDiscipline, QueueStats};
use crate::flow::FlowId;

/// Drop-tail queue served in arrival order.
///
/// Flow descriptors are stored but do not affect scheduling.
pub struct FifoQueue {
    link: LinkKey,
    admission: Admission,
    descriptors: FxHashMap<FlowId, FlowDescriptor>,
    packets: VecDeque<Packet>,
}

impl FifoQueue {
    pub fn new(link: LinkKey, admission: Admission) -> Self {
        Self {
            link,
            admission,
            descriptors: FxHashMap::default(),
            packets: VecDeque::new(),
        }
    }
}

impl QueueDiscipline for FifoQueue {
    fn link(&self) -> &LinkKey {
        &self.link
    }

    fn set_flow_descriptor(&mut self, link: &LinkKey, flow_id: FlowId, weight: f64, known: bool) {
        if *link == self.link {
            self.descriptors.insert(flow_id, FlowDescriptor { weight, known });
        }
    }

    fn remove_flow_descriptor(&mut self, link: &LinkKey, flow_id: FlowId) {
        if *link == self.link {
            self.descriptors.remove(&flow_id);
        }
    }

    fn flow_descriptor(&self, flow_id: FlowId) -> Option<FlowDescriptor> {
        self.descriptors.get(&flow_id).copied()
    }

    fn enqueue(&mut self, mut packet: Packet) -> EnqueueOutcome {
        let outcome = self.admission.admit(&mut packet);
        if outcome != EnqueueOutcome::Dropped {
            self.packets.push_back(packet);
        }
        outcome
    }

    fn dequeue(&mut self) -> Option<Packet> {
        let packet = self.packets.pop_front()?;
        self.admission.release(&packet);
        Some(packet)
    }

    fn len_bytes(&self) -> u64 {
        self.admission.bytes()
    }

    fn len_packets(&self) -> usize {
        self.admission.packets()
    }

    fn stats(&self) -> &QueueStats {
        self.admission.stats()
    }
}
