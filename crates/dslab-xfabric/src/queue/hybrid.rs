use std::collections::VecDeque;

use super::wfq::FairScheduler;
use super::{Admission, EnqueueOutcome, FlowDescriptor, LinkKey, Packet, QueueDiscipline, QueueStats};
use crate::flow::FlowId;

/// Drop-tail FIFO until the first flow descriptor is registered for the link, weighted fair queueing
/// while any descriptor is present.
///
/// Packets admitted in FIFO mode are served before packets admitted in weighted mode.
pub struct HybridQueue {
    link: LinkKey,
    admission: Admission,
    fifo: VecDeque<Packet>,
    scheduler: FairScheduler,
}

impl HybridQueue {
    pub fn new(link: LinkKey, admission: Admission, aggregate_unknown: bool) -> Self {
        Self {
            link,
            admission,
            fifo: VecDeque::new(),
            scheduler: FairScheduler::new(aggregate_unknown, false),
        }
    }

    /// Returns true if new packets are scheduled by weight.
    pub fn is_weighted(&self) -> bool {
        self.scheduler.has_descriptors()
    }
}

impl QueueDiscipline for HybridQueue {
    fn link(&self) -> &LinkKey {
        &self.link
    }

    fn set_flow_descriptor(&mut self, link: &LinkKey, flow_id: FlowId, weight: f64, known: bool) {
        if *link == self.link {
            self.scheduler.set_descriptor(flow_id, weight, known);
        }
    }

    fn remove_flow_descriptor(&mut self, link: &LinkKey, flow_id: FlowId) {
        if *link == self.link {
            self.scheduler.remove_descriptor(flow_id);
        }
    }

    fn flow_descriptor(&self, flow_id: FlowId) -> Option<FlowDescriptor> {
        self.scheduler.descriptor(flow_id)
    }

    fn enqueue(&mut self, mut packet: Packet) -> EnqueueOutcome {
        let outcome = self.admission.admit(&mut packet);
        if outcome != EnqueueOutcome::Dropped {
            if self.is_weighted() {
                self.scheduler.push(packet);
            } else {
                self.fifo.push_back(packet);
            }
        }
        outcome
    }

    fn dequeue(&mut self) -> Option<Packet> {
        let packet = match self.fifo.pop_front() {
            Some(packet) => packet,
            None => self.scheduler.pop()?,
        };
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
