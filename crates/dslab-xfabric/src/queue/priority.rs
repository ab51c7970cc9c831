use super::wfq::FairScheduler;
use super::{Admission, EnqueueOutcome, FlowDescriptor, LinkKey, Packet, QueueDiscipline, QueueStats};
use crate::flow::FlowId;

/// pFabric-style queue: the packet with the smallest priority value is served first.
///
/// Senders stamp the remaining flow size as priority, so nearly finished flows go first. A flow is
/// ranked by the smallest priority among its queued packets and sends its oldest packet. Flows with
/// equal priority are ordered by their weighted finish tags.
pub struct PriorityQueue {
    link: LinkKey,
    admission: Admission,
    scheduler: FairScheduler,
}

impl PriorityQueue {
    pub fn new(link: LinkKey, admission: Admission) -> Self {
        Self {
            link,
            admission,
            scheduler: FairScheduler::new(false, true),
        }
    }
}

impl QueueDiscipline for PriorityQueue {
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
            self.scheduler.push(packet);
        }
        outcome
    }

    fn dequeue(&mut self) -> Option<Packet> {
        let packet = self.scheduler.pop()?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::test_packet;

    #[test]
    fn smallest_remaining_size_first_then_finish_tag() {
        let link = LinkKey::new(0, 0, 1);
        let mut queue = PriorityQueue::new(link, Admission::new(100_000, None));
        queue.set_flow_descriptor(&link, 3, 2., true);
        let mut packets = vec![
            (1, 50_000),
            (2, 3_000),
            (3, 3_000),
            (3, 3_000),
            (4, 10_000),
        ];
        for (seq, (flow_id, priority)) in packets.drain(..).enumerate() {
            let mut packet = test_packet(flow_id, seq as u64 * 1000, 1000);
            packet.priority = priority;
            queue.enqueue(packet);
        }
        // flow 3 has weight 2: tags 500 and 1000, flow 2 has tag 1000 and arrived earlier
        let order: Vec<FlowId> = std::iter::from_fn(|| queue.dequeue()).map(|p| p.flow_id).collect();
        assert_eq!(order, vec![3, 2, 3, 4, 1]);
    }
}
