use std::cmp::Ordering;
use std::collections::VecDeque;

use log::trace;
use rustc_hash::FxHashMap;

use super::{Admission, EnqueueOutcome, FlowDescriptor, LinkKey, Packet, QueueDiscipline, QueueStats};
use crate::flow::FlowId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Participant {
    Flow(FlowId),
    UnknownPool,
}

/// Queued packets of one participant. Only the head packet carries tags.
struct Backlog {
    packets: VecDeque<(u64, Packet)>,
    start: f64,
    finish: f64,
}

impl Backlog {
    fn head(&self) -> &(u64, Packet) {
        &self.packets[0]
    }

    fn retag(&mut self, weight: f64) {
        if let Some((_, packet)) = self.packets.front() {
            self.finish = self.start + packet.size as f64 / weight;
        }
    }
}

/// Selection key of a backlog head, smaller is served first.
#[derive(Clone, Copy)]
struct HeadKey {
    priority: u64,
    finish: f64,
    order: u64,
}

impl HeadKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then(self.finish.total_cmp(&other.finish))
            .then(self.order.cmp(&other.order))
    }
}

/// Self-clocked fair queueing over the registered flow weights.
///
/// Every participant (a flow, or the pool of all unknown flows) keeps its packets in arrival order and
/// only its head packet is tagged: `S = max(V, F_prev)`, `F = S + size / w`, where `F_prev` is the tag
/// of the previously served packet of the participant and `V` is the tag of the last dequeued packet.
/// The head with the smallest finish tag is served next, ties are broken by arrival. A weight update
/// retags the head of a backlogged flow, so the new weight takes effect at the next dequeue. Since
/// tags never start before `V`, an idle flow does not accumulate credit.
///
/// With `by_priority` participants are first ordered by the smallest priority among their queued
/// packets, and serve their oldest packet.
pub(crate) struct FairScheduler {
    descriptors: FxHashMap<FlowId, FlowDescriptor>,
    backlogs: FxHashMap<Participant, Backlog>,
    virtual_time: f64,
    next_order: u64,
    aggregate_unknown: bool,
    by_priority: bool,
}

impl FairScheduler {
    pub fn new(aggregate_unknown: bool, by_priority: bool) -> Self {
        Self {
            descriptors: FxHashMap::default(),
            backlogs: FxHashMap::default(),
            virtual_time: 0.,
            next_order: 0,
            aggregate_unknown,
            by_priority,
        }
    }

    pub fn set_descriptor(&mut self, flow_id: FlowId, weight: f64, known: bool) {
        assert!(weight > 0., "Flow weight must be positive, got {}", weight);
        self.descriptors.insert(flow_id, FlowDescriptor { weight, known });
        if let Some(backlog) = self.backlogs.get_mut(&Participant::Flow(flow_id)) {
            backlog.retag(weight);
        }
    }

    /// Forgets the weight of a flow, its queued packets are served with weight 1.
    pub fn remove_descriptor(&mut self, flow_id: FlowId) {
        self.descriptors.remove(&flow_id);
        if let Some(backlog) = self.backlogs.get_mut(&Participant::Flow(flow_id)) {
            backlog.retag(1.);
        }
    }

    pub fn descriptor(&self, flow_id: FlowId) -> Option<FlowDescriptor> {
        self.descriptors.get(&flow_id).copied()
    }

    pub fn has_descriptors(&self) -> bool {
        !self.descriptors.is_empty()
    }

    pub fn virtual_time(&self) -> f64 {
        self.virtual_time
    }

    fn participant(&self, packet: &Packet) -> Participant {
        if self.aggregate_unknown && !packet.known {
            Participant::UnknownPool
        } else {
            Participant::Flow(packet.flow_id)
        }
    }

    fn weight(&self, participant: Participant) -> f64 {
        match participant {
            Participant::Flow(flow_id) => self.descriptors.get(&flow_id).map_or(1., |d| d.weight),
            Participant::UnknownPool => 1.,
        }
    }

    pub fn push(&mut self, packet: Packet) {
        let participant = self.participant(&packet);
        let order = self.next_order;
        self.next_order += 1;
        if let Some(backlog) = self.backlogs.get_mut(&participant) {
            backlog.packets.push_back((order, packet));
            return;
        }
        let weight = self.weight(participant);
        let start = self.virtual_time;
        let finish = start + packet.size as f64 / weight;
        trace!(
            target: "queue",
            "flow {} seq {} weight {} finish tag {}",
            packet.flow_id,
            packet.seq,
            weight,
            finish
        );
        self.backlogs.insert(
            participant,
            Backlog {
                packets: VecDeque::from([(order, packet)]),
                start,
                finish,
            },
        );
    }

    fn head_key(&self, backlog: &Backlog) -> HeadKey {
        let (order, _) = *backlog.head();
        let priority = if self.by_priority {
            backlog.packets.iter().map(|(_, p)| p.priority).min().unwrap_or(0)
        } else {
            0
        };
        HeadKey {
            priority,
            finish: backlog.finish,
            order,
        }
    }

    pub fn pop(&mut self) -> Option<Packet> {
        let participant = self
            .backlogs
            .iter()
            .map(|(&participant, backlog)| (participant, self.head_key(backlog)))
            .min_by(|a, b| a.1.cmp(&b.1))
            .map(|(participant, _)| participant)?;
        let weight = self.weight(participant);
        let backlog = self.backlogs.get_mut(&participant)?;
        let (_, packet) = backlog.packets.pop_front()?;
        self.virtual_time = self.virtual_time.max(backlog.finish);
        if backlog.packets.is_empty() {
            self.backlogs.remove(&participant);
        } else {
            backlog.start = self.virtual_time.max(backlog.finish);
            backlog.retag(weight);
        }
        Some(packet)
    }
}

/// Weighted fair queue.
pub struct WeightedFairQueue {
    link: LinkKey,
    admission: Admission,
    scheduler: FairScheduler,
}

impl WeightedFairQueue {
    pub fn new(link: LinkKey, admission: Admission, aggregate_unknown: bool) -> Self {
        Self {
            link,
            admission,
            scheduler: FairScheduler::new(aggregate_unknown, false),
        }
    }

    /// Returns the finish tag of the last dequeued packet.
    pub fn virtual_time(&self) -> f64 {
        self.scheduler.virtual_time()
    }
}

impl QueueDiscipline for WeightedFairQueue {
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

    fn queue(aggregate_unknown: bool) -> (LinkKey, WeightedFairQueue) {
        let link = LinkKey::new(0, 0, 1);
        (link, WeightedFairQueue::new(link, Admission::new(10_000_000, None), aggregate_unknown))
    }

    fn served_bytes(queue: &mut WeightedFairQueue, packets: usize) -> FxHashMap<FlowId, u64> {
        let mut served = FxHashMap::default();
        for _ in 0..packets {
            let packet = queue.dequeue().unwrap();
            *served.entry(packet.flow_id).or_insert(0) += packet.size;
        }
        served
    }

    #[test]
    fn backlogged_flows_share_service_by_weight() {
        let (link, mut queue) = queue(false);
        queue.set_flow_descriptor(&link, 1, 1., true);
        queue.set_flow_descriptor(&link, 2, 3., true);
        for i in 0..400 {
            queue.enqueue(test_packet(1, i * 1000, 1000));
            queue.enqueue(test_packet(2, i * 1000, 1000));
        }
        let served = served_bytes(&mut queue, 400);
        assert_eq!(served[&1], 100 * 1000);
        assert_eq!(served[&2], 300 * 1000);
    }

    #[test]
    fn equal_tags_are_served_in_arrival_order() {
        let (_, mut queue) = queue(false);
        queue.enqueue(test_packet(2, 0, 1000));
        queue.enqueue(test_packet(1, 0, 1000));
        assert_eq!(queue.dequeue().unwrap().flow_id, 2);
        assert_eq!(queue.dequeue().unwrap().flow_id, 1);
    }

    #[test]
    fn idle_flow_does_not_accumulate_credit() {
        let (link, mut queue) = queue(false);
        queue.set_flow_descriptor(&link, 1, 1., true);
        queue.set_flow_descriptor(&link, 2, 1., true);
        for i in 0..100 {
            queue.enqueue(test_packet(1, i * 1000, 1000));
        }
        for _ in 0..50 {
            queue.dequeue();
        }
        // flow 2 wakes up after a long idle period
        for i in 0..100 {
            queue.enqueue(test_packet(2, i * 1000, 1000));
        }
        let served = served_bytes(&mut queue, 20);
        assert!(served[&1] >= 9000 && served[&2] <= 11000);
        assert!(queue.virtual_time() > 50_000.);
    }

    #[test]
    fn weight_updates_apply_to_new_packets() {
        let (link, mut queue) = queue(false);
        queue.set_flow_descriptor(&link, 1, 1., true);
        queue.set_flow_descriptor(&link, 2, 1., true);
        queue.set_flow_descriptor(&link, 2, 4., true);
        for i in 0..100 {
            queue.enqueue(test_packet(1, i * 1000, 1000));
            queue.enqueue(test_packet(2, i * 1000, 1000));
        }
        let served = served_bytes(&mut queue, 50);
        assert_eq!(served[&2], 40 * 1000);
    }

    #[test]
    fn weight_change_reaches_backlogged_packets() {
        let (link, mut queue) = queue(false);
        queue.set_flow_descriptor(&link, 1, 1., true);
        queue.set_flow_descriptor(&link, 2, 1., true);
        for i in 0..100 {
            queue.enqueue(test_packet(1, i * 1000, 1000));
            queue.enqueue(test_packet(2, i * 1000, 1000));
        }
        queue.set_flow_descriptor(&link, 2, 4., true);
        let served = served_bytes(&mut queue, 50);
        assert_eq!(served[&2], 40 * 1000);

        // back to equal shares for the rest of the backlog
        queue.set_flow_descriptor(&link, 2, 1., true);
        let served = served_bytes(&mut queue, 20);
        assert_eq!(served[&1], 10 * 1000);
        assert_eq!(served[&2], 10 * 1000);
    }

    #[test]
    fn removed_descriptor_falls_back_to_unit_weight() {
        let (link, mut queue) = queue(false);
        queue.set_flow_descriptor(&link, 1, 1., true);
        queue.set_flow_descriptor(&link, 2, 4., true);
        for i in 0..40 {
            queue.enqueue(test_packet(1, i * 1000, 1000));
            queue.enqueue(test_packet(2, i * 1000, 1000));
        }
        queue.remove_flow_descriptor(&link, 2);
        assert_eq!(queue.flow_descriptor(2), None);
        let served = served_bytes(&mut queue, 20);
        assert_eq!(served[&1], 10 * 1000);
        assert_eq!(served[&2], 10 * 1000);
    }

    #[test]
    fn unknown_flows_can_be_aggregated() {
        let (link, mut queue) = queue(true);
        queue.set_flow_descriptor(&link, 1, 1., true);
        for i in 0..100 {
            queue.enqueue(test_packet(1, i * 1000, 1000));
            for unknown in [10, 11, 12] {
                let mut packet = test_packet(unknown, i * 1000, 1000);
                packet.known = false;
                queue.enqueue(packet);
            }
        }
        let served = served_bytes(&mut queue, 100);
        let unknown: u64 = [10, 11, 12].iter().map(|id| served.get(id).copied().unwrap_or(0)).sum();
        assert_eq!(served[&1], 50 * 1000);
        assert_eq!(unknown, 50 * 1000);
    }
}
