use std::cell::RefCell;
use std::rc::Rc;

use crate::cast;
use crate::engine::{Event, EventHandler, Id, SimulationContext};
use crate::events::{PacketDelivered, PacketDropped, PacketSent, TransmissionCompleted};
use crate::log_trace;
use crate::queue::{EnqueueOutcome, Packet, QueueDiscipline};

/// Bottleneck link with a queue in front of it.
///
/// Packets are serialized one at a time at `bandwidth` bits per second and reach the sink after the
/// propagation delay. Senders are notified of packets dropped by the queue.
pub struct BottleneckLink {
    queue: Rc<RefCell<dyn QueueDiscipline>>,
    bandwidth: f64,
    delay: f64,
    busy: bool,
    transmitted_bytes: u64,
    sender_id: Id,
    sink_id: Id,
    ctx: SimulationContext,
}

impl BottleneckLink {
    pub fn new(
        queue: Rc<RefCell<dyn QueueDiscipline>>,
        bandwidth: f64,
        delay: f64,
        sender_id: Id,
        sink_id: Id,
        ctx: SimulationContext,
    ) -> Self {
        assert!(bandwidth > 0., "Link bandwidth must be positive");
        Self {
            queue,
            bandwidth,
            delay,
            busy: false,
            transmitted_bytes: 0,
            sender_id,
            sink_id,
            ctx,
        }
    }

    pub fn queue(&self) -> Rc<RefCell<dyn QueueDiscipline>> {
        self.queue.clone()
    }

    pub fn transmitted_bytes(&self) -> u64 {
        self.transmitted_bytes
    }

    fn on_packet_arrival(&mut self, packet: Packet) {
        let (flow_id, seq, size, fin) = (packet.flow_id, packet.seq, packet.size, packet.fin);
        let outcome = self.queue.borrow_mut().enqueue(packet);
        if outcome == EnqueueOutcome::Dropped {
            log_trace!(self.ctx, "dropped flow {} seq {}", flow_id, seq);
            self.ctx
                .emit(PacketDropped { flow_id, seq, size, fin }, self.sender_id, self.delay);
        }
        if !self.busy {
            self.transmit_next();
        }
    }

    fn transmit_next(&mut self) {
        let next = self.queue.borrow_mut().dequeue();
        match next {
            Some(packet) => {
                self.busy = true;
                let duration = packet.size as f64 * 8. / self.bandwidth;
                self.ctx.emit_self(TransmissionCompleted { packet }, duration);
            }
            None => self.busy = false,
        }
    }

    fn on_transmission_completed(&mut self, packet: Packet) {
        self.transmitted_bytes += packet.size;
        self.ctx.emit(PacketDelivered { packet }, self.sink_id, self.delay);
        self.transmit_next();
    }
}

impl EventHandler for BottleneckLink {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            PacketSent { packet } => {
                self.on_packet_arrival(packet);
            }
            TransmissionCompleted { packet } => {
                self.on_transmission_completed(packet);
            }
        })
    }
}
