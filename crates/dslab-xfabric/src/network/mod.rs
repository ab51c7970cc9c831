//! Packet-level model of the dumbbell fabric: sending applications, the bottleneck link and receivers.

mod link;
mod sender;
mod sink;
mod topology;

pub use link::BottleneckLink;
pub use sender::{SenderPool, SenderStats};
pub use sink::{FlowCompletionRecord, PacketSink};
pub use topology::{Topology, LEFT_SWITCH, RIGHT_SWITCH};

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use approx::assert_relative_eq;
    use sugars::{rc, refcell};

    use super::*;
    use crate::allocator::SendPath;
    use crate::cast;
    use crate::engine::{Event, EventHandler, Simulation};
    use crate::events::FlowCompleted;
    use crate::flow::{FlowId, FlowRecord, TransportMode};
    use crate::queue::{make_queue, QueueConfig, QueueKind};

    #[derive(Default)]
    struct Completions {
        flows: Vec<(FlowId, f64, u64)>,
        times: Vec<f64>,
    }

    struct CompletionRecorder {
        completions: Rc<RefCell<Completions>>,
        ctx: crate::engine::SimulationContext,
    }

    impl EventHandler for CompletionRecorder {
        fn on(&mut self, event: Event) {
            cast!(match event.data {
                FlowCompleted { flow_id, bytes_received } => {
                    let mut completions = self.completions.borrow_mut();
                    completions.flows.push((flow_id, self.ctx.time(), bytes_received));
                    completions.times.push(self.ctx.time());
                }
            })
        }
    }

    struct Fabric {
        sim: Simulation,
        senders: Rc<RefCell<SenderPool>>,
        sink: Rc<RefCell<PacketSink>>,
        link: Rc<RefCell<BottleneckLink>>,
        completions: Rc<RefCell<Completions>>,
    }

    fn fabric(queue: QueueConfig, bandwidth: f64) -> Fabric {
        let mut sim = Simulation::new();
        let topology = Topology::dumbbell(1, 1);
        let controller_ctx = sim.create_context("controller");
        let sink_ctx = sim.create_context("sink");
        let link_ctx = sim.create_context("link");
        let sender_ctx = sim.create_context("senders");

        let completions = rc!(refcell!(Completions::default()));
        let recorder = rc!(refcell!(CompletionRecorder {
            completions: completions.clone(),
            ctx: controller_ctx,
        }));
        let controller_id = sim.add_handler("controller", recorder);
        let sink = rc!(refcell!(PacketSink::new(controller_id, sink_ctx)));
        let sink_id = sim.add_handler("sink", sink.clone());
        let link = rc!(refcell!(BottleneckLink::new(
            make_queue(topology.bottleneck(), &queue),
            bandwidth,
            1e-6,
            sender_ctx.id(),
            sink_id,
            link_ctx,
        )));
        let link_id = sim.add_handler("link", link.clone());
        let senders = rc!(refcell!(SenderPool::new(1000, 1e-6, link_id, sink.clone(), sender_ctx)));
        sim.add_handler("senders", senders.clone());
        Fabric {
            sim,
            senders,
            sink,
            link,
            completions,
        }
    }

    fn flow(flow_id: FlowId, size: u64, transport: TransportMode) -> FlowRecord {
        FlowRecord::new(flow_id, 2, 3, size, 0., true, transport)
    }

    #[test]
    fn paced_flow_completes_once() {
        let mut fabric = fabric(QueueConfig::default(), 1e9);
        let address = Topology::dumbbell(1, 1).address(3);
        fabric
            .senders
            .borrow_mut()
            .install(&flow(1, 100_000, TransportMode::Reliable), address, 1e8);
        fabric.sim.step_until_no_events();

        let completions = fabric.completions.borrow();
        assert_eq!(completions.flows.len(), 1);
        let (flow_id, time, bytes) = completions.flows[0];
        assert_eq!((flow_id, bytes), (1, 100_000));
        // 100 packets paced at 100 Mbps, the last one leaves 99 gaps after the first
        assert_relative_eq!(time, 99. * 8e-5 + 8e-6 + 2e-6, epsilon = 1e-9);
        assert_eq!(fabric.sink.borrow().completions()[0].fct, time);
        assert_eq!(fabric.link.borrow().transmitted_bytes(), 100_000);
        assert_eq!(fabric.sink.borrow().pending_flows(), 0);
    }

    #[test]
    fn rate_change_speeds_up_the_flow() {
        let mut fabric = fabric(QueueConfig::default(), 1e10);
        let address = Topology::dumbbell(1, 1).address(3);
        fabric
            .senders
            .borrow_mut()
            .install(&flow(1, 1_000_000, TransportMode::Reliable), address, 1e8);
        fabric.sim.step_until_time(0.001);
        fabric.senders.borrow_mut().change_rate(1, 1e10);
        assert_eq!(fabric.senders.borrow().current_rate(1), Some(1e10));
        fabric.sim.step_until_no_events();
        let time = fabric.completions.borrow().times[0];
        assert!(time < 0.002, "flow finished at {}", time);
    }

    #[test]
    fn reliable_flow_recovers_dropped_packets() {
        let queue = QueueConfig {
            kind: QueueKind::Fifo,
            max_bytes: 3000,
            ..QueueConfig::default()
        };
        let mut fabric = fabric(queue, 1e8);
        let address = Topology::dumbbell(1, 1).address(3);
        fabric
            .senders
            .borrow_mut()
            .install(&flow(1, 50_000, TransportMode::Reliable), address, 1e9);
        fabric.sim.step_until_no_events();

        let link = fabric.link.borrow();
        let stats = link.queue().borrow().stats().clone();
        assert!(stats.dropped_packets > 0);
        assert_eq!(fabric.completions.borrow().flows[0].2, 50_000);
        let senders = fabric.senders.borrow();
        assert_eq!(senders.stats()[0].retransmissions, stats.dropped_packets);
    }

    #[test]
    fn unreliable_flow_completes_on_final_segment() {
        let queue = QueueConfig {
            kind: QueueKind::Fifo,
            max_bytes: 3000,
            ..QueueConfig::default()
        };
        let mut fabric = fabric(queue, 1e8);
        let address = Topology::dumbbell(1, 1).address(3);
        fabric
            .senders
            .borrow_mut()
            .install(&flow(1, 50_000, TransportMode::Unreliable), address, 1e9);
        fabric.sim.step_until_no_events();

        let completions = fabric.completions.borrow();
        assert_eq!(completions.flows.len(), 1);
        assert!(completions.flows[0].2 < 50_000);
        assert_eq!(fabric.sink.borrow().bytes_received(1), Some(completions.flows[0].2));
    }
}
