//! Periodic sampling of queue occupancy.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use crate::cast;
use crate::engine::{Event, EventHandler, SimulationContext};
use crate::events::ProbeTick;
use crate::log_debug;
use crate::queue::{LinkKey, QueueDiscipline};

#[derive(Clone, Debug, Serialize)]
pub struct QueueSample {
    pub time: f64,
    pub link: LinkKey,
    pub bytes: u64,
    pub packets: usize,
}

/// Samples the occupancy of the probed queues every `interval` seconds.
pub struct QueueProbe {
    queues: Vec<Rc<RefCell<dyn QueueDiscipline>>>,
    interval: f64,
    until: f64,
    samples: Vec<QueueSample>,
    ctx: SimulationContext,
}

impl QueueProbe {
    pub fn new(interval: f64, until: f64, ctx: SimulationContext) -> Self {
        assert!(interval > 0., "Sampling interval must be positive");
        Self {
            queues: Vec::new(),
            interval,
            until,
            samples: Vec::new(),
            ctx,
        }
    }

    pub fn add_queue(&mut self, queue: Rc<RefCell<dyn QueueDiscipline>>) {
        self.queues.push(queue);
    }

    /// Schedules the first sample at `start` (absolute time).
    pub fn start(&mut self, start: f64) {
        let delay = (start - self.ctx.time()).max(0.);
        self.ctx.emit_self(ProbeTick {}, delay);
    }

    pub fn samples(&self) -> &[QueueSample] {
        &self.samples
    }

    /// Largest sampled occupancy of the queue serving `link`.
    pub fn peak_bytes(&self, link: &LinkKey) -> u64 {
        self.samples
            .iter()
            .filter(|s| s.link == *link)
            .map(|s| s.bytes)
            .max()
            .unwrap_or(0)
    }

    fn sample(&mut self) {
        let time = self.ctx.time();
        for queue in &self.queues {
            let queue = queue.borrow();
            let sample = QueueSample {
                time,
                link: *queue.link(),
                bytes: queue.len_bytes(),
                packets: queue.len_packets(),
            };
            log_debug!(
                self.ctx,
                "queue {} holds {} bytes in {} packets",
                sample.link,
                sample.bytes,
                sample.packets
            );
            self.samples.push(sample);
        }
        if time + self.interval <= self.until {
            self.ctx.emit_self(ProbeTick {}, self.interval);
        }
    }
}

impl EventHandler for QueueProbe {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            ProbeTick {} => {
                self.sample();
            }
        })
    }
}
