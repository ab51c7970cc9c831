//! Weight assignment strategies for newly admitted flows.

use std::collections::VecDeque;

use rand::prelude::*;
use rand_pcg::Pcg64;
use rustc_hash::FxHashMap;

use crate::flow::{FlowId, FlowRecord};

/// Chooses the weight of a flow the first time it takes part in a recomputation.
///
/// Once the flow is running its weight is never asked for again.
pub trait WeightAssigner {
    fn assign(&mut self, flow: &FlowRecord) -> f64;
}

/// Draws integer weights uniformly from an inclusive range.
pub struct UniformWeights {
    min: u32,
    max: u32,
    rand: Pcg64,
}

impl UniformWeights {
    pub fn new(min: u32, max: u32, seed: u64) -> Self {
        assert!(
            min >= 1 && min <= max,
            "Invalid weight range [{}, {}], weights must be positive",
            min,
            max
        );
        Self {
            min,
            max,
            rand: Pcg64::seed_from_u64(seed),
        }
    }
}

impl WeightAssigner for UniformWeights {
    fn assign(&mut self, _flow: &FlowRecord) -> f64 {
        self.rand.gen_range(self.min..=self.max) as f64
    }
}

/// Fixed per-flow weights with a default for flows not listed.
pub struct FixedWeights {
    weights: FxHashMap<FlowId, f64>,
    default: f64,
}

impl FixedWeights {
    pub fn new(default: f64) -> Self {
        Self {
            weights: FxHashMap::default(),
            default,
        }
    }

    pub fn with_weight(mut self, flow_id: FlowId, weight: f64) -> Self {
        self.weights.insert(flow_id, weight);
        self
    }
}

impl WeightAssigner for FixedWeights {
    fn assign(&mut self, flow: &FlowRecord) -> f64 {
        self.weights.get(&flow.flow_id).copied().unwrap_or(self.default)
    }
}

/// Hands out weights in the given order, then repeats the last one.
pub struct SequenceWeights {
    queue: VecDeque<f64>,
    last: f64,
}

impl SequenceWeights {
    pub fn new<I: IntoIterator<Item = f64>>(weights: I) -> Self {
        Self {
            queue: weights.into_iter().collect(),
            last: 1.,
        }
    }
}

impl WeightAssigner for SequenceWeights {
    fn assign(&mut self, _flow: &FlowRecord) -> f64 {
        if let Some(weight) = self.queue.pop_front() {
            self.last = weight;
        }
        self.last
    }
}
