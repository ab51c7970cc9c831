//! Poisson flow arrivals with empirical flow sizes.

use rand::prelude::*;
use rand_distr::Exp;
use rand_pcg::Pcg64;
use serde::Serialize;

use crate::distribution::EmpiricalDistribution;
use crate::engine::{Id, SimulationContext};
use crate::error::FabricError;
use crate::events::FlowArrival;
use crate::flow::{FlowId, FlowRecord, NodeId};
use crate::network::Topology;

/// Generation for a pair stops once its clock reaches `horizon - HORIZON_MARGIN`.
pub const HORIZON_MARGIN: f64 = 0.1;

#[derive(Clone, Debug, Serialize)]
pub struct ArrivalParams {
    /// Offered load as a fraction of the link capacity.
    pub load: f64,
    /// Bits per second.
    pub link_capacity: f64,
    /// End of the simulated interval.
    pub horizon: f64,
    /// Clock value each (source, sink) sequence starts from.
    pub start_time: f64,
    /// Flows larger than this many bytes are known.
    pub cutoff: f64,
    pub flows_tcp: bool,
    pub seed: u64,
    pub first_flow_id: FlowId,
}

/// Produces flow starts for every ordered (source, sink) pair.
///
/// Inter-arrival gaps of a pair are exponential with rate
/// `link_capacity * load / (8 * mean_flow_size) / (sources * sinks)`, sizes are drawn from the
/// empirical distribution and rounded up to whole bytes.
pub struct ArrivalGenerator {
    topology: Topology,
    distribution: EmpiricalDistribution,
    params: ArrivalParams,
    rate: f64,
}

impl ArrivalGenerator {
    pub fn new(
        topology: Topology,
        distribution: EmpiricalDistribution,
        params: ArrivalParams,
    ) -> Result<Self, FabricError> {
        assert!(params.load >= 0., "Load must be non-negative, got {}", params.load);
        let mean = distribution.mean();
        if mean <= 0. {
            return Err(FabricError::EmptyDistribution {
                reason: format!("mean flow size is {}", mean),
            });
        }
        let pairs = (topology.source_count() * topology.sink_count()) as f64;
        let rate = params.link_capacity * params.load / (mean * 8.) / pairs;
        Ok(Self {
            topology,
            distribution,
            params,
            rate,
        })
    }

    /// Arrival rate of a single (source, sink) pair, flows per second.
    pub fn rate_per_pair(&self) -> f64 {
        self.rate
    }

    pub fn params(&self) -> &ArrivalParams {
        &self.params
    }

    /// Returns the flow starts, pair by pair, each pair in time order.
    ///
    /// The same generator always yields the same sequence.
    pub fn flows(&self) -> Arrivals<'_> {
        Arrivals {
            generator: self,
            pairs: self.topology.pairs(),
            pair: 0,
            clock: self.params.start_time,
            rand: Pcg64::seed_from_u64(self.params.seed),
            gaps: Exp::new(self.rate).ok().filter(|_| self.rate > 0.),
            next_flow_id: self.params.first_flow_id,
        }
    }

    /// Schedules a [`FlowArrival`] for the controller at the start time of every flow.
    ///
    /// Returns the number of scheduled flows.
    pub fn schedule(&self, ctx: &mut SimulationContext, controller: Id) -> usize {
        let mut count = 0;
        for flow in self.flows() {
            let delay = (flow.start_time - ctx.time()).max(0.);
            ctx.emit(FlowArrival { flow }, controller, delay);
            count += 1;
        }
        count
    }
}

/// Lazy sequence of flow starts, see [`ArrivalGenerator::flows`].
pub struct Arrivals<'a> {
    generator: &'a ArrivalGenerator,
    pairs: Vec<(NodeId, NodeId)>,
    pair: usize,
    clock: f64,
    rand: Pcg64,
    gaps: Option<Exp<f64>>,
    next_flow_id: FlowId,
}

impl<'a> Iterator for Arrivals<'a> {
    type Item = FlowRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let gaps = self.gaps?;
        let params = &self.generator.params;
        while self.pair < self.pairs.len() {
            if self.clock >= params.horizon - HORIZON_MARGIN {
                self.pair += 1;
                self.clock = params.start_time;
                continue;
            }
            let size = self.generator.distribution.sample(&mut self.rand);
            self.clock += gaps.sample(&mut self.rand);
            let (source, dest) = self.pairs[self.pair];
            let flow = FlowRecord::classified(
                self.next_flow_id,
                source,
                dest,
                (size.ceil() as u64).max(1),
                self.clock,
                params.cutoff,
                params.flows_tcp,
            );
            self.next_flow_id += 1;
            return Some(flow);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::flow::TransportMode;

    fn params(seed: u64) -> ArrivalParams {
        ArrivalParams {
            load: 0.5,
            link_capacity: 10e9,
            horizon: 1.2,
            start_time: 1.0,
            cutoff: 1e6,
            flows_tcp: false,
            seed,
            first_flow_id: 1,
        }
    }

    fn generator(seed: u64) -> ArrivalGenerator {
        // mean size 1.25 MB
        let distribution = EmpiricalDistribution::new(vec![(0., 0.), (2_500_000., 1.)]).unwrap();
        ArrivalGenerator::new(Topology::dumbbell(2, 2), distribution, params(seed)).unwrap()
    }

    #[test]
    fn rate_is_split_across_pairs() {
        let generator = generator(1);
        assert_relative_eq!(generator.rate_per_pair(), 10e9 * 0.5 / 1e7 / 4.);
    }

    #[test]
    fn sequences_are_reproducible() {
        let a: Vec<(u64, f64)> = generator(5).flows().map(|f| (f.size, f.start_time)).collect();
        let b: Vec<(u64, f64)> = generator(5).flows().map(|f| (f.size, f.start_time)).collect();
        let c: Vec<(u64, f64)> = generator(6).flows().map(|f| (f.size, f.start_time)).collect();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn pairs_stop_at_horizon_margin() {
        let generator = generator(11);
        let flows: Vec<FlowRecord> = generator.flows().collect();
        let ids: Vec<FlowId> = flows.iter().map(|f| f.flow_id).collect();
        assert_eq!(ids, (1..=flows.len() as u64).collect::<Vec<_>>());
        for pair in Topology::dumbbell(2, 2).pairs() {
            let starts: Vec<f64> = flows
                .iter()
                .filter(|f| (f.source, f.dest) == pair)
                .map(|f| f.start_time)
                .collect();
            assert!(!starts.is_empty());
            assert!(starts.windows(2).all(|w| w[0] <= w[1]));
            assert!(starts[0] > 1.0);
            // only the last start of a pair may cross the margin
            assert!(starts[..starts.len() - 1].iter().all(|&t| t < 1.2 - HORIZON_MARGIN));
        }
        // 0.1 s of arrivals at 125 flows/s per pair
        assert!(flows.len() > 4 * 5 && flows.len() < 4 * 30);
    }

    #[test]
    fn flows_are_classified_by_size() {
        for flow in generator(3).flows() {
            assert!(flow.size >= 1);
            assert_eq!(flow.known, flow.size as f64 > 1e6);
            let transport = if flow.known {
                TransportMode::Unreliable
            } else {
                TransportMode::Reliable
            };
            assert_eq!(flow.transport, transport);
            assert_eq!(flow.weight(), 1.);
        }
    }

    #[test]
    fn zero_load_produces_nothing() {
        let distribution = EmpiricalDistribution::new(vec![(100., 1.)]).unwrap();
        let mut params = params(1);
        params.load = 0.;
        let generator = ArrivalGenerator::new(Topology::dumbbell(1, 1), distribution, params).unwrap();
        assert_eq!(generator.flows().count(), 0);
    }

    #[test]
    fn zero_mean_distribution_is_rejected() {
        let distribution = EmpiricalDistribution::new(vec![(0., 1.)]).unwrap();
        let result = ArrivalGenerator::new(Topology::dumbbell(1, 1), distribution, params(1));
        assert!(matches!(result, Err(FabricError::EmptyDistribution { .. })));
    }
}
