//! Simulation configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::allocator::{AllocatorConfig, Enforcement};
use crate::distribution::EmpiricalDistribution;
use crate::error::FabricError;
use crate::queue::{QueueConfig, QueueKind};

/// Flow size CDF used when the config names none, in bytes.
pub const DEFAULT_FLOW_SIZE_CDF: &[(f64, f64)] = &[
    (1_000., 0.),
    (10_000., 0.15),
    (20_000., 0.2),
    (30_000., 0.3),
    (50_000., 0.4),
    (80_000., 0.53),
    (200_000., 0.6),
    (1_000_000., 0.7),
    (2_000_000., 0.8),
    (5_000_000., 0.9),
    (10_000_000., 0.97),
    (30_000_000., 1.),
];

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueConfigRaw {
    pub kind: Option<QueueKind>,
    pub max_bytes: Option<u64>,
    pub ecn_threshold_bytes: Option<u64>,
    pub aggregate_unknown: Option<bool>,
}

/// Config as written in YAML, all fields are optional.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfigRaw {
    /// random seed of the simulation
    pub seed: Option<u64>,
    /// end of the arrival interval, seconds
    pub sim_time: Option<f64>,
    /// time the arrival clock of every (source, sink) pair starts from
    pub flow_start_time: Option<f64>,
    pub sources: Option<u32>,
    pub sinks: Option<u32>,
    /// bottleneck rate, bits per second
    pub link_rate: Option<f64>,
    /// propagation delay of every link, seconds
    pub link_delay: Option<f64>,
    /// offered load, fraction of the link rate
    pub load: Option<f64>,
    /// fraction of the link rate reserved for unknown flows
    pub controller_estimated_unknown_load: Option<f64>,
    /// flows larger than this many bytes are known
    pub unknown_flow_size_cutoff: Option<f64>,
    /// known flows use reliable transport
    pub flows_tcp: Option<bool>,
    pub weight_normalized: Option<bool>,
    /// inclusive range of randomly assigned weights
    pub weight_range: Option<[u32; 2]>,
    pub enforcement: Option<Enforcement>,
    /// initial sending rate of applications, bits per second
    pub application_rate: Option<f64>,
    pub pkt_size: Option<u64>,
    pub queue: Option<QueueConfigRaw>,
    /// queue sampling period, seconds
    pub sampling_interval: Option<f64>,
    /// CDF file with `value <ignored> probability` lines
    pub flow_size_cdf_file: Option<String>,
    /// inline CDF points `[value, probability]`
    pub flow_size_cdf: Option<Vec<(f64, f64)>>,
}

/// Source of the flow size distribution.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum FlowSizeSource {
    File(PathBuf),
    Points(Vec<(f64, f64)>),
}

/// Complete simulation configuration.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub sim_time: f64,
    pub flow_start_time: f64,
    pub sources: u32,
    pub sinks: u32,
    pub link_rate: f64,
    pub link_delay: f64,
    pub load: f64,
    pub controller_estimated_unknown_load: f64,
    pub unknown_flow_size_cutoff: f64,
    pub flows_tcp: bool,
    pub weight_normalized: bool,
    pub weight_range: (u32, u32),
    pub enforcement: Enforcement,
    pub application_rate: f64,
    pub pkt_size: u64,
    pub queue: QueueConfig,
    pub sampling_interval: f64,
    pub flow_sizes: FlowSizeSource,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 123,
            sim_time: 1.2,
            flow_start_time: 1.0,
            sources: 2,
            sinks: 2,
            link_rate: 10e9,
            link_delay: 5e-6,
            load: 0.5,
            controller_estimated_unknown_load: 0.,
            unknown_flow_size_cutoff: 1e6,
            flows_tcp: true,
            weight_normalized: false,
            weight_range: (1, 10),
            enforcement: Enforcement::Pacing,
            application_rate: 10e9,
            pkt_size: 1500,
            queue: QueueConfig::default(),
            sampling_interval: 0.001,
            flow_sizes: FlowSizeSource::Points(DEFAULT_FLOW_SIZE_CDF.to_vec()),
        }
    }
}

impl SimulationConfig {
    /// Creates config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads config from YAML file. Relative CDF file paths are resolved against the config directory.
    ///
    /// Panics if the file cannot be read or parsed.
    pub fn from_file(file_name: &str) -> Self {
        let data = std::fs::read_to_string(file_name).unwrap_or_else(|_| panic!("Can't read file {}", file_name));
        let mut config = Self::from_yaml(&data);
        if let FlowSizeSource::File(path) = &config.flow_sizes {
            if path.is_relative() {
                if let Some(dir) = Path::new(file_name).parent() {
                    config.flow_sizes = FlowSizeSource::File(dir.join(path));
                }
            }
        }
        config
    }

    /// Parses config from YAML string, missing fields get default values.
    ///
    /// Panics if the string is not a valid config.
    pub fn from_yaml(yaml: &str) -> Self {
        let data: SimulationConfigRaw =
            serde_yaml::from_str(yaml).unwrap_or_else(|e| panic!("Can't parse YAML config: {}", e));
        Self::from_raw(data)
    }

    pub fn from_raw(data: SimulationConfigRaw) -> Self {
        let default = Self::default();
        let link_rate = data.link_rate.unwrap_or(default.link_rate);
        let queue = data.queue.unwrap_or_default();
        let flow_sizes = match (data.flow_size_cdf_file, data.flow_size_cdf) {
            (Some(_), Some(_)) => panic!("Only one of flow_size_cdf_file and flow_size_cdf can be set"),
            (Some(file), None) => FlowSizeSource::File(PathBuf::from(file)),
            (None, Some(points)) => FlowSizeSource::Points(points),
            (None, None) => default.flow_sizes,
        };
        let config = Self {
            seed: data.seed.unwrap_or(default.seed),
            sim_time: data.sim_time.unwrap_or(default.sim_time),
            flow_start_time: data.flow_start_time.unwrap_or(default.flow_start_time),
            sources: data.sources.unwrap_or(default.sources),
            sinks: data.sinks.unwrap_or(default.sinks),
            link_rate,
            link_delay: data.link_delay.unwrap_or(default.link_delay),
            load: data.load.unwrap_or(default.load),
            controller_estimated_unknown_load: data
                .controller_estimated_unknown_load
                .unwrap_or(default.controller_estimated_unknown_load),
            unknown_flow_size_cutoff: data.unknown_flow_size_cutoff.unwrap_or(default.unknown_flow_size_cutoff),
            flows_tcp: data.flows_tcp.unwrap_or(default.flows_tcp),
            weight_normalized: data.weight_normalized.unwrap_or(default.weight_normalized),
            weight_range: data
                .weight_range
                .map(|[min, max]| (min, max))
                .unwrap_or(default.weight_range),
            enforcement: data.enforcement.unwrap_or(default.enforcement),
            application_rate: data.application_rate.unwrap_or(link_rate),
            pkt_size: data.pkt_size.unwrap_or(default.pkt_size),
            queue: QueueConfig {
                kind: queue.kind.unwrap_or(default.queue.kind),
                max_bytes: queue.max_bytes.unwrap_or(default.queue.max_bytes),
                ecn_threshold_bytes: queue.ecn_threshold_bytes.or(default.queue.ecn_threshold_bytes),
                aggregate_unknown: queue.aggregate_unknown.unwrap_or(default.queue.aggregate_unknown),
            },
            sampling_interval: data.sampling_interval.unwrap_or(default.sampling_interval),
            flow_sizes,
        };
        config.validate();
        config
    }

    fn validate(&self) {
        assert!(self.sources > 0 && self.sinks > 0, "At least one source and one sink are required");
        assert!(self.link_rate > 0., "link_rate must be positive");
        assert!(self.link_delay >= 0., "link_delay must be non-negative");
        assert!(self.load >= 0., "load must be non-negative");
        assert!(
            (0. ..1.).contains(&self.controller_estimated_unknown_load),
            "controller_estimated_unknown_load must be in [0, 1)"
        );
        assert!(
            self.weight_range.0 >= 1 && self.weight_range.0 <= self.weight_range.1,
            "weight_range must be a non-empty range of positive integers"
        );
        assert!(self.application_rate > 0., "application_rate must be positive");
        assert!(self.pkt_size > 0, "pkt_size must be positive");
        assert!(self.queue.max_bytes >= self.pkt_size, "queue.max_bytes must fit one packet");
        assert!(self.sampling_interval > 0., "sampling_interval must be positive");
    }

    /// Loads the flow size distribution.
    pub fn flow_size_distribution(&self) -> Result<EmpiricalDistribution, FabricError> {
        match &self.flow_sizes {
            FlowSizeSource::File(path) => EmpiricalDistribution::from_file(path),
            FlowSizeSource::Points(points) => EmpiricalDistribution::new(points.clone()),
        }
    }

    pub fn allocator_config(&self) -> AllocatorConfig {
        AllocatorConfig {
            link_capacity: self.link_rate,
            unknown_load: self.controller_estimated_unknown_load,
            weight_normalized: self.weight_normalized,
            enforcement: self.enforcement,
            application_rate: self.application_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_gets_defaults() {
        let config = SimulationConfig::from_yaml("{}");
        assert_eq!(config, SimulationConfig::default());
        assert_eq!(config.queue.kind, QueueKind::Wfq);
        assert!(config.flow_size_distribution().is_ok());
    }

    #[test]
    fn fields_override_defaults() {
        let config = SimulationConfig::from_yaml(
            r#"
seed: 7
link_rate: 1.0e9
load: 0.8
controller_estimated_unknown_load: 0.2
weight_normalized: true
weight_range: [2, 4]
enforcement: weighted
queue:
  kind: priority
  ecn_threshold_bytes: 30000
flow_size_cdf:
  - [100, 0.5]
  - [200, 1.0]
"#,
        );
        assert_eq!(config.seed, 7);
        assert_eq!(config.application_rate, 1e9);
        assert_eq!(config.weight_range, (2, 4));
        assert_eq!(config.enforcement, Enforcement::Weighted);
        assert_eq!(config.queue.kind, QueueKind::Priority);
        assert_eq!(config.queue.max_bytes, 150_000);
        assert_eq!(config.queue.ecn_threshold_bytes, Some(30_000));
        assert_eq!(config.allocator_config().unknown_load, 0.2);
        assert_eq!(config.flow_size_distribution().unwrap().points().len(), 2);
    }

    #[test]
    #[should_panic]
    fn unknown_load_must_leave_capacity() {
        SimulationConfig::from_yaml("controller_estimated_unknown_load: 1.0");
    }
}
