//! Errors reported by the fabric core.

use std::fmt::{Display, Formatter};

use crate::flow::FlowId;

/// Invariant violations and input errors of the allocation core.
///
/// Queue overflow is not an error: it is reported as [`EnqueueOutcome::Dropped`](crate::queue::EnqueueOutcome).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FabricError {
    /// Start of a flow whose id is already active.
    DuplicateFlow { flow_id: FlowId },
    /// Stop or update of a flow which is not active.
    UnknownFlow { flow_id: FlowId },
    /// Flow size distribution without usable samples.
    EmptyDistribution { reason: String },
    /// Flow size distribution with malformed points.
    InvalidDistribution { reason: String },
}

impl Display for FabricError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FabricError::DuplicateFlow { flow_id } => write!(f, "flow {} is already active", flow_id),
            FabricError::UnknownFlow { flow_id } => write!(f, "flow {} is not active", flow_id),
            FabricError::EmptyDistribution { reason } => write!(f, "empty flow size distribution: {}", reason),
            FabricError::InvalidDistribution { reason } => write!(f, "invalid flow size distribution: {}", reason),
        }
    }
}

impl std::error::Error for FabricError {}
