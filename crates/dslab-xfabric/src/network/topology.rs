use std::net::Ipv4Addr;

use serde::Serialize;

use crate::flow::NodeId;
use crate::queue::LinkKey;

/// Dumbbell topology: sources attached to the left switch, sinks to the right switch, and one
/// bottleneck link between the switches.
///
/// Node ids: 0 is the left switch, 1 the right switch, then sources, then sinks.
#[derive(Clone, Debug, Serialize)]
pub struct Topology {
    sources: u32,
    sinks: u32,
}

pub const LEFT_SWITCH: NodeId = 0;
pub const RIGHT_SWITCH: NodeId = 1;

impl Topology {
    pub fn dumbbell(sources: u32, sinks: u32) -> Self {
        assert!(sources > 0 && sinks > 0, "Topology needs at least one source and one sink");
        assert!(sources + sinks + 2 < 1 << 16, "Too many hosts");
        Self { sources, sinks }
    }

    pub fn source_count(&self) -> u32 {
        self.sources
    }

    pub fn sink_count(&self) -> u32 {
        self.sinks
    }

    pub fn source(&self, index: u32) -> NodeId {
        assert!(index < self.sources);
        2 + index
    }

    pub fn sink(&self, index: u32) -> NodeId {
        assert!(index < self.sinks);
        2 + self.sources + index
    }

    pub fn sources(&self) -> impl Iterator<Item = NodeId> {
        2..2 + self.sources
    }

    pub fn sinks(&self) -> impl Iterator<Item = NodeId> {
        2 + self.sources..2 + self.sources + self.sinks
    }

    /// All ordered (source, sink) pairs, sources outermost.
    pub fn pairs(&self) -> Vec<(NodeId, NodeId)> {
        self.sources()
            .flat_map(|source| self.sinks().map(move |sink| (source, sink)))
            .collect()
    }

    /// Forward direction of the bottleneck, towards the sinks.
    pub fn bottleneck(&self) -> LinkKey {
        LinkKey::new(LEFT_SWITCH, LEFT_SWITCH, RIGHT_SWITCH)
    }

    /// Address of the host interface of a node.
    pub fn address(&self, node: NodeId) -> Ipv4Addr {
        Ipv4Addr::new(10, 1, (node >> 8) as u8, (node & 0xff) as u8)
    }
}
