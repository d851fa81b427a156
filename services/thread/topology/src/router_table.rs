//! Router-ID allocation and distance-vector route table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Largest route cost carried in a Route64 entry
pub const MAX_ROUTE_COST: u8 = 15;

/// Route state for one allocated router
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterEntry {
    /// Router ID
    pub router_id: u8,
    /// Quality of the link from this router to us (0 = no direct link)
    pub link_quality_in: u8,
    /// Quality of the link from us to this router, as reported by it
    pub link_quality_out: u8,
    /// Cost of the best known multi-hop route (0 = none)
    pub route_cost: u8,
    /// Next hop of that route
    pub next_hop: Option<u8>,
}

impl RouterEntry {
    /// Whether a direct link exists in both directions
    pub fn is_two_way(&self) -> bool {
        self.link_quality_in > 0 && self.link_quality_out > 0
    }

    /// Worse of the two link directions
    pub fn link_quality(&self) -> u8 {
        self.link_quality_in.min(self.link_quality_out)
    }
}

/// Router-ID set and routes of the local partition
#[derive(Debug, Clone, Default)]
pub struct RouterTable {
    /// Local router ID while acting as router
    local_router_id: Option<u8>,
    /// Router ID sequence, 8-bit serial
    id_sequence: u8,
    /// Allocated routers, ascending
    routers: BTreeMap<u8, RouterEntry>,
}

// Include implementation
mod table;
pub use table::RouterTableStats;
