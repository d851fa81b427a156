//! Neighbor table, link quality, router IDs and partition comparison for Thread.
//!
//! This crate provides the topology state an MLE interface owns: the
//! neighbor arena and its per-slot link data, the router-ID and route table
//! of the local partition, and the pure partition-priority rules used to
//! decide merges.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod link_quality;
pub mod neighbor;
pub mod partition;
pub mod router_table;

pub use error::TopologyError;
pub use link_quality::{
    link_cost_from_quality, link_margin_from_rssi, link_quality_from_margin, NeighborClass,
    NeighborLinkInfo,
};
pub use neighbor::{NeighborEntry, NeighborIndex, NeighborTable};
pub use partition::{
    adopted_leader_data, leader_data_validation, partition_match, partition_process,
    LeaderDataValidation, LocalPartition, PartitionDecision, PreviousPartition,
};
pub use router_table::{RouterEntry, RouterTable, RouterTableStats, MAX_ROUTE_COST};
