//! Topology error types.

use thiserror::Error;

/// Errors from the neighbor and router tables
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// Device table size leaves no usable slot
    #[error("device table size {0} too small")]
    TableTooSmall(usize),

    /// Router ID outside 0..=62
    #[error("invalid router id {0}")]
    InvalidRouterId(u8),

    /// Every router ID is allocated
    #[error("no free router id")]
    NoFreeRouterId,
}
