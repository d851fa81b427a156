//! MLE error types.

use thiserror::Error;
use thread_topology::TopologyError;
use thread_wire::WireError;

/// MLE errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MleError {
    /// Encoding or decoding failed
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Operation needs an attached interface
    #[error("interface not attached")]
    NotAttached,

    /// A fixed-capacity table is full
    #[error("no room in {0}")]
    NoRoom(&'static str),

    /// No neighbor for the given address
    #[error("unknown neighbor")]
    UnknownNeighbor,

    /// Topology table rejected the operation
    #[error("topology error: {0}")]
    Topology(#[from] TopologyError),

    /// Configuration values out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A collaborator refused the request
    #[error("collaborator error: {0}")]
    Collaborator(String),
}
