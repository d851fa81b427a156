//! Events consumed by an interface and notifications it yields.

use crate::state::{AttachState, DeviceRole};
use serde::{Deserialize, Serialize};
use std::net::Ipv6Addr;
use thread_wire::{LeaderData, MleMessage, PrefixEntry, Route64};

/// Reception metadata of an inbound MLE message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxInfo {
    /// IPv6 source address
    pub source: Ipv6Addr,
    /// IPv6 destination address
    pub destination: Ipv6Addr,
    /// Received signal strength, dBm
    pub rssi: i8,
    /// Link-layer frame counter of the carrying frame
    pub link_frame_counter: u32,
}

/// Answer from the leader to a router-ID request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterIdResponse {
    /// Router ID granted
    Granted {
        /// Partition the leader belongs to
        partition_id: u32,
        /// Assigned router ID
        router_id: u8,
        /// Router mask after the assignment
        route: Route64,
    },
    /// No router ID available or upgrade refused
    Rejected,
}

/// Inputs of an interface
#[derive(Debug, Clone)]
pub enum Event {
    /// Bring the interface up and start attaching
    Start,
    /// Advance time
    Tick {
        /// Monotonic time, milliseconds
        now_ms: u64,
    },
    /// An MLE message arrived
    MleReceived {
        /// Reception metadata
        rx: RxInfo,
        /// Decoded message
        message: MleMessage,
    },
    /// The leader answered a router-ID request
    RouterIdResponse(RouterIdResponse),
    /// As leader: a router asks for a router ID
    RouterIdRequest {
        /// Requester extended address
        requester: [u8; 8],
        /// Router ID the requester used before, if any
        requested: Option<u8>,
    },
    /// As leader: a router gives its ID back
    RouterIdRelease {
        /// Released router ID
        router_id: u8,
    },
    /// As leader: a node registers its local network data
    NetworkDataRegistration {
        /// Registering node
        rloc16: u16,
        /// Its prefixes
        prefixes: Vec<PrefixEntry>,
    },
    /// Local border router or route configuration changed
    LocalNetworkDataChanged {
        /// New local prefixes
        prefixes: Vec<PrefixEntry>,
    },
    /// Raise a connection error
    ConnectionError(ConnectionError),
}

/// Conditions that end the current attach instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionError {
    /// Link to the parent was lost
    ParentConnectDown,
    /// A better partition was heard
    PartitionMerge {
        /// Leader Data of that partition
        leader_data: LeaderData,
    },
    /// Router role should end; reattach as child
    NetworkReattach,
    /// Our router ID is no longer valid
    NetworkKick,
    /// No network found
    NoThreadNetworkAvailable,
    /// Another leader serves our partition
    LeaderConflict,
}

/// How the bootstrap restarts after a connection error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartStrategy {
    /// Forget everything and rediscover
    FullReset,
    /// Attach to one known partition, keeping the router ID for re-request
    TargetedReattach,
    /// Give up the router ID and reattach as child
    DowngradeAndRetry,
    /// Scan again after a backoff
    OrphanScan,
}

impl ConnectionError {
    /// Restart strategy for this error
    pub fn restart_strategy(&self) -> RestartStrategy {
        match self {
            ConnectionError::ParentConnectDown
            | ConnectionError::NetworkKick
            | ConnectionError::LeaderConflict => RestartStrategy::FullReset,
            ConnectionError::PartitionMerge { .. } => RestartStrategy::TargetedReattach,
            ConnectionError::NetworkReattach => RestartStrategy::DowngradeAndRetry,
            ConnectionError::NoThreadNetworkAvailable => RestartStrategy::OrphanScan,
        }
    }
}

/// Whether a transport should retransmit after a timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryDecision {
    /// Send again
    Retry,
    /// Stop retrying
    GiveUp,
}

/// Observable changes of an interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Device role changed
    RoleChanged {
        /// Previous role
        from: DeviceRole,
        /// New role
        to: DeviceRole,
    },
    /// Attach state changed
    StateChanged {
        /// Previous state
        from: AttachState,
        /// New state
        to: AttachState,
    },
    /// A connection error was raised
    ConnectionError(ConnectionError),
    /// Network data was replaced
    NetworkDataUpdated {
        /// Leader Data after the update
        leader_data: LeaderData,
    },
    /// Joined or formed a partition
    PartitionChanged {
        /// Leader Data of the partition
        leader_data: LeaderData,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_strategy_map() {
        use ConnectionError::*;
        let leader_data = LeaderData {
            partition_id: 1,
            weighting: 64,
            data_version: 0,
            stable_data_version: 0,
            leader_router_id: 0,
        };
        assert_eq!(ParentConnectDown.restart_strategy(), RestartStrategy::FullReset);
        assert_eq!(NetworkKick.restart_strategy(), RestartStrategy::FullReset);
        assert_eq!(LeaderConflict.restart_strategy(), RestartStrategy::FullReset);
        assert_eq!(
            PartitionMerge { leader_data }.restart_strategy(),
            RestartStrategy::TargetedReattach
        );
        assert_eq!(
            NetworkReattach.restart_strategy(),
            RestartStrategy::DowngradeAndRetry
        );
        assert_eq!(
            NoThreadNetworkAvailable.restart_strategy(),
            RestartStrategy::OrphanScan
        );
    }
}
