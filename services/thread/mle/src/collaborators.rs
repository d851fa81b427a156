//! Services an interface drives but does not own: the MLE transport, the
//! IPv6 address and route layer, and the leader-facing management client.

use crate::error::MleError;
use crate::event::RouterIdResponse;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv6Addr;
use thread_topology::NeighborIndex;
use thread_wire::{MleMessage, PrefixEntry};

/// Handle of an outbound MLE transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub u32);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx{}", self.0)
    }
}

/// Retransmission budget of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retransmissions after the first send
    pub retries: u8,
    /// Wait before each retransmission, milliseconds
    pub timeout_ms: u32,
}

impl RetryPolicy {
    /// Send once, never retransmit
    pub const fn none() -> Self {
        Self {
            retries: 0,
            timeout_ms: 0,
        }
    }

    /// Retry policy for requests expecting a response
    pub const fn request(retries: u8, timeout_ms: u32) -> Self {
        Self {
            retries,
            timeout_ms,
        }
    }
}

/// A message ready for transmission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// IPv6 destination
    pub destination: Ipv6Addr,
    /// Framed message
    pub message: MleMessage,
    /// Retransmission budget
    pub retry: RetryPolicy,
    /// Send on this channel instead of the current one
    pub channel: Option<u16>,
}

/// Kind tag of routes the interface installs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteKind {
    /// Prefix is on-mesh
    OnMesh,
    /// External route through a border router
    External,
    /// Default route through a border router
    BorderRouterDefault,
}

/// MLE transport and MAC device table
pub trait MleService {
    /// Queue a message; the transport reports a timeout through the
    /// interface's `on_transaction_timeout` at most `retry.retries + 1` times
    fn send(&mut self, message: OutboundMessage) -> Result<TransactionId, MleError>;

    /// Drop an outstanding transaction
    fn cancel(&mut self, transaction: TransactionId);

    /// Refresh the MAC device table entry of a neighbor
    fn update_device(&mut self, index: NeighborIndex, mac16: u16, mac64: [u8; 8], frame_counter: u32);

    /// Remove the MAC device table entry of a neighbor
    fn remove_device(&mut self, index: NeighborIndex);

    /// Set the local short address
    fn set_short_address(&mut self, rloc16: u16);

    /// Tune the radio
    fn set_link_params(&mut self, channel: u16, pan_id: u16);
}

/// IPv6 address and route table
pub trait Ipv6Stack {
    /// Add a unicast address
    fn add_address(&mut self, address: Ipv6Addr, prefix_len: u8);

    /// Remove a unicast address
    fn delete_address(&mut self, address: Ipv6Addr);

    /// Join a multicast group
    fn add_multicast_group(&mut self, group: Ipv6Addr);

    /// Install a route
    fn route_add(&mut self, prefix: [u8; 16], prefix_len: u8, next_hop: Option<u16>, kind: RouteKind);

    /// Remove a route
    fn route_remove(&mut self, prefix: [u8; 16], prefix_len: u8, kind: RouteKind);

    /// Flush neighbor and destination caches
    fn flush_caches(&mut self);
}

/// Leader-facing management exchanges; answers come back as events
pub trait ManagementClient {
    /// Ask the leader for a router ID
    fn router_id_request(&mut self, mac64: [u8; 8], requested: Option<u8>) -> Result<(), MleError>;

    /// Return a router ID to the leader
    fn router_id_release(&mut self, mac64: [u8; 8], router_id: u8);

    /// As leader, answer a router-ID request
    fn router_id_reply(&mut self, requester: [u8; 8], response: RouterIdResponse);

    /// Register local network data with the leader
    fn network_data_register(&mut self, leader_rloc16: u16, rloc16: u16, prefixes: &[PrefixEntry]);
}
