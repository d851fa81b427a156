//! Recording collaborator doubles.

use crate::collaborators::{
    Ipv6Stack, ManagementClient, MleService, OutboundMessage, RouteKind, TransactionId,
};
use crate::error::MleError;
use crate::event::RouterIdResponse;
use std::net::Ipv6Addr;
use thread_topology::NeighborIndex;
use thread_wire::{MleCommand, PrefixEntry};

/// MLE transport that records what was sent
#[derive(Debug, Default)]
pub struct RecordingMle {
    /// Messages in send order, with the transaction they were given
    pub sent: Vec<(TransactionId, OutboundMessage)>,
    /// Cancelled transactions
    pub cancelled: Vec<TransactionId>,
    /// Device table updates
    pub devices: Vec<(NeighborIndex, u16, [u8; 8])>,
    /// Device table removals
    pub removed_devices: Vec<NeighborIndex>,
    /// Short address set last
    pub short_address: Option<u16>,
    /// Link parameters set last
    pub link_params: Option<(u16, u16)>,
    /// Fail every send
    pub fail_sends: bool,
    next: u32,
}

impl RecordingMle {
    /// Sent messages of a command
    pub fn sent_of(&self, command: MleCommand) -> Vec<&OutboundMessage> {
        self.sent
            .iter()
            .map(|(_, m)| m)
            .filter(|m| m.message.command == command)
            .collect()
    }

    /// Transaction of the last message of a command
    pub fn last_transaction(&self, command: MleCommand) -> Option<TransactionId> {
        self.sent
            .iter()
            .rev()
            .find(|(_, m)| m.message.command == command)
            .map(|(id, _)| *id)
    }

    /// Forget what was sent so far
    pub fn clear(&mut self) {
        self.sent.clear();
    }
}

impl MleService for RecordingMle {
    fn send(&mut self, message: OutboundMessage) -> Result<TransactionId, MleError> {
        if self.fail_sends {
            return Err(MleError::Collaborator("send disabled".into()));
        }
        self.next += 1;
        let id = TransactionId(self.next);
        self.sent.push((id, message));
        Ok(id)
    }

    fn cancel(&mut self, transaction: TransactionId) {
        self.cancelled.push(transaction);
    }

    fn update_device(&mut self, index: NeighborIndex, mac16: u16, mac64: [u8; 8], _frame_counter: u32) {
        self.devices.push((index, mac16, mac64));
    }

    fn remove_device(&mut self, index: NeighborIndex) {
        self.removed_devices.push(index);
    }

    fn set_short_address(&mut self, rloc16: u16) {
        self.short_address = Some(rloc16);
    }

    fn set_link_params(&mut self, channel: u16, pan_id: u16) {
        self.link_params = Some((channel, pan_id));
    }
}

/// Installed route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedRoute {
    /// Destination prefix
    pub prefix: [u8; 16],
    /// Prefix length
    pub prefix_len: u8,
    /// Next hop RLOC16
    pub next_hop: Option<u16>,
    /// Route kind
    pub kind: RouteKind,
}

/// IPv6 stack that keeps its address and route tables in memory
#[derive(Debug, Default)]
pub struct RecordingIpv6 {
    /// Unicast addresses
    pub addresses: Vec<Ipv6Addr>,
    /// Multicast groups
    pub groups: Vec<Ipv6Addr>,
    /// Routes
    pub routes: Vec<RecordedRoute>,
    /// Cache flushes
    pub flushes: usize,
}

impl Ipv6Stack for RecordingIpv6 {
    fn add_address(&mut self, address: Ipv6Addr, _prefix_len: u8) {
        if !self.addresses.contains(&address) {
            self.addresses.push(address);
        }
    }

    fn delete_address(&mut self, address: Ipv6Addr) {
        self.addresses.retain(|a| *a != address);
    }

    fn add_multicast_group(&mut self, group: Ipv6Addr) {
        if !self.groups.contains(&group) {
            self.groups.push(group);
        }
    }

    fn route_add(&mut self, prefix: [u8; 16], prefix_len: u8, next_hop: Option<u16>, kind: RouteKind) {
        self.routes.retain(|r| !(r.prefix == prefix && r.prefix_len == prefix_len && r.kind == kind));
        self.routes.push(RecordedRoute {
            prefix,
            prefix_len,
            next_hop,
            kind,
        });
    }

    fn route_remove(&mut self, prefix: [u8; 16], prefix_len: u8, kind: RouteKind) {
        self.routes.retain(|r| !(r.prefix == prefix && r.prefix_len == prefix_len && r.kind == kind));
    }

    fn flush_caches(&mut self) {
        self.flushes += 1;
    }
}

/// Management client that records requests
#[derive(Debug, Default)]
pub struct RecordingManagement {
    /// Router-ID requests
    pub router_id_requests: Vec<([u8; 8], Option<u8>)>,
    /// Router-ID releases
    pub router_id_releases: Vec<([u8; 8], u8)>,
    /// Replies sent as leader
    pub replies: Vec<([u8; 8], RouterIdResponse)>,
    /// Network data registrations
    pub registrations: Vec<(u16, u16, Vec<PrefixEntry>)>,
}

impl ManagementClient for RecordingManagement {
    fn router_id_request(&mut self, mac64: [u8; 8], requested: Option<u8>) -> Result<(), MleError> {
        self.router_id_requests.push((mac64, requested));
        Ok(())
    }

    fn router_id_release(&mut self, mac64: [u8; 8], router_id: u8) {
        self.router_id_releases.push((mac64, router_id));
    }

    fn router_id_reply(&mut self, requester: [u8; 8], response: RouterIdResponse) {
        self.replies.push((requester, response));
    }

    fn network_data_register(&mut self, leader_rloc16: u16, rloc16: u16, prefixes: &[PrefixEntry]) {
        self.registrations.push((leader_rloc16, rloc16, prefixes.to_vec()));
    }
}
