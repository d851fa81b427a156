//! Attach state, device role and the transient records an interface keeps
//! while attaching.

use serde::{Deserialize, Serialize};
use std::fmt;
use thread_topology::link_quality_from_margin;
use thread_wire::{AddressEntry, Connectivity, DeviceMode, LeaderData, Timestamp, TlvType};

/// Attach state of an interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttachState {
    /// Interface down or about to (re)discover
    NetworkDiscover,
    /// Waiting out the start-up jitter
    Scan,
    /// Resynchronising with the pre-reset parent or neighbors
    MleSynch,
    /// Parent requests accepting any partition
    AttachAny,
    /// Parent requests restricted to the previous partition
    Reattach,
    /// Second round restricted to the previous partition
    ReattachRetry,
    /// Parent requests restricted to a heard, better partition
    PartitionMerge,
    /// Child ID Request sent to the selected parent
    ChildIdRequest,
    /// Attached as child or REED
    Connected,
    /// Attached as router or leader
    ConnectedRouter,
}

impl AttachState {
    /// Whether the state sends parent requests
    pub fn is_parent_request(&self) -> bool {
        matches!(
            self,
            AttachState::AttachAny
                | AttachState::Reattach
                | AttachState::ReattachRetry
                | AttachState::PartitionMerge
        )
    }

    /// Whether the interface is attached
    pub fn is_connected(&self) -> bool {
        matches!(self, AttachState::Connected | AttachState::ConnectedRouter)
    }
}

impl fmt::Display for AttachState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Role of the device in its partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceRole {
    /// Not attached
    Detached,
    /// End device child
    Child,
    /// Router-eligible end device
    Reed,
    /// Router
    Router,
    /// Leader
    Leader,
}

impl DeviceRole {
    /// Whether the role routes
    pub fn is_router(&self) -> bool {
        matches!(self, DeviceRole::Router | DeviceRole::Leader)
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceRole::Detached => "detached",
            DeviceRole::Child => "child",
            DeviceRole::Reed => "reed",
            DeviceRole::Router => "router",
            DeviceRole::Leader => "leader",
        };
        f.write_str(name)
    }
}

/// The attached parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentInfo {
    /// Extended address
    pub mac64: [u8; 8],
    /// Short address
    pub rloc16: u16,
}

/// A parent heard during a parent-request round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentCandidate {
    /// Extended address
    pub mac64: [u8; 8],
    /// Short address
    pub rloc16: u16,
    /// Partition of the candidate
    pub leader_data: LeaderData,
    /// Worse of both link directions
    pub link_quality: u8,
    /// Connectivity the candidate reported
    pub connectivity: Connectivity,
    /// Challenge to echo in the Child ID Request
    pub challenge: Vec<u8>,
    /// Link-layer frame counter
    pub link_frame_counter: u32,
    /// MLE frame counter
    pub mle_frame_counter: u32,
    /// Our link margin to the candidate
    pub link_margin: u8,
}

impl ParentCandidate {
    /// Two-way link quality from our margin and the margin it measured
    pub fn two_way_quality(local_margin: u8, remote_margin: u8) -> u8 {
        link_quality_from_margin(local_margin).min(link_quality_from_margin(remote_margin))
    }

    fn rank(&self) -> (u8, i8, u8) {
        (
            self.link_quality,
            self.connectivity.parent_priority,
            self.connectivity.link_quality_3,
        )
    }
}

/// Best candidate: two-way link quality, then parent priority, then the
/// number of quality-3 links
pub fn select_parent(candidates: &[ParentCandidate]) -> Option<&ParentCandidate> {
    candidates
        .iter()
        .filter(|c| c.link_quality > 0)
        .max_by_key(|c| c.rank())
}

/// An announce-driven attach on other link parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnounceInfo {
    /// Channel before the announce
    pub original_channel: u16,
    /// PAN before the announce
    pub original_pan_id: u16,
    /// Announced channel
    pub channel: u16,
    /// Announced PAN
    pub pan_id: u16,
    /// Announced active timestamp
    pub timestamp: Timestamp,
}

/// A Child ID Request waiting to be processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChildId {
    /// Requester extended address
    pub mac64: [u8; 8],
    /// Requested mode
    pub mode: DeviceMode,
    /// Requested timeout, seconds
    pub timeout_secs: u32,
    /// Link-layer frame counter
    pub link_frame_counter: u32,
    /// MLE frame counter
    pub mle_frame_counter: u32,
    /// TLVs the child asked for
    pub requested_tlvs: Vec<TlvType>,
    /// Registered addresses
    pub addresses: Vec<AddressEntry>,
    /// Child's active timestamp
    pub active_timestamp: Option<Timestamp>,
    /// Child's pending timestamp
    pub pending_timestamp: Option<Timestamp>,
    /// Link margin of the request
    pub link_margin: u8,
}

/// Why a challenge was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChallengePurpose {
    /// Link Request
    LinkRequest,
    /// Parent Request
    ParentRequest,
    /// Parent Response, answered by a Child ID Request
    ParentResponse,
    /// Child Update Request
    ChildUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct OutstandingChallenge {
    challenge: [u8; 8],
    peer: Option<[u8; 8]>,
    purpose: ChallengePurpose,
    expires_ms: u64,
}

/// Challenges sent and not yet answered
#[derive(Debug, Clone)]
pub struct ChallengeTable {
    entries: Vec<OutstandingChallenge>,
    capacity: usize,
}

impl ChallengeTable {
    /// Create a table holding up to `capacity` challenges
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a challenge; `peer` is `None` for multicast requests. The
    /// oldest entry is evicted when full.
    pub fn record(
        &mut self,
        challenge: [u8; 8],
        peer: Option<[u8; 8]>,
        purpose: ChallengePurpose,
        expires_ms: u64,
    ) {
        if self.entries.len() >= self.capacity && !self.entries.is_empty() {
            self.entries.remove(0);
        }
        self.entries.push(OutstandingChallenge {
            challenge,
            peer,
            purpose,
            expires_ms,
        });
    }

    /// Match a Response TLV from `from`. Unicast challenges are consumed;
    /// multicast ones stay valid for further responders until they expire.
    pub fn take(&mut self, response: &[u8], from: &[u8; 8], now_ms: u64) -> Option<ChallengePurpose> {
        let pos = self.entries.iter().position(|e| {
            e.expires_ms > now_ms
                && e.challenge.as_slice() == response
                && e.peer.map_or(true, |p| &p == from)
        })?;
        let purpose = self.entries[pos].purpose;
        if self.entries[pos].peer.is_some() {
            self.entries.remove(pos);
        }
        Some(purpose)
    }

    /// Drop expired challenges
    pub fn expire(&mut self, now_ms: u64) {
        self.entries.retain(|e| e.expires_ms > now_ms);
    }

    /// Drop every challenge
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Outstanding challenges
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no challenge is outstanding
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
