//! Per-interface MLE state and its event loop.
//!
//! A [`ThreadInterface`] owns every table the protocol mutates: neighbors,
//! link quality, routers, network data, timers and the attach state. Events
//! are queued and processed one at a time to completion; handlers that need
//! follow-up work (a connection error, a router-ID answer) queue another
//! event instead of recursing.

use crate::bootstrap::{transition, BootstrapContext, BootstrapEvent, ParentRound};
use crate::builder::DatasetTimestamps;
use crate::collaborators::{
    Ipv6Stack, ManagementClient, MleService, OutboundMessage, RetryPolicy, TransactionId,
};
use crate::config::{ResyncRecord, ThreadConfig};
use crate::error::MleError;
use crate::event::{ConnectionError, Event, Notification, RetryDecision};
use crate::router::ChildIdAllocator;
use crate::routes::{self, InstalledRoutes};
use crate::state::{
    AnnounceInfo, AttachState, ChallengeTable, DeviceRole, ParentCandidate, ParentInfo,
    PendingChildId,
};
use crate::timers::{TimerKind, Timers, Trickle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::Ipv6Addr;
use thread_topology::{
    LocalPartition, NeighborClass, NeighborEntry, NeighborIndex, NeighborTable, PreviousPartition,
    RouterTable,
};
use thread_wire::{
    child_id_from_rloc16, is_router_rloc16, link_local_from_mac64, rloc_address, address_from_iid,
    LeaderData, MessageBuilder, NetworkData, PrefixEntry, SecurityHeader, Timestamp, WireError,
    RLOC16_INVALID,
};
use tracing::{debug, info, warn};

mod attach;
mod children;
mod leader;

#[cfg(test)]
mod tests;

/// ff02::1
pub const LINK_LOCAL_ALL_NODES: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1);
/// ff02::2
pub const LINK_LOCAL_ALL_ROUTERS: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 2);
/// ff03::1
pub const REALM_LOCAL_ALL_NODES: Ipv6Addr = Ipv6Addr::new(0xff03, 0, 0, 0, 0, 0, 0, 1);
/// ff03::2
pub const REALM_LOCAL_ALL_ROUTERS: Ipv6Addr = Ipv6Addr::new(0xff03, 0, 0, 0, 0, 0, 0, 2);

const CHALLENGE_TABLE_SIZE: usize = 8;
const MAX_PENDING_CHILD_IDS: usize = 4;

/// Retries for requests that expect a unicast answer
pub(crate) const REQUEST_RETRY: RetryPolicy = RetryPolicy::request(2, 1000);

/// What an outstanding transaction was for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TxKind {
    ParentRequest,
    ChildIdRequest,
    LinkRequest,
    Resync,
    ChildUpdate,
    DataRequest,
}

/// One Thread interface
pub struct ThreadInterface<S, I, M> {
    pub(crate) config: ThreadConfig,
    pub(crate) mle: S,
    pub(crate) ipv6: I,
    pub(crate) mgmt: M,
    pub(crate) rng: StdRng,

    pub(crate) now_ms: u64,
    pub(crate) last_second_ms: u64,
    pub(crate) state: AttachState,
    pub(crate) role: DeviceRole,
    pub(crate) rloc16: u16,
    pub(crate) ml_eid_iid: [u8; 8],
    pub(crate) frame_counter: u32,

    pub(crate) leader_data: Option<LeaderData>,
    pub(crate) network_data: NetworkData,
    pub(crate) network_data_requested: bool,
    pub(crate) active_dataset_requested: bool,
    pub(crate) pending_dataset_requested: bool,
    pub(crate) local_prefixes: Vec<PrefixEntry>,
    /// Leader only: registered prefixes per RLOC16
    pub(crate) registrations: BTreeMap<u16, Vec<PrefixEntry>>,
    pub(crate) installed: InstalledRoutes,

    pub(crate) neighbors: NeighborTable,
    pub(crate) neighbor_class: NeighborClass,
    pub(crate) routers: RouterTable,
    pub(crate) child_ids: ChildIdAllocator,
    pub(crate) pending_child_ids: VecDeque<PendingChildId>,
    pub(crate) challenges: ChallengeTable,

    pub(crate) parent: Option<ParentInfo>,
    pub(crate) parent_candidates: Vec<ParentCandidate>,
    pub(crate) parent_round: ParentRound,
    pub(crate) selected_parent: Option<ParentCandidate>,
    pub(crate) previous_partition: Option<PreviousPartition>,
    pub(crate) merge_target: Option<LeaderData>,
    pub(crate) previous_router_id: Option<u8>,
    pub(crate) router_id_pending: bool,
    pub(crate) resync: Option<ResyncRecord>,

    pub(crate) channel: u16,
    pub(crate) pan_id: u16,
    pub(crate) active_timestamp: Option<Timestamp>,
    pub(crate) pending_timestamp: Option<Timestamp>,
    pub(crate) announce: Option<AnnounceInfo>,

    pub(crate) timers: Timers,
    pub(crate) trickle: Trickle,
    pub(crate) last_merge_advertisement_ms: Option<u64>,
    pub(crate) transactions: HashMap<TransactionId, TxKind>,

    events: VecDeque<Event>,
    notifications: Vec<Notification>,
}

impl<S, I, M> ThreadInterface<S, I, M>
where
    S: MleService,
    I: Ipv6Stack,
    M: ManagementClient,
{
    /// Create an interface; it stays in `NetworkDiscover` until `Event::Start`
    pub fn new(config: ThreadConfig, mle: S, ipv6: I, mgmt: M) -> Result<Self, MleError> {
        config.validate()?;
        let neighbors = NeighborTable::new(config.device_table_size)?;
        let neighbor_class = NeighborClass::new(config.device_table_size);
        let mut rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut ml_eid_iid = [0u8; 8];
        rng.fill(&mut ml_eid_iid);

        let mut iface = Self {
            mle,
            ipv6,
            mgmt,
            rng,
            now_ms: 0,
            last_second_ms: 0,
            state: AttachState::NetworkDiscover,
            role: DeviceRole::Detached,
            rloc16: RLOC16_INVALID,
            ml_eid_iid,
            frame_counter: 0,
            leader_data: None,
            network_data: NetworkData::empty(),
            network_data_requested: false,
            active_dataset_requested: false,
            pending_dataset_requested: false,
            local_prefixes: Vec::new(),
            registrations: BTreeMap::new(),
            installed: InstalledRoutes::default(),
            neighbors,
            neighbor_class,
            routers: RouterTable::new(),
            child_ids: ChildIdAllocator::new(
                config.child_id_min,
                config.child_id_max,
                config.max_child_count,
            ),
            pending_child_ids: VecDeque::new(),
            challenges: ChallengeTable::new(CHALLENGE_TABLE_SIZE),
            parent: None,
            parent_candidates: Vec::new(),
            parent_round: ParentRound::Routers,
            selected_parent: None,
            previous_partition: None,
            merge_target: None,
            previous_router_id: None,
            router_id_pending: false,
            resync: config.resync,
            channel: config.channel,
            pan_id: config.pan_id,
            active_timestamp: config.active_timestamp.map(|s| Timestamp::new(s, 0)),
            pending_timestamp: config.pending_timestamp.map(|s| Timestamp::new(s, 0)),
            announce: None,
            timers: Timers::new(),
            trickle: Trickle::new(config.trickle_imin_ms, config.trickle_imax_ms),
            last_merge_advertisement_ms: None,
            transactions: HashMap::new(),
            events: VecDeque::new(),
            notifications: Vec::new(),
            config,
        };
        iface.bring_up();
        Ok(iface)
    }

    fn bring_up(&mut self) {
        self.mle.set_link_params(self.channel, self.pan_id);
        self.ipv6.add_address(link_local_from_mac64(&self.config.eui64), 64);
        let prefix = self.config.mesh_local_prefix_bytes();
        self.ipv6.add_address(address_from_iid(&prefix, &self.ml_eid_iid), 64);
        self.ipv6.add_multicast_group(LINK_LOCAL_ALL_NODES);
        self.ipv6.add_multicast_group(REALM_LOCAL_ALL_NODES);
        info!(
            "Interface {} up on channel {} pan {:#06x}",
            crate::config::format_eui64(&self.config.eui64),
            self.channel,
            self.pan_id
        );
    }

    /// Queue an event and process everything queued
    pub fn handle_event(&mut self, event: Event) {
        self.events.push_back(event);
        self.run();
    }

    /// Transport callback for a transaction that timed out. Returns whether
    /// the transport should send it again.
    pub fn on_transaction_timeout(
        &mut self,
        transaction: TransactionId,
        used_all_retries: bool,
    ) -> RetryDecision {
        let Some(kind) = self.transactions.get(&transaction).copied() else {
            return RetryDecision::GiveUp;
        };
        if !used_all_retries && kind != TxKind::ParentRequest {
            return RetryDecision::Retry;
        }
        self.transactions.remove(&transaction);
        debug!("Transaction {} ({:?}) gave up", transaction, kind);
        match kind {
            TxKind::ChildIdRequest => self.bootstrap(BootstrapEvent::ChildIdTimeout),
            TxKind::Resync => self.bootstrap(BootstrapEvent::ResyncFailed),
            TxKind::ChildUpdate => {
                if matches!(self.role, DeviceRole::Child | DeviceRole::Reed) {
                    warn!("Parent stopped answering child updates");
                    self.raise(ConnectionError::ParentConnectDown);
                }
            }
            TxKind::ParentRequest | TxKind::LinkRequest | TxKind::DataRequest => {}
        }
        self.run();
        RetryDecision::GiveUp
    }

    fn run(&mut self) {
        while let Some(event) = self.events.pop_front() {
            self.dispatch(event);
            self.process_pending_child_ids();
        }
    }

    fn dispatch(&mut self, event: Event) {
        match event {
            Event::Start => self.bootstrap(BootstrapEvent::Start),
            Event::Tick { now_ms } => self.on_tick(now_ms),
            Event::MleReceived { rx, message } => self.handle_mle(rx, message),
            Event::RouterIdResponse(response) => self.on_router_id_response(response),
            Event::RouterIdRequest {
                requester,
                requested,
            } => self.on_router_id_request(requester, requested),
            Event::RouterIdRelease { router_id } => self.on_router_id_release(router_id),
            Event::NetworkDataRegistration { rloc16, prefixes } => {
                self.on_network_data_registration(rloc16, prefixes)
            }
            Event::LocalNetworkDataChanged { prefixes } => {
                self.on_local_network_data_changed(prefixes)
            }
            Event::ConnectionError(error) => {
                self.bootstrap(BootstrapEvent::ConnectionError(error))
            }
        }
    }

    /// Drain notifications produced so far
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    /// Attach state
    pub fn state(&self) -> AttachState {
        self.state
    }

    /// Device role
    pub fn role(&self) -> DeviceRole {
        self.role
    }

    /// Short address
    pub fn rloc16(&self) -> u16 {
        self.rloc16
    }

    /// Extended address
    pub fn mac64(&self) -> [u8; 8] {
        self.config.eui64
    }

    /// Link-local address
    pub fn link_local_address(&self) -> Ipv6Addr {
        link_local_from_mac64(&self.config.eui64)
    }

    /// Leader Data of the partition
    pub fn leader_data(&self) -> Option<&LeaderData> {
        self.leader_data.as_ref()
    }

    /// Network data
    pub fn network_data(&self) -> &NetworkData {
        &self.network_data
    }

    /// Neighbor table
    pub fn neighbors(&self) -> &NeighborTable {
        &self.neighbors
    }

    /// Router table
    pub fn routers(&self) -> &RouterTable {
        &self.routers
    }

    /// Attached parent
    pub fn parent(&self) -> Option<&ParentInfo> {
        self.parent.as_ref()
    }

    /// Channel in use
    pub fn channel(&self) -> u16 {
        self.channel
    }

    /// PAN in use
    pub fn pan_id(&self) -> u16 {
        self.pan_id
    }

    /// Active timestamp of the stored configuration
    pub fn active_timestamp(&self) -> Option<Timestamp> {
        self.active_timestamp
    }

    /// Pending timestamp of the stored configuration
    pub fn pending_timestamp(&self) -> Option<Timestamp> {
        self.pending_timestamp
    }

    /// Dataset timestamps to advertise in data messages
    pub(crate) fn dataset_timestamps(&self) -> DatasetTimestamps {
        DatasetTimestamps {
            active: self.active_timestamp,
            pending: self.pending_timestamp,
        }
    }

    /// Record to persist for resynchronisation after a reset
    pub fn resync_record(&self) -> Option<&ResyncRecord> {
        self.resync.as_ref()
    }

    /// Configuration
    pub fn config(&self) -> &ThreadConfig {
        &self.config
    }

    /// Routes and addresses installed from network data
    pub fn derived(&self) -> &routes::Derivation {
        self.installed.current()
    }

    /// Number of attached children
    pub fn child_count(&self) -> usize {
        self.child_ids.len()
    }

    /// MLE transport
    pub fn mle(&self) -> &S {
        &self.mle
    }

    /// MLE transport, mutably
    pub fn mle_mut(&mut self) -> &mut S {
        &mut self.mle
    }

    /// IPv6 layer
    pub fn ipv6(&self) -> &I {
        &self.ipv6
    }

    /// Management client
    pub fn management(&self) -> &M {
        &self.mgmt
    }

    /// Management client, mutably
    pub fn management_mut(&mut self) -> &mut M {
        &mut self.mgmt
    }

    fn on_tick(&mut self, now_ms: u64) {
        if now_ms < self.now_ms {
            return;
        }
        self.now_ms = now_ms;
        let elapsed_secs = ((now_ms - self.last_second_ms) / 1000) as u32;
        if elapsed_secs > 0 {
            self.last_second_ms += elapsed_secs as u64 * 1000;
            for (index, entry) in self.neighbors.tick(elapsed_secs) {
                self.neighbor_expired(index, entry);
            }
        }
        self.challenges.expire(now_ms);
        for kind in self.timers.expired(now_ms) {
            self.on_timer(kind);
        }
    }

    fn on_timer(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::Scan => self.bootstrap(BootstrapEvent::ScanDone),
            TimerKind::ParentRequest => {
                let candidate_found = crate::state::select_parent(&self.parent_candidates).is_some();
                self.bootstrap(BootstrapEvent::ParentWindowExpired {
                    round: self.parent_round,
                    candidate_found,
                });
            }
            TimerKind::ChildIdResponse => self.bootstrap(BootstrapEvent::ChildIdTimeout),
            TimerKind::Resync => self.bootstrap(BootstrapEvent::ResyncFailed),
            TimerKind::ReedAdvertisement => self.reed_advertisement_timeout(),
            TimerKind::RouterAdvertisement => self.router_advertisement_timeout(),
            TimerKind::RouterSelection => self.router_selection(),
            TimerKind::ChildUpdate => self.child_keepalive(),
            TimerKind::OrphanBackoff => self.bootstrap(BootstrapEvent::Start),
        }
    }

    fn neighbor_expired(&mut self, index: NeighborIndex, entry: NeighborEntry) {
        self.mle.remove_device(index);
        self.neighbor_class.clear(index);
        if self.parent.is_some_and(|p| p.mac64 == entry.mac64) {
            warn!("Parent {:#06x} timed out", entry.mac16);
            self.raise(ConnectionError::ParentConnectDown);
        } else if let Some(router_id) = entry.router_id() {
            debug!("Router neighbor {} timed out", router_id);
            self.routers.neighbor_lost(router_id);
        } else if self.is_own_child(entry.mac16) {
            info!("Child {:#06x} timed out", entry.mac16);
            self.child_ids.release(child_id_from_rloc16(entry.mac16));
        }
    }

    /// Remove a neighbor along with its MAC and link-quality state
    pub(crate) fn remove_neighbor(&mut self, index: NeighborIndex) -> Option<NeighborEntry> {
        let entry = self.neighbors.remove(index)?;
        self.mle.remove_device(index);
        self.neighbor_class.clear(index);
        if self.is_own_child(entry.mac16) {
            self.child_ids.release(child_id_from_rloc16(entry.mac16));
        }
        Some(entry)
    }

    /// Reset a neighbor's lifetime after a valid message. Entries without a
    /// granted lifetime get the router link lifetime.
    pub(crate) fn refresh_neighbor(&mut self, index: NeighborIndex) {
        let lifetime = match self.neighbors.get(index) {
            Some(entry) if entry.link_lifetime > 0 => entry.link_lifetime,
            Some(_) => self.config.router_link_lifetime_secs,
            None => return,
        };
        self.neighbors.refresh(index, lifetime, self.now_ms);
    }

    /// Whether `rloc16` is a child of this router
    pub(crate) fn is_own_child(&self, rloc16: u16) -> bool {
        self.role.is_router()
            && !is_router_rloc16(rloc16)
            && rloc16 < thread_wire::RLOC16_UNASSIGNED
            && rloc16 & 0xfc00 == self.rloc16 & 0xfc00
    }

    /// Raise a connection error; handled after the current event
    pub(crate) fn raise(&mut self, error: ConnectionError) {
        self.events.push_back(Event::ConnectionError(error));
    }

    /// Queue an event behind the current one
    pub(crate) fn post(&mut self, event: Event) {
        self.events.push_back(event);
    }

    pub(crate) fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    pub(crate) fn bootstrap_context(&self) -> BootstrapContext {
        BootstrapContext {
            router_eligible: self.config.router_eligible,
            has_resync: self.resync.is_some(),
            had_partition: self.leader_data.is_some(),
            merge_target: self.merge_target,
            announce_active: self.announce.is_some(),
        }
    }

    /// Feed the attach state machine and carry out its actions
    pub(crate) fn bootstrap(&mut self, event: BootstrapEvent) {
        let ctx = self.bootstrap_context();
        let (next, actions) = transition(&ctx, self.state, event);
        if next == self.state && actions.is_empty() {
            debug!("Bootstrap event {:?} ignored in {}", event, self.state);
            return;
        }
        self.set_state(next);
        for action in actions {
            self.execute(action);
        }
    }

    pub(crate) fn set_state(&mut self, next: AttachState) {
        if next == self.state {
            return;
        }
        info!("Attach state {} -> {}", self.state, next);
        self.notify(Notification::StateChanged {
            from: self.state,
            to: next,
        });
        self.state = next;
    }

    pub(crate) fn set_role(&mut self, next: DeviceRole) {
        if next == self.role {
            return;
        }
        info!("Role {} -> {}", self.role, next);
        self.notify(Notification::RoleChanged {
            from: self.role,
            to: next,
        });
        if next.is_router() {
            self.ipv6.add_multicast_group(LINK_LOCAL_ALL_ROUTERS);
            self.ipv6.add_multicast_group(REALM_LOCAL_ALL_ROUTERS);
        }
        self.role = next;
    }

    /// Change the short address; the RLOC derived from the old one is purged
    pub(crate) fn set_rloc16(&mut self, rloc16: u16) {
        if rloc16 == self.rloc16 {
            return;
        }
        let prefix = self.config.mesh_local_prefix_bytes();
        if self.rloc16 < thread_wire::RLOC16_UNASSIGNED {
            self.ipv6.delete_address(rloc_address(&prefix, self.rloc16));
        }
        if rloc16 < thread_wire::RLOC16_UNASSIGNED {
            self.ipv6.add_address(rloc_address(&prefix, rloc16), 64);
        }
        info!("Short address {:#06x} -> {:#06x}", self.rloc16, rloc16);
        self.rloc16 = rloc16;
        self.mle.set_short_address(rloc16);
    }

    /// Partition state as the comparator sees it
    pub(crate) fn local_partition(&self) -> Option<LocalPartition> {
        Some(LocalPartition {
            leader_data: self.leader_data?,
            active_routers: self.routers.active_router_count(),
            ccm_target_weighting: self.config.ccm_target_weighting,
            previous: self.previous_partition,
            is_leader: self.role == DeviceRole::Leader,
        })
    }

    pub(crate) fn new_challenge(&mut self) -> [u8; 8] {
        let mut challenge = [0u8; 8];
        self.rng.fill(&mut challenge);
        challenge
    }

    pub(crate) fn next_frame_counter(&mut self) -> u32 {
        self.frame_counter = self.frame_counter.wrapping_add(1);
        self.frame_counter
    }

    /// Secure and send a built message. Builder errors are logged and the
    /// send is skipped.
    pub(crate) fn send(
        &mut self,
        destination: Ipv6Addr,
        built: Result<MessageBuilder, WireError>,
        retry: RetryPolicy,
        kind: Option<TxKind>,
    ) -> Option<TransactionId> {
        self.send_on(destination, built, retry, kind, None)
    }

    pub(crate) fn send_on(
        &mut self,
        destination: Ipv6Addr,
        built: Result<MessageBuilder, WireError>,
        retry: RetryPolicy,
        kind: Option<TxKind>,
        channel: Option<u16>,
    ) -> Option<TransactionId> {
        let builder = match built {
            Ok(builder) => builder,
            Err(e) => {
                warn!("Dropping outbound message: {}", e);
                return None;
            }
        };
        let frame_counter = self.next_frame_counter();
        let header = SecurityHeader::mle(self.config.key_sequence, frame_counter);
        let message = builder.security(header).build();
        let command = message.command;
        let outbound = OutboundMessage {
            destination,
            message,
            retry,
            channel,
        };
        match self.mle.send(outbound) {
            Ok(id) => {
                debug!("Sent {} to {} ({})", command, destination, id);
                if let Some(kind) = kind {
                    self.transactions.insert(id, kind);
                }
                Some(id)
            }
            Err(e) => {
                warn!("Sending {} to {} failed: {}", command, destination, e);
                None
            }
        }
    }

    /// Cancel every outstanding transaction of a kind
    pub(crate) fn cancel_transactions(&mut self, kind: TxKind) {
        let ids: Vec<TransactionId> = self
            .transactions
            .iter()
            .filter(|(_, k)| **k == kind)
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            self.transactions.remove(&id);
            self.mle.cancel(id);
        }
    }

    pub(crate) fn cancel_all_transactions(&mut self) {
        for (id, _) in std::mem::take(&mut self.transactions) {
            self.mle.cancel(id);
        }
    }

    /// Re-derive routes and SLAAC addresses from the stored network data
    pub(crate) fn apply_network_data(&mut self) {
        let iid = self.ml_eid_iid;
        let derived = routes::derive(&self.network_data.prefixes(), &iid, self.rloc16);
        self.installed.apply(&mut self.ipv6, derived);
    }

    /// Store network data received or assembled for `leader_data`
    pub(crate) fn store_network_data(&mut self, leader_data: LeaderData, network_data: NetworkData) {
        let changed = network_data != self.network_data;
        self.leader_data = Some(leader_data);
        self.network_data = network_data;
        if changed {
            debug!(
                "Network data version {}/{} ({} bytes)",
                leader_data.data_version,
                leader_data.stable_data_version,
                self.network_data.len()
            );
            self.apply_network_data();
        }
        self.notify(Notification::NetworkDataUpdated { leader_data });
    }

    /// Move to a heard partition: forget routes, caches and stale children
    pub(crate) fn adopt_partition(&mut self, heard: &LeaderData) {
        let changed = self
            .leader_data
            .map_or(true, |mine| !thread_topology::partition_match(&mine, heard));
        if changed {
            info!(
                "Adopting partition {:#010x} (weight {})",
                heard.partition_id, heard.weighting
            );
            self.routers.reset();
            self.ipv6.flush_caches();
            self.registrations.clear();
            let parent = self.selected_parent.as_ref().map(|p| p.mac64);
            let stale: Vec<NeighborIndex> = self
                .neighbors
                .iter()
                .filter(|(_, e)| !is_router_rloc16(e.mac16) && Some(e.mac64) != parent)
                .map(|(i, _)| i)
                .collect();
            for index in stale {
                self.remove_neighbor(index);
            }
            self.child_ids.clear();
        }
        let adopted = thread_topology::adopted_leader_data(heard);
        self.leader_data = Some(adopted);
        if changed {
            self.notify(Notification::PartitionChanged {
                leader_data: adopted,
            });
        }
    }

    pub(crate) fn queue_child_id(&mut self, request: PendingChildId) -> bool {
        self.pending_child_ids.retain(|p| p.mac64 != request.mac64);
        if self.pending_child_ids.len() >= MAX_PENDING_CHILD_IDS {
            return false;
        }
        self.pending_child_ids.push_back(request);
        true
    }
}
