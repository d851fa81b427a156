//! In-process mesh: interfaces over a broadcast radio and a management bus.
//!
//! Every interface gets its own [`RadioPort`], [`HostStack`] and
//! [`ManagementPort`]. The ports only queue; [`Simulation::step`] moves
//! frames between ports one tick later and forwards management exchanges
//! to the leader of the sender's partition.

use crate::config::{NodeSpec, RadioConfig, SimulationConfig};
use crate::{component_debug, component_info, component_warn};
use anyhow::Result;
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::net::Ipv6Addr;
use std::time::Duration;
use thread_mle::config::format_eui64;
use thread_mle::{
    DeviceRole, Event, Ipv6Stack, ManagementClient, MleError, MleService, Notification,
    OutboundMessage, RetryDecision, RouteKind, RouterIdResponse, RxInfo, ThreadInterface,
    TransactionId,
};
use thread_topology::NeighborIndex;
use thread_wire::{link_local_from_mac64, MleMessage, PrefixEntry, RLOC16_INVALID};

/// MLE transport of one simulated node
#[derive(Debug, Default)]
pub struct RadioPort {
    outbox: Vec<(TransactionId, OutboundMessage)>,
    cancelled: HashSet<TransactionId>,
    devices: Vec<(NeighborIndex, u16, [u8; 8])>,
    channel: u16,
    pan_id: u16,
    next: u32,
}

impl RadioPort {
    fn take_outbox(&mut self) -> Vec<(TransactionId, OutboundMessage)> {
        std::mem::take(&mut self.outbox)
    }

    fn take_cancelled(&mut self, transaction: TransactionId) -> bool {
        self.cancelled.remove(&transaction)
    }

    /// Neighbors in the MAC device table
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}

impl MleService for RadioPort {
    fn send(&mut self, message: OutboundMessage) -> Result<TransactionId, MleError> {
        self.next = self.next.wrapping_add(1);
        let id = TransactionId(self.next);
        self.outbox.push((id, message));
        Ok(id)
    }

    fn cancel(&mut self, transaction: TransactionId) {
        self.cancelled.insert(transaction);
    }

    fn update_device(&mut self, index: NeighborIndex, mac16: u16, mac64: [u8; 8], _frame_counter: u32) {
        match self.devices.iter_mut().find(|(i, ..)| *i == index) {
            Some(entry) => *entry = (index, mac16, mac64),
            None => self.devices.push((index, mac16, mac64)),
        }
    }

    fn remove_device(&mut self, index: NeighborIndex) {
        self.devices.retain(|(i, ..)| *i != index);
    }

    fn set_short_address(&mut self, rloc16: u16) {
        component_debug!("radio", "MAC short address {:#06x}", rloc16);
    }

    fn set_link_params(&mut self, channel: u16, pan_id: u16) {
        self.channel = channel;
        self.pan_id = pan_id;
    }
}

/// Installed route of a [`HostStack`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostRoute {
    pub prefix: [u8; 16],
    pub prefix_len: u8,
    pub next_hop: Option<u16>,
    pub kind: RouteKind,
}

/// Address and route tables of one simulated node
#[derive(Debug, Default)]
pub struct HostStack {
    addresses: BTreeSet<Ipv6Addr>,
    groups: BTreeSet<Ipv6Addr>,
    routes: Vec<HostRoute>,
}

impl HostStack {
    fn accepts(&self, destination: &Ipv6Addr) -> bool {
        self.addresses.contains(destination) || self.groups.contains(destination)
    }

    pub fn addresses(&self) -> impl Iterator<Item = &Ipv6Addr> {
        self.addresses.iter()
    }

    pub fn routes(&self) -> &[HostRoute] {
        &self.routes
    }
}

impl Ipv6Stack for HostStack {
    fn add_address(&mut self, address: Ipv6Addr, _prefix_len: u8) {
        self.addresses.insert(address);
    }

    fn delete_address(&mut self, address: Ipv6Addr) {
        self.addresses.remove(&address);
    }

    fn add_multicast_group(&mut self, group: Ipv6Addr) {
        self.groups.insert(group);
    }

    fn route_add(&mut self, prefix: [u8; 16], prefix_len: u8, next_hop: Option<u16>, kind: RouteKind) {
        self.route_remove(prefix, prefix_len, kind);
        self.routes.push(HostRoute {
            prefix,
            prefix_len,
            next_hop,
            kind,
        });
    }

    fn route_remove(&mut self, prefix: [u8; 16], prefix_len: u8, kind: RouteKind) {
        self.routes
            .retain(|r| !(r.prefix == prefix && r.prefix_len == prefix_len && r.kind == kind));
    }

    // no neighbor or destination cache to flush
    fn flush_caches(&mut self) {}
}

/// A management exchange waiting for the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagementRequest {
    RouterIdRequest {
        requester: [u8; 8],
        requested: Option<u8>,
    },
    RouterIdRelease {
        router_id: u8,
    },
    RouterIdReply {
        requester: [u8; 8],
        response: RouterIdResponse,
    },
    NetworkDataRegister {
        leader_rloc16: u16,
        rloc16: u16,
        prefixes: Vec<PrefixEntry>,
    },
}

/// Management client of one simulated node
#[derive(Debug, Default)]
pub struct ManagementPort {
    queue: Vec<ManagementRequest>,
}

impl ManagementPort {
    fn take(&mut self) -> Vec<ManagementRequest> {
        std::mem::take(&mut self.queue)
    }

    #[cfg(test)]
    fn push(&mut self, request: ManagementRequest) {
        self.queue.push(request);
    }
}

impl ManagementClient for ManagementPort {
    fn router_id_request(&mut self, requester: [u8; 8], requested: Option<u8>) -> Result<(), MleError> {
        self.queue.push(ManagementRequest::RouterIdRequest {
            requester,
            requested,
        });
        Ok(())
    }

    fn router_id_release(&mut self, _mac64: [u8; 8], router_id: u8) {
        self.queue.push(ManagementRequest::RouterIdRelease { router_id });
    }

    fn router_id_reply(&mut self, requester: [u8; 8], response: RouterIdResponse) {
        self.queue
            .push(ManagementRequest::RouterIdReply { requester, response });
    }

    fn network_data_register(&mut self, leader_rloc16: u16, rloc16: u16, prefixes: &[PrefixEntry]) {
        self.queue.push(ManagementRequest::NetworkDataRegister {
            leader_rloc16,
            rloc16,
            prefixes: prefixes.to_vec(),
        });
    }
}

pub type Interface = ThreadInterface<RadioPort, HostStack, ManagementPort>;

struct SimNode {
    name: String,
    iface: Interface,
    spec: NodeSpec,
    started: bool,
    announced_rloc16: u16,
}

struct Frame {
    from: usize,
    destination: Ipv6Addr,
    channel: u16,
    datagram: Bytes,
}

struct Pending {
    node: usize,
    transaction: TransactionId,
    message: OutboundMessage,
    retries_left: u8,
    due_ms: u64,
}

/// Counters of a run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SimStats {
    pub frames_sent: u64,
    pub frames_delivered: u64,
    pub frames_lost: u64,
    pub retransmissions: u64,
    pub management_forwarded: u64,
    pub management_dropped: u64,
}

/// One line of the topology report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeReport {
    pub name: String,
    pub role: DeviceRole,
    pub rloc16: u16,
    pub partition_id: Option<u32>,
    pub parent_rloc16: Option<u16>,
    pub children: usize,
    pub active_routers: usize,
    pub channel: u16,
    pub pan_id: u16,
    pub devices: usize,
}

/// Snapshot written by `--report`
#[derive(Debug, Clone, Serialize)]
pub struct TopologyReport {
    pub now_ms: u64,
    pub stats: SimStats,
    pub nodes: Vec<NodeReport>,
}

/// Simulated mesh
pub struct Simulation {
    nodes: Vec<SimNode>,
    radio: RadioConfig,
    rng: StdRng,
    now_ms: u64,
    tick_ms: u64,
    air: Vec<Frame>,
    pending: Vec<Pending>,
    stats: SimStats,
}

impl Simulation {
    pub fn new(config: &SimulationConfig) -> Result<Self> {
        let specs = config.node_specs();
        let mut nodes = Vec::with_capacity(specs.len());
        for (index, spec) in specs.into_iter().enumerate() {
            let iface_config = config.interface_config(index, &spec)?;
            let name = format_eui64(&iface_config.eui64);
            let iface = ThreadInterface::new(
                iface_config,
                RadioPort::default(),
                HostStack::default(),
                ManagementPort::default(),
            )?;
            nodes.push(SimNode {
                name,
                iface,
                spec,
                started: false,
                announced_rloc16: RLOC16_INVALID,
            });
        }
        component_info!("sim", "Simulation with {} nodes", nodes.len());
        Ok(Self {
            nodes,
            radio: config.radio.clone(),
            rng: StdRng::seed_from_u64(config.simulation.seed),
            now_ms: 0,
            tick_ms: config.simulation.tick.as_millis().max(1) as u64,
            air: Vec::new(),
            pending: Vec::new(),
            stats: SimStats::default(),
        })
    }

    /// Simulated time, milliseconds
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn stats(&self) -> SimStats {
        self.stats
    }

    pub fn interface(&self, index: usize) -> Option<&Interface> {
        self.nodes.get(index).map(|n| &n.iface)
    }

    /// Advance simulated time by one tick
    pub fn step(&mut self) {
        self.now_ms += self.tick_ms;
        let now_ms = self.now_ms;

        for node in &mut self.nodes {
            if !node.started && now_ms >= node.spec.start_delay.as_millis() as u64 {
                node.started = true;
                component_info!("sim", node = %node.name, "Starting");
                node.iface.handle_event(Event::Start);
            }
        }

        let frames = std::mem::take(&mut self.air);
        for frame in frames {
            self.deliver(frame);
        }

        for node in self.nodes.iter_mut().filter(|n| n.started) {
            node.iface.handle_event(Event::Tick { now_ms });
        }

        self.expire_transactions();
        self.collect();
        self.refresh_local_network_data();
        self.collect();
        self.log_notifications();
    }

    /// Advance until `duration` of simulated time has passed
    pub fn run_for(&mut self, duration: Duration) {
        let end = self.now_ms + duration.as_millis() as u64;
        while self.now_ms < end {
            self.step();
        }
    }

    fn deliver(&mut self, frame: Frame) {
        let message = match MleMessage::decode(&frame.datagram) {
            Ok(message) => message,
            Err(e) => {
                component_warn!("radio", "Undecodable frame: {}", e);
                return;
            }
        };
        let Some(sender) = self.nodes.get(frame.from) else {
            return;
        };
        let source = sender.iface.link_local_address();
        let origin = sender.spec.position;
        let link_frame_counter = message.security.as_ref().map_or(0, |s| s.frame_counter);

        for index in 0..self.nodes.len() {
            if index == frame.from {
                continue;
            }
            let node = &self.nodes[index];
            if !node.started || node.iface.mle().channel != frame.channel {
                continue;
            }
            if !addressed(&node.iface, &frame.destination) {
                continue;
            }
            let Some(rssi) = self.radio.rssi(origin, node.spec.position) else {
                continue;
            };
            if self.radio.loss > 0.0 && self.rng.gen_bool(self.radio.loss.min(1.0)) {
                self.stats.frames_lost += 1;
                continue;
            }
            self.stats.frames_delivered += 1;
            let rx = RxInfo {
                source,
                destination: frame.destination,
                rssi,
                link_frame_counter,
            };
            self.nodes[index].iface.handle_event(Event::MleReceived {
                rx,
                message: message.clone(),
            });
        }
    }

    fn expire_transactions(&mut self) {
        let now_ms = self.now_ms;
        let pending = std::mem::take(&mut self.pending);
        for mut entry in pending {
            let cancelled = self.nodes[entry.node]
                .iface
                .mle_mut()
                .take_cancelled(entry.transaction);
            if cancelled {
                continue;
            }
            if entry.due_ms > now_ms {
                self.pending.push(entry);
                continue;
            }
            let node = &mut self.nodes[entry.node];
            let decision = node
                .iface
                .on_transaction_timeout(entry.transaction, entry.retries_left == 0);
            if decision == RetryDecision::Retry && entry.retries_left > 0 {
                component_debug!("radio", node = %node.name, "Retransmitting {}", entry.transaction);
                entry.retries_left -= 1;
                entry.due_ms = now_ms + u64::from(entry.message.retry.timeout_ms);
                let channel = entry.message.channel.unwrap_or(node.iface.mle().channel);
                self.air.push(Frame {
                    from: entry.node,
                    destination: entry.message.destination,
                    channel,
                    datagram: entry.message.message.encode(),
                });
                self.stats.retransmissions += 1;
                self.pending.push(entry);
            }
        }
    }

    /// Drain every port until no management exchange is left
    fn collect(&mut self) {
        loop {
            let mut requests = Vec::new();
            for (index, node) in self.nodes.iter_mut().enumerate() {
                for (transaction, message) in node.iface.mle_mut().take_outbox() {
                    let channel = message.channel.unwrap_or(node.iface.mle().channel);
                    self.air.push(Frame {
                        from: index,
                        destination: message.destination,
                        channel,
                        datagram: message.message.encode(),
                    });
                    self.stats.frames_sent += 1;
                    if message.retry.timeout_ms > 0 {
                        self.pending.push(Pending {
                            node: index,
                            transaction,
                            retries_left: message.retry.retries,
                            due_ms: self.now_ms + u64::from(message.retry.timeout_ms),
                            message,
                        });
                    }
                }
                for request in node.iface.management_mut().take() {
                    requests.push((index, request));
                }
            }
            if requests.is_empty() {
                return;
            }
            for (from, request) in requests {
                self.route_management(from, request);
            }
        }
    }

    fn route_management(&mut self, from: usize, request: ManagementRequest) {
        let partition_id = self.nodes[from].iface.leader_data().map(|ld| ld.partition_id);
        let (target, event) = match request {
            ManagementRequest::RouterIdRequest {
                requester,
                requested,
            } => match self.leader_of(partition_id) {
                Some(leader) => (
                    leader,
                    Event::RouterIdRequest {
                        requester,
                        requested,
                    },
                ),
                None => (from, Event::RouterIdResponse(RouterIdResponse::Rejected)),
            },
            ManagementRequest::RouterIdRelease { router_id } => {
                let Some(leader) = self.leader_of(partition_id) else {
                    self.stats.management_dropped += 1;
                    return;
                };
                (leader, Event::RouterIdRelease { router_id })
            }
            ManagementRequest::RouterIdReply {
                requester,
                response,
            } => {
                let Some(node) = self.nodes.iter().position(|n| n.iface.mac64() == requester) else {
                    self.stats.management_dropped += 1;
                    return;
                };
                (node, Event::RouterIdResponse(response))
            }
            ManagementRequest::NetworkDataRegister {
                leader_rloc16,
                rloc16,
                prefixes,
            } => {
                let leader = self
                    .leader_of(partition_id)
                    .filter(|i| self.nodes[*i].iface.rloc16() == leader_rloc16);
                let Some(leader) = leader else {
                    self.stats.management_dropped += 1;
                    return;
                };
                (leader, Event::NetworkDataRegistration { rloc16, prefixes })
            }
        };
        self.stats.management_forwarded += 1;
        component_debug!(
            "bus",
            "{} -> {}: {:?}",
            self.nodes[from].name,
            self.nodes[target].name,
            event
        );
        self.nodes[target].iface.handle_event(event);
    }

    fn leader_of(&self, partition_id: Option<u32>) -> Option<usize> {
        let partition_id = partition_id?;
        self.nodes.iter().position(|n| {
            n.iface.role() == DeviceRole::Leader
                && n.iface.leader_data().map(|ld| ld.partition_id) == Some(partition_id)
        })
    }

    /// Re-register configured prefixes whenever a node's short address moves
    fn refresh_local_network_data(&mut self) {
        for node in &mut self.nodes {
            if node.spec.prefixes.is_empty() || node.iface.role() == DeviceRole::Detached {
                continue;
            }
            let rloc16 = node.iface.rloc16();
            if rloc16 == node.announced_rloc16 {
                continue;
            }
            node.announced_rloc16 = rloc16;
            let prefixes = node.spec.prefixes.iter().map(|p| p.to_entry(rloc16)).collect();
            node.iface
                .handle_event(Event::LocalNetworkDataChanged { prefixes });
        }
    }

    fn log_notifications(&mut self) {
        for node in &mut self.nodes {
            for notification in node.iface.take_notifications() {
                match notification {
                    Notification::RoleChanged { from, to } => {
                        component_info!("node", node = %node.name, "Role {} -> {}", from, to)
                    }
                    Notification::PartitionChanged { leader_data } => component_info!(
                        "node",
                        node = %node.name,
                        "Partition {:#010x} leader {}",
                        leader_data.partition_id,
                        leader_data.leader_router_id
                    ),
                    Notification::ConnectionError(error) => {
                        component_warn!("node", node = %node.name, "Connection error {:?}", error)
                    }
                    Notification::StateChanged { from, to } => {
                        component_debug!("node", node = %node.name, "State {} -> {}", from, to)
                    }
                    Notification::NetworkDataUpdated { leader_data } => component_debug!(
                        "node",
                        node = %node.name,
                        "Network data version {}/{}",
                        leader_data.data_version,
                        leader_data.stable_data_version
                    ),
                }
            }
        }
    }

    pub fn topology(&self) -> TopologyReport {
        TopologyReport {
            now_ms: self.now_ms,
            stats: self.stats,
            nodes: self.report(),
        }
    }

    /// Current topology, one entry per node
    pub fn report(&self) -> Vec<NodeReport> {
        self.nodes
            .iter()
            .map(|n| NodeReport {
                name: n.name.clone(),
                role: n.iface.role(),
                rloc16: n.iface.rloc16(),
                partition_id: n.iface.leader_data().map(|ld| ld.partition_id),
                parent_rloc16: n.iface.parent().map(|p| p.rloc16),
                children: n.iface.child_count(),
                active_routers: usize::from(n.iface.routers().active_router_count()),
                channel: n.iface.mle().channel,
                pan_id: n.iface.mle().pan_id,
                devices: n.iface.mle().device_count(),
            })
            .collect()
    }
}

fn addressed(iface: &Interface, destination: &Ipv6Addr) -> bool {
    let octets = destination.octets();
    let all_routers = octets[0] == 0xff && octets[15] == 0x02 && octets[2..15].iter().all(|b| *b == 0);
    iface.ipv6().accepts(destination)
        || (all_routers && iface.config().router_eligible)
        || *destination == link_local_from_mac64(&iface.mac64())
}

impl RadioConfig {
    /// Received strength between two positions, `None` when out of range
    fn rssi(&self, from: Option<(f32, f32)>, to: Option<(f32, f32)>) -> Option<i8> {
        let distance = match (from, to) {
            (Some((x1, y1)), Some((x2, y2))) => ((x1 - x2).powi(2) + (y1 - y2).powi(2)).sqrt(),
            _ => 0.0,
        };
        let rssi = f32::from(self.rssi_dbm) - distance * self.attenuation_db;
        if rssi < f32::from(self.sensitivity_dbm) {
            return None;
        }
        Some(rssi.clamp(f32::from(i8::MIN), f32::from(i8::MAX)) as i8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PrefixSpec, RunConfig};

    fn line_config(count: usize, spacing_ms: u64) -> SimulationConfig {
        let mut config = SimulationConfig {
            simulation: RunConfig {
                tick: Duration::from_millis(50),
                seed: 3,
                ..RunConfig::default()
            },
            ..SimulationConfig::default()
        };
        config.interface.router_selection_jitter_ms = 500;
        config.nodes = (0..count)
            .map(|i| NodeSpec {
                position: Some((i as f32, 0.0)),
                start_delay: Duration::from_millis(i as u64 * spacing_ms),
                ..NodeSpec::default()
            })
            .collect();
        config
    }

    #[test]
    fn test_rssi_model() {
        let radio = RadioConfig::default();
        assert_eq!(radio.rssi(None, None), Some(-40));
        assert_eq!(radio.rssi(Some((0.0, 0.0)), Some((1.0, 0.0))), Some(-52));
        assert_eq!(radio.rssi(Some((0.0, 0.0)), Some((10.0, 0.0))), None);
    }

    #[test]
    fn test_lone_node_becomes_leader() {
        let mut sim = Simulation::new(&line_config(1, 0)).unwrap();
        sim.run_for(Duration::from_secs(10));
        let report = sim.report();
        assert_eq!(report[0].role, DeviceRole::Leader);
        assert!(report[0].partition_id.is_some());
        assert!(sim.stats().frames_sent > 0);
    }

    #[test]
    fn test_staggered_nodes_share_one_partition() {
        let mut sim = Simulation::new(&line_config(3, 5000)).unwrap();
        sim.run_for(Duration::from_secs(40));
        let report = sim.report();

        assert!(report.iter().all(|n| n.role != DeviceRole::Detached));
        let leaders = report.iter().filter(|n| n.role == DeviceRole::Leader).count();
        assert_eq!(leaders, 1);
        let partitions: BTreeSet<_> = report.iter().filter_map(|n| n.partition_id).collect();
        assert_eq!(partitions.len(), 1);
        assert!(sim.stats().frames_delivered > 0);
    }

    #[test]
    fn test_router_id_request_reaches_leader() {
        let mut sim = Simulation::new(&line_config(2, 5000)).unwrap();
        sim.run_for(Duration::from_secs(20));
        assert_eq!(sim.report()[0].role, DeviceRole::Leader);
        assert_eq!(sim.report()[0].partition_id, sim.report()[1].partition_id);

        let before = sim.stats().management_forwarded;
        let requester = sim.nodes[1].iface.mac64();
        sim.nodes[1]
            .iface
            .management_mut()
            .push(ManagementRequest::RouterIdRequest {
                requester,
                requested: None,
            });
        sim.collect();

        // request to the leader, reply back to the requester
        assert!(sim.stats().management_forwarded >= before + 2);
        assert!(sim.interface(0).unwrap().routers().active_router_count() >= 1);
    }

    #[test]
    fn test_release_without_leader_is_dropped() {
        let mut sim = Simulation::new(&line_config(1, 0)).unwrap();
        sim.route_management(0, ManagementRequest::RouterIdRelease { router_id: 3 });
        assert_eq!(sim.stats().management_dropped, 1);
        assert_eq!(sim.stats().management_forwarded, 0);
    }

    #[test]
    fn test_border_router_prefix_reaches_network_data() {
        let mut config = line_config(2, 5000);
        config.nodes[1].prefixes.push(PrefixSpec {
            prefix: "fd00:1::".parse().unwrap(),
            length: 64,
            stable: true,
            slaac: true,
            default_route: true,
            external_route: false,
        });
        let mut sim = Simulation::new(&config).unwrap();
        sim.run_for(Duration::from_secs(30));

        let leader = sim.nodes[0].iface.network_data().prefixes();
        assert!(
            leader.iter().any(|p| p.prefix_length == 64 && p.prefix[..4] == [0xfd, 0, 0, 1]),
            "leader network data carries the registered prefix"
        );
    }
}
