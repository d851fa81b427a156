//! Leader duties and router advertisements: router-ID assignment, network
//! data assembly and distribution, trickle-driven advertisements.

use super::{ThreadInterface, LINK_LOCAL_ALL_NODES};
use crate::builder;
use crate::collaborators::{Ipv6Stack, ManagementClient, MleService, RetryPolicy};
use crate::event::RouterIdResponse;
use crate::router::merge_prefixes;
use crate::state::DeviceRole;
use crate::timers::TimerKind;
use thread_topology::MAX_ROUTE_COST;
use thread_wire::{link_local_from_mac64, Connectivity, LeaderData, NetworkData, PrefixEntry};
use tracing::{debug, info, warn};

impl<S, I, M> ThreadInterface<S, I, M>
where
    S: MleService,
    I: Ipv6Stack,
    M: ManagementClient,
{
    pub(crate) fn on_router_id_request(&mut self, requester: [u8; 8], requested: Option<u8>) {
        let response = match (self.role, self.leader_data) {
            (DeviceRole::Leader, Some(leader_data)) => match self.routers.allocate(requested) {
                Ok(router_id) => {
                    self.reset_trickle();
                    RouterIdResponse::Granted {
                        partition_id: leader_data.partition_id,
                        router_id,
                        route: self.routers.to_route64(),
                    }
                }
                Err(e) => {
                    info!("Router id request refused: {}", e);
                    RouterIdResponse::Rejected
                }
            },
            _ => {
                debug!("Router id request while {}", self.role);
                RouterIdResponse::Rejected
            }
        };
        self.mgmt.router_id_reply(requester, response);
    }

    pub(crate) fn on_router_id_release(&mut self, router_id: u8) {
        if self.role != DeviceRole::Leader || self.routers.local_router_id() == Some(router_id) {
            return;
        }
        if let Err(e) = self.routers.release(router_id) {
            warn!("Cannot release router id {}: {}", router_id, e);
            return;
        }
        self.registrations
            .retain(|rloc16, _| thread_wire::router_id_from_rloc16(*rloc16) != router_id);
        self.reset_trickle();
        self.rebuild_network_data();
    }

    pub(crate) fn on_network_data_registration(&mut self, rloc16: u16, prefixes: Vec<PrefixEntry>) {
        if self.role != DeviceRole::Leader {
            debug!("Network data registration from {:#06x} while {}", rloc16, self.role);
            return;
        }
        if prefixes.is_empty() {
            self.registrations.remove(&rloc16);
        } else {
            self.registrations.insert(rloc16, prefixes);
        }
        self.rebuild_network_data();
    }

    pub(crate) fn on_local_network_data_changed(&mut self, prefixes: Vec<PrefixEntry>) {
        self.local_prefixes = prefixes;
        match self.role {
            DeviceRole::Leader => {
                let own = self.local_prefixes.clone();
                self.on_network_data_registration(self.rloc16, own);
            }
            DeviceRole::Detached => {}
            _ => {
                if let Some(leader_data) = self.leader_data {
                    let leader = thread_wire::rloc16_from_router_id(leader_data.leader_router_id);
                    self.mgmt
                        .network_data_register(leader, self.rloc16, &self.local_prefixes);
                }
            }
        }
    }

    /// Reassemble network data from the registrations. Versions move only
    /// when the bytes change; the stable version only when the stable
    /// subset changes.
    pub(crate) fn rebuild_network_data(&mut self) {
        let Some(mut leader_data) = self.leader_data else {
            return;
        };
        let merged = merge_prefixes(self.registrations.values().map(Vec::as_slice));
        let network_data = match NetworkData::from_prefixes(&merged) {
            Ok(network_data) => network_data,
            Err(e) => {
                warn!("Network data does not fit: {}", e);
                return;
            }
        };
        if network_data == self.network_data {
            return;
        }
        leader_data.data_version = leader_data.data_version.wrapping_add(1);
        if network_data.stable_subset() != self.network_data.stable_subset() {
            leader_data.stable_data_version = leader_data.stable_data_version.wrapping_add(1);
        }
        info!(
            "Network data now version {}/{} with {} prefixes",
            leader_data.data_version,
            leader_data.stable_data_version,
            merged.len()
        );
        self.store_network_data(leader_data, network_data);
        self.propagate_network_data();
    }

    /// Send the current network data to all neighbors and each sleepy child
    pub(crate) fn propagate_network_data(&mut self) {
        let Some(leader_data) = self.leader_data else {
            return;
        };
        if !self.role.is_router() {
            return;
        }
        let built = builder::data_response(
            self.rloc16,
            &leader_data,
            &self.network_data,
            self.dataset_timestamps(),
        );
        self.send(LINK_LOCAL_ALL_NODES, built, RetryPolicy::none(), None);

        let stable = self.network_data.stable_subset();
        let sleepy: Vec<([u8; 8], bool)> = self
            .neighbors
            .iter()
            .filter(|(_, e)| !e.rx_on_idle && self.is_own_child(e.mac16))
            .map(|(i, e)| (e.mac64, self.neighbor_class.request_full_data(i)))
            .collect();
        for (mac64, full) in sleepy {
            let data = if full { &self.network_data } else { &stable };
            let built =
                builder::data_response(self.rloc16, &leader_data, data, self.dataset_timestamps());
            self.send(link_local_from_mac64(&mac64), built, RetryPolicy::none(), None);
        }
    }

    pub(crate) fn reset_trickle(&mut self) {
        let delay = self.trickle.reset(&mut self.rng);
        self.timers
            .start(TimerKind::RouterAdvertisement, self.now_ms, delay);
    }

    pub(crate) fn router_advertisement_timeout(&mut self) {
        if !self.role.is_router() {
            return;
        }
        self.send_router_advertisement();
        let delay = self.trickle.next(&mut self.rng);
        self.timers
            .start(TimerKind::RouterAdvertisement, self.now_ms, delay);
    }

    fn send_router_advertisement(&mut self) {
        if let Some(leader_data) = self.leader_data {
            let route = self.routers.to_route64();
            let built = builder::advertisement(self.rloc16, &leader_data, Some(&route));
            self.send(LINK_LOCAL_ALL_NODES, built, RetryPolicy::none(), None);
        }
    }

    /// Advertise our partition to a node of a weaker one, at most once per
    /// merge interval
    pub(crate) fn send_merge_advertisement(&mut self) {
        let due = self.last_merge_advertisement_ms.map_or(true, |last| {
            self.now_ms.saturating_sub(last) >= self.config.merge_advertisement_interval_ms
        });
        if !due {
            return;
        }
        self.last_merge_advertisement_ms = Some(self.now_ms);
        debug!("Advertising partition to a weaker one");
        self.send_router_advertisement();
    }

    /// Connectivity as reported in Parent Responses
    pub(crate) fn connectivity(&self, leader_data: &LeaderData) -> Connectivity {
        let mut counts = [0u8; 4];
        for entry in self.routers.direct_links() {
            let quality = entry.link_quality().min(3) as usize;
            counts[quality] = counts[quality].saturating_add(1);
        }
        let leader_cost = self
            .routers
            .cost_to(leader_data.leader_router_id)
            .unwrap_or(MAX_ROUTE_COST);
        Connectivity {
            parent_priority: 0,
            link_quality_3: counts[3],
            link_quality_2: counts[2],
            link_quality_1: counts[1],
            leader_cost,
            id_sequence: self.routers.id_sequence(),
            active_routers: self.routers.active_router_count(),
            sed_buffer_size: None,
            sed_datagram_count: None,
        }
    }
}
