//! Carrying out attach actions: parent requests, Child ID Requests, role
//! changes, resynchronisation and router-ID upgrades.

use super::{ThreadInterface, TxKind, LINK_LOCAL_ALL_NODES, LINK_LOCAL_ALL_ROUTERS, REQUEST_RETRY};
use crate::bootstrap::{BootstrapAction, BootstrapEvent, ParentRound};
use crate::builder;
use crate::collaborators::{Ipv6Stack, ManagementClient, MleService, RetryPolicy};
use crate::config::ResyncRecord;
use crate::event::{Event, Notification, RouterIdResponse};
use crate::router::{
    commissioner_pins, reed_upgrade_allowed, router_downgrade_allowed, DowngradeContext,
    UpgradeContext,
};
use crate::state::{select_parent, ChallengePurpose, DeviceRole};
use crate::timers::{jittered, TimerKind};
use rand::Rng;
use thread_topology::{NeighborIndex, PreviousPartition};
use thread_wire::{
    is_router_rloc16, link_local_from_mac64, rloc16_from_router_id, router_id_from_rloc16,
    AddressEntry, LeaderData, NetworkData, Route64, ScanMask, RLOC16_INVALID,
};
use tracing::{debug, info, warn};

impl<S, I, M> ThreadInterface<S, I, M>
where
    S: MleService,
    I: Ipv6Stack,
    M: ManagementClient,
{
    pub(crate) fn execute(&mut self, action: BootstrapAction) {
        use BootstrapAction as A;
        match action {
            A::NotifyConnectionError(error) => {
                warn!("Connection error {:?} in {}", error, self.state);
                self.notify(Notification::ConnectionError(error));
            }
            A::ResetState => self.reset_state(),
            A::Detach => self.detach(),
            A::RecordPreviousPartition => {
                if let Some(leader_data) = self.leader_data {
                    self.previous_partition = Some(PreviousPartition::from_leader_data(
                        &leader_data,
                        self.routers.id_sequence(),
                    ));
                }
            }
            A::SetMergeTarget(leader_data) => self.merge_target = Some(leader_data),
            A::ClearMergeTarget => self.merge_target = None,
            A::RememberRouterId => {
                self.previous_router_id = self.routers.local_router_id().or(self.previous_router_id);
            }
            A::ReleaseRouterId => self.release_router_id(),
            A::ForgetResync => self.resync = None,
            A::Restart => self.post(Event::Start),
            A::StartScanTimer => {
                let delay = self.rng.gen_range(0..=self.config.attach_jitter_ms);
                self.timers.start(TimerKind::Scan, self.now_ms, delay);
            }
            A::StartOrphanBackoff => {
                self.timers
                    .start(TimerKind::OrphanBackoff, self.now_ms, self.config.orphan_backoff_ms);
            }
            A::SendResync => self.send_resync(),
            A::SendParentRequest(round) => self.send_parent_request(round),
            A::SendChildIdRequest => self.send_child_id_request(),
            A::BecomeLeader => self.become_leader(),
            A::BecomeChild => self.become_child(),
            A::BecomeRouter => self.become_router(),
            A::RequestRouterId => self.request_router_id(),
            A::StartReedAdvertisement => self.start_reed_advertisement(),
            A::ApplyAnnounce => {
                if let Some(announce) = self.announce {
                    info!(
                        "Moving to announced channel {} pan {:#06x}",
                        announce.channel, announce.pan_id
                    );
                    self.set_link_params(announce.channel, announce.pan_id);
                }
            }
            A::RestoreLinkParams => {
                if let Some(announce) = self.announce.take() {
                    info!(
                        "Announced network not found, back to channel {}",
                        announce.original_channel
                    );
                    self.set_link_params(announce.original_channel, announce.original_pan_id);
                }
            }
            A::ClearPendingChildIds => {
                if !self.pending_child_ids.is_empty() {
                    debug!("Dropping {} queued child id requests", self.pending_child_ids.len());
                    self.pending_child_ids.clear();
                }
            }
        }
    }

    fn set_link_params(&mut self, channel: u16, pan_id: u16) {
        self.channel = channel;
        self.pan_id = pan_id;
        self.mle.set_link_params(channel, pan_id);
    }

    /// Leave the current role; partition data is kept
    pub(crate) fn detach(&mut self) {
        self.set_role(DeviceRole::Detached);
        self.parent = None;
        self.parent_candidates.clear();
        self.selected_parent = None;
        self.router_id_pending = false;
        for kind in [
            TimerKind::ParentRequest,
            TimerKind::ChildIdResponse,
            TimerKind::Resync,
            TimerKind::ReedAdvertisement,
            TimerKind::RouterAdvertisement,
            TimerKind::RouterSelection,
            TimerKind::ChildUpdate,
        ] {
            self.timers.stop(kind);
        }
        self.cancel_all_transactions();
    }

    /// Forget the partition and everything learned in it
    pub(crate) fn reset_state(&mut self) {
        self.detach();
        let indices: Vec<NeighborIndex> = self.neighbors.iter().map(|(i, _)| i).collect();
        for index in indices {
            self.remove_neighbor(index);
        }
        self.neighbor_class.clear_all();
        self.child_ids.clear();
        self.routers.reset();
        self.registrations.clear();
        self.leader_data = None;
        self.network_data = NetworkData::empty();
        self.network_data_requested = false;
        self.active_dataset_requested = false;
        self.pending_dataset_requested = false;
        self.merge_target = None;
        self.previous_partition = None;
        self.previous_router_id = None;
        self.challenges.clear();
        self.installed.clear(&mut self.ipv6);
        self.ipv6.flush_caches();
        self.set_rloc16(RLOC16_INVALID);
    }

    fn send_resync(&mut self) {
        let Some(record) = self.resync else {
            self.timers.start(TimerKind::Resync, self.now_ms, 0);
            return;
        };
        let challenge = self.new_challenge();
        let expires = self.now_ms + self.config.resync_timeout_ms;
        if is_router_rloc16(record.rloc16) {
            info!("Resynchronising as router {:#06x}", record.rloc16);
            self.challenges
                .record(challenge, None, ChallengePurpose::LinkRequest, expires);
            let built = builder::link_request(Some(record.rloc16), None, &challenge, true);
            self.send(LINK_LOCAL_ALL_ROUTERS, built, RetryPolicy::none(), Some(TxKind::Resync));
        } else if let Some(parent) = record.parent_mac64 {
            info!("Resynchronising as child {:#06x}", record.rloc16);
            self.challenges
                .record(challenge, Some(parent), ChallengePurpose::ChildUpdate, expires);
            let mode = self.config.device_mode();
            let built = builder::child_update_request(
                record.rloc16,
                mode,
                None,
                Some(&challenge),
                Some(self.config.child_timeout_secs),
                &[],
            );
            self.send(link_local_from_mac64(&parent), built, REQUEST_RETRY, Some(TxKind::Resync));
        } else {
            self.timers.start(TimerKind::Resync, self.now_ms, 0);
            return;
        }
        self.timers
            .start(TimerKind::Resync, self.now_ms, self.config.resync_timeout_ms);
    }

    fn send_parent_request(&mut self, round: ParentRound) {
        self.parent_round = round;
        self.parent_candidates.clear();
        let (mask, window) = match round {
            ParentRound::Routers => (ScanMask::ROUTERS, self.config.parent_request_routers_ms),
            ParentRound::RoutersAndReeds => (
                ScanMask::ROUTERS | ScanMask::END_DEVICES,
                self.config.parent_request_reeds_ms,
            ),
        };
        let challenge = self.new_challenge();
        self.challenges.record(
            challenge,
            None,
            ChallengePurpose::ParentRequest,
            self.now_ms + window,
        );
        debug!("Parent request {:?} in {}", round, self.state);
        let built = builder::parent_request(self.config.device_mode(), &challenge, mask);
        self.send(
            LINK_LOCAL_ALL_ROUTERS,
            built,
            RetryPolicy::none(),
            Some(TxKind::ParentRequest),
        );
        self.timers.start(TimerKind::ParentRequest, self.now_ms, window);
    }

    fn send_child_id_request(&mut self) {
        self.timers.stop(TimerKind::ParentRequest);
        self.cancel_transactions(TxKind::ParentRequest);
        let Some(parent) = select_parent(&self.parent_candidates).cloned() else {
            self.timers.start(TimerKind::ChildIdResponse, self.now_ms, 0);
            return;
        };
        info!(
            "Selected parent {:#06x} (lq {}, partition {:#010x})",
            parent.rloc16, parent.link_quality, parent.leader_data.partition_id
        );
        let mode = self.config.device_mode();
        let addresses = if mode.wants_full_network_data() && mode.is_ffd() {
            Vec::new()
        } else {
            vec![AddressEntry::Compressed {
                context_id: 0,
                iid: self.ml_eid_iid,
            }]
        };
        let frame_counter = self.frame_counter;
        let built = builder::child_id_request(&builder::ChildIdRequest {
            response: &parent.challenge,
            link_frame_counter: frame_counter,
            mle_frame_counter: frame_counter,
            mode,
            timeout_secs: self.config.child_timeout_secs,
            addresses: &addresses,
            timestamps: self.dataset_timestamps(),
        });
        self.send(
            link_local_from_mac64(&parent.mac64),
            built,
            REQUEST_RETRY,
            Some(TxKind::ChildIdRequest),
        );
        self.parent_candidates.clear();
        self.selected_parent = Some(parent);
        self.timers.start(
            TimerKind::ChildIdResponse,
            self.now_ms,
            self.config.challenge_timeout_ms,
        );
    }

    fn commit_announce(&mut self) {
        if let Some(announce) = self.announce.take() {
            self.active_timestamp = Some(announce.timestamp);
        }
    }

    fn become_child(&mut self) {
        self.timers.stop(TimerKind::ChildIdResponse);
        self.cancel_transactions(TxKind::ChildIdRequest);
        self.merge_target = None;
        self.commit_announce();
        let role = if self.config.router_eligible {
            DeviceRole::Reed
        } else {
            DeviceRole::Child
        };
        self.set_role(role);
        self.timers.start(
            TimerKind::ChildUpdate,
            self.now_ms,
            self.config.child_timeout_secs as u64 * 500,
        );
        if role == DeviceRole::Reed {
            self.start_reed_advertisement();
            self.start_router_selection();
        }
        if let Some(parent) = self.parent {
            self.resync = Some(ResyncRecord {
                rloc16: self.rloc16,
                parent_mac64: Some(parent.mac64),
            });
        }
        self.register_local_network_data();
    }

    fn become_router(&mut self) {
        self.merge_target = None;
        self.previous_router_id = None;
        self.commit_announce();
        self.parent = None;
        self.timers.stop(TimerKind::ChildUpdate);
        self.timers.stop(TimerKind::ReedAdvertisement);
        self.cancel_transactions(TxKind::ChildUpdate);
        let is_leader = self
            .leader_data
            .is_some_and(|ld| Some(ld.leader_router_id) == self.routers.local_router_id());
        self.set_role(if is_leader {
            DeviceRole::Leader
        } else {
            DeviceRole::Router
        });
        self.resync = Some(ResyncRecord {
            rloc16: self.rloc16,
            parent_mac64: None,
        });
        self.reset_trickle();
        self.start_router_selection();

        let challenge = self.new_challenge();
        self.challenges.record(
            challenge,
            None,
            ChallengePurpose::LinkRequest,
            self.now_ms + self.config.challenge_timeout_ms,
        );
        let built = builder::link_request(
            Some(self.rloc16),
            self.leader_data.as_ref(),
            &challenge,
            true,
        );
        self.send(
            LINK_LOCAL_ALL_ROUTERS,
            built,
            RetryPolicy::none(),
            Some(TxKind::LinkRequest),
        );
        self.register_local_network_data();
    }

    /// Form a singleton partition
    pub(crate) fn become_leader(&mut self) {
        self.routers.reset();
        let router_id = match self.routers.allocate(self.previous_router_id) {
            Ok(id) => id,
            Err(e) => {
                warn!("Cannot allocate own router id: {}", e);
                return;
            }
        };
        self.routers.set_local_router_id(Some(router_id));
        let indices: Vec<NeighborIndex> = self.neighbors.iter().map(|(i, _)| i).collect();
        for index in indices {
            self.remove_neighbor(index);
        }
        self.child_ids.clear();
        let leader_data = LeaderData {
            partition_id: self.rng.gen(),
            weighting: self.config.leader_weighting,
            data_version: self.rng.gen(),
            stable_data_version: self.rng.gen(),
            leader_router_id: router_id,
        };
        info!(
            "Forming partition {:#010x} as leader with router id {}",
            leader_data.partition_id, router_id
        );
        self.ipv6.flush_caches();
        self.leader_data = Some(leader_data);
        self.network_data = NetworkData::empty();
        self.merge_target = None;
        self.previous_router_id = None;
        self.commit_announce();
        self.set_rloc16(rloc16_from_router_id(router_id));
        self.registrations.clear();
        if !self.local_prefixes.is_empty() {
            self.registrations.insert(self.rloc16, self.local_prefixes.clone());
        }
        self.set_role(DeviceRole::Leader);
        self.notify(Notification::PartitionChanged { leader_data });
        self.rebuild_network_data();
        self.resync = Some(ResyncRecord {
            rloc16: self.rloc16,
            parent_mac64: None,
        });
        self.reset_trickle();
        self.start_router_selection();
    }

    /// Register our prefixes with the leader when attached below it
    pub(crate) fn register_local_network_data(&mut self) {
        if self.local_prefixes.is_empty() || self.role == DeviceRole::Leader {
            return;
        }
        if let Some(leader_data) = self.leader_data {
            let leader = rloc16_from_router_id(leader_data.leader_router_id);
            self.mgmt
                .network_data_register(leader, self.rloc16, &self.local_prefixes);
        }
    }

    fn request_router_id(&mut self) {
        if self.router_id_pending || self.role != DeviceRole::Reed {
            return;
        }
        let requested = self.previous_router_id;
        match self.mgmt.router_id_request(self.config.eui64, requested) {
            Ok(()) => {
                info!("Requesting router id (prefer {:?})", requested);
                self.router_id_pending = true;
            }
            Err(e) => {
                warn!("Router id request failed: {}", e);
                self.post(Event::RouterIdResponse(RouterIdResponse::Rejected));
            }
        }
    }

    pub(crate) fn on_router_id_response(&mut self, response: RouterIdResponse) {
        if self.role != DeviceRole::Reed {
            debug!("Router id response while {}, ignoring", self.role);
            return;
        }
        self.router_id_pending = false;
        match response {
            RouterIdResponse::Granted {
                partition_id,
                router_id,
                route,
            } => {
                if self.leader_data.map(|ld| ld.partition_id) != Some(partition_id) {
                    debug!("Router id grant from old partition {:#010x}", partition_id);
                    return;
                }
                self.routers.adopt_mask(&route);
                self.routers.set_local_router_id(Some(router_id));
                self.set_rloc16(rloc16_from_router_id(router_id));
                self.bootstrap(BootstrapEvent::RouterIdGranted);
            }
            RouterIdResponse::Rejected => {
                info!("Router id refused, staying REED");
                self.reject_pending_child_ids();
                self.bootstrap(BootstrapEvent::RouterIdDenied);
            }
        }
    }

    fn release_router_id(&mut self) {
        if let Some(router_id) = self.routers.local_router_id() {
            if self.role != DeviceRole::Leader {
                self.mgmt.router_id_release(self.config.eui64, router_id);
            }
            info!("Releasing router id {}", router_id);
            self.routers.set_local_router_id(None);
        }
        self.previous_router_id = None;
    }

    pub(crate) fn start_reed_advertisement(&mut self) {
        if self.role != DeviceRole::Reed {
            return;
        }
        let delay = jittered(
            &mut self.rng,
            self.config.reed_advertisement_interval_ms,
            self.config.reed_advertisement_jitter_ms,
        );
        self.timers
            .start(TimerKind::ReedAdvertisement, self.now_ms, delay);
    }

    pub(crate) fn reed_advertisement_timeout(&mut self) {
        if self.role != DeviceRole::Reed {
            return;
        }
        if let Some(leader_data) = self.leader_data {
            let built = builder::advertisement(self.rloc16, &leader_data, None);
            self.send(LINK_LOCAL_ALL_NODES, built, RetryPolicy::none(), None);
        }
        self.start_reed_advertisement();
    }

    fn start_router_selection(&mut self) {
        let delay = jittered(&mut self.rng, 1000, self.config.router_selection_jitter_ms);
        self.timers
            .start(TimerKind::RouterSelection, self.now_ms, delay);
    }

    /// Whether a REED may request a router ID now
    pub(crate) fn upgrade_allowed(&self) -> bool {
        reed_upgrade_allowed(&UpgradeContext {
            routing_permitted: self.config.router_eligible,
            is_router: self.role.is_router(),
            address_pinned: commissioner_pins(&self.network_data, self.rloc16),
            id_sequence_valid: self.routers.active_router_count() > 0,
            active_routers: self.routers.active_router_count(),
            upgrade_threshold: self.config.router_upgrade_threshold,
        })
    }

    /// Poll the upgrade and downgrade predicates
    pub(crate) fn router_selection(&mut self) {
        self.start_router_selection();
        match self.role {
            DeviceRole::Reed if self.state.is_connected() => {
                if self.upgrade_allowed() {
                    self.bootstrap(BootstrapEvent::UpgradeAllowed);
                }
            }
            DeviceRole::Router => {
                let qualities: Vec<u8> = self
                    .routers
                    .direct_links()
                    .map(|e| e.link_quality())
                    .collect();
                let ctx = DowngradeContext {
                    is_router: true,
                    is_leader: false,
                    active_routers: self.routers.active_router_count(),
                    downgrade_threshold: self.config.router_downgrade_threshold,
                    neighbor_link_qualities: &qualities,
                    sole_border_router: self.network_data.is_sole_border_router(self.rloc16),
                    child_count: self.child_ids.len(),
                };
                if router_downgrade_allowed(&ctx) {
                    info!("Enough routers around, downgrading");
                    self.bootstrap(BootstrapEvent::DowngradeAllowed);
                }
            }
            _ => {}
        }
    }

    /// Resume routing after a resync Link Accept. Fails when the heard
    /// router mask no longer holds our router ID.
    pub(crate) fn resume_router(&mut self, leader_data: &LeaderData, route: Option<&Route64>) -> bool {
        let Some(record) = self.resync else {
            return false;
        };
        let router_id = router_id_from_rloc16(record.rloc16);
        if route.is_some_and(|r| !r.is_allocated(router_id)) {
            info!("Router id {} was released while we were away", router_id);
            return false;
        }
        self.adopt_partition(leader_data);
        if let Some(route) = route {
            self.routers.adopt_mask(route);
        }
        self.routers.set_local_router_id(Some(router_id));
        self.set_rloc16(record.rloc16);
        true
    }
}
