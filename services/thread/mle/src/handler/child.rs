use super::Inbound;
use crate::bootstrap::BootstrapEvent;
use crate::builder;
use crate::collaborators::{Ipv6Stack, ManagementClient, MleService, RetryPolicy};
use crate::interface::{ThreadInterface, TxKind};
use crate::state::{AttachState, ChallengePurpose, DeviceRole, ParentInfo, PendingChildId};
use crate::timers::TimerKind;
use bytes::Bytes;
use thread_topology::partition_match;
use thread_wire::address::read_registration;
use thread_wire::{
    is_greater_u8, link_local_from_mac64, tlv, AddressEntry, DeviceMode, LeaderData, NetworkData,
    Route64, Timestamp, TlvType,
};
use tracing::{debug, info, warn};

impl<S, I, M> ThreadInterface<S, I, M>
where
    S: MleService,
    I: Ipv6Stack,
    M: ManagementClient,
{
    pub(crate) fn on_child_id_request(&mut self, msg: &Inbound<'_>) {
        let reed = self.role == DeviceRole::Reed;
        if !self.state.is_connected() || (!self.role.is_router() && !reed) {
            return;
        }
        let Some(response) = tlv::find(msg.tlvs, TlvType::Response) else {
            return;
        };
        if self.challenges.take(response, &msg.mac64, self.now_ms)
            != Some(ChallengePurpose::ParentResponse)
        {
            debug!("Child id request without a matching parent response");
            return;
        }
        let (Some(mode), Some(timeout_secs)) = (
            DeviceMode::read(msg.tlvs),
            tlv::read_u32(msg.tlvs, TlvType::Timeout),
        ) else {
            debug!("Child id request missing mandatory TLVs");
            return;
        };
        if reed && !self.upgrade_allowed() {
            info!("Child id request as REED while no upgrade is allowed");
            self.reject_child(&msg.mac64);
            return;
        }
        let requested_tlvs = tlv::find(msg.tlvs, TlvType::TlvRequest)
            .map(|raw| {
                raw.iter()
                    .filter_map(|b| TlvType::try_from(*b).ok())
                    .collect()
            })
            .unwrap_or_default();
        let request = PendingChildId {
            mac64: msg.mac64,
            mode,
            timeout_secs,
            link_frame_counter: tlv::read_u32(msg.tlvs, TlvType::LinkLayerFrameCounter)
                .unwrap_or(msg.rx.link_frame_counter),
            mle_frame_counter: tlv::read_u32(msg.tlvs, TlvType::MleFrameCounter)
                .unwrap_or(msg.mle_frame_counter),
            requested_tlvs,
            addresses: read_registration(msg.tlvs).unwrap_or_default(),
            active_timestamp: Timestamp::read(msg.tlvs, TlvType::ActiveTimestamp),
            pending_timestamp: Timestamp::read(msg.tlvs, TlvType::PendingTimestamp),
            link_margin: msg.link_margin,
        };
        if !self.queue_child_id(request) {
            warn!("Too many child id requests queued");
            self.reject_child(&msg.mac64);
            return;
        }
        if reed {
            info!("Child id request as REED, asking for a router id");
            self.bootstrap(BootstrapEvent::UpgradeAllowed);
        }
    }

    pub(crate) fn on_child_id_response(&mut self, msg: &Inbound<'_>) {
        if self.state != AttachState::ChildIdRequest {
            return;
        }
        let Some(selected) = self.selected_parent.clone() else {
            return;
        };
        if selected.mac64 != msg.mac64 {
            debug!("Child id response from an unselected parent");
            return;
        }
        let (Some(source), Some(heard), Some(address16), Some(raw)) = (
            tlv::read_u16(msg.tlvs, TlvType::SourceAddress),
            LeaderData::read(msg.tlvs),
            tlv::read_u16(msg.tlvs, TlvType::Address16),
            tlv::find(msg.tlvs, TlvType::NetworkData),
        ) else {
            debug!("Child id response missing mandatory TLVs");
            return;
        };
        let network_data = NetworkData::new(Bytes::copy_from_slice(raw));
        if let Err(e) = network_data.validate() {
            debug!("Child id response with bad network data: {}", e);
            return;
        }
        let route = Route64::read(msg.tlvs);

        self.adopt_partition(&heard);
        let Some((index, created)) = self.neighbors.allocate_or_get(msg.mac64, true) else {
            warn!("No neighbor slot for the parent");
            return;
        };
        if let Some(entry) = self.neighbors.get_mut(index) {
            entry.mac16 = source;
            entry.set_mode(DeviceMode::router());
            entry.link_frame_counter = selected.link_frame_counter;
            entry.mle_frame_counter = selected.mle_frame_counter;
            entry.connected_device = true;
        }
        self.neighbors
            .refresh(index, self.config.child_timeout_secs, self.now_ms);
        self.neighbor_class
            .update_link(index, selected.link_margin, created);
        self.mle
            .update_device(index, source, msg.mac64, selected.link_frame_counter);

        self.set_rloc16(address16);
        self.parent = Some(ParentInfo {
            mac64: msg.mac64,
            rloc16: source,
        });
        self.selected_parent = None;
        if self.config.device_mode().is_ffd() {
            if let Some(route) = &route {
                self.routers.adopt_mask(route);
            }
        }
        if self.announce.is_none() {
            if let Some(ts) = Timestamp::read(msg.tlvs, TlvType::ActiveTimestamp) {
                if self.active_timestamp.map_or(true, |mine| ts > mine) {
                    self.active_timestamp = Some(ts);
                }
            }
        }
        if let Some(ts) = Timestamp::read(msg.tlvs, TlvType::PendingTimestamp) {
            if self.pending_timestamp.map_or(true, |mine| ts > mine) {
                self.pending_timestamp = Some(ts);
            }
        }
        self.store_network_data(heard, network_data);
        info!("Attached to parent {:#06x} as {:#06x}", source, address16);
        self.bootstrap(BootstrapEvent::ChildIdAccepted);
    }

    pub(crate) fn on_child_update_request(&mut self, msg: &Inbound<'_>) {
        let challenge = tlv::read_bounded(msg.tlvs, TlvType::Challenge, 4, 8);
        let from_parent = self.parent.is_some_and(|p| p.mac64 == msg.mac64);

        if matches!(self.role, DeviceRole::Child | DeviceRole::Reed) {
            if !from_parent {
                return;
            }
            self.refresh_parent();
            if let (Some(heard), Some(mine)) = (LeaderData::read(msg.tlvs), self.leader_data) {
                if !partition_match(&mine, &heard)
                    || is_greater_u8(heard.data_version, mine.data_version)
                {
                    self.request_network_data(msg.mac64);
                }
            }
            let addresses = self.registered_addresses();
            let built = builder::child_update_response(
                self.rloc16,
                self.config.device_mode(),
                challenge,
                None,
                Some(self.config.child_timeout_secs),
                &addresses,
            );
            self.send(
                link_local_from_mac64(&msg.mac64),
                built,
                RetryPolicy::none(),
                None,
            );
            return;
        }

        if !self.role.is_router() {
            return;
        }
        let Some(leader_data) = self.leader_data else {
            return;
        };
        let child = self
            .neighbors
            .find_by_mac64(&msg.mac64)
            .filter(|i| self.neighbors.get(*i).is_some_and(|e| self.is_own_child(e.mac16)));
        let Some(index) = child else {
            debug!("Child update request from a stranger");
            self.send(
                link_local_from_mac64(&msg.mac64),
                builder::link_reject(),
                RetryPolicy::none(),
                None,
            );
            return;
        };
        let mode = DeviceMode::read(msg.tlvs);
        let timeout = tlv::read_u32(msg.tlvs, TlvType::Timeout);
        let addresses = read_registration(msg.tlvs).unwrap_or_default();
        let (rloc16, lifetime) = match self.neighbors.get_mut(index) {
            Some(entry) => {
                if let Some(mode) = mode {
                    entry.set_mode(mode);
                }
                (entry.mac16, timeout.unwrap_or(entry.link_lifetime))
            }
            None => return,
        };
        if let Some(mode) = mode {
            self.neighbor_class
                .set_request_full_data(index, mode.wants_full_network_data());
        }
        if let Some(AddressEntry::Compressed { iid, .. }) = addresses.first() {
            self.neighbor_class.set_ml_eid(index, *iid);
        }
        self.neighbors.refresh(index, lifetime, self.now_ms);
        self.neighbor_class.update_link(index, msg.link_margin, false);

        let child_mode = mode.unwrap_or(DeviceMode::empty());
        let built = builder::child_update_response(
            rloc16,
            child_mode,
            challenge,
            Some(&leader_data),
            Some(lifetime),
            &addresses,
        );
        self.send(
            link_local_from_mac64(&msg.mac64),
            built,
            RetryPolicy::none(),
            None,
        );
    }

    pub(crate) fn on_child_update_response(&mut self, msg: &Inbound<'_>) {
        if let Some(response) = tlv::find(msg.tlvs, TlvType::Response) {
            if self.challenges.take(response, &msg.mac64, self.now_ms)
                != Some(ChallengePurpose::ChildUpdate)
            {
                debug!("Child update response with unknown response");
                return;
            }
        } else if self.state == AttachState::MleSynch {
            return;
        }

        if self.state == AttachState::MleSynch {
            self.child_resync_done(msg);
            return;
        }
        if !self.parent.is_some_and(|p| p.mac64 == msg.mac64) {
            return;
        }
        self.cancel_transactions(TxKind::ChildUpdate);
        self.refresh_parent();
        if let (Some(heard), Some(mine)) = (LeaderData::read(msg.tlvs), self.leader_data) {
            if !partition_match(&mine, &heard)
                || is_greater_u8(heard.data_version, mine.data_version)
                || is_greater_u8(heard.stable_data_version, mine.stable_data_version)
            {
                self.request_network_data(msg.mac64);
            }
        }
    }

    fn child_resync_done(&mut self, msg: &Inbound<'_>) {
        let Some(record) = self.resync else {
            return;
        };
        if record.parent_mac64 != Some(msg.mac64) {
            return;
        }
        let (Some(source), Some(heard)) = (
            tlv::read_u16(msg.tlvs, TlvType::SourceAddress),
            LeaderData::read(msg.tlvs),
        ) else {
            return;
        };
        self.timers.stop(TimerKind::Resync);
        self.cancel_transactions(TxKind::Resync);
        self.adopt_partition(&heard);
        let Some((index, created)) = self.neighbors.allocate_or_get(msg.mac64, true) else {
            return;
        };
        let link_frame_counter = msg.rx.link_frame_counter;
        if let Some(entry) = self.neighbors.get_mut(index) {
            entry.mac16 = source;
            entry.set_mode(DeviceMode::router());
            entry.link_frame_counter = link_frame_counter;
            entry.mle_frame_counter = msg.mle_frame_counter;
            entry.connected_device = true;
        }
        self.neighbors
            .refresh(index, self.config.child_timeout_secs, self.now_ms);
        self.neighbor_class.update_link(index, msg.link_margin, created);
        self.mle
            .update_device(index, source, msg.mac64, link_frame_counter);
        self.set_rloc16(record.rloc16);
        self.parent = Some(ParentInfo {
            mac64: msg.mac64,
            rloc16: source,
        });
        info!("Resynchronised with parent {:#06x}", source);
        self.request_network_data(msg.mac64);
        self.bootstrap(BootstrapEvent::ResyncSucceeded { as_router: false });
    }

    pub(crate) fn refresh_parent(&mut self) {
        let Some(parent) = self.parent else {
            return;
        };
        if let Some(index) = self.neighbors.find_by_mac64(&parent.mac64) {
            self.neighbors
                .refresh(index, self.config.child_timeout_secs, self.now_ms);
        }
    }

    fn registered_addresses(&self) -> Vec<AddressEntry> {
        let mode = self.config.device_mode();
        if mode.is_ffd() && mode.wants_full_network_data() {
            Vec::new()
        } else {
            vec![AddressEntry::Compressed {
                context_id: 0,
                iid: self.ml_eid_iid,
            }]
        }
    }
}
