use super::Inbound;
use crate::bootstrap::BootstrapEvent;
use crate::builder;
use crate::collaborators::{Ipv6Stack, ManagementClient, MleService, RetryPolicy};
use crate::event::ConnectionError;
use crate::interface::{ThreadInterface, TxKind};
use crate::state::{AttachState, ChallengePurpose};
use thread_topology::partition_match;
use thread_wire::{
    is_router_rloc16, link_local_from_mac64, router_id_from_rloc16, tlv, DeviceMode, LeaderData,
    Route64, TlvType,
};
use tracing::{debug, info, warn};

impl<S, I, M> ThreadInterface<S, I, M>
where
    S: MleService,
    I: Ipv6Stack,
    M: ManagementClient,
{
    pub(crate) fn on_link_request(&mut self, msg: &Inbound<'_>) {
        if !self.role.is_router() {
            return;
        }
        let Some(leader_data) = self.leader_data else {
            return;
        };
        let Some(challenge) = tlv::read_bounded(msg.tlvs, TlvType::Challenge, 4, 8) else {
            debug!("Link request without challenge");
            return;
        };
        if let Some(heard) = LeaderData::read(msg.tlvs) {
            if !partition_match(&leader_data, &heard) {
                debug!("Link request from partition {:#010x}", heard.partition_id);
                return;
            }
        }
        let source = tlv::read_u16(msg.tlvs, TlvType::SourceAddress);
        let wants_route = tlv::find(msg.tlvs, TlvType::TlvRequest)
            .is_some_and(|raw| raw.contains(&(TlvType::Route64 as u8)));

        let Some((index, created)) = self.neighbors.allocate_or_get(msg.mac64, true) else {
            warn!("Neighbor table full, rejecting link");
            self.send(
                link_local_from_mac64(&msg.mac64),
                builder::link_reject(),
                RetryPolicy::none(),
                None,
            );
            return;
        };
        let mut connected = false;
        if let Some(entry) = self.neighbors.get_mut(index) {
            if let Some(source) = source.filter(|s| is_router_rloc16(*s)) {
                entry.mac16 = source;
                entry.set_mode(DeviceMode::router());
            }
            connected = entry.connected_device;
        }
        self.neighbors
            .refresh(index, self.config.router_link_lifetime_secs, self.now_ms);
        self.neighbor_class.update_link(index, msg.link_margin, created);

        let ours = (!connected).then(|| self.new_challenge());
        if let Some(ours) = ours {
            self.challenges.record(
                ours,
                Some(msg.mac64),
                ChallengePurpose::LinkRequest,
                self.now_ms + self.config.challenge_timeout_ms,
            );
        }
        let route = wants_route.then(|| self.routers.to_route64());
        let built = builder::link_accept(&builder::LinkAccept {
            response: challenge,
            challenge: ours.as_ref(),
            source: self.rloc16,
            leader_data: &leader_data,
            link_frame_counter: self.frame_counter,
            mle_frame_counter: self.frame_counter,
            link_margin: msg.link_margin,
            route: route.as_ref(),
        });
        self.send(
            link_local_from_mac64(&msg.mac64),
            built,
            RetryPolicy::none(),
            None,
        );
    }

    pub(crate) fn on_link_accept(&mut self, msg: &Inbound<'_>, and_request: bool) {
        let Some(response) = tlv::find(msg.tlvs, TlvType::Response) else {
            return;
        };
        if self.challenges.take(response, &msg.mac64, self.now_ms)
            != Some(ChallengePurpose::LinkRequest)
        {
            debug!("Link accept with unknown response");
            return;
        }
        let (Some(source), Some(heard)) = (
            tlv::read_u16(msg.tlvs, TlvType::SourceAddress),
            LeaderData::read(msg.tlvs),
        ) else {
            return;
        };
        let route = Route64::read(msg.tlvs);

        if self.state == AttachState::MleSynch {
            if !self.resync.is_some_and(|r| is_router_rloc16(r.rloc16)) {
                return;
            }
            self.timers.stop(crate::timers::TimerKind::Resync);
            self.cancel_transactions(TxKind::Resync);
            if !self.resume_router(&heard, route.as_ref()) {
                self.bootstrap(BootstrapEvent::ResyncFailed);
                return;
            }
            info!("Resynchronised as router {:#06x}", self.rloc16);
            self.link_established(msg, source, route.as_ref());
            self.bootstrap(BootstrapEvent::ResyncSucceeded { as_router: true });
            self.request_network_data(msg.mac64);
            return;
        }

        if !self.role.is_router() {
            return;
        }
        if self.leader_data.is_some_and(|mine| !partition_match(&mine, &heard)) {
            debug!("Link accept from partition {:#010x}", heard.partition_id);
            return;
        }
        self.link_established(msg, source, route.as_ref());

        if and_request {
            let Some(challenge) = tlv::read_bounded(msg.tlvs, TlvType::Challenge, 4, 8) else {
                return;
            };
            let Some(leader_data) = self.leader_data else {
                return;
            };
            let built = builder::link_accept(&builder::LinkAccept {
                response: challenge,
                challenge: None,
                source: self.rloc16,
                leader_data: &leader_data,
                link_frame_counter: self.frame_counter,
                mle_frame_counter: self.frame_counter,
                link_margin: msg.link_margin,
                route: None,
            });
            self.send(
                link_local_from_mac64(&msg.mac64),
                built,
                RetryPolicy::none(),
                None,
            );
        }
    }

    /// Record a verified two-way link with a router
    fn link_established(&mut self, msg: &Inbound<'_>, source: u16, route: Option<&Route64>) {
        let Some((index, created)) = self.neighbors.allocate_or_get(msg.mac64, true) else {
            warn!("Neighbor table full, dropping link with {:#06x}", source);
            return;
        };
        let link_frame_counter = tlv::read_u32(msg.tlvs, TlvType::LinkLayerFrameCounter)
            .unwrap_or(msg.rx.link_frame_counter);
        let mle_frame_counter =
            tlv::read_u32(msg.tlvs, TlvType::MleFrameCounter).unwrap_or(msg.mle_frame_counter);
        if let Some(entry) = self.neighbors.get_mut(index) {
            entry.mac16 = source;
            if is_router_rloc16(source) {
                entry.set_mode(DeviceMode::router());
            }
            entry.link_frame_counter = link_frame_counter;
            entry.mle_frame_counter = mle_frame_counter;
            entry.connected_device = is_router_rloc16(source);
        }
        self.neighbors
            .refresh(index, self.config.router_link_lifetime_secs, self.now_ms);
        self.neighbor_class.update_link(index, msg.link_margin, created);
        self.mle
            .update_device(index, source, msg.mac64, link_frame_counter);
        if let Some(route) = route.filter(|_| is_router_rloc16(source)) {
            self.routers
                .route_tlv_push(route, router_id_from_rloc16(source), msg.link_margin);
        }
        debug!("Link with {:#06x} established", source);
    }

    pub(crate) fn on_link_reject(&mut self, msg: &Inbound<'_>) {
        if self.state == AttachState::ChildIdRequest
            && self
                .selected_parent
                .as_ref()
                .is_some_and(|p| p.mac64 == msg.mac64)
        {
            info!("Parent refused our child id request");
            self.bootstrap(BootstrapEvent::ChildIdTimeout);
            return;
        }
        let Some(index) = self.neighbors.find_by_mac64(&msg.mac64) else {
            return;
        };
        let is_parent = self.parent.is_some_and(|p| p.mac64 == msg.mac64);
        if let Some(entry) = self.remove_neighbor(index) {
            if let Some(router_id) = entry.router_id() {
                self.routers.neighbor_lost(router_id);
            }
        }
        if is_parent {
            warn!("Parent rejected the link");
            self.raise(ConnectionError::ParentConnectDown);
        }
    }
}
