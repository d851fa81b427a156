use super::Inbound;
use crate::builder;
use crate::collaborators::{Ipv6Stack, ManagementClient, MleService, RetryPolicy};
use crate::event::ConnectionError;
use crate::interface::{ThreadInterface, TxKind};
use crate::state::{ChallengePurpose, DeviceRole};
use thread_topology::{
    leader_data_validation, partition_match, partition_process, LeaderDataValidation,
    PartitionDecision,
};
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
    pub(crate) fn on_advertisement(&mut self, msg: &Inbound<'_>) {
        if self.config.device_mode().is_sleepy() || !self.state.is_connected() {
            return;
        }
        let (Some(source), Some(heard)) = (
            tlv::read_u16(msg.tlvs, TlvType::SourceAddress),
            LeaderData::read(msg.tlvs),
        ) else {
            debug!("Advertisement without source or leader data");
            return;
        };
        let route = if tlv::contains(msg.tlvs, TlvType::Route64) {
            match Route64::read(msg.tlvs) {
                Some(route) => Some(route),
                None => {
                    debug!("Malformed Route64 from {:#06x}", source);
                    return;
                }
            }
        } else {
            None
        };
        let Some(local) = self.local_partition() else {
            return;
        };

        if !partition_match(&local.leader_data, &heard) {
            let heard_routers = route.as_ref().map_or(0, Route64::active_router_count);
            match partition_process(&local, heard_routers, &heard, route.as_ref()) {
                PartitionDecision::Adopt => {
                    info!(
                        "Partition {:#010x} from {:#06x} preferred, merging",
                        heard.partition_id, source
                    );
                    self.raise(ConnectionError::PartitionMerge { leader_data: heard });
                }
                PartitionDecision::Reject => {
                    if self.role.is_router() {
                        self.send_merge_advertisement();
                    }
                }
            }
            return;
        }

        match leader_data_validation(&local, &heard, route.as_ref()) {
            LeaderDataValidation::ConflictingLeader => {
                warn!("Partition has another leader at {:#06x}", source);
                self.raise(ConnectionError::LeaderConflict);
                return;
            }
            LeaderDataValidation::NetworkDataUpdated => {
                let from_parent = self.parent.is_some_and(|p| p.mac64 == msg.mac64);
                if self.role.is_router() || from_parent {
                    self.request_network_data(msg.mac64);
                }
            }
            _ => {}
        }

        if let Some(route) = &route {
            if self.config.device_mode().is_ffd() && self.role != DeviceRole::Leader {
                self.routers.adopt_mask(route);
                if self.role == DeviceRole::Router && !self.routers.local_id_valid() {
                    warn!("Router id dropped from the mask by the leader");
                    self.raise(ConnectionError::NetworkKick);
                    return;
                }
            }
        }
        self.update_advertiser(msg, source, route.as_ref());
    }

    fn update_advertiser(&mut self, msg: &Inbound<'_>, source: u16, route: Option<&Route64>) {
        let is_parent = self.parent.is_some_and(|p| p.mac64 == msg.mac64);
        let allow_create = self.role.is_router() && is_router_rloc16(source);
        let Some((index, created)) = self.neighbors.allocate_or_get(msg.mac64, allow_create)
        else {
            return;
        };
        if let Some(entry) = self.neighbors.get_mut(index) {
            if is_router_rloc16(source) {
                entry.mac16 = source;
                if created {
                    entry.set_mode(DeviceMode::router());
                }
            }
        }
        let lifetime = if is_parent {
            self.config.child_timeout_secs
        } else {
            self.config.router_link_lifetime_secs
        };
        self.neighbors.refresh(index, lifetime, self.now_ms);
        self.neighbor_class.update_link(index, msg.link_margin, created);

        if created {
            let challenge = self.new_challenge();
            self.challenges.record(
                challenge,
                Some(msg.mac64),
                ChallengePurpose::LinkRequest,
                self.now_ms + self.config.challenge_timeout_ms,
            );
            debug!("New router neighbor {:#06x}, requesting link", source);
            let built = builder::link_request(
                Some(self.rloc16),
                self.leader_data.as_ref(),
                &challenge,
                false,
            );
            self.send(
                link_local_from_mac64(&msg.mac64),
                built,
                RetryPolicy::none(),
                Some(TxKind::LinkRequest),
            );
        }
        if self.role.is_router() && is_router_rloc16(source) {
            if let Some(route) = route {
                self.routers
                    .route_tlv_push(route, router_id_from_rloc16(source), msg.link_margin);
            }
        }
    }
}
