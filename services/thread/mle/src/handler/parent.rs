use super::Inbound;
use crate::bootstrap::ParentRound;
use crate::builder;
use crate::collaborators::{Ipv6Stack, ManagementClient, MleService, RetryPolicy};
use crate::interface::ThreadInterface;
use crate::state::{AttachState, ChallengePurpose, DeviceRole, ParentCandidate};
use thread_topology::partition_match;
use thread_wire::{
    is_router_rloc16, link_local_from_mac64, tlv, Connectivity, DeviceMode, LeaderData, ScanMask,
    TlvType,
};
use tracing::debug;

impl<S, I, M> ThreadInterface<S, I, M>
where
    S: MleService,
    I: Ipv6Stack,
    M: ManagementClient,
{
    pub(crate) fn on_parent_request(&mut self, msg: &Inbound<'_>) {
        if !self.state.is_connected() {
            return;
        }
        let reed = self.role == DeviceRole::Reed;
        if !self.role.is_router() && !reed {
            return;
        }
        if self.parent.is_some_and(|p| p.mac64 == msg.mac64) {
            return;
        }
        let (Some(_mode), Some(challenge), Some(mask)) = (
            DeviceMode::read(msg.tlvs),
            tlv::read_bounded(msg.tlvs, TlvType::Challenge, 4, 8),
            tlv::read_u8(msg.tlvs, TlvType::ScanMask).map(ScanMask::from_bits_truncate),
        ) else {
            debug!("Parent request missing mandatory TLVs");
            return;
        };
        let addressed = if reed {
            mask.contains(ScanMask::END_DEVICES)
        } else {
            mask.contains(ScanMask::ROUTERS)
        };
        if !addressed {
            return;
        }
        let known = self.neighbors.find_by_mac64(&msg.mac64).is_some();
        if !self.child_ids.has_room() || (!known && self.neighbors.is_full()) {
            debug!("No room for another child, not answering");
            return;
        }
        if reed && !self.upgrade_allowed() {
            return;
        }
        let Some(leader_data) = self.leader_data else {
            return;
        };

        let ours = self.new_challenge();
        self.challenges.record(
            ours,
            Some(msg.mac64),
            ChallengePurpose::ParentResponse,
            self.now_ms + self.config.challenge_timeout_ms,
        );
        let connectivity = self.connectivity(&leader_data);
        let built = builder::parent_response(&builder::ParentResponse {
            source: self.rloc16,
            leader_data: &leader_data,
            link_frame_counter: self.frame_counter,
            mle_frame_counter: self.frame_counter,
            response: challenge,
            challenge: &ours,
            link_margin: msg.link_margin,
            connectivity: &connectivity,
        });
        self.send(
            link_local_from_mac64(&msg.mac64),
            built,
            RetryPolicy::none(),
            None,
        );
    }

    pub(crate) fn on_parent_response(&mut self, msg: &Inbound<'_>) {
        if !self.state.is_parent_request() {
            return;
        }
        let Some(response) = tlv::find(msg.tlvs, TlvType::Response) else {
            return;
        };
        if self.challenges.take(response, &msg.mac64, self.now_ms)
            != Some(ChallengePurpose::ParentRequest)
        {
            debug!("Parent response with stale challenge");
            return;
        }
        let (Some(source), Some(heard), Some(challenge), Some(connectivity), Some(remote_margin)) = (
            tlv::read_u16(msg.tlvs, TlvType::SourceAddress),
            LeaderData::read(msg.tlvs),
            tlv::read_bounded(msg.tlvs, TlvType::Challenge, 4, 8),
            Connectivity::read(msg.tlvs),
            tlv::read_u8(msg.tlvs, TlvType::LinkMargin),
        ) else {
            debug!("Parent response missing mandatory TLVs");
            return;
        };
        if self.parent_round == ParentRound::Routers && !is_router_rloc16(source) {
            return;
        }
        let wanted = match self.state {
            AttachState::Reattach | AttachState::ReattachRetry => self
                .leader_data
                .map_or(true, |mine| partition_match(&mine, &heard)),
            AttachState::PartitionMerge => self
                .merge_target
                .map_or(true, |target| partition_match(&target, &heard)),
            _ => true,
        };
        if !wanted {
            debug!("Parent response from partition {:#010x}", heard.partition_id);
            return;
        }

        let candidate = ParentCandidate {
            mac64: msg.mac64,
            rloc16: source,
            leader_data: heard,
            link_quality: ParentCandidate::two_way_quality(msg.link_margin, remote_margin),
            connectivity,
            challenge: challenge.to_vec(),
            link_frame_counter: tlv::read_u32(msg.tlvs, TlvType::LinkLayerFrameCounter)
                .unwrap_or(msg.rx.link_frame_counter),
            mle_frame_counter: tlv::read_u32(msg.tlvs, TlvType::MleFrameCounter)
                .unwrap_or(msg.mle_frame_counter),
            link_margin: msg.link_margin,
        };
        debug!(
            "Parent candidate {:#06x} lq {} priority {}",
            source, candidate.link_quality, candidate.connectivity.parent_priority
        );
        match self
            .parent_candidates
            .iter_mut()
            .find(|c| c.mac64 == msg.mac64)
        {
            Some(existing) => *existing = candidate,
            None => self.parent_candidates.push(candidate),
        }
    }
}
