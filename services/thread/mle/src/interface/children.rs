//! Parent side of child attachment and the child-side keepalive.

use super::{ThreadInterface, TxKind, REQUEST_RETRY};
use crate::builder::{self, DatasetTimestamps};
use crate::collaborators::{Ipv6Stack, ManagementClient, MleService, RetryPolicy};
use crate::state::{ChallengePurpose, PendingChildId};
use crate::timers::TimerKind;
use thread_wire::{child_id_from_rloc16, link_local_from_mac64, AddressEntry, TlvType};
use tracing::{debug, info, warn};

impl<S, I, M> ThreadInterface<S, I, M>
where
    S: MleService,
    I: Ipv6Stack,
    M: ManagementClient,
{
    /// Answer queued Child ID Requests once we route
    pub(crate) fn process_pending_child_ids(&mut self) {
        if !self.role.is_router() {
            return;
        }
        while let Some(request) = self.pending_child_ids.pop_front() {
            self.accept_child(request);
        }
    }

    fn accept_child(&mut self, request: PendingChildId) {
        let Some(leader_data) = self.leader_data else {
            return;
        };
        let existing = self
            .neighbors
            .find_by_mac64(&request.mac64)
            .and_then(|i| self.neighbors.get(i))
            .map(|e| e.mac16)
            .filter(|mac16| self.is_own_child(*mac16))
            .map(child_id_from_rloc16);
        let child_id = match existing {
            Some(id) => id,
            None => match self.child_ids.allocate() {
                Some(id) => id,
                None => {
                    warn!("No room for child {:02x?}", request.mac64);
                    self.reject_child(&request.mac64);
                    return;
                }
            },
        };
        let Some((index, created)) = self.neighbors.allocate_or_get(request.mac64, true) else {
            warn!("Neighbor table full, rejecting child");
            self.child_ids.release(child_id);
            self.reject_child(&request.mac64);
            return;
        };
        let rloc16 = (self.rloc16 & 0xfc00) | child_id;
        if let Some(entry) = self.neighbors.get_mut(index) {
            entry.mac16 = rloc16;
            entry.set_mode(request.mode);
            entry.link_frame_counter = request.link_frame_counter;
            entry.mle_frame_counter = request.mle_frame_counter;
            entry.connected_device = true;
        }
        self.neighbors
            .refresh(index, request.timeout_secs, self.now_ms);
        self.neighbor_class
            .update_link(index, request.link_margin, created);
        let full = request.mode.wants_full_network_data();
        self.neighbor_class.set_request_full_data(index, full);
        if let Some(AddressEntry::Compressed { iid, .. }) = request.addresses.first() {
            self.neighbor_class.set_ml_eid(index, *iid);
        }
        self.mle
            .update_device(index, rloc16, request.mac64, request.link_frame_counter);

        let stable;
        let network_data = if full {
            &self.network_data
        } else {
            stable = self.network_data.stable_subset();
            &stable
        };
        let route = request
            .requested_tlvs
            .contains(&TlvType::Route64)
            .then(|| self.routers.to_route64());
        let timestamps = DatasetTimestamps {
            active: self
                .active_timestamp
                .filter(|ts| request.active_timestamp != Some(*ts)),
            pending: self
                .pending_timestamp
                .filter(|ts| request.pending_timestamp != Some(*ts)),
        };
        let built = builder::child_id_response(&builder::ChildIdResponse {
            source: self.rloc16,
            leader_data: &leader_data,
            address16: rloc16,
            network_data,
            route: route.as_ref(),
            timestamps,
            timeout_secs: request.timeout_secs,
        });
        info!("Child {:#06x} attached", rloc16);
        self.send(
            link_local_from_mac64(&request.mac64),
            built,
            RetryPolicy::none(),
            None,
        );
    }

    /// Refuse a link with `mac64`
    pub(crate) fn reject_child(&mut self, mac64: &[u8; 8]) {
        if let Some(index) = self.neighbors.find_by_mac64(mac64) {
            let keep = self
                .neighbors
                .get(index)
                .is_some_and(|e| e.is_router() || self.is_own_child(e.mac16));
            if !keep {
                self.remove_neighbor(index);
            }
        }
        self.send(
            link_local_from_mac64(mac64),
            builder::link_reject(),
            RetryPolicy::none(),
            None,
        );
    }

    pub(crate) fn reject_pending_child_ids(&mut self) {
        while let Some(request) = self.pending_child_ids.pop_front() {
            self.reject_child(&request.mac64);
        }
    }

    /// Child Update Request to the parent within the child timeout
    pub(crate) fn child_keepalive(&mut self) {
        let Some(parent) = self.parent else {
            return;
        };
        if self.role.is_router() {
            return;
        }
        let challenge = self.new_challenge();
        self.challenges.record(
            challenge,
            Some(parent.mac64),
            ChallengePurpose::ChildUpdate,
            self.now_ms + self.config.challenge_timeout_ms * 3,
        );
        debug!("Keepalive to parent {:#06x}", parent.rloc16);
        let mode = self.config.device_mode();
        let built = builder::child_update_request(
            self.rloc16,
            mode,
            self.leader_data.as_ref(),
            Some(&challenge),
            Some(self.config.child_timeout_secs),
            &[],
        );
        self.send(
            link_local_from_mac64(&parent.mac64),
            built,
            REQUEST_RETRY,
            Some(TxKind::ChildUpdate),
        );
        self.timers.start(
            TimerKind::ChildUpdate,
            self.now_ms,
            self.config.child_timeout_secs as u64 * 500,
        );
    }
}
