use super::Inbound;
use crate::builder;
use crate::collaborators::{Ipv6Stack, ManagementClient, MleService, RetryPolicy};
use crate::event::ConnectionError;
use crate::interface::{ThreadInterface, TxKind, REQUEST_RETRY};
use crate::state::DeviceRole;
use bytes::Bytes;
use thread_topology::partition_match;
use thread_wire::{
    is_greater_u8, link_local_from_mac64, tlv, LeaderData, NetworkData, Timestamp, TlvType,
};
use tracing::{debug, info, warn};

impl<S, I, M> ThreadInterface<S, I, M>
where
    S: MleService,
    I: Ipv6Stack,
    M: ManagementClient,
{
    /// Ask for network data; children always ask their parent
    pub(crate) fn request_network_data(&mut self, mac64: [u8; 8]) {
        let target = match self.parent {
            Some(parent) if !self.role.is_router() => parent.mac64,
            _ => mac64,
        };
        self.network_data_requested = true;
        let built = builder::data_request(&[TlvType::NetworkData], self.dataset_timestamps());
        self.send(
            link_local_from_mac64(&target),
            built,
            REQUEST_RETRY,
            Some(TxKind::DataRequest),
        );
    }

    pub(crate) fn on_data_request(&mut self, msg: &Inbound<'_>) {
        if !self.role.is_router() {
            return;
        }
        let Some(leader_data) = self.leader_data else {
            return;
        };
        let Some(index) = self.neighbors.find_by_mac64(&msg.mac64) else {
            debug!("Data request from unknown neighbor");
            return;
        };
        self.refresh_neighbor(index);
        let full = self
            .neighbors
            .get(index)
            .is_some_and(|e| e.is_router() || e.mode.wants_full_network_data())
            || self.neighbor_class.request_full_data(index);
        let stable;
        let network_data = if full {
            &self.network_data
        } else {
            stable = self.network_data.stable_subset();
            &stable
        };
        let built = builder::data_response(
            self.rloc16,
            &leader_data,
            network_data,
            self.dataset_timestamps(),
        );
        self.send(
            link_local_from_mac64(&msg.mac64),
            built,
            RetryPolicy::none(),
            None,
        );
    }

    pub(crate) fn on_data_response(&mut self, msg: &Inbound<'_>) {
        if !self.state.is_connected() {
            return;
        }
        let (Some(_source), Some(heard), Some(raw)) = (
            tlv::read_u16(msg.tlvs, TlvType::SourceAddress),
            LeaderData::read(msg.tlvs),
            tlv::find(msg.tlvs, TlvType::NetworkData),
        ) else {
            debug!("Data response missing mandatory TLVs");
            return;
        };
        let network_data = NetworkData::new(Bytes::copy_from_slice(raw));
        if let Err(e) = network_data.validate() {
            debug!("Dropping malformed network data: {}", e);
            return;
        }
        if self.role.is_router() {
            let Some(index) = self.neighbors.find_by_mac64(&msg.mac64) else {
                return;
            };
            self.refresh_neighbor(index);
        } else if self.parent.is_some_and(|p| p.mac64 == msg.mac64) {
            self.refresh_parent();
        } else {
            return;
        }
        let Some(mine) = self.leader_data else {
            return;
        };

        let partition_changed = !partition_match(&mine, &heard);
        let newer = is_greater_u8(heard.data_version, mine.data_version)
            || is_greater_u8(heard.stable_data_version, mine.stable_data_version);
        if partition_changed {
            if self.role.is_router() {
                debug!("Data response from partition {:#010x}", heard.partition_id);
                return;
            }
            self.adopt_partition(&heard);
        } else if self.role == DeviceRole::Leader {
            if newer {
                warn!("Newer network data than the leader's own");
                self.raise(ConnectionError::LeaderConflict);
            }
            return;
        }

        if partition_changed || self.network_data_requested || newer {
            self.network_data_requested = false;
            self.cancel_transactions(TxKind::DataRequest);
            self.store_network_data(heard, network_data);
            if self.role.is_router() {
                self.propagate_network_data();
            }
        }
        self.check_dataset_timestamps(msg);
    }

    /// Follow the peer's active and pending timestamps when ours lag behind.
    /// The first newer timestamp asks the peer for the dataset; the answer
    /// carrying it is adopted.
    fn check_dataset_timestamps(&mut self, msg: &Inbound<'_>) {
        let mut wanted = Vec::new();
        if let Some(peer) = Timestamp::read(msg.tlvs, TlvType::ActiveTimestamp) {
            match follow_timestamp(
                &mut self.active_timestamp,
                &mut self.active_dataset_requested,
                peer,
            ) {
                TimestampCheck::Request => wanted.push(TlvType::ActiveDataset),
                TimestampCheck::Adopted => info!("Active timestamp now {}", peer.seconds),
                TimestampCheck::Current => {}
            }
        }
        if let Some(peer) = Timestamp::read(msg.tlvs, TlvType::PendingTimestamp) {
            match follow_timestamp(
                &mut self.pending_timestamp,
                &mut self.pending_dataset_requested,
                peer,
            ) {
                TimestampCheck::Request => wanted.push(TlvType::PendingDataset),
                TimestampCheck::Adopted => info!("Pending timestamp now {}", peer.seconds),
                TimestampCheck::Current => {}
            }
        }
        if wanted.is_empty() {
            return;
        }
        let built = builder::data_request(&wanted, self.dataset_timestamps());
        self.send(
            link_local_from_mac64(&msg.mac64),
            built,
            REQUEST_RETRY,
            Some(TxKind::DataRequest),
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimestampCheck {
    Current,
    Request,
    Adopted,
}

fn follow_timestamp(
    mine: &mut Option<Timestamp>,
    requested: &mut bool,
    peer: Timestamp,
) -> TimestampCheck {
    if mine.is_some_and(|m| peer <= m) {
        *requested = false;
        return TimestampCheck::Current;
    }
    if *requested {
        *mine = Some(peer);
        *requested = false;
        return TimestampCheck::Adopted;
    }
    *requested = true;
    TimestampCheck::Request
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_follow_timestamp() {
        let mut mine = Some(Timestamp::new(5, 0));
        let mut requested = false;
        assert_eq!(
            follow_timestamp(&mut mine, &mut requested, Timestamp::new(5, 0)),
            TimestampCheck::Current
        );
        assert_eq!(
            follow_timestamp(&mut mine, &mut requested, Timestamp::new(8, 0)),
            TimestampCheck::Request
        );
        assert!(requested);
        assert_eq!(mine, Some(Timestamp::new(5, 0)));
        assert_eq!(
            follow_timestamp(&mut mine, &mut requested, Timestamp::new(8, 0)),
            TimestampCheck::Adopted
        );
        assert_eq!(mine, Some(Timestamp::new(8, 0)));
        assert!(!requested);

        let mut none = None;
        assert_eq!(
            follow_timestamp(&mut none, &mut requested, Timestamp::new(1, 0)),
            TimestampCheck::Request
        );
    }
}
