use super::Inbound;
use crate::bootstrap::BootstrapEvent;
use crate::builder;
use crate::collaborators::{Ipv6Stack, ManagementClient, MleService, RetryPolicy};
use crate::interface::{ThreadInterface, LINK_LOCAL_ALL_NODES};
use crate::state::AnnounceInfo;
use std::cmp::Ordering;
use thread_wire::{tlv, Channel, Timestamp, TlvType};
use tracing::{debug, info};

impl<S, I, M> ThreadInterface<S, I, M>
where
    S: MleService,
    I: Ipv6Stack,
    M: ManagementClient,
{
    pub(crate) fn on_announce(&mut self, msg: &Inbound<'_>) {
        if !self.state.is_connected() {
            return;
        }
        let (Some(channel), Some(pan_id), Some(timestamp)) = (
            Channel::read(msg.tlvs),
            tlv::read_u16(msg.tlvs, TlvType::PanId),
            Timestamp::read(msg.tlvs, TlvType::ActiveTimestamp),
        ) else {
            debug!("Announce missing mandatory TLVs");
            return;
        };
        let ordering = self
            .active_timestamp
            .map_or(Ordering::Greater, |mine| timestamp.cmp(&mine));
        match ordering {
            Ordering::Less => {
                let Some(mine) = self.active_timestamp else {
                    return;
                };
                debug!("Announcing our newer configuration on channel {}", channel.channel);
                let built = builder::announce(self.channel, self.pan_id, mine);
                self.send_on(
                    LINK_LOCAL_ALL_NODES,
                    built,
                    RetryPolicy::none(),
                    None,
                    Some(channel.channel),
                );
            }
            Ordering::Equal => {}
            Ordering::Greater => {
                if channel.channel == self.channel && pan_id == self.pan_id {
                    self.active_timestamp = Some(timestamp);
                    return;
                }
                info!(
                    "Announce for channel {} pan {:#06x} is newer, following",
                    channel.channel, pan_id
                );
                self.announce = Some(AnnounceInfo {
                    original_channel: self.channel,
                    original_pan_id: self.pan_id,
                    channel: channel.channel,
                    pan_id,
                    timestamp,
                });
                self.bootstrap(BootstrapEvent::AnnounceActive);
            }
        }
    }
}
