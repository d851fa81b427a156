//! Inbound MLE message handling.
//!
//! Messages are accepted from link-local sources only; the sender's
//! extended address is recovered from the interface identifier. Each
//! command is handled to completion and any connection error it raises is
//! processed after it.

mod advertisement;
mod announce;
mod child;
mod data;
mod link;
mod parent;

use crate::collaborators::{Ipv6Stack, ManagementClient, MleService};
use crate::event::RxInfo;
use crate::interface::ThreadInterface;
use thread_topology::link_margin_from_rssi;
use thread_wire::{is_link_local, mac64_from_link_local, MleCommand, MleMessage};
use tracing::{debug, trace};

/// An inbound message with its sender resolved
pub(crate) struct Inbound<'a> {
    pub(crate) rx: RxInfo,
    pub(crate) mac64: [u8; 8],
    pub(crate) tlvs: &'a [u8],
    pub(crate) link_margin: u8,
    pub(crate) mle_frame_counter: u32,
}

impl<S, I, M> ThreadInterface<S, I, M>
where
    S: MleService,
    I: Ipv6Stack,
    M: ManagementClient,
{
    pub(crate) fn handle_mle(&mut self, rx: RxInfo, message: MleMessage) {
        if !is_link_local(&rx.source) {
            debug!("Dropping {} from non link-local {}", message.command, rx.source);
            return;
        }
        let mac64 = mac64_from_link_local(&rx.source);
        if mac64 == self.config.eui64 {
            return;
        }
        let inbound = Inbound {
            rx,
            mac64,
            tlvs: &message.payload,
            link_margin: link_margin_from_rssi(rx.rssi),
            mle_frame_counter: message
                .security
                .as_ref()
                .map_or(0, |s| s.frame_counter),
        };
        trace!("{} from {} in {}", message.command, rx.source, self.state);
        match message.command {
            MleCommand::Advertisement => self.on_advertisement(&inbound),
            MleCommand::LinkRequest => self.on_link_request(&inbound),
            MleCommand::LinkAccept => self.on_link_accept(&inbound, false),
            MleCommand::LinkAcceptAndRequest => self.on_link_accept(&inbound, true),
            MleCommand::LinkReject => self.on_link_reject(&inbound),
            MleCommand::DataRequest => self.on_data_request(&inbound),
            MleCommand::DataResponse => self.on_data_response(&inbound),
            MleCommand::ParentRequest => self.on_parent_request(&inbound),
            MleCommand::ParentResponse => self.on_parent_response(&inbound),
            MleCommand::ChildIdRequest => self.on_child_id_request(&inbound),
            MleCommand::ChildIdResponse => self.on_child_id_response(&inbound),
            MleCommand::ChildUpdateRequest => self.on_child_update_request(&inbound),
            MleCommand::ChildUpdateResponse => self.on_child_update_response(&inbound),
            MleCommand::Announce => self.on_announce(&inbound),
            MleCommand::Update
            | MleCommand::UpdateRequest
            | MleCommand::DiscoveryRequest
            | MleCommand::DiscoveryResponse => {
                debug!("Ignoring {} from {}", message.command, rx.source);
            }
        }
    }
}
