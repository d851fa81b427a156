//! Outbound MLE message builders.
//!
//! Each builder returns a [`MessageBuilder`] with its TLVs written; the
//! interface adds the security header and hands it to the transport.

use thread_wire::address::write_registration;
use thread_wire::{
    AddressEntry, Channel, Connectivity, DeviceMode, LeaderData, MessageBuilder, MleCommand,
    NetworkData, Route64, ScanMask, Timestamp, TlvType, WireError,
};

/// Version TLV value sent in every request and response
pub const THREAD_VERSION: u16 = 3;

/// Link Reject / Status TLV value for "rejected"
pub const STATUS_ERROR: u8 = 1;

/// Operational dataset timestamps carried in a message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatasetTimestamps {
    /// Active timestamp
    pub active: Option<Timestamp>,
    /// Pending timestamp
    pub pending: Option<Timestamp>,
}

impl DatasetTimestamps {
    fn write(&self, builder: &mut MessageBuilder) -> Result<(), WireError> {
        if let Some(ts) = self.active {
            ts.write(builder.tlvs(), TlvType::ActiveTimestamp)?;
        }
        if let Some(ts) = self.pending {
            ts.write(builder.tlvs(), TlvType::PendingTimestamp)?;
        }
        Ok(())
    }
}

fn tlv_request(builder: &mut MessageBuilder, tlvs: &[TlvType]) -> Result<(), WireError> {
    let raw: Vec<u8> = tlvs.iter().map(|t| *t as u8).collect();
    builder.tlvs().tlv(TlvType::TlvRequest, &raw)?;
    Ok(())
}

/// Advertisement; REEDs omit the Route64
pub fn advertisement(
    source: u16,
    leader_data: &LeaderData,
    route: Option<&Route64>,
) -> Result<MessageBuilder, WireError> {
    let mut b = MessageBuilder::new(MleCommand::Advertisement);
    b.tlvs().tlv_u16(TlvType::SourceAddress, source)?;
    leader_data.write(b.tlvs())?;
    if let Some(route) = route {
        route.write(b.tlvs())?;
    }
    Ok(b)
}

/// Link Request
pub fn link_request(
    source: Option<u16>,
    leader_data: Option<&LeaderData>,
    challenge: &[u8; 8],
    request_route: bool,
) -> Result<MessageBuilder, WireError> {
    let mut b = MessageBuilder::new(MleCommand::LinkRequest);
    if let Some(source) = source {
        b.tlvs().tlv_u16(TlvType::SourceAddress, source)?;
    }
    if let Some(leader_data) = leader_data {
        leader_data.write(b.tlvs())?;
    }
    b.tlvs()
        .tlv(TlvType::Challenge, challenge)?
        .tlv_u16(TlvType::Version, THREAD_VERSION)?;
    if request_route {
        tlv_request(&mut b, &[TlvType::Address16, TlvType::Route64])?;
    }
    Ok(b)
}

/// Contents of a Link Accept
#[derive(Debug, Clone)]
pub struct LinkAccept<'a> {
    /// Challenge of the Link Request being answered
    pub response: &'a [u8],
    /// Our challenge, making this an Accept and Request
    pub challenge: Option<&'a [u8; 8]>,
    /// Our short address
    pub source: u16,
    /// Our Leader Data
    pub leader_data: &'a LeaderData,
    /// Link-layer frame counter
    pub link_frame_counter: u32,
    /// MLE frame counter
    pub mle_frame_counter: u32,
    /// Margin of the request we received
    pub link_margin: u8,
    /// Route64 when requested
    pub route: Option<&'a Route64>,
}

/// Link Accept or Link Accept and Request
pub fn link_accept(params: &LinkAccept<'_>) -> Result<MessageBuilder, WireError> {
    let command = if params.challenge.is_some() {
        MleCommand::LinkAcceptAndRequest
    } else {
        MleCommand::LinkAccept
    };
    let mut b = MessageBuilder::new(command);
    b.tlvs()
        .tlv_u16(TlvType::SourceAddress, params.source)?
        .tlv(TlvType::Response, params.response)?
        .tlv_u32(TlvType::LinkLayerFrameCounter, params.link_frame_counter)?
        .tlv_u32(TlvType::MleFrameCounter, params.mle_frame_counter)?
        .tlv_u16(TlvType::Version, THREAD_VERSION)?
        .tlv_u8(TlvType::LinkMargin, params.link_margin)?;
    params.leader_data.write(b.tlvs())?;
    if let Some(route) = params.route {
        route.write(b.tlvs())?;
    }
    if let Some(challenge) = params.challenge {
        b.tlvs().tlv(TlvType::Challenge, challenge)?;
    }
    Ok(b)
}

/// Link Reject
pub fn link_reject() -> Result<MessageBuilder, WireError> {
    let mut b = MessageBuilder::new(MleCommand::LinkReject);
    b.tlvs().tlv_u8(TlvType::Status, STATUS_ERROR)?;
    Ok(b)
}

/// Parent Request
pub fn parent_request(
    mode: DeviceMode,
    challenge: &[u8; 8],
    scan_mask: ScanMask,
) -> Result<MessageBuilder, WireError> {
    let mut b = MessageBuilder::new(MleCommand::ParentRequest);
    b.tlvs()
        .tlv_u8(TlvType::Mode, mode.bits())?
        .tlv(TlvType::Challenge, challenge)?
        .tlv_u8(TlvType::ScanMask, scan_mask.bits())?
        .tlv_u16(TlvType::Version, THREAD_VERSION)?;
    Ok(b)
}

/// Contents of a Parent Response
#[derive(Debug, Clone)]
pub struct ParentResponse<'a> {
    /// Our short address
    pub source: u16,
    /// Our Leader Data
    pub leader_data: &'a LeaderData,
    /// Link-layer frame counter
    pub link_frame_counter: u32,
    /// MLE frame counter
    pub mle_frame_counter: u32,
    /// Challenge of the Parent Request
    pub response: &'a [u8],
    /// Our challenge
    pub challenge: &'a [u8; 8],
    /// Margin of the request we received
    pub link_margin: u8,
    /// Our connectivity
    pub connectivity: &'a Connectivity,
}

/// Parent Response
pub fn parent_response(params: &ParentResponse<'_>) -> Result<MessageBuilder, WireError> {
    let mut b = MessageBuilder::new(MleCommand::ParentResponse);
    b.tlvs()
        .tlv_u16(TlvType::SourceAddress, params.source)?
        .tlv_u32(TlvType::LinkLayerFrameCounter, params.link_frame_counter)?
        .tlv_u32(TlvType::MleFrameCounter, params.mle_frame_counter)?
        .tlv(TlvType::Response, params.response)?
        .tlv(TlvType::Challenge, params.challenge)?
        .tlv_u8(TlvType::LinkMargin, params.link_margin)?
        .tlv(TlvType::Connectivity, &params.connectivity.encode())?
        .tlv_u16(TlvType::Version, THREAD_VERSION)?;
    params.leader_data.write(b.tlvs())?;
    Ok(b)
}

/// Contents of a Child ID Request
#[derive(Debug, Clone)]
pub struct ChildIdRequest<'a> {
    /// Challenge from the Parent Response
    pub response: &'a [u8],
    /// Link-layer frame counter
    pub link_frame_counter: u32,
    /// MLE frame counter
    pub mle_frame_counter: u32,
    /// Our mode
    pub mode: DeviceMode,
    /// Requested child timeout, seconds
    pub timeout_secs: u32,
    /// Addresses to register (end devices without full data)
    pub addresses: &'a [AddressEntry],
    /// Our dataset timestamps
    pub timestamps: DatasetTimestamps,
}

/// Child ID Request
pub fn child_id_request(params: &ChildIdRequest<'_>) -> Result<MessageBuilder, WireError> {
    let mut b = MessageBuilder::new(MleCommand::ChildIdRequest);
    b.tlvs()
        .tlv(TlvType::Response, params.response)?
        .tlv_u32(TlvType::LinkLayerFrameCounter, params.link_frame_counter)?
        .tlv_u32(TlvType::MleFrameCounter, params.mle_frame_counter)?
        .tlv_u8(TlvType::Mode, params.mode.bits())?
        .tlv_u32(TlvType::Timeout, params.timeout_secs)?
        .tlv_u16(TlvType::Version, THREAD_VERSION)?;
    let mut requested = vec![TlvType::Address16, TlvType::NetworkData];
    if params.mode.is_ffd() {
        requested.push(TlvType::Route64);
    }
    tlv_request(&mut b, &requested)?;
    if !params.addresses.is_empty() {
        write_registration(b.tlvs(), params.addresses)?;
    }
    params.timestamps.write(&mut b)?;
    Ok(b)
}

/// Contents of a Child ID Response
#[derive(Debug, Clone)]
pub struct ChildIdResponse<'a> {
    /// Our short address
    pub source: u16,
    /// Our Leader Data
    pub leader_data: &'a LeaderData,
    /// Short address assigned to the child
    pub address16: u16,
    /// Network data, already reduced to stable data when required
    pub network_data: &'a NetworkData,
    /// Route64 when requested
    pub route: Option<&'a Route64>,
    /// Dataset timestamps the child does not have yet
    pub timestamps: DatasetTimestamps,
    /// Granted timeout, seconds
    pub timeout_secs: u32,
}

/// Child ID Response
pub fn child_id_response(params: &ChildIdResponse<'_>) -> Result<MessageBuilder, WireError> {
    let mut b = MessageBuilder::new(MleCommand::ChildIdResponse);
    b.tlvs()
        .tlv_u16(TlvType::SourceAddress, params.source)?
        .tlv_u16(TlvType::Address16, params.address16)?
        .tlv(TlvType::NetworkData, params.network_data.as_bytes())?
        .tlv_u32(TlvType::Timeout, params.timeout_secs)?;
    params.leader_data.write(b.tlvs())?;
    if let Some(route) = params.route {
        route.write(b.tlvs())?;
    }
    params.timestamps.write(&mut b)?;
    Ok(b)
}

/// Child Update Request
pub fn child_update_request(
    source: u16,
    mode: DeviceMode,
    leader_data: Option<&LeaderData>,
    challenge: Option<&[u8; 8]>,
    timeout_secs: Option<u32>,
    addresses: &[AddressEntry],
) -> Result<MessageBuilder, WireError> {
    let mut b = MessageBuilder::new(MleCommand::ChildUpdateRequest);
    b.tlvs()
        .tlv_u16(TlvType::SourceAddress, source)?
        .tlv_u8(TlvType::Mode, mode.bits())?;
    if let Some(leader_data) = leader_data {
        leader_data.write(b.tlvs())?;
    }
    if let Some(challenge) = challenge {
        b.tlvs().tlv(TlvType::Challenge, challenge)?;
    }
    if let Some(timeout) = timeout_secs {
        b.tlvs().tlv_u32(TlvType::Timeout, timeout)?;
    }
    if !addresses.is_empty() {
        write_registration(b.tlvs(), addresses)?;
    }
    Ok(b)
}

/// Child Update Response
pub fn child_update_response(
    source: u16,
    mode: DeviceMode,
    response: Option<&[u8]>,
    leader_data: Option<&LeaderData>,
    timeout_secs: Option<u32>,
    addresses: &[AddressEntry],
) -> Result<MessageBuilder, WireError> {
    let mut b = MessageBuilder::new(MleCommand::ChildUpdateResponse);
    b.tlvs()
        .tlv_u16(TlvType::SourceAddress, source)?
        .tlv_u8(TlvType::Mode, mode.bits())?;
    if let Some(response) = response {
        b.tlvs().tlv(TlvType::Response, response)?;
    }
    if let Some(leader_data) = leader_data {
        leader_data.write(b.tlvs())?;
    }
    if let Some(timeout) = timeout_secs {
        b.tlvs().tlv_u32(TlvType::Timeout, timeout)?;
    }
    if !addresses.is_empty() {
        write_registration(b.tlvs(), addresses)?;
    }
    Ok(b)
}

/// Data Request
pub fn data_request(
    requested: &[TlvType],
    timestamps: DatasetTimestamps,
) -> Result<MessageBuilder, WireError> {
    let mut b = MessageBuilder::new(MleCommand::DataRequest);
    tlv_request(&mut b, requested)?;
    timestamps.write(&mut b)?;
    Ok(b)
}

/// Data Response
pub fn data_response(
    source: u16,
    leader_data: &LeaderData,
    network_data: &NetworkData,
    timestamps: DatasetTimestamps,
) -> Result<MessageBuilder, WireError> {
    let mut b = MessageBuilder::new(MleCommand::DataResponse);
    b.tlvs()
        .tlv_u16(TlvType::SourceAddress, source)?
        .tlv(TlvType::NetworkData, network_data.as_bytes())?;
    leader_data.write(b.tlvs())?;
    timestamps.write(&mut b)?;
    Ok(b)
}

/// Announce
pub fn announce(channel: u16, pan_id: u16, timestamp: Timestamp) -> Result<MessageBuilder, WireError> {
    let mut b = MessageBuilder::new(MleCommand::Announce);
    Channel { page: 0, channel }.write(b.tlvs())?;
    b.tlvs().tlv_u16(TlvType::PanId, pan_id)?;
    timestamp.write(b.tlvs(), TlvType::ActiveTimestamp)?;
    Ok(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use thread_wire::tlv;

    fn leader() -> LeaderData {
        LeaderData {
            partition_id: 0x1234,
            weighting: 64,
            data_version: 1,
            stable_data_version: 1,
            leader_router_id: 0,
        }
    }

    #[test]
    fn test_advertisement_tlvs() {
        let msg = advertisement(0x0400, &leader(), None).unwrap().build();
        assert_eq!(msg.command, MleCommand::Advertisement);
        assert_eq!(tlv::read_u16(&msg.payload, TlvType::SourceAddress), Some(0x0400));
        assert_eq!(LeaderData::read(&msg.payload), Some(leader()));
        assert!(!tlv::contains(&msg.payload, TlvType::Route64));
    }

    #[test]
    fn test_link_accept_and_request() {
        let ld = leader();
        let msg = link_accept(&LinkAccept {
            response: &[5; 8],
            challenge: Some(&[6; 8]),
            source: 0x0800,
            leader_data: &ld,
            link_frame_counter: 1,
            mle_frame_counter: 2,
            link_margin: 30,
            route: None,
        })
        .unwrap()
        .build();
        assert_eq!(msg.command, MleCommand::LinkAcceptAndRequest);
        assert_eq!(tlv::find(&msg.payload, TlvType::Response), Some(&[5u8; 8][..]));
        assert_eq!(tlv::find(&msg.payload, TlvType::Challenge), Some(&[6u8; 8][..]));
        assert_eq!(tlv::read_u32(&msg.payload, TlvType::MleFrameCounter), Some(2));
    }

    #[test]
    fn test_child_id_request_tlv_request() {
        let msg = child_id_request(&ChildIdRequest {
            response: &[1; 8],
            link_frame_counter: 0,
            mle_frame_counter: 0,
            mode: DeviceMode::router(),
            timeout_secs: 240,
            addresses: &[],
            timestamps: DatasetTimestamps::default(),
        })
        .unwrap()
        .build();
        let requested = tlv::find(&msg.payload, TlvType::TlvRequest).unwrap();
        assert!(requested.contains(&(TlvType::Route64 as u8)));
        assert!(!tlv::contains(&msg.payload, TlvType::AddressRegistration));
    }

    #[test]
    fn test_announce() {
        let msg = announce(15, 0xbeef, Timestamp::new(100, 0)).unwrap().build();
        assert_eq!(Channel::read(&msg.payload).unwrap().channel, 15);
        assert_eq!(tlv::read_u16(&msg.payload, TlvType::PanId), Some(0xbeef));
        assert_eq!(
            Timestamp::read(&msg.payload, TlvType::ActiveTimestamp),
            Some(Timestamp::new(100, 0))
        );
    }

    #[test]
    fn test_data_response_timestamps() {
        let timestamps = DatasetTimestamps {
            active: Some(Timestamp::new(7, 0)),
            pending: Some(Timestamp::new(9, 0)),
        };
        let msg = data_response(0x0400, &leader(), &NetworkData::empty(), timestamps)
            .unwrap()
            .build();
        assert_eq!(
            Timestamp::read(&msg.payload, TlvType::ActiveTimestamp),
            Some(Timestamp::new(7, 0))
        );
        assert_eq!(
            Timestamp::read(&msg.payload, TlvType::PendingTimestamp),
            Some(Timestamp::new(9, 0))
        );

        let bare = data_request(&[TlvType::NetworkData], DatasetTimestamps::default())
            .unwrap()
            .build();
        assert!(!tlv::contains(&bare.payload, TlvType::ActiveTimestamp));
        assert!(!tlv::contains(&bare.payload, TlvType::PendingTimestamp));
    }
}
