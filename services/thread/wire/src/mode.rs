//! Small fixed-layout TLV values: device mode, connectivity, dataset
//! timestamps, channel and scan mask.

use crate::error::WireError;
use crate::tlv::{self, TlvType, TlvWriter};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

bitflags! {
    /// Mode TLV bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct DeviceMode: u8 {
        /// Receiver stays on while idle (not sleepy)
        const RX_ON_IDLE = 0x08;
        /// Secure data requests (legacy, always set)
        const SECURE_DATA_REQUESTS = 0x04;
        /// Full Thread Device (router capable)
        const FULL_THREAD_DEVICE = 0x02;
        /// Wants the full network data, not only the stable subset
        const FULL_NETWORK_DATA = 0x01;
    }
}

impl DeviceMode {
    /// Mode of a router-capable, always-on device
    pub fn router() -> Self {
        DeviceMode::RX_ON_IDLE
            | DeviceMode::SECURE_DATA_REQUESTS
            | DeviceMode::FULL_THREAD_DEVICE
            | DeviceMode::FULL_NETWORK_DATA
    }

    /// Whether this is a sleepy end device
    pub fn is_sleepy(&self) -> bool {
        !self.contains(DeviceMode::RX_ON_IDLE)
    }

    /// Whether the device is a full thread device
    pub fn is_ffd(&self) -> bool {
        self.contains(DeviceMode::FULL_THREAD_DEVICE)
    }

    /// Whether the device wants full network data
    pub fn wants_full_network_data(&self) -> bool {
        self.contains(DeviceMode::FULL_NETWORK_DATA)
    }

    /// Read the Mode TLV
    pub fn read(buf: &[u8]) -> Option<Self> {
        tlv::read_u8(buf, TlvType::Mode).map(DeviceMode::from_bits_truncate)
    }
}

bitflags! {
    /// Parent Request scan mask
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ScanMask: u8 {
        /// Active routers should respond
        const ROUTERS = 0x80;
        /// REEDs should respond
        const END_DEVICES = 0x40;
    }
}

/// Connectivity TLV carried in Parent Responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connectivity {
    /// Parent priority (-1, 0, 1 encoded in the top two bits)
    pub parent_priority: i8,
    /// Neighbors with link quality 3
    pub link_quality_3: u8,
    /// Neighbors with link quality 2
    pub link_quality_2: u8,
    /// Neighbors with link quality 1
    pub link_quality_1: u8,
    /// Cost to the leader
    pub leader_cost: u8,
    /// Router ID sequence
    pub id_sequence: u8,
    /// Active router count
    pub active_routers: u8,
    /// SED buffer size
    pub sed_buffer_size: Option<u16>,
    /// SED datagram count
    pub sed_datagram_count: Option<u8>,
}

impl Connectivity {
    /// Decode a Connectivity value
    pub fn decode(value: &[u8]) -> Result<Self, WireError> {
        if value.len() != 7 && value.len() != 10 {
            return Err(WireError::Length {
                tlv: TlvType::Connectivity as u8,
                expected: 7,
                actual: value.len(),
            });
        }
        let parent_priority = match (value[0] >> 6) & 0x03 {
            0b01 => 1,
            0b11 => -1,
            _ => 0,
        };
        let (sed_buffer_size, sed_datagram_count) = if value.len() == 10 {
            (Some(u16::from_be_bytes([value[7], value[8]])), Some(value[9]))
        } else {
            (None, None)
        };
        Ok(Self {
            parent_priority,
            link_quality_3: value[1],
            link_quality_2: value[2],
            link_quality_1: value[3],
            leader_cost: value[4],
            id_sequence: value[5],
            active_routers: value[6],
            sed_buffer_size,
            sed_datagram_count,
        })
    }

    /// Encode as a Connectivity value
    pub fn encode(&self) -> Vec<u8> {
        let prio: u8 = match self.parent_priority.cmp(&0) {
            Ordering::Greater => 0b01,
            Ordering::Less => 0b11,
            Ordering::Equal => 0b00,
        };
        let mut out = vec![
            prio << 6,
            self.link_quality_3,
            self.link_quality_2,
            self.link_quality_1,
            self.leader_cost,
            self.id_sequence,
            self.active_routers,
        ];
        if let (Some(size), Some(count)) = (self.sed_buffer_size, self.sed_datagram_count) {
            out.extend_from_slice(&size.to_be_bytes());
            out.push(count);
        }
        out
    }

    /// Find and decode the Connectivity TLV
    pub fn read(buf: &[u8]) -> Option<Self> {
        tlv::find(buf, TlvType::Connectivity).and_then(|v| Self::decode(v).ok())
    }
}

/// Operational dataset timestamp (48-bit seconds, 15-bit ticks, U bit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    /// Seconds (48 bits)
    pub seconds: u64,
    /// Ticks of 1/32768 s (15 bits)
    pub ticks: u16,
    /// Authoritative source
    pub authoritative: bool,
}

impl Timestamp {
    /// Create a timestamp
    pub fn new(seconds: u64, ticks: u16) -> Self {
        Self {
            seconds: seconds & 0xffff_ffff_ffff,
            ticks: ticks & 0x7fff,
            authoritative: false,
        }
    }

    /// Decode an 8-byte timestamp value
    pub fn decode(value: &[u8]) -> Result<Self, WireError> {
        let bytes: [u8; 8] = value.try_into().map_err(|_| WireError::Length {
            tlv: TlvType::ActiveTimestamp as u8,
            expected: 8,
            actual: value.len(),
        })?;
        let raw = u64::from_be_bytes(bytes);
        Ok(Self {
            seconds: raw >> 16,
            ticks: ((raw >> 1) & 0x7fff) as u16,
            authoritative: raw & 1 != 0,
        })
    }

    /// Encode as an 8-byte value
    pub fn encode(&self) -> [u8; 8] {
        let raw = (self.seconds << 16) | ((self.ticks as u64 & 0x7fff) << 1) | self.authoritative as u64;
        raw.to_be_bytes()
    }

    /// Read a timestamp TLV of the given type
    pub fn read(buf: &[u8], typ: TlvType) -> Option<Self> {
        tlv::find(buf, typ).and_then(|v| Self::decode(v).ok())
    }

    /// Append a timestamp TLV of the given type
    pub fn write<'w>(&self, w: &'w mut TlvWriter, typ: TlvType) -> Result<&'w mut TlvWriter, WireError> {
        w.tlv(typ, &self.encode())
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.seconds, self.ticks, self.authoritative).cmp(&(
            other.seconds,
            other.ticks,
            other.authoritative,
        ))
    }
}

/// Channel TLV value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel page
    pub page: u8,
    /// Channel number
    pub channel: u16,
}

impl Channel {
    /// Read the Channel TLV
    pub fn read(buf: &[u8]) -> Option<Self> {
        let v = tlv::find(buf, TlvType::Channel).filter(|v| v.len() == 3)?;
        Some(Self {
            page: v[0],
            channel: u16::from_be_bytes([v[1], v[2]]),
        })
    }

    /// Append the Channel TLV
    pub fn write<'w>(&self, w: &'w mut TlvWriter) -> Result<&'w mut TlvWriter, WireError> {
        let c = self.channel.to_be_bytes();
        w.tlv(TlvType::Channel, &[self.page, c[0], c[1]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_mode_bits() {
        let mode = DeviceMode::router();
        assert_eq!(mode.bits(), 0x0f);
        assert!(!mode.is_sleepy());
        assert!(mode.is_ffd());

        let sed = DeviceMode::SECURE_DATA_REQUESTS;
        assert!(sed.is_sleepy());
        assert!(!sed.wants_full_network_data());
    }

    #[test]
    fn test_connectivity() {
        let c = Connectivity {
            parent_priority: -1,
            link_quality_3: 4,
            link_quality_2: 1,
            link_quality_1: 0,
            leader_cost: 2,
            id_sequence: 9,
            active_routers: 5,
            sed_buffer_size: Some(1280),
            sed_datagram_count: Some(1),
        };
        let bytes = c.encode();
        assert_eq!(bytes.len(), 10);
        assert_eq!(bytes[0], 0xc0);
        assert_eq!(Connectivity::decode(&bytes).unwrap(), c);
        assert!(Connectivity::decode(&bytes[..8]).is_err());
    }

    #[test]
    fn test_timestamp_order_and_layout() {
        let a = Timestamp::new(10, 0);
        let b = Timestamp::new(10, 5);
        let c = Timestamp::new(11, 0);
        assert!(a < b && b < c);

        let max = Timestamp {
            seconds: 0xffff_ffff_ffff,
            ticks: 0x7fff,
            authoritative: true,
        };
        assert_eq!(max.encode(), [0xff; 8]);
        assert_eq!(Timestamp::decode(&max.encode()).unwrap(), max);
        assert_eq!(Timestamp::decode(&a.encode()).unwrap(), a);
    }
}
