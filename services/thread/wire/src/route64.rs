//! Route64 TLV: router-ID sequence, allocated-router mask and one link
//! quality / route cost byte per allocated router.

use crate::error::WireError;
use crate::tlv::{self, TlvType, TlvWriter};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Largest router ID
pub const MAX_ROUTER_ID: u8 = 62;

/// Route cost meaning "unreachable"
pub const INFINITE_COST: u8 = 0;

/// Per-router entry of a Route64 TLV
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    /// Router ID this entry describes
    pub router_id: u8,
    /// Outgoing link quality (0..3) from the sender to this router
    pub link_quality_out: u8,
    /// Incoming link quality (0..3) from this router to the sender
    pub link_quality_in: u8,
    /// Route cost (0 = no route)
    pub route_cost: u8,
}

impl RouteEntry {
    fn encode(&self) -> u8 {
        ((self.link_quality_out & 0x03) << 6)
            | ((self.link_quality_in & 0x03) << 4)
            | (self.route_cost & 0x0f)
    }

    fn decode(router_id: u8, byte: u8) -> Self {
        Self {
            router_id,
            link_quality_out: (byte >> 6) & 0x03,
            link_quality_in: (byte >> 4) & 0x03,
            route_cost: byte & 0x0f,
        }
    }

    /// Whether the sender has a direct two-way link to this router
    pub fn is_two_way(&self) -> bool {
        self.link_quality_in > 0 && self.link_quality_out > 0
    }
}

/// Decoded Route64 TLV
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route64 {
    /// Router ID sequence number
    pub id_sequence: u8,
    /// Allocated router bitmask, bit 63 - id set for router `id`
    pub router_mask: u64,
    /// Entries in ascending router-ID order
    pub entries: SmallVec<[RouteEntry; 32]>,
}

impl Route64 {
    /// Create an empty table
    pub fn new(id_sequence: u8) -> Self {
        Self {
            id_sequence,
            router_mask: 0,
            entries: SmallVec::new(),
        }
    }

    /// Whether `router_id` is allocated in the mask
    pub fn is_allocated(&self, router_id: u8) -> bool {
        router_id <= MAX_ROUTER_ID && self.router_mask & (1u64 << (63 - router_id)) != 0
    }

    /// Number of allocated routers
    pub fn active_router_count(&self) -> u8 {
        self.router_mask.count_ones() as u8
    }

    /// Allocated router IDs in ascending order
    pub fn router_ids(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=MAX_ROUTER_ID).filter(move |id| self.is_allocated(*id))
    }

    /// Entry for `router_id`
    pub fn entry(&self, router_id: u8) -> Option<&RouteEntry> {
        self.entries.iter().find(|e| e.router_id == router_id)
    }

    /// Append an allocated router entry; entries must be pushed in ascending ID order
    pub fn push(&mut self, entry: RouteEntry) {
        self.router_mask |= 1u64 << (63 - entry.router_id);
        self.entries.push(entry);
    }

    /// Decode a Route64 value
    pub fn decode(value: &[u8]) -> Result<Self, WireError> {
        if value.len() < 9 {
            return Err(WireError::Truncated);
        }
        let id_sequence = value[0];
        let mut mask_bytes = [0u8; 8];
        mask_bytes.copy_from_slice(&value[1..9]);
        let router_mask = u64::from_be_bytes(mask_bytes);
        if router_mask & 1 != 0 {
            // router ID 63 is reserved
            return Err(WireError::Malformed("route64 mask"));
        }

        let count = router_mask.count_ones() as usize;
        let data = &value[9..];
        if data.len() != count {
            return Err(WireError::Length {
                tlv: TlvType::Route64 as u8,
                expected: 9 + count,
                actual: value.len(),
            });
        }

        let mut entries = SmallVec::new();
        let mut next = data.iter();
        for id in 0..=MAX_ROUTER_ID {
            if router_mask & (1u64 << (63 - id)) != 0 {
                let byte = *next.next().ok_or(WireError::Truncated)?;
                entries.push(RouteEntry::decode(id, byte));
            }
        }

        Ok(Self {
            id_sequence,
            router_mask,
            entries,
        })
    }

    /// Encode as a Route64 value
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(9 + self.entries.len());
        out.push(self.id_sequence);
        out.extend_from_slice(&self.router_mask.to_be_bytes());
        out.extend(self.entries.iter().map(RouteEntry::encode));
        out
    }

    /// Find and decode the Route64 TLV in a message payload
    pub fn read(buf: &[u8]) -> Option<Self> {
        tlv::find(buf, TlvType::Route64).and_then(|v| Self::decode(v).ok())
    }

    /// Append as a Route64 TLV
    pub fn write<'w>(&self, w: &'w mut TlvWriter) -> Result<&'w mut TlvWriter, WireError> {
        w.tlv(TlvType::Route64, &self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(router_id: u8, out: u8, inq: u8, cost: u8) -> RouteEntry {
        RouteEntry {
            router_id,
            link_quality_out: out,
            link_quality_in: inq,
            route_cost: cost,
        }
    }

    #[test]
    fn test_route64_encode_decode() {
        let mut route = Route64::new(3);
        route.push(entry(0, 3, 3, 1));
        route.push(entry(2, 0, 0, 4));
        route.push(entry(62, 2, 1, 15));

        let bytes = route.encode();
        assert_eq!(bytes.len(), 12);
        assert_eq!(bytes[9], 0b1111_0001);

        let decoded = Route64::decode(&bytes).unwrap();
        assert_eq!(decoded, route);
        assert_eq!(decoded.active_router_count(), 3);
        assert_eq!(decoded.router_ids().collect::<Vec<_>>(), vec![0, 2, 62]);
        assert!(decoded.entry(0).unwrap().is_two_way());
        assert!(!decoded.entry(2).unwrap().is_two_way());
    }

    #[test]
    fn test_route64_length_mismatch() {
        let mut bytes = vec![1u8];
        bytes.extend_from_slice(&(1u64 << 63 | 1u64 << 62).to_be_bytes());
        bytes.push(0x11);
        assert!(Route64::decode(&bytes).is_err());
    }

    #[test]
    fn test_route64_reserved_id() {
        let mut bytes = vec![1u8];
        bytes.extend_from_slice(&1u64.to_be_bytes());
        bytes.push(0x11);
        assert!(Route64::decode(&bytes).is_err());
    }
}
