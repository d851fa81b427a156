//! Address Registration TLV and link-local address helpers.

use crate::error::WireError;
use crate::tlv::{self, TlvType, TlvWriter};
use serde::{Deserialize, Serialize};
use std::net::Ipv6Addr;

/// Control bit marking a compressed (context + IID) entry
pub const COMPRESSED_FLAG: u8 = 0x80;

/// Size of a compressed entry
pub const COMPRESSED_ENTRY_LEN: usize = 9;

/// Size of a full-address entry
pub const FULL_ENTRY_LEN: usize = 17;

/// One registered address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressEntry {
    /// Context ID plus 64-bit interface identifier
    Compressed {
        /// 6LoWPAN context ID (0..15)
        context_id: u8,
        /// Interface identifier
        iid: [u8; 8],
    },
    /// Uncompressed IPv6 address
    Full(Ipv6Addr),
}

impl AddressEntry {
    /// Bytes this entry occupies on the wire
    pub fn encoded_len(&self) -> usize {
        match self {
            AddressEntry::Compressed { .. } => COMPRESSED_ENTRY_LEN,
            AddressEntry::Full(_) => FULL_ENTRY_LEN,
        }
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            AddressEntry::Compressed { context_id, iid } => {
                out.push(COMPRESSED_FLAG | (context_id & 0x0f));
                out.extend_from_slice(iid);
            }
            AddressEntry::Full(addr) => {
                out.push(0);
                out.extend_from_slice(&addr.octets());
            }
        }
    }
}

/// Decode a list of address registration entries, consuming exactly 9 or 17
/// bytes per entry
pub fn decode_entries(value: &[u8]) -> Result<Vec<AddressEntry>, WireError> {
    let mut entries = Vec::new();
    let mut pos = 0;
    while pos < value.len() {
        let control = value[pos];
        if control & COMPRESSED_FLAG != 0 {
            let end = pos + COMPRESSED_ENTRY_LEN;
            if end > value.len() {
                return Err(WireError::Truncated);
            }
            let mut iid = [0u8; 8];
            iid.copy_from_slice(&value[pos + 1..end]);
            entries.push(AddressEntry::Compressed {
                context_id: control & 0x0f,
                iid,
            });
            pos = end;
        } else {
            let end = pos + FULL_ENTRY_LEN;
            if end > value.len() {
                return Err(WireError::Truncated);
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&value[pos + 1..end]);
            entries.push(AddressEntry::Full(Ipv6Addr::from(octets)));
            pos = end;
        }
    }
    Ok(entries)
}

/// Encode a list of address registration entries
pub fn encode_entries(entries: &[AddressEntry]) -> Vec<u8> {
    let mut out = Vec::with_capacity(entries.iter().map(AddressEntry::encoded_len).sum());
    for entry in entries {
        entry.encode_into(&mut out);
    }
    out
}

/// Find and decode the Address Registration TLV
pub fn read_registration(buf: &[u8]) -> Option<Vec<AddressEntry>> {
    tlv::find(buf, TlvType::AddressRegistration).and_then(|v| decode_entries(v).ok())
}

/// Append an Address Registration TLV
pub fn write_registration<'w>(
    w: &'w mut TlvWriter,
    entries: &[AddressEntry],
) -> Result<&'w mut TlvWriter, WireError> {
    w.tlv(TlvType::AddressRegistration, &encode_entries(entries))
}

/// Whether an address is link-local unicast (fe80::/10)
pub fn is_link_local(addr: &Ipv6Addr) -> bool {
    addr.segments()[0] & 0xffc0 == 0xfe80
}

/// Link-local address derived from an extended (EUI-64) MAC address,
/// with the universal/local bit inverted
pub fn link_local_from_mac64(mac64: &[u8; 8]) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    octets[0] = 0xfe;
    octets[1] = 0x80;
    octets[8..].copy_from_slice(mac64);
    octets[8] ^= 0x02;
    Ipv6Addr::from(octets)
}

/// Extended MAC address encoded in a link-local address IID
pub fn mac64_from_link_local(addr: &Ipv6Addr) -> [u8; 8] {
    let octets = addr.octets();
    let mut mac = [0u8; 8];
    mac.copy_from_slice(&octets[8..]);
    mac[0] ^= 0x02;
    mac
}

/// Mesh-local RLOC address: prefix + `0000:00ff:fe00:rloc16`
pub fn rloc_address(mesh_local_prefix: &[u8; 8], rloc16: u16) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    octets[..8].copy_from_slice(mesh_local_prefix);
    octets[11] = 0xff;
    octets[12] = 0xfe;
    octets[14..].copy_from_slice(&rloc16.to_be_bytes());
    Ipv6Addr::from(octets)
}

/// Short address value of an end device that has no RLOC16 yet
pub const RLOC16_UNASSIGNED: u16 = 0xfffe;

/// Short address value meaning "no short address"
pub const RLOC16_INVALID: u16 = 0xffff;

/// Number of child-ID bits in an RLOC16
pub const CHILD_ID_BITS: u16 = 9;

/// Router ID encoded in an RLOC16
pub fn router_id_from_rloc16(rloc16: u16) -> u8 {
    (rloc16 >> 10) as u8
}

/// Child ID encoded in an RLOC16
pub fn child_id_from_rloc16(rloc16: u16) -> u16 {
    rloc16 & ((1 << CHILD_ID_BITS) - 1)
}

/// RLOC16 of a router
pub fn rloc16_from_router_id(router_id: u8) -> u16 {
    (router_id as u16) << 10
}

/// Whether an RLOC16 names a router (child ID zero)
pub fn is_router_rloc16(rloc16: u16) -> bool {
    rloc16 < RLOC16_UNASSIGNED && child_id_from_rloc16(rloc16) == 0
}

/// Address built from a 64-bit prefix and an IID
pub fn address_from_iid(prefix: &[u8; 8], iid: &[u8; 8]) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    octets[..8].copy_from_slice(prefix);
    octets[8..].copy_from_slice(iid);
    Ipv6Addr::from(octets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_entries_consume_exact_sizes() {
        let entries = vec![
            AddressEntry::Compressed {
                context_id: 0,
                iid: [1, 2, 3, 4, 5, 6, 7, 8],
            },
            AddressEntry::Full("fd00:db8::1234".parse().unwrap()),
            AddressEntry::Compressed {
                context_id: 15,
                iid: [0xff; 8],
            },
            AddressEntry::Full(Ipv6Addr::UNSPECIFIED),
        ];
        let bytes = encode_entries(&entries);
        assert_eq!(bytes.len(), 9 + 17 + 9 + 17);
        assert_eq!(decode_entries(&bytes).unwrap(), entries);
    }

    #[test]
    fn test_truncated_entry() {
        let mut bytes = encode_entries(&[AddressEntry::Compressed {
            context_id: 1,
            iid: [9; 8],
        }]);
        bytes.pop();
        assert_eq!(decode_entries(&bytes), Err(WireError::Truncated));

        let short_full = [0u8; 16];
        assert_eq!(decode_entries(&short_full), Err(WireError::Truncated));
    }

    #[test]
    fn test_link_local_mapping() {
        let mac = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77];
        let ll = link_local_from_mac64(&mac);
        assert_eq!(ll, "fe80::211:2233:4455:6677".parse::<Ipv6Addr>().unwrap());
        assert!(is_link_local(&ll));
        assert_eq!(mac64_from_link_local(&ll), mac);
        assert!(!is_link_local(&"fd00::1".parse().unwrap()));
    }

    #[test]
    fn test_rloc16_fields() {
        assert_eq!(router_id_from_rloc16(0x0c01), 3);
        assert_eq!(child_id_from_rloc16(0x0c01), 1);
        assert_eq!(rloc16_from_router_id(62), 0xf800);
        assert!(is_router_rloc16(0x0400));
        assert!(!is_router_rloc16(0x0401));
        assert!(!is_router_rloc16(RLOC16_UNASSIGNED));
    }

    #[test]
    fn test_rloc_address() {
        let prefix = [0xfd, 0, 0x0d, 0xb8, 0, 0, 0, 0];
        let addr = rloc_address(&prefix, 0x0401);
        assert_eq!(addr, "fd00:db8::ff:fe00:401".parse::<Ipv6Addr>().unwrap());
    }
}
