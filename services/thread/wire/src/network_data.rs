//! Network Data: the leader-authoritative list of Prefix, Border Router,
//! Has Route, Context, Service and Commissioning Data TLVs.
//!
//! Every network-data TLV type byte carries the sub-TLV kind in its low bits
//! and the "stable" marker in its top bit. Sleepy children that only want
//! stable data receive [`NetworkData::stable_subset`].

use crate::error::WireError;
use crate::tlv::{TlvIter, TlvWriter};
use bitflags::bitflags;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Type-byte flag marking stable data
pub const STABLE_FLAG: u8 = 0x80;

/// Largest network data blob carried in a single MLE message
pub const MAX_NETWORK_DATA_SIZE: usize = 254;

/// Network data TLV kinds
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkDataKind {
    /// External route via a border router
    HasRoute = 0,
    /// On-mesh or external prefix container
    Prefix = 1,
    /// Border router serving a prefix
    BorderRouter = 2,
    /// 6LoWPAN compression context
    Context = 3,
    /// Commissioning dataset fragment
    CommissioningData = 4,
    /// Service container
    Service = 5,
    /// Server of a service
    Server = 6,
}

impl NetworkDataKind {
    /// Decode the kind from a type byte, ignoring the stable flag
    pub fn from_type_byte(typ: u8) -> Option<Self> {
        Some(match typ & !STABLE_FLAG {
            0 => NetworkDataKind::HasRoute,
            1 => NetworkDataKind::Prefix,
            2 => NetworkDataKind::BorderRouter,
            3 => NetworkDataKind::Context,
            4 => NetworkDataKind::CommissioningData,
            5 => NetworkDataKind::Service,
            6 => NetworkDataKind::Server,
            _ => return None,
        })
    }

    /// Type byte for this kind
    pub fn type_byte(self, stable: bool) -> u8 {
        if stable {
            self as u8 | STABLE_FLAG
        } else {
            self as u8
        }
    }
}

bitflags! {
    /// Border router flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct BorderRouterFlags: u16 {
        /// Preferred prefix
        const PREFERRED = 1 << 13;
        /// Stateless address autoconfiguration allowed
        const SLAAC = 1 << 12;
        /// DHCPv6 address assignment
        const DHCP = 1 << 11;
        /// DHCPv6 other configuration
        const CONFIGURE = 1 << 10;
        /// Default route
        const DEFAULT_ROUTE = 1 << 9;
        /// Prefix is on-mesh
        const ON_MESH = 1 << 8;
        /// ND DNS option
        const ND_DNS = 1 << 7;
        /// Preference bits
        const PREFERENCE_MASK = 0b11 << 14;
    }
}

/// Border router sub-entry of a prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorderRouterEntry {
    /// RLOC16 of the border router
    pub rloc16: u16,
    /// Flags
    pub flags: BorderRouterFlags,
    /// Carried in stable data
    pub stable: bool,
}

/// Has-route sub-entry of a prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HasRouteEntry {
    /// RLOC16 of the router advertising the route
    pub rloc16: u16,
    /// Route preference bits (0..3)
    pub preference: u8,
    /// Carried in stable data
    pub stable: bool,
}

/// Context sub-entry of a prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    /// Context ID (0..15)
    pub context_id: u8,
    /// Context may be used for compression
    pub compress: bool,
    /// Context length in bits
    pub context_length: u8,
    /// Carried in stable data
    pub stable: bool,
}

/// Decoded Prefix TLV
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixEntry {
    /// Domain ID
    pub domain_id: u8,
    /// Prefix bytes (unused tail is zero)
    pub prefix: [u8; 16],
    /// Prefix length in bits
    pub prefix_length: u8,
    /// The prefix container itself is stable
    pub stable: bool,
    /// Border routers serving the prefix
    pub border_routers: Vec<BorderRouterEntry>,
    /// Routers with an external route to the prefix
    pub has_routes: Vec<HasRouteEntry>,
    /// Compression context
    pub context: Option<ContextEntry>,
}

impl PrefixEntry {
    /// Create a prefix entry with no sub-entries
    pub fn new(prefix: [u8; 16], prefix_length: u8, stable: bool) -> Self {
        Self {
            domain_id: 0,
            prefix,
            prefix_length,
            stable,
            border_routers: Vec::new(),
            has_routes: Vec::new(),
            context: None,
        }
    }

    fn prefix_bytes(&self) -> usize {
        (self.prefix_length as usize).div_ceil(8)
    }

    fn decode(stable: bool, value: &[u8]) -> Result<Self, WireError> {
        if value.len() < 2 {
            return Err(WireError::Truncated);
        }
        let domain_id = value[0];
        let prefix_length = value[1];
        if prefix_length > 128 {
            return Err(WireError::Malformed("prefix length"));
        }
        let plen = (prefix_length as usize).div_ceil(8);
        if value.len() < 2 + plen {
            return Err(WireError::Truncated);
        }
        let mut prefix = [0u8; 16];
        prefix[..plen].copy_from_slice(&value[2..2 + plen]);

        let mut entry = Self {
            domain_id,
            prefix,
            prefix_length,
            stable,
            border_routers: Vec::new(),
            has_routes: Vec::new(),
            context: None,
        };

        let subs = &value[2 + plen..];
        let mut iter = TlvIter::new(subs);
        for sub in iter.by_ref() {
            let sub_stable = sub.typ & STABLE_FLAG != 0;
            match NetworkDataKind::from_type_byte(sub.typ) {
                Some(NetworkDataKind::BorderRouter) => {
                    if sub.value.len() % 4 != 0 {
                        return Err(WireError::Malformed("border router"));
                    }
                    for chunk in sub.value.chunks_exact(4) {
                        entry.border_routers.push(BorderRouterEntry {
                            rloc16: u16::from_be_bytes([chunk[0], chunk[1]]),
                            flags: BorderRouterFlags::from_bits_retain(u16::from_be_bytes([
                                chunk[2], chunk[3],
                            ])),
                            stable: sub_stable,
                        });
                    }
                }
                Some(NetworkDataKind::HasRoute) => {
                    if sub.value.len() % 3 != 0 {
                        return Err(WireError::Malformed("has route"));
                    }
                    for chunk in sub.value.chunks_exact(3) {
                        entry.has_routes.push(HasRouteEntry {
                            rloc16: u16::from_be_bytes([chunk[0], chunk[1]]),
                            preference: chunk[2] >> 6,
                            stable: sub_stable,
                        });
                    }
                }
                Some(NetworkDataKind::Context) => {
                    if sub.value.len() < 2 {
                        return Err(WireError::Malformed("context"));
                    }
                    entry.context = Some(ContextEntry {
                        context_id: sub.value[0] & 0x0f,
                        compress: sub.value[0] & 0x10 != 0,
                        context_length: sub.value[1],
                        stable: sub_stable,
                    });
                }
                _ => debug!("Skipping prefix sub-tlv {:#04x}", sub.typ),
            }
        }
        if iter.is_truncated() {
            return Err(WireError::Truncated);
        }
        Ok(entry)
    }

    fn encode(&self, stable_only: bool) -> Result<Vec<u8>, WireError> {
        let mut w = TlvWriter::new(MAX_NETWORK_DATA_SIZE);
        w.put_u8(self.domain_id)?
            .put_u8(self.prefix_length)?
            .put_slice(&self.prefix[..self.prefix_bytes()])?;

        for stable in [true, false] {
            if stable_only && !stable {
                continue;
            }
            let mut value = Vec::new();
            for hr in self.has_routes.iter().filter(|e| e.stable == stable) {
                value.extend_from_slice(&hr.rloc16.to_be_bytes());
                value.push((hr.preference & 0x03) << 6);
            }
            if !value.is_empty() {
                w.tlv_raw(NetworkDataKind::HasRoute.type_byte(stable), &value)?;
            }

            let mut value = Vec::new();
            for br in self.border_routers.iter().filter(|e| e.stable == stable) {
                value.extend_from_slice(&br.rloc16.to_be_bytes());
                value.extend_from_slice(&br.flags.bits().to_be_bytes());
            }
            if !value.is_empty() {
                w.tlv_raw(NetworkDataKind::BorderRouter.type_byte(stable), &value)?;
            }

            if let Some(ctx) = self.context.filter(|c| c.stable == stable) {
                let flags = (ctx.context_id & 0x0f) | if ctx.compress { 0x10 } else { 0 };
                w.tlv_raw(
                    NetworkDataKind::Context.type_byte(stable),
                    &[flags, ctx.context_length],
                )?;
            }
        }
        Ok(w.freeze().to_vec())
    }
}

/// A single top-level network data TLV
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkDataTlv<'a> {
    /// Decoded kind, `None` for unknown types
    pub kind: Option<NetworkDataKind>,
    /// Stable flag
    pub stable: bool,
    /// Value bytes
    pub value: &'a [u8],
}

/// Owned network data blob
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkData {
    raw: Bytes,
}

impl NetworkData {
    /// Wrap a raw blob
    pub fn new(raw: Bytes) -> Self {
        Self { raw }
    }

    /// Empty network data
    pub fn empty() -> Self {
        Self::default()
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Blob length
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Whether the blob is empty
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Iterate top-level TLVs
    pub fn tlvs(&self) -> impl Iterator<Item = NetworkDataTlv<'_>> {
        TlvIter::new(&self.raw).map(|t| NetworkDataTlv {
            kind: NetworkDataKind::from_type_byte(t.typ),
            stable: t.typ & STABLE_FLAG != 0,
            value: t.value,
        })
    }

    /// Check that every TLV and prefix sub-TLV is intact
    pub fn validate(&self) -> Result<(), WireError> {
        let mut iter = TlvIter::new(&self.raw);
        for t in iter.by_ref() {
            if NetworkDataKind::from_type_byte(t.typ) == Some(NetworkDataKind::Prefix) {
                PrefixEntry::decode(t.typ & STABLE_FLAG != 0, t.value)?;
            }
        }
        if iter.is_truncated() {
            return Err(WireError::Truncated);
        }
        Ok(())
    }

    /// Decoded Prefix TLVs; malformed prefixes are skipped
    pub fn prefixes(&self) -> Vec<PrefixEntry> {
        self.tlvs()
            .filter(|t| t.kind == Some(NetworkDataKind::Prefix))
            .filter_map(|t| match PrefixEntry::decode(t.stable, t.value) {
                Ok(p) => Some(p),
                Err(e) => {
                    debug!("Skipping malformed prefix tlv: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Commissioning data value, if present
    pub fn commissioning_data(&self) -> Option<&[u8]> {
        self.tlvs()
            .find(|t| t.kind == Some(NetworkDataKind::CommissioningData))
            .map(|t| t.value)
    }

    /// Whether `rloc16` is the only border router for some prefix
    pub fn is_sole_border_router(&self, rloc16: u16) -> bool {
        self.prefixes().iter().any(|p| {
            !p.border_routers.is_empty() && p.border_routers.iter().all(|br| br.rloc16 == rloc16)
        })
    }

    /// The stable-only subset: temporary top-level TLVs are removed, and
    /// temporary sub-TLVs are removed from stable Prefix and Service TLVs.
    pub fn stable_subset(&self) -> NetworkData {
        let mut out = Vec::with_capacity(self.raw.len());
        for t in TlvIter::new(&self.raw) {
            if t.typ & STABLE_FLAG == 0 {
                continue;
            }
            let value: Vec<u8> = match NetworkDataKind::from_type_byte(t.typ) {
                Some(NetworkDataKind::Prefix) => match PrefixEntry::decode(true, t.value)
                    .and_then(|p| p.encode(true))
                {
                    Ok(v) => v,
                    Err(_) => continue,
                },
                Some(NetworkDataKind::Service) => match stable_service(t.value) {
                    Some(v) => v,
                    None => continue,
                },
                _ => t.value.to_vec(),
            };
            out.push(t.typ);
            out.push(value.len() as u8);
            out.extend_from_slice(&value);
        }
        NetworkData::new(Bytes::from(out))
    }

    /// Build network data from prefixes
    pub fn from_prefixes(prefixes: &[PrefixEntry]) -> Result<NetworkData, WireError> {
        let mut w = TlvWriter::new(MAX_NETWORK_DATA_SIZE);
        for prefix in prefixes {
            let value = prefix.encode(false)?;
            w.tlv_raw(NetworkDataKind::Prefix.type_byte(prefix.stable), &value)?;
        }
        Ok(NetworkData::new(w.freeze()))
    }
}

/// Keep the service header and its stable sub-TLVs
fn stable_service(value: &[u8]) -> Option<Vec<u8>> {
    let first = *value.first()?;
    let mut header = 1;
    if first & 0x80 == 0 {
        // explicit enterprise number
        header += 4;
    }
    let data_len = *value.get(header)? as usize;
    header += 1 + data_len;
    if value.len() < header {
        return None;
    }
    let mut out = value[..header].to_vec();
    for sub in TlvIter::new(&value[header..]) {
        if sub.typ & STABLE_FLAG != 0 {
            out.push(sub.typ);
            out.push(sub.value.len() as u8);
            out.extend_from_slice(sub.value);
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_prefix() -> PrefixEntry {
        let mut prefix = [0u8; 16];
        prefix[..8].copy_from_slice(&[0xfd, 0x00, 0xab, 0xcd, 0, 0, 0, 0]);
        let mut entry = PrefixEntry::new(prefix, 64, true);
        entry.border_routers.push(BorderRouterEntry {
            rloc16: 0x0400,
            flags: BorderRouterFlags::ON_MESH | BorderRouterFlags::SLAAC,
            stable: true,
        });
        entry.border_routers.push(BorderRouterEntry {
            rloc16: 0x0800,
            flags: BorderRouterFlags::ON_MESH,
            stable: false,
        });
        entry.has_routes.push(HasRouteEntry {
            rloc16: 0x0c00,
            preference: 1,
            stable: false,
        });
        entry.context = Some(ContextEntry {
            context_id: 1,
            compress: true,
            context_length: 64,
            stable: true,
        });
        entry
    }

    #[test]
    fn test_prefix_encode_decode() {
        let nd = NetworkData::from_prefixes(&[sample_prefix()]).unwrap();
        assert!(nd.validate().is_ok());
        let prefixes = nd.prefixes();
        assert_eq!(prefixes.len(), 1);
        let p = &prefixes[0];
        assert_eq!(p.prefix_length, 64);
        assert_eq!(p.border_routers.len(), 2);
        assert_eq!(p.has_routes.len(), 1);
        assert_eq!(p.context.unwrap().context_id, 1);
    }

    #[test]
    fn test_stable_subset_drops_temporary() {
        let mut temporary = PrefixEntry::new([0x20; 16], 48, false);
        temporary.has_routes.push(HasRouteEntry {
            rloc16: 0x1000,
            preference: 0,
            stable: false,
        });
        let nd = NetworkData::from_prefixes(&[sample_prefix(), temporary]).unwrap();
        assert_eq!(nd.prefixes().len(), 2);

        let stable = nd.stable_subset();
        let prefixes = stable.prefixes();
        assert_eq!(prefixes.len(), 1);
        assert_eq!(prefixes[0].border_routers.len(), 1);
        assert_eq!(prefixes[0].border_routers[0].rloc16, 0x0400);
        assert!(prefixes[0].has_routes.is_empty());
        assert!(prefixes[0].context.is_some());
        assert!(stable.len() < nd.len());
    }

    #[test]
    fn test_sole_border_router() {
        let mut prefix = PrefixEntry::new([0xfd; 16], 64, true);
        prefix.border_routers.push(BorderRouterEntry {
            rloc16: 0x0400,
            flags: BorderRouterFlags::ON_MESH,
            stable: true,
        });
        let nd = NetworkData::from_prefixes(&[prefix]).unwrap();
        assert!(nd.is_sole_border_router(0x0400));
        assert!(!nd.is_sole_border_router(0x0800));

        let shared = NetworkData::from_prefixes(&[sample_prefix()]).unwrap();
        assert!(!shared.is_sole_border_router(0x0400));
    }

    #[test]
    fn test_truncated_prefix_rejected() {
        let raw = vec![NetworkDataKind::Prefix.type_byte(true), 4, 0, 64, 0xfd, 0x00];
        let nd = NetworkData::new(Bytes::from(raw));
        assert!(nd.validate().is_err());
        assert!(nd.prefixes().is_empty());
    }

    #[test]
    fn test_stable_service_keeps_stable_servers() {
        let service = vec![
            0x81, // T bit + service id 1
            1,
            0x5c,
            NetworkDataKind::Server.type_byte(true),
            2,
            0x04,
            0x00,
            NetworkDataKind::Server.type_byte(false),
            2,
            0x08,
            0x00,
        ];
        let mut raw = vec![NetworkDataKind::Service.type_byte(true), service.len() as u8];
        raw.extend_from_slice(&service);
        let stable = NetworkData::new(Bytes::from(raw)).stable_subset();
        let tlv = stable.tlvs().next().unwrap();
        assert_eq!(tlv.kind, Some(NetworkDataKind::Service));
        assert_eq!(tlv.value.len(), 3 + 4);
    }
}
