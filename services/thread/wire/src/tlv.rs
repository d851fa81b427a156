//! Generic MLE TLV scanning and checked TLV writing.
//!
//! A TLV is `type(u8) | length(u8) | value`. A length byte of `0xFF` marks the
//! extended form, where the real length follows as a big-endian `u16`.
//! Readers never fail hard: a truncated or absent TLV reads as `None`.

use crate::error::WireError;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Length byte announcing an extended (u16) length
pub const EXTENDED_LENGTH: u8 = 0xFF;

/// Maximum value length that fits the short form
pub const MAX_SHORT_LENGTH: usize = 0xFE;

/// MLE TLV types
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TlvType {
    /// Sender RLOC16
    SourceAddress = 0,
    /// Device mode bits
    Mode = 1,
    /// Child timeout in seconds
    Timeout = 2,
    /// Challenge bytes
    Challenge = 3,
    /// Response to a challenge
    Response = 4,
    /// Link-layer frame counter
    LinkLayerFrameCounter = 5,
    /// Link quality (unused by Thread)
    LinkQuality = 6,
    /// Network parameter (unused by Thread)
    NetworkParameter = 7,
    /// MLE frame counter
    MleFrameCounter = 8,
    /// Router table
    Route64 = 9,
    /// Assigned RLOC16
    Address16 = 10,
    /// Partition leader data
    LeaderData = 11,
    /// Network data blob
    NetworkData = 12,
    /// Requested TLV list
    TlvRequest = 13,
    /// Parent request scan mask
    ScanMask = 14,
    /// Parent connectivity
    Connectivity = 15,
    /// Link margin in dB
    LinkMargin = 16,
    /// Status code
    Status = 17,
    /// Thread version
    Version = 18,
    /// Registered IPv6 addresses
    AddressRegistration = 19,
    /// Channel page and number
    Channel = 20,
    /// PAN identifier
    PanId = 21,
    /// Active operational dataset timestamp
    ActiveTimestamp = 22,
    /// Pending operational dataset timestamp
    PendingTimestamp = 23,
    /// Active operational dataset
    ActiveDataset = 24,
    /// Pending operational dataset
    PendingDataset = 25,
    /// Discovery
    Discovery = 26,
}

impl TryFrom<u8> for TlvType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use TlvType::*;
        Ok(match value {
            0 => SourceAddress,
            1 => Mode,
            2 => Timeout,
            3 => Challenge,
            4 => Response,
            5 => LinkLayerFrameCounter,
            6 => LinkQuality,
            7 => NetworkParameter,
            8 => MleFrameCounter,
            9 => Route64,
            10 => Address16,
            11 => LeaderData,
            12 => NetworkData,
            13 => TlvRequest,
            14 => ScanMask,
            15 => Connectivity,
            16 => LinkMargin,
            17 => Status,
            18 => Version,
            19 => AddressRegistration,
            20 => Channel,
            21 => PanId,
            22 => ActiveTimestamp,
            23 => PendingTimestamp,
            24 => ActiveDataset,
            25 => PendingDataset,
            26 => Discovery,
            _ => return Err(WireError::Malformed("tlv type")),
        })
    }
}

/// A borrowed TLV
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlvSlice<'a> {
    /// Raw type byte
    pub typ: u8,
    /// Value bytes
    pub value: &'a [u8],
}

/// Iterator over the TLVs of a buffer. Stops at the first truncated header
/// or value; `is_truncated` tells whether that happened.
#[derive(Debug, Clone)]
pub struct TlvIter<'a> {
    buf: &'a [u8],
    pos: usize,
    truncated: bool,
}

impl<'a> TlvIter<'a> {
    /// Iterate the TLVs in `buf`
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            truncated: false,
        }
    }

    /// Whether iteration stopped on a truncated TLV
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

impl<'a> Iterator for TlvIter<'a> {
    type Item = TlvSlice<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let buf: &'a [u8] = self.buf;
        let rest = &buf[self.pos..];
        if rest.is_empty() {
            return None;
        }
        if rest.len() < 2 {
            self.truncated = true;
            return None;
        }
        let typ = rest[0];
        let (header, len) = if rest[1] == EXTENDED_LENGTH {
            if rest.len() < 4 {
                self.truncated = true;
                return None;
            }
            (4, u16::from_be_bytes([rest[2], rest[3]]) as usize)
        } else {
            (2, rest[1] as usize)
        };
        if rest.len() < header + len {
            self.truncated = true;
            return None;
        }
        self.pos += header + len;
        Some(TlvSlice {
            typ,
            value: &rest[header..header + len],
        })
    }
}

/// Find the first TLV with raw type byte `typ`
pub fn find_raw(buf: &[u8], typ: u8) -> Option<&[u8]> {
    TlvIter::new(buf).find(|t| t.typ == typ).map(|t| t.value)
}

/// Find the first TLV of the given type
pub fn find(buf: &[u8], typ: TlvType) -> Option<&[u8]> {
    find_raw(buf, typ as u8)
}

/// Whether a TLV of the given type is present and intact
pub fn contains(buf: &[u8], typ: TlvType) -> bool {
    find(buf, typ).is_some()
}

fn find_fixed<const N: usize>(buf: &[u8], typ: TlvType) -> Option<[u8; N]> {
    let value = find(buf, typ)?;
    value.try_into().ok()
}

/// Read a one-byte TLV
pub fn read_u8(buf: &[u8], typ: TlvType) -> Option<u8> {
    find_fixed::<1>(buf, typ).map(|b| b[0])
}

/// Read a two-byte big-endian TLV
pub fn read_u16(buf: &[u8], typ: TlvType) -> Option<u16> {
    find_fixed::<2>(buf, typ).map(u16::from_be_bytes)
}

/// Read a four-byte big-endian TLV
pub fn read_u32(buf: &[u8], typ: TlvType) -> Option<u32> {
    find_fixed::<4>(buf, typ).map(u32::from_be_bytes)
}

/// Read an eight-byte big-endian TLV
pub fn read_u64(buf: &[u8], typ: TlvType) -> Option<u64> {
    find_fixed::<8>(buf, typ).map(u64::from_be_bytes)
}

/// Read a TLV whose value width is `min..=max`
pub fn read_bounded(buf: &[u8], typ: TlvType, min: usize, max: usize) -> Option<&[u8]> {
    find(buf, typ).filter(|v| v.len() >= min && v.len() <= max)
}

/// Checked TLV writer with a hard capacity.
///
/// All appends return the writer so calls chain with `?`; exceeding the
/// capacity yields [`WireError::BufferFull`] and leaves the buffer unchanged.
#[derive(Debug, Clone)]
pub struct TlvWriter {
    buf: BytesMut,
    capacity: usize,
}

impl TlvWriter {
    /// Create a writer limited to `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity.min(1280)),
            capacity,
        }
    }

    /// Bytes still available
    pub fn remaining(&self) -> usize {
        self.capacity - self.buf.len()
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn check(&self, needed: usize) -> Result<(), WireError> {
        if needed > self.remaining() {
            return Err(WireError::BufferFull {
                needed,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    /// Append a raw byte
    pub fn put_u8(&mut self, value: u8) -> Result<&mut Self, WireError> {
        self.check(1)?;
        self.buf.put_u8(value);
        Ok(self)
    }

    /// Append raw bytes
    pub fn put_slice(&mut self, value: &[u8]) -> Result<&mut Self, WireError> {
        self.check(value.len())?;
        self.buf.put_slice(value);
        Ok(self)
    }

    /// Append a TLV with a raw type byte
    pub fn tlv_raw(&mut self, typ: u8, value: &[u8]) -> Result<&mut Self, WireError> {
        if value.len() > u16::MAX as usize {
            return Err(WireError::Length {
                tlv: typ,
                expected: u16::MAX as usize,
                actual: value.len(),
            });
        }
        let extended = value.len() > MAX_SHORT_LENGTH;
        let header = if extended { 4 } else { 2 };
        self.check(header + value.len())?;
        self.buf.put_u8(typ);
        if extended {
            self.buf.put_u8(EXTENDED_LENGTH);
            self.buf.put_u16(value.len() as u16);
        } else {
            self.buf.put_u8(value.len() as u8);
        }
        self.buf.put_slice(value);
        Ok(self)
    }

    /// Append a TLV
    pub fn tlv(&mut self, typ: TlvType, value: &[u8]) -> Result<&mut Self, WireError> {
        self.tlv_raw(typ as u8, value)
    }

    /// Append a one-byte TLV
    pub fn tlv_u8(&mut self, typ: TlvType, value: u8) -> Result<&mut Self, WireError> {
        self.tlv(typ, &[value])
    }

    /// Append a two-byte TLV
    pub fn tlv_u16(&mut self, typ: TlvType, value: u16) -> Result<&mut Self, WireError> {
        self.tlv(typ, &value.to_be_bytes())
    }

    /// Append a four-byte TLV
    pub fn tlv_u32(&mut self, typ: TlvType, value: u32) -> Result<&mut Self, WireError> {
        self.tlv(typ, &value.to_be_bytes())
    }

    /// Append an eight-byte TLV
    pub fn tlv_u64(&mut self, typ: TlvType, value: u64) -> Result<&mut Self, WireError> {
        self.tlv(typ, &value.to_be_bytes())
    }

    /// Written bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Finish writing
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_fixed_widths() {
        let mut w = TlvWriter::new(64);
        w.tlv_u16(TlvType::SourceAddress, 0x0400)
            .unwrap()
            .tlv_u32(TlvType::Timeout, 240)
            .unwrap()
            .tlv_u8(TlvType::Mode, 0x0f)
            .unwrap();
        let buf = w.freeze();

        assert_eq!(read_u16(&buf, TlvType::SourceAddress), Some(0x0400));
        assert_eq!(read_u32(&buf, TlvType::Timeout), Some(240));
        assert_eq!(read_u8(&buf, TlvType::Mode), Some(0x0f));
        assert_eq!(read_u8(&buf, TlvType::Status), None);
    }

    #[test]
    fn test_wrong_width_reads_as_absent() {
        let buf = [TlvType::SourceAddress as u8, 3, 1, 2, 3];
        assert_eq!(read_u16(&buf, TlvType::SourceAddress), None);
        assert!(find(&buf, TlvType::SourceAddress).is_some());
    }

    #[test]
    fn test_truncated_value_is_absent() {
        let buf = [TlvType::Mode as u8, 1, 0x08, TlvType::Timeout as u8, 4, 0, 0];
        assert_eq!(read_u8(&buf, TlvType::Mode), Some(0x08));
        assert_eq!(read_u32(&buf, TlvType::Timeout), None);

        let mut iter = TlvIter::new(&buf);
        assert!(iter.next().is_some());
        assert!(iter.next().is_none());
        assert!(iter.is_truncated());
    }

    #[test]
    fn test_extended_length() {
        let value = vec![0xAB; 300];
        let mut w = TlvWriter::new(400);
        w.tlv(TlvType::NetworkData, &value).unwrap();
        let buf = w.freeze();
        assert_eq!(buf[1], EXTENDED_LENGTH);
        assert_eq!(find(&buf, TlvType::NetworkData).map(|v| v.len()), Some(300));
    }

    #[test]
    fn test_writer_capacity() {
        let mut w = TlvWriter::new(5);
        w.tlv_u16(TlvType::SourceAddress, 1).unwrap();
        let err = w.tlv_u8(TlvType::Mode, 1).unwrap_err();
        assert_eq!(
            err,
            WireError::BufferFull {
                needed: 3,
                available: 1
            }
        );
        assert_eq!(w.len(), 4);
    }

    #[test]
    fn test_type_conversion() {
        assert_eq!(TlvType::try_from(9).unwrap(), TlvType::Route64);
        assert!(TlvType::try_from(200).is_err());
    }
}
