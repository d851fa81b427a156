//! MLE security header.
//!
//! Every authenticated MLE message carries an auxiliary security header
//! ahead of the command byte:
//!
//! ```text
//! +-----------------------+-------------------------------+
//! | security control (1B) | level:3 | key_id_mode:2 | 0:3 |
//! +-----------------------+-------------------------------+
//! | frame counter (4B LE) |                               |
//! +-----------------------+-------------------------------+
//! | key source (0/4/8B)   | depends on key_id_mode        |
//! +-----------------------+-------------------------------+
//! | key index (0/1B)      | present unless key_id_mode=0  |
//! +-----------------------+-------------------------------+
//! ```

use crate::error::WireError;
use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

/// Security suite byte preceding secured MLE messages
pub const SECURITY_SUITE_SECURED: u8 = 0x00;

/// Security suite byte of unsecured (discovery) MLE messages
pub const SECURITY_SUITE_NONE: u8 = 0xFF;

/// Security level used by MLE (ENC-MIC-32)
pub const MLE_SECURITY_LEVEL: u8 = 5;

/// Key identifier mode
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyIdMode {
    /// Key implicitly known
    Implicit = 0,
    /// Key index only
    Index = 1,
    /// 4-byte key source plus index
    Source4 = 2,
    /// 8-byte key source plus index
    Source8 = 3,
}

impl KeyIdMode {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => KeyIdMode::Implicit,
            1 => KeyIdMode::Index,
            2 => KeyIdMode::Source4,
            _ => KeyIdMode::Source8,
        }
    }

    /// Width of the key source field
    pub fn source_len(self) -> usize {
        match self {
            KeyIdMode::Implicit | KeyIdMode::Index => 0,
            KeyIdMode::Source4 => 4,
            KeyIdMode::Source8 => 8,
        }
    }

    /// Width of the whole key identifier field
    pub fn identifier_len(self) -> usize {
        match self {
            KeyIdMode::Implicit => 0,
            other => other.source_len() + 1,
        }
    }
}

/// Auxiliary security header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityHeader {
    /// Security level (0..7)
    pub level: u8,
    /// Key identifier mode
    pub key_id_mode: KeyIdMode,
    /// Sender frame counter
    pub frame_counter: u32,
    /// Key source; only the first `key_id_mode.source_len()` bytes are used
    pub key_source: [u8; 8],
    /// Key index
    pub key_index: u8,
}

impl SecurityHeader {
    /// MLE header for the given key sequence and frame counter
    pub fn mle(key_sequence: u32, frame_counter: u32) -> Self {
        let mut key_source = [0u8; 8];
        key_source[..4].copy_from_slice(&key_sequence.to_be_bytes());
        Self {
            level: MLE_SECURITY_LEVEL,
            key_id_mode: KeyIdMode::Source4,
            frame_counter,
            key_source,
            key_index: ((key_sequence & 0x7f) + 1) as u8,
        }
    }

    /// Key sequence carried in a 4-byte key source
    pub fn key_sequence(&self) -> Option<u32> {
        match self.key_id_mode {
            KeyIdMode::Source4 => Some(u32::from_be_bytes([
                self.key_source[0],
                self.key_source[1],
                self.key_source[2],
                self.key_source[3],
            ])),
            _ => None,
        }
    }

    /// Encoded size
    pub fn encoded_len(&self) -> usize {
        5 + self.key_id_mode.identifier_len()
    }

    /// Encode the header
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8((self.level & 0x07) | ((self.key_id_mode as u8) << 3));
        buf.put_u32_le(self.frame_counter);
        let source_len = self.key_id_mode.source_len();
        buf.put_slice(&self.key_source[..source_len]);
        if self.key_id_mode != KeyIdMode::Implicit {
            buf.put_u8(self.key_index);
        }
    }

    /// Decode the header, advancing `buf`
    pub fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        if buf.remaining() < 5 {
            return Err(WireError::Truncated);
        }
        let control = buf.get_u8();
        if control & 0xe0 != 0 {
            return Err(WireError::Security(control));
        }
        let level = control & 0x07;
        let key_id_mode = KeyIdMode::from_bits(control >> 3);
        let frame_counter = buf.get_u32_le();

        if buf.remaining() < key_id_mode.identifier_len() {
            return Err(WireError::Truncated);
        }
        let mut key_source = [0u8; 8];
        let source_len = key_id_mode.source_len();
        buf.copy_to_slice(&mut key_source[..source_len]);
        let key_index = if key_id_mode != KeyIdMode::Implicit {
            buf.get_u8()
        } else {
            0
        };

        Ok(Self {
            level,
            key_id_mode,
            frame_counter,
            key_source,
            key_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mle_header_encode_decode() {
        let header = SecurityHeader::mle(0x0000_0102, 77);
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), 10);
        assert_eq!(buf[0], 0x15);

        let mut slice: &[u8] = &buf;
        let decoded = SecurityHeader::decode(&mut slice).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.key_sequence(), Some(0x102));
        assert!(slice.is_empty());
    }

    #[test]
    fn test_key_id_modes() {
        for (mode, len) in [
            (KeyIdMode::Implicit, 5),
            (KeyIdMode::Index, 6),
            (KeyIdMode::Source4, 10),
            (KeyIdMode::Source8, 14),
        ] {
            let header = SecurityHeader {
                level: 5,
                key_id_mode: mode,
                frame_counter: u32::MAX,
                key_source: [7; 8],
                key_index: 3,
            };
            let mut buf = BytesMut::new();
            header.encode(&mut buf);
            assert_eq!(buf.len(), len);
            assert_eq!(header.encoded_len(), len);
        }
    }

    #[test]
    fn test_truncated_header() {
        let mut slice: &[u8] = &[0x15, 1, 0, 0, 0, 9];
        assert_eq!(SecurityHeader::decode(&mut slice), Err(WireError::Truncated));
    }

    #[test]
    fn test_reserved_bits() {
        let mut slice: &[u8] = &[0x35, 1, 0, 0, 0];
        assert!(matches!(
            SecurityHeader::decode(&mut slice),
            Err(WireError::Security(0x35))
        ));
    }
}
