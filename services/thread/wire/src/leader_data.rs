//! Leader Data TLV.

use crate::error::WireError;
use crate::tlv::{self, TlvType, TlvWriter};
use serde::{Deserialize, Serialize};

/// Encoded Leader Data value length
pub const LEADER_DATA_LEN: usize = 8;

/// Partition-identifying leader data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaderData {
    /// Partition identifier
    pub partition_id: u32,
    /// Partition weighting
    pub weighting: u8,
    /// Full network data version
    pub data_version: u8,
    /// Stable network data version
    pub stable_data_version: u8,
    /// Router ID of the partition leader
    pub leader_router_id: u8,
}

impl LeaderData {
    /// Decode a Leader Data value
    pub fn decode(value: &[u8]) -> Result<Self, WireError> {
        if value.len() != LEADER_DATA_LEN {
            return Err(WireError::Length {
                tlv: TlvType::LeaderData as u8,
                expected: LEADER_DATA_LEN,
                actual: value.len(),
            });
        }
        Ok(Self {
            partition_id: u32::from_be_bytes([value[0], value[1], value[2], value[3]]),
            weighting: value[4],
            data_version: value[5],
            stable_data_version: value[6],
            leader_router_id: value[7],
        })
    }

    /// Encode as a Leader Data value
    pub fn encode(&self) -> [u8; LEADER_DATA_LEN] {
        let p = self.partition_id.to_be_bytes();
        [
            p[0],
            p[1],
            p[2],
            p[3],
            self.weighting,
            self.data_version,
            self.stable_data_version,
            self.leader_router_id,
        ]
    }

    /// Find and decode the Leader Data TLV in a message payload
    pub fn read(buf: &[u8]) -> Option<Self> {
        tlv::find(buf, TlvType::LeaderData).and_then(|v| Self::decode(v).ok())
    }

    /// Append as a Leader Data TLV
    pub fn write<'w>(&self, w: &'w mut TlvWriter) -> Result<&'w mut TlvWriter, WireError> {
        w.tlv(TlvType::LeaderData, &self.encode())
    }

    /// Whether both partition identity fields match
    pub fn same_partition(&self, other: &LeaderData) -> bool {
        self.partition_id == other.partition_id && self.weighting == other.weighting
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leader_data_layout() {
        let ld = LeaderData {
            partition_id: 0x01020304,
            weighting: 64,
            data_version: 10,
            stable_data_version: 3,
            leader_router_id: 2,
        };
        assert_eq!(ld.encode(), [1, 2, 3, 4, 64, 10, 3, 2]);

        let mut w = TlvWriter::new(16);
        ld.write(&mut w).unwrap();
        assert_eq!(LeaderData::read(w.as_slice()), Some(ld));
    }

    #[test]
    fn test_leader_data_boundaries() {
        for ld in [
            LeaderData {
                partition_id: 0,
                weighting: 0,
                data_version: 0,
                stable_data_version: 0,
                leader_router_id: 0,
            },
            LeaderData {
                partition_id: u32::MAX,
                weighting: u8::MAX,
                data_version: u8::MAX,
                stable_data_version: u8::MAX,
                leader_router_id: 62,
            },
        ] {
            assert_eq!(LeaderData::decode(&ld.encode()).unwrap(), ld);
        }
    }

    #[test]
    fn test_leader_data_wrong_length() {
        assert!(matches!(
            LeaderData::decode(&[0; 7]),
            Err(WireError::Length { expected: 8, actual: 7, .. })
        ));
    }
}
