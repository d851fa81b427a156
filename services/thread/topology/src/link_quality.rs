//! Per-neighbor link quality and data-set bookkeeping kept beside the
//! neighbor table.

use crate::neighbor::NeighborIndex;
use serde::{Deserialize, Serialize};

/// Receiver sensitivity floor in dBm; margin is measured above it
pub const RECEIVE_SENSITIVITY_DBM: i16 = -94;

/// Link margin above which a link is quality 3
pub const LINK_QUALITY_3_THRESHOLD: u8 = 20;

/// Link margin above which a link is quality 2
pub const LINK_QUALITY_2_THRESHOLD: u8 = 10;

/// Link margin above which a link is quality 1
pub const LINK_QUALITY_1_THRESHOLD: u8 = 2;

/// Link margin in dB for a received signal strength
pub fn link_margin_from_rssi(rssi_dbm: i8) -> u8 {
    (rssi_dbm as i16 - RECEIVE_SENSITIVITY_DBM).clamp(0, u8::MAX as i16) as u8
}

/// Link quality (0..3) for a link margin
pub fn link_quality_from_margin(margin: u8) -> u8 {
    match margin {
        m if m > LINK_QUALITY_3_THRESHOLD => 3,
        m if m > LINK_QUALITY_2_THRESHOLD => 2,
        m if m > LINK_QUALITY_1_THRESHOLD => 1,
        _ => 0,
    }
}

/// Link cost for a link quality; 0 means no usable link
pub fn link_cost_from_quality(quality: u8) -> u8 {
    match quality {
        3 => 1,
        2 => 2,
        1 => 4,
        _ => 0,
    }
}

/// Auxiliary data for one neighbor slot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborLinkInfo {
    /// Link margin in dB
    pub link_margin: u8,
    /// Neighbor needs the full, not only the stable, network data
    pub request_full_data_setup: bool,
    /// Mesh-local EID interface identifier, for children
    pub ml_eid: Option<[u8; 8]>,
}

impl NeighborLinkInfo {
    /// Link quality derived from the stored margin
    pub fn link_quality(&self) -> u8 {
        link_quality_from_margin(self.link_margin)
    }
}

/// Link info for every neighbor slot
#[derive(Debug, Clone)]
pub struct NeighborClass {
    slots: Vec<NeighborLinkInfo>,
}

impl NeighborClass {
    /// Create storage matching a neighbor table built from `device_table_size`
    pub fn new(device_table_size: usize) -> Self {
        Self {
            slots: vec![NeighborLinkInfo::default(); device_table_size],
        }
    }

    /// Link info of a slot
    pub fn get(&self, index: NeighborIndex) -> Option<&NeighborLinkInfo> {
        self.slots.get(index.slot() as usize)
    }

    fn slot_mut(&mut self, index: NeighborIndex) -> Option<&mut NeighborLinkInfo> {
        self.slots.get_mut(index.slot() as usize)
    }

    /// Record a link margin. A new link takes the margin as is; an existing
    /// link keeps the lower of the stored and the new margin.
    pub fn update_link(&mut self, index: NeighborIndex, margin: u8, is_new_link: bool) {
        if let Some(info) = self.slot_mut(index) {
            info.link_margin = if is_new_link {
                margin
            } else {
                info.link_margin.min(margin)
            };
        }
    }

    /// Stored link margin
    pub fn link_margin(&self, index: NeighborIndex) -> u8 {
        self.get(index).map_or(0, |i| i.link_margin)
    }

    /// Link quality derived from the stored margin
    pub fn link_quality(&self, index: NeighborIndex) -> u8 {
        self.get(index).map_or(0, NeighborLinkInfo::link_quality)
    }

    /// Set whether the neighbor wants full network data
    pub fn set_request_full_data(&mut self, index: NeighborIndex, full: bool) {
        if let Some(info) = self.slot_mut(index) {
            info.request_full_data_setup = full;
        }
    }

    /// Whether the neighbor wants full network data
    pub fn request_full_data(&self, index: NeighborIndex) -> bool {
        self.get(index).is_some_and(|i| i.request_full_data_setup)
    }

    /// Store a child's mesh-local EID
    pub fn set_ml_eid(&mut self, index: NeighborIndex, iid: [u8; 8]) {
        if let Some(info) = self.slot_mut(index) {
            info.ml_eid = Some(iid);
        }
    }

    /// Reset a slot when its neighbor is removed
    pub fn clear(&mut self, index: NeighborIndex) {
        if let Some(info) = self.slot_mut(index) {
            *info = NeighborLinkInfo::default();
        }
    }

    /// Reset every slot
    pub fn clear_all(&mut self) {
        for info in self.slots.iter_mut() {
            *info = NeighborLinkInfo::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbor::NeighborTable;

    #[test]
    fn test_link_margin_clamp() {
        assert_eq!(link_margin_from_rssi(-128), 0);
        assert_eq!(link_margin_from_rssi(-94), 0);
        assert_eq!(link_margin_from_rssi(-93), 1);
        let mut prev = 0;
        for rssi in -93i8..=127 {
            let m = link_margin_from_rssi(rssi);
            assert!(m > prev);
            prev = m;
        }
    }

    #[test]
    fn test_link_quality_tiers() {
        assert_eq!(link_quality_from_margin(0), 0);
        assert_eq!(link_quality_from_margin(2), 0);
        assert_eq!(link_quality_from_margin(3), 1);
        assert_eq!(link_quality_from_margin(11), 2);
        assert_eq!(link_quality_from_margin(21), 3);
        assert_eq!(link_cost_from_quality(3), 1);
        assert_eq!(link_cost_from_quality(0), 0);
    }

    #[test]
    fn test_update_link_keeps_worse_margin() {
        let mut table = NeighborTable::new(4).unwrap();
        let (idx, _) = table.allocate_or_get([1; 8], true).unwrap();
        let mut class = NeighborClass::new(4);

        class.update_link(idx, 30, true);
        assert_eq!(class.link_margin(idx), 30);
        class.update_link(idx, 12, false);
        assert_eq!(class.link_margin(idx), 12);
        class.update_link(idx, 25, false);
        assert_eq!(class.link_margin(idx), 12);
        class.update_link(idx, 25, true);
        assert_eq!(class.link_quality(idx), 3);

        class.set_request_full_data(idx, true);
        assert!(class.request_full_data(idx));
        class.clear(idx);
        assert!(!class.request_full_data(idx));
        assert_eq!(class.link_margin(idx), 0);
    }
}
