//! Neighbor table.
//!
//! Fixed-capacity arena of neighbor entries addressed by [`NeighborIndex`].
//! Slot 0 is reserved, so a table built from a device table of `n` entries
//! holds at most `n - 1` neighbors.

use crate::error::TopologyError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv6Addr;
use thread_wire::address::{is_link_local, is_router_rloc16, mac64_from_link_local};
use thread_wire::{router_id_from_rloc16, DeviceMode, RLOC16_INVALID};
use tracing::debug;

/// Opaque handle to a neighbor slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NeighborIndex(u16);

impl NeighborIndex {
    /// Raw slot number, as used for MAC device table updates
    pub fn slot(self) -> u16 {
        self.0
    }
}

impl fmt::Display for NeighborIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One neighbor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborEntry {
    /// Extended MAC address
    pub mac64: [u8; 8],
    /// Short address (0xfffe unassigned, 0xffff unset)
    pub mac16: u16,
    /// Lifetime granted on each refresh, in seconds
    pub link_lifetime: u32,
    /// Seconds until the entry expires
    pub lifetime_remaining: u32,
    /// Time of the last valid message, in milliseconds
    pub last_communication_ms: u64,
    /// Receiver on while idle
    pub rx_on_idle: bool,
    /// Full Thread Device
    pub ffd_device: bool,
    /// Two-way link established
    pub connected_device: bool,
    /// Mode from the last message
    pub mode: DeviceMode,
    /// Last link-layer frame counter
    pub link_frame_counter: u32,
    /// Last MLE frame counter
    pub mle_frame_counter: u32,
}

impl NeighborEntry {
    fn new(mac64: [u8; 8]) -> Self {
        Self {
            mac64,
            mac16: RLOC16_INVALID,
            link_lifetime: 0,
            lifetime_remaining: 0,
            last_communication_ms: 0,
            rx_on_idle: true,
            ffd_device: false,
            connected_device: false,
            mode: DeviceMode::empty(),
            link_frame_counter: 0,
            mle_frame_counter: 0,
        }
    }

    /// Whether the short address names a router
    pub fn is_router(&self) -> bool {
        is_router_rloc16(self.mac16)
    }

    /// Router ID, if the neighbor is a router
    pub fn router_id(&self) -> Option<u8> {
        self.is_router().then(|| router_id_from_rloc16(self.mac16))
    }

    /// Apply a received mode byte
    pub fn set_mode(&mut self, mode: DeviceMode) {
        self.mode = mode;
        self.rx_on_idle = mode.contains(DeviceMode::RX_ON_IDLE);
        self.ffd_device = mode.is_ffd();
    }
}

/// Neighbor table
#[derive(Debug, Clone)]
pub struct NeighborTable {
    slots: Vec<Option<NeighborEntry>>,
}

impl NeighborTable {
    /// Create a table from the MAC device table size
    pub fn new(device_table_size: usize) -> Result<Self, TopologyError> {
        if device_table_size < 2 || device_table_size > u16::MAX as usize {
            return Err(TopologyError::TableTooSmall(device_table_size));
        }
        Ok(Self {
            slots: vec![None; device_table_size],
        })
    }

    /// Maximum number of neighbors
    pub fn capacity(&self) -> usize {
        self.slots.len() - 1
    }

    /// Number of neighbors
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether no slot is free
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Entry at `index`
    pub fn get(&self, index: NeighborIndex) -> Option<&NeighborEntry> {
        self.slots.get(index.0 as usize).and_then(Option::as_ref)
    }

    /// Mutable entry at `index`
    pub fn get_mut(&mut self, index: NeighborIndex) -> Option<&mut NeighborEntry> {
        self.slots.get_mut(index.0 as usize).and_then(Option::as_mut)
    }

    /// Iterate occupied slots
    pub fn iter(&self) -> impl Iterator<Item = (NeighborIndex, &NeighborEntry)> {
        self.slots
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(i, s)| s.as_ref().map(|e| (NeighborIndex(i as u16), e)))
    }

    /// Find by extended address
    pub fn find_by_mac64(&self, mac64: &[u8; 8]) -> Option<NeighborIndex> {
        self.iter().find(|(_, e)| &e.mac64 == mac64).map(|(i, _)| i)
    }

    /// Find by short address
    pub fn find_by_mac16(&self, mac16: u16) -> Option<NeighborIndex> {
        if mac16 >= RLOC16_INVALID - 1 {
            return None;
        }
        self.iter().find(|(_, e)| e.mac16 == mac16).map(|(i, _)| i)
    }

    /// Find the neighbor whose extended address the link-local source
    /// address was derived from
    pub fn find_by_link_local_addr(&self, addr: &Ipv6Addr) -> Option<NeighborIndex> {
        if !is_link_local(addr) {
            return None;
        }
        self.find_by_mac64(&mac64_from_link_local(addr))
    }

    /// Find or create an entry. Returns the index and whether it was created;
    /// `None` when absent and creation is not allowed or the table is full.
    pub fn allocate_or_get(
        &mut self,
        mac64: [u8; 8],
        allow_create: bool,
    ) -> Option<(NeighborIndex, bool)> {
        if let Some(index) = self.find_by_mac64(&mac64) {
            return Some((index, false));
        }
        if !allow_create {
            return None;
        }
        let free = self.slots.iter().skip(1).position(Option::is_none)? + 1;
        self.slots[free] = Some(NeighborEntry::new(mac64));
        debug!("Allocated neighbor slot {} for {:02x?}", free, mac64);
        Some((NeighborIndex(free as u16), true))
    }

    /// Reset the lifetime of an entry
    pub fn refresh(&mut self, index: NeighborIndex, lifetime_secs: u32, now_ms: u64) {
        if let Some(entry) = self.get_mut(index) {
            entry.link_lifetime = lifetime_secs;
            entry.lifetime_remaining = lifetime_secs;
            entry.last_communication_ms = now_ms;
        }
    }

    /// Remove an entry
    pub fn remove(&mut self, index: NeighborIndex) -> Option<NeighborEntry> {
        let removed = self.slots.get_mut(index.0 as usize).and_then(Option::take);
        if removed.is_some() {
            debug!("Removed neighbor {}", index);
        }
        removed
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
    }

    /// Age every entry by `elapsed_secs`, removing and returning the expired
    pub fn tick(&mut self, elapsed_secs: u32) -> Vec<(NeighborIndex, NeighborEntry)> {
        let mut expired = Vec::new();
        for (i, slot) in self.slots.iter_mut().enumerate().skip(1) {
            let Some(entry) = slot.as_mut() else {
                continue;
            };
            entry.lifetime_remaining = entry.lifetime_remaining.saturating_sub(elapsed_secs);
            if entry.lifetime_remaining == 0 {
                if let Some(entry) = slot.take() {
                    expired.push((NeighborIndex(i as u16), entry));
                }
            }
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thread_wire::link_local_from_mac64;

    const MAC_A: [u8; 8] = [1, 2, 3, 4, 5, 6, 7, 8];
    const MAC_B: [u8; 8] = [8, 7, 6, 5, 4, 3, 2, 1];

    #[test]
    fn test_slot_zero_reserved() {
        let mut table = NeighborTable::new(3).unwrap();
        assert_eq!(table.capacity(), 2);
        let (a, created) = table.allocate_or_get(MAC_A, true).unwrap();
        assert!(created);
        assert_eq!(a.slot(), 1);
        let (b, _) = table.allocate_or_get(MAC_B, true).unwrap();
        assert_eq!(b.slot(), 2);
        assert!(table.is_full());
        assert!(table.allocate_or_get([9; 8], true).is_none());
        assert!(NeighborTable::new(1).is_err());
    }

    #[test]
    fn test_allocate_or_get_existing() {
        let mut table = NeighborTable::new(4).unwrap();
        assert!(table.allocate_or_get(MAC_A, false).is_none());
        let (first, _) = table.allocate_or_get(MAC_A, true).unwrap();
        let (again, created) = table.allocate_or_get(MAC_A, false).unwrap();
        assert_eq!(first, again);
        assert!(!created);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_lookups() {
        let mut table = NeighborTable::new(4).unwrap();
        let (idx, _) = table.allocate_or_get(MAC_A, true).unwrap();
        table.get_mut(idx).unwrap().mac16 = 0x0800;

        let ll = link_local_from_mac64(&MAC_A);
        assert_eq!(table.find_by_link_local_addr(&ll), Some(idx));
        assert_eq!(table.find_by_mac16(0x0800), Some(idx));
        assert_eq!(table.find_by_mac16(RLOC16_INVALID), None);
        assert_eq!(table.get(idx).unwrap().router_id(), Some(2));
        assert!(table
            .find_by_link_local_addr(&"fd00::211:2233:4455:6677".parse().unwrap())
            .is_none());
    }

    #[test]
    fn test_tick_expires_entries() {
        let mut table = NeighborTable::new(4).unwrap();
        let (a, _) = table.allocate_or_get(MAC_A, true).unwrap();
        let (b, _) = table.allocate_or_get(MAC_B, true).unwrap();
        table.refresh(a, 10, 0);
        table.refresh(b, 100, 0);

        assert!(table.tick(5).is_empty());
        let expired = table.tick(5);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, a);
        assert!(table.get(a).is_none());
        assert_eq!(table.get(b).unwrap().lifetime_remaining, 90);

        table.refresh(b, 100, 2000);
        assert_eq!(table.get(b).unwrap().lifetime_remaining, 100);
        assert_eq!(table.get(b).unwrap().last_communication_ms, 2000);
    }
}
