//! Router/REED decisions: upgrade and downgrade predicates, child-ID
//! assignment and leader-side network data assembly.

use std::collections::BTreeSet;
use thread_wire::{tlv, NetworkData, PrefixEntry};

/// Router neighbors with good links required before a router may downgrade
pub const MIN_DOWNGRADE_NEIGHBORS: usize = 7;

/// Link quality counted as good for the downgrade check
pub const DOWNGRADE_GOOD_LINK_QUALITY: u8 = 2;

/// Commissioning data sub-TLV carrying the border agent RLOC16
pub const BORDER_AGENT_LOCATOR_TLV: u8 = 9;

/// Inputs of the REED upgrade check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradeContext {
    /// Security policy allows routing
    pub routing_permitted: bool,
    /// Already a router
    pub is_router: bool,
    /// A commissioner registration references our short address
    pub address_pinned: bool,
    /// A router ID sequence has been heard
    pub id_sequence_valid: bool,
    /// Routers in the partition
    pub active_routers: u8,
    /// Upgrade threshold
    pub upgrade_threshold: u8,
}

/// Whether a REED should request a router ID
pub fn reed_upgrade_allowed(ctx: &UpgradeContext) -> bool {
    ctx.routing_permitted
        && !ctx.is_router
        && !ctx.address_pinned
        && ctx.id_sequence_valid
        && ctx.active_routers < ctx.upgrade_threshold
}

/// Inputs of the router downgrade check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DowngradeContext<'a> {
    /// Attached as router
    pub is_router: bool,
    /// Acting as leader
    pub is_leader: bool,
    /// Routers in the partition
    pub active_routers: u8,
    /// Downgrade threshold
    pub downgrade_threshold: u8,
    /// Two-way link quality of every router neighbor
    pub neighbor_link_qualities: &'a [u8],
    /// Only border router for some prefix
    pub sole_border_router: bool,
    /// Children attached to us
    pub child_count: usize,
}

/// Whether a router should give up its router ID
pub fn router_downgrade_allowed(ctx: &DowngradeContext<'_>) -> bool {
    if !ctx.is_router || ctx.is_leader || ctx.active_routers <= ctx.downgrade_threshold {
        return false;
    }
    let good: Vec<u8> = ctx
        .neighbor_link_qualities
        .iter()
        .copied()
        .filter(|q| *q >= DOWNGRADE_GOOD_LINK_QUALITY)
        .collect();
    if good.len() < MIN_DOWNGRADE_NEIGHBORS || !good.iter().any(|q| *q == 3) {
        return false;
    }
    if ctx.sole_border_router {
        return false;
    }
    let spare = (ctx.active_routers - ctx.downgrade_threshold) as usize;
    ctx.child_count <= 3 * spare
}

/// Whether the commissioning data names `rloc16` as border agent
pub fn commissioner_pins(network_data: &NetworkData, rloc16: u16) -> bool {
    network_data
        .commissioning_data()
        .and_then(|data| tlv::find_raw(data, BORDER_AGENT_LOCATOR_TLV))
        .is_some_and(|v| v.len() == 2 && u16::from_be_bytes([v[0], v[1]]) == rloc16)
}

/// Round-robin child-ID allocator over a fixed range
#[derive(Debug, Clone)]
pub struct ChildIdAllocator {
    min_id: u16,
    max_id: u16,
    max_children: usize,
    assigned: BTreeSet<u16>,
    next: u16,
}

impl ChildIdAllocator {
    /// Allocator over `min_id..=max_id` holding at most `max_children`
    pub fn new(min_id: u16, max_id: u16, max_children: usize) -> Self {
        let min_id = min_id.max(1);
        Self {
            min_id,
            max_id: max_id.max(min_id),
            max_children,
            assigned: BTreeSet::new(),
            next: min_id,
        }
    }

    /// Next free child ID, or `None` when no room is left
    pub fn allocate(&mut self) -> Option<u16> {
        if self.assigned.len() >= self.max_children {
            return None;
        }
        let span = (self.max_id - self.min_id) as u32 + 1;
        for step in 0..span {
            let offset = ((self.next - self.min_id) as u32 + step) % span;
            let id = self.min_id + offset as u16;
            if self.assigned.insert(id) {
                self.next = if id == self.max_id { self.min_id } else { id + 1 };
                return Some(id);
            }
        }
        None
    }

    /// Mark an ID as used, as when restoring children
    pub fn reserve(&mut self, id: u16) -> bool {
        (self.min_id..=self.max_id).contains(&id) && self.assigned.insert(id)
    }

    /// Free an ID
    pub fn release(&mut self, id: u16) -> bool {
        self.assigned.remove(&id)
    }

    /// Whether an ID is assigned
    pub fn is_assigned(&self, id: u16) -> bool {
        self.assigned.contains(&id)
    }

    /// Assigned IDs
    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    /// Whether nothing is assigned
    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }

    /// Whether another child fits
    pub fn has_room(&self) -> bool {
        self.assigned.len() < self.max_children
            && self.assigned.len() < (self.max_id - self.min_id) as usize + 1
    }

    /// Free every ID
    pub fn clear(&mut self) {
        self.assigned.clear();
        self.next = self.min_id;
    }
}

/// Combine prefix registrations; entries for the same prefix share one
/// Prefix TLV with the union of their border router and route entries
pub fn merge_prefixes<'a, I>(registrations: I) -> Vec<PrefixEntry>
where
    I: IntoIterator<Item = &'a [PrefixEntry]>,
{
    let mut merged: Vec<PrefixEntry> = Vec::new();
    for set in registrations {
        for entry in set {
            let existing = merged
                .iter_mut()
                .find(|m| m.prefix == entry.prefix && m.prefix_length == entry.prefix_length);
            match existing {
                Some(m) => {
                    m.stable |= entry.stable;
                    for br in &entry.border_routers {
                        if !m.border_routers.iter().any(|b| b.rloc16 == br.rloc16) {
                            m.border_routers.push(*br);
                        }
                    }
                    for hr in &entry.has_routes {
                        if !m.has_routes.iter().any(|h| h.rloc16 == hr.rloc16) {
                            m.has_routes.push(*hr);
                        }
                    }
                    if m.context.is_none() {
                        m.context = entry.context;
                    }
                }
                None => merged.push(entry.clone()),
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use thread_wire::{BorderRouterEntry, BorderRouterFlags};

    fn upgrade() -> UpgradeContext {
        UpgradeContext {
            routing_permitted: true,
            is_router: false,
            address_pinned: false,
            id_sequence_valid: true,
            active_routers: 3,
            upgrade_threshold: 16,
        }
    }

    #[test]
    fn test_reed_upgrade() {
        assert!(reed_upgrade_allowed(&upgrade()));
        assert!(!reed_upgrade_allowed(&UpgradeContext {
            active_routers: 16,
            ..upgrade()
        }));
        assert!(!reed_upgrade_allowed(&UpgradeContext {
            is_router: true,
            ..upgrade()
        }));
        assert!(!reed_upgrade_allowed(&UpgradeContext {
            id_sequence_valid: false,
            ..upgrade()
        }));
        assert!(!reed_upgrade_allowed(&UpgradeContext {
            address_pinned: true,
            ..upgrade()
        }));
    }

    #[test]
    fn test_router_downgrade() {
        let links = [3, 2, 2, 2, 2, 2, 2, 1];
        let ctx = DowngradeContext {
            is_router: true,
            is_leader: false,
            active_routers: 25,
            downgrade_threshold: 23,
            neighbor_link_qualities: &links,
            sole_border_router: false,
            child_count: 6,
        };
        assert!(router_downgrade_allowed(&ctx));
        assert!(!router_downgrade_allowed(&DowngradeContext {
            child_count: 7,
            ..ctx
        }));
        assert!(!router_downgrade_allowed(&DowngradeContext {
            is_leader: true,
            ..ctx
        }));
        assert!(!router_downgrade_allowed(&DowngradeContext {
            active_routers: 23,
            ..ctx
        }));
        assert!(!router_downgrade_allowed(&DowngradeContext {
            sole_border_router: true,
            ..ctx
        }));
        let no_best = [2; 8];
        assert!(!router_downgrade_allowed(&DowngradeContext {
            neighbor_link_qualities: &no_best,
            ..ctx
        }));
        let too_few = [3; 6];
        assert!(!router_downgrade_allowed(&DowngradeContext {
            neighbor_link_qualities: &too_few,
            ..ctx
        }));
    }

    #[test]
    fn test_child_id_allocation_never_doubles() {
        let mut alloc = ChildIdAllocator::new(1, 511, 5);
        let mut seen = BTreeSet::new();
        for _ in 0..5 {
            let id = alloc.allocate().unwrap();
            assert!(seen.insert(id));
        }
        assert_eq!(alloc.allocate(), None);
        assert!(!alloc.has_room());

        alloc.release(3);
        let id = alloc.allocate().unwrap();
        assert!(!alloc.is_assigned(0));
        assert_eq!(alloc.len(), 5);
        assert!(id >= 1 && id <= 511);
    }

    #[test]
    fn test_child_id_wraparound() {
        let mut alloc = ChildIdAllocator::new(1, 3, 10);
        assert_eq!(alloc.allocate(), Some(1));
        assert_eq!(alloc.allocate(), Some(2));
        assert_eq!(alloc.allocate(), Some(3));
        assert_eq!(alloc.allocate(), None);
        alloc.release(2);
        assert_eq!(alloc.allocate(), Some(2));
        alloc.release(1);
        assert_eq!(alloc.allocate(), Some(1));
        assert!(!alloc.reserve(0));
    }

    #[test]
    fn test_merge_prefixes() {
        let mut prefix = [0u8; 16];
        prefix[..4].copy_from_slice(&[0x20, 0x01, 0x0d, 0xb8]);
        let mut a = PrefixEntry::new(prefix, 64, true);
        a.border_routers.push(BorderRouterEntry {
            rloc16: 0x0400,
            flags: BorderRouterFlags::ON_MESH | BorderRouterFlags::SLAAC,
            stable: true,
        });
        let mut b = a.clone();
        b.border_routers[0].rloc16 = 0x0800;
        let sets = [vec![a.clone()], vec![b], vec![a]];
        let merged = merge_prefixes(sets.iter().map(Vec::as_slice));
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].border_routers.len(), 2);
    }
}
