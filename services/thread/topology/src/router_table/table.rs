//! RouterTable implementation methods.

use super::{RouterEntry, RouterTable, MAX_ROUTE_COST};
use crate::error::TopologyError;
use crate::link_quality::{link_cost_from_quality, link_quality_from_margin};
use thread_wire::{is_greater_u8, Route64, RouteEntry, INFINITE_COST, MAX_ROUTER_ID};
use tracing::{debug, info};

impl RouterTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every router; used on partition change
    pub fn reset(&mut self) {
        self.routers.clear();
        self.local_router_id = None;
        self.id_sequence = 0;
    }

    /// Router ID sequence
    pub fn id_sequence(&self) -> u8 {
        self.id_sequence
    }

    /// Local router ID
    pub fn local_router_id(&self) -> Option<u8> {
        self.local_router_id
    }

    /// Set the local router ID, marking it allocated
    pub fn set_local_router_id(&mut self, router_id: Option<u8>) {
        self.local_router_id = router_id;
        if let Some(id) = router_id {
            self.routers.entry(id).or_insert_with(|| RouterEntry {
                router_id: id,
                ..RouterEntry::default()
            });
        }
    }

    /// Whether `router_id` is allocated
    pub fn is_allocated(&self, router_id: u8) -> bool {
        self.routers.contains_key(&router_id)
    }

    /// Number of allocated routers
    pub fn active_router_count(&self) -> u8 {
        self.routers.len() as u8
    }

    /// Allocated router IDs, ascending
    pub fn router_ids(&self) -> impl Iterator<Item = u8> + '_ {
        self.routers.keys().copied()
    }

    /// Route entry of a router
    pub fn get(&self, router_id: u8) -> Option<&RouterEntry> {
        self.routers.get(&router_id)
    }

    /// Routers with a direct two-way link
    pub fn direct_links(&self) -> impl Iterator<Item = &RouterEntry> {
        self.routers
            .values()
            .filter(move |e| Some(e.router_id) != self.local_router_id && e.is_two_way())
    }

    /// Allocate a router ID as leader, preferring `requested` when free
    pub fn allocate(&mut self, requested: Option<u8>) -> Result<u8, TopologyError> {
        if let Some(id) = requested {
            if id > MAX_ROUTER_ID {
                return Err(TopologyError::InvalidRouterId(id));
            }
        }
        let id = requested
            .filter(|id| !self.is_allocated(*id))
            .or_else(|| (0..=MAX_ROUTER_ID).find(|id| !self.is_allocated(*id)))
            .ok_or(TopologyError::NoFreeRouterId)?;
        self.routers.insert(
            id,
            RouterEntry {
                router_id: id,
                ..RouterEntry::default()
            },
        );
        self.id_sequence = self.id_sequence.wrapping_add(1);
        info!("Allocated router id {} (seq {})", id, self.id_sequence);
        Ok(id)
    }

    /// Release a router ID as leader
    pub fn release(&mut self, router_id: u8) -> Result<(), TopologyError> {
        if router_id > MAX_ROUTER_ID {
            return Err(TopologyError::InvalidRouterId(router_id));
        }
        if self.routers.remove(&router_id).is_some() {
            self.id_sequence = self.id_sequence.wrapping_add(1);
            self.drop_routes_via(router_id);
            info!("Released router id {} (seq {})", router_id, self.id_sequence);
        }
        if self.local_router_id == Some(router_id) {
            self.local_router_id = None;
        }
        Ok(())
    }

    /// Take the router mask from a Route64 carrying a newer sequence, or the
    /// first one heard after a reset. Returns whether the mask changed hands.
    pub fn adopt_mask(&mut self, route: &Route64) -> bool {
        let first = self.routers.is_empty()
            || (self.routers.len() == 1 && self.local_router_id.is_some());
        if !first && !is_greater_u8(route.id_sequence, self.id_sequence) {
            return false;
        }
        let mut routers = std::collections::BTreeMap::new();
        for id in route.router_ids() {
            let entry = self.routers.get(&id).copied().unwrap_or(RouterEntry {
                router_id: id,
                ..RouterEntry::default()
            });
            routers.insert(id, entry);
        }
        let removed: Vec<u8> = self
            .routers
            .keys()
            .filter(|id| !routers.contains_key(*id))
            .copied()
            .collect();
        self.routers = routers;
        self.id_sequence = route.id_sequence;
        for id in removed {
            self.drop_routes_via(id);
        }
        debug!(
            "Adopted router mask seq {} ({} routers)",
            self.id_sequence,
            self.routers.len()
        );
        true
    }

    /// Whether the local router ID is part of the current mask
    pub fn local_id_valid(&self) -> bool {
        self.local_router_id.is_some_and(|id| self.is_allocated(id))
    }

    /// Merge a neighbor router's Route64 into the table
    pub fn route_tlv_push(&mut self, route: &Route64, sender_id: u8, link_margin: u8) {
        let Some(sender) = self.routers.get_mut(&sender_id) else {
            debug!("Route64 from unallocated router {}", sender_id);
            return;
        };
        sender.link_quality_in = link_quality_from_margin(link_margin);
        sender.link_quality_out = self
            .local_router_id
            .and_then(|local| route.entry(local))
            .map_or(0, |e| e.link_quality_in);
        let link_cost = link_cost_from_quality(sender.link_quality());

        for entry in &route.entries {
            let id = entry.router_id;
            if Some(id) == self.local_router_id || id == sender_id {
                continue;
            }
            let Some(target) = self.routers.get_mut(&id) else {
                continue;
            };
            let candidate = if link_cost == 0 || entry.route_cost == INFINITE_COST {
                0
            } else {
                link_cost.saturating_add(entry.route_cost)
            };
            let candidate = if candidate > MAX_ROUTE_COST { 0 } else { candidate };

            if target.next_hop == Some(sender_id) {
                target.route_cost = candidate;
                if candidate == 0 {
                    target.next_hop = None;
                }
            } else if candidate != 0 && (target.route_cost == 0 || candidate < target.route_cost) {
                target.route_cost = candidate;
                target.next_hop = Some(sender_id);
            }
        }
    }

    /// Drop the direct link to a router neighbor
    pub fn neighbor_lost(&mut self, router_id: u8) {
        if let Some(entry) = self.routers.get_mut(&router_id) {
            entry.link_quality_in = 0;
            entry.link_quality_out = 0;
        }
        self.drop_routes_via(router_id);
    }

    fn drop_routes_via(&mut self, router_id: u8) {
        for entry in self.routers.values_mut() {
            if entry.next_hop == Some(router_id) {
                entry.next_hop = None;
                entry.route_cost = 0;
            }
        }
    }

    /// Cost to reach a router: direct link cost or best multi-hop cost
    pub fn cost_to(&self, router_id: u8) -> Option<u8> {
        if Some(router_id) == self.local_router_id {
            return Some(0);
        }
        let entry = self.routers.get(&router_id)?;
        let direct = link_cost_from_quality(entry.link_quality());
        match (direct, entry.route_cost) {
            (0, 0) => None,
            (0, c) | (c, 0) => Some(c),
            (a, b) => Some(a.min(b)),
        }
    }

    /// Route64 describing this table, for advertisements
    pub fn to_route64(&self) -> Route64 {
        let mut route = Route64::new(self.id_sequence);
        for (&id, entry) in &self.routers {
            let (out, inq, cost) = if Some(id) == self.local_router_id {
                (0, 0, 1)
            } else {
                (
                    entry.link_quality_out,
                    entry.link_quality_in,
                    self.cost_to(id).unwrap_or(INFINITE_COST),
                )
            };
            route.push(RouteEntry {
                router_id: id,
                link_quality_out: out,
                link_quality_in: inq,
                route_cost: cost,
            });
        }
        route
    }

    /// Summary counters
    pub fn get_stats(&self) -> RouterTableStats {
        RouterTableStats {
            active_routers: self.routers.len(),
            reachable_routers: self
                .routers
                .keys()
                .filter(|id| Some(**id) != self.local_router_id && self.cost_to(**id).is_some())
                .count(),
            id_sequence: self.id_sequence,
        }
    }
}

/// Router table statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterTableStats {
    /// Allocated routers
    pub active_routers: usize,
    /// Routers with a known route
    pub reachable_routers: usize,
    /// Router ID sequence
    pub id_sequence: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(seq: u8, entries: &[(u8, u8, u8, u8)]) -> Route64 {
        let mut r = Route64::new(seq);
        for &(router_id, out, inq, cost) in entries {
            r.push(RouteEntry {
                router_id,
                link_quality_out: out,
                link_quality_in: inq,
                route_cost: cost,
            });
        }
        r
    }

    #[test]
    fn test_allocate_and_release() {
        let mut table = RouterTable::new();
        assert_eq!(table.allocate(Some(5)).unwrap(), 5);
        assert_eq!(table.allocate(Some(5)).unwrap(), 0);
        assert_eq!(table.allocate(None).unwrap(), 1);
        assert_eq!(table.id_sequence(), 3);
        assert_eq!(table.active_router_count(), 3);
        assert!(table.allocate(Some(63)).is_err());

        table.release(0).unwrap();
        assert!(!table.is_allocated(0));
        assert_eq!(table.id_sequence(), 4);

        for _ in 0..61 {
            table.allocate(None).unwrap();
        }
        assert_eq!(table.allocate(None), Err(TopologyError::NoFreeRouterId));
    }

    #[test]
    fn test_route_tlv_push() {
        let mut table = RouterTable::new();
        table.adopt_mask(&route(2, &[(1, 0, 0, 1), (2, 0, 0, 0), (3, 0, 0, 0)]));
        table.set_local_router_id(Some(1));

        // router 2 hears us at LQ 3 and reaches router 3 at cost 2
        let heard = route(2, &[(1, 3, 3, 1), (2, 0, 0, 1), (3, 2, 2, 2)]);
        table.route_tlv_push(&heard, 2, 25);

        let r2 = table.get(2).unwrap();
        assert!(r2.is_two_way());
        assert_eq!(r2.link_quality(), 3);
        assert_eq!(table.cost_to(2), Some(1));

        let r3 = table.get(3).unwrap();
        assert_eq!(r3.next_hop, Some(2));
        assert_eq!(table.cost_to(3), Some(3));

        let adv = table.to_route64();
        assert_eq!(adv.active_router_count(), 3);
        assert_eq!(adv.entry(3).unwrap().route_cost, 3);

        table.neighbor_lost(2);
        assert_eq!(table.cost_to(3), None);
        assert_eq!(table.get_stats().reachable_routers, 0);
    }

    #[test]
    fn test_adopt_mask_sequence() {
        let mut table = RouterTable::new();
        assert!(table.adopt_mask(&route(10, &[(0, 0, 0, 0), (4, 0, 0, 0)])));
        table.set_local_router_id(Some(4));
        assert!(table.local_id_valid());

        assert!(!table.adopt_mask(&route(10, &[(0, 0, 0, 0)])));
        assert!(!table.adopt_mask(&route(9, &[(0, 0, 0, 0)])));
        assert!(table.local_id_valid());

        assert!(table.adopt_mask(&route(11, &[(0, 0, 0, 0)])));
        assert!(!table.local_id_valid());
        assert_eq!(table.id_sequence(), 11);
    }
}
