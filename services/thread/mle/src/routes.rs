//! Routes and addresses derived from network data.

use crate::collaborators::{Ipv6Stack, RouteKind};
use std::net::Ipv6Addr;
use thread_wire::{address_from_iid, BorderRouterFlags, PrefixEntry};
use tracing::debug;

/// A route the interface installs from network data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedRoute {
    /// Destination prefix
    pub prefix: [u8; 16],
    /// Prefix length
    pub prefix_len: u8,
    /// Next hop, `None` for on-mesh prefixes
    pub next_hop: Option<u16>,
    /// Route kind
    pub kind: RouteKind,
}

impl DerivedRoute {
    fn same_key(&self, other: &DerivedRoute) -> bool {
        self.prefix == other.prefix && self.prefix_len == other.prefix_len && self.kind == other.kind
    }
}

/// Everything derived from one network data version
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Derivation {
    /// Routes to install
    pub routes: Vec<DerivedRoute>,
    /// SLAAC addresses to configure
    pub addresses: Vec<Ipv6Addr>,
}

impl Derivation {
    fn push_route(&mut self, route: DerivedRoute) {
        if !self.routes.iter().any(|r| r.same_key(&route)) {
            self.routes.push(route);
        }
    }
}

/// Derive routes and SLAAC addresses. `own_rloc16` is skipped as next hop.
pub fn derive(prefixes: &[PrefixEntry], iid: &[u8; 8], own_rloc16: u16) -> Derivation {
    let mut out = Derivation::default();
    for p in prefixes {
        for br in &p.border_routers {
            if br.flags.contains(BorderRouterFlags::ON_MESH) {
                out.push_route(DerivedRoute {
                    prefix: p.prefix,
                    prefix_len: p.prefix_length,
                    next_hop: None,
                    kind: RouteKind::OnMesh,
                });
            }
            if br.flags.contains(BorderRouterFlags::SLAAC) && p.prefix_length == 64 {
                let mut prefix = [0u8; 8];
                prefix.copy_from_slice(&p.prefix[..8]);
                let addr = address_from_iid(&prefix, iid);
                if !out.addresses.contains(&addr) {
                    out.addresses.push(addr);
                }
            }
            if br.flags.contains(BorderRouterFlags::DEFAULT_ROUTE) && br.rloc16 != own_rloc16 {
                out.push_route(DerivedRoute {
                    prefix: [0; 16],
                    prefix_len: 0,
                    next_hop: Some(br.rloc16),
                    kind: RouteKind::BorderRouterDefault,
                });
            }
        }
        for hr in &p.has_routes {
            if hr.rloc16 != own_rloc16 {
                out.push_route(DerivedRoute {
                    prefix: p.prefix,
                    prefix_len: p.prefix_length,
                    next_hop: Some(hr.rloc16),
                    kind: RouteKind::External,
                });
            }
        }
    }
    out
}

/// What is currently installed in the IPv6 layer
#[derive(Debug, Clone, Default)]
pub struct InstalledRoutes {
    current: Derivation,
}

impl InstalledRoutes {
    /// Installed derivation
    pub fn current(&self) -> &Derivation {
        &self.current
    }

    /// Replace the installed derivation, removing stale entries first
    pub fn apply<I: Ipv6Stack>(&mut self, ipv6: &mut I, next: Derivation) {
        for route in &self.current.routes {
            if !next.routes.contains(route) {
                debug!("Removing {:?} route /{}", route.kind, route.prefix_len);
                ipv6.route_remove(route.prefix, route.prefix_len, route.kind);
            }
        }
        for addr in &self.current.addresses {
            if !next.addresses.contains(addr) {
                ipv6.delete_address(*addr);
            }
        }
        for route in &next.routes {
            if !self.current.routes.contains(route) {
                ipv6.route_add(route.prefix, route.prefix_len, route.next_hop, route.kind);
            }
        }
        for addr in &next.addresses {
            if !self.current.addresses.contains(addr) {
                ipv6.add_address(*addr, 64);
            }
        }
        self.current = next;
    }

    /// Remove everything
    pub fn clear<I: Ipv6Stack>(&mut self, ipv6: &mut I) {
        self.apply(ipv6, Derivation::default());
    }
}
