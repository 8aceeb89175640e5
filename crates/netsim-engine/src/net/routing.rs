//! IPv4 routing table: longest-prefix match with a trailing default route.

use netsim_common::Ipv4Address;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("no route to destination")]
pub struct NoRoute;

#[derive(Debug, Clone, Copy)]
pub struct RouteEntry {
    pub dest_net: Ipv4Address,
    pub mask: Ipv4Address,
    pub next_hop: Option<Ipv4Address>,
    pub out_interface: usize,
}

impl RouteEntry {
    fn is_default(&self) -> bool {
        self.mask.prefix_len() == Some(0)
    }

    fn matches(&self, dest: Ipv4Address) -> bool {
        dest.in_same_network(&self.mask, &self.dest_net)
    }
}

/// An ordered set of routes, not necessarily sorted by the caller —
/// `lookup` always picks the longest matching prefix itself, with any
/// `/0` entry acting as the fallback.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    entries: Vec<RouteEntry>,
}

impl RoutingTable {
    pub fn new() -> Self {
        RoutingTable::default()
    }

    pub fn add_route(&mut self, entry: RouteEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    /// `(out_interface, next_hop)` for `dest`, where `next_hop` falls back
    /// to `dest` itself when the matching route is directly-connected
    /// (`next_hop: None`).
    pub fn get_next_hop(&self, dest: Ipv4Address) -> Result<(usize, Ipv4Address), NoRoute> {
        let best = self
            .entries
            .iter()
            .filter(|e| e.matches(dest))
            .max_by_key(|e| e.mask.prefix_len().unwrap_or(0));

        match best {
            Some(entry) => Ok((entry.out_interface, entry.next_hop.unwrap_or(dest))),
            None => Err(NoRoute),
        }
    }

    /// Whether any non-default route would win for this destination
    /// (used by tests validating the "covered by subnet or default"
    /// invariant).
    pub fn has_specific_route(&self, dest: Ipv4Address) -> bool {
        self.entries.iter().any(|e| !e.is_default() && e.matches(dest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> Ipv4Address {
        Ipv4Address::parse(s).unwrap()
    }

    fn mask(prefix: u32) -> Ipv4Address {
        Ipv4Address::from_prefix_len(prefix).unwrap()
    }

    #[test]
    fn longest_prefix_wins_over_broader_match() {
        let mut table = RoutingTable::new();
        table.add_route(RouteEntry {
            dest_net: ip("10.0.0.0"),
            mask: mask(8),
            next_hop: Some(ip("192.168.1.1")),
            out_interface: 0,
        });
        table.add_route(RouteEntry {
            dest_net: ip("10.0.1.0"),
            mask: mask(24),
            next_hop: Some(ip("192.168.1.2")),
            out_interface: 1,
        });

        let (iface, next_hop) = table.get_next_hop(ip("10.0.1.50")).unwrap();
        assert_eq!(iface, 1);
        assert_eq!(next_hop, ip("192.168.1.2"));
    }

    #[test]
    fn default_route_used_when_nothing_more_specific_matches() {
        let mut table = RoutingTable::new();
        table.add_route(RouteEntry {
            dest_net: ip("0.0.0.0"),
            mask: mask(0),
            next_hop: Some(ip("192.168.1.1")),
            out_interface: 0,
        });
        let (iface, _) = table.get_next_hop(ip("8.8.8.8")).unwrap();
        assert_eq!(iface, 0);
    }

    #[test]
    fn no_matching_route_fails() {
        let table = RoutingTable::new();
        assert!(table.get_next_hop(ip("8.8.8.8")).is_err());
    }

    #[test]
    fn directly_connected_route_uses_dest_as_next_hop() {
        let mut table = RoutingTable::new();
        table.add_route(RouteEntry {
            dest_net: ip("10.0.0.0"),
            mask: mask(24),
            next_hop: None,
            out_interface: 2,
        });
        let (iface, next_hop) = table.get_next_hop(ip("10.0.0.42")).unwrap();
        assert_eq!(iface, 2);
        assert_eq!(next_hop, ip("10.0.0.42"));
    }
}
