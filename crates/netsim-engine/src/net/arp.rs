//! ARP: address resolution cache plus the pending-request queue that
//! backs it while a resolution is in flight.

use netsim_common::{Ipv4Address, MacAddress};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpOp {
    Request,
    Reply,
}

#[derive(Debug, Clone, Copy)]
pub struct ArpMessage {
    pub op: ArpOp,
    pub sender_ip: Ipv4Address,
    pub sender_mac: MacAddress,
    pub target_ip: Ipv4Address,
    /// `None` on a request — the whole point is the sender doesn't know it.
    pub target_mac: Option<MacAddress>,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    mac: MacAddress,
    expires_at_sim_ms: u64,
}

/// What happened to a send attempt that consulted the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArpLookup {
    /// Cache hit — send immediately.
    Resolved(MacAddress),
    /// Cache miss and no request outstanding yet — the caller should
    /// broadcast an ARP request and queue this packet.
    RequestNeeded,
    /// Cache miss, but a request for this `next_hop` is already pending
    /// — just queue behind it.
    Pending,
}

/// `ip -> (mac, expiry)`, plus the packets queued behind an in-flight
/// resolution, keyed by the `next_hop` they're waiting on.
#[derive(Debug, Clone, Default)]
pub struct ArpCache {
    entries: HashMap<Ipv4Address, Entry>,
    pending: HashMap<Ipv4Address, Vec<u64>>,
}

impl ArpCache {
    pub fn new() -> Self {
        ArpCache::default()
    }

    pub fn lookup(&mut self, next_hop: Ipv4Address, now_sim_ms: u64, packet_id: u64) -> ArpLookup {
        if let Some(entry) = self.entries.get(&next_hop) {
            if entry.expires_at_sim_ms > now_sim_ms {
                return ArpLookup::Resolved(entry.mac);
            }
        }
        if let Some(queue) = self.pending.get_mut(&next_hop) {
            queue.push(packet_id);
            return ArpLookup::Pending;
        }
        self.pending.insert(next_hop, vec![packet_id]);
        ArpLookup::RequestNeeded
    }

    /// Install a resolved mapping and drain the queue waiting on it, in
    /// arrival order.
    pub fn install_reply(
        &mut self,
        ip: Ipv4Address,
        mac: MacAddress,
        ttl_ms: u64,
        now_sim_ms: u64,
    ) -> Vec<u64> {
        self.entries.insert(
            ip,
            Entry {
                mac,
                expires_at_sim_ms: now_sim_ms + ttl_ms,
            },
        );
        self.pending.remove(&ip).unwrap_or_default()
    }

    /// No reply arrived within `arpTimeoutMs`: drop every packet queued
    /// behind this resolution, returning their ids so the caller can emit
    /// a `HostUnreachable` diagnostic for each.
    pub fn timeout(&mut self, ip: Ipv4Address) -> Vec<u64> {
        self.pending.remove(&ip).unwrap_or_default()
    }

    pub fn is_pending(&self, ip: Ipv4Address) -> bool {
        self.pending.contains_key(&ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> Ipv4Address {
        Ipv4Address::parse(s).unwrap()
    }
    fn mac(n: u8) -> MacAddress {
        MacAddress::from_octets([0, 0, 0, 0, 0, n])
    }

    #[test]
    fn miss_then_second_miss_queues_behind_pending_request() {
        let mut cache = ArpCache::new();
        assert_eq!(cache.lookup(ip("10.0.0.1"), 0, 1), ArpLookup::RequestNeeded);
        assert_eq!(cache.lookup(ip("10.0.0.1"), 0, 2), ArpLookup::Pending);
    }

    #[test]
    fn reply_drains_queue_in_arrival_order() {
        let mut cache = ArpCache::new();
        cache.lookup(ip("10.0.0.1"), 0, 1);
        cache.lookup(ip("10.0.0.1"), 0, 2);
        cache.lookup(ip("10.0.0.1"), 0, 3);
        let drained = cache.install_reply(ip("10.0.0.1"), mac(9), 30_000, 10);
        assert_eq!(drained, vec![1, 2, 3]);
    }

    #[test]
    fn resolved_entry_hits_until_ttl_expires() {
        let mut cache = ArpCache::new();
        cache.lookup(ip("10.0.0.1"), 0, 1);
        cache.install_reply(ip("10.0.0.1"), mac(9), 1_000, 0);
        assert_eq!(cache.lookup(ip("10.0.0.1"), 500, 99), ArpLookup::Resolved(mac(9)));
        assert_eq!(
            cache.lookup(ip("10.0.0.1"), 2_000, 99),
            ArpLookup::RequestNeeded
        );
    }

    #[test]
    fn timeout_drops_every_queued_packet() {
        let mut cache = ArpCache::new();
        cache.lookup(ip("10.0.0.1"), 0, 1);
        cache.lookup(ip("10.0.0.1"), 0, 2);
        let dropped = cache.timeout(ip("10.0.0.1"));
        assert_eq!(dropped, vec![1, 2]);
        assert!(!cache.is_pending(ip("10.0.0.1")));
    }
}
