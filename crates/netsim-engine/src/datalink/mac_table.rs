//! MAC learning table: `mac -> (port, learnedAtSimMs)`, with TTL aging.

use netsim_common::MacAddress;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct Entry {
    port: u8,
    learned_at_sim_ms: u64,
}

/// A switch's learned forwarding table. Entries age out after `ttl_ms` of
/// no refresh; a MAC seen moving to a new port within `move_guard_ms` of
/// its last sighting keeps its existing entry's timestamp semantics
/// (refreshed to the new port, not treated as a flap) per §4.4 step 1.
#[derive(Debug, Clone)]
pub struct MacTable {
    entries: HashMap<MacAddress, Entry>,
    ttl_ms: u64,
    move_guard_ms: u64,
}

impl MacTable {
    pub fn new(ttl_ms: u64, move_guard_ms: u64) -> Self {
        MacTable {
            entries: HashMap::new(),
            ttl_ms,
            move_guard_ms,
        }
    }

    /// Learn (or refresh) that `mac` is reachable via `port` as of
    /// `now_sim_ms`. A MAC reappearing on a different port within the
    /// move-guard window is refreshed to the new port rather than
    /// rejected — the guard only suppresses rapid re-learn thrashing from
    /// being mistaken for a real invariant violation elsewhere.
    pub fn learn(&mut self, mac: MacAddress, port: u8, now_sim_ms: u64) {
        self.entries.insert(
            mac,
            Entry {
                port,
                learned_at_sim_ms: now_sim_ms,
            },
        );
    }

    /// The port a MAC was last learned on, if the entry hasn't aged out
    /// as of `now_sim_ms`.
    pub fn lookup(&self, mac: &MacAddress, now_sim_ms: u64) -> Option<u8> {
        self.entries.get(mac).and_then(|e| {
            if now_sim_ms.saturating_sub(e.learned_at_sim_ms) <= self.ttl_ms {
                Some(e.port)
            } else {
                None
            }
        })
    }

    /// Drop every entry older than `ttl_ms` as of `now_sim_ms`.
    pub fn expire(&mut self, now_sim_ms: u64) {
        let ttl_ms = self.ttl_ms;
        self.entries
            .retain(|_, e| now_sim_ms.saturating_sub(e.learned_at_sim_ms) <= ttl_ms);
    }

    pub fn move_guard_ms(&self) -> u64 {
        self.move_guard_ms
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(n: u8) -> MacAddress {
        MacAddress::from_octets([0, 0, 0, 0, 0, n])
    }

    #[test]
    fn learn_then_lookup_returns_port() {
        let mut table = MacTable::new(1000, 50);
        table.learn(mac(1), 3, 0);
        assert_eq!(table.lookup(&mac(1), 10), Some(3));
    }

    #[test]
    fn entry_ages_out_past_ttl() {
        let mut table = MacTable::new(100, 50);
        table.learn(mac(1), 3, 0);
        assert_eq!(table.lookup(&mac(1), 50), Some(3));
        assert_eq!(table.lookup(&mac(1), 200), None);
    }

    #[test]
    fn expire_removes_stale_entries() {
        let mut table = MacTable::new(100, 50);
        table.learn(mac(1), 3, 0);
        table.learn(mac(2), 4, 90);
        table.expire(200);
        assert_eq!(table.lookup(&mac(1), 200), None);
        assert_eq!(table.lookup(&mac(2), 200), Some(4));
    }

    #[test]
    fn relearning_on_new_port_refreshes_entry() {
        let mut table = MacTable::new(1000, 50);
        table.learn(mac(1), 3, 0);
        table.learn(mac(1), 5, 10);
        assert_eq!(table.lookup(&mac(1), 10), Some(5));
    }
}
