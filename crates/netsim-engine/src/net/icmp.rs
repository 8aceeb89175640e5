//! ICMP echo: request/reply correlation and timeout handling.

use netsim_common::Ipv4Address;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpType {
    EchoRequest,
    EchoReply,
}

#[derive(Debug, Clone, Copy)]
pub struct IcmpMessage {
    pub kind: IcmpType,
    pub src: Ipv4Address,
    pub dst: Ipv4Address,
    pub identifier: u16,
    pub sequence: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EchoKey {
    pub src: Ipv4Address,
    pub dst: Ipv4Address,
    pub identifier: u16,
    pub sequence: u16,
}

/// Outstanding echo requests, keyed by `(src, dst, identifier, sequence)`
/// with a deadline each. A reply that arrives after its deadline has
/// already been dropped from the registry and is silently ignored.
#[derive(Debug, Clone, Default)]
pub struct IcmpRequestRegistry {
    outstanding: HashMap<EchoKey, u64>,
}

impl IcmpRequestRegistry {
    pub fn new() -> Self {
        IcmpRequestRegistry::default()
    }

    pub fn register(&mut self, key: EchoKey, deadline_sim_ms: u64) {
        self.outstanding.insert(key, deadline_sim_ms);
    }

    /// Resolve a reply: `true` if a matching, still-live request existed
    /// (and it's removed), `false` if there was nothing to match (already
    /// timed out, already answered, or never sent).
    pub fn resolve_reply(&mut self, key: EchoKey, now_sim_ms: u64) -> bool {
        match self.outstanding.remove(&key) {
            Some(deadline) if now_sim_ms <= deadline => true,
            _ => false,
        }
    }

    /// Drop every request whose deadline has passed as of `now_sim_ms`,
    /// returning their keys so the caller can resolve each as a timeout.
    pub fn expire(&mut self, now_sim_ms: u64) -> Vec<EchoKey> {
        let expired: Vec<EchoKey> = self
            .outstanding
            .iter()
            .filter(|(_, &deadline)| deadline < now_sim_ms)
            .map(|(key, _)| *key)
            .collect();
        for key in &expired {
            self.outstanding.remove(key);
        }
        expired
    }

    pub fn is_outstanding(&self, key: &EchoKey) -> bool {
        self.outstanding.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> Ipv4Address {
        Ipv4Address::parse(s).unwrap()
    }

    fn key() -> EchoKey {
        EchoKey {
            src: ip("10.0.0.1"),
            dst: ip("10.0.0.2"),
            identifier: 1,
            sequence: 1,
        }
    }

    #[test]
    fn reply_within_deadline_resolves_true() {
        let mut reg = IcmpRequestRegistry::new();
        reg.register(key(), 2000);
        assert!(reg.resolve_reply(key(), 1500));
    }

    #[test]
    fn reply_after_deadline_is_silently_dropped() {
        let mut reg = IcmpRequestRegistry::new();
        reg.register(key(), 2000);
        reg.expire(2500);
        assert!(!reg.resolve_reply(key(), 2600));
    }

    #[test]
    fn expire_only_removes_passed_deadlines() {
        let mut reg = IcmpRequestRegistry::new();
        let other = EchoKey {
            sequence: 2,
            ..key()
        };
        reg.register(key(), 1000);
        reg.register(other, 5000);
        let expired = reg.expire(2000);
        assert_eq!(expired, vec![key()]);
        assert!(reg.is_outstanding(&other));
    }

    #[test]
    fn unmatched_reply_resolves_false() {
        let mut reg = IcmpRequestRegistry::new();
        assert!(!reg.resolve_reply(key(), 0));
    }
}
