//! Ping: the ICMP echo client facade behind `executePing` (§4.5, §6).
//!
//! Orchestrating a ping across a topology (resolving the target, routing,
//! ARP) is a `netsim-node` concern; this module owns only the
//! request/reply/timeout bookkeeping and RTT measurement that sits on top
//! of [`crate::net::icmp::IcmpRequestRegistry`].

use crate::net::icmp::EchoKey;
use std::collections::HashMap;
use tracing::debug;

/// Default timeout for `executePing`, per §6.
pub const DEFAULT_PING_TIMEOUT_MS: u64 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingOutcome {
    pub success: bool,
    /// `None` on timeout; `Some(rtt)` on a reply within the deadline.
    pub rtt_ms: Option<u64>,
}

impl PingOutcome {
    fn timed_out() -> Self {
        PingOutcome {
            success: false,
            rtt_ms: None,
        }
    }

    fn replied(rtt_ms: u64) -> Self {
        PingOutcome {
            success: true,
            rtt_ms: Some(rtt_ms),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Outstanding {
    sent_at_sim_ms: u64,
    deadline_sim_ms: u64,
}

/// A lazy single-shot echo client: `send` starts the clock, and exactly
/// one of `on_reply`/`expire` ever resolves a given key, matching the
/// "replies after the deadline are silently dropped" contract.
#[derive(Debug, Clone, Default)]
pub struct PingClient {
    outstanding: HashMap<EchoKey, Outstanding>,
}

impl PingClient {
    pub fn new() -> Self {
        PingClient::default()
    }

    pub fn send(&mut self, key: EchoKey, now_sim_ms: u64, timeout_ms: u64) {
        self.outstanding.insert(
            key,
            Outstanding {
                sent_at_sim_ms: now_sim_ms,
                deadline_sim_ms: now_sim_ms + timeout_ms,
            },
        );
    }

    /// A matching echo reply arrived. Returns `None` if this key was
    /// never outstanding (already resolved, already expired, or a reply
    /// to a request this client never sent).
    pub fn on_reply(&mut self, key: EchoKey, now_sim_ms: u64) -> Option<PingOutcome> {
        let pending = self.outstanding.remove(&key)?;
        if now_sim_ms > pending.deadline_sim_ms {
            debug!(?key, "ping reply arrived after deadline, dropped");
            return None;
        }
        Some(PingOutcome::replied(now_sim_ms - pending.sent_at_sim_ms))
    }

    /// Drop every request whose deadline has passed as of `now_sim_ms`,
    /// returning a timeout outcome for each.
    pub fn expire(&mut self, now_sim_ms: u64) -> Vec<(EchoKey, PingOutcome)> {
        let expired: Vec<EchoKey> = self
            .outstanding
            .iter()
            .filter(|(_, o)| o.deadline_sim_ms < now_sim_ms)
            .map(|(k, _)| *k)
            .collect();
        for key in &expired {
            self.outstanding.remove(key);
        }
        expired
            .into_iter()
            .map(|k| (k, PingOutcome::timed_out()))
            .collect()
    }

    pub fn is_outstanding(&self, key: &EchoKey) -> bool {
        self.outstanding.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netsim_common::Ipv4Address;

    fn key() -> EchoKey {
        EchoKey {
            src: Ipv4Address::parse("10.0.0.1").unwrap(),
            dst: Ipv4Address::parse("10.0.0.2").unwrap(),
            identifier: 7,
            sequence: 1,
        }
    }

    #[test]
    fn reply_within_deadline_reports_rtt() {
        let mut client = PingClient::new();
        client.send(key(), 0, DEFAULT_PING_TIMEOUT_MS);
        let outcome = client.on_reply(key(), 120).unwrap();
        assert_eq!(outcome, PingOutcome::replied(120));
    }

    #[test]
    fn unanswered_request_times_out_at_2000ms_by_default() {
        let mut client = PingClient::new();
        client.send(key(), 0, DEFAULT_PING_TIMEOUT_MS);
        let expired = client.expire(2001);
        assert_eq!(expired, vec![(key(), PingOutcome::timed_out())]);
    }

    #[test]
    fn reply_after_already_expired_is_dropped() {
        let mut client = PingClient::new();
        client.send(key(), 0, 2000);
        client.expire(2500);
        assert!(client.on_reply(key(), 2600).is_none());
    }

    #[test]
    fn reply_to_unknown_key_resolves_to_none() {
        let mut client = PingClient::new();
        assert!(client.on_reply(key(), 0).is_none());
    }
}
