//! Spanning Tree Protocol: bridge id ordering, BPDU comparison, and the
//! per-port role/state machine.

use netsim_common::MacAddress;

/// `(priority, mac)`, totally ordered — lower is superior, same as real
/// STP bridge ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BridgeId {
    pub priority: u16,
    pub mac: MacAddress,
}

impl BridgeId {
    pub fn new(priority: u16, mac: MacAddress) -> Self {
        BridgeId { priority, mac }
    }
}

/// A periodic spanning-tree advertisement. Ordered lexicographically on
/// `(root_id, root_path_cost, sender_id, sender_port)` — lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Bpdu {
    pub root_id: BridgeId,
    pub root_path_cost: u32,
    pub sender_id: BridgeId,
    pub sender_port: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortRole {
    Root,
    Designated,
    NonDesignated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    Disabled,
    Blocking,
    Listening,
    Learning,
    Forwarding,
}

#[derive(Debug, Clone)]
struct PortInfo {
    path_cost: u32,
    disabled: bool,
    role: PortRole,
    state: PortState,
    /// Best BPDU heard on this port so far, or `None` if nothing (yet, or
    /// timed out) contradicts this bridge's own claim to be designated.
    stored: Option<Bpdu>,
    last_bpdu_at_sim_ms: Option<u64>,
    /// When this port most recently became `Root` or `Designated` — the
    /// baseline the forward-delay progression is measured from.
    became_active_at_sim_ms: Option<u64>,
}

/// Read-only snapshot of one port, the shape `portsInfo` exposes externally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSnapshot {
    pub port: u8,
    pub role: PortRole,
    pub state: PortState,
    pub path_cost: u32,
}

/// Per-switch spanning-tree state: bridge id, the root/cost/root-port it
/// currently believes, and every port's role and state.
pub struct Stp {
    bridge_id: BridgeId,
    ports: Vec<PortInfo>,
    max_age_ms: u64,
    forward_delay_ms: u64,
    root_id: BridgeId,
    root_path_cost: u32,
    root_port: Option<u8>,
}

impl Stp {
    pub fn new(
        bridge_id: BridgeId,
        port_count: u8,
        default_path_cost: u32,
        max_age_ms: u64,
        forward_delay_ms: u64,
    ) -> Self {
        let ports = (0..port_count)
            .map(|_| PortInfo {
                path_cost: default_path_cost,
                disabled: false,
                role: PortRole::Designated,
                state: PortState::Listening,
                stored: None,
                last_bpdu_at_sim_ms: None,
                became_active_at_sim_ms: Some(0),
            })
            .collect();
        Stp {
            bridge_id,
            ports,
            max_age_ms,
            forward_delay_ms,
            root_id: bridge_id,
            root_path_cost: 0,
            root_port: None,
        }
    }

    pub fn bridge_id(&self) -> BridgeId {
        self.bridge_id
    }

    pub fn is_root_bridge(&self) -> bool {
        self.root_id == self.bridge_id
    }

    pub fn root_port(&self) -> Option<u8> {
        self.root_port
    }

    pub fn port_state(&self, port: u8) -> PortState {
        self.ports[port as usize].state
    }

    pub fn port_role(&self, port: u8) -> PortRole {
        self.ports[port as usize].role
    }

    pub fn set_port_disabled(&mut self, port: u8, disabled: bool, now_sim_ms: u64) {
        self.ports[port as usize].disabled = disabled;
        self.recompute(now_sim_ms);
    }

    /// The BPDU this bridge advertises out `port` right now.
    pub fn advertised_bpdu(&self, port: u8) -> Bpdu {
        Bpdu {
            root_id: self.root_id,
            root_path_cost: self.root_path_cost,
            sender_id: self.bridge_id,
            sender_port: port,
        }
    }

    /// Read-only view for the presentation layer / tests.
    pub fn ports_info(&self) -> Vec<PortSnapshot> {
        self.ports
            .iter()
            .enumerate()
            .map(|(i, p)| PortSnapshot {
                port: i as u8,
                role: p.role,
                state: p.state,
                path_cost: p.path_cost,
            })
            .collect()
    }

    /// Process a BPDU arriving on `port`. Re-delivery of an identical BPDU
    /// only refreshes the max-age timestamp — it never re-triggers a role
    /// or state transition, satisfying idempotent re-delivery.
    pub fn receive_bpdu(&mut self, port: u8, bpdu: Bpdu, now_sim_ms: u64) {
        let idx = port as usize;
        let is_better_or_new = match self.ports[idx].stored {
            None => true,
            Some(stored) => bpdu < stored,
        };
        let is_identical = self.ports[idx].stored == Some(bpdu);

        self.ports[idx].last_bpdu_at_sim_ms = Some(now_sim_ms);

        if is_identical {
            return;
        }
        if is_better_or_new {
            self.ports[idx].stored = Some(bpdu);
            self.recompute(now_sim_ms);
        }
        // Inferior BPDUs from a stale sender are ignored; the existing
        // `stored` entry keeps governing this port until it ages out.
    }

    /// Age out ports whose stored BPDU hasn't refreshed within
    /// `max_age_ms`, and progress forward-delay transitions. Safe to call
    /// with an arbitrarily large `now_sim_ms` jump — the result is the
    /// same as if every intervening millisecond had been ticked.
    pub fn tick(&mut self, now_sim_ms: u64) {
        let mut needs_recompute = false;
        for port in self.ports.iter_mut() {
            if let (Some(stored_since), Some(_)) = (port.last_bpdu_at_sim_ms, port.stored) {
                if now_sim_ms.saturating_sub(stored_since) > self.max_age_ms {
                    port.stored = None;
                    port.last_bpdu_at_sim_ms = None;
                    needs_recompute = true;
                }
            }
        }
        if needs_recompute {
            self.recompute(now_sim_ms);
        }

        for port in self.ports.iter_mut() {
            if port.disabled {
                port.state = PortState::Disabled;
                continue;
            }
            match port.role {
                PortRole::NonDesignated => port.state = PortState::Blocking,
                PortRole::Root | PortRole::Designated => {
                    let since = port.became_active_at_sim_ms.unwrap_or(now_sim_ms);
                    let elapsed = now_sim_ms.saturating_sub(since);
                    port.state = if elapsed < self.forward_delay_ms {
                        PortState::Listening
                    } else if elapsed < 2 * self.forward_delay_ms {
                        PortState::Learning
                    } else {
                        PortState::Forwarding
                    };
                }
            }
        }
    }

    /// Recompute the root bridge, root path cost, root port, and every
    /// port's role from currently stored BPDUs.
    fn recompute(&mut self, now_sim_ms: u64) {
        let mut best: (BridgeId, u32, Option<u8>) = (self.bridge_id, 0, None);
        for (i, port) in self.ports.iter().enumerate() {
            if port.disabled {
                continue;
            }
            if let Some(stored) = port.stored {
                let candidate_cost = stored.root_path_cost + port.path_cost;
                if (stored.root_id, candidate_cost) < (best.0, best.1) {
                    best = (stored.root_id, candidate_cost, Some(i as u8));
                }
            }
        }
        self.root_id = best.0;
        self.root_path_cost = best.1;
        self.root_port = best.2;

        for (i, port) in self.ports.iter_mut().enumerate() {
            if port.disabled {
                continue;
            }
            let new_role = if Some(i as u8) == self.root_port {
                PortRole::Root
            } else {
                let our_claim = Bpdu {
                    root_id: self.root_id,
                    root_path_cost: self.root_path_cost,
                    sender_id: self.bridge_id,
                    sender_port: i as u8,
                };
                let we_are_designated = match port.stored {
                    None => true,
                    Some(stored) => our_claim < stored,
                };
                if we_are_designated {
                    PortRole::Designated
                } else {
                    PortRole::NonDesignated
                }
            };

            if new_role != port.role
                && matches!(new_role, PortRole::Root | PortRole::Designated)
            {
                port.became_active_at_sim_ms = Some(now_sim_ms);
            }
            port.role = new_role;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(n: u8) -> MacAddress {
        MacAddress::from_octets([0, 0, 0, 0, 0, n])
    }

    #[test]
    fn lone_switch_is_root_and_all_ports_designated() {
        let stp = Stp::new(BridgeId::new(32768, mac(1)), 3, 19, 15_000, 1_000);
        assert!(stp.is_root_bridge());
        assert!(stp.root_port().is_none());
        for p in 0..3 {
            assert_eq!(stp.port_role(p), PortRole::Designated);
        }
    }

    #[test]
    fn ports_progress_through_forward_delay_to_forwarding() {
        let mut stp = Stp::new(BridgeId::new(32768, mac(1)), 1, 19, 15_000, 1_000);
        stp.tick(500);
        assert_eq!(stp.port_state(0), PortState::Listening);
        stp.tick(1_500);
        assert_eq!(stp.port_state(0), PortState::Learning);
        stp.tick(2_500);
        assert_eq!(stp.port_state(0), PortState::Forwarding);
    }

    #[test]
    fn superior_bpdu_demotes_to_root_port_and_non_designated() {
        let mut stp = Stp::new(BridgeId::new(32768, mac(2)), 2, 19, 15_000, 1_000);
        let superior_root = BridgeId::new(0, mac(1));
        stp.receive_bpdu(
            0,
            Bpdu {
                root_id: superior_root,
                root_path_cost: 0,
                sender_id: superior_root,
                sender_port: 0,
            },
            0,
        );
        assert!(!stp.is_root_bridge());
        assert_eq!(stp.root_port(), Some(0));
        assert_eq!(stp.port_role(0), PortRole::Root);
    }

    #[test]
    fn idempotent_redelivery_does_not_reset_forward_delay_progress() {
        let mut stp = Stp::new(BridgeId::new(32768, mac(2)), 1, 19, 15_000, 1_000);
        let superior_root = BridgeId::new(0, mac(1));
        let bpdu = Bpdu {
            root_id: superior_root,
            root_path_cost: 0,
            sender_id: superior_root,
            sender_port: 0,
        };
        stp.receive_bpdu(0, bpdu, 0);
        stp.tick(2_500);
        assert_eq!(stp.port_state(0), PortState::Forwarding);

        // Redelivering the identical BPDU must not reset the timer.
        stp.receive_bpdu(0, bpdu, 2_600);
        stp.tick(2_600);
        assert_eq!(stp.port_state(0), PortState::Forwarding);
    }

    #[test]
    fn stale_bpdu_times_out_and_reconverges_to_root() {
        let mut stp = Stp::new(BridgeId::new(32768, mac(2)), 1, 19, 1_000, 200);
        let superior_root = BridgeId::new(0, mac(1));
        stp.receive_bpdu(
            0,
            Bpdu {
                root_id: superior_root,
                root_path_cost: 0,
                sender_id: superior_root,
                sender_port: 0,
            },
            0,
        );
        assert!(!stp.is_root_bridge());
        stp.tick(5_000); // far past max_age_ms with no refresh
        assert!(stp.is_root_bridge());
    }

    #[test]
    fn disabled_port_is_always_disabled_state() {
        let mut stp = Stp::new(BridgeId::new(32768, mac(1)), 2, 19, 15_000, 1_000);
        stp.set_port_disabled(1, true, 0);
        stp.tick(10_000);
        assert_eq!(stp.port_state(1), PortState::Disabled);
    }
}
