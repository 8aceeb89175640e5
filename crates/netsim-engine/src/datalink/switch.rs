//! Switch forwarding: learn, then flood or unicast per §4.4.

use super::frame::EthernetFrame;
use super::mac_table::MacTable;
use super::stp::{PortState, Stp};

/// What a switch decided to do with a received frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardDecision {
    /// Send out every port in `ports` (all `Forwarding`, excluding the
    /// ingress port).
    Flood { ports: Vec<u8> },
    /// Send out exactly one port.
    Unicast { port: u8 },
    /// The destination's learned port is the ingress port itself, or the
    /// ingress port isn't in a state that allows forwarding.
    Drop,
}

/// A MAC-learning switch with `port_count` ports, each governed by an
/// [`Stp`] port-state machine.
pub struct Switch {
    mac_table: MacTable,
    stp: Stp,
    port_count: u8,
}

impl Switch {
    pub fn new(port_count: u8, mac_table: MacTable, stp: Stp) -> Self {
        Switch {
            mac_table,
            stp,
            port_count,
        }
    }

    pub fn mac_table(&self) -> &MacTable {
        &self.mac_table
    }

    pub fn stp(&self) -> &Stp {
        &self.stp
    }

    pub fn stp_mut(&mut self) -> &mut Stp {
        &mut self.stp
    }

    /// Process a frame arriving at `ingress_port`. Learning happens only
    /// if the ingress port is `Learning` or `Forwarding`; forwarding
    /// decisions (flood/unicast) are made only from a `Forwarding` port,
    /// everything else is a silent drop per §4.4's failure semantics.
    pub fn receive(
        &mut self,
        frame: &EthernetFrame,
        ingress_port: u8,
        now_sim_ms: u64,
    ) -> ForwardDecision {
        let ingress_state = self.stp.port_state(ingress_port);

        if matches!(ingress_state, PortState::Learning | PortState::Forwarding) {
            self.mac_table.learn(frame.src_mac, ingress_port, now_sim_ms);
        }

        if ingress_state != PortState::Forwarding {
            return ForwardDecision::Drop;
        }

        let learned_port = self.mac_table.lookup(&frame.dst_mac, now_sim_ms);
        let should_flood =
            frame.dst_mac.is_broadcast() || learned_port.is_none() || learned_port == Some(ingress_port);

        if should_flood {
            let ports: Vec<u8> = (0..self.port_count)
                .filter(|&p| p != ingress_port && self.stp.port_state(p) == PortState::Forwarding)
                .collect();
            return ForwardDecision::Flood { ports };
        }

        let target = learned_port.expect("checked Some above");
        if self.stp.port_state(target) == PortState::Forwarding {
            ForwardDecision::Unicast { port: target }
        } else {
            ForwardDecision::Drop
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalink::frame::EtherType;
    use crate::datalink::stp::{BridgeId, Stp};
    use netsim_common::MacAddress;

    fn mac(n: u8) -> MacAddress {
        MacAddress::from_octets([0, 0, 0, 0, 0, n])
    }

    fn forwarding_switch(port_count: u8) -> Switch {
        let bridge_id = BridgeId::new(32768, mac(0));
        let mut stp = Stp::new(bridge_id, port_count, 2000, 15000, 1000);
        // A lone switch is its own root and every port starts Designated;
        // ticking two forward-delay intervals carries them to Forwarding.
        stp.tick(2_500);
        Switch::new(port_count, MacTable::new(300_000, 0), stp)
    }

    #[test]
    fn unknown_destination_floods_all_other_forwarding_ports() {
        let mut switch = forwarding_switch(4);
        let frame = EthernetFrame::new(mac(1), mac(9), EtherType::Ipv4, vec![0; 10]);
        let decision = switch.receive(&frame, 0, 0);
        assert_eq!(
            decision,
            ForwardDecision::Flood {
                ports: vec![1, 2, 3]
            }
        );
    }

    #[test]
    fn known_destination_unicasts() {
        let mut switch = forwarding_switch(4);
        switch.mac_table.learn(mac(9), 2, 0);
        let frame = EthernetFrame::new(mac(1), mac(9), EtherType::Ipv4, vec![0; 10]);
        let decision = switch.receive(&frame, 0, 10);
        assert_eq!(decision, ForwardDecision::Unicast { port: 2 });
    }

    #[test]
    fn destination_on_ingress_port_floods_instead_of_looping_back() {
        let mut switch = forwarding_switch(4);
        switch.mac_table.learn(mac(9), 0, 0);
        let frame = EthernetFrame::new(mac(1), mac(9), EtherType::Ipv4, vec![0; 10]);
        let decision = switch.receive(&frame, 0, 10);
        assert!(matches!(decision, ForwardDecision::Flood { .. }));
    }

    #[test]
    fn broadcast_always_floods() {
        let mut switch = forwarding_switch(3);
        switch.mac_table.learn(MacAddress::BROADCAST, 1, 0);
        let frame = EthernetFrame::new(mac(1), MacAddress::BROADCAST, EtherType::Arp, vec![]);
        let decision = switch.receive(&frame, 0, 10);
        assert_eq!(decision, ForwardDecision::Flood { ports: vec![1, 2] });
    }

    #[test]
    fn non_forwarding_ingress_port_drops_and_does_not_learn() {
        let bridge_id = BridgeId::new(32768, mac(0));
        let mut stp = Stp::new(bridge_id, 2, 2000, 15000, 1000);
        stp.tick(2_500); // port 0 reaches Forwarding
        stp.set_port_disabled(1, true, 2_500); // port 1 stays non-forwarding
        let mut switch = Switch::new(2, MacTable::new(300_000, 0), stp);

        let frame = EthernetFrame::new(mac(5), mac(9), EtherType::Ipv4, vec![0; 4]);
        let decision = switch.receive(&frame, 1, 0);
        assert_eq!(decision, ForwardDecision::Drop);
        assert_eq!(switch.mac_table().lookup(&mac(5), 0), None);
    }
}
