//! Network-layer interface: a [`crate::phy::HardwareInterface`] with an
//! optional IP configuration layered on top.

use crate::phy::HardwareInterface;
use netsim_common::Ipv4Address;

/// A physical interface extended with IP addressing. Per the universal
/// invariant, a manually-set `ip`/`mask` is ignored while
/// `auto_negotiate_address` (the DHCP flag) is true and no lease has been
/// installed yet.
#[derive(Debug, Clone)]
pub struct NetworkInterface {
    pub hardware: HardwareInterface,
    ip: Option<Ipv4Address>,
    mask: Option<Ipv4Address>,
    pub auto_negotiate_address: bool,
    dhcp_bound: bool,
}

impl NetworkInterface {
    pub fn new(hardware: HardwareInterface) -> Self {
        NetworkInterface {
            hardware,
            ip: None,
            mask: None,
            auto_negotiate_address: false,
            dhcp_bound: false,
        }
    }

    /// Manual address assignment. Ignored for addressing purposes while
    /// `auto_negotiate_address` is set and DHCP hasn't completed — the
    /// value is still stored so a later `set_auto_negotiate_address(false)`
    /// doesn't silently lose what the operator typed in.
    pub fn set_address(&mut self, ip: Ipv4Address, mask: Ipv4Address) {
        self.ip = Some(ip);
        self.mask = Some(mask);
    }

    pub fn clear_address(&mut self) {
        self.ip = None;
        self.mask = None;
    }

    pub fn set_auto_negotiate_address(&mut self, enabled: bool) {
        self.auto_negotiate_address = enabled;
    }

    /// The effective address, or `None` if unconfigured, or if DHCP is
    /// pending and hasn't installed a lease yet.
    pub fn ip(&self) -> Option<Ipv4Address> {
        if self.auto_negotiate_address && !self.dhcp_bound {
            return None;
        }
        self.ip
    }

    pub fn mask(&self) -> Option<Ipv4Address> {
        if self.auto_negotiate_address && !self.dhcp_bound {
            return None;
        }
        self.mask
    }

    /// Called by the DHCP client once a lease is installed: from this
    /// point the manually-stored (or DHCP-assigned) address is live even
    /// though `auto_negotiate_address` stays true.
    pub fn install_dhcp_lease(&mut self, ip: Ipv4Address, mask: Ipv4Address) {
        self.ip = Some(ip);
        self.mask = Some(mask);
        self.dhcp_bound = true;
    }

    pub fn clear_dhcp_lease(&mut self) {
        self.dhcp_bound = false;
        self.ip = None;
        self.mask = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netsim_common::MacAddress;

    fn iface() -> NetworkInterface {
        NetworkInterface::new(HardwareInterface::new(MacAddress::from_octets([0; 6])))
    }

    #[test]
    fn manual_address_is_live_without_dhcp() {
        let mut n = iface();
        n.set_address(
            Ipv4Address::parse("10.0.0.1").unwrap(),
            Ipv4Address::from_prefix_len(24).unwrap(),
        );
        assert!(n.ip().is_some());
    }

    #[test]
    fn manual_address_ignored_while_dhcp_pending() {
        let mut n = iface();
        n.set_address(
            Ipv4Address::parse("10.0.0.1").unwrap(),
            Ipv4Address::from_prefix_len(24).unwrap(),
        );
        n.set_auto_negotiate_address(true);
        assert_eq!(n.ip(), None);
    }

    #[test]
    fn dhcp_lease_becomes_live_once_installed() {
        let mut n = iface();
        n.set_auto_negotiate_address(true);
        assert_eq!(n.ip(), None);
        n.install_dhcp_lease(
            Ipv4Address::parse("10.0.0.5").unwrap(),
            Ipv4Address::from_prefix_len(24).unwrap(),
        );
        assert_eq!(n.ip(), Some(Ipv4Address::parse("10.0.0.5").unwrap()));
    }
}
