//! The layered protocol engine.
//!
//! Each module models one OSI-ish layer as a standalone component that
//! takes its peers' state as explicit arguments rather than reaching for a
//! global topology — the arena that actually wires nodes and links
//! together lives one crate up, in `netsim-node`. That split keeps a
//! `Switch` or `RoutingTable` unit-testable in isolation: feed it a frame
//! or a packet, read back what it decided to do with it.
//!
//! - [`phy`] — hardware interfaces, links, auto-negotiation
//! - [`datalink`] — Ethernet framing, MAC learning, switch forwarding, STP
//! - [`net`] — IPv4 interfaces, routing, ARP, fragmentation, ICMP echo
//! - [`services`] — DHCP client/server, ping

pub mod datalink;
pub mod net;
pub mod phy;
pub mod services;
