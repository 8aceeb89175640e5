//! Network layer: IP interfaces, routing, ARP, IPv4, fragmentation, ICMP.

pub mod arp;
pub mod fragmentation;
pub mod icmp;
pub mod interface;
pub mod ipv4;
pub mod routing;

pub use arp::ArpCache;
pub use fragmentation::{FragmentEvent, FragmentingRouter};
pub use icmp::IcmpRequestRegistry;
pub use interface::NetworkInterface;
pub use ipv4::Ipv4Packet;
pub use routing::{RouteEntry, RoutingTable};
