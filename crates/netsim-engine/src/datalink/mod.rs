//! Datalink layer: Ethernet framing, MAC learning, switch forwarding, STP.

pub mod frame;
pub mod mac_table;
pub mod stp;
pub mod switch;

pub use frame::{EtherType, EthernetFrame};
pub use mac_table::MacTable;
pub use stp::{Bpdu, BridgeId, PortRole, PortState, Stp};
pub use switch::{ForwardDecision, Switch};
