//! PC/server/switch/router node aggregates and the link-arena topology
//! that cables them together (§4.9).

pub mod node;
pub mod topology;

pub use node::{Host, Router, Switch};
pub use topology::{DeliveryOutcome, Endpoint, Node, NodeId, Topology};
