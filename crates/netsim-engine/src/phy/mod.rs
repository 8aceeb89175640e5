//! Physical layer: hardware interfaces, links, and auto-negotiation.

pub mod autoneg;
pub mod link;

pub use autoneg::{AutoNegConfig, AutoNegSession, DuplexPref, Selection};
pub use link::{Duplex, Link, LinkId, Speed};

use netsim_common::MacAddress;

/// An interface exclusively owned by the node it's attached to. Created
/// when the node is built, destroyed with it — there is no detach-and-move
/// operation, matching the data model's ownership note.
#[derive(Debug, Clone)]
pub struct HardwareInterface {
    pub mac: MacAddress,
    pub speed: Speed,
    pub full_duplex: bool,
    pub active: bool,
    pub link: Option<LinkId>,
}

impl HardwareInterface {
    pub fn new(mac: MacAddress) -> Self {
        HardwareInterface {
            mac,
            speed: Speed::Auto,
            full_duplex: true,
            active: false,
            link: None,
        }
    }

    pub fn up(&mut self) {
        self.active = true;
    }

    pub fn down(&mut self) {
        self.active = false;
    }

    pub fn is_up(&self) -> bool {
        self.active && self.link.is_some()
    }

    pub fn connect(&mut self, link: LinkId) {
        self.link = Some(link);
    }

    pub fn disconnect(&mut self) {
        self.link = None;
    }

    pub fn set_speed(&mut self, speed: Speed) {
        self.speed = speed;
    }

    pub fn set_full_duplex(&mut self, full_duplex: bool) {
        self.full_duplex = full_duplex;
    }
}
