//! The IPv4 packet record.

use netsim_common::Ipv4Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpProtocol {
    Icmp,
    Tcp,
    Udp,
}

/// An in-memory IPv4 packet. `total_len` is the header-plus-payload
/// length in bytes; fragmentation (§4.5) only ever touches `frag_offset`,
/// `more_fragments`, and `total_len`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Packet {
    pub src: Ipv4Address,
    pub dst: Ipv4Address,
    pub ttl: u8,
    pub protocol: IpProtocol,
    pub id: u32,
    pub frag_offset: u16,
    pub more_fragments: bool,
    pub df_flag: bool,
    pub payload: Vec<u8>,
    pub total_len: u32,
}

/// Bytes consumed by the IPv4 header proper (no options modeled).
pub const IPV4_HEADER_BYTES: u32 = 20;

impl Ipv4Packet {
    pub fn new(
        src: Ipv4Address,
        dst: Ipv4Address,
        protocol: IpProtocol,
        id: u32,
        payload: Vec<u8>,
        df_flag: bool,
    ) -> Self {
        let total_len = IPV4_HEADER_BYTES + payload.len() as u32;
        Ipv4Packet {
            src,
            dst,
            ttl: 64,
            protocol,
            id,
            frag_offset: 0,
            more_fragments: false,
            df_flag,
            payload,
            total_len,
        }
    }

    pub fn decrement_ttl(&mut self) -> bool {
        if self.ttl == 0 {
            return false;
        }
        self.ttl -= 1;
        self.ttl > 0
    }
}
