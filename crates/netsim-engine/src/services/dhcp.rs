//! DHCP: an address pool + lease ledger on the server side, and the
//! discover/offer/request/ack state machine on the client side (§4.6).

use netsim_common::{AddressError, Ipv4Address, MacAddress};
use std::collections::HashMap;
use tracing::{debug, info, warn};

// ─── Pools & ledger ──────────────────────────────────────────────────────────

/// One address range a DHCP server can hand out. `start` and `end` must
/// lie in `gateway`'s network under `netmask` — checked once at
/// construction, same contract as [`netsim_common::Ipv4Address`]'s mask
/// validation.
#[derive(Debug, Clone)]
pub struct DhcpPool {
    pub name: String,
    pub gateway: Ipv4Address,
    pub netmask: Ipv4Address,
    pub start: Ipv4Address,
    pub end: Ipv4Address,
    pub dns: Option<Ipv4Address>,
    pub tftp: Option<Ipv4Address>,
    pub wlc: Option<Ipv4Address>,
}

impl DhcpPool {
    pub fn new(
        name: impl Into<String>,
        gateway: Ipv4Address,
        netmask: Ipv4Address,
        start: Ipv4Address,
        end: Ipv4Address,
    ) -> Result<Self, AddressError> {
        if !gateway.in_same_network(&netmask, &start) || !gateway.in_same_network(&netmask, &end) {
            return Err(AddressError::Format(
                "pool start/end must share gateway's network".to_string(),
            ));
        }
        Ok(DhcpPool {
            name: name.into(),
            gateway,
            netmask,
            start,
            end,
            dns: None,
            tftp: None,
            wlc: None,
        })
    }

    pub fn with_dns(mut self, dns: Ipv4Address) -> Self {
        self.dns = Some(dns);
        self
    }

    pub fn with_tftp(mut self, tftp: Ipv4Address) -> Self {
        self.tftp = Some(tftp);
        self
    }

    pub fn with_wlc(mut self, wlc: Ipv4Address) -> Self {
        self.wlc = Some(wlc);
        self
    }

    fn shares_network_with(&self, ip: Ipv4Address, mask: Ipv4Address) -> bool {
        mask.bits() == self.netmask.bits() && self.gateway.in_same_network(&mask, &ip)
    }

    /// Every candidate address in `[start, end]`, ascending.
    fn candidates(&self) -> impl Iterator<Item = Ipv4Address> {
        let lo = self.start.bits();
        let hi = self.end.bits();
        (lo..=hi).map(Ipv4Address::from_u32)
    }
}

#[derive(Debug, Clone, Copy)]
struct Lease {
    ip: Ipv4Address,
    expires_at_sim_ms: u64,
}

/// `mac -> (ip, leaseExpiresAtSimMs)`.
#[derive(Debug, Clone, Default)]
pub struct DhcpLedger {
    leases: HashMap<MacAddress, Lease>,
}

impl DhcpLedger {
    pub fn new() -> Self {
        DhcpLedger::default()
    }

    fn is_free(&self, ip: Ipv4Address, requester: MacAddress) -> bool {
        !self
            .leases
            .iter()
            .any(|(mac, lease)| lease.ip == ip && *mac != requester)
    }

    fn holder_of(&self, ip: Ipv4Address) -> Option<MacAddress> {
        self.leases
            .iter()
            .find(|(_, lease)| lease.ip == ip)
            .map(|(mac, _)| *mac)
    }

    fn commit(&mut self, mac: MacAddress, ip: Ipv4Address, lease_ms: u64, now_sim_ms: u64) {
        self.leases.insert(
            mac,
            Lease {
                ip,
                expires_at_sim_ms: now_sim_ms + lease_ms,
            },
        );
    }

    pub fn release(&mut self, mac: &MacAddress) {
        self.leases.remove(mac);
    }

    pub fn lease_for(&self, mac: &MacAddress) -> Option<(Ipv4Address, u64)> {
        self.leases.get(mac).map(|l| (l.ip, l.expires_at_sim_ms))
    }
}

// ─── Server ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DhcpOffer {
    pub ip: Ipv4Address,
    pub netmask: Ipv4Address,
    pub gateway: Ipv4Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhcpRequestOutcome {
    Ack(DhcpOffer),
    Nak,
}

/// A DHCP server: ordered pools searched in order, a shared ledger, and
/// an enable flag (disabled servers never answer, matching §6's `enable`
/// toggle on the service surface).
pub struct DhcpServer {
    pub enabled: bool,
    pools: Vec<DhcpPool>,
    ledger: DhcpLedger,
}

impl DhcpServer {
    pub fn new() -> Self {
        DhcpServer {
            enabled: true,
            pools: Vec::new(),
            ledger: DhcpLedger::new(),
        }
    }

    pub fn add_pool(&mut self, pool: DhcpPool) {
        self.pools.push(pool);
    }

    pub fn remove_pool(&mut self, name: &str) {
        self.pools.retain(|p| p.name != name);
    }

    pub fn pools(&self) -> &[DhcpPool] {
        &self.pools
    }

    pub fn ledger(&self) -> &DhcpLedger {
        &self.ledger
    }

    /// DISCOVER arriving on an interface configured with `(interface_ip,
    /// interface_mask)`: the first pool whose gateway shares that subnet
    /// wins, and the lowest free (or already-held-by-this-mac) address in
    /// its range is offered.
    pub fn handle_discover(
        &self,
        interface_ip: Ipv4Address,
        interface_mask: Ipv4Address,
        requester: MacAddress,
    ) -> Option<DhcpOffer> {
        if !self.enabled {
            return None;
        }
        let pool = self
            .pools
            .iter()
            .find(|p| p.shares_network_with(interface_ip, interface_mask))?;

        let ip = pool
            .candidates()
            .find(|&candidate| self.ledger.is_free(candidate, requester))?;

        debug!(%ip, pool = %pool.name, "DHCP offering address");
        Some(DhcpOffer {
            ip,
            netmask: pool.netmask,
            gateway: pool.gateway,
        })
    }

    /// REQUEST for a previously offered address: commit the lease if it's
    /// still free (or already this MAC's), otherwise NAK so the client
    /// restarts discovery.
    pub fn handle_request(
        &mut self,
        requester: MacAddress,
        offered_ip: Ipv4Address,
        lease_ms: u64,
        now_sim_ms: u64,
    ) -> DhcpRequestOutcome {
        if !self.enabled {
            return DhcpRequestOutcome::Nak;
        }
        let pool = match self
            .pools
            .iter()
            .find(|p| p.candidates().any(|c| c == offered_ip))
        {
            Some(p) => p.clone(),
            None => return DhcpRequestOutcome::Nak,
        };

        let still_free = self.ledger.holder_of(offered_ip).is_none_or(|h| h == requester);
        if !still_free {
            warn!(%offered_ip, "DHCP NAK: address claimed by another lease");
            return DhcpRequestOutcome::Nak;
        }

        self.ledger.commit(requester, offered_ip, lease_ms, now_sim_ms);
        info!(%offered_ip, %requester, "DHCP lease granted");
        DhcpRequestOutcome::Ack(DhcpOffer {
            ip: offered_ip,
            netmask: pool.netmask,
            gateway: pool.gateway,
        })
    }

    pub fn handle_release(&mut self, mac: &MacAddress) {
        self.ledger.release(mac);
    }
}

impl Default for DhcpServer {
    fn default() -> Self {
        DhcpServer::new()
    }
}

// ─── Client ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhcpClientStage {
    Idle,
    Discovering,
    Requesting,
    Bound,
    Failed,
}

/// The client side of §4.6: broadcast DISCOVER, retry up to
/// `max_retries` times waiting for an OFFER, REQUEST it, install the
/// lease on ACK. A NAK or exhausted retries lands in `Failed` — the
/// interface keeps no IP and the caller surfaces a soft error, never a
/// panic.
pub struct DhcpClient {
    stage: DhcpClientStage,
    max_retries: u32,
    attempts: u32,
    bound: Option<DhcpOffer>,
}

impl DhcpClient {
    pub fn new(max_retries: u32) -> Self {
        DhcpClient {
            stage: DhcpClientStage::Idle,
            max_retries,
            attempts: 0,
            bound: None,
        }
    }

    pub fn stage(&self) -> DhcpClientStage {
        self.stage
    }

    pub fn bound_offer(&self) -> Option<DhcpOffer> {
        self.bound
    }

    /// Interface came up with `autoNegotiateAddress=true`: send the first
    /// DISCOVER.
    pub fn start_discovery(&mut self) {
        self.stage = DhcpClientStage::Discovering;
        self.attempts = 1;
    }

    pub fn on_offer(&mut self, offer: DhcpOffer) {
        if self.stage != DhcpClientStage::Discovering {
            return;
        }
        self.stage = DhcpClientStage::Requesting;
        self.bound = Some(offer);
    }

    /// No OFFER arrived before the retry timeout: retry, or give up once
    /// `max_retries` is exhausted.
    pub fn on_discover_timeout(&mut self) {
        if self.stage != DhcpClientStage::Discovering {
            return;
        }
        if self.attempts >= self.max_retries {
            self.stage = DhcpClientStage::Failed;
        } else {
            self.attempts += 1;
        }
    }

    pub fn on_ack(&mut self) {
        if self.stage == DhcpClientStage::Requesting {
            self.stage = DhcpClientStage::Bound;
        }
    }

    pub fn on_nak(&mut self) {
        self.stage = DhcpClientStage::Failed;
        self.bound = None;
    }
}
