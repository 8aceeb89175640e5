//! Auto-negotiation: the page-0/page-1 exchange that picks a common
//! `(speed, duplex)` for a newly-connected link.

use super::link::{Duplex, Speed};

/// Which duplex modes a side is willing to advertise, independent of
/// which speeds it supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplexPref {
    HalfOnly,
    FullOnly,
    Both,
}

/// One side's configuration going into negotiation.
#[derive(Debug, Clone, Copy)]
pub struct AutoNegConfig {
    pub min_speed: Speed,
    pub max_speed: Speed,
    pub duplex_pref: DuplexPref,
}

impl AutoNegConfig {
    pub fn new(min_speed: Speed, max_speed: Speed, duplex_pref: DuplexPref) -> Self {
        AutoNegConfig {
            min_speed,
            max_speed,
            duplex_pref,
        }
    }

    fn speed_rank(speed: Speed) -> u32 {
        match speed {
            Speed::Auto => 0,
            Speed::Mbps10 => 10,
            Speed::Mbps100 => 100,
            Speed::Gbps1 => 1000,
        }
    }

    fn in_bounds(&self, speed: Speed) -> bool {
        let rank = Self::speed_rank(speed);
        rank >= Self::speed_rank(self.min_speed) && rank <= Self::speed_rank(self.max_speed)
    }

    /// The technology ability set this side advertises: every `(speed,
    /// duplex)` pair within bounds and allowed by `duplex_pref`.
    fn advertised(&self) -> Vec<(Speed, Duplex)> {
        let mut out = Vec::new();
        for speed in [Speed::Mbps10, Speed::Mbps100, Speed::Gbps1] {
            if !self.in_bounds(speed) {
                continue;
            }
            if matches!(self.duplex_pref, DuplexPref::HalfOnly | DuplexPref::Both) {
                out.push((speed, Duplex::Half));
            }
            if matches!(self.duplex_pref, DuplexPref::FullOnly | DuplexPref::Both) {
                out.push((speed, Duplex::Full));
            }
        }
        out
    }

    /// Page 1 carries the 1000 Mbps technology bits and is only exchanged
    /// when gigabit is in the advertised set.
    fn needs_page1(&self) -> bool {
        self.in_bounds(Speed::Gbps1)
    }
}

/// The outcome of a negotiation: the committed speed and duplex, or
/// `None` meaning the link stays down (no common ability, e.g. a peer
/// advertising only a speed the other side's bounds exclude).
pub type Selection = Option<(Speed, Duplex)>;

/// Highest common speed, full duplex preferred when both sides support
/// it at that speed. Pure and symmetric: both peers compute the same
/// result independently from their mutual advertisements.
pub fn negotiate(local: &AutoNegConfig, remote: &AutoNegConfig) -> Selection {
    let local_ads = local.advertised();
    let remote_ads = remote.advertised();

    for speed in [Speed::Gbps1, Speed::Mbps100, Speed::Mbps10] {
        let local_full = local_ads.contains(&(speed, Duplex::Full));
        let local_half = local_ads.contains(&(speed, Duplex::Half));
        let remote_full = remote_ads.contains(&(speed, Duplex::Full));
        let remote_half = remote_ads.contains(&(speed, Duplex::Half));

        if local_full && remote_full {
            return Some((speed, Duplex::Full));
        }
        if local_half && remote_half {
            return Some((speed, Duplex::Half));
        }
    }
    None
}

/// Stage of the page exchange, tracked per interface so the handshake
/// can be driven one message at a time instead of collapsed into a
/// single function call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoNegStage {
    Idle,
    Page0Sent,
    Page1Sent,
    AckPending,
    Committed,
    LinkDown,
}

/// One side of an in-progress (or completed) negotiation.
#[derive(Debug, Clone)]
pub struct AutoNegSession {
    config: AutoNegConfig,
    stage: AutoNegStage,
    peer_ads: Option<Vec<(Speed, Duplex)>>,
    result: Selection,
}

impl AutoNegSession {
    pub fn new(config: AutoNegConfig) -> Self {
        AutoNegSession {
            config,
            stage: AutoNegStage::Idle,
            peer_ads: None,
            result: None,
        }
    }

    pub fn stage(&self) -> AutoNegStage {
        self.stage
    }

    pub fn result(&self) -> Selection {
        self.result
    }

    /// Begin the exchange: page 0 always goes out; page 1 follows only if
    /// this side's bounds include gigabit.
    pub fn send_page0(&mut self) -> Vec<(Speed, Duplex)> {
        self.stage = AutoNegStage::Page0Sent;
        self.config.advertised()
    }

    pub fn needs_page1(&self) -> bool {
        self.config.needs_page1()
    }

    pub fn send_page1(&mut self) -> Vec<(Speed, Duplex)> {
        self.stage = AutoNegStage::Page1Sent;
        self.config
            .advertised()
            .into_iter()
            .filter(|(s, _)| *s == Speed::Gbps1)
            .collect()
    }

    /// Receive the peer's advertised ability set (after their page 0, and
    /// their page 1 if they sent one) and commit to a selection.
    pub fn receive_peer_ads(&mut self, mut peer_ads: Vec<(Speed, Duplex)>) {
        let combined = match self.peer_ads.take() {
            Some(mut existing) => {
                existing.append(&mut peer_ads);
                existing
            }
            None => peer_ads,
        };

        let local_ads = self.config.advertised();
        let mut best = None;
        for speed in [Speed::Gbps1, Speed::Mbps100, Speed::Mbps10] {
            let local_full = local_ads.contains(&(speed, Duplex::Full));
            let local_half = local_ads.contains(&(speed, Duplex::Half));
            let remote_full = combined.contains(&(speed, Duplex::Full));
            let remote_half = combined.contains(&(speed, Duplex::Half));
            if local_full && remote_full {
                best = Some((speed, Duplex::Full));
                break;
            }
            if local_half && remote_half {
                best = Some((speed, Duplex::Half));
                break;
            }
        }

        self.peer_ads = Some(combined);
        self.stage = AutoNegStage::AckPending;
        self.result = best;
    }

    /// ACK received: both interfaces transition to the chosen pair.
    /// Unsupported requests that found no common ability commit to
    /// link-down instead.
    pub fn receive_ack(&mut self) {
        self.stage = match self.result {
            Some(_) => AutoNegStage::Committed,
            None => AutoNegStage::LinkDown,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiate_picks_highest_common_speed_full_duplex() {
        let a = AutoNegConfig::new(Speed::Mbps10, Speed::Gbps1, DuplexPref::Both);
        let b = AutoNegConfig::new(Speed::Mbps10, Speed::Mbps100, DuplexPref::Both);
        assert_eq!(negotiate(&a, &b), Some((Speed::Mbps100, Duplex::Full)));
    }

    #[test]
    fn negotiate_falls_back_to_half_when_one_side_half_only() {
        let a = AutoNegConfig::new(Speed::Mbps10, Speed::Gbps1, DuplexPref::Both);
        let b = AutoNegConfig::new(Speed::Mbps10, Speed::Gbps1, DuplexPref::HalfOnly);
        assert_eq!(negotiate(&a, &b), Some((Speed::Gbps1, Duplex::Half)));
    }

    #[test]
    fn negotiate_no_common_speed_means_link_down() {
        let a = AutoNegConfig::new(Speed::Gbps1, Speed::Gbps1, DuplexPref::Both);
        let b = AutoNegConfig::new(Speed::Mbps10, Speed::Mbps10, DuplexPref::Both);
        assert_eq!(negotiate(&a, &b), None);
    }

    #[test]
    fn page1_only_sent_when_gigabit_advertised() {
        let gig = AutoNegSession::new(AutoNegConfig::new(
            Speed::Mbps10,
            Speed::Gbps1,
            DuplexPref::Both,
        ));
        assert!(gig.needs_page1());

        let fast_eth = AutoNegSession::new(AutoNegConfig::new(
            Speed::Mbps10,
            Speed::Mbps100,
            DuplexPref::Both,
        ));
        assert!(!fast_eth.needs_page1());
    }

    #[test]
    fn session_commits_after_ack() {
        let mut local = AutoNegSession::new(AutoNegConfig::new(
            Speed::Mbps10,
            Speed::Gbps1,
            DuplexPref::Both,
        ));
        let remote = AutoNegConfig::new(Speed::Mbps10, Speed::Mbps100, DuplexPref::Both);

        local.send_page0();
        assert_eq!(local.stage(), AutoNegStage::Page0Sent);

        local.receive_peer_ads(remote.advertised());
        assert_eq!(local.stage(), AutoNegStage::AckPending);
        assert_eq!(local.result(), Some((Speed::Mbps100, Duplex::Full)));

        local.receive_ack();
        assert_eq!(local.stage(), AutoNegStage::Committed);
    }

    #[test]
    fn unsupported_request_negotiates_to_link_down() {
        let mut local = AutoNegSession::new(AutoNegConfig::new(
            Speed::Gbps1,
            Speed::Gbps1,
            DuplexPref::Both,
        ));
        let remote = AutoNegConfig::new(Speed::Mbps10, Speed::Mbps10, DuplexPref::Both);
        local.send_page0();
        local.receive_peer_ads(remote.advertised());
        assert_eq!(local.result(), None);
        local.receive_ack();
        assert_eq!(local.stage(), AutoNegStage::LinkDown);
    }
}
