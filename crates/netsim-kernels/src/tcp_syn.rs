//! TCP three-way handshake, with an optional SYN-cookie firewall
//! standing between the client and the server (§4.8).

use netsim_common::observe::Subject;
use netsim_scheduler::{Flight, FlightEvent, FlightSpec};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClientState {
    Closed,
    SynSent,
    Established,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServerState {
    Listen,
    SynRcvd,
    Established,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FirewallState {
    Filtering,
    CookieSent,
    RstSent,
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FrameKind {
    Syn,
    SynAck,
    Ack,
    Rst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Endpoint {
    Client,
    Server,
    Firewall,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SentFrame {
    pub kind: FrameKind,
    pub from: Endpoint,
    pub to: Endpoint,
    pub cookie: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FlyingFrame {
    pub kind: FrameKind,
    pub from: Endpoint,
    pub to: Endpoint,
    pub progress: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct TcpSynState {
    pub with_firewall: bool,
    pub client_state: ClientState,
    pub server_state: ServerState,
    pub firewall_state: Option<FirewallState>,
    pub sent_frames: Vec<SentFrame>,
    pub flying_frames: Vec<FlyingFrame>,
    pub is_running: bool,
    pub is_complete: bool,
}

impl TcpSynState {
    pub fn create_initial(with_firewall: bool) -> Self {
        TcpSynState {
            with_firewall,
            client_state: ClientState::Closed,
            server_state: ServerState::Listen,
            firewall_state: if with_firewall { Some(FirewallState::Filtering) } else { None },
            sent_frames: Vec::new(),
            flying_frames: Vec::new(),
            is_running: false,
            is_complete: false,
        }
    }
}

struct InFlight {
    kind: FrameKind,
    from: Endpoint,
    to: Endpoint,
    cookie: Option<u64>,
    flight: Flight,
}

/// Drives a TCP handshake one frame-transit at a time. With
/// `with_firewall` set, the client's first SYN never reaches the
/// server directly: the firewall answers with its own SYN-ACK carrying
/// a cookie, then RSTs the client once the ACK lands, forcing a fresh
/// handshake straight to the server.
pub struct TcpSyn {
    subject: Subject<TcpSynState>,
    rng: StdRng,
    in_flight: Vec<InFlight>,
    frame_transit_ms: u64,
}

impl TcpSyn {
    pub fn new(with_firewall: bool, frame_transit_ms: u64, seed: u64) -> Self {
        TcpSyn {
            subject: Subject::new(TcpSynState::create_initial(with_firewall)),
            rng: StdRng::seed_from_u64(seed),
            in_flight: Vec::new(),
            frame_transit_ms,
        }
    }

    pub fn set_listener(&mut self, listener: impl FnMut(&TcpSynState) + Send + 'static) {
        self.subject.set_listener(listener);
    }

    pub fn get_state(&self) -> TcpSynState {
        self.subject.get_state()
    }

    pub fn start(&mut self) {
        self.subject.mutate_quiet(|s| s.is_running = true);
        let first_hop = if self.subject.state().with_firewall { Endpoint::Firewall } else { Endpoint::Server };
        self.send(FrameKind::Syn, Endpoint::Client, first_hop, None);
        self.subject.mutate_quiet(|s| s.client_state = ClientState::SynSent);
        self.subject.emit();
    }

    pub fn stop(&mut self) {
        self.subject.mutate(|s| s.is_running = false);
    }

    pub fn reset(&mut self) {
        self.in_flight.clear();
        self.subject.mutate(|s| {
            let with_firewall = s.with_firewall;
            *s = TcpSynState::create_initial(with_firewall);
        });
    }

    pub fn dispose(&mut self) {
        self.stop();
        self.subject.clear_listener();
    }

    fn draw_cookie(&mut self) -> u64 {
        self.rng.random::<u64>()
    }

    /// Internal helper: mutates quietly. `start`/`tick`/`on_arrival`'s
    /// callers own the single trailing `emit()` for the public call.
    fn send(&mut self, kind: FrameKind, from: Endpoint, to: Endpoint, cookie: Option<u64>) {
        self.subject.mutate_quiet(|s| s.sent_frames.push(SentFrame { kind, from, to, cookie }));
        self.in_flight.push(InFlight {
            kind,
            from,
            to,
            cookie,
            flight: Flight::new(FlightSpec::new(self.frame_transit_ms)),
        });
        self.sync_flying_view();
    }

    fn sync_flying_view(&mut self) {
        let frames: Vec<FlyingFrame> = self
            .in_flight
            .iter()
            .map(|f| FlyingFrame { kind: f.kind, from: f.from, to: f.to, progress: 0 })
            .collect();
        self.subject.mutate_quiet(|s| s.flying_frames = frames);
    }

    pub fn tick(&mut self, delta_ms: u64) {
        if !self.subject.state().is_running || self.subject.state().is_complete {
            return;
        }

        let mut arrivals = Vec::new();
        for f in self.in_flight.iter_mut() {
            for ev in f.flight.advance(delta_ms) {
                if ev == FlightEvent::Arrived {
                    arrivals.push((f.kind, f.from, f.to, f.cookie));
                }
            }
        }
        self.in_flight.retain(|f| !f.flight.is_terminated());

        for (kind, from, to, cookie) in arrivals {
            self.on_arrival(kind, from, to, cookie);
        }

        self.sync_flying_view();

        let done = self.subject.state().client_state == ClientState::Established
            && self.subject.state().server_state == ServerState::Established;
        if done {
            self.subject.mutate_quiet(|s| {
                s.is_complete = true;
                s.is_running = false;
            });
        }

        self.subject.emit();
    }

    fn on_arrival(&mut self, kind: FrameKind, from: Endpoint, to: Endpoint, cookie: Option<u64>) {
        match (to, kind) {
            (Endpoint::Firewall, FrameKind::Syn) => {
                let my_cookie = self.draw_cookie();
                self.subject.mutate_quiet(|s| s.firewall_state = Some(FirewallState::CookieSent));
                self.send(FrameKind::SynAck, Endpoint::Firewall, Endpoint::Client, Some(my_cookie));
            }
            (Endpoint::Client, FrameKind::SynAck) if from == Endpoint::Firewall => {
                self.send(FrameKind::Ack, Endpoint::Client, Endpoint::Firewall, cookie);
            }
            (Endpoint::Firewall, FrameKind::Ack) => {
                self.subject.mutate_quiet(|s| s.firewall_state = Some(FirewallState::RstSent));
                self.send(FrameKind::Rst, Endpoint::Firewall, Endpoint::Client, None);
            }
            (Endpoint::Client, FrameKind::Rst) => {
                self.subject.mutate_quiet(|s| {
                    s.client_state = ClientState::Closed;
                    s.firewall_state = Some(FirewallState::Idle);
                });
                // Client restarts the handshake, this time straight to the server.
                self.send(FrameKind::Syn, Endpoint::Client, Endpoint::Server, None);
                self.subject.mutate_quiet(|s| s.client_state = ClientState::SynSent);
            }
            (Endpoint::Server, FrameKind::Syn) => {
                self.subject.mutate_quiet(|s| s.server_state = ServerState::SynRcvd);
                self.send(FrameKind::SynAck, Endpoint::Server, Endpoint::Client, None);
            }
            (Endpoint::Client, FrameKind::SynAck) if from == Endpoint::Server => {
                self.subject.mutate_quiet(|s| s.client_state = ClientState::Established);
                self.send(FrameKind::Ack, Endpoint::Client, Endpoint::Server, None);
            }
            (Endpoint::Server, FrameKind::Ack) => {
                self.subject.mutate_quiet(|s| s.server_state = ServerState::Established);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_handshake_is_exactly_three_frames() {
        let mut tcp = TcpSyn::new(false, 500, 1);
        tcp.start();
        for _ in 0..20 {
            tcp.tick(100);
            if tcp.get_state().is_complete {
                break;
            }
        }
        let state = tcp.get_state();
        assert_eq!(state.client_state, ClientState::Established);
        assert_eq!(state.server_state, ServerState::Established);
        assert_eq!(state.sent_frames.len(), 3);
    }

    #[test]
    fn s6_firewall_forces_a_second_syn_and_an_rst() {
        let mut tcp = TcpSyn::new(true, 500, 7);
        tcp.start();
        for _ in 0..40 {
            tcp.tick(100);
            if tcp.get_state().is_complete {
                break;
            }
        }
        let state = tcp.get_state();
        assert!(state.sent_frames.len() > 3);
        assert!(state
            .sent_frames
            .iter()
            .any(|f| f.kind == FrameKind::Rst && f.from == Endpoint::Firewall && f.to == Endpoint::Client));
        assert!(state
            .sent_frames
            .iter()
            .filter(|f| f.kind == FrameKind::Syn && f.from == Endpoint::Client && f.to == Endpoint::Server)
            .count()
            >= 1);
    }

    #[test]
    fn cookie_values_differ_across_simulations() {
        let mut a = TcpSyn::new(true, 500, 11);
        let mut b = TcpSyn::new(true, 500, 12);
        a.start();
        b.start();
        for _ in 0..5 {
            a.tick(100);
            b.tick(100);
        }
        let cookie_a = a.get_state().sent_frames.iter().find_map(|f| f.cookie);
        let cookie_b = b.get_state().sent_frames.iter().find_map(|f| f.cookie);
        assert!(cookie_a.is_some() && cookie_b.is_some());
        assert_ne!(cookie_a, cookie_b);
    }

    #[test]
    fn reset_returns_to_closed_listen() {
        let mut tcp = TcpSyn::new(false, 500, 2);
        tcp.start();
        tcp.tick(1000);
        tcp.reset();
        let state = tcp.get_state();
        assert_eq!(state.client_state, ClientState::Closed);
        assert_eq!(state.server_state, ServerState::Listen);
        assert!(state.sent_frames.is_empty());
    }
}
