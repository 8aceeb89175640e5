//! TCP four-way connection teardown, either party-first, with the
//! closing side's TIME_WAIT timer (§4.8, scenario S4).

use netsim_common::observe::Subject;
use netsim_scheduler::{Flight, FlightEvent, FlightSpec, Scheduler};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CloseInitiator {
    Client,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PeerState {
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    LastAck,
    TimeWait,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FrameKind {
    Fin,
    Ack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Side {
    Initiator,
    Responder,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FlyingFrame {
    pub kind: FrameKind,
    pub from: Side,
    pub progress: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct TcpFinState {
    pub initiator: CloseInitiator,
    pub initiator_state: PeerState,
    pub responder_state: PeerState,
    pub time_wait_duration_ms: u64,
    pub has_time_wait_timer: bool,
    pub flying_frames: Vec<FlyingFrame>,
    pub phase: Phase,
    pub is_running: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Idle,
    InProgress,
    Completed,
}

impl TcpFinState {
    pub fn create_initial(initiator: CloseInitiator, time_wait_duration_ms: u64) -> Self {
        TcpFinState {
            initiator,
            initiator_state: PeerState::Established,
            responder_state: PeerState::Established,
            time_wait_duration_ms,
            has_time_wait_timer: false,
            flying_frames: Vec::new(),
            phase: Phase::Idle,
            is_running: false,
        }
    }
}

const TIME_WAIT_TIMER_ID: u64 = 1;

struct InFlight {
    kind: FrameKind,
    from: Side,
    flight: Flight,
}

/// The "initiator" is whichever side calls `close()` first; both the
/// client-first and server-first scenarios run through the same state
/// machine with the roles swapped.
pub struct TcpFin {
    subject: Subject<TcpFinState>,
    scheduler: Scheduler,
    in_flight: Vec<InFlight>,
    frame_transit_ms: u64,
}

impl TcpFin {
    pub fn new(initiator: CloseInitiator, time_wait_duration_ms: u64, frame_transit_ms: u64) -> Self {
        TcpFin {
            subject: Subject::new(TcpFinState::create_initial(initiator, time_wait_duration_ms)),
            scheduler: Scheduler::new(),
            in_flight: Vec::new(),
            frame_transit_ms,
        }
    }

    pub fn set_listener(&mut self, listener: impl FnMut(&TcpFinState) + Send + 'static) {
        self.subject.set_listener(listener);
    }

    pub fn get_state(&self) -> TcpFinState {
        self.subject.get_state()
    }

    pub fn start(&mut self) {
        self.subject.mutate_quiet(|s| {
            s.is_running = true;
            s.phase = Phase::InProgress;
        });
        self.send(FrameKind::Fin, Side::Initiator);
        self.subject.mutate_quiet(|s| s.initiator_state = PeerState::FinWait1);
        self.subject.emit();
    }

    pub fn stop(&mut self) {
        self.subject.mutate(|s| s.is_running = false);
    }

    pub fn reset(&mut self) {
        self.in_flight.clear();
        self.scheduler.reset();
        self.subject.mutate(|s| {
            let (initiator, twd) = (s.initiator, s.time_wait_duration_ms);
            *s = TcpFinState::create_initial(initiator, twd);
        });
    }

    pub fn dispose(&mut self) {
        self.stop();
        self.subject.clear_listener();
    }

    /// Internal helper: mutates quietly. Called from `start`/`tick`/
    /// `on_arrival`, which are responsible for the single trailing `emit()`.
    fn send(&mut self, kind: FrameKind, from: Side) {
        self.in_flight.push(InFlight {
            kind,
            from,
            flight: Flight::new(FlightSpec::new(self.frame_transit_ms)),
        });
        self.sync_flying_view();
    }

    fn sync_flying_view(&mut self) {
        let frames: Vec<FlyingFrame> =
            self.in_flight.iter().map(|f| FlyingFrame { kind: f.kind, from: f.from, progress: 0 }).collect();
        self.subject.mutate_quiet(|s| s.flying_frames = frames);
    }

    pub fn tick(&mut self, delta_ms: u64) {
        if !self.subject.state().is_running {
            return;
        }

        let mut arrivals = Vec::new();
        for f in self.in_flight.iter_mut() {
            for ev in f.flight.advance(delta_ms) {
                if ev == FlightEvent::Arrived {
                    arrivals.push((f.kind, f.from));
                }
            }
        }
        self.in_flight.retain(|f| !f.flight.is_terminated());

        for (kind, from) in arrivals {
            self.on_arrival(kind, from);
        }

        let fired = self.scheduler.advance(delta_ms);
        if fired.contains(&TIME_WAIT_TIMER_ID) {
            self.subject.mutate_quiet(|s| {
                s.initiator_state = PeerState::Closed;
                s.has_time_wait_timer = false;
                s.phase = Phase::Completed;
                s.is_running = false;
            });
        }

        self.sync_flying_view();
        self.subject.emit();
    }

    fn on_arrival(&mut self, kind: FrameKind, from: Side) {
        match (kind, from) {
            (FrameKind::Fin, Side::Initiator) => {
                self.subject.mutate_quiet(|s| s.responder_state = PeerState::CloseWait);
                self.send(FrameKind::Ack, Side::Responder);
            }
            (FrameKind::Ack, Side::Responder) => {
                self.subject.mutate_quiet(|s| s.initiator_state = PeerState::FinWait2);
                // Responder has its own data to finish; here it closes immediately.
                self.send(FrameKind::Fin, Side::Responder);
                self.subject.mutate_quiet(|s| s.responder_state = PeerState::LastAck);
            }
            (FrameKind::Fin, Side::Responder) => {
                self.send(FrameKind::Ack, Side::Initiator);
                self.enter_time_wait();
            }
            (FrameKind::Ack, Side::Initiator) => {
                self.subject.mutate_quiet(|s| s.responder_state = PeerState::Closed);
            }
            _ => {}
        }
    }

    fn enter_time_wait(&mut self) {
        self.subject.mutate_quiet(|s| {
            s.initiator_state = PeerState::TimeWait;
            s.has_time_wait_timer = true;
        });
        let duration = self.subject.state().time_wait_duration_ms;
        self.scheduler.schedule(TIME_WAIT_TIMER_ID, self.scheduler.now_sim_ms() + duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s4_client_first_time_wait_then_closed() {
        let mut fin = TcpFin::new(CloseInitiator::Client, 4000, 200);
        fin.start();
        for _ in 0..20 {
            fin.tick(100);
            if fin.get_state().initiator_state == PeerState::TimeWait {
                break;
            }
        }
        let state = fin.get_state();
        assert_eq!(state.initiator_state, PeerState::TimeWait);
        assert!(state.has_time_wait_timer);

        for _ in 0..60 {
            fin.tick(100);
        }
        let state = fin.get_state();
        assert_eq!(state.initiator_state, PeerState::Closed);
        assert_eq!(state.phase, Phase::Completed);
        assert!(!state.is_running);
    }

    #[test]
    fn server_first_close_runs_the_same_state_machine() {
        let mut fin = TcpFin::new(CloseInitiator::Server, 1000, 200);
        fin.start();
        for _ in 0..40 {
            fin.tick(100);
            if fin.get_state().phase == Phase::Completed {
                break;
            }
        }
        assert_eq!(fin.get_state().phase, Phase::Completed);
    }

    #[test]
    fn reset_returns_both_peers_to_established() {
        let mut fin = TcpFin::new(CloseInitiator::Client, 4000, 200);
        fin.start();
        fin.tick(500);
        fin.reset();
        let state = fin.get_state();
        assert_eq!(state.initiator_state, PeerState::Established);
        assert_eq!(state.responder_state, PeerState::Established);
        assert_eq!(state.phase, Phase::Idle);
    }
}
