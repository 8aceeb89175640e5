//! Go-Back-N sliding-window ARQ: cumulative ACKs, a single timer on the
//! base packet, and three-duplicate-ACK fast retransmit (§4.8).

use std::collections::HashMap;

use netsim_common::observe::Subject;
use netsim_scheduler::{Flight, FlightEvent, FlightSpec, Scheduler};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::debug;

/// Packet/ack callback id namespace inside the kernel's own `Scheduler` —
/// only the base-packet retransmit timer ever rides on it.
const BASE_TIMER_ID: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlyingPacket {
    pub seq: u32,
    pub progress: u8,
    pub is_fast_retransmit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlyingAck {
    pub ack_num: u32,
    pub progress: u8,
}

/// `createInitialState()`: the pure factory every kernel shape starts from.
#[derive(Debug, Clone, Serialize)]
pub struct GbnState {
    pub total_packets: u32,
    pub window_size: u32,
    pub base: u32,
    pub next_seq_num: u32,
    pub last_ack_received: Option<u32>,
    pub duplicate_ack_count: u32,
    pub timeout_ms: u64,
    pub loss_rate_percent: u8,
    pub speed_ms: u64,
    pub is_running: bool,
    pub received_packets: Vec<u32>,
    pub arrived_packets: Vec<u32>,
    pub flying_packets: Vec<FlyingPacket>,
    pub flying_acks: Vec<FlyingAck>,
}

impl GbnState {
    pub fn create_initial(total_packets: u32, window_size: u32, timeout_ms: u64, loss_rate_percent: u8, speed_ms: u64) -> Self {
        GbnState {
            total_packets,
            window_size,
            base: 0,
            next_seq_num: 0,
            last_ack_received: None,
            duplicate_ack_count: 0,
            timeout_ms,
            loss_rate_percent,
            speed_ms,
            is_running: false,
            received_packets: Vec::new(),
            arrived_packets: Vec::new(),
            flying_packets: Vec::new(),
            flying_acks: Vec::new(),
        }
    }

    fn is_complete(&self) -> bool {
        self.base >= self.total_packets
    }
}

struct InFlightPacket {
    seq: u32,
    is_fast_retransmit: bool,
    flight: Flight,
}

struct InFlightAck {
    ack_num: u32,
    flight: Flight,
}

/// The Go-Back-N kernel: wraps [`GbnState`] in a [`Subject`], drives
/// packet/ack flights, and owns the single base-packet retransmit timer
/// on its own [`Scheduler`].
pub struct GoBackN {
    subject: Subject<GbnState>,
    scheduler: Scheduler,
    rng: StdRng,
    packets: Vec<InFlightPacket>,
    acks: Vec<InFlightAck>,
    next_seed: u64,
}

impl GoBackN {
    pub fn new(total_packets: u32, window_size: u32, timeout_ms: u64, loss_rate_percent: u8, speed_ms: u64, seed: u64) -> Self {
        GoBackN {
            subject: Subject::new(GbnState::create_initial(
                total_packets,
                window_size,
                timeout_ms,
                loss_rate_percent,
                speed_ms,
            )),
            scheduler: Scheduler::new(),
            rng: StdRng::seed_from_u64(seed),
            packets: Vec::new(),
            acks: Vec::new(),
            next_seed: seed,
        }
    }

    pub fn set_listener(&mut self, listener: impl FnMut(&GbnState) + Send + 'static) {
        self.subject.set_listener(listener);
    }

    pub fn get_state(&self) -> GbnState {
        self.subject.get_state()
    }

    pub fn start(&mut self) {
        self.subject.mutate_quiet(|s| s.is_running = true);
        self.fill_window();
        self.subject.emit();
    }

    pub fn stop(&mut self) {
        self.subject.mutate(|s| s.is_running = false);
    }

    /// Resets everything except `total_packets` and the configured knobs
    /// (`window_size`, `timeout_ms`, `loss_rate_percent`, `speed_ms`) —
    /// the sticky config fields every kernel's `reset()` preserves.
    pub fn reset(&mut self) {
        self.packets.clear();
        self.acks.clear();
        self.scheduler.reset();
        self.subject.mutate(|s| {
            let (total, window, timeout, loss, speed) =
                (s.total_packets, s.window_size, s.timeout_ms, s.loss_rate_percent, s.speed_ms);
            *s = GbnState::create_initial(total, window, timeout, loss, speed);
        });
    }

    pub fn dispose(&mut self) {
        self.stop();
        self.subject.clear_listener();
    }

    fn draw_loss(&mut self) -> bool {
        self.rng.random_range(0..100) < self.subject.state().loss_rate_percent as u32
    }

    /// Send every packet in `[base, min(base+window, total))` not
    /// already flying — the initial window fill and every subsequent
    /// slide both funnel through here.
    ///
    /// Internal helper: mutates the subject quietly. Every public
    /// mutator that calls this (`start`, `tick`) emits exactly once
    /// itself after the last such helper runs.
    fn fill_window(&mut self) {
        let (base, window, total, next) = {
            let s = self.subject.state();
            (s.base, s.window_size, s.total_packets, s.next_seq_num)
        };
        let window_end = (base + window).min(total);
        let mut newly_sent = Vec::new();
        for seq in next..window_end {
            let lost = self.draw_loss();
            let spec = if lost {
                FlightSpec::new(self.subject.state().speed_ms).lost_at(50)
            } else {
                FlightSpec::new(self.subject.state().speed_ms)
            };
            self.packets.push(InFlightPacket {
                seq,
                is_fast_retransmit: false,
                flight: Flight::new(spec),
            });
            newly_sent.push(seq);
        }
        if !newly_sent.is_empty() {
            self.subject.mutate_quiet(|s| s.next_seq_num = window_end);
            self.rearm_base_timer();
        }
        self.sync_flying_view();
    }

    fn rearm_base_timer(&mut self) {
        self.scheduler.cancel(BASE_TIMER_ID);
        let timeout_ms = self.subject.state().timeout_ms;
        self.scheduler.schedule(BASE_TIMER_ID, self.scheduler.now_sim_ms() + timeout_ms);
    }

    /// Timeout retransmit: the base packet's timer is the only one
    /// running, and its expiry re-sends the whole outstanding window
    /// (`[base, next_seq_num)`) — classic Go-Back-N.
    fn retransmit_window(&mut self, is_fast_retransmit: bool) {
        let (base, next) = {
            let s = self.subject.state();
            (s.base, s.next_seq_num)
        };
        self.packets.retain(|p| !(base..next).contains(&p.seq));
        for seq in base..next {
            let lost = self.draw_loss();
            let spec = if lost {
                FlightSpec::new(self.subject.state().speed_ms).lost_at(50)
            } else {
                FlightSpec::new(self.subject.state().speed_ms)
            };
            self.packets.push(InFlightPacket {
                seq,
                is_fast_retransmit,
                flight: Flight::new(spec),
            });
        }
        self.subject.mutate_quiet(|s| s.duplicate_ack_count = 0);
        self.rearm_base_timer();
        self.sync_flying_view();
    }

    /// Fast retransmit (§4.8): three duplicate ACKs for the same value
    /// resend only the base packet, flagged — deliberately narrower than
    /// a timeout's whole-window resend in `retransmit_window`.
    fn fast_retransmit_base(&mut self) {
        let base = self.subject.state().base;
        self.packets.retain(|p| p.seq != base);
        let lost = self.draw_loss();
        let speed_ms = self.subject.state().speed_ms;
        let spec = if lost { FlightSpec::new(speed_ms).lost_at(50) } else { FlightSpec::new(speed_ms) };
        self.packets.push(InFlightPacket {
            seq: base,
            is_fast_retransmit: true,
            flight: Flight::new(spec),
        });
        self.subject.mutate_quiet(|s| s.duplicate_ack_count = 0);
        self.rearm_base_timer();
        self.sync_flying_view();
    }

    fn sync_flying_view(&mut self) {
        let packets: Vec<FlyingPacket> = self
            .packets
            .iter()
            .map(|p| FlyingPacket {
                seq: p.seq,
                progress: 0,
                is_fast_retransmit: p.is_fast_retransmit,
            })
            .collect();
        let acks: Vec<FlyingAck> = self
            .acks
            .iter()
            .map(|a| FlyingAck { ack_num: a.ack_num, progress: 0 })
            .collect();
        self.subject.mutate_quiet(|s| {
            s.flying_packets = packets;
            s.flying_acks = acks;
        });
    }

    /// Advance simulated time by `delta_ms`: progresses every flight,
    /// resolves arrivals/losses, advances the retransmit timer, and
    /// refills the window as base slides forward.
    pub fn tick(&mut self, delta_ms: u64) {
        if !self.subject.state().is_running || self.subject.state().is_complete() {
            return;
        }

        let mut expected_seq_num = self.subject.state().received_packets.len() as u32;
        let mut arrived_now = Vec::new();
        let mut lost_seqs = Vec::new();
        for pkt in self.packets.iter_mut() {
            for ev in pkt.flight.advance(delta_ms) {
                match ev {
                    FlightEvent::Arrived => arrived_now.push(pkt.seq),
                    FlightEvent::Lost => lost_seqs.push(pkt.seq),
                    FlightEvent::Progress(_) => {}
                }
            }
        }
        self.packets.retain(|p| !p.flight.is_terminated());

        let mut ack_to_send: Option<u32> = None;
        for seq in arrived_now {
            if seq == expected_seq_num {
                self.subject.mutate_quiet(|s| s.received_packets.push(seq));
                expected_seq_num += 1;
                // drain any previously out-of-order arrivals that are now contiguous
                loop {
                    let next_buffered = self
                        .subject
                        .state()
                        .arrived_packets
                        .iter()
                        .position(|&p| p == expected_seq_num);
                    match next_buffered {
                        Some(idx) => {
                            self.subject.mutate_quiet(|s| {
                                s.arrived_packets.remove(idx);
                                s.received_packets.push(expected_seq_num);
                            });
                            expected_seq_num += 1;
                        }
                        None => break,
                    }
                }
                ack_to_send = Some(expected_seq_num - 1);
            } else if seq > expected_seq_num {
                self.subject.mutate_quiet(|s| {
                    if !s.arrived_packets.contains(&seq) {
                        s.arrived_packets.push(seq);
                    }
                });
                ack_to_send = Some(expected_seq_num.saturating_sub(1));
            }
        }
        if let Some(ack_num) = ack_to_send {
            self.acks.push(InFlightAck {
                ack_num,
                flight: Flight::new(FlightSpec::new(self.subject.state().speed_ms / 2)),
            });
        }
        if !lost_seqs.is_empty() {
            debug!(?lost_seqs, "go-back-n packet(s) lost in flight");
        }

        let mut ack_events = Vec::new();
        for ack in self.acks.iter_mut() {
            for ev in ack.flight.advance(delta_ms) {
                if ev == FlightEvent::Arrived {
                    ack_events.push(ack.ack_num);
                }
            }
        }
        self.acks.retain(|a| !a.flight.is_terminated());

        for ack_num in ack_events {
            self.apply_ack(ack_num);
        }

        let fired = self.scheduler.advance(delta_ms);
        if fired.contains(&BASE_TIMER_ID) {
            self.retransmit_window(false);
        }

        self.fill_window();
        self.sync_flying_view();
        self.subject.emit();
    }

    /// Internal helper (see [`Subject::mutate_quiet`]): only `tick` and
    /// the direct-call test below invoke this, and `tick` is the one
    /// that emits.
    fn apply_ack(&mut self, ack_num: u32) {
        let (base, last_ack) = {
            let s = self.subject.state();
            (s.base, s.last_ack_received)
        };
        if Some(ack_num) == last_ack {
            let dup = self.subject.mutate_quiet(|s| {
                s.duplicate_ack_count += 1;
                s.duplicate_ack_count
            });
            if dup >= 3 {
                self.fast_retransmit_base();
            }
            return;
        }
        if ack_num + 1 > base {
            self.subject.mutate_quiet(|s| {
                s.base = ack_num + 1;
                s.last_ack_received = Some(ack_num);
                s.duplicate_ack_count = 0;
            });
            if self.subject.state().is_complete() {
                self.scheduler.cancel(BASE_TIMER_ID);
                self.subject.mutate_quiet(|s| s.is_running = false);
            } else {
                self.rearm_base_timer();
            }
        }
    }
}
