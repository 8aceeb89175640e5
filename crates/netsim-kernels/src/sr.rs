//! Selective Repeat: per-packet timers and receiver-side buffering,
//! contrasted with Go-Back-N's single base timer (§4.8).

use netsim_common::observe::Subject;
use netsim_scheduler::{Flight, FlightEvent, FlightSpec, Scheduler};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlyingPacket {
    pub seq: u32,
    pub progress: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlyingAck {
    pub seq: u32,
    pub progress: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct SrState {
    pub total_packets: u32,
    pub window_size: u32,
    pub base: u32,
    pub next_seq_num: u32,
    pub timeout_ms: u64,
    pub loss_rate_percent: u8,
    pub speed_ms: u64,
    pub is_running: bool,
    pub last_ack_sent: Option<u32>,
    pub receiver_buffer: Vec<u32>,
    pub delivered: Vec<u32>,
    pub flying_packets: Vec<FlyingPacket>,
    pub flying_acks: Vec<FlyingAck>,
}

impl SrState {
    pub fn create_initial(total_packets: u32, window_size: u32, timeout_ms: u64, loss_rate_percent: u8, speed_ms: u64) -> Self {
        SrState {
            total_packets,
            window_size,
            base: 0,
            next_seq_num: 0,
            timeout_ms,
            loss_rate_percent,
            speed_ms,
            is_running: false,
            last_ack_sent: None,
            receiver_buffer: Vec::new(),
            delivered: Vec::new(),
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
    flight: Flight,
    acked: bool,
}

struct InFlightAck {
    seq: u32,
    flight: Flight,
}

/// Each outstanding packet gets its own scheduler-backed timer, the
/// defining difference from Go-Back-N's single base timer.
pub struct SelectiveRepeat {
    subject: Subject<SrState>,
    scheduler: Scheduler,
    rng: StdRng,
    packets: Vec<InFlightPacket>,
    acks: Vec<InFlightAck>,
    next_timer_id: u64,
    timer_for_seq: std::collections::HashMap<u32, u64>,
    duplicate_acks: std::collections::HashMap<u32, u32>,
}

impl SelectiveRepeat {
    pub fn new(total_packets: u32, window_size: u32, timeout_ms: u64, loss_rate_percent: u8, speed_ms: u64, seed: u64) -> Self {
        SelectiveRepeat {
            subject: Subject::new(SrState::create_initial(
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
            next_timer_id: 1,
            timer_for_seq: std::collections::HashMap::new(),
            duplicate_acks: std::collections::HashMap::new(),
        }
    }

    pub fn set_listener(&mut self, listener: impl FnMut(&SrState) + Send + 'static) {
        self.subject.set_listener(listener);
    }

    pub fn get_state(&self) -> SrState {
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

    pub fn reset(&mut self) {
        self.packets.clear();
        self.acks.clear();
        self.timer_for_seq.clear();
        self.duplicate_acks.clear();
        self.scheduler.reset();
        self.subject.mutate(|s| {
            let (total, window, timeout, loss, speed) =
                (s.total_packets, s.window_size, s.timeout_ms, s.loss_rate_percent, s.speed_ms);
            *s = SrState::create_initial(total, window, timeout, loss, speed);
        });
    }

    pub fn dispose(&mut self) {
        self.stop();
        self.subject.clear_listener();
    }

    fn draw_loss(&mut self) -> bool {
        self.rng.random_range(0..100) < self.subject.state().loss_rate_percent as u32
    }

    /// Internal helper: mutates quietly, relies on the caller (a public
    /// mutator) to emit once after everything it touches has settled.
    fn fill_window(&mut self) {
        let (base, window, total, next) = {
            let s = self.subject.state();
            (s.base, s.window_size, s.total_packets, s.next_seq_num)
        };
        let window_end = (base + window).min(total);
        for seq in next..window_end {
            self.send_packet(seq);
        }
        if window_end > next {
            self.subject.mutate_quiet(|s| s.next_seq_num = window_end);
        }
        self.sync_flying_view();
    }

    fn send_packet(&mut self, seq: u32) {
        let lost = self.draw_loss();
        let speed_ms = self.subject.state().speed_ms;
        let spec = if lost {
            FlightSpec::new(speed_ms).lost_at(50)
        } else {
            FlightSpec::new(speed_ms)
        };
        self.packets.push(InFlightPacket {
            seq,
            flight: Flight::new(spec),
            acked: false,
        });
        let timer_id = self.next_timer_id;
        self.next_timer_id += 1;
        self.timer_for_seq.insert(seq, timer_id);
        let timeout_ms = self.subject.state().timeout_ms;
        self.scheduler.schedule(timer_id, self.scheduler.now_sim_ms() + timeout_ms);
    }

    /// Retransmit exactly one packet — the hallmark of Selective Repeat
    /// over Go-Back-N's whole-window resend.
    fn retransmit_one(&mut self, seq: u32) {
        self.packets.retain(|p| p.seq != seq || p.acked);
        self.send_packet(seq);
    }

    fn sync_flying_view(&mut self) {
        let packets: Vec<FlyingPacket> = self
            .packets
            .iter()
            .filter(|p| !p.acked)
            .map(|p| FlyingPacket { seq: p.seq, progress: 0 })
            .collect();
        let acks: Vec<FlyingAck> = self.acks.iter().map(|a| FlyingAck { seq: a.seq, progress: 0 }).collect();
        self.subject.mutate_quiet(|s| {
            s.flying_packets = packets;
            s.flying_acks = acks;
        });
    }

    pub fn tick(&mut self, delta_ms: u64) {
        if !self.subject.state().is_running || self.subject.state().is_complete() {
            return;
        }

        let window = self.subject.state().window_size;
        let mut arrived = Vec::new();
        for pkt in self.packets.iter_mut().filter(|p| !p.acked) {
            for ev in pkt.flight.advance(delta_ms) {
                if ev == FlightEvent::Arrived {
                    arrived.push(pkt.seq);
                }
            }
        }

        for seq in arrived {
            let expected_base = self.subject.state().base;
            if seq >= expected_base && seq < expected_base + window {
                self.subject.mutate_quiet(|s| {
                    if !s.receiver_buffer.contains(&seq) {
                        s.receiver_buffer.push(seq);
                    }
                });
                self.acks.push(InFlightAck {
                    seq,
                    flight: Flight::new(FlightSpec::new(self.subject.state().speed_ms / 2)),
                });
                self.subject.mutate_quiet(|s| s.last_ack_sent = Some(seq));
            } else {
                // Out-of-window arrival: duplicate-ack style fast
                // retransmit trigger on the first unacked packet.
                let count = self.duplicate_acks.entry(expected_base).or_insert(0);
                *count += 1;
                if *count >= 3 {
                    self.retransmit_one(expected_base);
                    self.duplicate_acks.insert(expected_base, 0);
                }
            }
        }

        let mut ack_events = Vec::new();
        for ack in self.acks.iter_mut() {
            for ev in ack.flight.advance(delta_ms) {
                if ev == FlightEvent::Arrived {
                    ack_events.push(ack.seq);
                }
            }
        }
        self.acks.retain(|a| !a.flight.is_terminated());

        for seq in ack_events {
            if let Some(p) = self.packets.iter_mut().find(|p| p.seq == seq) {
                p.acked = true;
            }
            if let Some(timer_id) = self.timer_for_seq.remove(&seq) {
                self.scheduler.cancel(timer_id);
            }
            self.duplicate_acks.remove(&seq);
        }
        self.packets.retain(|p| !(p.acked && p.flight.is_terminated()));

        // Deliver any contiguous prefix of the receiver's buffer.
        loop {
            let base = self.subject.state().base;
            if self.subject.state().receiver_buffer.contains(&base) {
                self.subject.mutate_quiet(|s| {
                    s.receiver_buffer.retain(|&b| b != base);
                    s.delivered.push(base);
                    s.base += 1;
                });
            } else {
                break;
            }
        }

        let fired = self.scheduler.advance(delta_ms);
        let timed_out_seqs: Vec<u32> = fired
            .iter()
            .filter_map(|id| self.timer_for_seq.iter().find(|(_, &v)| v == *id).map(|(&k, _)| k))
            .collect();
        for seq in timed_out_seqs {
            self.retransmit_one(seq);
        }

        self.fill_window();
        self.sync_flying_view();

        if self.subject.state().is_complete() {
            self.subject.mutate_quiet(|s| s.is_running = false);
        }

        self.subject.emit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_loss_delivers_a_strictly_increasing_prefix() {
        let mut sr = SelectiveRepeat::new(6, 3, 5000, 0, 100, 5);
        sr.start();
        for _ in 0..200 {
            sr.tick(50);
            if sr.get_state().is_complete() {
                break;
            }
        }
        let state = sr.get_state();
        assert_eq!(state.delivered, vec![0, 1, 2, 3, 4, 5]);
        for window in state.delivered.windows(2) {
            assert!(window[0] < window[1]);
        }
    }

    #[test]
    fn window_fill_respects_window_size() {
        let mut sr = SelectiveRepeat::new(10, 4, 5000, 0, 2000, 2);
        sr.start();
        let state = sr.get_state();
        assert_eq!(state.next_seq_num - state.base, 4);
    }

    #[test]
    fn reset_preserves_config_and_clears_progress() {
        let mut sr = SelectiveRepeat::new(10, 4, 5000, 10, 2000, 2);
        sr.start();
        sr.tick(200);
        sr.reset();
        let state = sr.get_state();
        assert_eq!(state.total_packets, 10);
        assert_eq!(state.window_size, 4);
        assert_eq!(state.base, 0);
        assert!(state.delivered.is_empty());
    }

    #[test]
    fn single_packet_timeout_retransmits_only_that_packet() {
        let mut sr = SelectiveRepeat::new(5, 3, 500, 0, 100_000, 4);
        sr.start();
        let before: Vec<u32> = sr.get_state().flying_packets.iter().map(|p| p.seq).collect();
        sr.tick(600); // past the 500ms timeout, packets themselves never arrive (speed 100s)
        let after: Vec<u32> = sr.get_state().flying_packets.iter().map(|p| p.seq).collect();
        // the same set of sequence numbers is still outstanding — only
        // their underlying flights were replaced, not the window shape
        assert_eq!(before, after);
    }
}
