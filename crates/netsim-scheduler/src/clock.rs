//! The discrete-event timer queue.
//!
//! Ordering is `(atSimMs, insertion order)` ascending, same as a textbook
//! event-driven network simulator: ties break FIFO on schedule order, never
//! on callback id. Cancellation does not walk the heap — it bumps a
//! generation counter for the callback id, and entries whose stamped
//! generation has gone stale are skipped silently when popped. This is the
//! same trick you'd reach for in any binary-heap timer wheel where removing
//! an arbitrary element is `O(n)` and you'd rather pay a `HashMap` lookup
//! per pop instead.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// Playback rate relative to wall-clock time.
///
/// `PAUSED` freezes simulated time entirely: [`Scheduler::advance`] becomes
/// a no-op and no pending callback fires, no matter how much wall-clock
/// time passes, until speed is restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedLevel {
    Paused,
    Slower,
    RealTime,
    Faster,
}

impl SpeedLevel {
    /// Simulated milliseconds per wall-clock millisecond.
    pub fn multiplier(self) -> f64 {
        match self {
            SpeedLevel::Paused => 0.0,
            SpeedLevel::Slower => 1e-6,
            SpeedLevel::RealTime => 1.0,
            SpeedLevel::Faster => 1e5,
        }
    }
}

impl Default for SpeedLevel {
    fn default() -> Self {
        SpeedLevel::RealTime
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct TimerEntry {
    at_sim_ms: u64,
    seq: u64,
    callback_id: u64,
    generation: u64,
}

// Reversed so a `BinaryHeap` (a max-heap) behaves as a min-heap over
// `(at_sim_ms, seq)`.
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at_sim_ms
            .cmp(&self.at_sim_ms)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The virtual-time scheduler.
///
/// A `Scheduler` is passed explicitly to whatever needs to schedule a
/// timeout — there is no ambient global instance. Every protocol layer in
/// `netsim-engine` takes `&mut Scheduler` as a plain argument the same way
/// it takes `&mut self`.
pub struct Scheduler {
    speed: SpeedLevel,
    elapsed_sim_ms: u64,
    queue: BinaryHeap<TimerEntry>,
    next_seq: u64,
    generation: HashMap<u64, u64>,
    tick_listeners: Vec<Box<dyn FnMut(u64) + Send>>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("speed", &self.speed)
            .field("elapsed_sim_ms", &self.elapsed_sim_ms)
            .field("queue_len", &self.queue.len())
            .field("tick_listeners", &self.tick_listeners.len())
            .finish()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            speed: SpeedLevel::RealTime,
            elapsed_sim_ms: 0,
            queue: BinaryHeap::new(),
            next_seq: 0,
            generation: HashMap::new(),
            tick_listeners: Vec::new(),
        }
    }

    /// Register a listener notified once per [`Scheduler::advance`] call
    /// that actually moved simulated time forward, with the new
    /// `now_sim_ms` — a coarse "time advanced to X" signal distinct from
    /// any individual callback firing (§4.1 external interface, §9
    /// supplemented feature).
    pub fn on_tick(&mut self, listener: impl FnMut(u64) + Send + 'static) {
        self.tick_listeners.push(Box::new(listener));
    }

    pub fn speed(&self) -> SpeedLevel {
        self.speed
    }

    pub fn set_speed(&mut self, speed: SpeedLevel) {
        self.speed = speed;
    }

    /// Current simulated-time position, in milliseconds since the last
    /// [`Scheduler::reset`].
    pub fn now_sim_ms(&self) -> u64 {
        self.elapsed_sim_ms
    }

    /// Wall-clock-to-sim-time mapping exposed for presentation (elapsed
    /// counters, formatted timestamps). Internal timer firing never reads
    /// this — it drives purely off [`Scheduler::advance`].
    pub fn delta_ms(&self) -> u64 {
        self.elapsed_sim_ms
    }

    /// Register `callback_id` to come due at `at_sim_ms`. The same id may
    /// be scheduled more than once (e.g. a periodic resample); each
    /// registration fires independently unless cancelled first.
    pub fn schedule(&mut self, callback_id: u64, at_sim_ms: u64) {
        let generation = *self.generation.entry(callback_id).or_insert(0);
        self.queue.push(TimerEntry {
            at_sim_ms,
            seq: self.next_seq,
            callback_id,
            generation,
        });
        self.next_seq += 1;
    }

    /// Invalidate every currently pending registration for `callback_id`.
    /// A subsequent `schedule` for the same id is unaffected — this only
    /// poisons entries already sitting in the queue.
    pub fn cancel(&mut self, callback_id: u64) {
        *self.generation.entry(callback_id).or_insert(0) += 1;
    }

    /// Advance simulated time by `by_sim_ms` and return the callback ids
    /// that came due, in fire order. A no-op while paused.
    pub fn advance(&mut self, by_sim_ms: u64) -> Vec<u64> {
        if self.speed == SpeedLevel::Paused {
            return Vec::new();
        }
        self.elapsed_sim_ms += by_sim_ms;
        let mut fired = Vec::new();
        while let Some(entry) = self.queue.peek() {
            if entry.at_sim_ms > self.elapsed_sim_ms {
                break;
            }
            let entry = self.queue.pop().expect("peeked entry must pop");
            let current = *self.generation.get(&entry.callback_id).unwrap_or(&0);
            if entry.generation != current {
                continue; // cancelled since it was scheduled
            }
            fired.push(entry.callback_id);
        }
        for listener in self.tick_listeners.iter_mut() {
            listener(self.elapsed_sim_ms);
        }
        fired
    }

    /// Drop every pending timer and rewind simulated time to zero.
    /// Generation counters reset too, since the queue they guarded is gone.
    pub fn reset(&mut self) {
        self.elapsed_sim_ms = 0;
        self.queue.clear();
        self.generation.clear();
        self.next_seq = 0;
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::new()
    }
}
