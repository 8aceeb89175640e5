//! The packet-in-transit progress driver.
//!
//! A [`Flight`] turns a duration into a sequence of progress samples plus
//! exactly one terminal event. Kernels drive it directly with
//! [`Flight::advance`] at whatever cadence they resample on (animation
//! kernels poll roughly every 50ms of simulated time); it does not touch a
//! [`crate::Scheduler`] itself, so nothing here needs a callback that can
//! reach back into kernel state.

/// Configuration for a single flight.
#[derive(Debug, Clone, Copy)]
pub struct FlightSpec {
    pub duration_ms: u64,
    /// If set, the flight never reaches 100 — it clamps at
    /// `loss_cutoff_percent` and terminates with [`FlightEvent::Lost`].
    pub will_be_lost: bool,
    pub loss_cutoff_percent: u8,
}

impl FlightSpec {
    pub fn new(duration_ms: u64) -> Self {
        FlightSpec {
            duration_ms,
            will_be_lost: false,
            loss_cutoff_percent: 50,
        }
    }

    pub fn lost_at(mut self, cutoff_percent: u8) -> Self {
        self.will_be_lost = true;
        self.loss_cutoff_percent = cutoff_percent;
        self
    }
}

/// One sample or terminal notification produced by [`Flight::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightEvent {
    Progress(u8),
    Arrived,
    Lost,
}

/// A single packet (or frame, or signal) in transit.
#[derive(Debug, Clone)]
pub struct Flight {
    spec: FlightSpec,
    elapsed_ms: u64,
    terminated: bool,
}

impl Flight {
    pub fn new(spec: FlightSpec) -> Self {
        Flight {
            spec,
            elapsed_ms: 0,
            terminated: false,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Cancel the flight without emitting a terminal event. Idempotent —
    /// calling it again, or calling it after the flight already reached a
    /// terminal state on its own, changes nothing.
    pub fn cancel(&mut self) {
        self.terminated = true;
    }

    /// Advance the flight's internal clock by `delta_ms` of simulated time
    /// and return the events this step produced, in order. Returns an
    /// empty vec once the flight has terminated.
    pub fn advance(&mut self, delta_ms: u64) -> Vec<FlightEvent> {
        if self.terminated {
            return Vec::new();
        }
        self.elapsed_ms += delta_ms;

        let raw_percent = if self.spec.duration_ms == 0 {
            100
        } else {
            (((self.elapsed_ms as f64 / self.spec.duration_ms as f64) * 100.0).min(100.0)) as u8
        };

        let mut events = Vec::with_capacity(2);
        if self.spec.will_be_lost {
            let cutoff = self.spec.loss_cutoff_percent.min(100);
            if raw_percent >= cutoff {
                events.push(FlightEvent::Progress(cutoff));
                events.push(FlightEvent::Lost);
                self.terminated = true;
            } else {
                events.push(FlightEvent::Progress(raw_percent));
            }
        } else if raw_percent >= 100 {
            events.push(FlightEvent::Progress(100));
            events.push(FlightEvent::Arrived);
            self.terminated = true;
        } else {
            events.push(FlightEvent::Progress(raw_percent));
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaches_100_and_arrives_exactly_once() {
        let mut f = Flight::new(FlightSpec::new(100));
        let mut arrivals = 0;
        for _ in 0..3 {
            for ev in f.advance(50) {
                if ev == FlightEvent::Arrived {
                    arrivals += 1;
                }
            }
        }
        assert_eq!(arrivals, 1);
        assert!(f.is_terminated());
        assert_eq!(f.advance(50), Vec::new());
    }

    #[test]
    fn final_sample_before_arrival_is_100() {
        let mut f = Flight::new(FlightSpec::new(100));
        f.advance(50);
        let last = f.advance(50);
        assert_eq!(last, vec![FlightEvent::Progress(100), FlightEvent::Arrived]);
    }

    #[test]
    fn lost_flight_clamps_at_cutoff_and_terminates_once() {
        let mut f = Flight::new(FlightSpec::new(100).lost_at(50));
        let first = f.advance(40);
        assert_eq!(first, vec![FlightEvent::Progress(40)]);
        let second = f.advance(40); // would be 80, clamp to 50 and terminate
        assert_eq!(second, vec![FlightEvent::Progress(50), FlightEvent::Lost]);
        assert!(f.is_terminated());
        assert_eq!(f.advance(1000), Vec::new());
    }

    #[test]
    fn cancel_is_idempotent_and_silences_further_advances() {
        let mut f = Flight::new(FlightSpec::new(100));
        f.advance(10);
        f.cancel();
        f.cancel();
        assert_eq!(f.advance(1000), Vec::new());
    }

    #[test]
    fn zero_duration_flight_arrives_immediately() {
        let mut f = Flight::new(FlightSpec::new(0));
        let events = f.advance(0);
        assert_eq!(events, vec![FlightEvent::Progress(100), FlightEvent::Arrived]);
    }

    #[test]
    fn progress_never_exceeds_100_mid_flight() {
        let mut f = Flight::new(FlightSpec::new(100));
        for _ in 0..2 {
            for ev in f.advance(30) {
                if let FlightEvent::Progress(p) = ev {
                    assert!(p <= 100);
                }
            }
        }
    }
}
