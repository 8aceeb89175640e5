//! Virtual-time scheduling for the netsim engine.
//!
//! Two pieces live here:
//! - [`clock`] — [`Scheduler`], the discrete-event timer queue every layer
//!   of the engine schedules its timeouts against (ARP, DHCP leases, STP
//!   BPDU timers, auto-negotiation, propagation delay)
//! - [`flight`] — [`flight::Flight`], the packet-in-transit progress driver
//!   the animation kernels use to turn a duration into a sequence of
//!   progress samples plus exactly one terminal event
//!
//! Neither piece owns a thread or a real clock. A [`Scheduler`] is advanced
//! by calling [`Scheduler::advance`] with a simulated-millisecond delta and
//! reading back the callback ids that came due; the caller (never the
//! scheduler) decides what each id means. This keeps the scheduler generic
//! and keeps callback dispatch out of `dyn Fn` closures entirely — compare
//! to how a GUI toolkit is usually driven by *polling* an event queue rather
//! than by nesting callbacks inside callbacks.

pub mod clock;
pub mod flight;

pub use clock::{Scheduler, SpeedLevel};
pub use flight::{Flight, FlightEvent, FlightSpec};
