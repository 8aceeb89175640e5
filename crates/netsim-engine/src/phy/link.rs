//! Cabling: length, propagation delay, and serialization delay.

use serde::Serialize;

/// Speed of light in fiber, in meters per second (≈2·10^5 km/s).
const C_FIBER_M_PER_S: f64 = 2.0e8;

pub type LinkId = usize;

/// Negotiated (or configured) link speed, in bits per second. `Auto` means
/// "not yet negotiated" and carries no transmission capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Speed {
    Auto,
    Mbps10,
    Mbps100,
    Gbps1,
}

impl Speed {
    pub fn bps(self) -> u64 {
        match self {
            Speed::Auto => 0,
            Speed::Mbps10 => 10_000_000,
            Speed::Mbps100 => 100_000_000,
            Speed::Gbps1 => 1_000_000_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Duplex {
    Half,
    Full,
}

/// A cable connecting exactly two interfaces. `Link` itself holds no
/// reference to its endpoints — the owning topology tracks which two
/// `(NodeId, port)` pairs a given `LinkId` connects (see the design note
/// on modeling cyclic graphs with an arena rather than owning references).
#[derive(Debug, Clone, Copy)]
pub struct Link {
    pub length_meters: f64,
}

impl Link {
    pub fn new(length_meters: f64) -> Self {
        Link { length_meters }
    }

    pub fn propagation_delay_ms(&self) -> f64 {
        (self.length_meters / C_FIBER_M_PER_S) * 1000.0
    }

    /// Time to push `bits` onto the wire at `speed`, in milliseconds.
    /// Zero if `speed` is `Auto` (not yet negotiated — nothing can be sent).
    pub fn serialization_delay_ms(bits: u64, speed: Speed) -> f64 {
        let bps = speed.bps();
        if bps == 0 {
            return 0.0;
        }
        (bits as f64 / bps as f64) * 1000.0
    }

    /// Serialization plus propagation: additive, independent, per §4.3.
    pub fn total_delay_ms(&self, bits: u64, speed: Speed) -> f64 {
        Self::serialization_delay_ms(bits, speed) + self.propagation_delay_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn propagation_delay_scales_with_length() {
        let short = Link::new(2.0e5); // 200 km
        let long = Link::new(2.0e6); // 2000 km
        assert!((short.propagation_delay_ms() - 1.0).abs() < 1e-9);
        assert!((long.propagation_delay_ms() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn serialization_delay_is_bits_over_bps() {
        let ms = Link::serialization_delay_ms(1_000_000, Speed::Mbps10);
        assert!((ms - 100.0).abs() < 1e-9);
    }

    #[test]
    fn auto_speed_has_no_serialization_capacity() {
        assert_eq!(Link::serialization_delay_ms(1000, Speed::Auto), 0.0);
    }

    #[test]
    fn total_delay_is_additive() {
        let link = Link::new(2.0e5); // 1ms propagation
        let total = link.total_delay_ms(1_000_000, Speed::Mbps10); // 100ms serialization
        assert!((total - 101.0).abs() < 1e-9);
    }
}
