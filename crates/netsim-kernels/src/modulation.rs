//! Bit/baud QAM constellation demo: maps a constellation choice to a
//! symbol rate and renders noisy transmitted symbols (§4.8).

use netsim_common::observe::Subject;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Constellation {
    None,
    Qam4,
    Qam16,
    Qam64,
    Qam256,
}

impl Constellation {
    /// Bits carried per symbol: the base-2 log of the constellation's
    /// point count.
    pub fn bits_per_symbol(self) -> u32 {
        match self {
            Constellation::None => 1,
            Constellation::Qam4 => 2,
            Constellation::Qam16 => 4,
            Constellation::Qam64 => 6,
            Constellation::Qam256 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Symbol {
    pub ideal_x: f64,
    pub ideal_y: f64,
    pub noisy_x: f64,
    pub noisy_y: f64,
    pub has_error: bool,
    pub decoded_bits: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModulationState {
    pub constellation: Constellation,
    pub bit_rate: f64,
    pub noise_level: u8,
    pub baud_rate: f64,
    pub transmission_time_ms: f64,
    pub symbols: Vec<Symbol>,
    pub error_count: u64,
    pub total_count: u64,
}

impl ModulationState {
    pub fn create_initial(constellation: Constellation, bit_rate: f64, noise_level: u8) -> Self {
        let bits_per_symbol = constellation.bits_per_symbol();
        let baud_rate = bit_rate / bits_per_symbol as f64;
        let transmission_time_ms = (16.0 / bits_per_symbol as f64).ceil() / baud_rate * 1000.0;
        ModulationState {
            constellation,
            bit_rate,
            noise_level,
            baud_rate,
            transmission_time_ms,
            symbols: Vec::new(),
            error_count: 0,
            total_count: 0,
        }
    }
}

/// Regular square constellation with `2^bitsPerSymbol` points laid on
/// a grid scaled to `[-1, 1]`, Gray-ish bit labels assigned by raster
/// order (good enough for a teaching visualization, not a real mapper).
/// `none` has only 2 points and falls back to a line on the x-axis.
fn constellation_points(constellation: Constellation) -> Vec<(f64, f64, u32)> {
    if constellation == Constellation::None {
        return vec![(-1.0, 0.0, 0), (1.0, 0.0, 1)];
    }

    let total_points = 1u32 << constellation.bits_per_symbol();
    let side = (total_points as f64).sqrt().round() as u32;
    let mut points = Vec::with_capacity((side * side) as usize);
    let mut label = 0u32;
    for row in 0..side {
        for col in 0..side {
            let x = 2.0 * col as f64 / (side - 1) as f64 - 1.0;
            let y = 2.0 * row as f64 / (side - 1) as f64 - 1.0;
            points.push((x, y, label));
            label += 1;
        }
    }
    points
}

/// Box-Muller transform producing one standard-normal sample from two
/// uniform draws.
fn gaussian_sample(rng: &mut StdRng) -> f64 {
    use rand::Rng;
    let u1: f64 = rng.random_range(f64::EPSILON..1.0);
    let u2: f64 = rng.random_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

pub struct Modulation {
    subject: Subject<ModulationState>,
    rng: StdRng,
    points: Vec<(f64, f64, u32)>,
}

impl Modulation {
    pub fn new(constellation: Constellation, bit_rate: f64, noise_level: u8, seed: u64) -> Self {
        Modulation {
            subject: Subject::new(ModulationState::create_initial(constellation, bit_rate, noise_level)),
            rng: StdRng::seed_from_u64(seed),
            points: constellation_points(constellation),
        }
    }

    pub fn set_listener(&mut self, listener: impl FnMut(&ModulationState) + Send + 'static) {
        self.subject.set_listener(listener);
    }

    pub fn get_state(&self) -> ModulationState {
        self.subject.get_state()
    }

    pub fn reset(&mut self) {
        self.subject.mutate(|s| {
            let (constellation, bit_rate, noise_level) = (s.constellation, s.bit_rate, s.noise_level);
            *s = ModulationState::create_initial(constellation, bit_rate, noise_level);
        });
    }

    pub fn dispose(&mut self) {
        self.subject.clear_listener();
    }

    /// Transmits one symbol, drawing a random ideal point and adding
    /// Gaussian noise scaled by `noiseLevel/100`.
    pub fn transmit_symbol(&mut self) -> Symbol {
        use rand::Rng;
        let (ideal_x, ideal_y, transmitted_label) = self.points[self.rng.random_range(0..self.points.len())];
        let stddev = self.subject.state().noise_level as f64 / 100.0;
        let noisy_x = ideal_x + gaussian_sample(&mut self.rng) * stddev;
        let noisy_y = ideal_y + gaussian_sample(&mut self.rng) * stddev;

        let (decoded_label, _) = self
            .points
            .iter()
            .map(|&(px, py, label)| {
                let dist = (px - noisy_x).powi(2) + (py - noisy_y).powi(2);
                (label, dist)
            })
            .fold((transmitted_label, f64::MAX), |acc, cur| if cur.1 < acc.1 { cur } else { acc });

        let has_error = decoded_label != transmitted_label;
        let symbol = Symbol {
            ideal_x,
            ideal_y,
            noisy_x,
            noisy_y,
            has_error,
            decoded_bits: decoded_label,
        };

        self.subject.mutate(|s| {
            s.symbols.push(symbol);
            s.total_count += 1;
            if has_error {
                s.error_count += 1;
            }
        });

        symbol
    }
}
