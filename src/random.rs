use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of uniform draws used by sequence generation.
pub trait RandomSource: Send {
    /// Uniform integer in `[0, bound)`. `bound` is always at least 1.
    fn next_below(&mut self, bound: u32) -> u32;
    /// Uniform float in `[0, 1)`.
    fn next_unit(&mut self) -> f64;
}

/// Production source backed by `StdRng`.
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for SeededRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for SeededRandom {
    fn next_below(&mut self, bound: u32) -> u32 {
        self.rng.gen_range(0..bound.max(1))
    }

    fn next_unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

/// Replays fixed draws, cycling when exhausted. Used to script sessions.
#[derive(Debug, Clone)]
pub struct ScriptedRandom {
    values: Vec<u32>,
    units: Vec<f64>,
    value_pos: usize,
    unit_pos: usize,
}

impl ScriptedRandom {
    pub fn new(values: Vec<u32>, units: Vec<f64>) -> Self {
        Self {
            values,
            units,
            value_pos: 0,
            unit_pos: 0,
        }
    }

    /// Integer draws only; every probability roll comes back as 0.0 (always plants a match).
    pub fn with_values(values: Vec<u32>) -> Self {
        Self::new(values, vec![0.0])
    }
}

impl RandomSource for ScriptedRandom {
    fn next_below(&mut self, bound: u32) -> u32 {
        if self.values.is_empty() {
            return 0;
        }
        let v = self.values[self.value_pos % self.values.len()];
        self.value_pos += 1;
        v % bound.max(1)
    }

    fn next_unit(&mut self) -> f64 {
        if self.units.is_empty() {
            return 0.0;
        }
        let u = self.units[self.unit_pos % self.units.len()];
        self.unit_pos += 1;
        u
    }
}
