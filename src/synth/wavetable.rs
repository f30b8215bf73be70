//! Built-in single-cycle wavetables.
//!
//! The bank is generated once per engine and shared read-only by every
//! stream. Band-limited shapes are built by additive synthesis and each
//! table is normalized to a peak of 1.0. Tables carry one guard sample
//! so interpolation never needs to wrap.

/// Samples per single-cycle table (excluding the guard sample).
pub const TABLE_SIZE: usize = 2048;

/// Partials used for the band-limited saw and square shapes.
const HARMONICS: usize = 32;

/// Seed for the noise table; fixed so output is reproducible.
const NOISE_SEED: u32 = 0x1234_5678;

/// Shapes available in the bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Waveform {
    Sine,
    Triangle,
    Saw,
    Square,
    Organ,
    Noise,
}

impl Waveform {
    /// Every waveform, in bank order.
    pub const ALL: [Waveform; 6] = [
        Waveform::Sine,
        Waveform::Triangle,
        Waveform::Saw,
        Waveform::Square,
        Waveform::Organ,
        Waveform::Noise,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// One single-cycle table.
#[derive(Debug, Clone)]
pub struct Wavetable {
    samples: Vec<f32>,
}

impl Wavetable {
    /// Builds a table by evaluating `f` at each phase in `[0, 2π)`,
    /// then normalizes it to a peak of 1.0.
    fn from_fn(f: impl Fn(f64) -> f64) -> Self {
        let mut samples: Vec<f32> = (0..TABLE_SIZE)
            .map(|i| f(i as f64 * std::f64::consts::TAU / TABLE_SIZE as f64) as f32)
            .collect();
        normalize(&mut samples);
        samples.push(samples[0]);
        Self { samples }
    }

    fn noise() -> Self {
        let mut state = NOISE_SEED;
        let mut samples: Vec<f32> = (0..TABLE_SIZE)
            .map(|_| {
                // Numerical Recipes LCG
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 8) as f32 / (1u32 << 23) as f32 - 1.0
            })
            .collect();
        normalize(&mut samples);
        samples.push(samples[0]);
        Self { samples }
    }

    /// Reads the table at a fractional index with linear interpolation.
    ///
    /// # Arguments
    ///
    /// * `phase` - Position in samples, in `[0, TABLE_SIZE)`
    #[inline]
    pub fn sample(&self, phase: f64) -> f32 {
        let index = phase as usize;
        let frac = (phase - index as f64) as f32;
        let a = self.samples[index];
        let b = self.samples[index + 1];
        a + (b - a) * frac
    }

    /// The table contents without the guard sample.
    pub fn samples(&self) -> &[f32] {
        &self.samples[..TABLE_SIZE]
    }
}

fn normalize(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak > 0.0 {
        for s in samples.iter_mut() {
            *s /= peak;
        }
    }
}

/// The set of tables every voice reads from.
#[derive(Debug, Clone)]
pub struct WavetableBank {
    tables: Vec<Wavetable>,
}

impl WavetableBank {
    /// Generates all built-in tables.
    pub fn new() -> Self {
        let tables = Waveform::ALL
            .iter()
            .map(|&waveform| match waveform {
                Waveform::Sine => Wavetable::from_fn(f64::sin),
                Waveform::Triangle => Wavetable::from_fn(|x| {
                    // Same phase as the sine: 0 -> 1 -> -1 -> 0
                    let t = x / std::f64::consts::TAU;
                    if t < 0.25 {
                        4.0 * t
                    } else if t < 0.75 {
                        2.0 - 4.0 * t
                    } else {
                        4.0 * t - 4.0
                    }
                }),
                Waveform::Saw => Wavetable::from_fn(|x| {
                    (1..=HARMONICS)
                        .map(|k| {
                            let sign = if k % 2 == 1 { 1.0 } else { -1.0 };
                            sign * (k as f64 * x).sin() / k as f64
                        })
                        .sum()
                }),
                Waveform::Square => Wavetable::from_fn(|x| {
                    (1..=HARMONICS)
                        .step_by(2)
                        .map(|k| (k as f64 * x).sin() / k as f64)
                        .sum()
                }),
                Waveform::Organ => Wavetable::from_fn(|x| {
                    const DRAWBARS: [(f64, f64); 6] =
                        [(1.0, 1.0), (2.0, 0.6), (3.0, 0.4), (4.0, 0.3), (6.0, 0.2), (8.0, 0.15)];
                    DRAWBARS
                        .iter()
                        .map(|&(partial, amp)| amp * (partial * x).sin())
                        .sum()
                }),
                Waveform::Noise => Wavetable::noise(),
            })
            .collect();
        Self { tables }
    }

    /// Returns the table for `waveform`.
    pub fn table(&self, waveform: Waveform) -> &Wavetable {
        &self.tables[waveform.index()]
    }
}

impl Default for WavetableBank {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_are_normalized() {
        let bank = WavetableBank::new();
        for waveform in Waveform::ALL {
            let table = bank.table(waveform);
            assert_eq!(table.samples().len(), TABLE_SIZE);
            let peak = table.samples().iter().fold(0.0f32, |m, s| m.max(s.abs()));
            assert!((peak - 1.0).abs() < 1e-4, "{:?} peak {}", waveform, peak);
        }
    }

    #[test]
    fn test_sine_shape() {
        let bank = WavetableBank::new();
        let sine = bank.table(Waveform::Sine);
        assert!(sine.sample(0.0).abs() < 1e-6);
        assert!((sine.sample(TABLE_SIZE as f64 / 4.0) - 1.0).abs() < 1e-4);
        assert!((sine.sample(3.0 * TABLE_SIZE as f64 / 4.0) + 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_interpolation_at_guard() {
        let bank = WavetableBank::new();
        let saw = bank.table(Waveform::Saw);
        // Just below the wrap point interpolates toward sample 0
        let value = saw.sample(TABLE_SIZE as f64 - 0.5);
        let expected = (saw.samples()[TABLE_SIZE - 1] + saw.samples()[0]) / 2.0;
        assert!((value - expected).abs() < 1e-6);
    }

    #[test]
    fn test_noise_is_deterministic() {
        let a = WavetableBank::new();
        let b = WavetableBank::new();
        assert_eq!(
            a.table(Waveform::Noise).samples(),
            b.table(Waveform::Noise).samples()
        );
    }
}
