//! Reverb - Room Simulation via Delay Networks
//!
//! A stereo Schroeder reverb: the dry mix is summed to mono, fed through
//! two banks of four parallel comb filters followed by two series
//! allpass filters, and the wet result is added back to each side. The
//! right bank uses slightly longer delays to decorrelate the channels.
//!
//! ```text
//! (L+R)/2 ──┬──→ [Comb x4] ──→ [Allpass x2] ──→ wet L ──→ (+) L
//!           └──→ [Comb x4] ──→ [Allpass x2] ──→ wet R ──→ (+) R
//! ```
//!
//! Presets set the room size (comb feedback), damping, wet level and a
//! delay scale. Delay lines are allocated once for the largest scale, so
//! switching presets never allocates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Comb delay times in ms at a delay scale of 1.0 (mutually prime ratios).
const COMB_DELAYS_MS: [f32; 4] = [29.7, 37.1, 41.1, 43.7];
/// Allpass delay times in ms.
const ALLPASS_DELAYS_MS: [f32; 2] = [5.0, 1.7];
/// Extra delay for the right bank, in ms.
const STEREO_SPREAD_MS: f32 = 0.52;
/// Largest delay scale any preset uses.
const MAX_DELAY_SCALE: f32 = 1.5;
const ALLPASS_FEEDBACK: f32 = 0.5;

/// Enumerated reverb presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReverbPreset {
    LargeHall,
    Hall,
    Chamber,
    Room,
    Plate,
}

impl ReverbPreset {
    pub const ALL: [ReverbPreset; 5] = [
        ReverbPreset::LargeHall,
        ReverbPreset::Hall,
        ReverbPreset::Chamber,
        ReverbPreset::Room,
        ReverbPreset::Plate,
    ];

    /// Name used in configuration files and on the command line.
    pub fn name(self) -> &'static str {
        match self {
            ReverbPreset::LargeHall => "large_hall",
            ReverbPreset::Hall => "hall",
            ReverbPreset::Chamber => "chamber",
            ReverbPreset::Room => "room",
            ReverbPreset::Plate => "plate",
        }
    }

    fn params(self) -> PresetParams {
        let (room_size, damping, wet, delay_scale) = match self {
            ReverbPreset::LargeHall => (0.92, 0.3, 0.35, 1.5),
            ReverbPreset::Hall => (0.85, 0.4, 0.3, 1.25),
            ReverbPreset::Chamber => (0.75, 0.45, 0.25, 1.0),
            ReverbPreset::Room => (0.6, 0.55, 0.2, 0.7),
            ReverbPreset::Plate => (0.8, 0.15, 0.3, 0.85),
        };
        PresetParams {
            room_size,
            damping,
            wet,
            delay_scale,
        }
    }
}

impl fmt::Display for ReverbPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ReverbPreset {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        ReverbPreset::ALL
            .into_iter()
            .find(|p| p.name() == normalized || p.name().replace('_', "") == normalized)
            .ok_or_else(|| EngineError::InvalidArgument(format!("unknown reverb preset '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PresetParams {
    room_size: f32,
    damping: f32,
    wet: f32,
    delay_scale: f32,
}

/// Engine-wide reverb parameters, applied by each stream at its next render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReverbSettings {
    pub preset: ReverbPreset,
    pub bypass: bool,
}

impl Default for ReverbSettings {
    fn default() -> Self {
        Self {
            preset: ReverbPreset::Chamber,
            bypass: true,
        }
    }
}

fn ms_to_samples(ms: f32, sample_rate: u32) -> usize {
    ((ms * sample_rate as f32 / 1000.0) as usize).max(1)
}

fn delay_line(capacity: usize) -> Result<Vec<f32>> {
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(capacity).map_err(|e| {
        EngineError::Resource(format!("cannot allocate reverb delay line: {}", e))
    })?;
    buffer.resize(capacity, 0.0);
    Ok(buffer)
}

/// Feedback comb filter with one-pole damping in the loop.
#[derive(Debug)]
pub struct CombFilter {
    buffer: Vec<f32>,
    delay_samples: usize,
    write_pos: usize,
    feedback: f32,
    damp: f32,
    filter_state: f32,
}

impl CombFilter {
    fn new(capacity: usize) -> Result<Self> {
        Ok(Self {
            buffer: delay_line(capacity)?,
            delay_samples: capacity,
            write_pos: 0,
            feedback: 0.5,
            damp: 0.5,
            filter_state: 0.0,
        })
    }

    fn set_feedback(&mut self, feedback: f32) {
        self.feedback = feedback.clamp(0.0, 0.99);
    }

    fn set_damp(&mut self, damp: f32) {
        self.damp = damp.clamp(0.0, 1.0);
    }

    fn set_delay(&mut self, delay_samples: usize) {
        self.delay_samples = delay_samples.clamp(1, self.buffer.len());
        self.write_pos %= self.delay_samples;
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.write_pos];
        self.filter_state = output * (1.0 - self.damp) + self.filter_state * self.damp;
        self.buffer[self.write_pos] = input + self.filter_state * self.feedback;
        self.write_pos = (self.write_pos + 1) % self.delay_samples;
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.filter_state = 0.0;
        self.write_pos = 0;
    }
}

/// Schroeder allpass diffuser.
#[derive(Debug)]
pub struct AllpassFilter {
    buffer: Vec<f32>,
    delay_samples: usize,
    write_pos: usize,
}

impl AllpassFilter {
    fn new(capacity: usize) -> Result<Self> {
        Ok(Self {
            buffer: delay_line(capacity)?,
            delay_samples: capacity,
            write_pos: 0,
        })
    }

    fn set_delay(&mut self, delay_samples: usize) {
        self.delay_samples = delay_samples.clamp(1, self.buffer.len());
        self.write_pos %= self.delay_samples;
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.write_pos];
        let output = -ALLPASS_FEEDBACK * input + delayed;
        self.buffer[self.write_pos] = input + ALLPASS_FEEDBACK * output;
        self.write_pos = (self.write_pos + 1) % self.delay_samples;
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

/// One mono Schroeder network: four parallel combs into two allpasses.
#[derive(Debug)]
pub struct SchroederReverb {
    combs: Vec<CombFilter>,
    allpasses: Vec<AllpassFilter>,
    spread_ms: f32,
    sample_rate: u32,
}

impl SchroederReverb {
    fn new(sample_rate: u32, spread_ms: f32) -> Result<Self> {
        let capacity = |ms: f32| ms_to_samples(ms * MAX_DELAY_SCALE + spread_ms, sample_rate) + 1;
        let combs = COMB_DELAYS_MS
            .iter()
            .map(|&ms| CombFilter::new(capacity(ms)))
            .collect::<Result<Vec<_>>>()?;
        let allpasses = ALLPASS_DELAYS_MS
            .iter()
            .map(|&ms| AllpassFilter::new(capacity(ms)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            combs,
            allpasses,
            spread_ms,
            sample_rate,
        })
    }

    fn apply(&mut self, params: &PresetParams) {
        let feedback = 0.7 + params.room_size.clamp(0.0, 1.0) * 0.28;
        for (comb, &ms) in self.combs.iter_mut().zip(COMB_DELAYS_MS.iter()) {
            comb.set_delay(ms_to_samples(
                ms * params.delay_scale + self.spread_ms,
                self.sample_rate,
            ));
            comb.set_feedback(feedback);
            comb.set_damp(params.damping);
        }
        for (allpass, &ms) in self.allpasses.iter_mut().zip(ALLPASS_DELAYS_MS.iter()) {
            allpass.set_delay(ms_to_samples(
                ms * params.delay_scale + self.spread_ms,
                self.sample_rate,
            ));
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let mut output = 0.0;
        for comb in &mut self.combs {
            output += comb.process(input);
        }
        output *= 0.25;
        for allpass in &mut self.allpasses {
            output = allpass.process(output);
        }
        output
    }

    fn reset(&mut self) {
        for comb in &mut self.combs {
            comb.reset();
        }
        for allpass in &mut self.allpasses {
            allpass.reset();
        }
    }
}

/// Per-stream stereo reverb.
#[derive(Debug)]
pub struct Reverb {
    left: SchroederReverb,
    right: SchroederReverb,
    settings: ReverbSettings,
    wet: f32,
}

impl Reverb {
    /// Allocates the delay lines for `sample_rate` and applies `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Resource`] if a delay line cannot be allocated.
    pub fn new(sample_rate: u32, settings: ReverbSettings) -> Result<Self> {
        let mut reverb = Self {
            left: SchroederReverb::new(sample_rate, 0.0)?,
            right: SchroederReverb::new(sample_rate, STEREO_SPREAD_MS)?,
            settings,
            wet: 0.0,
        };
        reverb.apply_preset(settings.preset);
        Ok(reverb)
    }

    pub fn settings(&self) -> ReverbSettings {
        self.settings
    }

    fn apply_preset(&mut self, preset: ReverbPreset) {
        let params = preset.params();
        self.left.apply(&params);
        self.right.apply(&params);
        self.wet = params.wet;
    }

    /// Brings the reverb in line with the engine-wide settings.
    ///
    /// Leaving bypass clears the delay lines so no stale tail plays.
    pub fn configure(&mut self, settings: ReverbSettings) {
        if settings == self.settings {
            return;
        }
        if settings.preset != self.settings.preset {
            self.apply_preset(settings.preset);
        }
        if self.settings.bypass && !settings.bypass {
            self.reset();
        }
        self.settings = settings;
    }

    /// Adds the wet signal to an interleaved stereo buffer in place.
    ///
    /// In bypass the buffer is left untouched.
    pub fn process(&mut self, mix: &mut [f32]) {
        if self.settings.bypass {
            return;
        }
        for frame in mix.chunks_exact_mut(2) {
            let input = (frame[0] + frame[1]) * 0.5;
            frame[0] += self.left.process(input) * self.wet;
            frame[1] += self.right.process(input) * self.wet;
        }
    }

    /// Clears every delay line.
    pub fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}
