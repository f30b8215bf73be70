//! Audio post-processing applied to the synthesizer mix.
//!
//! The only effect is a stereo Schroeder reverb with enumerated presets.
//! Reverb settings are engine-wide; each stream owns its own delay lines
//! and picks up setting changes at the start of its next render.

pub mod reverb;

pub use reverb::{Reverb, ReverbPreset, ReverbSettings};
