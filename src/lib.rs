//! midiwave - A streaming MIDI sequencer and wavetable synthesizer.
//!
//! This library renders Standard MIDI Files (bare or wrapped in RMID) to
//! interleaved 16-bit PCM through a handle-based transport API: open,
//! prepare, parse metadata, then locate, render, pause and resume.
//!
//! Rendering is pull-based and deterministic. The caller owns the output
//! buffer and decides when to ask for more audio.

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod midi;
pub mod source;
pub mod synth;

// Re-export commonly used types
pub use audio::ReverbPreset;
pub use config::EngineConfig;
pub use engine::{Engine, PlaybackState, StreamHandle, PAUSE_SETTLE_LATENCY};
pub use error::{EngineError, Result};
pub use source::{ByteSource, FileSource, MemorySource};
