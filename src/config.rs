//! Engine configuration.
//!
//! An [`EngineConfig`] is handed to [`crate::Engine::new`] and stays
//! read-only for the lifetime of the engine. Configurations can be written
//! as JSON; any field left out falls back to its default.

use crate::audio::reverb::ReverbPreset;
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default output sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 22050;

/// Default number of interleaved output channels.
pub const DEFAULT_CHANNELS: u16 = 2;

/// Default number of frames the synthesizer mixes per block.
pub const DEFAULT_MIX_BUFFER_SIZE: usize = 128;

/// Default polyphony per stream.
pub const DEFAULT_MAX_VOICES: usize = 32;

/// Default upper bound on the size of a MIDI payload (16 MiB).
pub const DEFAULT_MAX_SOURCE_BYTES: u64 = 16 * 1024 * 1024;

/// Synthesizer configuration shared by every stream of an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output sample rate in Hz.
    pub sample_rate: u32,

    /// Interleaved output channels (1 = mono, 2 = stereo).
    pub channels: u16,

    /// Frames mixed per internal block. Also the natural render size.
    pub mix_buffer_size: usize,

    /// Maximum simultaneous voices per stream.
    pub max_voices: usize,

    /// Payloads larger than this are rejected during prepare.
    pub max_source_bytes: u64,

    /// Reverb preset selected at engine start.
    pub reverb_preset: ReverbPreset,

    /// Whether the reverb starts bypassed.
    pub reverb_bypass: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            mix_buffer_size: DEFAULT_MIX_BUFFER_SIZE,
            max_voices: DEFAULT_MAX_VOICES,
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
            reverb_preset: ReverbPreset::Chamber,
            reverb_bypass: true,
        }
    }
}

impl EngineConfig {
    /// Checks that every field is within the range the engine supports.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidArgument`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if !(8_000..=96_000).contains(&self.sample_rate) {
            return Err(EngineError::InvalidArgument(format!(
                "sample_rate {} outside 8000..=96000",
                self.sample_rate
            )));
        }
        if !(1..=2).contains(&self.channels) {
            return Err(EngineError::InvalidArgument(format!(
                "channels must be 1 or 2, got {}",
                self.channels
            )));
        }
        if self.mix_buffer_size == 0 {
            return Err(EngineError::InvalidArgument(
                "mix_buffer_size must be non-zero".to_string(),
            ));
        }
        if self.max_voices == 0 {
            return Err(EngineError::InvalidArgument(
                "max_voices must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Parses a configuration from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidArgument`] if the JSON is malformed
    /// or describes an invalid configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| EngineError::InvalidArgument(format!("config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the JSON file
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Io`] if the file cannot be read, or
    /// [`EngineError::InvalidArgument`] if its contents are invalid.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Serializes the configuration as pretty-printed JSON.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Size in bytes of one interleaved output frame.
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * std::mem::size_of::<i16>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sample_rate, 22050);
        assert_eq!(config.channels, 2);
        assert_eq!(config.mix_buffer_size, 128);
        assert_eq!(config.bytes_per_frame(), 4);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json(r#"{ "sample_rate": 44100 }"#).unwrap();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.channels, DEFAULT_CHANNELS);
        assert_eq!(config.reverb_preset, ReverbPreset::Chamber);
        assert!(config.reverb_bypass);
    }

    #[test]
    fn test_preset_names_in_json() {
        let config =
            EngineConfig::from_json(r#"{ "reverb_preset": "large_hall", "reverb_bypass": false }"#)
                .unwrap();
        assert_eq!(config.reverb_preset, ReverbPreset::LargeHall);
        assert!(!config.reverb_bypass);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(EngineConfig::from_json(r#"{ "channels": 6 }"#).is_err());
        assert!(EngineConfig::from_json(r#"{ "sample_rate": 100 }"#).is_err());
        assert!(EngineConfig::from_json(r#"{ "mix_buffer_size": 0 }"#).is_err());
        assert!(EngineConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let config = EngineConfig {
            channels: 1,
            ..Default::default()
        };
        let json = config.to_json().unwrap();
        assert_eq!(EngineConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{ "max_voices": 8 }"#).unwrap();
        let config = EngineConfig::load_from_file(&path).unwrap();
        assert_eq!(config.max_voices, 8);

        let missing = EngineConfig::load_from_file(dir.path().join("missing.json"));
        assert!(matches!(missing, Err(EngineError::Io(_))));
    }
}
