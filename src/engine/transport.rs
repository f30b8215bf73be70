//! Playback state and the sample-exact position clock.

use std::time::Duration;

/// Time between a successful `pause` and the stream reaching Paused.
///
/// Pausing is synchronous, so the state has already changed when the call
/// returns. Sounding voices still ramp out over the next rendered frames.
pub const PAUSE_SETTLE_LATENCY: Duration = Duration::ZERO;

/// Transport state of one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Not playing. Initial state, and the state after reaching the end.
    Stopped,
    /// Rendering advances the position and dispatches events.
    Playing,
    /// Position frozen; renders produce the fade-out tail, then silence.
    Paused,
    /// An internal failure occurred; only close remains valid.
    Error,
}

/// Position kept as an anchor plus frames rendered since the anchor.
///
/// Converting frames back to time happens from the anchor each time, so
/// rounding never accumulates across render calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    sample_rate: u32,
    anchor_micros: u64,
    frames: u64,
}

impl Clock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            anchor_micros: 0,
            frames: 0,
        }
    }

    /// Moves the clock to `micros` and restarts the frame count.
    pub fn set(&mut self, micros: u64) {
        self.anchor_micros = micros;
        self.frames = 0;
    }

    /// Advances by `frames` rendered frames.
    pub fn advance(&mut self, frames: u64) {
        self.frames += frames;
    }

    /// Current position in microseconds, rounded down.
    pub fn micros(&self) -> u64 {
        let elapsed = self.frames as u128 * 1_000_000 / self.sample_rate as u128;
        self.anchor_micros + elapsed as u64
    }

    /// Frames still to render before the clock reaches `micros`.
    ///
    /// Zero once the position is at or past `micros`.
    pub fn frames_until(&self, micros: u64) -> u64 {
        if micros <= self.anchor_micros {
            return 0;
        }
        let delta = (micros - self.anchor_micros) as u128;
        let target = (delta * self.sample_rate as u128).div_ceil(1_000_000);
        (target as u64).saturating_sub(self.frames)
    }
}
