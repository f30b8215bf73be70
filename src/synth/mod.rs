//! Wavetable synthesizer.
//!
//! One [`Synthesizer`] exists per stream. It owns the channel controller
//! state and the voice pool and mixes every sounding voice into an
//! interleaved stereo `f32` buffer. The wavetable bank is shared between
//! all streams of an engine.

pub mod channel;
pub mod envelope;
pub mod instrument;
pub mod pool;
pub mod voice;
pub mod wavetable;

use std::sync::Arc;

use crate::error::Result;
use crate::midi::{ChannelEvent, NUM_CHANNELS, PERCUSSION_CHANNEL};
use channel::{ChannelAction, ChannelState};
use pool::VoicePool;
use voice::Voice;
pub use wavetable::{Waveform, WavetableBank};

/// Output scaling applied to every voice so a full chord stays below clipping.
pub const HEADROOM: f32 = 0.5;

/// Length of the fade applied by [`Synthesizer::fade_out`], in milliseconds.
pub const FADE_OUT_MS: u32 = 10;

/// Transposition limit in semitones, either direction.
pub const MAX_TRANSPOSITION: i8 = 12;

/// Per-stream synthesizer.
#[derive(Debug)]
pub struct Synthesizer {
    bank: Arc<WavetableBank>,
    channels: Vec<ChannelState>,
    pool: VoicePool,
    sample_rate: u32,
    transposition: i8,
}

impl Synthesizer {
    /// Creates a synthesizer with room for `max_voices` voices.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EngineError::Resource`] if the voice pool cannot be
    /// allocated.
    pub fn new(bank: Arc<WavetableBank>, sample_rate: u32, max_voices: usize) -> Result<Self> {
        Ok(Self {
            bank,
            channels: default_channels(),
            pool: VoicePool::new(max_voices)?,
            sample_rate,
            transposition: 0,
        })
    }

    /// Silences everything and restores power-on controller state.
    ///
    /// Polyphony and transposition are stream settings and survive.
    pub fn reset(&mut self) {
        self.pool.clear();
        self.channels = default_channels();
    }

    /// Number of voices currently sounding.
    pub fn active_voices(&self) -> usize {
        self.pool.len()
    }

    pub fn polyphony(&self) -> usize {
        self.pool.limit()
    }

    /// Sets the voice limit; clamped to `1..=max_voices`.
    pub fn set_polyphony(&mut self, voices: usize) {
        self.pool.set_limit(voices);
    }

    pub fn transposition(&self) -> i8 {
        self.transposition
    }

    /// Shifts melodic notes started from now on; percussion is not moved.
    pub fn set_transposition(&mut self, semitones: i8) {
        self.transposition = semitones.clamp(-MAX_TRANSPOSITION, MAX_TRANSPOSITION);
    }

    /// Controller state of `channel` (0-15).
    pub fn channel(&self, channel: u8) -> &ChannelState {
        &self.channels[channel as usize & 0x0F]
    }

    /// Applies one channel event.
    pub fn handle_event(&mut self, channel: u8, event: &ChannelEvent) {
        let channel = channel & 0x0F;
        match *event {
            ChannelEvent::NoteOn { key, velocity } => self.note_on(channel, key, velocity),
            ChannelEvent::NoteOff { key } => self.note_off(channel, key),
            ChannelEvent::ControlChange { controller, value } => {
                self.control_change(channel, controller, value)
            }
            ChannelEvent::ProgramChange { program } => {
                self.channels[channel as usize].program = program;
            }
            ChannelEvent::PitchBend { value } => {
                self.channels[channel as usize].pitch_bend = value;
                self.retune(channel);
            }
        }
    }

    /// Rebuilds controller state from an event skipped by a locate.
    ///
    /// Note events are ignored; everything else updates the channel without
    /// touching the (already cleared) voices.
    pub fn chase(&mut self, channel: u8, event: &ChannelEvent) {
        let state = &mut self.channels[channel as usize & 0x0F];
        match *event {
            ChannelEvent::NoteOn { .. } | ChannelEvent::NoteOff { .. } => {}
            ChannelEvent::ControlChange { controller, value } => {
                state.control_change(controller, value);
            }
            ChannelEvent::ProgramChange { program } => state.program = program,
            ChannelEvent::PitchBend { value } => state.pitch_bend = value,
        }
    }

    fn note_on(&mut self, channel: u8, key: u8, velocity: u8) {
        let key = key & 0x7F;
        // Retriggering a key releases the previous voice first
        for voice in self
            .pool
            .iter_mut()
            .filter(|v| v.channel == channel && v.key == key && v.is_held())
        {
            voice.release();
        }

        let state = &self.channels[channel as usize];
        let instrument = state.instrument(key);
        let transposition = if state.is_percussion() {
            0
        } else {
            self.transposition
        };
        let pitch_offset = state.pitch_offset();
        let serial = self.pool.next_serial();
        let mut voice = Voice::start(
            &instrument,
            channel,
            key,
            velocity,
            serial,
            self.sample_rate,
        );
        voice.set_transposition(transposition);
        voice.retune(pitch_offset);
        self.pool.add(voice);
    }

    fn note_off(&mut self, channel: u8, key: u8) {
        let pedal = self.channels[channel as usize].sustain;
        for voice in self
            .pool
            .iter_mut()
            .filter(|v| v.channel == channel && v.key == key && v.is_held())
        {
            voice.note_off(pedal);
        }
    }

    fn control_change(&mut self, channel: u8, controller: u8, value: u8) {
        let action = self.channels[channel as usize].control_change(controller, value);
        match action {
            ChannelAction::None => {}
            ChannelAction::ReleaseSustained => {
                for voice in self.pool.iter_mut().filter(|v| v.channel == channel) {
                    voice.pedal_up();
                }
            }
            ChannelAction::AllNotesOff => {
                for voice in self.pool.iter_mut().filter(|v| v.channel == channel) {
                    voice.release();
                }
            }
            ChannelAction::AllSoundOff => self.pool.cut_channel(channel),
        }
        // Bend range and tuning changes retune sounding notes
        self.retune(channel);
    }

    fn retune(&mut self, channel: u8) {
        let offset = self.channels[channel as usize].pitch_offset();
        for voice in self.pool.iter_mut().filter(|v| v.channel == channel) {
            voice.retune(offset);
        }
    }

    /// Releases every voice over a short fade.
    pub fn fade_out(&mut self) {
        let samples = self.sample_rate * FADE_OUT_MS / 1000;
        for voice in self.pool.iter_mut() {
            voice.fade_out(samples);
        }
    }

    /// Mixes all voices into `mix`, an interleaved stereo buffer.
    ///
    /// The buffer is overwritten, not accumulated into.
    pub fn render(&mut self, mix: &mut [f32]) {
        mix.fill(0.0);
        let channels = &self.channels;
        let bank = &self.bank;
        for voice in self.pool.iter_mut() {
            let (left, right) = channels[voice.channel as usize].gains();
            voice.render(bank, mix, left * HEADROOM, right * HEADROOM);
        }
        self.pool.remove_finished();
    }
}

fn default_channels() -> Vec<ChannelState> {
    (0..NUM_CHANNELS as u8)
        .map(|ch| ChannelState::new(ch == PERCUSSION_CHANNEL))
        .collect()
}
