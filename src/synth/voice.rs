//! A single sounding note.

use super::envelope::{Envelope, EnvelopeStage};
use super::instrument::{Instrument, Pitch};
use super::wavetable::{Waveform, WavetableBank, TABLE_SIZE};

/// Key whose fundamental is 440 Hz.
const A4_KEY: f32 = 69.0;
const A4_HZ: f64 = 440.0;

/// Oscillator plus envelope for one note on one channel.
#[derive(Debug, Clone)]
pub struct Voice {
    pub channel: u8,
    pub key: u8,
    /// Allocation order; lower is older.
    pub serial: u64,
    waveform: Waveform,
    pitch: Pitch,
    phase: f64,
    increment: f64,
    envelope: Envelope,
    /// Velocity curve times instrument gain.
    gain: f32,
    /// Note off arrived while the sustain pedal was down.
    held_by_pedal: bool,
    /// Semitones added to tracking pitches.
    transposition: i8,
    sample_rate: u32,
}

impl Voice {
    /// Starts a note.
    ///
    /// The voice starts untransposed and without bend; call
    /// [`Voice::set_transposition`] and [`Voice::retune`] before rendering
    /// when the channel needs either.
    ///
    /// # Arguments
    ///
    /// * `instrument` - Recipe for the note
    /// * `key` - Key as played; note offs match against it
    pub fn start(
        instrument: &Instrument,
        channel: u8,
        key: u8,
        velocity: u8,
        serial: u64,
        sample_rate: u32,
    ) -> Self {
        let velocity = velocity as f32 / 127.0;
        let mut voice = Self {
            channel,
            key,
            serial,
            waveform: instrument.waveform,
            pitch: instrument.pitch,
            phase: 0.0,
            increment: 0.0,
            envelope: Envelope::new(instrument.envelope(sample_rate)),
            gain: velocity * velocity * instrument.gain,
            held_by_pedal: false,
            transposition: 0,
            sample_rate,
        };
        voice.retune(0.0);
        voice
    }

    pub fn transposition(&self) -> i8 {
        self.transposition
    }

    /// Sets the transposition applied on the next [`Voice::retune`].
    pub fn set_transposition(&mut self, semitones: i8) {
        self.transposition = semitones;
    }

    /// Recomputes the phase increment after a bend or tuning change.
    pub fn retune(&mut self, pitch_offset: f32) {
        let note = match self.pitch {
            Pitch::Tracking => self.key as f32 + self.transposition as f32 + pitch_offset,
            Pitch::FixedKey(key) => key as f32,
            Pitch::Unpitched(rate) => {
                self.increment = rate;
                return;
            }
        };
        let hz = A4_HZ * 2f64.powf(((note - A4_KEY) / 12.0) as f64);
        // Stay below Nyquist so the table is never skipped through
        let hz = hz.min(self.sample_rate as f64 / 2.0);
        self.increment = hz * TABLE_SIZE as f64 / self.sample_rate as f64;
    }

    /// Handles a note off, honoring the sustain pedal.
    pub fn note_off(&mut self, pedal_down: bool) {
        if pedal_down {
            self.held_by_pedal = true;
        } else {
            self.envelope.release();
        }
    }

    /// Releases the voice if the pedal was holding it.
    pub fn pedal_up(&mut self) {
        if self.held_by_pedal {
            self.held_by_pedal = false;
            self.envelope.release();
        }
    }

    /// Releases unconditionally.
    pub fn release(&mut self) {
        self.held_by_pedal = false;
        self.envelope.release();
    }

    /// Ramps to silence within `samples`, faster than a normal release.
    pub fn fade_out(&mut self, samples: u32) {
        self.held_by_pedal = false;
        self.envelope.release_over(samples);
    }

    pub fn is_releasing(&self) -> bool {
        matches!(
            self.envelope.stage(),
            EnvelopeStage::Release | EnvelopeStage::Finished
        )
    }

    /// Still waiting for its note off (pedal holds count as sounding).
    pub fn is_held(&self) -> bool {
        !self.is_releasing()
    }

    pub fn is_finished(&self) -> bool {
        self.envelope.is_finished()
    }

    pub fn level(&self) -> f32 {
        self.envelope.level()
    }

    /// Adds this voice into an interleaved stereo buffer.
    ///
    /// # Arguments
    ///
    /// * `bank` - Shared wavetables
    /// * `mix` - Interleaved L/R accumulation buffer
    /// * `left`, `right` - Channel gains for this block
    pub fn render(&mut self, bank: &WavetableBank, mix: &mut [f32], left: f32, right: f32) {
        let table = bank.table(self.waveform);
        let size = TABLE_SIZE as f64;
        let left = left * self.gain;
        let right = right * self.gain;

        for frame in mix.chunks_exact_mut(2) {
            if self.envelope.is_finished() {
                break;
            }
            let sample = table.sample(self.phase) * self.envelope.next();
            frame[0] += sample * left;
            frame[1] += sample * right;

            self.phase += self.increment;
            if self.phase >= size {
                self.phase -= size;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 22050;

    fn piano() -> Instrument {
        Instrument::for_program(0)
    }

    #[test]
    fn test_a4_increment() {
        let voice = Voice::start(&piano(), 0, 69, 127, 0, SR);
        let expected = 440.0 * TABLE_SIZE as f64 / SR as f64;
        assert!((voice.increment - expected).abs() < 1e-9);
    }

    #[test]
    fn test_octave_bend_doubles_increment() {
        let mut voice = Voice::start(&piano(), 0, 57, 127, 0, SR);
        let low = voice.increment;
        voice.retune(12.0);
        assert!((voice.increment / low - 2.0).abs() < 1e-6);

        // Transposition and bend add up
        voice.set_transposition(-12);
        voice.retune(12.0);
        assert!((voice.increment - low).abs() < 1e-9);
    }

    #[test]
    fn test_fixed_key_ignores_note() {
        let kick = Instrument::for_drum_key(36);
        let a = Voice::start(&kick, 9, 36, 100, 0, SR);
        let mut b = Voice::start(&kick, 9, 36, 100, 1, SR);
        b.set_transposition(3);
        b.retune(5.0);
        assert_eq!(a.increment, b.increment);
    }

    #[test]
    fn test_render_accumulates() {
        let bank = WavetableBank::new();
        let mut voice = Voice::start(&piano(), 0, 60, 127, 0, SR);
        let mut mix = vec![0.0f32; 512];
        voice.render(&bank, &mut mix, 1.0, 0.5);
        assert!(mix.iter().any(|s| s.abs() > 0.0));
        for frame in mix.chunks_exact(2) {
            assert!((frame[0] * 0.5 - frame[1]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_pedal_holds_until_up() {
        let mut voice = Voice::start(&piano(), 0, 60, 127, 0, SR);
        voice.note_off(true);
        assert!(voice.is_held());
        voice.pedal_up();
        assert!(voice.is_releasing());
    }

    #[test]
    fn test_fade_out_finishes() {
        let bank = WavetableBank::new();
        let mut voice = Voice::start(&piano(), 0, 60, 127, 0, SR);
        let mut mix = vec![0.0f32; 2 * 200];
        voice.render(&bank, &mut mix, 1.0, 1.0);
        voice.fade_out(64);
        let mut mix = vec![0.0f32; 2 * 64];
        voice.render(&bank, &mut mix, 1.0, 1.0);
        assert!(voice.is_finished());
    }
}
