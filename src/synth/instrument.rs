//! General MIDI program and drum-key mapping.
//!
//! Melodic programs are grouped by family (program / 8) and each family
//! gets one waveform, one envelope shape and one output gain. Percussion
//! keys on channel 10 map to a handful of drum voices.

use super::envelope::EnvelopeParams;
use super::wavetable::Waveform;

/// How a voice derives its playback frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pitch {
    /// Follows the note key (plus bend and tuning).
    Tracking,
    /// Always plays at this key, regardless of the note.
    FixedKey(u8),
    /// Reads the table at a fixed increment, in table samples per output sample.
    Unpitched(f64),
}

/// A synthesis recipe for one program or drum key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instrument {
    pub waveform: Waveform,
    pub pitch: Pitch,
    /// Attack, decay, sustain level and release in milliseconds.
    pub attack_ms: f32,
    pub decay_ms: f32,
    pub sustain_level: f32,
    pub release_ms: f32,
    /// Linear output gain.
    pub gain: f32,
}

impl Instrument {
    const fn melodic(
        waveform: Waveform,
        attack_ms: f32,
        decay_ms: f32,
        sustain_level: f32,
        release_ms: f32,
        gain: f32,
    ) -> Self {
        Self {
            waveform,
            pitch: Pitch::Tracking,
            attack_ms,
            decay_ms,
            sustain_level,
            release_ms,
            gain,
        }
    }

    const fn drum(waveform: Waveform, pitch: Pitch, decay_ms: f32, gain: f32) -> Self {
        Self {
            waveform,
            pitch,
            attack_ms: 1.0,
            decay_ms,
            sustain_level: 0.0,
            release_ms: 30.0,
            gain,
        }
    }

    /// Envelope timings at `sample_rate`.
    pub fn envelope(&self, sample_rate: u32) -> EnvelopeParams {
        EnvelopeParams::from_millis(
            self.attack_ms,
            self.decay_ms,
            self.sustain_level,
            self.release_ms,
            sample_rate,
        )
    }

    /// Instrument for a General MIDI program number (0-127).
    pub fn for_program(program: u8) -> Instrument {
        MELODIC_FAMILIES[(program as usize & 0x7F) / 8]
    }

    /// Instrument for a key on the percussion channel.
    pub fn for_drum_key(key: u8) -> Instrument {
        match key {
            // Bass drums
            35 | 36 => KICK,
            // Snares, claps and rimshot
            37..=40 => SNARE,
            // Hi-hats, closed and pedal
            42 | 44 => CLOSED_HAT,
            46 => OPEN_HAT,
            // Toms
            41 | 43 | 45 | 47 | 48 | 50 => TOM,
            // Crash, ride, splash and china
            49 | 51 | 52 | 53 | 55 | 57 | 59 => CYMBAL,
            _ => PERCUSSION,
        }
    }
}

/// Unpitched noise increment; roughly 1.5 table cycles per millisecond at 22 kHz.
const NOISE_RATE: f64 = 137.0;

const KICK: Instrument = Instrument::drum(Waveform::Sine, Pitch::FixedKey(28), 180.0, 1.0);
const SNARE: Instrument = Instrument::drum(Waveform::Noise, Pitch::Unpitched(NOISE_RATE), 160.0, 0.6);
const CLOSED_HAT: Instrument =
    Instrument::drum(Waveform::Noise, Pitch::Unpitched(NOISE_RATE * 1.5), 50.0, 0.3);
const OPEN_HAT: Instrument =
    Instrument::drum(Waveform::Noise, Pitch::Unpitched(NOISE_RATE * 1.5), 300.0, 0.3);
const TOM: Instrument = Instrument::drum(Waveform::Sine, Pitch::Tracking, 250.0, 0.8);
const CYMBAL: Instrument =
    Instrument::drum(Waveform::Noise, Pitch::Unpitched(NOISE_RATE * 1.2), 900.0, 0.25);
const PERCUSSION: Instrument = Instrument::drum(Waveform::Triangle, Pitch::Tracking, 120.0, 0.5);

/// One entry per GM family, indexed by program / 8.
const MELODIC_FAMILIES: [Instrument; 16] = [
    // Piano
    Instrument::melodic(Waveform::Triangle, 2.0, 900.0, 0.3, 250.0, 0.8),
    // Chromatic percussion
    Instrument::melodic(Waveform::Sine, 1.0, 500.0, 0.0, 200.0, 0.8),
    // Organ
    Instrument::melodic(Waveform::Organ, 8.0, 10.0, 1.0, 60.0, 0.5),
    // Guitar
    Instrument::melodic(Waveform::Saw, 2.0, 700.0, 0.2, 200.0, 0.5),
    // Bass
    Instrument::melodic(Waveform::Triangle, 3.0, 400.0, 0.6, 120.0, 0.9),
    // Strings
    Instrument::melodic(Waveform::Saw, 80.0, 200.0, 0.8, 300.0, 0.4),
    // Ensemble
    Instrument::melodic(Waveform::Saw, 120.0, 250.0, 0.8, 400.0, 0.4),
    // Brass
    Instrument::melodic(Waveform::Square, 30.0, 150.0, 0.7, 150.0, 0.35),
    // Reed
    Instrument::melodic(Waveform::Square, 20.0, 100.0, 0.8, 120.0, 0.35),
    // Pipe
    Instrument::melodic(Waveform::Sine, 40.0, 100.0, 0.9, 150.0, 0.7),
    // Synth lead
    Instrument::melodic(Waveform::Square, 5.0, 100.0, 0.8, 100.0, 0.35),
    // Synth pad
    Instrument::melodic(Waveform::Triangle, 300.0, 500.0, 0.8, 800.0, 0.6),
    // Synth effects
    Instrument::melodic(Waveform::Saw, 100.0, 800.0, 0.5, 600.0, 0.4),
    // Ethnic
    Instrument::melodic(Waveform::Saw, 2.0, 600.0, 0.3, 250.0, 0.5),
    // Percussive
    Instrument::melodic(Waveform::Triangle, 1.0, 300.0, 0.0, 150.0, 0.8),
    // Sound effects
    Instrument::melodic(Waveform::Noise, 50.0, 500.0, 0.4, 500.0, 0.2),
];
