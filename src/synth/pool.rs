//! Fixed-capacity voice storage with deterministic stealing.
//!
//! When the pool is full a new note takes the place of:
//! 1. the releasing voice with the lowest envelope level, ties going to
//!    the oldest (lowest serial), or else
//! 2. the oldest voice.
//!
//! The pool never grows past the capacity reserved at construction.

use super::voice::Voice;
use crate::error::{EngineError, Result};

#[derive(Debug)]
pub struct VoicePool {
    voices: Vec<Voice>,
    capacity: usize,
    limit: usize,
    next_serial: u64,
}

impl VoicePool {
    /// Reserves room for `capacity` voices.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Resource`] if the allocation fails.
    pub fn new(capacity: usize) -> Result<Self> {
        let mut voices = Vec::new();
        voices.try_reserve_exact(capacity).map_err(|e| {
            EngineError::Resource(format!("cannot allocate {} voices: {}", capacity, e))
        })?;
        Ok(Self {
            voices,
            capacity,
            limit: capacity,
            next_serial: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current polyphony limit.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Lowers (or restores) the polyphony limit, stealing voices over it.
    ///
    /// The limit is clamped to `1..=capacity`.
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit.clamp(1, self.capacity);
        while self.voices.len() > self.limit {
            self.steal();
        }
    }

    /// Serial for the next voice to be added.
    pub fn next_serial(&mut self) -> u64 {
        let serial = self.next_serial;
        self.next_serial += 1;
        serial
    }

    /// Adds a voice, stealing one first if the pool is full.
    ///
    /// Returns the stolen voice, if any.
    pub fn add(&mut self, voice: Voice) -> Option<Voice> {
        let stolen = if self.voices.len() >= self.limit {
            self.steal()
        } else {
            None
        };
        self.voices.push(voice);
        stolen
    }

    /// Index of the voice the stealing rule picks.
    fn steal_index(&self) -> Option<usize> {
        let releasing = self
            .voices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_releasing())
            .min_by(|(_, a), (_, b)| {
                a.level()
                    .total_cmp(&b.level())
                    .then(a.serial.cmp(&b.serial))
            })
            .map(|(i, _)| i);

        releasing.or_else(|| {
            self.voices
                .iter()
                .enumerate()
                .min_by_key(|(_, v)| v.serial)
                .map(|(i, _)| i)
        })
    }

    fn steal(&mut self) -> Option<Voice> {
        let index = self.steal_index()?;
        let voice = self.voices.swap_remove(index);
        tracing::trace!(
            "Stealing voice {} (channel {}, key {}, level {:.3})",
            voice.serial,
            voice.channel,
            voice.key,
            voice.level()
        );
        Some(voice)
    }

    /// Drops voices whose envelopes have finished.
    pub fn remove_finished(&mut self) {
        self.voices.retain(|v| !v.is_finished());
    }

    /// Removes every voice.
    pub fn clear(&mut self) {
        self.voices.clear();
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Voice> {
        self.voices.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Voice> {
        self.voices.iter_mut()
    }

    /// Removes every voice on `channel` immediately.
    pub fn cut_channel(&mut self, channel: u8) {
        self.voices.retain(|v| v.channel != channel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::instrument::Instrument;
    use crate::synth::wavetable::WavetableBank;

    const SR: u32 = 22050;

    fn start(pool: &mut VoicePool, key: u8) -> Option<Voice> {
        let serial = pool.next_serial();
        let voice = Voice::start(&Instrument::for_program(0), 0, key, 100, serial, SR);
        pool.add(voice)
    }

    fn keys(pool: &VoicePool) -> Vec<u8> {
        let mut keys: Vec<u8> = pool.iter().map(|v| v.key).collect();
        keys.sort();
        keys
    }

    #[test]
    fn test_steals_oldest_when_none_releasing() {
        let mut pool = VoicePool::new(3).unwrap();
        for key in [60, 62, 64] {
            assert!(start(&mut pool, key).is_none());
        }
        let stolen = start(&mut pool, 65).unwrap();
        assert_eq!(stolen.key, 60);
        assert_eq!(keys(&pool), vec![62, 64, 65]);
    }

    #[test]
    fn test_prefers_quietest_releasing_voice() {
        let bank = WavetableBank::new();
        let mut pool = VoicePool::new(3).unwrap();
        for key in [60, 62, 64] {
            start(&mut pool, key);
        }
        let mut mix = vec![0.0f32; 2 * 400];
        for voice in pool.iter_mut() {
            voice.render(&bank, &mut mix, 1.0, 1.0);
        }
        // 64 released first, then 62: 64 has decayed further
        for voice in pool.iter_mut().filter(|v| v.key == 64) {
            voice.release();
        }
        for voice in pool.iter_mut() {
            voice.render(&bank, &mut mix, 1.0, 1.0);
        }
        for voice in pool.iter_mut().filter(|v| v.key == 62) {
            voice.release();
        }

        let stolen = start(&mut pool, 67).unwrap();
        assert_eq!(stolen.key, 64);
        assert_eq!(keys(&pool), vec![60, 62, 67]);
    }

    #[test]
    fn test_equal_levels_steal_oldest() {
        let mut pool = VoicePool::new(2).unwrap();
        start(&mut pool, 60);
        start(&mut pool, 62);
        // Neither has rendered, both release from level 0
        for voice in pool.iter_mut() {
            voice.release();
        }
        let stolen = start(&mut pool, 64).unwrap();
        assert_eq!(stolen.key, 60);
    }

    #[test]
    fn test_set_limit_steals_excess() {
        let mut pool = VoicePool::new(4).unwrap();
        for key in [60, 62, 64, 65] {
            start(&mut pool, key);
        }
        pool.set_limit(2);
        assert_eq!(keys(&pool), vec![64, 65]);

        pool.set_limit(0);
        assert_eq!(pool.limit(), 1);
        pool.set_limit(100);
        assert_eq!(pool.limit(), 4);
    }
}
