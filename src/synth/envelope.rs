//! ADSR amplitude envelope.
//!
//! Produces an amplitude envelope with four phases:
//! 1. Attack: ramps from 0.0 to peak (1.0)
//! 2. Decay: ramps from peak to sustain level
//! 3. Sustain: holds at sustain level until release
//! 4. Release: ramps from the current level to 0.0
//!
//! All transitions are continuous. An envelope with a sustain level of 0
//! finishes by itself at the end of its decay (one-shot percussion).

/// Envelope timing in samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeParams {
    pub attack_samples: u32,
    pub decay_samples: u32,
    pub sustain_level: f32,
    pub release_samples: u32,
}

impl EnvelopeParams {
    /// Converts millisecond timings to samples at `sample_rate`.
    pub fn from_millis(
        attack_ms: f32,
        decay_ms: f32,
        sustain_level: f32,
        release_ms: f32,
        sample_rate: u32,
    ) -> Self {
        let samples = |ms: f32| ((ms * sample_rate as f32 / 1000.0).round() as u32).max(1);
        Self {
            attack_samples: samples(attack_ms),
            decay_samples: samples(decay_ms),
            sustain_level: sustain_level.clamp(0.0, 1.0),
            release_samples: samples(release_ms),
        }
    }
}

/// Current phase of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Attack,
    Decay,
    Sustain,
    Release,
    Finished,
}

/// A per-sample ADSR envelope.
#[derive(Debug, Clone)]
pub struct Envelope {
    params: EnvelopeParams,
    stage: EnvelopeStage,
    level: f32,
    /// Level change per sample in the current ramp.
    step: f32,
}

impl Envelope {
    /// Creates an envelope at the start of its attack.
    pub fn new(params: EnvelopeParams) -> Self {
        Self {
            params,
            stage: EnvelopeStage::Attack,
            level: 0.0,
            step: 1.0 / params.attack_samples.max(1) as f32,
        }
    }

    /// Current phase.
    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    /// Current amplitude (0.0 to 1.0).
    pub fn level(&self) -> f32 {
        self.level
    }

    /// Whether the envelope has reached silence.
    pub fn is_finished(&self) -> bool {
        self.stage == EnvelopeStage::Finished
    }

    /// Enters the release phase from the current level.
    pub fn release(&mut self) {
        let samples = self.params.release_samples;
        self.release_over(samples);
    }

    /// Enters (or shortens) a release that reaches silence in `samples`.
    pub fn release_over(&mut self, samples: u32) {
        if self.stage == EnvelopeStage::Finished {
            return;
        }
        let step = self.level / samples.max(1) as f32;
        // A fade never slows down a release already in progress
        if self.stage != EnvelopeStage::Release || step > self.step {
            self.step = step;
        }
        self.stage = EnvelopeStage::Release;
        if self.level <= 0.0 {
            self.stage = EnvelopeStage::Finished;
        }
    }

    /// Advances one sample and returns the new level.
    #[inline]
    pub fn next(&mut self) -> f32 {
        match self.stage {
            EnvelopeStage::Attack => {
                self.level += self.step;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = EnvelopeStage::Decay;
                    self.step = (1.0 - self.params.sustain_level)
                        / self.params.decay_samples.max(1) as f32;
                }
            }
            EnvelopeStage::Decay => {
                self.level -= self.step;
                if self.level <= self.params.sustain_level {
                    self.level = self.params.sustain_level;
                    self.stage = if self.level <= 0.0 {
                        EnvelopeStage::Finished
                    } else {
                        EnvelopeStage::Sustain
                    };
                }
            }
            EnvelopeStage::Sustain => {}
            EnvelopeStage::Release => {
                self.level -= self.step;
                if self.level <= 0.0 {
                    self.level = 0.0;
                    self.stage = EnvelopeStage::Finished;
                }
            }
            EnvelopeStage::Finished => {}
        }
        self.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> EnvelopeParams {
        EnvelopeParams {
            attack_samples: 10,
            decay_samples: 10,
            sustain_level: 0.5,
            release_samples: 20,
        }
    }

    fn run(env: &mut Envelope, samples: usize) -> f32 {
        let mut last = 0.0;
        for _ in 0..samples {
            last = env.next();
        }
        last
    }

    #[test]
    fn test_full_cycle() {
        let mut env = Envelope::new(params());
        assert_eq!(env.stage(), EnvelopeStage::Attack);

        assert!((run(&mut env, 10) - 1.0).abs() < 1e-5);
        assert_eq!(env.stage(), EnvelopeStage::Decay);

        assert!((run(&mut env, 10) - 0.5).abs() < 1e-5);
        assert_eq!(env.stage(), EnvelopeStage::Sustain);

        // Sustain holds indefinitely
        assert!((run(&mut env, 1000) - 0.5).abs() < 1e-5);

        env.release();
        assert_eq!(env.stage(), EnvelopeStage::Release);
        run(&mut env, 20);
        assert!(env.is_finished());
        assert_eq!(env.level(), 0.0);
    }

    #[test]
    fn test_release_during_attack_is_continuous() {
        let mut env = Envelope::new(params());
        let level = run(&mut env, 5);
        env.release();
        let next = env.next();
        assert!(next < level);
        assert!(level - next < 0.05);
    }

    #[test]
    fn test_zero_sustain_finishes_on_its_own() {
        let mut env = Envelope::new(EnvelopeParams {
            sustain_level: 0.0,
            ..params()
        });
        run(&mut env, 25);
        assert!(env.is_finished());
    }

    #[test]
    fn test_fade_shortens_release_only() {
        let mut env = Envelope::new(params());
        run(&mut env, 30);
        env.release_over(4);
        run(&mut env, 4);
        assert!(env.is_finished());

        // A long fade does not stretch a short release
        let mut env = Envelope::new(params());
        run(&mut env, 30);
        env.release();
        env.release_over(10_000);
        run(&mut env, 20);
        assert!(env.is_finished());
    }

    #[test]
    fn test_from_millis() {
        let p = EnvelopeParams::from_millis(10.0, 0.0, 2.0, 100.0, 22050);
        assert_eq!(p.attack_samples, 221);
        assert_eq!(p.decay_samples, 1);
        assert_eq!(p.sustain_level, 1.0);
        assert_eq!(p.release_samples, 2205);
    }
}
