//! One playing MIDI stream.
//!
//! A [`Stream`] is created by open with only its source and container
//! known. Prepare reads and parses the payload and builds the [`Player`]:
//! the sequence, synthesizer, reverb and mix buffer that rendering needs.
//! Every state check lives here; the engine only resolves handles.

use std::sync::Arc;

use super::transport::{Clock, PlaybackState};
use crate::audio::{Reverb, ReverbSettings};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::midi::{Container, Sequence};
use crate::source::ByteSource;
use crate::synth::{Synthesizer, WavetableBank, MAX_TRANSPOSITION};

/// Master volume applied before prepare and after reset (0-100).
pub const DEFAULT_VOLUME: u8 = 90;

/// Highest accepted master volume.
pub const MAX_VOLUME: u8 = 100;

/// Converts a normalized sample to 16-bit PCM.
#[inline]
fn to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Master volume as a linear gain, on a squared curve.
fn volume_gain(volume: u8) -> f32 {
    let v = volume.min(MAX_VOLUME) as f32 / MAX_VOLUME as f32;
    v * v
}

/// Everything built by prepare.
pub(crate) struct Player {
    sequence: Sequence,
    synth: Synthesizer,
    reverb: Reverb,
    /// Interleaved stereo scratch, `mix_buffer_size` frames long.
    mix: Vec<f32>,
    /// Index of the next event to dispatch.
    cursor: usize,
    clock: Clock,
    gain: f32,
}

impl Player {
    /// End of playback in microseconds, on the millisecond grid.
    fn end_micros(&self) -> u64 {
        self.sequence.duration_ms() as u64 * 1000
    }

    fn at_end(&self) -> bool {
        self.clock.frames_until(self.end_micros()) == 0
    }

    fn location_ms(&self) -> u32 {
        let ms = (self.clock.micros() / 1000).min(u32::MAX as u64) as u32;
        ms.min(self.sequence.duration_ms())
    }

    /// Cuts all sound, rebuilds controller state up to `micros` and moves
    /// the cursor and clock there.
    fn seek(&mut self, micros: u64) {
        self.synth.reset();
        self.reverb.reset();
        self.cursor = self.sequence.first_event_at_or_after(micros);
        for event in &self.sequence.events()[..self.cursor] {
            self.synth.chase(event.channel, &event.event);
        }
        self.clock.set(micros);
    }

    /// Sends every event due at the current position to the synthesizer.
    fn dispatch_due(&mut self) {
        while let Some(event) = self.sequence.events().get(self.cursor) {
            if self.clock.frames_until(event.micros) > 0 {
                break;
            }
            self.synth.handle_event(event.channel, &event.event);
            self.cursor += 1;
        }
    }

    /// Renders `frames` frames into `out` without touching the clock.
    fn mix_into(&mut self, out: &mut [i16], channels: usize, frames: usize) -> Result<()> {
        let mix = &mut self.mix[..frames * 2];
        self.synth.render(mix);
        self.reverb.process(mix);

        let gain = self.gain;
        if let Some(bad) = mix.iter().map(|s| s * gain).find(|s| !s.is_finite()) {
            return Err(EngineError::Internal(format!(
                "non-finite sample {} in mix output",
                bad
            )));
        }

        for (frame, dst) in mix.chunks_exact(2).zip(out.chunks_exact_mut(channels)) {
            let (left, right) = (frame[0] * gain, frame[1] * gain);
            if channels == 1 {
                dst[0] = to_i16((left + right) * 0.5);
            } else {
                dst[0] = to_i16(left);
                dst[1] = to_i16(right);
            }
        }
        Ok(())
    }

    fn mix_frames(&self) -> usize {
        self.mix.len() / 2
    }

    /// Plays up to `frames` frames, splitting blocks at event times.
    ///
    /// # Returns
    ///
    /// Frames produced and whether the end was reached.
    fn play(&mut self, out: &mut [i16], channels: usize, frames: usize) -> Result<(usize, bool)> {
        let end = self.end_micros();
        let mut produced = 0;
        loop {
            self.dispatch_due();
            let to_end = self.clock.frames_until(end);
            if to_end == 0 {
                return Ok((produced, true));
            }
            if produced == frames {
                return Ok((produced, false));
            }

            let to_event = self
                .sequence
                .events()
                .get(self.cursor)
                .map_or(u64::MAX, |e| self.clock.frames_until(e.micros));
            let chunk = (frames - produced)
                .min(self.mix_frames())
                .min(to_end.min(to_event).min(usize::MAX as u64) as usize);

            let dst = &mut out[produced * channels..(produced + chunk) * channels];
            self.mix_into(dst, channels, chunk)?;
            self.clock.advance(chunk as u64);
            produced += chunk;
        }
    }

    /// Renders the fade-out tail while paused; the clock stays put.
    fn tail(&mut self, out: &mut [i16], channels: usize, frames: usize) -> Result<()> {
        let mut produced = 0;
        while produced < frames {
            let chunk = (frames - produced).min(self.mix_frames());
            let dst = &mut out[produced * channels..(produced + chunk) * channels];
            self.mix_into(dst, channels, chunk)?;
            produced += chunk;
        }
        Ok(())
    }
}

/// An opened stream and, once prepared, its player.
pub(crate) struct Stream {
    source: Box<dyn ByteSource + Send>,
    container: Container,
    player: Option<Player>,
    state: PlaybackState,
    volume: u8,
    transposition: i8,
    polyphony: usize,
}

impl Stream {
    /// Detects the container held by `source`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Format`] for an unknown signature and
    /// [`EngineError::Io`] if the source cannot be read.
    pub fn open(mut source: Box<dyn ByteSource + Send>, config: &EngineConfig) -> Result<Self> {
        let container = Container::detect(source.as_mut())?;
        tracing::debug!(
            "Opened {:?} container, payload {} bytes at offset {}",
            container.kind,
            container.payload_len,
            container.payload_offset
        );
        Ok(Self {
            source,
            container,
            player: None,
            state: PlaybackState::Stopped,
            volume: DEFAULT_VOLUME,
            transposition: 0,
            polyphony: config.max_voices,
        })
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Fails with InvalidState if the stream is in Error.
    fn ensure_usable(&self, operation: &'static str) -> Result<()> {
        if self.state == PlaybackState::Error {
            return Err(EngineError::invalid_state(operation, self.state));
        }
        Ok(())
    }

    /// The player, or InvalidState if prepare has not run.
    fn player_mut(&mut self, operation: &'static str) -> Result<&mut Player> {
        self.ensure_usable(operation)?;
        let state = self.state;
        self.player
            .as_mut()
            .ok_or_else(|| EngineError::invalid_state(operation, state))
    }

    fn fail(&mut self, error: EngineError) -> EngineError {
        tracing::error!("Stream entered error state: {}", error);
        self.state = PlaybackState::Error;
        error
    }

    /// Reads and parses the payload and allocates the render resources.
    pub fn prepare(
        &mut self,
        config: &EngineConfig,
        bank: &Arc<WavetableBank>,
        reverb: ReverbSettings,
    ) -> Result<()> {
        self.ensure_usable("prepare")?;
        if self.player.is_some() {
            return Err(EngineError::invalid_state("prepare", self.state));
        }

        let len = self.container.payload_len;
        if len > config.max_source_bytes {
            return Err(EngineError::Resource(format!(
                "payload of {} bytes exceeds the {} byte limit",
                len, config.max_source_bytes
            )));
        }
        let len = usize::try_from(len)
            .map_err(|_| EngineError::Resource(format!("payload of {} bytes", len)))?;
        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|e| {
            EngineError::Resource(format!("cannot buffer {} byte payload: {}", len, e))
        })?;
        data.resize(len, 0);

        let read = self
            .source
            .read_fully_at(self.container.payload_offset, &mut data)?;
        // A short read leaves a truncated file for the parser to reject
        data.truncate(read);

        let sequence = Sequence::parse(&data)?;

        let mut synth = Synthesizer::new(Arc::clone(bank), config.sample_rate, config.max_voices)?;
        synth.set_polyphony(self.polyphony);
        synth.set_transposition(self.transposition);
        let reverb = Reverb::new(config.sample_rate, reverb)?;

        let mix_len = config.mix_buffer_size * 2;
        let mut mix = Vec::new();
        mix.try_reserve_exact(mix_len).map_err(|e| {
            EngineError::Resource(format!("cannot allocate mix buffer: {}", e))
        })?;
        mix.resize(mix_len, 0.0);

        tracing::debug!(
            "Prepared stream: {} tracks, {} events, {} ms",
            sequence.track_count(),
            sequence.events().len(),
            sequence.duration_ms()
        );

        self.player = Some(Player {
            sequence,
            synth,
            reverb,
            mix,
            cursor: 0,
            clock: Clock::new(config.sample_rate),
            gain: volume_gain(self.volume),
        });
        Ok(())
    }

    /// Returns the duration and rewinds to the start.
    pub fn parse_metadata(&mut self) -> Result<u32> {
        let player = self.player_mut("parse metadata")?;
        player.seek(0);
        let duration = player.sequence.duration_ms();
        tracing::info!(
            "Metadata: {} ms, {} tracks, {} tempo segments",
            duration,
            player.sequence.track_count(),
            player.sequence.tempo_map().segment_count()
        );
        Ok(duration)
    }

    pub fn duration(&mut self) -> Result<u32> {
        Ok(self.player_mut("query duration")?.sequence.duration_ms())
    }

    /// Current position in milliseconds; 0 before prepare.
    pub fn location(&self) -> u32 {
        self.player.as_ref().map_or(0, Player::location_ms)
    }

    pub fn locate(&mut self, target_ms: u32) -> Result<u32> {
        let player = self.player_mut("locate")?;
        let duration_ms = player.sequence.duration_ms();
        if target_ms > duration_ms {
            return Err(EngineError::SeekOutOfRange {
                target_ms,
                duration_ms,
            });
        }
        player.seek(target_ms as u64 * 1000);
        tracing::debug!("Located to {} ms", target_ms);
        Ok(player.location_ms())
    }

    pub fn pause(&mut self) -> Result<()> {
        self.ensure_usable("pause")?;
        match self.state {
            PlaybackState::Playing => {
                if let Some(player) = self.player.as_mut() {
                    player.synth.fade_out();
                }
                self.state = PlaybackState::Paused;
                Ok(())
            }
            PlaybackState::Paused => Ok(()),
            state => Err(EngineError::invalid_state("pause", state)),
        }
    }

    pub fn resume(&mut self) -> Result<()> {
        self.ensure_usable("resume")?;
        match self.state {
            PlaybackState::Paused => {
                self.state = PlaybackState::Playing;
                Ok(())
            }
            PlaybackState::Playing => Ok(()),
            state => Err(EngineError::invalid_state("resume", state)),
        }
    }

    /// Renders into `out`; see [`crate::Engine::render`].
    pub fn render(
        &mut self,
        out: &mut [i16],
        channels: usize,
        reverb: ReverbSettings,
    ) -> Result<usize> {
        let state = self.state;
        let player = self.player_mut("render")?;
        if out.len() % channels != 0 {
            return Err(EngineError::InvalidArgument(format!(
                "buffer of {} samples is not a whole number of {}-channel frames",
                out.len(),
                channels
            )));
        }
        let frames = out.len() / channels;
        if frames == 0 {
            return Ok(0);
        }
        player.reverb.configure(reverb);

        let result = match state {
            PlaybackState::Paused => player.tail(out, channels, frames).map(|()| (frames, false)),
            PlaybackState::Stopped if player.at_end() => return Ok(0),
            _ => player.play(out, channels, frames),
        };

        match result {
            Ok((produced, ended)) => {
                if state != PlaybackState::Paused {
                    self.state = if ended {
                        PlaybackState::Stopped
                    } else {
                        PlaybackState::Playing
                    };
                }
                Ok(produced)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: u8) -> Result<()> {
        self.ensure_usable("set volume")?;
        if volume > MAX_VOLUME {
            return Err(EngineError::InvalidArgument(format!(
                "volume {} outside 0..={}",
                volume, MAX_VOLUME
            )));
        }
        self.volume = volume;
        if let Some(player) = self.player.as_mut() {
            player.gain = volume_gain(volume);
        }
        Ok(())
    }

    pub fn transposition(&self) -> i8 {
        self.transposition
    }

    pub fn set_transposition(&mut self, semitones: i8) -> Result<()> {
        self.ensure_usable("set transposition")?;
        if !(-MAX_TRANSPOSITION..=MAX_TRANSPOSITION).contains(&semitones) {
            return Err(EngineError::InvalidArgument(format!(
                "transposition {} outside -{}..={}",
                semitones, MAX_TRANSPOSITION, MAX_TRANSPOSITION
            )));
        }
        self.transposition = semitones;
        if let Some(player) = self.player.as_mut() {
            player.synth.set_transposition(semitones);
        }
        Ok(())
    }

    pub fn polyphony(&self) -> usize {
        self.polyphony
    }

    pub fn set_polyphony(&mut self, voices: usize, max_voices: usize) -> Result<()> {
        self.ensure_usable("set polyphony")?;
        if !(1..=max_voices).contains(&voices) {
            return Err(EngineError::InvalidArgument(format!(
                "polyphony {} outside 1..={}",
                voices, max_voices
            )));
        }
        self.polyphony = voices;
        if let Some(player) = self.player.as_mut() {
            player.synth.set_polyphony(voices);
        }
        Ok(())
    }

    /// Voices sounding right now; 0 before prepare.
    pub fn active_voices(&self) -> usize {
        self.player
            .as_ref()
            .map_or(0, |player| player.synth.active_voices())
    }
}
