//! Handle-based engine API.
//!
//! An [`Engine`] owns its configuration, the shared wavetable bank, the
//! engine-wide reverb settings and a table of open streams. Callers hold
//! [`StreamHandle`]s, small copyable ids checked against a generation
//! counter, so a handle used after [`Engine::close`] fails with
//! [`EngineError::UseAfterClose`] even if its slot has been reused.
//!
//! The lifecycle of a stream is open, prepare, parse metadata, then any
//! sequence of locate, render, pause and resume, and finally close. Every
//! mutating call takes `&mut self`, so calls on one engine are serialized.
//!
//! # Example
//!
//! ```no_run
//! use midiwave::{Engine, EngineConfig};
//!
//! let mut engine = Engine::new(EngineConfig::default())?;
//! let stream = engine.open_file("song.mid")?;
//! engine.prepare(stream)?;
//! let duration_ms = engine.parse_metadata(stream)?;
//!
//! let mut buffer = vec![0i16; engine.config().mix_buffer_size * 2];
//! loop {
//!     let frames = engine.render(stream, &mut buffer)?;
//!     // ... consume buffer[..frames * 2] ...
//!     if frames < engine.config().mix_buffer_size {
//!         break;
//!     }
//! }
//! assert_eq!(engine.location(stream)?, duration_ms);
//! engine.close(stream)?;
//! # Ok::<(), midiwave::EngineError>(())
//! ```

pub mod stream;
pub mod transport;

use std::path::Path;
use std::sync::Arc;

use crate::audio::{ReverbPreset, ReverbSettings};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::midi::Container;
use crate::source::{ByteSource, FileSource, MemorySource};
use crate::synth::WavetableBank;
use stream::Stream;
pub use transport::{PlaybackState, PAUSE_SETTLE_LATENCY};

/// Identifies one open stream of an [`Engine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle {
    index: u32,
    generation: u32,
}

/// One entry of the stream table.
struct Slot {
    generation: u32,
    stream: Option<Stream>,
}

/// The synthesizer engine.
pub struct Engine {
    config: EngineConfig,
    bank: Arc<WavetableBank>,
    reverb: ReverbSettings,
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl Engine {
    /// Creates an engine with `config`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidArgument`] if the configuration fails
    /// [`EngineConfig::validate`].
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let reverb = ReverbSettings {
            preset: config.reverb_preset,
            bypass: config.reverb_bypass,
        };
        tracing::debug!(
            "Engine started: {} Hz, {} channel(s), {} voices",
            config.sample_rate,
            config.channels,
            config.max_voices
        );
        Ok(Self {
            config,
            bank: Arc::new(WavetableBank::new()),
            reverb,
            slots: Vec::new(),
            free: Vec::new(),
        })
    }

    /// The configuration the engine was created with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of streams currently open.
    pub fn open_streams(&self) -> usize {
        self.slots.iter().filter(|s| s.stream.is_some()).count()
    }

    fn stream(&self, handle: StreamHandle) -> Result<&Stream> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.stream.as_ref())
            .ok_or(EngineError::UseAfterClose)
    }

    fn stream_mut(&mut self, handle: StreamHandle) -> Result<&mut Stream> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.stream.as_mut())
            .ok_or(EngineError::UseAfterClose)
    }

    /// Opens a stream over `source` after validating its container.
    ///
    /// Only the container header is read; the stream starts Stopped and
    /// must be prepared before it can render.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Format`] if the signature is not a Standard
    /// MIDI File or RMID file, or [`EngineError::Io`] if reading fails.
    pub fn open<S>(&mut self, source: S) -> Result<StreamHandle>
    where
        S: ByteSource + Send + 'static,
    {
        let stream = Stream::open(Box::new(source), &self.config)?;

        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.stream = Some(stream);
                StreamHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = u32::try_from(self.slots.len())
                    .map_err(|_| EngineError::Resource("stream table is full".to_string()))?;
                self.slots.push(Slot {
                    generation: 0,
                    stream: Some(stream),
                });
                StreamHandle {
                    index,
                    generation: 0,
                }
            }
        };
        Ok(handle)
    }

    /// Opens a stream reading from the file at `path`.
    ///
    /// # Errors
    ///
    /// As [`Engine::open`], plus [`EngineError::Io`] if the file cannot be
    /// opened.
    pub fn open_file<P: AsRef<Path>>(&mut self, path: P) -> Result<StreamHandle> {
        let source = FileSource::open(path)?;
        self.open(source)
    }

    /// Opens a stream over bytes already in memory.
    pub fn open_bytes(&mut self, data: Vec<u8>) -> Result<StreamHandle> {
        self.open(MemorySource::new(data))
    }

    /// Reads and parses the payload and allocates the stream's voices,
    /// reverb and mix buffer.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Resource`] if the payload exceeds
    ///   `max_source_bytes` or memory cannot be reserved
    /// - [`EngineError::Io`] if the source fails
    /// - [`EngineError::Format`] if the payload is truncated or corrupt
    /// - [`EngineError::InvalidState`] if the stream is already prepared
    pub fn prepare(&mut self, handle: StreamHandle) -> Result<()> {
        let config = &self.config;
        let bank = &self.bank;
        let reverb = self.reverb;
        let stream = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.stream.as_mut())
            .ok_or(EngineError::UseAfterClose)?;
        stream.prepare(config, bank, reverb)
    }

    /// Returns the stream duration in milliseconds.
    ///
    /// The duration runs to the last event of any track, end-of-track
    /// markers included, rounded up to a whole millisecond.
    ///
    /// Parsing metadata also rewinds the stream: the position returns to 0,
    /// sounding notes are cut and controllers are reset. The playback state
    /// is kept, so a stream stopped at its end is then stopped at 0.
    pub fn parse_metadata(&mut self, handle: StreamHandle) -> Result<u32> {
        self.stream_mut(handle)?.parse_metadata()
    }

    /// Duration in milliseconds without rewinding.
    pub fn duration(&mut self, handle: StreamHandle) -> Result<u32> {
        self.stream_mut(handle)?.duration()
    }

    /// Moves the position to exactly `target_ms`.
    ///
    /// Sounding notes are cut and controller state is rebuilt from the
    /// events before the target. The playback state does not change.
    ///
    /// # Returns
    ///
    /// The new position, equal to `target_ms`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SeekOutOfRange`] if `target_ms` is past the
    /// duration; the position is then unchanged.
    pub fn locate(&mut self, handle: StreamHandle, target_ms: u32) -> Result<u32> {
        self.stream_mut(handle)?.locate(target_ms)
    }

    /// Current position in milliseconds, never past the duration.
    pub fn location(&self, handle: StreamHandle) -> Result<u32> {
        Ok(self.stream(handle)?.location())
    }

    pub fn state(&self, handle: StreamHandle) -> Result<PlaybackState> {
        Ok(self.stream(handle)?.state())
    }

    /// Container detected when the stream was opened.
    pub fn container(&self, handle: StreamHandle) -> Result<Container> {
        Ok(*self.stream(handle)?.container())
    }

    /// Pauses a playing stream. The state is Paused when this returns
    /// (see [`PAUSE_SETTLE_LATENCY`]); sounding notes fade out over the
    /// next few milliseconds of rendered audio.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidState`] if the stream is Stopped.
    pub fn pause(&mut self, handle: StreamHandle) -> Result<()> {
        self.stream_mut(handle)?.pause()
    }

    /// Resumes a paused stream at the position it was paused at.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidState`] if the stream is Stopped.
    pub fn resume(&mut self, handle: StreamHandle) -> Result<()> {
        self.stream_mut(handle)?.resume()
    }

    /// Renders interleaved 16-bit PCM into `out`.
    ///
    /// The request is `out.len() / channels` frames. While the stream has
    /// audio left the full request is produced; a call that reaches the
    /// end returns the frames up to the end and leaves the stream Stopped.
    /// A Stopped stream at its end renders nothing. A Paused stream
    /// renders the fade-out tail and then silence without moving.
    ///
    /// Samples past the returned frame count are not written.
    ///
    /// # Returns
    ///
    /// Number of frames written.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidArgument`] if `out` is not a whole number of
    ///   frames
    /// - [`EngineError::InvalidState`] before prepare or in Error
    /// - [`EngineError::Internal`] if the mix goes non-finite; the stream
    ///   is left in Error
    pub fn render(&mut self, handle: StreamHandle, out: &mut [i16]) -> Result<usize> {
        let channels = self.config.channels as usize;
        let reverb = self.reverb;
        self.stream_mut(handle)?.render(out, channels, reverb)
    }

    /// Closes a stream and releases everything it owns.
    ///
    /// Valid in every state, Error included.
    pub fn close(&mut self, handle: StreamHandle) -> Result<()> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation && slot.stream.is_some())
            .ok_or(EngineError::UseAfterClose)?;
        slot.stream = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        tracing::debug!("Closed stream {}", handle.index);
        Ok(())
    }

    /// Closes every remaining stream and drops the engine.
    pub fn shutdown(mut self) {
        let open = self.open_streams();
        if open > 0 {
            tracing::warn!("Shutting down with {} stream(s) still open", open);
        }
        for slot in self.slots.iter_mut() {
            slot.stream = None;
        }
        tracing::debug!("Engine shut down");
    }

    pub fn reverb_settings(&self) -> ReverbSettings {
        self.reverb
    }

    pub fn reverb_preset(&self) -> ReverbPreset {
        self.reverb.preset
    }

    /// Selects the reverb preset for every stream, from each stream's next
    /// render on.
    pub fn set_reverb_preset(&mut self, preset: ReverbPreset) {
        self.reverb.preset = preset;
    }

    pub fn reverb_bypass(&self) -> bool {
        self.reverb.bypass
    }

    /// Bypasses (or re-enables) the reverb for every stream.
    ///
    /// Bypassed output is identical to the dry mix. Re-enabling starts
    /// from empty delay lines.
    pub fn set_reverb_bypass(&mut self, bypass: bool) {
        self.reverb.bypass = bypass;
    }

    /// Sets the stream's master volume (0-100, default 90).
    pub fn set_volume(&mut self, handle: StreamHandle, volume: u8) -> Result<()> {
        self.stream_mut(handle)?.set_volume(volume)
    }

    pub fn volume(&self, handle: StreamHandle) -> Result<u8> {
        Ok(self.stream(handle)?.volume())
    }

    /// Transposes melodic notes started from now on (-12 to 12 semitones).
    pub fn set_transposition(&mut self, handle: StreamHandle, semitones: i8) -> Result<()> {
        self.stream_mut(handle)?.set_transposition(semitones)
    }

    pub fn transposition(&self, handle: StreamHandle) -> Result<i8> {
        Ok(self.stream(handle)?.transposition())
    }

    /// Limits the stream to `voices` voices (1 to `max_voices`).
    pub fn set_polyphony(&mut self, handle: StreamHandle, voices: usize) -> Result<()> {
        let max_voices = self.config.max_voices;
        self.stream_mut(handle)?.set_polyphony(voices, max_voices)
    }

    pub fn polyphony(&self, handle: StreamHandle) -> Result<usize> {
        Ok(self.stream(handle)?.polyphony())
    }

    /// Voices sounding in the stream right now.
    pub fn active_voices(&self, handle: StreamHandle) -> Result<usize> {
        Ok(self.stream(handle)?.active_voices())
    }
}
