//! The cued event list built from a Standard MIDI File.
//!
//! Supports SMF Format 0 (single track) and Format 1 (multi-track) files.
//! All tracks are merged into one list ordered by tick; events sharing a
//! tick keep their original track order, and within a track their file
//! order. Every event also carries its absolute time in microseconds so
//! playback and seeking never redo tempo arithmetic.
//!
//! # Limitations
//!
//! - Format 2 (sequential) files are rejected
//! - System exclusive and aftertouch messages are dropped
//! - Meta events only contribute tempo changes and track length

use super::tempo::{TempoMap, Timebase};
use super::{ChannelEvent, NUM_CHANNELS};
use crate::error::{EngineError, Result};
use midly::{Format, MetaMessage, Smf, TrackEventKind};

/// A channel event with its position in both ticks and microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedEvent {
    /// Absolute tick position.
    pub tick: u64,
    /// Absolute time in microseconds.
    pub micros: u64,
    /// Index of the track the event came from.
    pub track: u16,
    /// MIDI channel (0-15).
    pub channel: u8,
    /// The event itself.
    pub event: ChannelEvent,
}

/// A parsed, time-ordered song ready for streaming playback.
#[derive(Debug, Clone)]
pub struct Sequence {
    events: Vec<TimedEvent>,
    tempo_map: TempoMap,
    track_count: usize,
    end_tick: u64,
    duration_micros: u64,
}

/// Tracks note-ons without a matching note-off, per channel and key.
type ActiveNotes = [[u16; 128]; NUM_CHANNELS];

impl Sequence {
    /// Parses SMF bytes into a sequence.
    ///
    /// # Arguments
    ///
    /// * `data` - The complete SMF payload, starting with `MThd`
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Format`] if the data is corrupt or cut
    /// short, uses Format 2, or contains no tracks.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let smf = Smf::parse(data)?;
        check_track_chunks(data)?;
        if let Some(index) = smf.tracks.iter().position(|track| {
            !matches!(
                track.last().map(|e| e.kind),
                Some(TrackEventKind::Meta(MetaMessage::EndOfTrack))
            )
        }) {
            return Err(EngineError::Format(format!(
                "track {} does not end with an end-of-track event",
                index
            )));
        }

        if smf.header.format == Format::Sequential {
            return Err(EngineError::Format(
                "Format 2 (sequential) MIDI files not supported".to_string(),
            ));
        }
        if smf.tracks.is_empty() {
            return Err(EngineError::Format("MIDI file has no tracks".to_string()));
        }

        let timebase = Timebase::from_midly(smf.header.timing);

        // First pass: tempo changes and track lengths
        let mut tempo_changes = Vec::new();
        let mut end_tick = 0u64;
        for track in &smf.tracks {
            let mut tick = 0u64;
            for event in track {
                tick += event.delta.as_int() as u64;
                if let TrackEventKind::Meta(MetaMessage::Tempo(micros)) = event.kind {
                    tempo_changes.push((tick, micros.as_int()));
                }
            }
            end_tick = end_tick.max(tick);
        }
        let tempo_map = TempoMap::from_changes(timebase, tempo_changes);

        // Second pass: channel events
        let mut events = Vec::new();
        let mut active: ActiveNotes = [[0; 128]; NUM_CHANNELS];
        for (track_idx, track) in smf.tracks.iter().enumerate() {
            let mut tick = 0u64;
            for event in track {
                tick += event.delta.as_int() as u64;
                if let TrackEventKind::Midi { channel, message } = event.kind {
                    if let Some(event) = ChannelEvent::from_midly(&message) {
                        let channel = channel.as_int();
                        track_active_notes(&mut active, channel, &event);
                        events.push(TimedEvent {
                            tick,
                            micros: 0,
                            track: track_idx as u16,
                            channel,
                            event,
                        });
                    }
                }
            }
        }

        // Stable: equal (tick, track) keeps file order
        events.sort_by_key(|e| (e.tick, e.track));
        for event in events.iter_mut() {
            event.micros = tempo_map.tick_to_micros(event.tick);
        }

        let unterminated: u32 = active.iter().flatten().map(|&n| n as u32).sum();
        if unterminated > 0 {
            tracing::warn!(
                "{} note(s) have no note off; they sound until the end",
                unterminated
            );
        }

        let duration_micros = tempo_map.tick_to_micros(end_tick);
        tracing::debug!(
            "Parsed {} tracks, {} events, {} tempo segments, {} us",
            smf.tracks.len(),
            events.len(),
            tempo_map.segment_count(),
            duration_micros
        );

        Ok(Self {
            events,
            tempo_map,
            track_count: smf.tracks.len(),
            end_tick,
            duration_micros,
        })
    }

    /// All channel events in playback order.
    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    /// The tempo map used to time the events.
    pub fn tempo_map(&self) -> &TempoMap {
        &self.tempo_map
    }

    /// Number of tracks in the file.
    pub fn track_count(&self) -> usize {
        self.track_count
    }

    /// Tick of the last event in any track, end-of-track markers included.
    pub fn end_tick(&self) -> u64 {
        self.end_tick
    }

    /// Exact playback length in microseconds.
    pub fn duration_micros(&self) -> u64 {
        self.duration_micros
    }

    /// Playback length in whole milliseconds, rounded up.
    pub fn duration_ms(&self) -> u32 {
        self.duration_micros
            .div_ceil(1000)
            .min(u32::MAX as u64) as u32
    }

    /// Index of the first event at or after `micros`.
    pub fn first_event_at_or_after(&self, micros: u64) -> usize {
        self.events.partition_point(|e| e.micros < micros)
    }
}

/// Walks the chunk headers and rejects a file whose chunks run past the
/// end of `data` or that holds fewer tracks than its header declares.
fn check_track_chunks(data: &[u8]) -> Result<()> {
    let truncated = |what: String| EngineError::Format(format!("truncated MIDI file: {}", what));
    let be_u32 = |at: usize| -> Option<u64> {
        let bytes = data.get(at..at + 4)?;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u64)
    };

    let header_len = be_u32(4).ok_or_else(|| truncated("header chunk".to_string()))?;
    let declared = data
        .get(10..12)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| truncated("header chunk".to_string()))?;

    let size = data.len() as u64;
    let mut offset = 8 + header_len;
    let mut tracks = 0u16;
    while tracks < declared {
        let at = usize::try_from(offset).map_err(|_| truncated(format!("track {}", tracks)))?;
        let len = be_u32(at + 4).ok_or_else(|| truncated(format!("track {} header", tracks)))?;
        let end = offset + 8 + len;
        if end > size {
            return Err(truncated(format!(
                "track {} needs {} bytes, {} available",
                tracks,
                len,
                size.saturating_sub(offset + 8)
            )));
        }
        if data.get(at..at + 4) == Some(b"MTrk".as_slice()) {
            tracks += 1;
        }
        offset = end;
    }
    Ok(())
}

/// Updates the unmatched note-on counters for one event.
fn track_active_notes(active: &mut ActiveNotes, channel: u8, event: &ChannelEvent) {
    let slot = |key: u8| (channel as usize & 0x0F, key as usize & 0x7F);
    match *event {
        ChannelEvent::NoteOn { key, .. } => {
            let (ch, k) = slot(key);
            active[ch][k] = active[ch][k].saturating_add(1);
        }
        ChannelEvent::NoteOff { key } => {
            let (ch, k) = slot(key);
            active[ch][k] = active[ch][k].saturating_sub(1);
        }
        _ => {}
    }
}
