//! Fixtures shared by the integration tests.
//!
//! Songs are encoded with midly's writer so every test starts from a
//! well-formed Standard MIDI File with a known duration.

#![allow(dead_code)]

use midiwave::{ByteSource, Engine, EngineConfig, StreamHandle};
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::io;

/// Ticks per quarter note used by every fixture.
pub const PPQ: u16 = 480;

/// Sample rate of the test engine.
pub const TEST_SAMPLE_RATE: u32 = 22050;

/// Frames per render call in the conformance scenarios.
pub const TEST_BUFFER_FRAMES: usize = 128;

fn event(delta: u32, kind: TrackEventKind<'static>) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::from(delta),
        kind,
    }
}

fn channel_event(delta: u32, channel: u8, message: MidiMessage) -> TrackEvent<'static> {
    event(
        delta,
        TrackEventKind::Midi {
            channel: u4::from(channel),
            message,
        },
    )
}

pub fn tempo(delta: u32, micros_per_quarter: u32) -> TrackEvent<'static> {
    event(
        delta,
        TrackEventKind::Meta(MetaMessage::Tempo(u24::from(micros_per_quarter))),
    )
}

pub fn end_of_track(delta: u32) -> TrackEvent<'static> {
    event(delta, TrackEventKind::Meta(MetaMessage::EndOfTrack))
}

pub fn note_on(delta: u32, channel: u8, key: u8, velocity: u8) -> TrackEvent<'static> {
    channel_event(
        delta,
        channel,
        MidiMessage::NoteOn {
            key: u7::from(key),
            vel: u7::from(velocity),
        },
    )
}

pub fn note_off(delta: u32, channel: u8, key: u8) -> TrackEvent<'static> {
    channel_event(
        delta,
        channel,
        MidiMessage::NoteOff {
            key: u7::from(key),
            vel: u7::from(0),
        },
    )
}

pub fn program(delta: u32, channel: u8, program: u8) -> TrackEvent<'static> {
    channel_event(
        delta,
        channel,
        MidiMessage::ProgramChange {
            program: u7::from(program),
        },
    )
}

pub fn controller(delta: u32, channel: u8, controller: u8, value: u8) -> TrackEvent<'static> {
    channel_event(
        delta,
        channel,
        MidiMessage::Controller {
            controller: u7::from(controller),
            value: u7::from(value),
        },
    )
}

/// Encodes tracks as a metrical SMF of the given format.
pub fn encode(format: Format, tracks: Vec<Vec<TrackEvent<'static>>>) -> Vec<u8> {
    let smf = Smf {
        header: Header {
            format,
            timing: Timing::Metrical(u15::from(PPQ)),
        },
        tracks,
    };
    let mut bytes = Vec::new();
    smf.write_std(&mut bytes).expect("encode smf");
    bytes
}

/// Format 1 at 120 BPM: four quarter-note melody notes plus a drum track.
/// Exactly 2000 ms long.
pub fn two_second_song() -> Vec<u8> {
    let q = PPQ as u32;
    let tempo_track = vec![tempo(0, 500_000), end_of_track(4 * q)];
    let melody = vec![
        program(0, 0, 0),
        controller(0, 0, 7, 110),
        note_on(0, 0, 60, 100),
        note_off(q, 0, 60),
        note_on(0, 0, 64, 100),
        note_off(q, 0, 64),
        program(0, 0, 48),
        note_on(0, 0, 67, 100),
        note_off(q, 0, 67),
        note_on(0, 0, 72, 100),
        note_off(q, 0, 72),
        end_of_track(0),
    ];
    let drums = vec![
        note_on(0, 9, 36, 110),
        note_off(q / 4, 9, 36),
        note_on(3 * q / 4, 9, 38, 100),
        note_off(q / 4, 9, 38),
        end_of_track(0),
    ];
    encode(Format::Parallel, vec![tempo_track, melody, drums])
}

/// Wraps an SMF in a RIFF RMID container with a leading INFO chunk.
pub fn rmid(smf: &[u8]) -> Vec<u8> {
    let info = b"INAMtest";
    let mut body = Vec::new();
    body.extend_from_slice(b"RMID");
    body.extend_from_slice(b"LIST");
    body.extend_from_slice(&(info.len() as u32).to_le_bytes());
    body.extend_from_slice(info);
    body.extend_from_slice(b"data");
    body.extend_from_slice(&(smf.len() as u32).to_le_bytes());
    body.extend_from_slice(smf);
    if smf.len() % 2 == 1 {
        body.push(0);
    }

    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&body);
    out
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        sample_rate: TEST_SAMPLE_RATE,
        channels: 2,
        mix_buffer_size: TEST_BUFFER_FRAMES,
        ..Default::default()
    }
}

pub fn test_engine() -> Engine {
    Engine::new(test_config()).expect("Failed to create test engine")
}

/// Opens, prepares and parses `bytes`; returns the handle and duration.
pub fn ready_stream(engine: &mut Engine, bytes: Vec<u8>) -> (StreamHandle, u32) {
    let stream = engine.open_bytes(bytes).expect("open");
    engine.prepare(stream).expect("prepare");
    let duration = engine.parse_metadata(stream).expect("parse metadata");
    (stream, duration)
}

/// A source whose reads fail once they go past its first `good_bytes`.
pub struct FailingSource {
    data: Vec<u8>,
    good_bytes: u64,
}

impl FailingSource {
    pub fn new(data: Vec<u8>, good_bytes: u64) -> Self {
        Self { data, good_bytes }
    }
}

impl ByteSource for FailingSource {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let end = offset + buf.len() as u64;
        if end > self.good_bytes {
            return Err(io::Error::other("device failure"));
        }
        let start = offset as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(buf.len())
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// A source that reports a size far larger than the bytes it holds.
pub struct HugeSource {
    header: Vec<u8>,
    size: u64,
}

impl HugeSource {
    pub fn new(header: Vec<u8>, size: u64) -> Self {
        Self { header, size }
    }
}

impl ByteSource for HugeSource {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let offset = offset.min(self.header.len() as u64) as usize;
        let n = buf.len().min(self.header.len() - offset);
        buf[..n].copy_from_slice(&self.header[offset..offset + n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// Peak absolute sample value.
pub fn peak(samples: &[i16]) -> i32 {
    samples.iter().map(|&s| (s as i32).abs()).max().unwrap_or(0)
}
