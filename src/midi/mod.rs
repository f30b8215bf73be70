//! MIDI container parsing and the cued event representation.
//!
//! This module turns raw container bytes into a [`Sequence`]: every channel
//! event of every track merged into one time-ordered list, with tick
//! positions already converted to microseconds through the [`TempoMap`].
//! The sequence is built once during prepare and then serves every render
//! and locate without touching the source again.

pub mod container;
pub mod sequence;
pub mod tempo;

pub use container::{Container, ContainerKind};
pub use sequence::{Sequence, TimedEvent};
pub use tempo::{TempoMap, Timebase, DEFAULT_MICROS_PER_QUARTER};

/// Zero-based MIDI channel reserved for General MIDI percussion.
pub const PERCUSSION_CHANNEL: u8 = 9;

/// Number of MIDI channels.
pub const NUM_CHANNELS: usize = 16;

/// A channel voice message the synthesizer acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Note on with non-zero velocity.
    NoteOn { key: u8, velocity: u8 },
    /// Note off (including note on with velocity 0).
    NoteOff { key: u8 },
    /// Control change.
    ControlChange { controller: u8, value: u8 },
    /// Program change.
    ProgramChange { program: u8 },
    /// Pitch bend, centered at 0 (-8192 to 8191).
    PitchBend { value: i16 },
}

impl ChannelEvent {
    /// Converts a `midly` message, dropping kinds the synthesizer ignores.
    pub fn from_midly(message: &midly::MidiMessage) -> Option<Self> {
        use midly::MidiMessage;

        let event = match *message {
            MidiMessage::NoteOn { key, vel } => {
                // Note on with velocity 0 is a note off
                if vel.as_int() == 0 {
                    ChannelEvent::NoteOff { key: key.as_int() }
                } else {
                    ChannelEvent::NoteOn {
                        key: key.as_int(),
                        velocity: vel.as_int(),
                    }
                }
            }
            MidiMessage::NoteOff { key, .. } => ChannelEvent::NoteOff { key: key.as_int() },
            MidiMessage::Controller { controller, value } => ChannelEvent::ControlChange {
                controller: controller.as_int(),
                value: value.as_int(),
            },
            MidiMessage::ProgramChange { program } => ChannelEvent::ProgramChange {
                program: program.as_int(),
            },
            MidiMessage::PitchBend { bend } => ChannelEvent::PitchBend {
                // Raw 14-bit value, center = 8192
                value: (bend.0.as_int() as i32 - 8192) as i16,
            },
            _ => return None,
        };
        Some(event)
    }

    /// Whether this event starts or stops a note.
    ///
    /// Locate replays everything else to rebuild controller state.
    pub fn is_note(&self) -> bool {
        matches!(
            self,
            ChannelEvent::NoteOn { .. } | ChannelEvent::NoteOff { .. }
        )
    }
}
