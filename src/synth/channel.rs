//! Per-channel controller state.

use super::instrument::Instrument;

/// Controller numbers the synthesizer responds to.
pub mod cc {
    pub const DATA_ENTRY_MSB: u8 = 6;
    pub const VOLUME: u8 = 7;
    pub const PAN: u8 = 10;
    pub const EXPRESSION: u8 = 11;
    pub const DATA_ENTRY_LSB: u8 = 38;
    pub const SUSTAIN: u8 = 64;
    pub const RPN_LSB: u8 = 100;
    pub const RPN_MSB: u8 = 101;
    pub const ALL_SOUND_OFF: u8 = 120;
    pub const RESET_ALL_CONTROLLERS: u8 = 121;
    pub const ALL_NOTES_OFF: u8 = 123;
}

/// Registered parameter numbers, as `(MSB << 7) | LSB`.
const RPN_PITCH_BEND_RANGE: u16 = 0;
const RPN_COARSE_TUNING: u16 = 2;

/// Pitch bend range before any RPN 0 message.
pub const DEFAULT_BEND_RANGE: f32 = 2.0;

/// What a controller change asks the voice pool to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAction {
    None,
    /// Pedal lifted: release voices held by the sustain pedal.
    ReleaseSustained,
    /// Release every note on the channel.
    AllNotesOff,
    /// Silence the channel immediately.
    AllSoundOff,
}

/// Controller state for one MIDI channel.
#[derive(Debug, Clone)]
pub struct ChannelState {
    pub program: u8,
    pub volume: u8,
    pub expression: u8,
    pub pan: u8,
    pub sustain: bool,
    /// Centered at 0 (-8192 to 8191).
    pub pitch_bend: i16,
    /// Semitones covered by a full bend.
    pub bend_range: f32,
    /// Semitones from RPN 2.
    pub coarse_tuning: i8,
    rpn_msb: u8,
    rpn_lsb: u8,
    percussion: bool,
}

impl ChannelState {
    pub fn new(percussion: bool) -> Self {
        Self {
            program: 0,
            volume: 100,
            expression: 127,
            pan: 64,
            sustain: false,
            pitch_bend: 0,
            bend_range: DEFAULT_BEND_RANGE,
            coarse_tuning: 0,
            rpn_msb: 0x7F,
            rpn_lsb: 0x7F,
            percussion,
        }
    }

    pub fn is_percussion(&self) -> bool {
        self.percussion
    }

    /// Instrument used for `key` on this channel.
    pub fn instrument(&self, key: u8) -> Instrument {
        if self.percussion {
            Instrument::for_drum_key(key)
        } else {
            Instrument::for_program(self.program)
        }
    }

    /// Applies a control change and reports what the voices must do.
    pub fn control_change(&mut self, controller: u8, value: u8) -> ChannelAction {
        match controller {
            cc::VOLUME => self.volume = value,
            cc::PAN => self.pan = value,
            cc::EXPRESSION => self.expression = value,
            cc::SUSTAIN => {
                let down = value >= 64;
                let lifted = self.sustain && !down;
                self.sustain = down;
                if lifted {
                    return ChannelAction::ReleaseSustained;
                }
            }
            cc::RPN_LSB => self.rpn_lsb = value,
            cc::RPN_MSB => self.rpn_msb = value,
            cc::DATA_ENTRY_MSB => self.data_entry(value),
            cc::DATA_ENTRY_LSB => {
                if self.rpn() == RPN_PITCH_BEND_RANGE {
                    self.bend_range = self.bend_range.trunc() + value as f32 / 100.0;
                }
            }
            cc::ALL_SOUND_OFF => return ChannelAction::AllSoundOff,
            cc::RESET_ALL_CONTROLLERS => {
                let lifted = self.sustain;
                self.reset_controllers();
                if lifted {
                    return ChannelAction::ReleaseSustained;
                }
            }
            // 124-127 (omni/mono/poly) imply all notes off
            cc::ALL_NOTES_OFF..=127 => return ChannelAction::AllNotesOff,
            _ => {}
        }
        ChannelAction::None
    }

    fn rpn(&self) -> u16 {
        ((self.rpn_msb as u16) << 7) | self.rpn_lsb as u16
    }

    fn data_entry(&mut self, value: u8) {
        match self.rpn() {
            RPN_PITCH_BEND_RANGE => self.bend_range = value.min(24) as f32,
            RPN_COARSE_TUNING => self.coarse_tuning = (value as i8 - 64).clamp(-24, 24),
            _ => {}
        }
    }

    /// Resets what CC 121 covers; program, volume and pan survive.
    pub fn reset_controllers(&mut self) {
        self.expression = 127;
        self.sustain = false;
        self.pitch_bend = 0;
        self.rpn_msb = 0x7F;
        self.rpn_lsb = 0x7F;
    }

    /// Pitch offset in semitones from bend and tuning.
    pub fn pitch_offset(&self) -> f32 {
        self.pitch_bend as f32 / 8192.0 * self.bend_range + self.coarse_tuning as f32
    }

    /// Left and right gains from volume, expression and pan.
    ///
    /// Volume and expression follow a squared curve; pan is constant power.
    pub fn gains(&self) -> (f32, f32) {
        let volume = self.volume as f32 / 127.0;
        let expression = self.expression as f32 / 127.0;
        let level = volume * volume * expression * expression;
        let pan = self.pan.saturating_sub(1) as f32 / 126.0;
        let angle = pan * std::f32::consts::FRAC_PI_2;
        (level * angle.cos(), level * angle.sin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let channel = ChannelState::new(false);
        assert_eq!(channel.volume, 100);
        assert_eq!(channel.expression, 127);
        assert_eq!(channel.pitch_offset(), 0.0);
        let (l, r) = channel.gains();
        assert!((l - r).abs() < 1e-3);
    }

    #[test]
    fn test_sustain_release_action() {
        let mut channel = ChannelState::new(false);
        assert_eq!(channel.control_change(cc::SUSTAIN, 127), ChannelAction::None);
        assert!(channel.sustain);
        // Pedal still down
        assert_eq!(channel.control_change(cc::SUSTAIN, 100), ChannelAction::None);
        assert_eq!(
            channel.control_change(cc::SUSTAIN, 0),
            ChannelAction::ReleaseSustained
        );
        // Lifting again does nothing
        assert_eq!(channel.control_change(cc::SUSTAIN, 0), ChannelAction::None);
    }

    #[test]
    fn test_bend_range_rpn() {
        let mut channel = ChannelState::new(false);
        channel.control_change(cc::RPN_MSB, 0);
        channel.control_change(cc::RPN_LSB, 0);
        channel.control_change(cc::DATA_ENTRY_MSB, 12);
        channel.pitch_bend = 8191;
        assert!((channel.pitch_offset() - 12.0).abs() < 0.01);
        channel.pitch_bend = -8192;
        assert!((channel.pitch_offset() + 12.0).abs() < 1e-4);
    }

    #[test]
    fn test_coarse_tuning_rpn() {
        let mut channel = ChannelState::new(false);
        channel.control_change(cc::RPN_MSB, 0);
        channel.control_change(cc::RPN_LSB, 2);
        channel.control_change(cc::DATA_ENTRY_MSB, 66);
        assert_eq!(channel.coarse_tuning, 2);
        assert_eq!(channel.pitch_offset(), 2.0);
    }

    #[test]
    fn test_data_entry_without_rpn_is_ignored() {
        let mut channel = ChannelState::new(false);
        channel.control_change(cc::DATA_ENTRY_MSB, 12);
        assert_eq!(channel.bend_range, DEFAULT_BEND_RANGE);
    }

    #[test]
    fn test_reset_controllers() {
        let mut channel = ChannelState::new(false);
        channel.control_change(cc::VOLUME, 50);
        channel.control_change(cc::EXPRESSION, 10);
        channel.control_change(cc::SUSTAIN, 127);
        channel.pitch_bend = 4000;
        assert_eq!(
            channel.control_change(cc::RESET_ALL_CONTROLLERS, 0),
            ChannelAction::ReleaseSustained
        );
        assert_eq!(channel.volume, 50);
        assert_eq!(channel.expression, 127);
        assert_eq!(channel.pitch_bend, 0);
        assert!(!channel.sustain);
    }

    #[test]
    fn test_hard_pan() {
        let mut channel = ChannelState::new(false);
        channel.control_change(cc::PAN, 0);
        let (l, r) = channel.gains();
        assert!(r.abs() < 1e-6 && l > 0.0);
        channel.control_change(cc::PAN, 127);
        let (l, r) = channel.gains();
        assert!(l.abs() < 1e-6 && r > 0.0);
    }

    #[test]
    fn test_mode_messages_release_notes() {
        let mut channel = ChannelState::new(false);
        for controller in 123..=127 {
            assert_eq!(
                channel.control_change(controller, 0),
                ChannelAction::AllNotesOff
            );
        }
        assert_eq!(
            channel.control_change(cc::ALL_SOUND_OFF, 0),
            ChannelAction::AllSoundOff
        );
    }
}
