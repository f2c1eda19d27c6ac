//! Per-channel MIDI state: the current tone, mix controls, pitch-bend and
//! modulation settings, the hold pedal, and the RPN/NRPN assembler.

use crate::fp::{self, Fp};
use crate::tone::Tone;

/// Which parameter family the next data-entry message applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    None,
    Rpn,
    Nrpn,
}

/// State machine assembling 14-bit RPN/NRPN parameter numbers and values
/// out of their carrier control changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamAssembler {
    pub param_type: ParamType,
    pub nrpn_msb: u8,
    pub nrpn_lsb: u8,
    pub rpn_msb: u8,
    pub rpn_lsb: u8,
    pub data_msb: u8,
    pub data_lsb: u8,
    pub data_msb_received: bool,
    pub data_lsb_received: bool,
}

impl Default for ParamAssembler {
    fn default() -> ParamAssembler {
        ParamAssembler {
            param_type: ParamType::None,
            nrpn_msb: 0,
            nrpn_lsb: 0,
            rpn_msb: 0,
            rpn_lsb: 0,
            data_msb: 0,
            data_lsb: 0,
            data_msb_received: false,
            data_lsb_received: false,
        }
    }
}

impl ParamAssembler {
    /// The currently addressed parameter, if any: `(is_nrpn, number)`.
    pub fn pending(&self) -> Option<(bool, u16)> {
        match self.param_type {
            ParamType::None => None,
            ParamType::Rpn => Some((
                false,
                u16::from(self.rpn_msb) << 7 | u16::from(self.rpn_lsb),
            )),
            ParamType::Nrpn => Some((
                true,
                u16::from(self.nrpn_msb) << 7 | u16::from(self.nrpn_lsb),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PitchBendState {
    /// Bend range in semitones, 0..=24.
    pub sensitivity: u8,
    /// Last received 14-bit bend value, center 8192.
    pub range: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Modulation {
    pub depth: u8,
    pub freq: u8,
}

/// State of one MIDI channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelState {
    pub tone: Tone,
    /// Channel volume as a Q15 gain.
    pub volume: Fp,
    /// Expression, 0..=127; scales the volume.
    pub expression: u8,
    pub pitch_bend: PitchBendState,
    pub modulation: Modulation,
    pub is_hold_on: bool,
    /// Pan position, 0..=127 with 64 at center.
    pub pan: u8,
    pub assembler: ParamAssembler,
}

impl ChannelState {
    /// A channel at its General MIDI power-on defaults.
    pub fn new(tone: Tone) -> ChannelState {
        ChannelState {
            tone,
            volume: fp::from_f32(0.1),
            expression: 127,
            pitch_bend: PitchBendState {
                sensitivity: 2,
                range: 8_192,
            },
            modulation: Modulation { depth: 0, freq: 64 },
            is_hold_on: false,
            pan: 64,
            assembler: ParamAssembler::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tone::gm_bank;

    #[test]
    fn defaults_match_power_on_state() {
        let c = ChannelState::new(gm_bank()[0]);
        assert_eq!(c.expression, 127);
        assert_eq!(c.pitch_bend.sensitivity, 2);
        assert_eq!(c.pitch_bend.range, 8_192);
        assert_eq!(c.pan, 64);
        assert!(!c.is_hold_on);
        assert_eq!(c.assembler.param_type, ParamType::None);
    }

    #[test]
    fn assembler_reports_pending_parameter() {
        let mut a = ParamAssembler::default();
        assert_eq!(a.pending(), None);

        a.nrpn_msb = 2;
        a.nrpn_lsb = 1;
        a.param_type = ParamType::Nrpn;
        assert_eq!(a.pending(), Some((true, (2 << 7) | 1)));

        a.rpn_msb = 0;
        a.rpn_lsb = 0;
        a.param_type = ParamType::Rpn;
        assert_eq!(a.pending(), Some((false, 0)));
    }
}
