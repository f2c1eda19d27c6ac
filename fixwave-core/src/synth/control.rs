//! The control-context half of the engine: MIDI dispatch, control-change
//! routing and the RPN/NRPN parameter assembler.

use crate::fp;
use crate::midi::{event, system};
use crate::tone::WaveType;

use super::{ChannelState, EnvPhase, ParamType, Synth};

impl Synth {
    /// Pops and handles at most one queued MIDI message. Returns false if
    /// the queue was empty.
    ///
    /// Effects become observable to the next render frame that starts
    /// after this call returns; nothing here blocks.
    pub fn dispatch_one(&mut self) -> bool {
        let midi = match self.midi_queue.pop() {
            Some(m) => m,
            None => return false,
        };

        match midi.event {
            event::NOTE_ON => {
                // A note-on with zero velocity is a note-off in disguise.
                if midi.data[2] > 0 {
                    self.note_on(midi.ch, midi.data[1], midi.data[2]);
                } else {
                    self.note_off(midi.ch, midi.data[1]);
                }
            }
            event::NOTE_OFF => self.note_off(midi.ch, midi.data[1]),
            event::PITCH_BEND => self.handle_pitch_bend(midi.ch, midi.data[1], midi.data[2]),
            event::PROGRAM_CHANGE => self.handle_program_change(midi.ch, midi.data[1]),
            event::CONTROL_CHANGE => {
                self.handle_control_change(midi.ch, midi.data[1], midi.data[2])
            }
            system::STOP => self.handle_stop(),
            system::RESET => {
                log::info!("MIDI system reset");
                self.reset();
            }
            // SysEx and the remaining system messages are recognized and
            // dropped.
            _ => {}
        }
        true
    }

    /// Stores the 14-bit bend value on the channel and pushes the refreshed
    /// factor onto every live voice of the channel.
    fn handle_pitch_bend(&mut self, ch: u8, lsb: u8, msb: u8) {
        let bend = u16::from(lsb & 0x7F) | (u16::from(msb & 0x7F) << 7);
        let chi = usize::from(ch);
        self.channels[chi].pitch_bend.range = bend;

        let factor = self
            .tables
            .pitch_bend_factor(self.channels[chi].pitch_bend.sensitivity, bend);
        for v in self.voices.iter_mut() {
            if v.assigned_channel == ch as i8 && v.env.state != EnvPhase::Idle {
                v.pb_factor = factor;
            }
        }
    }

    /// Swaps the channel tone for a GM preset. Sounding voices keep the
    /// tone they snapshotted at note-on.
    fn handle_program_change(&mut self, ch: u8, program: u8) {
        self.channels[usize::from(ch)].tone = self.gm[usize::from(program & 0x7F)];
    }

    /// System stop: every sounding voice enters its release segment.
    fn handle_stop(&mut self) {
        for v in self.voices.iter_mut() {
            if v.env.state != EnvPhase::Idle {
                v.env.state = EnvPhase::Release;
            }
        }
    }

    fn handle_control_change(&mut self, ch: u8, controller: u8, value: u8) {
        let chi = usize::from(ch);
        let value = value & 0x7F;

        match controller {
            // RPN/NRPN parameter selection
            0x63 => {
                let a = &mut self.channels[chi].assembler;
                a.nrpn_msb = value;
                a.param_type = ParamType::Nrpn;
            }
            0x62 => {
                let a = &mut self.channels[chi].assembler;
                a.nrpn_lsb = value;
                a.param_type = ParamType::Nrpn;
            }
            0x65 => {
                let a = &mut self.channels[chi].assembler;
                a.rpn_msb = value;
                a.param_type = ParamType::Rpn;
            }
            0x64 => {
                let a = &mut self.channels[chi].assembler;
                a.rpn_lsb = value;
                a.param_type = ParamType::Rpn;
            }
            0x06 => self.data_entry_msb(chi, value),
            0x26 => self.data_entry_lsb(chi, value),
            0x60 => self.data_increment(chi, 1),
            0x61 => self.data_increment(chi, -1),

            // Channel mode messages
            0x78 | 0x7B => self.release_channel_voices(ch),
            0x79 => {
                self.release_channel_voices(ch);
                self.reset_controllers(ch);
            }

            // Continuous controllers
            0x01 => self.handle_modulation(ch, value),
            0x07 => {
                self.channels[chi].volume = fp::from_f32(f32::from(value) / 127.0 * 0.2);
            }
            0x0A => self.channels[chi].pan = value,
            0x0B => self.channels[chi].expression = value,
            0x40 => self.handle_sustain_pedal(ch, value),
            0x48 => self.channels[chi].tone.env.release_time = value,
            0x49 => self.channels[chi].tone.env.attack_time = value,
            0x4B => self.channels[chi].tone.env.decay_time = value,
            0x4C => self.channels[chi].modulation.freq = value,
            0x5B => self.reverb.set_send(value),
            _ => {}
        }
    }

    /// Data entry MSB. Commits once both halves of the value have been
    /// seen since the last commit.
    fn data_entry_msb(&mut self, chi: usize, value: u8) {
        if let Some((is_nrpn, param)) = self.channels[chi].assembler.pending() {
            let a = &mut self.channels[chi].assembler;
            a.data_msb = value;
            a.data_msb_received = true;
            if a.data_lsb_received {
                let data = u16::from(a.data_msb) << 7 | u16::from(a.data_lsb);
                a.data_msb_received = false;
                a.data_lsb_received = false;
                self.apply_parameter(chi, is_nrpn, param, data);
            }
        }
    }

    /// Data entry LSB. If the MSB is pending the pair commits; a lone LSB
    /// commits immediately as a 7-bit value.
    fn data_entry_lsb(&mut self, chi: usize, value: u8) {
        if let Some((is_nrpn, param)) = self.channels[chi].assembler.pending() {
            let a = &mut self.channels[chi].assembler;
            a.data_lsb = value;
            a.data_lsb_received = true;
            if a.data_msb_received {
                let data = u16::from(a.data_msb) << 7 | u16::from(a.data_lsb);
                a.data_msb_received = false;
                a.data_lsb_received = false;
                self.apply_parameter(chi, is_nrpn, param, data);
            } else {
                let data = u16::from(a.data_lsb);
                a.data_lsb_received = false;
                self.apply_parameter(chi, is_nrpn, param, data);
            }
        }
    }

    /// Data increment/decrement. The current parameter value is read as
    /// zero before the delta applies, so increment always commits 1 and
    /// decrement commits 0xFFFF. Known quirk, kept deliberately.
    fn data_increment(&mut self, chi: usize, delta: i16) {
        if let Some((is_nrpn, param)) = self.channels[chi].assembler.pending() {
            let value = 0u16.wrapping_add(delta as u16);
            self.apply_parameter(chi, is_nrpn, param, value);
        }
    }

    /// Applies a committed 14-bit RPN/NRPN value. Unrecognized parameters
    /// are ignored.
    fn apply_parameter(&mut self, chi: usize, is_nrpn: bool, param: u16, value: u16) {
        let v_msb = ((value >> 7) & 0x7F) as u8;

        if is_nrpn {
            let p_msb = (param >> 7) & 0x7F;
            let p_lsb = param & 0x7F;
            let tone = &mut self.channels[chi].tone;
            match (p_msb, p_lsb) {
                (2, 0) => {
                    if let Some(wave) = WaveType::from_index(v_msb) {
                        tone.wave = wave;
                    }
                }
                (2, 2) => tone.output_gain = v_msb,
                (3, 0) => tone.rm.freq_rate = v_msb,
                (3, 1) => tone.rm.gain = v_msb,
                (6, 0) => tone.env.sustain_rate = v_msb,
                (6, 1) => tone.env.sustain_level = v_msb,
                _ => {}
            }
        } else {
            match param {
                // RPN 0: pitch bend sensitivity in semitones, max 24
                0 => {
                    if value <= 24 {
                        self.channels[chi].pitch_bend.sensitivity = value as u8;
                        let factor = self
                            .tables
                            .pitch_bend_factor(value as u8, self.channels[chi].pitch_bend.range);
                        for v in self.voices.iter_mut() {
                            if v.assigned_channel == chi as i8 && v.env.state != EnvPhase::Idle {
                                v.pb_factor = factor;
                            }
                        }
                    }
                }
                // RPN 1/2: master fine and coarse tuning, accepted unused
                1 | 2 => {}
                _ => {}
            }
        }
    }

    /// All Sound Off / All Notes Off. Every voice assigned to the channel
    /// moves to its release segment, idle voices included; those fall back
    /// to Idle on their next envelope update.
    fn release_channel_voices(&mut self, ch: u8) {
        for v in self.voices.iter_mut() {
            if v.assigned_channel == ch as i8 {
                v.env.state = EnvPhase::Release;
            }
        }
    }

    /// Reset All Controllers: the channel returns to its power-on state
    /// and its sounding voices get the refreshed bend factor, a cleared
    /// vibrato depth and the default tone snapshot.
    fn reset_controllers(&mut self, ch: u8) {
        let chi = usize::from(ch);
        self.init_channel(chi);

        let ChannelState { pitch_bend, .. } = self.channels[chi];
        let factor = self
            .tables
            .pitch_bend_factor(pitch_bend.sensitivity, pitch_bend.range);
        let tone = self.gm[0];
        for v in self.voices.iter_mut() {
            if v.assigned_channel == ch as i8 && v.env.state != EnvPhase::Idle {
                v.pb_factor = factor;
                v.vibrato.depth = 0;
                v.tone = tone;
            }
        }
    }

    fn handle_sustain_pedal(&mut self, ch: u8, value: u8) {
        let chi = usize::from(ch);
        if value > 0 {
            self.channels[chi].is_hold_on = true;
        } else {
            self.channels[chi].is_hold_on = false;
            for v in self.voices.iter_mut() {
                if v.assigned_channel == ch as i8
                    && v.env.state != EnvPhase::Idle
                    && v.env.note_off_received
                {
                    v.env.state = EnvPhase::Release;
                }
            }
        }
    }

    /// Modulation wheel: updates the channel depth and pushes it onto the
    /// channel's live voices.
    fn handle_modulation(&mut self, ch: u8, value: u8) {
        self.channels[usize::from(ch)].modulation.depth = value;
        for v in self.voices.iter_mut() {
            if v.assigned_channel == ch as i8 && v.env.state != EnvPhase::Idle {
                v.vibrato.depth = value;
            }
        }
    }
}
