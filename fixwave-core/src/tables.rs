//! Read-only lookup surfaces: oscillator wave tables, per-note phase
//! increments, vibrato LFO rates, the interpolated pitch-bend factor table,
//! the constant-power pan table and the PCM drum bank.
//!
//! Everything is generated once at engine construction. Floating point is
//! confined to that generation pass; all render-context reads are integer
//! table lookups.

use crate::error::SynthError;
use crate::fp::{self, Fp, Q8};
use crate::tone::WAVE_TYPE_COUNT;
use crate::tone::WaveType;
use crate::TABLE_LENGTH;

use std::f32::consts::PI;
use std::sync::Arc;

/// Number of supported pitch-bend sensitivities, 0..=24 semitones.
pub const PB_SENSITIVITY_COUNT: usize = 25;

/// Size of the interpolated pitch-bend table per sensitivity row.
/// 129 entries give 128 even spans over the 14-bit bend range, so the
/// interpolation index for any in-range bend value has a valid neighbor.
pub const PB_INTERP_TABLE_SIZE: usize = 129;

/// Size of the input space the interpolated table stands in for: the full
/// 14-bit bend value range.
pub const PB_INPUT_SPACE_SIZE: u32 = 16_384;

/// Drum map range on the percussion channel, inclusive.
pub const PCM_START_NOTE: u8 = 35;
pub const PCM_END_NOTE: u8 = 81;
pub const PCM_NOTE_COUNT: usize = (PCM_END_NOTE - PCM_START_NOTE + 1) as usize;

/// Seed of the LCG that fills the noise table. Fixed so the noise
/// waveform is identical across runs.
const NOISE_SEED: u32 = 0x1234_5678;

pub struct Tables {
    wave: [[Fp; TABLE_LENGTH]; WAVE_TYPE_COUNT],
    increment: [Q8; 128],
    vibrato: [Q8; 128],
    pitch_bend: [[Q8; PB_INTERP_TABLE_SIZE]; PB_SENSITIVITY_COUNT],
    pan: [[Fp; 2]; 128],
}

impl Tables {
    pub fn new(sample_rate: u32) -> Tables {
        let fs = sample_rate as f32;

        let mut wave = [[0; TABLE_LENGTH]; WAVE_TYPE_COUNT];
        let mut noise_state = NOISE_SEED;
        for i in 0..TABLE_LENGTH {
            let t = i as f32 / TABLE_LENGTH as f32;

            wave[WaveType::Sin as usize][i] = fp::from_f32((2.0 * PI * t).sin() * 0.9999);
            wave[WaveType::Squ as usize][i] = if i < TABLE_LENGTH / 2 { fp::MAX } else { -fp::MAX };
            wave[WaveType::Saw as usize][i] = fp::from_f32((2.0 * t - 1.0) * 0.9999);
            wave[WaveType::Tri as usize][i] = fp::from_f32((4.0 * (t - 0.5).abs() - 1.0) * 0.9999);

            noise_state = noise_state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            wave[WaveType::Noise as usize][i] = (noise_state >> 16) as u16 as i16;
        }

        // Equal-tempered phase increments: one table cycle per oscillator
        // period, note 69 at 440 Hz.
        let mut increment = [0; 128];
        for (note, inc) in increment.iter_mut().enumerate() {
            let freq = 440.0 * ((note as f32 - 69.0) / 12.0).exp2();
            *inc = fp::q8_from_f32(freq * TABLE_LENGTH as f32 / fs);
        }

        // LFO rates spread over 0.2..=10 Hz across the 7-bit range.
        let mut vibrato = [0; 128];
        for (v, inc) in vibrato.iter_mut().enumerate() {
            let rate = 0.2 + 9.8 * v as f32 / 127.0;
            *inc = fp::q8_from_f32(rate * TABLE_LENGTH as f32 / fs);
        }

        let mut pitch_bend = [[0; PB_INTERP_TABLE_SIZE]; PB_SENSITIVITY_COUNT];
        for (sens, row) in pitch_bend.iter_mut().enumerate() {
            for (j, entry) in row.iter_mut().enumerate() {
                let bend = j as f32 * (PB_INPUT_SPACE_SIZE - 1) as f32
                    / (PB_INTERP_TABLE_SIZE - 1) as f32;
                let semitones = sens as f32 * (bend - 8_192.0) / 8_192.0;
                *entry = fp::q8_from_f32((semitones / 12.0).exp2());
            }
        }

        // Constant-power pan: left = cos, right = sin over a quarter turn.
        let mut pan = [[0; 2]; 128];
        for (p, lr) in pan.iter_mut().enumerate() {
            let theta = PI / 2.0 * p as f32 / 127.0;
            lr[0] = fp::from_f32(theta.cos() * 0.9999);
            lr[1] = fp::from_f32(theta.sin() * 0.9999);
        }

        Tables {
            wave,
            increment,
            vibrato,
            pitch_bend,
            pan,
        }
    }

    /// Reads one sample of the given waveform. The index is masked into
    /// the table, so oscillator wrap arithmetic can never read out of
    /// bounds even when a large bend factor overshoots a single
    /// wrap-by-subtraction.
    #[inline]
    pub fn wave_sample(&self, wave: WaveType, index: i32) -> Fp {
        self.wave[wave as usize][index as usize & (TABLE_LENGTH - 1)]
    }

    /// Sine read used by oscillator 2 and the vibrato LFO.
    #[inline]
    pub fn sine_sample(&self, index: i32) -> Fp {
        self.wave_sample(WaveType::Sin, index)
    }

    /// Phase increment for a MIDI note.
    #[inline]
    pub fn increment(&self, note: u8) -> Q8 {
        self.increment[usize::from(note & 0x7F)]
    }

    /// LFO phase increment for a 7-bit vibrato rate.
    #[inline]
    pub fn vibrato(&self, rate: u8) -> Q8 {
        self.vibrato[usize::from(rate & 0x7F)]
    }

    /// Pan gains `[left, right]` for a 7-bit pan position.
    #[inline]
    pub fn pan(&self, pan: u8) -> [Fp; 2] {
        self.pan[usize::from(pan & 0x7F)]
    }

    /// Interpolated pitch-bend frequency factor.
    ///
    /// `bend` is the raw 14-bit bend value, center 8192. A sensitivity
    /// outside 0..=24 substitutes 2 semitones; a bend at or beyond the top
    /// of the input space returns the last table entry.
    pub fn pitch_bend_factor(&self, sensitivity: u8, bend: u16) -> Q8 {
        let row = if usize::from(sensitivity) < PB_SENSITIVITY_COUNT {
            &self.pitch_bend[usize::from(sensitivity)]
        } else {
            &self.pitch_bend[2]
        };

        let max_input = PB_INPUT_SPACE_SIZE - 1;
        let max_index = (PB_INTERP_TABLE_SIZE - 1) as u32;
        if u32::from(bend) >= max_input {
            return row[max_index as usize];
        }

        let scaled = u32::from(bend) * max_index;
        let idx = (scaled / max_input) as usize;
        let fraction = ((scaled % max_input) * 256 / max_input) as i32;

        let v1 = row[idx];
        let v2 = row[idx + 1];
        v1 + (((v2 - v1) * fraction) >> 8)
    }
}

/// Optional PCM sample data for the percussion channel, one slot per note
/// of the drum map. Slots are empty until the embedder installs data; an
/// empty slot renders silence and idles the voice.
pub struct PcmBank {
    slots: [Option<Arc<[Fp]>>; PCM_NOTE_COUNT],
}

impl Default for PcmBank {
    fn default() -> PcmBank {
        PcmBank {
            slots: std::array::from_fn(|_| None),
        }
    }
}

impl PcmBank {
    pub fn install(&mut self, note: u8, data: Arc<[Fp]>) -> Result<(), SynthError> {
        if !(PCM_START_NOTE..=PCM_END_NOTE).contains(&note) {
            return Err(SynthError::PcmNoteOutOfRange(
                note,
                PCM_START_NOTE,
                PCM_END_NOTE,
            ));
        }
        self.slots[usize::from(note - PCM_START_NOTE)] = Some(data);
        Ok(())
    }

    /// Sample data for a note, if the note maps into the drum range and a
    /// sample has been installed there.
    pub fn get(&self, note: u8) -> Option<&[Fp]> {
        if !(PCM_START_NOTE..=PCM_END_NOTE).contains(&note) {
            return None;
        }
        self.slots[usize::from(note - PCM_START_NOTE)]
            .as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FS;

    #[test]
    fn sine_table_shape() {
        let t = Tables::new(FS);
        assert_eq!(t.sine_sample(0), 0);
        assert!(t.sine_sample(64) > 32_000);
        assert!(t.sine_sample(192) < -32_000);
    }

    #[test]
    fn wave_read_masks_index() {
        let t = Tables::new(FS);
        assert_eq!(
            t.wave_sample(WaveType::Saw, 256 + 5),
            t.wave_sample(WaveType::Saw, 5)
        );
    }

    #[test]
    fn noise_table_is_deterministic() {
        let a = Tables::new(FS);
        let b = Tables::new(FS);
        for i in 0..TABLE_LENGTH as i32 {
            assert_eq!(
                a.wave_sample(WaveType::Noise, i),
                b.wave_sample(WaveType::Noise, i)
            );
        }
    }

    #[test]
    fn increments_double_per_octave() {
        let t = Tables::new(FS);
        let a = t.increment(69);
        let b = t.increment(81);
        assert!((b - 2 * a).abs() <= 2, "a = {}, b = {}", a, b);
    }

    #[test]
    fn pitch_bend_center_is_unity() {
        let t = Tables::new(FS);
        for sens in 0..=24 {
            let f = fp::q8_to_f32(t.pitch_bend_factor(sens, 8_192));
            assert!((f - 1.0).abs() < 0.01, "sens {} factor {}", sens, f);
        }
    }

    #[test]
    fn pitch_bend_two_semitone_extremes() {
        let t = Tables::new(FS);
        let down = fp::q8_to_f32(t.pitch_bend_factor(2, 0));
        let up = fp::q8_to_f32(t.pitch_bend_factor(2, 16_383));
        assert!((down - 0.890_90).abs() < 0.009, "down {}", down);
        assert!((up - 1.122_46).abs() < 0.012, "up {}", up);
    }

    #[test]
    fn pitch_bend_sensitivity_out_of_range_substitutes_two() {
        let t = Tables::new(FS);
        assert_eq!(
            t.pitch_bend_factor(25, 12_345),
            t.pitch_bend_factor(2, 12_345)
        );
    }

    #[test]
    fn pan_table_obeys_constant_power_law() {
        let t = Tables::new(FS);

        let hard_left = t.pan(0);
        assert!(hard_left[0] > 32_000);
        assert_eq!(hard_left[1], 0);

        let hard_right = t.pan(127);
        assert!(hard_right[0].abs() < 64);
        assert!(hard_right[1] > 32_000);

        let center = t.pan(64);
        assert!((i32::from(center[0]) - i32::from(center[1])).abs() < 512);

        for p in 0..128 {
            let [l, r] = t.pan(p);
            let power = fp::to_f32(l).powi(2) + fp::to_f32(r).powi(2);
            assert!((power - 1.0).abs() < 0.02, "pan {} power {}", p, power);
        }
    }

    #[test]
    fn pcm_bank_range_checks() {
        let mut bank = PcmBank::default();
        let data: Arc<[Fp]> = vec![1, 2, 3].into();
        assert!(bank.install(35, data.clone()).is_ok());
        assert!(bank.install(81, data.clone()).is_ok());
        assert_eq!(
            bank.install(34, data.clone()),
            Err(SynthError::PcmNoteOutOfRange(34, 35, 81))
        );
        assert!(bank.get(35).is_some());
        assert!(bank.get(36).is_none());
        assert!(bank.get(82).is_none());
    }
}
