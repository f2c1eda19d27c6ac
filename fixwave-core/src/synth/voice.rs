//! Per-voice rendering: two table oscillators with ring modulation, a
//! vibrato LFO, an amortized ADSR envelope, the PCM drum path, and the
//! per-voice DC blocking filter.

use crate::fp::{self, Fp, Q8};
use crate::tables::{PcmBank, Tables};
use crate::tone::{EnvParams, Tone};
use crate::TABLE_LENGTH;

use super::{Tuning, PERCUSSION_CHANNEL};

/// Wave table length in Q8 phase units; oscillators wrap at this bound.
const TABLE_LENGTH_Q8: Q8 = (TABLE_LENGTH << 8) as Q8;

/// Internal envelope amplitude at full scale.
const ENV_FULL_SCALE: i32 = 127 * 128;

/// Envelope segment of a voice. A voice in `Idle` contributes nothing to
/// the mix and is a candidate for allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvPhase {
    Attack,
    Decay,
    Sustain,
    Release,
    Idle,
}

/// Envelope runtime state. The amplitude lives in 0..=127*128 and is
/// stepped only when `counter` wraps, so envelope times are calibrated
/// against the amortization period, not the sample rate.
#[derive(Debug, Clone, Copy)]
pub struct EnvState {
    pub amplitude: i32,
    pub state: EnvPhase,
    pub counter: u32,
    pub note_off_received: bool,
}

impl Default for EnvState {
    fn default() -> EnvState {
        EnvState {
            amplitude: 0,
            state: EnvPhase::Idle,
            counter: 0,
            note_off_received: false,
        }
    }
}

impl EnvState {
    /// Advances the envelope by one amortized update.
    ///
    /// Segment steps are `127 / time` per update; a time of zero jumps the
    /// segment to its target immediately.
    fn step(&mut self, p: &EnvParams) {
        match self.state {
            EnvPhase::Attack => {
                if p.attack_time != 0 {
                    self.amplitude += 127 / i32::from(p.attack_time);
                } else {
                    self.amplitude = ENV_FULL_SCALE;
                }
                if self.amplitude >= ENV_FULL_SCALE {
                    self.amplitude = ENV_FULL_SCALE;
                    self.state = EnvPhase::Decay;
                }
            }
            EnvPhase::Decay => {
                let sustain = i32::from(p.sustain_level) * 128;
                if p.decay_time != 0 {
                    self.amplitude -= 127 / i32::from(p.decay_time);
                } else {
                    self.amplitude = sustain;
                }
                if self.amplitude <= sustain {
                    self.amplitude = sustain;
                    self.state = EnvPhase::Sustain;
                }
            }
            EnvPhase::Sustain => {
                self.amplitude -= i32::from(p.sustain_rate);
                if self.amplitude <= 0 {
                    self.amplitude = 0;
                    self.state = EnvPhase::Release;
                }
            }
            EnvPhase::Release => {
                if p.release_time != 0 {
                    self.amplitude -= 127 / i32::from(p.release_time);
                } else {
                    self.amplitude = 0;
                }
                if self.amplitude <= 0 {
                    self.amplitude = 0;
                    self.state = EnvPhase::Idle;
                }
            }
            EnvPhase::Idle => {
                self.amplitude = 0;
            }
        }
    }
}

/// Single-pole DC blocking high-pass:
/// `y[n] = alpha * (y[n-1] + x[n] - x[n-1])`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DcBlock {
    pub prev_in: Fp,
    pub prev_out: Fp,
}

impl DcBlock {
    #[inline]
    pub fn process(&mut self, x: Fp, alpha: Fp) -> Fp {
        let acc = i32::from(self.prev_out) + i32::from(x) - i32::from(self.prev_in);
        let y = fp::saturate((acc * i32::from(alpha)) >> 15);
        self.prev_in = x;
        self.prev_out = y;
        y
    }
}

/// Oscillator phase state: a Q8 read pointer over the wave table and its
/// per-sample increment.
#[derive(Debug, Default, Clone, Copy)]
pub struct Osc {
    pub increment: Q8,
    pub phase: Q8,
}

impl Osc {
    /// Advances the phase by `increment` scaled with the given Q8 factors,
    /// wrapping at the table length.
    #[inline]
    fn advance(&mut self, pb_factor: Q8, vibrato_factor: Q8) {
        let inc = fp::q8_mul(fp::q8_mul(self.increment, pb_factor), vibrato_factor);
        self.phase += inc;
        if self.phase >= TABLE_LENGTH_Q8 {
            self.phase -= TABLE_LENGTH_Q8;
        }
    }
}

/// Vibrato LFO state, snapshotted from the channel at note-on.
#[derive(Debug, Clone, Copy)]
pub struct Vibrato {
    pub increment: Q8,
    pub phase: Q8,
    pub factor: Q8,
    pub depth: u8,
    pub freq: u8,
}

impl Default for Vibrato {
    fn default() -> Vibrato {
        Vibrato {
            increment: 0,
            phase: 0,
            factor: fp::Q8_ONE,
            depth: 0,
            freq: 0,
        }
    }
}

/// One synthesizer voice.
///
/// `assigned_channel` is -1 only before the first allocation; afterwards
/// it keeps its last assignment and the allocator keys on the envelope
/// state alone.
#[derive(Debug, Clone, Copy)]
pub struct Voice {
    pub assigned_channel: i8,
    pub tone: Tone,
    pub note: u8,
    pub velocity: u8,
    pub osc1: Osc,
    pub osc2: Osc,
    pub pb_factor: Q8,
    pub vibrato: Vibrato,
    pub env: EnvState,
    pub dc_cut: DcBlock,
    /// Output of the last rendered sample, read by the channel mixer.
    pub amplitude: Fp,
    pub pcm_delay: u32,
    pub pcm_pos: usize,
}

impl Default for Voice {
    fn default() -> Voice {
        Voice {
            assigned_channel: -1,
            tone: crate::tone::gm_bank()[0],
            note: 0,
            velocity: 0,
            osc1: Osc::default(),
            osc2: Osc::default(),
            pb_factor: fp::Q8_ONE,
            vibrato: Vibrato::default(),
            env: EnvState::default(),
            dc_cut: DcBlock::default(),
            amplitude: 0,
            pcm_delay: 0,
            pcm_pos: 0,
        }
    }
}

impl Voice {
    /// Renders one sample, advancing phases, the envelope, and the DC
    /// blocker. The result is also stored in `self.amplitude`.
    pub fn render(&mut self, tables: &Tables, pcm: &PcmBank, tuning: &Tuning) -> Fp {
        let mut wave1: Fp;

        if self.assigned_channel != PERCUSSION_CHANNEL as i8 {
            wave1 = tables.wave_sample(self.tone.wave, fp::q8_int(self.osc1.phase));
            self.osc1.advance(self.pb_factor, self.vibrato.factor);

            let mut wave2 = tables.sine_sample(fp::q8_int(self.osc2.phase));
            self.osc2.advance(self.pb_factor, self.vibrato.factor);

            // The LFO updates its factor after the oscillators consumed the
            // previous one, matching the one-sample feedback of the design.
            if self.vibrato.depth != 0 {
                let lfo = tables.sine_sample(fp::q8_int(self.vibrato.phase));
                let bipolar = Q8::from(lfo >> 7);
                let delta = (bipolar * i32::from(self.vibrato.depth) * 10) >> 15;
                self.vibrato.factor = fp::Q8_ONE + delta;
                self.vibrato.phase += self.vibrato.increment;
                if self.vibrato.phase >= TABLE_LENGTH_Q8 {
                    self.vibrato.phase -= TABLE_LENGTH_Q8;
                }
            } else {
                self.vibrato.factor = fp::Q8_ONE;
            }

            if self.tone.rm.freq_rate != 0 {
                wave2 = ((i32::from(wave2) * i32::from(self.tone.rm.gain)) >> 7) as Fp;
                wave1 = fp::mul(wave1, wave2);
            }

            if self.env.counter == 0 {
                self.env.step(&self.tone.env);
            }
            self.env.counter += 1;
            if self.env.counter >= tuning.env_period {
                self.env.counter = 0;
            }

            // Full-scale envelope amplitude maps to unity Q15 gain.
            let adsr_gain = fp::saturate(self.env.amplitude << 1);
            wave1 = fp::mul(wave1, adsr_gain);
        } else {
            wave1 = self.render_pcm(pcm);
        }

        wave1 = ((i32::from(wave1) * i32::from(self.velocity)) >> 7) as Fp;
        let gained = ((i32::from(wave1) * i32::from(self.tone.output_gain)) >> 7) as Fp;

        self.amplitude = self.dc_cut.process(gained, tuning.hpf_alpha);
        self.amplitude
    }

    /// PCM drum path. Holds a few samples of silence to defer the click
    /// onset, then streams the mapped sample once through; missing data or
    /// an out-of-map note idles the voice immediately.
    fn render_pcm(&mut self, pcm: &PcmBank) -> Fp {
        if self.pcm_delay > 0 {
            self.pcm_delay -= 1;
            return 0;
        }

        match pcm.get(self.note) {
            Some(data) if self.pcm_pos < data.len() => {
                let sample = data[self.pcm_pos];
                self.pcm_pos += 1;
                if self.pcm_pos >= data.len() {
                    self.env.state = EnvPhase::Idle;
                }
                sample
            }
            _ => {
                self.env.state = EnvPhase::Idle;
                self.pcm_pos = 0;
                0
            }
        }
    }

    /// Initializes the voice for a new note with a snapshot of the
    /// channel's tone and modulation settings.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        &mut self,
        tables: &Tables,
        tone: Tone,
        ch: u8,
        note: u8,
        velocity: u8,
        pb_factor: Q8,
        mod_depth: u8,
        mod_freq: u8,
    ) {
        self.assigned_channel = ch as i8;
        self.tone = tone;
        self.note = note;

        if ch != PERCUSSION_CHANNEL {
            let increment = tables.increment(note);
            self.osc1 = Osc {
                increment,
                phase: 0,
            };
            self.osc2 = Osc {
                increment: increment * (i32::from(tone.rm.freq_rate) + 1) / 32,
                phase: 0,
            };
            self.pb_factor = pb_factor;
            self.vibrato = Vibrato {
                increment: tables.vibrato(mod_freq),
                phase: 0,
                factor: fp::Q8_ONE,
                depth: mod_depth,
                freq: mod_freq,
            };
            self.env = EnvState {
                amplitude: 0,
                state: EnvPhase::Attack,
                counter: 0,
                note_off_received: false,
            };
        } else {
            // Attack here only marks the voice as in use; the PCM path
            // flips it to Idle when the sample runs out.
            self.env.state = EnvPhase::Attack;
            self.env.note_off_received = false;
            self.pcm_pos = 0;
            self.pcm_delay = super::PCM_INITIAL_SILENCE_SAMPLES;
        }

        self.dc_cut = DcBlock::default();
        self.velocity = velocity;
        self.amplitude = 0;
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.env.state == EnvPhase::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tone::gm_bank;
    use crate::FS;

    fn tuning() -> Tuning {
        Tuning::from_sample_rate(FS, None)
    }

    fn env_with(attack: u8, decay: u8, sustain_level: u8, sustain_rate: u8, release: u8) -> EnvParams {
        EnvParams {
            attack_time: attack,
            decay_time: decay,
            sustain_level,
            sustain_rate,
            release_time: release,
        }
    }

    #[test]
    fn attack_time_zero_reaches_full_scale_in_one_step() {
        let mut env = EnvState {
            state: EnvPhase::Attack,
            ..EnvState::default()
        };
        env.step(&env_with(0, 10, 100, 1, 10));
        assert_eq!(env.amplitude, ENV_FULL_SCALE);
        assert_eq!(env.state, EnvPhase::Decay);
    }

    #[test]
    fn release_time_zero_idles_in_one_step() {
        let mut env = EnvState {
            amplitude: ENV_FULL_SCALE,
            state: EnvPhase::Release,
            ..EnvState::default()
        };
        env.step(&env_with(1, 1, 100, 1, 0));
        assert_eq!(env.amplitude, 0);
        assert_eq!(env.state, EnvPhase::Idle);
    }

    #[test]
    fn sustain_level_zero_bypasses_sustain() {
        let mut env = EnvState {
            amplitude: ENV_FULL_SCALE,
            state: EnvPhase::Decay,
            ..EnvState::default()
        };
        // Immediate decay to the zero sustain level, then the sustain step
        // falls straight through to release.
        env.step(&env_with(1, 0, 0, 0, 1));
        assert_eq!(env.state, EnvPhase::Sustain);
        assert_eq!(env.amplitude, 0);
        env.step(&env_with(1, 0, 0, 0, 1));
        assert_eq!(env.state, EnvPhase::Release);
    }

    #[test]
    fn attack_progresses_by_integer_steps() {
        let mut env = EnvState {
            state: EnvPhase::Attack,
            ..EnvState::default()
        };
        let p = env_with(1, 10, 100, 1, 10);
        for _ in 0..127 {
            env.step(&p);
        }
        assert_eq!(env.amplitude, 127 * 127);
        assert_eq!(env.state, EnvPhase::Attack);
        env.step(&p);
        assert_eq!(env.amplitude, ENV_FULL_SCALE);
        assert_eq!(env.state, EnvPhase::Decay);
    }

    #[test]
    fn dc_block_kills_constant_input() {
        let t = tuning();
        let mut dc = DcBlock::default();
        let mut y = 0;
        for _ in 0..200_000 {
            y = dc.process(10_000, t.hpf_alpha);
        }
        assert!(y.abs() <= 1, "residual {}", y);
    }

    #[test]
    fn dc_block_passes_audio_band() {
        let t = tuning();
        let tables = Tables::new(FS);
        let mut dc = DcBlock::default();
        // One table cycle per 256 samples is about 156 Hz at 40 kHz, far
        // above the 2 Hz cutoff.
        let mut peak: i32 = 0;
        for n in 0..2_048 {
            let x = tables.sine_sample(n & 0xFF);
            let y = dc.process(x, t.hpf_alpha);
            if n >= 256 {
                peak = peak.max(i32::from(y).abs());
            }
        }
        assert!(peak >= 23_170, "peak {}", peak);
    }

    #[test]
    fn idle_voice_renders_dc_filtered_silence() {
        let tables = Tables::new(FS);
        let pcm = PcmBank::default();
        let mut v = Voice::default();
        v.assigned_channel = 0;
        for _ in 0..16 {
            assert_eq!(v.render(&tables, &pcm, &tuning()), 0);
        }
    }

    #[test]
    fn voice_start_snapshots_tone_and_resets_phases() {
        let tables = Tables::new(FS);
        let tone = gm_bank()[40];
        let mut v = Voice::default();
        v.osc1.phase = 1234;
        v.start(&tables, tone, 2, 69, 100, fp::Q8_ONE, 5, 64);
        assert_eq!(v.assigned_channel, 2);
        assert_eq!(v.tone, tone);
        assert_eq!(v.osc1.phase, 0);
        assert_eq!(v.osc1.increment, tables.increment(69));
        assert_eq!(v.env.state, EnvPhase::Attack);
        assert_eq!(v.vibrato.depth, 5);
        assert!(!v.env.note_off_received);
    }

    #[test]
    fn pcm_voice_without_data_goes_idle_after_initial_silence() {
        let tables = Tables::new(FS);
        let pcm = PcmBank::default();
        let mut v = Voice::default();
        v.start(&tables, gm_bank()[0], 9, 34, 100, fp::Q8_ONE, 0, 64);

        for _ in 0..super::super::PCM_INITIAL_SILENCE_SAMPLES {
            v.render(&tables, &pcm, &tuning());
            assert_eq!(v.env.state, EnvPhase::Attack);
        }
        v.render(&tables, &pcm, &tuning());
        assert_eq!(v.env.state, EnvPhase::Idle);
        assert_eq!(v.amplitude, 0);
    }

    #[test]
    fn pcm_voice_plays_installed_sample_once() {
        let tables = Tables::new(FS);
        let mut pcm = PcmBank::default();
        pcm.install(38, vec![8_000; 25].into()).unwrap();

        let mut v = Voice::default();
        v.start(&tables, gm_bank()[0], 9, 38, 127, fp::Q8_ONE, 0, 64);

        let mut nonzero = 0;
        for _ in 0..(super::super::PCM_INITIAL_SILENCE_SAMPLES as usize + 25) {
            if v.render(&tables, &pcm, &tuning()) != 0 {
                nonzero += 1;
            }
        }
        assert!(nonzero > 0);
        assert_eq!(v.env.state, EnvPhase::Idle);
        assert_eq!(v.pcm_pos, 25);
    }
}
