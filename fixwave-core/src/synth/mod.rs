//! The synthesizer engine.
//!
//! [`Synth`] owns every piece of mutable state: the voice pool, the MIDI
//! channel states, the reverb tail, the master DC blocker and the lookup
//! tables. The render context calls [`Synth::render_frame`] once per
//! sample period; the control context pumps [`Synth::dispatch_one`].
//! Neither path blocks or allocates.

mod channel;
mod control;
mod reverb;
mod voice;

pub use channel::{ChannelState, Modulation, ParamAssembler, ParamType, PitchBendState};
pub use reverb::Reverb;
pub use voice::{DcBlock, EnvPhase, EnvState, Osc, Vibrato, Voice};

use crate::error::SynthError;
use crate::fp::{self, Fp, Stereo};
use crate::midi::{self, MidiQueue};
use crate::tables::{PcmBank, Tables};
use crate::tone::{self, Tone};
use crate::{FS, MAX_CHANNEL_NUM, MAX_VOICE_NUM};

use std::f32::consts::PI;
use std::sync::Arc;

/// Zero-based index of the percussion channel (MIDI channel 10). Voices
/// assigned here take the PCM path and ignore the tone oscillators.
pub const PERCUSSION_CHANNEL: u8 = 9;

/// Samples of silence inserted before PCM playback to push the onset past
/// the voice-start click.
pub const PCM_INITIAL_SILENCE_SAMPLES: u32 = 10;

/// Longest sustain segment in seconds. Together with the sample rate this
/// fixes the envelope amortization period.
pub const MAX_SUSTAIN_LENGTH_S: u32 = 7;

/// DC blocker cutoff in Hz, applied per voice and on the master bus.
const HPF_CUTOFF_FREQ: f32 = 2.0;

/// Engine construction parameters. Tests and embedders may shorten the
/// envelope period to make envelope segments observable in fewer samples.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub sample_rate: u32,
    /// Envelope update period in samples; `None` derives it from the
    /// sample rate and [`MAX_SUSTAIN_LENGTH_S`].
    pub env_update_period: Option<u32>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            sample_rate: FS,
            env_update_period: None,
        }
    }
}

/// Values derived from the configuration once, read on every sample.
#[derive(Debug, Clone, Copy)]
pub struct Tuning {
    pub hpf_alpha: Fp,
    pub env_period: u32,
}

impl Tuning {
    pub fn from_sample_rate(sample_rate: u32, env_update_period: Option<u32>) -> Tuning {
        let rc = 1.0 / (2.0 * PI * HPF_CUTOFF_FREQ);
        let alpha = rc / (rc + 1.0 / sample_rate as f32);
        let derived = (MAX_SUSTAIN_LENGTH_S * sample_rate / 127 / 128).max(1);
        Tuning {
            hpf_alpha: fp::from_f32(alpha),
            env_period: env_update_period.unwrap_or(derived),
        }
    }
}

/// The complete synthesizer.
///
/// Voice, channel and reverb state are public so that embedders and tests
/// can observe them; mutation belongs to the dispatcher and the render
/// path.
pub struct Synth {
    pub voices: [Voice; MAX_VOICE_NUM],
    pub channels: [ChannelState; MAX_CHANNEL_NUM],
    pub reverb: Reverb,
    pub master_dc: [DcBlock; 2],
    pub tuning: Tuning,

    tables: Tables,
    gm: [Tone; 128],
    pcm: PcmBank,
    midi_queue: MidiQueue,
}

impl Synth {
    /// An engine at the default 40 kHz configuration.
    pub fn new() -> Synth {
        let cfg = Config::default();
        Synth::build(cfg.sample_rate, cfg.env_update_period)
    }

    pub fn with_config(cfg: Config) -> Result<Synth, SynthError> {
        if cfg.sample_rate == 0 {
            return Err(SynthError::InvalidSampleRate(cfg.sample_rate));
        }
        if cfg.env_update_period == Some(0) {
            return Err(SynthError::InvalidEnvelopePeriod);
        }
        Ok(Synth::build(cfg.sample_rate, cfg.env_update_period))
    }

    fn build(sample_rate: u32, env_update_period: Option<u32>) -> Synth {
        let gm = tone::gm_bank();
        let mut s = Synth {
            voices: [Voice::default(); MAX_VOICE_NUM],
            channels: [ChannelState::new(gm[0]); MAX_CHANNEL_NUM],
            reverb: Reverb::new(),
            master_dc: [DcBlock::default(); 2],
            tuning: Tuning::from_sample_rate(sample_rate, env_update_period),
            tables: Tables::new(sample_rate),
            gm,
            pcm: PcmBank::default(),
            midi_queue: midi::new_queue(),
        };
        s.init_master();
        s
    }

    /// Producer handle for the transport side of the MIDI queue.
    pub fn midi_queue(&self) -> MidiQueue {
        Arc::clone(&self.midi_queue)
    }

    /// Installs PCM sample data for one note of the drum map.
    pub fn install_pcm(&mut self, note: u8, data: Arc<[Fp]>) -> Result<(), SynthError> {
        self.pcm.install(note, data)
    }

    /// Reinitializes master, channel and reverb state and idles every
    /// voice, as the MIDI reset system message does. The queue is drained.
    pub fn reset(&mut self) {
        while self.midi_queue.pop().is_some() {}
        self.init_master();
        for v in self.voices.iter_mut() {
            v.env.state = EnvPhase::Idle;
        }
    }

    fn init_master(&mut self) {
        self.master_dc = [DcBlock::default(); 2];
        for ch in 0..MAX_CHANNEL_NUM {
            self.init_channel(ch);
        }
        self.reverb.reset();
    }

    pub(crate) fn init_channel(&mut self, ch: usize) {
        self.channels[ch] = ChannelState::new(self.gm[0]);
    }

    /// Renders one stereo frame: every channel mixes its live voices, the
    /// channel outputs are summed, and the sum passes through the reverb
    /// and the master DC blocker.
    pub fn render_frame(&mut self) -> Stereo {
        let mut sum_l: i32 = 0;
        let mut sum_r: i32 = 0;
        for ch in 0..MAX_CHANNEL_NUM {
            let s = self.mix_channel(ch);
            sum_l += i32::from(s.left);
            sum_r += i32::from(s.right);
        }

        let mixed = Stereo {
            left: fp::saturate(sum_l),
            right: fp::saturate(sum_r),
        };
        let processed = self.reverb.process(mixed);

        let alpha = self.tuning.hpf_alpha;
        Stereo {
            left: self.master_dc[0].process(processed.left, alpha),
            right: self.master_dc[1].process(processed.right, alpha),
        }
    }

    /// Renders and accumulates the voices assigned to one channel, then
    /// pans the mono sum. Voices are advanced here, in index order, as a
    /// side effect of mixing.
    fn mix_channel(&mut self, ch: usize) -> Stereo {
        let chan = self.channels[ch];
        let expr_gain = ((i32::from(chan.expression) * i32::from(fp::MAX)) / 127) as Fp;
        let ch_gain = fp::mul(chan.volume, expr_gain);

        let mut mono: i32 = 0;
        for v in self.voices.iter_mut() {
            if v.assigned_channel == ch as i8 && v.env.state != EnvPhase::Idle {
                v.render(&self.tables, &self.pcm, &self.tuning);
                mono += i32::from(fp::mul(v.amplitude, ch_gain));
            }
        }

        let mono = fp::saturate(mono);
        let [pan_l, pan_r] = self.tables.pan(chan.pan);
        Stereo {
            left: fp::mul(mono, pan_l),
            right: fp::mul(mono, pan_r),
        }
    }

    /// Allocates a voice for a note-on.
    ///
    /// One pass over the pool tracks the first idle, first releasing and
    /// first still-held voice; the scan stops early on an idle hit. If
    /// nothing is allocatable the note is dropped.
    pub(crate) fn note_on(&mut self, ch: u8, note: u8, velocity: u8) {
        let mut idle = None;
        let mut releasing = None;
        let mut steal = None;

        for (i, v) in self.voices.iter().enumerate() {
            match v.env.state {
                EnvPhase::Idle => {
                    idle = Some(i);
                    break;
                }
                EnvPhase::Release => {
                    if releasing.is_none() {
                        releasing = Some(i);
                    }
                }
                EnvPhase::Attack | EnvPhase::Decay | EnvPhase::Sustain => {
                    if steal.is_none() {
                        steal = Some(i);
                    }
                }
            }
        }

        if idle.is_none() && releasing.is_none() && steal.is_some() {
            log::debug!("stealing held voice for note {} on channel {}", note, ch);
        }

        match idle.or(releasing).or(steal) {
            Some(i) => {
                let chan = self.channels[usize::from(ch)];
                let pb_factor = self
                    .tables
                    .pitch_bend_factor(chan.pitch_bend.sensitivity, chan.pitch_bend.range);
                self.voices[i].start(
                    &self.tables,
                    chan.tone,
                    ch,
                    note,
                    velocity,
                    pb_factor,
                    chan.modulation.depth,
                    chan.modulation.freq,
                );
            }
            None => log::warn!("voice pool exhausted, dropping note {} on channel {}", note, ch),
        }
    }

    /// Note-off: latches the release request on every matching voice and,
    /// unless the hold pedal is down, moves them to the release segment.
    pub(crate) fn note_off(&mut self, ch: u8, note: u8) {
        let hold = self.channels[usize::from(ch)].is_hold_on;
        for v in self.voices.iter_mut() {
            if v.env.state != EnvPhase::Idle && v.assigned_channel == ch as i8 && v.note == note {
                v.env.note_off_received = true;
                if !hold {
                    v.env.state = EnvPhase::Release;
                }
            }
        }
    }
}

impl Default for Synth {
    fn default() -> Synth {
        Synth::new()
    }
}
