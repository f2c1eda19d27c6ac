//! Timbre descriptors and the General MIDI preset bank.
//!
//! A [`Tone`] is copied into a voice at note-on; later changes to the
//! channel's tone never reach voices that are already sounding except
//! through the explicit refresh paths in the dispatcher.

/// Oscillator waveform selection. Dispatched by table lookup, one table
/// per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveType {
    Sin = 0,
    Squ = 1,
    Saw = 2,
    Tri = 3,
    Noise = 4,
}

pub const WAVE_TYPE_COUNT: usize = 5;

impl WaveType {
    /// Maps a 7-bit parameter value to a waveform. Values outside the
    /// defined set are rejected.
    pub fn from_index(v: u8) -> Option<WaveType> {
        match v {
            0 => Some(WaveType::Sin),
            1 => Some(WaveType::Squ),
            2 => Some(WaveType::Saw),
            3 => Some(WaveType::Tri),
            4 => Some(WaveType::Noise),
            _ => None,
        }
    }
}

/// Ring modulation parameters. Oscillator 2 runs at
/// `freq1 * (freq_rate + 1) / 32`; a rate of zero disables the modulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingMod {
    pub freq_rate: u8,
    pub gain: u8,
}

/// Envelope timing parameters, each 0..=127.
///
/// A time of zero means the corresponding segment completes immediately.
/// `sustain_rate` is the per-update decay applied while sustaining, so the
/// sustain segment always runs out eventually unless the rate is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvParams {
    pub attack_time: u8,
    pub decay_time: u8,
    pub sustain_level: u8,
    pub sustain_rate: u8,
    pub release_time: u8,
}

/// One timbre: waveform, ring modulation, envelope and output gain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tone {
    pub wave: WaveType,
    pub rm: RingMod,
    pub env: EnvParams,
    pub output_gain: u8,
}

impl Tone {
    const fn new(
        wave: WaveType,
        freq_rate: u8,
        rm_gain: u8,
        attack: u8,
        decay: u8,
        sustain_level: u8,
        sustain_rate: u8,
        release: u8,
        output_gain: u8,
    ) -> Tone {
        Tone {
            wave,
            rm: RingMod {
                freq_rate,
                gain: rm_gain,
            },
            env: EnvParams {
                attack_time: attack,
                decay_time: decay,
                sustain_level,
                sustain_rate,
                release_time: release,
            },
            output_gain,
        }
    }
}

/// Builds the 128-entry General MIDI tone bank.
///
/// The presets are grouped by the standard GM instrument families, eight
/// programs per family, with a shared archetype per family. The exact
/// values are voicing data, not behavior; program 0 keeps nonzero attack,
/// decay and release times so the default envelope exercises every
/// segment.
pub fn gm_bank() -> [Tone; 128] {
    use self::WaveType::*;

    let family: [Tone; 16] = [
        // 0..7 pianos
        Tone::new(Tri, 0, 0, 1, 40, 100, 1, 2, 100),
        // 8..15 chromatic percussion
        Tone::new(Sin, 15, 90, 1, 20, 60, 2, 4, 100),
        // 16..23 organs
        Tone::new(Sin, 0, 0, 2, 0, 127, 0, 3, 90),
        // 24..31 guitars
        Tone::new(Tri, 0, 0, 1, 30, 80, 2, 6, 95),
        // 32..39 basses
        Tone::new(Tri, 0, 0, 1, 35, 90, 1, 4, 110),
        // 40..47 strings
        Tone::new(Saw, 0, 0, 20, 60, 110, 0, 25, 85),
        // 48..55 ensemble
        Tone::new(Saw, 0, 0, 30, 70, 105, 0, 30, 80),
        // 56..63 brass
        Tone::new(Saw, 0, 0, 5, 45, 105, 0, 10, 100),
        // 64..71 reeds
        Tone::new(Squ, 0, 0, 8, 50, 100, 0, 12, 85),
        // 72..79 pipes
        Tone::new(Sin, 0, 0, 10, 55, 110, 0, 15, 90),
        // 80..87 synth leads
        Tone::new(Squ, 0, 0, 1, 40, 110, 0, 8, 100),
        // 88..95 synth pads
        Tone::new(Saw, 0, 0, 60, 80, 110, 0, 60, 75),
        // 96..103 synth effects
        Tone::new(Noise, 7, 64, 40, 60, 90, 1, 50, 70),
        // 104..111 ethnic
        Tone::new(Tri, 3, 40, 1, 30, 85, 2, 8, 90),
        // 112..119 percussive
        Tone::new(Noise, 0, 0, 0, 10, 40, 8, 3, 100),
        // 120..127 sound effects
        Tone::new(Noise, 31, 100, 15, 50, 80, 4, 20, 70),
    ];

    let mut bank = [family[0]; 128];
    for (program, tone) in bank.iter_mut().enumerate() {
        *tone = family[program / 8];
    }
    bank
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wave_type_from_index_rejects_out_of_range() {
        assert_eq!(WaveType::from_index(3), Some(WaveType::Tri));
        assert_eq!(WaveType::from_index(5), None);
        assert_eq!(WaveType::from_index(127), None);
    }

    #[test]
    fn gm_bank_program_zero_exercises_every_envelope_segment() {
        let bank = gm_bank();
        let env = bank[0].env;
        assert!(env.attack_time > 0);
        assert!(env.decay_time > 0);
        assert!(env.release_time > 0);
        assert!(env.sustain_level > 0);
    }

    #[test]
    fn gm_bank_is_grouped_by_family() {
        let bank = gm_bank();
        assert_eq!(bank[0], bank[7]);
        assert_ne!(bank[0], bank[40]);
        assert_eq!(bank[120], bank[127]);
    }
}
