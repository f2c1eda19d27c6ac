//! Schroeder reverberator: parallel comb filters feeding a series all-pass
//! chain, run independently on the left and right channels.

use crate::fp::{self, Fp, Stereo};

pub const COMB_FILTER_COUNT: usize = 2;
pub const ALLPASS_FILTER_COUNT: usize = 1;

/// Fixed capacities of the delay lines. Actual delay lengths are set per
/// line and must stay below these bounds.
pub const MAX_COMB_DELAY_SAMPLES: usize = 6_000;
pub const MAX_ALLPASS_DELAY_SAMPLES: usize = 800;

/// Mutually prime comb delays avoid coincident echo periods.
const COMB_DELAYS: [u16; COMB_FILTER_COUNT] = [1_103, 1_277];
const COMB_GAINS: [f32; COMB_FILTER_COUNT] = [0.77, 0.71];

const ALLPASS_DELAYS: [u16; ALLPASS_FILTER_COUNT] = [131];
const ALLPASS_GAINS: [f32; ALLPASS_FILTER_COUNT] = [0.6];

const DEFAULT_WET: f32 = 0.33;

pub struct Reverb {
    comb_l: [[Fp; MAX_COMB_DELAY_SAMPLES]; COMB_FILTER_COUNT],
    comb_r: [[Fp; MAX_COMB_DELAY_SAMPLES]; COMB_FILTER_COUNT],
    comb_delay: [u16; COMB_FILTER_COUNT],
    comb_gain: [Fp; COMB_FILTER_COUNT],
    comb_w: [u16; COMB_FILTER_COUNT],

    allpass_l: [[Fp; MAX_ALLPASS_DELAY_SAMPLES]; ALLPASS_FILTER_COUNT],
    allpass_r: [[Fp; MAX_ALLPASS_DELAY_SAMPLES]; ALLPASS_FILTER_COUNT],
    allpass_delay: [u16; ALLPASS_FILTER_COUNT],
    allpass_gain: [Fp; ALLPASS_FILTER_COUNT],
    allpass_w: [u16; ALLPASS_FILTER_COUNT],

    pub wet_level: Fp,
    pub dry_level: Fp,
}

impl Default for Reverb {
    fn default() -> Reverb {
        let mut r = Reverb {
            comb_l: [[0; MAX_COMB_DELAY_SAMPLES]; COMB_FILTER_COUNT],
            comb_r: [[0; MAX_COMB_DELAY_SAMPLES]; COMB_FILTER_COUNT],
            comb_delay: COMB_DELAYS,
            comb_gain: [0; COMB_FILTER_COUNT],
            comb_w: [0; COMB_FILTER_COUNT],

            allpass_l: [[0; MAX_ALLPASS_DELAY_SAMPLES]; ALLPASS_FILTER_COUNT],
            allpass_r: [[0; MAX_ALLPASS_DELAY_SAMPLES]; ALLPASS_FILTER_COUNT],
            allpass_delay: ALLPASS_DELAYS,
            allpass_gain: [0; ALLPASS_FILTER_COUNT],
            allpass_w: [0; ALLPASS_FILTER_COUNT],

            wet_level: 0,
            dry_level: 0,
        };
        for (gain, src) in r.comb_gain.iter_mut().zip(COMB_GAINS.iter()) {
            *gain = fp::from_f32(*src);
        }
        for (gain, src) in r.allpass_gain.iter_mut().zip(ALLPASS_GAINS.iter()) {
            *gain = fp::from_f32(*src);
        }
        r.wet_level = fp::from_f32(DEFAULT_WET);
        r.dry_level = fp::from_f32(1.0 - DEFAULT_WET);
        r
    }
}

impl Reverb {
    pub fn new() -> Reverb {
        Reverb::default()
    }

    /// Re-zeroes the delay lines and write pointers, keeping the configured
    /// delays, gains and wet/dry mix.
    pub fn clear(&mut self) {
        for line in self.comb_l.iter_mut().chain(self.comb_r.iter_mut()) {
            for s in line.iter_mut() {
                *s = 0;
            }
        }
        for line in self.allpass_l.iter_mut().chain(self.allpass_r.iter_mut()) {
            for s in line.iter_mut() {
                *s = 0;
            }
        }
        self.comb_w = [0; COMB_FILTER_COUNT];
        self.allpass_w = [0; ALLPASS_FILTER_COUNT];
    }

    /// Clears the delay lines and restores the default wet/dry mix.
    pub fn reset(&mut self) {
        self.clear();
        self.wet_level = fp::from_f32(DEFAULT_WET);
        self.dry_level = fp::from_f32(1.0 - DEFAULT_WET);
    }

    /// Sets the wet level from a 7-bit reverb-send value; 127 maps to 60%
    /// wet. Wet and dry stay complementary and clamped to [0, 1].
    pub fn set_send(&mut self, value: u8) {
        let wet = fp::from_f32((f32::from(value) / 127.0 * 0.6).max(0.0).min(1.0));
        self.wet_level = wet;
        self.dry_level = fp::saturate(i32::from(fp::MAX) - i32::from(wet));
    }

    /// Processes one stereo frame.
    pub fn process(&mut self, input: Stereo) -> Stereo {
        let mut comb_sum_l: i32 = 0;
        let mut comb_sum_r: i32 = 0;

        for i in 0..COMB_FILTER_COUNT {
            let delay = usize::from(self.comb_delay[i]);
            let w = usize::from(self.comb_w[i]);
            let r = (w + MAX_COMB_DELAY_SAMPLES - delay) % MAX_COMB_DELAY_SAMPLES;
            let gain = self.comb_gain[i];

            // y[n] = x[n] + g * y[n-M]
            let out_l = fp::saturate(
                i32::from(input.left) + i32::from(fp::mul(gain, self.comb_l[i][r])),
            );
            let out_r = fp::saturate(
                i32::from(input.right) + i32::from(fp::mul(gain, self.comb_r[i][r])),
            );

            self.comb_l[i][w] = out_l;
            self.comb_r[i][w] = out_r;
            comb_sum_l += i32::from(out_l);
            comb_sum_r += i32::from(out_r);

            self.comb_w[i] = ((w + 1) % MAX_COMB_DELAY_SAMPLES) as u16;
        }

        let mut stage_l = (comb_sum_l / COMB_FILTER_COUNT as i32) as Fp;
        let mut stage_r = (comb_sum_r / COMB_FILTER_COUNT as i32) as Fp;

        for i in 0..ALLPASS_FILTER_COUNT {
            let delay = usize::from(self.allpass_delay[i]);
            let w = usize::from(self.allpass_w[i]);
            let r = (w + MAX_ALLPASS_DELAY_SAMPLES - delay) % MAX_ALLPASS_DELAY_SAMPLES;
            let g = self.allpass_gain[i];

            // y[n] = d[n-M] + g*x[n]; d[n] = x[n] - g*y[n]
            let x_l = stage_l;
            let x_r = stage_r;
            let y_l = fp::saturate(i32::from(self.allpass_l[i][r]) + i32::from(fp::mul(g, x_l)));
            let y_r = fp::saturate(i32::from(self.allpass_r[i][r]) + i32::from(fp::mul(g, x_r)));

            self.allpass_l[i][w] = fp::saturate(i32::from(x_l) - i32::from(fp::mul(g, y_l)));
            self.allpass_r[i][w] = fp::saturate(i32::from(x_r) - i32::from(fp::mul(g, y_r)));

            stage_l = y_l;
            stage_r = y_r;

            self.allpass_w[i] = ((w + 1) % MAX_ALLPASS_DELAY_SAMPLES) as u16;
        }

        Stereo {
            left: fp::saturate(
                i32::from(fp::mul(input.left, self.dry_level))
                    + i32::from(fp::mul(stage_l, self.wet_level)),
            ),
            right: fp::saturate(
                i32::from(fp::mul(input.right, self.dry_level))
                    + i32::from(fp::mul(stage_r, self.wet_level)),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse_response(len: usize) -> Vec<Stereo> {
        let mut r = Reverb::new();
        r.wet_level = fp::MAX;
        r.dry_level = 0;

        let mut out = Vec::with_capacity(len);
        out.push(r.process(Stereo {
            left: 16_384,
            right: 16_384,
        }));
        for _ in 1..len {
            out.push(r.process(Stereo::SILENCE));
        }
        out
    }

    #[test]
    fn impulse_response_is_deterministic() {
        let a = impulse_response(4_000);
        let b = impulse_response(4_000);
        assert_eq!(a, b);
        assert!(a.iter().any(|s| s.left != 0));
    }

    #[test]
    fn comb_echo_appears_at_configured_delay() {
        let ir = impulse_response(1_400);
        // The direct path through the all-pass passes part of the impulse
        // immediately; the first comb echo returns after the shorter comb
        // delay.
        assert_ne!(ir[0].left, 0);
        assert_ne!(ir[1_103].left, 0);
    }

    #[test]
    fn dry_only_mix_is_a_near_identity() {
        let mut r = Reverb::new();
        r.set_send(0);
        assert_eq!(r.wet_level, 0);

        for x in [-20_000i16, -1, 0, 1, 12_345, 32_767] {
            let out = r.process(Stereo { left: x, right: x });
            // dry_level is 0.99997, one LSB below unity.
            assert!((i32::from(out.left) - i32::from(x)).abs() <= 1);
            assert!((i32::from(out.right) - i32::from(x)).abs() <= 1);
        }
    }

    #[test]
    fn send_levels_stay_complementary() {
        let mut r = Reverb::new();
        r.set_send(127);
        let wet = fp::to_f32(r.wet_level);
        let dry = fp::to_f32(r.dry_level);
        assert!((wet - 0.6).abs() < 0.01);
        assert!((wet + dry - 1.0).abs() < 0.01);

        r.set_send(64);
        assert!((fp::to_f32(r.wet_level) - 0.302).abs() < 0.01);
    }

    #[test]
    fn clear_resets_the_tail() {
        let mut r = Reverb::new();
        r.wet_level = fp::MAX;
        r.dry_level = 0;
        for _ in 0..2_000 {
            r.process(Stereo {
                left: 10_000,
                right: -10_000,
            });
        }
        r.clear();
        let out = r.process(Stereo::SILENCE);
        assert_eq!(out, Stereo::SILENCE);
    }
}
