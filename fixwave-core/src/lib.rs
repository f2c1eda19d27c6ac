//! Core of a polyphonic, multi-timbral MIDI synthesizer rendering stereo
//! Q15 audio one frame at a time.
//!
//! The crate is split along the two execution contexts it is designed for:
//!
//! * the **render context** calls [`synth::Synth::render_frame`] once per
//!   sample period and must never block, allocate, or fail;
//! * the **control context** feeds parsed MIDI messages into the queue
//!   returned by [`synth::Synth::midi_queue`] and pumps
//!   [`synth::Synth::dispatch_one`].
//!
//! All state lives inside one owned [`synth::Synth`] value; there are no
//! globals. Fixed-point primitives are in [`fp`], read-only lookup surfaces
//! in [`tables`], timbre descriptors in [`tone`].

pub mod error;
pub mod fp;
pub mod midi;
pub mod synth;
pub mod tables;
pub mod tone;

pub use error::SynthError;
pub use fp::Stereo;
pub use midi::Message;
pub use synth::{Config, Synth};

/// Default output sample rate in Hz.
pub const FS: u32 = 40_000;

/// Number of simultaneously sounding voices.
pub const MAX_VOICE_NUM: usize = 20;

/// Number of MIDI channels.
pub const MAX_CHANNEL_NUM: usize = 16;

/// Length of every oscillator wave table. Must be a power of two so that
/// read pointers can wrap by masking.
pub const TABLE_LENGTH: usize = 256;
