use failure::Fail;

/// Errors surfaced at construction and configuration boundaries.
///
/// The render and dispatch paths never fail: out-of-range MIDI arguments
/// are clamped or ignored where they are handled.
#[derive(Debug, Fail, PartialEq, Eq)]
pub enum SynthError {
    #[fail(display = "invalid sample rate: {} Hz", _0)]
    InvalidSampleRate(u32),

    #[fail(display = "envelope update period must be nonzero")]
    InvalidEnvelopePeriod,

    #[fail(display = "PCM note {} outside the drum map {}..={}", _0, _1, _2)]
    PcmNoteOutOfRange(u8, u8, u8),
}
