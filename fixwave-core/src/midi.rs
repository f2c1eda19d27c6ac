//! MIDI message records and the transport-to-dispatcher queue.
//!
//! The transport parses raw status/data bytes into [`Message`] records and
//! pushes them onto a bounded lock-free queue; the dispatcher pops at most
//! one record per control pass. Head and tail advance on opposite sides of
//! the queue, so no locking is needed between the two contexts.

use crossbeam::queue::ArrayQueue;

use std::sync::Arc;

/// Capacity of the transport-to-dispatcher queue.
///
/// A push onto a full queue fails and the producer drops the newest
/// message; the consumer-side indices are never disturbed.
pub const QUEUE_SIZE: usize = 512;

/// Channel voice events, as the high nibble of the status byte.
pub mod event {
    pub const NOTE_OFF: u8 = 0x8;
    pub const NOTE_ON: u8 = 0x9;
    pub const POLY_PRESSURE: u8 = 0xA;
    pub const CONTROL_CHANGE: u8 = 0xB;
    pub const PROGRAM_CHANGE: u8 = 0xC;
    pub const CHANNEL_PRESSURE: u8 = 0xD;
    pub const PITCH_BEND: u8 = 0xE;
}

/// System messages, as the full status byte.
pub mod system {
    pub const SYS_EX_START: u8 = 0xF0;
    pub const MTC: u8 = 0xF1;
    pub const SONG_POSITION: u8 = 0xF2;
    pub const SONG_SELECT: u8 = 0xF3;
    pub const TUNE_REQUEST: u8 = 0xF6;
    pub const SYS_EX_END: u8 = 0xF7;
    pub const TIMING_CLOCK: u8 = 0xF8;
    pub const START: u8 = 0xFA;
    pub const CONTINUE: u8 = 0xFB;
    pub const STOP: u8 = 0xFC;
    pub const ACTIVE_SENSING: u8 = 0xFE;
    pub const RESET: u8 = 0xFF;
}

/// One parsed MIDI message.
///
/// For channel voice messages `event` holds the status high nibble and
/// `ch` the low nibble. For system messages (status >= 0xF0) `event` holds
/// the full status byte and `ch` is meaningless; handlers must not key off
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub ch: u8,
    pub event: u8,
    pub data: [u8; 3],
}

impl Message {
    /// Decodes a raw three-byte packet. Unused trailing bytes are zero.
    pub fn decode(raw: [u8; 3]) -> Message {
        let status = raw[0];
        Message {
            ch: status & 0x0F,
            event: if status >= 0xF0 {
                status
            } else {
                (status >> 4) & 0x0F
            },
            data: raw,
        }
    }
}

/// The bounded message queue shared by transport and dispatcher.
pub type MidiQueue = Arc<ArrayQueue<Message>>;

pub fn new_queue() -> MidiQueue {
    Arc::new(ArrayQueue::new(QUEUE_SIZE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_channel_voice_message() {
        let m = Message::decode([0x93, 60, 100]);
        assert_eq!(m.ch, 3);
        assert_eq!(m.event, event::NOTE_ON);
        assert_eq!(m.data, [0x93, 60, 100]);
    }

    #[test]
    fn decode_system_message_keeps_full_status() {
        let m = Message::decode([system::RESET, 0, 0]);
        assert_eq!(m.event, system::RESET);

        let m = Message::decode([system::STOP, 0, 0]);
        assert_eq!(m.event, system::STOP);
    }

    #[test]
    fn queue_is_bounded_and_drops_newest() {
        let q = new_queue();
        for i in 0..QUEUE_SIZE {
            assert!(q.push(Message::decode([0x80, i as u8, 0])).is_ok());
        }
        // The 513th push is rejected and handed back to the caller.
        assert!(q.push(Message::decode([0x80, 0, 0])).is_err());
        assert_eq!(q.len(), QUEUE_SIZE);
    }
}
