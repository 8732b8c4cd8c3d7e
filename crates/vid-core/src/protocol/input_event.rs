//! Codec for Linux evdev `struct input_event` records.
//!
//! Wire format (native endianness, as laid out by the kernel):
//! ```text
//! [tv_sec:word][tv_usec:word][type:2][code:2][value:4]
//! ```
//! `word` is the platform's `unsigned long`: 8 bytes on 64-bit targets
//! (24-byte records) and 4 bytes on 32-bit targets (16-byte records).
//!
//! # Short reads
//!
//! The kernel always returns whole records, but a caller passing a short
//! buffer, a device node that is not an event device, or a read interrupted
//! part-way can produce fewer bytes.  [`InputEventRecord::decode`] refuses to
//! guess and returns [`RecordError::Short`].

use std::mem::size_of;

use thiserror::Error;

use crate::keymap::EV_KEY;

/// Width of each `timeval` field in the record.
const TIME_FIELD_SIZE: usize = size_of::<usize>();

/// Size in bytes of one `struct input_event` on this target.
pub const INPUT_EVENT_SIZE: usize = 2 * TIME_FIELD_SIZE + 8;

/// Errors that can occur while decoding an input record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    /// Fewer bytes than one full record were supplied.
    #[error("short input record: got {got} bytes, expected {expected}")]
    Short { got: usize, expected: usize },
}

/// One decoded evdev event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputEventRecord {
    pub seconds: i64,
    pub microseconds: i64,
    /// Event type (`EV_KEY`, `EV_SYN`, ...).
    pub kind: u16,
    pub code: u16,
    /// For keys: 0 = release, 1 = press, 2 = autorepeat.
    pub value: i32,
}

impl InputEventRecord {
    /// Builds a key event with a zero timestamp.
    pub fn key(code: u16, value: i32) -> Self {
        Self {
            kind: EV_KEY,
            code,
            value,
            ..Self::default()
        }
    }

    /// Returns `true` for `EV_KEY` events.
    pub fn is_key(&self) -> bool {
        self.kind == EV_KEY
    }

    /// Decodes the first record in `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Short`] if `bytes` holds less than
    /// [`INPUT_EVENT_SIZE`] bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() < INPUT_EVENT_SIZE {
            return Err(RecordError::Short {
                got: bytes.len(),
                expected: INPUT_EVENT_SIZE,
            });
        }

        let seconds = read_word(&bytes[..TIME_FIELD_SIZE]);
        let microseconds = read_word(&bytes[TIME_FIELD_SIZE..2 * TIME_FIELD_SIZE]);
        let tail = &bytes[2 * TIME_FIELD_SIZE..INPUT_EVENT_SIZE];

        Ok(Self {
            seconds,
            microseconds,
            kind: u16::from_ne_bytes([tail[0], tail[1]]),
            code: u16::from_ne_bytes([tail[2], tail[3]]),
            value: i32::from_ne_bytes([tail[4], tail[5], tail[6], tail[7]]),
        })
    }

    /// Encodes the record in the kernel layout.
    ///
    /// Used by test doubles that emulate an event device.
    pub fn encode(&self) -> [u8; INPUT_EVENT_SIZE] {
        let mut buf = [0u8; INPUT_EVENT_SIZE];
        write_word(&mut buf[..TIME_FIELD_SIZE], self.seconds);
        write_word(&mut buf[TIME_FIELD_SIZE..2 * TIME_FIELD_SIZE], self.microseconds);
        let tail = &mut buf[2 * TIME_FIELD_SIZE..];
        tail[0..2].copy_from_slice(&self.kind.to_ne_bytes());
        tail[2..4].copy_from_slice(&self.code.to_ne_bytes());
        tail[4..8].copy_from_slice(&self.value.to_ne_bytes());
        buf
    }
}

fn read_word(bytes: &[u8]) -> i64 {
    let mut word = [0u8; TIME_FIELD_SIZE];
    word.copy_from_slice(bytes);
    isize::from_ne_bytes(word) as i64
}

fn write_word(out: &mut [u8], value: i64) {
    out.copy_from_slice(&(value as isize).to_ne_bytes());
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::{EV_SYN, KEY_F4};

    #[test]
    fn test_record_size_matches_target_word_size() {
        #[cfg(target_pointer_width = "64")]
        assert_eq!(INPUT_EVENT_SIZE, 24);
        #[cfg(target_pointer_width = "32")]
        assert_eq!(INPUT_EVENT_SIZE, 16);
    }

    #[test]
    fn test_decode_reads_type_code_value_after_timestamp() {
        // Arrange
        let mut bytes = vec![0u8; INPUT_EVENT_SIZE];
        let tail = 2 * TIME_FIELD_SIZE;
        bytes[tail..tail + 2].copy_from_slice(&EV_KEY.to_ne_bytes());
        bytes[tail + 2..tail + 4].copy_from_slice(&KEY_F4.to_ne_bytes());
        bytes[tail + 4..tail + 8].copy_from_slice(&1i32.to_ne_bytes());

        // Act
        let record = InputEventRecord::decode(&bytes).expect("full record");

        // Assert
        assert_eq!(record.kind, EV_KEY);
        assert_eq!(record.code, KEY_F4);
        assert_eq!(record.value, 1);
        assert!(record.is_key());
    }

    #[test]
    fn test_decode_rejects_short_buffer() {
        let bytes = vec![0u8; INPUT_EVENT_SIZE - 1];
        assert_eq!(
            InputEventRecord::decode(&bytes),
            Err(RecordError::Short {
                got: INPUT_EVENT_SIZE - 1,
                expected: INPUT_EVENT_SIZE
            })
        );
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let record = InputEventRecord::key(KEY_F4, 1);
        let mut bytes = record.encode().to_vec();
        bytes.extend_from_slice(&[0xFF; 5]);

        assert_eq!(InputEventRecord::decode(&bytes), Ok(record));
    }

    #[test]
    fn test_encoded_timestamp_survives_decode() {
        let record = InputEventRecord {
            seconds: 1_700_000_000,
            microseconds: 999_999,
            kind: EV_SYN,
            code: 0,
            value: 0,
        };

        let decoded = InputEventRecord::decode(&record.encode()).unwrap();

        assert_eq!(decoded.seconds, 1_700_000_000);
        assert_eq!(decoded.microseconds, 999_999);
        assert!(!decoded.is_key());
    }
}
