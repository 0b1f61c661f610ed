//! The modem's byte-at-a-time receive state machine (spec.md §4.1).
//!
//! `START -> LEN1 -> [LEN2] -> TYPE -> DATA -> (dispatch) -> START`. An
//! invalid start byte silently resets to `START` (the stream is expected to
//! resync on its own); any read error upstream is handled by the caller
//! resetting this machine and consuming one tick, not by this type.

use crate::frame::{self, DecodedFrame, LONG_START, SHORT_START};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RxState {
    Start,
    Len1,
    Len2,
    Type,
    Data,
}

/// Accumulates bytes fed one at a time until a complete frame is available.
pub struct RxStateMachine {
    state: RxState,
    is_long: bool,
    total_len: usize,
    buffer: Vec<u8>,
}

impl Default for RxStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RxStateMachine {
    pub fn new() -> Self {
        Self {
            state: RxState::Start,
            is_long: false,
            total_len: 0,
            buffer: Vec::with_capacity(8),
        }
    }

    /// Resets to `START`, discarding any partially-accumulated frame. Used
    /// on a read error or inactivity reset (spec.md §4.1 "Error handling").
    pub fn reset(&mut self) {
        self.state = RxState::Start;
        self.is_long = false;
        self.total_len = 0;
        self.buffer.clear();
    }

    /// Feeds one byte from the wire. Returns `Some(frame)` exactly when a
    /// complete frame has just been assembled; the machine is reset to
    /// `START` immediately afterward so the next call starts a fresh frame.
    pub fn feed_byte(&mut self, byte: u8) -> Option<DecodedFrame> {
        match self.state {
            RxState::Start => {
                self.buffer.clear();
                match byte {
                    SHORT_START => {
                        self.is_long = false;
                        self.buffer.push(byte);
                        self.state = RxState::Len1;
                    }
                    LONG_START => {
                        self.is_long = true;
                        self.buffer.push(byte);
                        self.state = RxState::Len1;
                    }
                    _ => {
                        // Not a valid start byte; stay resynced, drop it silently.
                    }
                }
                None
            }
            RxState::Len1 => {
                self.buffer.push(byte);
                if self.is_long {
                    self.state = RxState::Len2;
                } else {
                    if byte as usize >= 0xFF {
                        // Length not legal on a short frame; resync.
                        self.reset();
                        return None;
                    }
                    self.total_len = byte as usize;
                    self.state = RxState::Type;
                }
                None
            }
            RxState::Len2 => {
                self.buffer.push(byte);
                let hi = self.buffer[1] as usize;
                let lo = byte as usize;
                self.total_len = (hi << 8) | lo;
                self.state = RxState::Type;
                None
            }
            RxState::Type => {
                self.buffer.push(byte);
                self.state = RxState::Data;
                self.maybe_complete()
            }
            RxState::Data => {
                self.buffer.push(byte);
                self.maybe_complete()
            }
        }
    }

    fn maybe_complete(&mut self) -> Option<DecodedFrame> {
        if self.buffer.len() >= self.total_len && self.total_len > 0 {
            let frame = frame::decode(&self.buffer).ok().map(|(f, _)| f);
            self.reset();
            frame
        } else {
            None
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == RxState::Start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode;

    fn feed_all(rx: &mut RxStateMachine, bytes: &[u8]) -> Vec<DecodedFrame> {
        let mut out = Vec::new();
        for &b in bytes {
            if let Some(f) = rx.feed_byte(b) {
                out.push(f);
            }
        }
        out
    }

    #[test]
    fn decodes_a_short_frame_fed_byte_by_byte() {
        let mut rx = RxStateMachine::new();
        let wire = encode(0x01, &[1, 2, 3]);
        let got = feed_all(&mut rx, &wire);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].frame_type, 0x01);
        assert_eq!(got[0].payload, vec![1, 2, 3]);
        assert!(rx.is_idle());
    }

    #[test]
    fn decodes_a_long_frame() {
        let mut rx = RxStateMachine::new();
        let payload = vec![0x11; 300];
        let wire = encode(0x31, &payload);
        let got = feed_all(&mut rx, &wire);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].payload, payload);
    }

    #[test]
    fn resyncs_silently_on_garbage_before_start() {
        let mut rx = RxStateMachine::new();
        let mut wire = vec![0x00, 0x11, 0x22];
        wire.extend(encode(0x70, &[0x01]));
        let got = feed_all(&mut rx, &wire);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].frame_type, 0x70);
    }

    #[test]
    fn undersized_short_len_resyncs_without_panicking() {
        let mut rx = RxStateMachine::new();
        let mut wire = vec![SHORT_START, 0x01, 0x70];
        wire.extend(encode(0x70, &[0x01]));
        let got = feed_all(&mut rx, &wire);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].frame_type, 0x70);
        assert_eq!(got[0].payload, vec![0x01]);
        assert!(rx.is_idle());
    }

    #[test]
    fn two_frames_back_to_back() {
        let mut rx = RxStateMachine::new();
        let mut wire = encode(0x70, &[1]);
        wire.extend(encode(0x7F, &[2]));
        let got = feed_all(&mut rx, &wire);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].payload, vec![1]);
        assert_eq!(got[1].payload, vec![2]);
    }
}
