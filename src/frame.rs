//! The modem wire envelope: `START | LEN | TYPE | PAYLOAD`, in its short and
//! long variants.
//!
//! Short frames cover payloads up to [`SHORT_MAX_PAYLOAD`] bytes (251); at
//! that point the single-byte `LEN` field (`payload.len() + 3` overhead
//! bytes) would reach the reserved value `0xFF`, so anything larger switches
//! to the long variant, which carries a two-byte big-endian `LEN` instead.
//! This is the resolution recorded in `DESIGN.md` for the boundary implied
//! by spec.md §8's testable scenarios (251 bytes short, 252 bytes long).

/// Start byte for a short frame.
pub const SHORT_START: u8 = 0xFE;
/// Start byte for a long frame (distinct from [`SHORT_START`] per spec.md §3).
pub const LONG_START: u8 = 0xFD;

/// Largest payload a short frame can carry before its `LEN` byte would need
/// to encode a reserved value.
pub const SHORT_MAX_PAYLOAD: usize = 251;

/// Overhead bytes in a short frame: start, len, type.
pub const SHORT_OVERHEAD: usize = 3;
/// Overhead bytes in a long frame: start, len-hi, len-lo, type.
pub const LONG_OVERHEAD: usize = 4;

/// Errors while decoding a framed message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameError {
    /// The start byte was neither [`SHORT_START`] nor [`LONG_START`].
    BadStart(u8),
    /// A short frame claimed a length `>= 0xFF`, which is only legal on a
    /// long frame.
    LengthNotLongEligible,
    /// The declared `LEN` is smaller than the envelope's own overhead, or
    /// `buf` does not yet hold that many bytes. Garbage following a
    /// resync can produce this; the caller treats it as a dropped frame
    /// and stays resynced rather than panicking on a reversed slice range.
    TooShort(usize),
}

/// Encodes `payload` tagged with `frame_type` into the appropriate envelope
/// variant, choosing short framing when possible.
pub fn encode(frame_type: u8, payload: &[u8]) -> Vec<u8> {
    if payload.len() <= SHORT_MAX_PAYLOAD {
        let len = (payload.len() + SHORT_OVERHEAD) as u8;
        let mut out = Vec::with_capacity(payload.len() + SHORT_OVERHEAD);
        out.push(SHORT_START);
        out.push(len);
        out.push(frame_type);
        out.extend_from_slice(payload);
        out
    } else {
        let total = payload.len() + LONG_OVERHEAD;
        assert!(total <= u16::MAX as usize, "frame too large to encode");
        let total = total as u16;
        let mut out = Vec::with_capacity(payload.len() + LONG_OVERHEAD);
        out.push(LONG_START);
        out.push((total >> 8) as u8);
        out.push((total & 0xFF) as u8);
        out.push(frame_type);
        out.extend_from_slice(payload);
        out
    }
}

/// A fully decoded frame: its type byte and payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedFrame {
    pub frame_type: u8,
    pub payload: Vec<u8>,
}

/// Decodes one complete envelope from `buf`, returning the frame and the
/// number of bytes consumed. `buf` must contain at least one complete
/// frame; use the receive state machine in `modem::rx` to accumulate bytes
/// from a live stream one at a time instead of calling this on partial data.
pub fn decode(buf: &[u8]) -> Result<(DecodedFrame, usize), FrameError> {
    if buf.is_empty() {
        return Err(FrameError::BadStart(0));
    }
    match buf[0] {
        SHORT_START => {
            if buf.len() < SHORT_OVERHEAD {
                return Err(FrameError::TooShort(buf.len()));
            }
            let len = buf[1] as usize;
            if len >= 0xFF {
                return Err(FrameError::LengthNotLongEligible);
            }
            if len < SHORT_OVERHEAD || buf.len() < len {
                return Err(FrameError::TooShort(len));
            }
            let frame_type = buf[2];
            let payload = buf[SHORT_OVERHEAD..len].to_vec();
            Ok((DecodedFrame { frame_type, payload }, len))
        }
        LONG_START => {
            if buf.len() < SHORT_OVERHEAD {
                return Err(FrameError::TooShort(buf.len()));
            }
            let len = ((buf[1] as usize) << 8) | (buf[2] as usize);
            if len < LONG_OVERHEAD || buf.len() < len {
                return Err(FrameError::TooShort(len));
            }
            let frame_type = buf[3];
            let payload = buf[LONG_OVERHEAD..len].to_vec();
            Ok((DecodedFrame { frame_type, payload }, len))
        }
        other => Err(FrameError::BadStart(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_framing_at_251_bytes() {
        let payload = vec![0xAB; 251];
        let frame = encode(0x01, &payload);
        assert_eq!(frame[0], SHORT_START);
        let (decoded, consumed) = decode(&frame).unwrap();
        assert_eq!(decoded.payload, payload);
        assert_eq!(consumed, frame.len());
    }

    #[test]
    fn long_framing_at_252_bytes() {
        let payload = vec![0xCD; 252];
        let frame = encode(0x31, &payload);
        assert_eq!(frame[0], LONG_START);
        let (decoded, consumed) = decode(&frame).unwrap();
        assert_eq!(decoded.payload, payload);
        assert_eq!(decoded.frame_type, 0x31);
        assert_eq!(consumed, frame.len());
    }

    #[test]
    fn round_trip_sampled_lengths() {
        for &len in &[0usize, 1, 2, 3, 100, 250, 251, 252, 253, 500, 1000, 4096, 65000] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();
            let frame = encode(0x42, &payload);
            let (decoded, consumed) = decode(&frame).unwrap();
            assert_eq!(decoded.payload, payload, "length {len}");
            assert_eq!(consumed, frame.len(), "length {len}");
        }
    }

    #[test]
    fn bad_start_byte_is_rejected() {
        let buf = [0x00, 0x05, 0x01, 0, 0];
        assert_eq!(decode(&buf), Err(FrameError::BadStart(0x00)));
    }

    #[test]
    fn short_frame_with_undersized_len_is_rejected_not_panicking() {
        let buf = [SHORT_START, 0x01, 0x70];
        assert_eq!(decode(&buf), Err(FrameError::TooShort(1)));
    }

    #[test]
    fn long_frame_with_undersized_len_is_rejected_not_panicking() {
        let buf = [LONG_START, 0x00, 0x02, 0x70];
        assert_eq!(decode(&buf), Err(FrameError::TooShort(2)));
    }
}
