//! Wire framing for FNE traffic: an RTP header (version 2, SSRC = local peer
//! ID, monotonically increasing sequence) followed by an FNE sub-header
//! carrying `(function, subfunction, peer_id, stream_id)` (spec.md §4.2
//! "Wire framing").

/// A sentinel sequence value that marks end-of-call and resets per-stream
/// accounting, distinct from ordinary 16-bit wrap-around.
pub const END_OF_CALL_SEQ: u16 = 0xFFFF;

const RTP_HEADER_LEN: usize = 12;
const FNE_SUBHEADER_LEN: usize = 10;

/// The 12-byte RTP header fields this host actually varies; payload type and
/// timestamp are fixed per spec.md (voice/data framing carries its own
/// timing) so they are not separately modeled here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RtpHeader {
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

impl RtpHeader {
    pub fn encode(&self) -> [u8; RTP_HEADER_LEN] {
        let mut out = [0u8; RTP_HEADER_LEN];
        out[0] = 0x80; // version 2, no padding/extension/CSRC
        out[1] = 0x00; // marker=0, payload type 0 (opaque FNE payload)
        out[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        out[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        out[8..12].copy_from_slice(&self.ssrc.to_be_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < RTP_HEADER_LEN {
            return None;
        }
        Some(Self {
            sequence: u16::from_be_bytes([buf[2], buf[3]]),
            timestamp: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            ssrc: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        })
    }
}

/// FNE-specific routing carried immediately after the RTP header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FneSubHeader {
    pub function: u8,
    pub subfunction: u8,
    pub peer_id: u32,
    pub stream_id: u32,
}

impl FneSubHeader {
    pub fn encode(&self) -> [u8; FNE_SUBHEADER_LEN] {
        let mut out = [0u8; FNE_SUBHEADER_LEN];
        out[0] = self.function;
        out[1] = self.subfunction;
        out[2..6].copy_from_slice(&self.peer_id.to_be_bytes());
        out[6..10].copy_from_slice(&self.stream_id.to_be_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < FNE_SUBHEADER_LEN {
            return None;
        }
        Some(Self {
            function: buf[0],
            subfunction: buf[1],
            peer_id: u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]),
            stream_id: u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]),
        })
    }
}

/// A fully assembled FNE packet: RTP header, FNE sub-header, and payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FnePacket {
    pub rtp: RtpHeader,
    pub fne: FneSubHeader,
    pub payload: Vec<u8>,
}

impl FnePacket {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(RTP_HEADER_LEN + FNE_SUBHEADER_LEN + self.payload.len());
        out.extend_from_slice(&self.rtp.encode());
        out.extend_from_slice(&self.fne.encode());
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        let rtp = RtpHeader::decode(buf)?;
        let fne = FneSubHeader::decode(&buf[RTP_HEADER_LEN..])?;
        let payload = buf[RTP_HEADER_LEN + FNE_SUBHEADER_LEN..].to_vec();
        Some(Self { rtp, fne, payload })
    }
}

/// Tracks per-stream sequence state: tolerates a gap of exactly one (warns,
/// continues), and treats any other gap — or the end-of-call sentinel — as
/// a stream reset (spec.md §4.2 "Ordering and cancellation").
#[derive(Debug, Default)]
pub struct StreamSequencer {
    stream_id: u32,
    last_seq: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceOutcome {
    InOrder,
    SmallGap,
    Reset,
    EndOfCall,
}

impl StreamSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&mut self, stream_id: u32, seq: u16) -> SequenceOutcome {
        if seq == END_OF_CALL_SEQ {
            self.stream_id = 0;
            self.last_seq = None;
            return SequenceOutcome::EndOfCall;
        }
        if stream_id != self.stream_id {
            self.stream_id = stream_id;
            self.last_seq = Some(seq);
            return SequenceOutcome::Reset;
        }
        let outcome = match self.last_seq {
            None => SequenceOutcome::InOrder,
            Some(last) => match seq.wrapping_sub(last) {
                1 => SequenceOutcome::InOrder,
                2 => SequenceOutcome::SmallGap,
                _ => SequenceOutcome::Reset,
            },
        };
        self.last_seq = Some(seq);
        if outcome == SequenceOutcome::Reset {
            self.stream_id = stream_id;
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtp_header_round_trips() {
        let hdr = RtpHeader {
            sequence: 42,
            timestamp: 0xDEADBEEF,
            ssrc: 12345,
        };
        let encoded = hdr.encode();
        assert_eq!(RtpHeader::decode(&encoded).unwrap(), hdr);
    }

    #[test]
    fn fne_packet_round_trips() {
        let pkt = FnePacket {
            rtp: RtpHeader {
                sequence: 1,
                timestamp: 0,
                ssrc: 99,
            },
            fne: FneSubHeader {
                function: 0x52, // 'R'
                subfunction: 0x01,
                peer_id: 7,
                stream_id: 88,
            },
            payload: vec![1, 2, 3, 4],
        };
        let bytes = pkt.encode();
        assert_eq!(FnePacket::decode(&bytes).unwrap(), pkt);
    }

    #[test]
    fn single_gap_tolerated_larger_gap_resets() {
        let mut seq = StreamSequencer::new();
        assert_eq!(seq.accept(1, 0), SequenceOutcome::Reset);
        assert_eq!(seq.accept(1, 1), SequenceOutcome::InOrder);
        assert_eq!(seq.accept(1, 3), SequenceOutcome::SmallGap);
        assert_eq!(seq.accept(1, 10), SequenceOutcome::Reset);
    }

    #[test]
    fn end_of_call_sentinel_resets_stream() {
        let mut seq = StreamSequencer::new();
        seq.accept(1, 0);
        assert_eq!(seq.accept(1, END_OF_CALL_SEQ), SequenceOutcome::EndOfCall);
        assert_eq!(seq.accept(2, 0), SequenceOutcome::Reset);
    }
}
