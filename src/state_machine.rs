//! The RF/Net state machine shared by the DMR, P25, and NXDN controllers
//! (spec.md §4 "State machines (summary)"): `LISTENING -> AUDIO|DATA ->
//! LISTENING` on EOT/TDU or frame-loss watchdog expiry, with a distinct
//! `REJECTED` state entered only by an explicit controller reject.

use crate::rpc::{IccHandler, IccRequest};

/// Per-channel RF-facing state (spec.md §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RfState {
    Listening,
    Audio,
    Data,
    Rejected,
}

/// Per-channel network-facing state (spec.md §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetState {
    Idle,
    Audio,
    Data,
}

/// The affiliation for a granted talkgroup: at most one `(src, dst)` pair
/// may be active on a channel at a time (spec.md §3 invariant).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Grant {
    pub src_id: u32,
    pub dst_id: u32,
}

/// Common call bookkeeping for one logical RF channel: RF/Net state, the
/// current grant (if any), a consecutive frame-loss counter compared to a
/// threshold, and a talkgroup-hang timer. Shared by DMR per-slot, P25, and
/// NXDN controllers so the termination/teardown rule is implemented once.
pub struct ChannelState {
    pub rf_state: RfState,
    pub net_state: NetState,
    grant: Option<Grant>,
    lost_count: u32,
    loss_threshold: u32,
    hang_ms: u64,
    hang_timeout_ms: u64,
}

impl ChannelState {
    pub fn new(loss_threshold: u32, hang_timeout_ms: u64) -> Self {
        Self {
            rf_state: RfState::Listening,
            net_state: NetState::Idle,
            grant: None,
            lost_count: 0,
            loss_threshold,
            hang_ms: 0,
            hang_timeout_ms,
        }
    }

    pub fn grant(&self) -> Option<Grant> {
        self.grant
    }

    /// Begins a call: a sync/HDU (or equivalent) was recovered. Only takes
    /// effect from `LISTENING`; a call already in progress is left alone.
    pub fn begin_call(&mut self, src_id: u32, dst_id: u32, data: bool) {
        if self.rf_state != RfState::Listening {
            return;
        }
        self.rf_state = if data { RfState::Data } else { RfState::Audio };
        self.grant = Some(Grant { src_id, dst_id });
        self.lost_count = 0;
        self.hang_ms = 0;
    }

    /// One inbound frame arrived cleanly; resets the loss counter.
    pub fn note_frame(&mut self) {
        self.lost_count = 0;
    }

    /// One inbound frame was reported lost. Returns `true` exactly once,
    /// the tick the loss threshold is crossed — idempotent across further
    /// repeated "lost" indications once already past `LISTENING`
    /// (spec.md §3 invariant: "idempotent across repeated modem 'lost'
    /// indications").
    pub fn note_lost(&mut self) -> bool {
        if self.rf_state == RfState::Listening {
            return false;
        }
        self.lost_count += 1;
        if self.lost_count == self.loss_threshold {
            self.teardown();
            return true;
        }
        false
    }

    /// Explicit end-of-transmission (EOT/TDU): normal call teardown.
    pub fn end_of_transmission(&mut self) {
        if self.rf_state != RfState::Listening {
            self.teardown();
        }
    }

    /// Advances the talkgroup-hang timer; once it elapses with no grant
    /// renewal the channel returns to `LISTENING` as if by watchdog expiry.
    pub fn clock(&mut self, ms: u64) {
        if self.grant.is_some() {
            self.hang_ms += ms;
            if self.hang_ms >= self.hang_timeout_ms {
                self.teardown();
            }
        }
    }

    pub fn touch_hang(&mut self) {
        self.hang_ms = 0;
    }

    fn teardown(&mut self) {
        self.rf_state = RfState::Listening;
        self.net_state = NetState::Idle;
        self.grant = None;
        self.lost_count = 0;
        self.hang_ms = 0;
    }

    /// Forces `REJECTED`, e.g. via an ICC "reject traffic" request.
    pub fn reject(&mut self) {
        self.rf_state = RfState::Rejected;
        self.grant = None;
    }

    /// Clears an explicit reject back to `LISTENING` (only path out of
    /// `REJECTED` per spec.md's state diagram: "clear on CC path").
    pub fn clear_reject(&mut self) {
        if self.rf_state == RfState::Rejected {
            self.rf_state = RfState::Listening;
        }
    }
}

/// Releases a grant through the ICC facade exactly once per teardown,
/// matching spec.md §8's "exactly one grant-release per successful call
/// teardown" testable property. Call this from whichever path performed
/// the teardown (EOT, watchdog, or frame-loss) rather than duplicating the
/// release call at each site.
pub fn release_grant_once(grant: Option<Grant>, icc: &mut dyn IccHandler) {
    if let Some(grant) = grant {
        icc.handle(IccRequest::ReleaseGrant { dst_id: grant.dst_id });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::IccResponse;

    struct CountingIcc {
        releases: u32,
    }
    impl IccHandler for CountingIcc {
        fn handle(&mut self, request: IccRequest) -> IccResponse {
            if let IccRequest::ReleaseGrant { .. } = request {
                self.releases += 1;
            }
            IccResponse::Ok
        }
    }

    #[test]
    fn frame_loss_crosses_threshold_exactly_once() {
        let mut ch = ChannelState::new(4, 10_000);
        ch.begin_call(42, 100, false);
        assert!(!ch.note_lost());
        assert!(!ch.note_lost());
        assert!(!ch.note_lost());
        assert!(ch.note_lost());
        assert_eq!(ch.rf_state, RfState::Listening);
        assert!(!ch.note_lost());
    }

    #[test]
    fn teardown_releases_grant_exactly_once() {
        let mut ch = ChannelState::new(4, 10_000);
        ch.begin_call(42, 100, false);
        let grant = ch.grant();
        ch.end_of_transmission();
        let mut icc = CountingIcc { releases: 0 };
        release_grant_once(grant, &mut icc);
        release_grant_once(ch.grant(), &mut icc); // already None, no double release
        assert_eq!(icc.releases, 1);
    }

    #[test]
    fn hang_timeout_returns_to_listening() {
        let mut ch = ChannelState::new(4, 100);
        ch.begin_call(1, 2, false);
        ch.clock(60);
        assert_eq!(ch.rf_state, RfState::Audio);
        ch.clock(60);
        assert_eq!(ch.rf_state, RfState::Listening);
    }

    #[test]
    fn reject_only_cleared_explicitly() {
        let mut ch = ChannelState::new(4, 10_000);
        ch.reject();
        assert_eq!(ch.rf_state, RfState::Rejected);
        ch.begin_call(1, 2, false); // no effect outside LISTENING
        assert_eq!(ch.rf_state, RfState::Rejected);
        ch.clear_reject();
        assert_eq!(ch.rf_state, RfState::Listening);
    }
}
