//! NXDN trunking control signaling: RCCH message scheduling, mirroring the
//! DMR/P25 grant/release/touch flow (spec.md §4.5 "Trunking control
//! (ControlSignaling)").

use std::collections::VecDeque;

use crate::rpc::{IccHandler, IccRequest};

const NORMAL_QUEUE_CAPACITY: usize = 32;
const IMMEDIATE_QUEUE_CAPACITY: usize = 8;

/// RCCH (Radio Control Channel) message kinds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rcch {
    ChannelAccessStep { site_id: u16 },
    SiteInfo,
    VoiceCallGrant { src_id: u32, dst_id: u32, channel_no: u16 },
    DataCallGrant { src_id: u32, dst_id: u32, channel_no: u16 },
    CallRelease { dst_id: u32 },
    RegistrationResponse { src_id: u32, accepted: bool },
    Ack { dst_id: u32 },
    Nak { dst_id: u32, denial_reason: u8 },
}

/// RCCH CSBK-equivalent scheduler: a bounded normal queue for periodic
/// site announcements and a bounded immediate queue for on-demand
/// grant/release traffic, matching the same two-queue shape as the DMR and
/// P25 control-channel schedulers.
pub struct ControlSignaling {
    normal_queue: VecDeque<Rcch>,
    immediate_queue: VecDeque<Rcch>,
    site_id: u16,
    rotation_index: usize,
}

const ROTATION_LEN: usize = 2;

impl ControlSignaling {
    pub fn new(site_id: u16) -> Self {
        Self {
            normal_queue: VecDeque::new(),
            immediate_queue: VecDeque::new(),
            site_id,
            rotation_index: 0,
        }
    }

    fn push_normal(&mut self, rcch: Rcch) -> bool {
        if self.normal_queue.len() >= NORMAL_QUEUE_CAPACITY {
            return false;
        }
        self.normal_queue.push_back(rcch);
        true
    }

    fn push_immediate(&mut self, rcch: Rcch) -> bool {
        if self.immediate_queue.len() >= IMMEDIATE_QUEUE_CAPACITY {
            return false;
        }
        self.immediate_queue.push_back(rcch);
        true
    }

    pub fn tick(&mut self) {
        let rcch = match self.rotation_index {
            0 => Rcch::ChannelAccessStep { site_id: self.site_id },
            _ => Rcch::SiteInfo,
        };
        self.rotation_index = (self.rotation_index + 1) % ROTATION_LEN;
        self.push_normal(rcch);
    }

    pub fn grant(
        &mut self,
        src_id: u32,
        dst_id: u32,
        channel_no: u16,
        data: bool,
        icc: &mut dyn IccHandler,
    ) -> bool {
        let rcch = if data {
            Rcch::DataCallGrant { src_id, dst_id, channel_no }
        } else {
            Rcch::VoiceCallGrant { src_id, dst_id, channel_no }
        };
        let queued = self.push_immediate(rcch);
        if queued {
            icc.handle(IccRequest::PermitTg { dst_id, slot: None });
        }
        queued
    }

    /// Releases an active call, mirroring the grant path's RPC notify
    /// (spec.md: "general grant/release/touch flow mirroring DMR/P25").
    pub fn release(&mut self, dst_id: u32, icc: &mut dyn IccHandler) -> bool {
        let queued = self.push_immediate(Rcch::CallRelease { dst_id });
        if queued {
            icc.handle(IccRequest::ReleaseGrant { dst_id });
        }
        queued
    }

    pub fn touch(&mut self, dst_id: u32, icc: &mut dyn IccHandler) {
        icc.handle(IccRequest::TouchGrant { dst_id });
    }

    pub fn registration_response(&mut self, src_id: u32, accepted: bool) -> bool {
        self.push_immediate(Rcch::RegistrationResponse { src_id, accepted })
    }

    pub fn ack(&mut self, dst_id: u32) -> bool {
        self.push_immediate(Rcch::Ack { dst_id })
    }

    pub fn deny(&mut self, dst_id: u32, reason: u8) -> bool {
        self.push_immediate(Rcch::Nak { dst_id, denial_reason: reason })
    }

    pub fn drain_next(&mut self) -> Option<Rcch> {
        self.immediate_queue.pop_front().or_else(|| self.normal_queue.pop_front())
    }

    pub fn normal_len(&self) -> usize {
        self.normal_queue.len()
    }

    pub fn immediate_len(&self) -> usize {
        self.immediate_queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::IccResponse;

    struct NullIcc;
    impl IccHandler for NullIcc {
        fn handle(&mut self, _request: IccRequest) -> IccResponse {
            IccResponse::Ok
        }
    }

    #[test]
    fn rotation_cycles_site_announcements() {
        let mut cs = ControlSignaling::new(3);
        cs.tick();
        assert_eq!(cs.drain_next(), Some(Rcch::ChannelAccessStep { site_id: 3 }));
        cs.tick();
        assert_eq!(cs.drain_next(), Some(Rcch::SiteInfo));
    }

    #[test]
    fn grant_then_release_round_trip() {
        let mut cs = ControlSignaling::new(3);
        let mut icc = NullIcc;
        assert!(cs.grant(1, 200, 5, false, &mut icc));
        assert_eq!(cs.drain_next(), Some(Rcch::VoiceCallGrant { src_id: 1, dst_id: 200, channel_no: 5 }));
        assert!(cs.release(200, &mut icc));
        assert_eq!(cs.drain_next(), Some(Rcch::CallRelease { dst_id: 200 }));
    }

    #[test]
    fn immediate_queue_drops_when_full() {
        let mut cs = ControlSignaling::new(3);
        let mut icc = NullIcc;
        for i in 0..100 {
            cs.grant(0, i, 1, false, &mut icc);
        }
        assert!(cs.immediate_len() <= IMMEDIATE_QUEUE_CAPACITY);
    }
}
