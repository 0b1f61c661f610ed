//! DMR trunking control signaling: CSBK scheduling for a TSCC slot
//! (spec.md §4.4 "Trunking control (ControlSignaling)").

use std::collections::VecDeque;

use crate::rpc::{IccHandler, IccRequest};

const NORMAL_QUEUE_CAPACITY: usize = 32;
const IMMEDIATE_QUEUE_CAPACITY: usize = 8;

/// CSBK kinds a TSCC control slot schedules.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Csbk {
    Aloha,
    AnnWdBroadcast { site_id: u16 },
    SysParm,
    PayloadActivate { slot_no: u8, dst_id: u32 },
    PayloadClear { slot_no: u8 },
    VoiceGrant { src_id: u32, dst_id: u32, slot_no: u8 },
    DataGrant { src_id: u32, dst_id: u32, slot_no: u8 },
    RegistrationResponse { src_id: u32, accepted: bool },
    LateEntryGrant { dst_id: u32, slot_no: u8 },
    Ack { dst_id: u32 },
    Nak { dst_id: u32, denial_reason: u8 },
    GitHashIdentification { hash: [u8; 4] },
}

/// Denial reasons carried on a `Nak` CSBK.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenialReason {
    AclRejected,
    NoChannelAvailable,
    TalkgroupInactive,
    Unspecified,
}

impl DenialReason {
    pub fn to_byte(self) -> u8 {
        match self {
            DenialReason::AclRejected => 1,
            DenialReason::NoChannelAvailable => 2,
            DenialReason::TalkgroupInactive => 3,
            DenialReason::Unspecified => 0,
        }
    }
}

/// Periodic/on-demand CSBK scheduler for one TSCC slot. Shares the same
/// two-queue (bounded normal, bounded immediate) shape as the P25 control
/// channel scheduler (spec.md's trunking controllers share this pattern
/// across DMR/P25/NXDN).
pub struct ControlSignaling {
    normal_queue: VecDeque<Csbk>,
    immediate_queue: VecDeque<Csbk>,
    rotation_index: usize,
    site_id: u16,
    git_hash: [u8; 4],
    supervisor_authoritative: bool,
    source_id_check_enabled: bool,
}

const ROTATION_LEN: usize = 3;

impl ControlSignaling {
    pub fn new(site_id: u16, git_hash: [u8; 4]) -> Self {
        Self {
            normal_queue: VecDeque::new(),
            immediate_queue: VecDeque::new(),
            rotation_index: 0,
            site_id,
            git_hash,
            supervisor_authoritative: true,
            source_id_check_enabled: false,
        }
    }

    /// Whether this instance is the supervisor for grant decisions: a
    /// non-authoritative instance forwards grant requests upstream instead
    /// of deciding locally (spec.md §9: "non-authoritative/supervisor
    /// split").
    pub fn set_authoritative(&mut self, authoritative: bool) {
        self.supervisor_authoritative = authoritative;
    }

    pub fn is_authoritative(&self) -> bool {
        self.supervisor_authoritative
    }

    pub fn set_source_id_check_enabled(&mut self, enabled: bool) {
        self.source_id_check_enabled = enabled;
    }

    fn push_normal(&mut self, csbk: Csbk) -> bool {
        if self.normal_queue.len() >= NORMAL_QUEUE_CAPACITY {
            return false;
        }
        self.normal_queue.push_back(csbk);
        true
    }

    fn push_immediate(&mut self, csbk: Csbk) -> bool {
        if self.immediate_queue.len() >= IMMEDIATE_QUEUE_CAPACITY {
            return false;
        }
        self.immediate_queue.push_back(csbk);
        true
    }

    /// Advances the periodic rotation (Aloha, Ann-Wd, Sys-Parm) by one step.
    pub fn tick(&mut self) {
        let csbk = match self.rotation_index {
            0 => Csbk::Aloha,
            1 => Csbk::AnnWdBroadcast { site_id: self.site_id },
            _ => Csbk::SysParm,
        };
        self.rotation_index = (self.rotation_index + 1) % ROTATION_LEN;
        self.push_normal(csbk);
    }

    /// Emits the one-time git-hash identification CSBK (spec.md: "git-hash
    /// identification" — identifies the running build on the air).
    pub fn announce_identity(&mut self) -> bool {
        self.push_normal(Csbk::GitHashIdentification { hash: self.git_hash })
    }

    /// Requests a voice grant. If this slot is not the grant-decision
    /// authority, the request is forwarded to the ICC facade instead of
    /// being queued locally (spec.md §9).
    pub fn voice_grant(
        &mut self,
        src_id: u32,
        dst_id: u32,
        slot_no: u8,
        icc: &mut dyn IccHandler,
    ) -> bool {
        if !self.supervisor_authoritative {
            icc.handle(IccRequest::PermitTg { dst_id, slot: Some(slot_no) });
            return false;
        }
        let effective_src = if self.source_id_check_enabled { src_id } else { 0 };
        let queued = self.push_immediate(Csbk::VoiceGrant { src_id: effective_src, dst_id, slot_no });
        if queued {
            self.push_immediate(Csbk::PayloadActivate { slot_no, dst_id });
            icc.handle(IccRequest::PermitTg { dst_id, slot: Some(slot_no) });
        }
        queued
    }

    pub fn data_grant(&mut self, src_id: u32, dst_id: u32, slot_no: u8) -> bool {
        self.push_immediate(Csbk::DataGrant { src_id, dst_id, slot_no })
    }

    /// A grant recovered late (mid-call) rather than at HDU/voice-header.
    pub fn late_entry_grant(&mut self, dst_id: u32, slot_no: u8) -> bool {
        self.push_immediate(Csbk::LateEntryGrant { dst_id, slot_no })
    }

    pub fn registration_response(&mut self, src_id: u32, accepted: bool) -> bool {
        self.push_immediate(Csbk::RegistrationResponse { src_id, accepted })
    }

    pub fn ack(&mut self, dst_id: u32) -> bool {
        self.push_immediate(Csbk::Ack { dst_id })
    }

    pub fn deny(&mut self, dst_id: u32, reason: DenialReason) -> bool {
        self.push_immediate(Csbk::Nak { dst_id, denial_reason: reason.to_byte() })
    }

    pub fn clear_payload(&mut self, slot_no: u8) -> bool {
        self.push_immediate(Csbk::PayloadClear { slot_no })
    }

    pub fn drain_next(&mut self) -> Option<Csbk> {
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
    fn rotation_cycles_aloha_annwd_sysparm() {
        let mut cs = ControlSignaling::new(7, [1, 2, 3, 4]);
        cs.tick();
        assert_eq!(cs.drain_next(), Some(Csbk::Aloha));
        cs.tick();
        assert_eq!(cs.drain_next(), Some(Csbk::AnnWdBroadcast { site_id: 7 }));
        cs.tick();
        assert_eq!(cs.drain_next(), Some(Csbk::SysParm));
    }

    #[test]
    fn voice_grant_queues_grant_then_payload_activate() {
        let mut cs = ControlSignaling::new(7, [0; 4]);
        let mut icc = NullIcc;
        assert!(cs.voice_grant(10, 200, 1, &mut icc));
        assert_eq!(cs.drain_next(), Some(Csbk::VoiceGrant { src_id: 0, dst_id: 200, slot_no: 1 }));
        assert_eq!(cs.drain_next(), Some(Csbk::PayloadActivate { slot_no: 1, dst_id: 200 }));
    }

    #[test]
    fn source_id_check_toggles_explicit_src() {
        let mut cs = ControlSignaling::new(7, [0; 4]);
        cs.set_source_id_check_enabled(true);
        let mut icc = NullIcc;
        cs.voice_grant(10, 200, 1, &mut icc);
        assert_eq!(cs.drain_next(), Some(Csbk::VoiceGrant { src_id: 10, dst_id: 200, slot_no: 1 }));
    }

    #[test]
    fn non_authoritative_forwards_instead_of_queuing() {
        let mut cs = ControlSignaling::new(7, [0; 4]);
        cs.set_authoritative(false);
        let mut icc = NullIcc;
        let queued = cs.voice_grant(10, 200, 1, &mut icc);
        assert!(!queued);
        assert_eq!(cs.drain_next(), None);
    }

    #[test]
    fn git_hash_identification_is_one_shot_on_demand() {
        let mut cs = ControlSignaling::new(7, [0xDE, 0xAD, 0xBE, 0xEF]);
        assert!(cs.announce_identity());
        assert_eq!(
            cs.drain_next(),
            Some(Csbk::GitHashIdentification { hash: [0xDE, 0xAD, 0xBE, 0xEF] })
        );
    }
}
