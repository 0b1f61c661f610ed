//! P25 trunking control signaling: the control-channel TSBK scheduler
//! (spec.md §4.3 "Trunking control (ControlSignaling)").

use std::collections::{HashMap, VecDeque};

use crate::rpc::{IccHandler, IccRequest};

const NORMAL_QUEUE_CAPACITY: usize = 32;
const IMMEDIATE_QUEUE_CAPACITY: usize = 8;

/// TSBK kinds this scheduler emits. Payload bytes for the wire encoding of
/// each kind are out of scope here (spec.md §1 names the trellis/Golay
/// layer as an external collaborator); this models the scheduling and
/// dispatch logic around them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Tsbk {
    Aloha,
    IdentityUpdate { iden_id: u8 },
    SystemServiceBroadcast,
    AdjacentSiteBroadcast { site_id: u8 },
    Sccb { channel_no: u16 },
    Grant { src_id: u32, dst_id: u32, channel_no: u16 },
    GroupAck { dst_id: u32 },
    GroupNak { dst_id: u32, denial_reason: u8 },
}

/// The rotation of periodic CC announcements, advanced one step per
/// scheduler tick (spec.md: "Periodic CC packet scheduler emits TSBKs in a
/// rotation that includes Aloha/identity/system announcements...").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RotationStep {
    Aloha,
    Identity,
    SystemService,
    AdjacentSites,
    Sccb,
}

const ROTATION: [RotationStep; 5] = [
    RotationStep::Aloha,
    RotationStep::Identity,
    RotationStep::SystemService,
    RotationStep::AdjacentSites,
    RotationStep::Sccb,
];

/// An adjacent site's broadcast entry, expiring if not refreshed.
struct AdjacentSite {
    remaining_ticks: u32,
}

/// Emits periodic CC TSBKs and accepts on-demand grant requests, sorting
/// outbound traffic into a bounded "normal" queue (drop-on-full) and a
/// bounded "immediate" priority queue.
pub struct ControlSignaling {
    normal_queue: VecDeque<Tsbk>,
    immediate_queue: VecDeque<Tsbk>,
    rotation_index: usize,
    iden_id: u8,
    adjacent_sites: HashMap<u8, AdjacentSite>,
    adjacent_site_expiry_ticks: u32,
    source_id_grants_enabled: bool,
}

impl ControlSignaling {
    pub fn new(iden_id: u8, adjacent_site_expiry_ticks: u32) -> Self {
        Self {
            normal_queue: VecDeque::new(),
            immediate_queue: VecDeque::new(),
            rotation_index: 0,
            iden_id,
            adjacent_sites: HashMap::new(),
            adjacent_site_expiry_ticks,
            source_id_grants_enabled: false,
        }
    }

    pub fn set_source_id_grants_enabled(&mut self, enabled: bool) {
        self.source_id_grants_enabled = enabled;
    }

    fn push_normal(&mut self, tsbk: Tsbk) -> bool {
        if self.normal_queue.len() >= NORMAL_QUEUE_CAPACITY {
            return false;
        }
        self.normal_queue.push_back(tsbk);
        true
    }

    fn push_immediate(&mut self, tsbk: Tsbk) -> bool {
        if self.immediate_queue.len() >= IMMEDIATE_QUEUE_CAPACITY {
            return false;
        }
        self.immediate_queue.push_back(tsbk);
        true
    }

    /// Registers (or refreshes) an adjacent site broadcast.
    pub fn note_adjacent_site(&mut self, site_id: u8) {
        self.adjacent_sites.insert(
            site_id,
            AdjacentSite {
                remaining_ticks: self.adjacent_site_expiry_ticks,
            },
        );
    }

    /// Advances the periodic rotation by one step, queuing the next
    /// announcement, and ages out expired adjacent-site entries.
    pub fn tick(&mut self) {
        self.adjacent_sites.retain(|_, site| {
            site.remaining_ticks = site.remaining_ticks.saturating_sub(1);
            site.remaining_ticks > 0
        });

        let step = ROTATION[self.rotation_index];
        self.rotation_index = (self.rotation_index + 1) % ROTATION.len();

        let tsbk = match step {
            RotationStep::Aloha => Some(Tsbk::Aloha),
            RotationStep::Identity => Some(Tsbk::IdentityUpdate { iden_id: self.iden_id }),
            RotationStep::SystemService => Some(Tsbk::SystemServiceBroadcast),
            RotationStep::AdjacentSites => self
                .adjacent_sites
                .keys()
                .next()
                .copied()
                .map(|site_id| Tsbk::AdjacentSiteBroadcast { site_id }),
            RotationStep::Sccb => None, // only emitted when a secondary CC is configured
        };
        if let Some(tsbk) = tsbk {
            self.push_normal(tsbk);
        }
    }

    /// Requests a voice (or data) grant: writes a `Grant` TSBK on the CC and
    /// notifies the target voice channel via the ICC facade to activate its
    /// payload slot (spec.md: "Grant responses write a Grant TSBK on the CC
    /// plus a PayloadActivate on the voice channel, and notify that voice
    /// channel by RPC").
    pub fn grant(
        &mut self,
        src_id: u32,
        dst_id: u32,
        channel_no: u16,
        icc: &mut dyn IccHandler,
    ) -> bool {
        if !self.source_id_grants_enabled && src_id != 0 {
            // Explicit source-ID grants are opt-in; a non-zero src_id is
            // dropped to a group grant (src_id = 0) unless enabled.
            return self.queue_grant(0, dst_id, channel_no, icc);
        }
        self.queue_grant(src_id, dst_id, channel_no, icc)
    }

    fn queue_grant(&mut self, src_id: u32, dst_id: u32, channel_no: u16, icc: &mut dyn IccHandler) -> bool {
        let queued = self.push_immediate(Tsbk::Grant { src_id, dst_id, channel_no });
        if queued {
            icc.handle(IccRequest::PermitTg { dst_id, slot: None });
        }
        queued
    }

    pub fn deny(&mut self, dst_id: u32, reason: u8) -> bool {
        self.push_immediate(Tsbk::GroupNak { dst_id, denial_reason: reason })
    }

    /// Drains the immediate queue first, then the normal queue, matching
    /// the priority the two-queue design exists to express.
    pub fn drain_next(&mut self) -> Option<Tsbk> {
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
    fn rotation_cycles_through_all_steps() {
        let mut cs = ControlSignaling::new(1, 10);
        cs.tick(); // Aloha
        cs.tick(); // Identity
        cs.tick(); // SystemService
        cs.tick(); // AdjacentSites (none registered, no-op)
        cs.tick(); // Sccb (no-op, unconfigured)
        assert_eq!(cs.normal_len(), 3);
    }

    #[test]
    fn normal_queue_drops_when_full() {
        let mut cs = ControlSignaling::new(1, 10);
        for _ in 0..100 {
            cs.tick();
        }
        assert!(cs.normal_len() <= NORMAL_QUEUE_CAPACITY);
    }

    #[test]
    fn immediate_queue_drains_before_normal() {
        let mut cs = ControlSignaling::new(1, 10);
        cs.tick();
        let mut icc = NullIcc;
        cs.grant(0, 200, 1, &mut icc);
        assert_eq!(cs.drain_next(), Some(Tsbk::Grant { src_id: 0, dst_id: 200, channel_no: 1 }));
    }

    #[test]
    fn source_id_grant_requires_opt_in() {
        let mut cs = ControlSignaling::new(1, 10);
        let mut icc = NullIcc;
        cs.grant(42, 200, 1, &mut icc);
        assert_eq!(cs.drain_next(), Some(Tsbk::Grant { src_id: 0, dst_id: 200, channel_no: 1 }));

        cs.set_source_id_grants_enabled(true);
        cs.grant(42, 200, 1, &mut icc);
        assert_eq!(cs.drain_next(), Some(Tsbk::Grant { src_id: 42, dst_id: 200, channel_no: 1 }));
    }

    #[test]
    fn adjacent_site_expires_after_configured_ticks() {
        let mut cs = ControlSignaling::new(1, 1);
        cs.note_adjacent_site(5);
        assert!(cs.adjacent_sites.contains_key(&5));
        cs.tick();
        assert!(!cs.adjacent_sites.contains_key(&5));
    }
}
