//! The FNE peer session: login handshake, `RUNNING`-phase opcode handling,
//! and grant-demand forwarding (spec.md §4.2).

pub mod rtp;
pub mod transport;

use std::collections::VecDeque;

use log::{debug, info, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::NetworkConfig;
use crate::error::NetworkError;
use crate::ring::{FrameQueue, FrameTag};
use crate::rpc::{IccHandler, IccRequest};
use crate::timer::Timer;

use rtp::{FneSubHeader, FnePacket, RtpHeader, SequenceOutcome, StreamSequencer, END_OF_CALL_SEQ};
use transport::NetworkTransport;

const DEFAULT_RETRY_MS: u64 = 10_000;
const DEFAULT_IDLE_MS: u64 = 60_000;
const DEFAULT_PING_MS: u64 = 5_000;
const MAX_PUMP_ITERS: u32 = 64;

// FNE header `function` byte values.
const FUNC_RPTL: u8 = 0x01;
const FUNC_RPTK: u8 = 0x02;
const FUNC_RPTC: u8 = 0x03;
#[allow(dead_code)]
const FUNC_RPTP: u8 = 0x04;
const FUNC_RPTCL: u8 = 0x05;
const FUNC_ACK: u8 = 0x06;
const FUNC_NAK: u8 = 0x07;
const FUNC_PING: u8 = 0x08;
const FUNC_PONG: u8 = 0x09;
const FUNC_MST_CLOSING: u8 = 0x0A;
const FUNC_PROTOCOL: u8 = 0x0B;
const FUNC_MASTER: u8 = 0x0C;

const SUB_DMR: u8 = 0x01;
const SUB_P25: u8 = 0x02;
const SUB_NXDN: u8 = 0x03;

const SUB_WL_RID: u8 = 0x01;
const SUB_BL_RID: u8 = 0x02;
const SUB_ACTIVE_TGS: u8 = 0x03;
const SUB_DEACTIVE_TGS: u8 = 0x04;

/// Login/config handshake phases (spec.md §4.2's table collapses the
/// original protocol's separate `WAITING_LOGIN` sub-phase into
/// `WaitingAuthorisation`, since the spec's own phase table lists only
/// these four; see DESIGN.md).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionPhase {
    WaitingConnect,
    WaitingAuthorisation,
    WaitingConfig,
    Running,
}

/// NAK reason codes the master can send back (spec.md §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkNakReason {
    ModeDisabled,
    IllegalPacket,
    Unauthorized,
    BadState,
    InvalidConfig,
    MaxConnections,
    Reset,
    AclReject,
    General,
    Unknown(u8),
}

impl NetworkNakReason {
    pub fn from_byte(byte: u8) -> Self {
        use NetworkNakReason::*;
        match byte {
            1 => ModeDisabled,
            2 => IllegalPacket,
            3 => Unauthorized,
            4 => BadState,
            5 => InvalidConfig,
            6 => MaxConnections,
            7 => Reset,
            8 => AclReject,
            9 => General,
            other => Unknown(other),
        }
    }
}

/// What a NAK reason tells the peer session to do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NakRecovery {
    Relogin,
    Reconnect,
    ReconnectWithBackoff,
}

fn recovery_for(reason: NetworkNakReason, phase: ConnectionPhase) -> NakRecovery {
    match reason {
        NetworkNakReason::MaxConnections => NakRecovery::ReconnectWithBackoff,
        _ if phase == ConnectionPhase::Running => NakRecovery::Relogin,
        _ => NakRecovery::Reconnect,
    }
}

/// The JSON configuration payload sent during `WaitingConfig` (spec.md §4.2
/// "send `RPTC`").
#[derive(Clone, Debug, Serialize)]
pub struct RptcPayload {
    pub identity: String,
    pub rx_frequency: u32,
    pub tx_frequency: u32,
    pub latitude: f64,
    pub longitude: f64,
    pub height: i32,
    pub location: String,
    pub tx_power: u16,
    pub tx_offset_mhz: f32,
    pub channel_bandwidth_khz: f32,
    pub channel_id: u8,
    pub channel_no: u16,
    pub rest_api_password: String,
    pub rest_api_port: u16,
    pub software_id: String,
    pub conventional: bool,
}

/// Receives ACL/TG-rules change notifications forwarded off the wire.
/// Storage and persistence of these tables is out of scope (spec.md §1);
/// this is just the seam the opcode handler calls through.
pub trait AclUpdateSink {
    fn whitelist_ids(&mut self, _ids: &[u32]) {}
    fn blacklist_ids(&mut self, _ids: &[u32]) {}
    fn activate_talkgroup(&mut self, _tg: u32, _slot: u8, _non_preferred: bool) {}
    fn deactivate_talkgroup(&mut self, _tg: u32) {}
}

#[derive(Default)]
pub struct NullAclSink;
impl AclUpdateSink for NullAclSink {}

/// The FNE peer session.
pub struct Network {
    transport: Box<dyn NetworkTransport + Send>,
    peer_id: u32,
    password: String,
    rptc: RptcPayload,

    phase: ConnectionPhase,
    retry_timer: Timer,
    ping_timer: Timer,
    idle_timer: Timer,

    salt: Option<[u8; 4]>,
    master_ssrc: Option<u32>,
    tx_seq: u16,
    sequencer: StreamSequencer,

    dmr_enabled: bool,
    p25_enabled: bool,
    nxdn_enabled: bool,
    dmr_rx: FrameQueue,
    p25_rx: FrameQueue,
    nxdn_rx: FrameQueue,

    acl_sink: Box<dyn AclUpdateSink + Send>,
    icc_handler: Option<Box<dyn IccHandler + Send>>,
    authoritative: bool,

    pending_retry_payload: Option<Vec<u8>>,
}

impl Network {
    pub fn new(
        transport: Box<dyn NetworkTransport + Send>,
        cfg: &NetworkConfig,
        rptc: RptcPayload,
        authoritative: bool,
    ) -> Self {
        Self {
            transport,
            peer_id: cfg.id,
            password: cfg.password.clone(),
            rptc,
            phase: ConnectionPhase::WaitingConnect,
            retry_timer: Timer::new(DEFAULT_RETRY_MS),
            ping_timer: Timer::new(DEFAULT_PING_MS),
            idle_timer: Timer::new(DEFAULT_IDLE_MS),
            salt: None,
            master_ssrc: None,
            tx_seq: 0,
            sequencer: StreamSequencer::new(),
            dmr_enabled: cfg.dmr_enabled,
            p25_enabled: cfg.p25_enabled,
            nxdn_enabled: cfg.nxdn_enabled,
            dmr_rx: FrameQueue::new(64),
            p25_rx: FrameQueue::new(64),
            nxdn_rx: FrameQueue::new(64),
            acl_sink: Box::new(NullAclSink),
            icc_handler: None,
            authoritative,
            pending_retry_payload: None,
        }
    }

    pub fn set_acl_sink(&mut self, sink: Box<dyn AclUpdateSink + Send>) {
        self.acl_sink = sink;
    }

    pub fn set_icc_handler(&mut self, handler: Box<dyn IccHandler + Send>) {
        self.icc_handler = Some(handler);
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn open(&mut self) -> Result<(), NetworkError> {
        self.transport.connect()?;
        self.phase = ConnectionPhase::WaitingConnect;
        self.send_rptl();
        self.retry_timer.start();
        self.idle_timer.start();
        Ok(())
    }

    fn next_seq(&mut self) -> u16 {
        let seq = self.tx_seq;
        self.tx_seq = if self.tx_seq == END_OF_CALL_SEQ - 1 {
            0
        } else {
            self.tx_seq + 1
        };
        seq
    }

    fn send_packet(&mut self, function: u8, subfunction: u8, payload: Vec<u8>) {
        let seq = self.next_seq();
        let pkt = FnePacket {
            rtp: RtpHeader {
                sequence: seq,
                timestamp: 0,
                ssrc: self.peer_id,
            },
            fne: FneSubHeader {
                function,
                subfunction,
                peer_id: self.peer_id,
                stream_id: 0,
            },
            payload,
        };
        let bytes = pkt.encode();
        self.pending_retry_payload = Some(bytes.clone());
        let _ = self.transport.send(&bytes);
    }

    fn login_tag_payload(tag: &[u8; 4], peer_id: u32) -> Vec<u8> {
        let mut out = Vec::with_capacity(8);
        out.extend_from_slice(tag);
        out.extend_from_slice(&peer_id.to_be_bytes());
        out
    }

    fn send_rptl(&mut self) {
        let payload = Self::login_tag_payload(b"RPTL", self.peer_id);
        self.send_packet(FUNC_RPTL, 0, payload);
    }

    fn send_rptk(&mut self) {
        let salt = self.salt.unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(self.password.as_bytes());
        let digest = hasher.finalize();

        let mut payload = Self::login_tag_payload(b"RPTK", self.peer_id);
        payload.extend_from_slice(&digest);
        self.send_packet(FUNC_RPTK, 0, payload);
    }

    fn send_rptc(&mut self) {
        let json = serde_json::to_vec(&self.rptc).unwrap_or_default();
        let mut payload = Self::login_tag_payload(b"RPTC", self.peer_id);
        payload.extend_from_slice(&json);
        self.send_packet(FUNC_RPTC, 0, payload);
    }

    /// Non-blocking clock tick: retry/ping/idle timers, plus draining any
    /// pending inbound datagrams.
    pub fn clock(&mut self, ms: u64) {
        self.retry_timer.clock(ms);
        self.ping_timer.clock(ms);
        self.idle_timer.clock(ms);

        if self.retry_timer.has_expired() {
            self.on_retry_expired();
            self.retry_timer.start();
        }

        if self.phase == ConnectionPhase::Running && self.ping_timer.has_expired() {
            self.send_packet(FUNC_PING, 0, Vec::new());
            self.ping_timer.start();
        }

        if self.idle_timer.has_expired() {
            warn!(target: "dvm_host::network", "FNE idle timeout, forcing full re-login");
            self.phase = ConnectionPhase::WaitingConnect;
            self.salt = None;
            self.master_ssrc = None;
            self.send_rptl();
            self.idle_timer.start();
        }

        self.pump();
    }

    fn on_retry_expired(&mut self) {
        match self.phase {
            ConnectionPhase::WaitingConnect => self.send_rptl(),
            ConnectionPhase::WaitingAuthorisation => self.send_rptk(),
            ConnectionPhase::WaitingConfig => self.send_rptc(),
            ConnectionPhase::Running => {}
        }
    }

    fn pump(&mut self) {
        let mut buf = [0u8; 1500];
        for _ in 0..MAX_PUMP_ITERS {
            let n = match self.transport.recv(&mut buf) {
                Ok(Some(n)) => n,
                Ok(None) => break,
                Err(_) => break,
            };
            if let Some(pkt) = FnePacket::decode(&buf[..n]) {
                self.handle_packet(pkt);
            }
        }
    }

    fn handle_packet(&mut self, pkt: FnePacket) {
        if let Some(master) = self.master_ssrc {
            if pkt.rtp.ssrc != master && pkt.fne.function != FUNC_ACK {
                debug!(target: "dvm_host::network", "dropping packet from unexpected SSRC {}", pkt.rtp.ssrc);
                return;
            }
        }
        self.idle_timer.start();

        match pkt.fne.function {
            FUNC_ACK => self.handle_ack(&pkt),
            FUNC_NAK => self.handle_nak(&pkt),
            FUNC_PONG => {
                debug!(target: "dvm_host::network", "PONG received");
            }
            FUNC_MST_CLOSING => {
                warn!(target: "dvm_host::network", "master sent MST_CLOSING, scheduling reopen");
                self.phase = ConnectionPhase::WaitingConnect;
                self.salt = None;
            }
            FUNC_PROTOCOL => self.handle_protocol(pkt.fne.subfunction, pkt.fne.stream_id, pkt.rtp.sequence, &pkt.payload),
            FUNC_MASTER => self.handle_master(pkt.fne.subfunction, &pkt.payload),
            other => debug!(target: "dvm_host::network", "unhandled FNE function byte {other:#04x}"),
        }
    }

    fn handle_ack(&mut self, pkt: &FnePacket) {
        self.master_ssrc.get_or_insert(pkt.rtp.ssrc);
        match self.phase {
            ConnectionPhase::WaitingConnect => {
                if pkt.payload.len() >= 4 {
                    let mut salt = [0u8; 4];
                    salt.copy_from_slice(&pkt.payload[..4]);
                    self.salt = Some(salt);
                }
                self.phase = ConnectionPhase::WaitingAuthorisation;
                self.send_rptk();
            }
            ConnectionPhase::WaitingAuthorisation => {
                self.phase = ConnectionPhase::WaitingConfig;
                self.send_rptc();
            }
            ConnectionPhase::WaitingConfig => {
                info!(target: "dvm_host::network", "FNE login complete, entering RUNNING");
                self.phase = ConnectionPhase::Running;
                self.ping_timer.start();
            }
            ConnectionPhase::Running => {}
        }
    }

    fn handle_nak(&mut self, pkt: &FnePacket) {
        let reason = pkt
            .payload
            .first()
            .copied()
            .map(NetworkNakReason::from_byte)
            .unwrap_or(NetworkNakReason::Unknown(0));
        let recovery = recovery_for(reason, self.phase);
        warn!(target: "dvm_host::network", "FNE NAK: {reason:?}, recovery: {recovery:?}");
        match recovery {
            NakRecovery::Relogin => {
                self.phase = ConnectionPhase::WaitingConnect;
                self.salt = None;
                self.retry_timer.start();
            }
            NakRecovery::Reconnect | NakRecovery::ReconnectWithBackoff => {
                self.phase = ConnectionPhase::WaitingConnect;
                self.salt = None;
                self.master_ssrc = None;
                if recovery == NakRecovery::ReconnectWithBackoff {
                    self.retry_timer.set_timeout(DEFAULT_RETRY_MS * 3);
                } else {
                    self.retry_timer.set_timeout(DEFAULT_RETRY_MS);
                }
                self.retry_timer.start();
            }
        }
    }

    fn queue_for(&mut self, subfunction: u8) -> Option<(&mut FrameQueue, bool)> {
        match subfunction {
            SUB_DMR => Some((&mut self.dmr_rx, self.dmr_enabled)),
            SUB_P25 => Some((&mut self.p25_rx, self.p25_enabled)),
            SUB_NXDN => Some((&mut self.nxdn_rx, self.nxdn_enabled)),
            _ => None,
        }
    }

    fn handle_protocol(&mut self, subfunction: u8, stream_id: u32, seq: u16, payload: &[u8]) {
        let outcome = self.sequencer.accept(stream_id, seq);
        match outcome {
            SequenceOutcome::SmallGap => {
                warn!(target: "dvm_host::network", "stream {stream_id} skipped one sequence number");
            }
            SequenceOutcome::Reset => {
                debug!(target: "dvm_host::network", "stream {stream_id} sequence reset");
            }
            SequenceOutcome::EndOfCall => {
                debug!(target: "dvm_host::network", "stream {stream_id} end-of-call marker");
                return;
            }
            SequenceOutcome::InOrder => {}
        }

        let enabled = match self.queue_for(subfunction) {
            Some((_, enabled)) => enabled,
            None => {
                debug!(target: "dvm_host::network", "unknown PROTOCOL subfunction {subfunction:#04x}");
                return;
            }
        };
        if !enabled {
            return;
        }
        if let Some((queue, _)) = self.queue_for(subfunction) {
            queue.push(FrameTag::Data, payload.to_vec());
        }
    }

    fn handle_master(&mut self, subfunction: u8, payload: &[u8]) {
        match subfunction {
            SUB_WL_RID => {
                let ids = decode_packed_24bit_ids(payload);
                self.acl_sink.whitelist_ids(&ids);
            }
            SUB_BL_RID => {
                let ids = decode_packed_24bit_ids(payload);
                self.acl_sink.blacklist_ids(&ids);
            }
            SUB_ACTIVE_TGS => {
                for entry in payload.chunks_exact(4) {
                    let tg = u32::from_be_bytes([0, entry[0], entry[1], entry[2]]);
                    let slot = entry[3] & 0x7F;
                    let non_preferred = entry[3] & 0x80 != 0;
                    info!(target: "dvm_host::network", "activating TG {tg} on slot {slot} (non-preferred: {non_preferred})");
                    self.acl_sink.activate_talkgroup(tg, slot, non_preferred);
                }
            }
            SUB_DEACTIVE_TGS => {
                for entry in payload.chunks_exact(4) {
                    let tg = u32::from_be_bytes([0, entry[0], entry[1], entry[2]]);
                    info!(target: "dvm_host::network", "deactivating TG {tg}");
                    self.acl_sink.deactivate_talkgroup(tg);
                }
            }
            other => debug!(target: "dvm_host::network", "unknown MASTER subfunction {other:#04x}"),
        }
    }

    /// Handles a network-originated grant demand: validates ACLs, tags the
    /// grant encrypted/denied per flags, and forwards to the local protocol
    /// controller's grant path via the ICC facade (spec.md §4.2 "Grant
    /// demand / denial").
    pub fn handle_grant_demand(
        &mut self,
        src_id: u32,
        dst_id: u32,
        encrypted: bool,
        denial: bool,
        acl: &dyn crate::lookup::RadioIdLookup,
    ) {
        if !self.authoritative {
            debug!(target: "dvm_host::network", "ignoring grant demand, not authoritative");
            return;
        }
        if !acl.is_permitted(src_id) {
            warn!(target: "dvm_host::network", "grant demand from {src_id} rejected by ACL");
            return;
        }
        if denial {
            if let Some(handler) = self.icc_handler.as_mut() {
                handler.handle(IccRequest::RejectTraffic { dst_id });
            }
            return;
        }
        if encrypted {
            debug!(target: "dvm_host::network", "grant demand for {dst_id} marked encrypted");
        }
        if let Some(handler) = self.icc_handler.as_mut() {
            handler.handle(IccRequest::PermitTg { dst_id, slot: None });
        }
    }

    pub fn read_dmr(&mut self, buf: &mut Vec<u8>) -> usize {
        self.dmr_rx.read_into(buf)
    }

    pub fn read_p25(&mut self, buf: &mut Vec<u8>) -> usize {
        self.p25_rx.read_into(buf)
    }

    pub fn read_nxdn(&mut self, buf: &mut Vec<u8>) -> usize {
        self.nxdn_rx.read_into(buf)
    }

    /// Sends an already-framed protocol burst toward the master.
    pub fn write_protocol(&mut self, subfunction_for: ProtocolKind, stream_id: u32, data: Vec<u8>) {
        let sub = match subfunction_for {
            ProtocolKind::Dmr => SUB_DMR,
            ProtocolKind::P25 => SUB_P25,
            ProtocolKind::Nxdn => SUB_NXDN,
        };
        let seq = self.next_seq();
        let pkt = FnePacket {
            rtp: RtpHeader {
                sequence: seq,
                timestamp: 0,
                ssrc: self.peer_id,
            },
            fne: FneSubHeader {
                function: FUNC_PROTOCOL,
                subfunction: sub,
                peer_id: self.peer_id,
                stream_id,
            },
            payload: data,
        };
        let _ = self.transport.send(&pkt.encode());
    }

    pub fn close(&mut self) {
        self.send_packet(FUNC_RPTCL, 0, Self::login_tag_payload(b"RPTCL", self.peer_id));
        self.phase = ConnectionPhase::WaitingConnect;
        self.retry_timer.stop();
        self.ping_timer.stop();
        self.idle_timer.stop();
        self.dmr_rx.clear();
        self.p25_rx.clear();
        self.nxdn_rx.clear();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolKind {
    Dmr,
    P25,
    Nxdn,
}

fn decode_packed_24bit_ids(payload: &[u8]) -> Vec<u32> {
    if payload.is_empty() {
        return Vec::new();
    }
    let count = payload[0] as usize;
    let mut out = Vec::with_capacity(count);
    for chunk in payload[1..].chunks_exact(3).take(count) {
        out.push(u32::from_be_bytes([0, chunk[0], chunk[1], chunk[2]]));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use transport::NullTransport;

    fn test_config() -> NetworkConfig {
        NetworkConfig {
            enabled: true,
            address: "127.0.0.1".to_string(),
            port: 62031,
            local_port: 0,
            id: 42,
            password: "secret".to_string(),
            dmr_enabled: true,
            p25_enabled: true,
            nxdn_enabled: true,
        }
    }

    fn test_rptc() -> RptcPayload {
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
        }
    }

    #[test]
    fn login_handshake_advances_through_phases_on_ack() {
        let transport = Box::new(NullTransport::new());
        let mut net = Network::new(transport, &test_config(), test_rptc(), false);
        net.open().unwrap();
        assert_eq!(net.phase(), ConnectionPhase::WaitingConnect);

        let ack_with_salt = FnePacket {
            rtp: RtpHeader { sequence: 0, timestamp: 0, ssrc: 1 },
            fne: FneSubHeader { function: FUNC_ACK, subfunction: 0, peer_id: 1, stream_id: 0 },
            payload: vec![0xAA, 0xBB, 0xCC, 0xDD],
        };
        net.handle_packet(ack_with_salt);
        assert_eq!(net.phase(), ConnectionPhase::WaitingAuthorisation);

        let ack2 = FnePacket {
            rtp: RtpHeader { sequence: 0, timestamp: 0, ssrc: 1 },
            fne: FneSubHeader { function: FUNC_ACK, subfunction: 0, peer_id: 1, stream_id: 0 },
            payload: vec![],
        };
        net.handle_packet(ack2.clone());
        assert_eq!(net.phase(), ConnectionPhase::WaitingConfig);

        net.handle_packet(ack2);
        assert_eq!(net.phase(), ConnectionPhase::Running);
    }

    #[test]
    fn nak_max_connections_reconnects_with_backoff() {
        let transport = Box::new(NullTransport::new());
        let mut net = Network::new(transport, &test_config(), test_rptc(), false);
        net.open().unwrap();
        net.phase = ConnectionPhase::Running;

        let nak = FnePacket {
            rtp: RtpHeader { sequence: 0, timestamp: 0, ssrc: 1 },
            fne: FneSubHeader { function: FUNC_NAK, subfunction: 0, peer_id: 1, stream_id: 0 },
            payload: vec![6], // MaxConnections reason byte
        };
        net.handle_packet(nak);
        assert_eq!(net.phase(), ConnectionPhase::WaitingConnect);
        assert_eq!(net.retry_timer.timeout_ms(), DEFAULT_RETRY_MS * 3);
    }

    #[test]
    fn rptk_hashes_salt_and_password() {
        let transport = Box::new(NullTransport::new());
        let mut net = Network::new(transport, &test_config(), test_rptc(), false);
        net.salt = Some([1, 2, 3, 4]);
        net.send_rptk();
        let sent = net.pending_retry_payload.clone().unwrap();
        let pkt = FnePacket::decode(&sent).unwrap();
        let mut hasher = Sha256::new();
        hasher.update([1, 2, 3, 4]);
        hasher.update(b"secret");
        let expected = hasher.finalize();
        assert_eq!(&pkt.payload[8..], expected.as_slice());
    }

    #[test]
    fn grant_demand_forwards_permit_when_authorized() {
        use std::sync::{Arc, Mutex};

        struct Recorder(Arc<Mutex<VecDeque<IccRequest>>>);
        impl IccHandler for Recorder {
            fn handle(&mut self, request: IccRequest) -> crate::rpc::IccResponse {
                self.0.lock().unwrap().push_back(request);
                crate::rpc::IccResponse::Ok
            }
        }

        let seen = Arc::new(Mutex::new(VecDeque::new()));
        let transport = Box::new(NullTransport::new());
        let mut net = Network::new(transport, &test_config(), test_rptc(), true);
        net.set_icc_handler(Box::new(Recorder(seen.clone())));
        net.handle_grant_demand(100, 200, false, false, &crate::lookup::PermissiveLookup);

        let recorded = seen.lock().unwrap();
        assert_eq!(
            recorded.front(),
            Some(&IccRequest::PermitTg { dst_id: 200, slot: None })
        );
    }
}
