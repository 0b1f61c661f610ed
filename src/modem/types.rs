//! Modem operating state, status, and configuration wire structures
//! (spec.md §3, §6).

/// The modem's commanded operating state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperatingState {
    Idle,
    Dmr,
    P25,
    Nxdn,
    Cw,
    P25LfCal,
    P25Cal1k,
    DmrDmoCal1k,
    DmrCal1k,
    DmrLfCal,
    RssiCal,
    P25Cal,
    DmrCal,
}

impl OperatingState {
    pub fn to_byte(self) -> u8 {
        use OperatingState::*;
        match self {
            Idle => 0,
            Dmr => 1,
            P25 => 2,
            Nxdn => 3,
            Cw => 10,
            P25LfCal => 91,
            P25Cal1k => 92,
            DmrDmoCal1k => 93,
            DmrCal1k => 94,
            DmrLfCal => 95,
            RssiCal => 96,
            P25Cal => 97,
            DmrCal => 98,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        use OperatingState::*;
        Some(match byte {
            0 => Idle,
            1 => Dmr,
            2 => P25,
            3 => Nxdn,
            10 => Cw,
            91 => P25LfCal,
            92 => P25Cal1k,
            93 => DmrDmoCal1k,
            94 => DmrCal1k,
            95 => DmrLfCal,
            96 => RssiCal,
            97 => P25Cal,
            98 => DmrCal,
            _ => return None,
        })
    }
}

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

/// ADF7021 gain mode for hotspot modems.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdfGainMode {
    Auto,
    AutoLin,
    Low,
    High,
}

impl AdfGainMode {
    pub fn to_byte(self) -> u8 {
        match self {
            AdfGainMode::Auto => 0,
            AdfGainMode::AutoLin => 1,
            AdfGainMode::Low => 2,
            AdfGainMode::High => 3,
        }
    }

    pub fn from_byte(byte: u8) -> Self {
        match byte {
            1 => AdfGainMode::AutoLin,
            2 => AdfGainMode::Low,
            3 => AdfGainMode::High,
            _ => AdfGainMode::Auto,
        }
    }
}

/// Decoded `GET_STATUS` response (spec.md §6).
#[derive(Clone, Copy, Debug, Default)]
pub struct ModemStatus {
    pub is_hotspot: bool,
    pub dmr_enabled: bool,
    pub p25_enabled: bool,
    pub nxdn_enabled: bool,
    pub space_in_blocks: bool,
    pub modem_state: u8,
    pub tx: bool,
    pub adc_overflow: bool,
    pub rx_overflow: bool,
    pub tx_overflow: bool,
    pub lockout: bool,
    pub dac_overflow: bool,
    pub cd: bool,
    pub dmr_space1: u8,
    pub dmr_space2: u8,
    pub p25_space: u8,
    pub nxdn_space: u8,
}

impl ModemStatus {
    /// Decodes a `GET_STATUS` payload:
    /// `flags1 | modemState | flags2 | _ | dmrSpace1 | dmrSpace2 | _ | p25Space | nxdnSpace`.
    pub fn decode(payload: &[u8]) -> Option<Self> {
        if payload.len() < 9 {
            return None;
        }
        let flags1 = payload[0];
        let modem_state = payload[1];
        let flags2 = payload[2];
        let dmr_space1 = payload[4];
        let dmr_space2 = payload[5];
        let p25_space = payload[7];
        let nxdn_space = payload[8];
        Some(ModemStatus {
            is_hotspot: flags1 & 0x01 != 0,
            dmr_enabled: flags1 & 0x02 != 0,
            p25_enabled: flags1 & 0x08 != 0,
            nxdn_enabled: flags1 & 0x10 != 0,
            space_in_blocks: flags1 & 0x80 != 0,
            modem_state,
            tx: flags2 & 0x01 != 0,
            adc_overflow: flags2 & 0x02 != 0,
            rx_overflow: flags2 & 0x04 != 0,
            tx_overflow: flags2 & 0x08 != 0,
            lockout: flags2 & 0x10 != 0,
            dac_overflow: flags2 & 0x20 != 0,
            cd: flags2 & 0x40 != 0,
            dmr_space1,
            dmr_space2,
            p25_space,
            nxdn_space,
        })
    }
}

/// Configuration fields encoded into `SET_CONFIG` (spec.md §6).
///
/// The modem's own operating state is set separately by `SET_MODE`
/// (see `Modem::set_state`); `SET_CONFIG` always boots the modem into
/// `OperatingState::Idle` and carries no state field of its own.
/// `rx_level`/`cw_id_level`/`dmr_tx_level`/`p25_tx_level` are 0-100
/// percentages, scaled into a byte at encode time the same way
/// `RfParams::rf_power` is.
#[derive(Clone, Debug, PartialEq)]
pub struct SetConfig {
    pub rx_invert: bool,
    pub tx_invert: bool,
    pub ptt_invert: bool,
    pub debug: bool,
    pub duplex: bool,
    pub dc_blocker: bool,
    pub cos_lockout: bool,
    pub dmr_enabled: bool,
    pub p25_enabled: bool,
    pub nxdn_enabled: bool,
    pub fdma_preamble: u8,
    pub rx_level: u8,
    pub cw_id_level: u8,
    pub dmr_color_code: u8,
    pub dmr_rx_delay: u8,
    pub p25_nac: u16,
    pub dmr_tx_level: u8,
    pub p25_corr_count: u8,
    pub p25_tx_level: u8,
    pub tx_dc_offset: i8,
    /// Only transmitted when `extended` is `Some`; older firmware never
    /// receives it (mirrors `buffer[17]` falling outside protoVer-2's
    /// `lengthToWrite` in the original `writeConfig`).
    pub rx_dc_offset: i8,
    /// protoVer-3 extension.
    pub extended: Option<SetConfigExt>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SetConfigExt {
    pub nxdn_tx_level: u8,
    pub softpot_rx_coarse: u8,
    pub softpot_rx_fine: u8,
    pub softpot_tx_coarse: u8,
    pub softpot_tx_fine: u8,
    pub softpot_rssi_coarse: u8,
}

impl SetConfig {
    /// Encodes to the 14-byte (protoVer 2) or 21-byte (protoVer 3) frame
    /// payload, bit-for-bit matching the original `writeConfig`: `flags1`
    /// (invert/debug/duplex bits), `flags2` (dcBlocker/mode-enable bits),
    /// then the scalar fields.
    pub fn encode(&self) -> Vec<u8> {
        let mut flags1 = 0u8;
        if self.rx_invert {
            flags1 |= 0x01;
        }
        if self.tx_invert {
            flags1 |= 0x02;
        }
        if self.ptt_invert {
            flags1 |= 0x04;
        }
        if self.debug {
            flags1 |= 0x10;
        }
        if !self.duplex {
            flags1 |= 0x80;
        }

        let mut flags2 = 0u8;
        if self.dc_blocker {
            flags2 |= 0x01;
        }
        if self.dmr_enabled {
            flags2 |= 0x02;
        }
        if self.cos_lockout {
            flags2 |= 0x04;
        }
        if self.p25_enabled {
            flags2 |= 0x08;
        }
        if self.extended.is_some() && self.nxdn_enabled {
            flags2 |= 0x10;
        }

        let nac_hi = ((self.p25_nac >> 4) & 0xFF) as u8;
        let nac_lo = ((self.p25_nac << 4) & 0xF0) as u8;

        let mut out = vec![
            flags1,
            flags2,
            self.fdma_preamble,
            OperatingState::Idle.to_byte(),
            scale_level(self.rx_level),
            scale_level(self.cw_id_level),
            self.dmr_color_code,
            self.dmr_rx_delay,
            nac_hi,
            nac_lo,
            scale_level(self.dmr_tx_level),
            self.p25_corr_count,
            scale_level(self.p25_tx_level),
            bias128(self.tx_dc_offset),
        ];
        debug_assert_eq!(out.len(), 14);
        if let Some(ext) = self.extended {
            out.push(bias128(self.rx_dc_offset));
            out.push(scale_level(ext.nxdn_tx_level));
            out.push(ext.softpot_rx_coarse);
            out.push(ext.softpot_rx_fine);
            out.push(ext.softpot_tx_coarse);
            out.push(ext.softpot_tx_fine);
            out.push(ext.softpot_rssi_coarse);
            debug_assert_eq!(out.len(), 21);
        }
        out
    }
}

/// RF parameters encoded into `SET_RFPARAMS` (spec.md §6).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RfParams {
    pub rx_frequency: u32,
    pub tx_frequency: u32,
    pub rx_tuning: i32,
    pub tx_tuning: i32,
    pub rf_power: u8,
    pub dmr_disc_bw_adj: i8,
    pub p25_disc_bw_adj: i8,
    pub dmr_post_bw_adj: i8,
    pub p25_post_bw_adj: i8,
    pub adf_gain_mode: AdfGainMode,
    /// protoVer-3 extension: NXDN BW adjust and AFC are written together as
    /// one block in the original, never independently.
    pub extended: Option<RfParamsExt>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RfParamsExt {
    pub nxdn_disc_bw_adj: i8,
    pub nxdn_post_bw_adj: i8,
    pub afc: AfcParams,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AfcParams {
    pub enabled: bool,
    pub kp: u8,
    pub ki: u8,
    pub range: u8,
}

fn bias128(v: i8) -> u8 {
    (v as i32 + 128) as u8
}

/// Scales a 0-100 percentage field into a byte the way the original scales
/// `rxLevel`/`cwIdTXLevel`/`dmrTXLevel`/`p25TXLevel`/`rfPower`.
fn scale_level(pct: u8) -> u8 {
    (f32::from(pct) * 2.55 + 0.5) as u8
}

impl RfParams {
    /// Encodes to the 15-byte (protoVer 2) or 19-byte (protoVer 3) frame
    /// payload, matching the original `writeRFParams`: a reserved byte,
    /// `rxFrequency + rxTuning` and `txFrequency + txTuning` as 4-byte LE
    /// actual frequencies, `rfPower`, four bias-128 BW-adjust bytes, and the
    /// ADF gain mode. `rf_power` is a 0-100 percentage like `rx_level`
    /// elsewhere in this module; the original scales it by `*2.55 + 0.5`
    /// into a byte, so this does the same rather than passing it through
    /// raw.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(19);
        out.push(0x00); // reserved
        let rx_actual = self.rx_frequency.wrapping_add(self.rx_tuning as u32);
        out.extend_from_slice(&rx_actual.to_le_bytes());
        let tx_actual = self.tx_frequency.wrapping_add(self.tx_tuning as u32);
        out.extend_from_slice(&tx_actual.to_le_bytes());
        out.push(scale_level(self.rf_power));
        out.push(bias128(self.dmr_disc_bw_adj));
        out.push(bias128(self.p25_disc_bw_adj));
        out.push(bias128(self.dmr_post_bw_adj));
        out.push(bias128(self.p25_post_bw_adj));
        out.push(self.adf_gain_mode.to_byte());
        debug_assert_eq!(out.len(), 15);
        if let Some(ext) = self.extended {
            out.push(bias128(ext.nxdn_disc_bw_adj));
            out.push(bias128(ext.nxdn_post_bw_adj));
            let afc = ext.afc;
            let byte20 =
                (if afc.enabled { 0x80 } else { 0x00 }) | (afc.kp << 4) | (afc.ki & 0x0F);
            out.push(byte20);
            out.push(afc.range);
            debug_assert_eq!(out.len(), 19);
        }
        out
    }
}

/// `SET_SYMLVLADJ` payload: six signed, +128-biased bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SymLevelAdj {
    pub dmr_3: i8,
    pub dmr_1: i8,
    pub p25_3: i8,
    pub p25_1: i8,
    pub nxdn_3: i8,
    pub nxdn_1: i8,
}

impl SymLevelAdj {
    pub fn encode(&self) -> [u8; 6] {
        [
            bias128(self.dmr_3),
            bias128(self.dmr_1),
            bias128(self.p25_3),
            bias128(self.p25_1),
            bias128(self.nxdn_3),
            bias128(self.nxdn_1),
        ]
    }
}

/// `SET_BUFFERS`: three 16-bit big-endian minimum lengths.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferSizes {
    pub dmr_min_len: u16,
    pub p25_min_len: u16,
    pub nxdn_min_len: u16,
}

impl BufferSizes {
    pub fn encode(&self) -> [u8; 6] {
        let mut out = [0u8; 6];
        out[0..2].copy_from_slice(&self.dmr_min_len.to_be_bytes());
        out[2..4].copy_from_slice(&self.p25_min_len.to_be_bytes());
        out[4..6].copy_from_slice(&self.nxdn_min_len.to_be_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_decode_extracts_flags_and_space() {
        let payload = [0b1001_1011, 2, 0b0000_0001, 0, 10, 20, 0, 30, 40];
        let status = ModemStatus::decode(&payload).unwrap();
        assert!(status.is_hotspot);
        assert!(status.dmr_enabled);
        assert!(status.p25_enabled);
        assert!(!status.nxdn_enabled);
        assert!(status.space_in_blocks);
        assert_eq!(status.modem_state, 2);
        assert!(status.tx);
        assert_eq!(status.dmr_space1, 10);
        assert_eq!(status.dmr_space2, 20);
        assert_eq!(status.p25_space, 30);
        assert_eq!(status.nxdn_space, 40);
    }

    #[test]
    fn set_config_encodes_14_bytes_without_extension() {
        let cfg = base_set_config();
        let bytes = cfg.encode();
        assert_eq!(bytes.len(), 14);
        // flags1: rx_invert only.
        assert_eq!(bytes[0], 0x01);
        // flags2: dmr_enabled only (nxdn bit never set without `extended`).
        assert_eq!(bytes[1], 0x02);
        // state byte is always the idle state, never `Control`'s current mode.
        assert_eq!(bytes[3], OperatingState::Idle.to_byte());
    }

    #[test]
    fn set_config_levels_are_scaled_like_rf_power() {
        let mut cfg = base_set_config();
        cfg.rx_level = 100;
        cfg.cw_id_level = 100;
        cfg.dmr_tx_level = 100;
        cfg.p25_tx_level = 100;
        let bytes = cfg.encode();
        assert_eq!(bytes[4], 255, "rx_level 100% scales to 255");
        assert_eq!(bytes[5], 255, "cw_id_level 100% scales to 255");
        assert_eq!(bytes[10], 255, "dmr_tx_level 100% scales to 255");
        assert_eq!(bytes[12], 255, "p25_tx_level 100% scales to 255");
    }

    #[test]
    fn set_config_nac_is_packed_into_high_and_low_nibbles() {
        let mut cfg = base_set_config();
        cfg.p25_nac = 0x293;
        let bytes = cfg.encode();
        assert_eq!(bytes[8], 0x29);
        assert_eq!(bytes[9], 0x30);
    }

    #[test]
    fn set_config_duplex_bit_is_set_when_not_duplex() {
        let mut cfg = base_set_config();
        cfg.duplex = false;
        assert_eq!(cfg.encode()[0] & 0x80, 0x80);
        cfg.duplex = true;
        assert_eq!(cfg.encode()[0] & 0x80, 0x00);
    }

    #[test]
    fn set_config_extension_appends_seven_bytes_with_rx_dc_offset_first() {
        let mut cfg = base_set_config();
        cfg.rx_dc_offset = -10;
        cfg.nxdn_enabled = true;
        cfg.extended = Some(SetConfigExt {
            nxdn_tx_level: 50,
            softpot_rx_coarse: 1,
            softpot_rx_fine: 2,
            softpot_tx_coarse: 3,
            softpot_tx_fine: 4,
            softpot_rssi_coarse: 5,
        });
        let bytes = cfg.encode();
        assert_eq!(bytes.len(), 21);
        assert_eq!(bytes[14], bias128(-10));
        assert_eq!(bytes[15], 128, "nxdn_tx_level 50% scales to 128");
        assert_eq!(&bytes[16..21], &[1, 2, 3, 4, 5]);
        // flags2: dmr_enabled (0x02) | nxdn_enabled (0x10), only set once extended.
        assert_eq!(bytes[1], 0x12);
    }

    fn base_set_config() -> SetConfig {
        SetConfig {
            rx_invert: true,
            tx_invert: false,
            ptt_invert: false,
            debug: false,
            duplex: true,
            dc_blocker: false,
            cos_lockout: false,
            dmr_enabled: true,
            p25_enabled: false,
            nxdn_enabled: false,
            fdma_preamble: 8,
            rx_level: 50,
            cw_id_level: 50,
            dmr_color_code: 1,
            dmr_rx_delay: 7,
            p25_nac: 0x293,
            dmr_tx_level: 50,
            p25_corr_count: 3,
            p25_tx_level: 50,
            tx_dc_offset: 0,
            rx_dc_offset: 0,
            extended: None,
        }
    }

    fn base_rf_params() -> RfParams {
        RfParams {
            rx_frequency: 446_000_000,
            tx_frequency: 446_000_000,
            rx_tuning: 0,
            tx_tuning: 0,
            rf_power: 100,
            dmr_disc_bw_adj: 0,
            p25_disc_bw_adj: 0,
            dmr_post_bw_adj: 0,
            p25_post_bw_adj: 0,
            adf_gain_mode: AdfGainMode::Auto,
            extended: None,
        }
    }

    #[test]
    fn rf_params_encodes_15_bytes_without_extension() {
        let params = base_rf_params();
        let bytes = params.encode();
        assert_eq!(bytes.len(), 15);
        assert_eq!(bytes[0], 0x00, "reserved byte");
        assert_eq!(u32::from_le_bytes(bytes[1..5].try_into().unwrap()), 446_000_000);
        assert_eq!(u32::from_le_bytes(bytes[5..9].try_into().unwrap()), 446_000_000);
        assert_eq!(bytes[9], 255, "rf_power 100% scales to 255");
    }

    #[test]
    fn rf_params_combines_frequency_and_tuning_into_one_field() {
        let mut params = base_rf_params();
        params.rx_tuning = 1_500;
        let bytes = params.encode();
        assert_eq!(
            u32::from_le_bytes(bytes[1..5].try_into().unwrap()),
            446_001_500
        );
    }

    #[test]
    fn rf_params_v3_packs_afc_into_two_bytes() {
        let mut params = base_rf_params();
        params.extended = Some(RfParamsExt {
            nxdn_disc_bw_adj: 0,
            nxdn_post_bw_adj: 0,
            afc: AfcParams { enabled: true, kp: 3, ki: 5, range: 10 },
        });
        let bytes = params.encode();
        assert_eq!(bytes.len(), 19);
        assert_eq!(bytes[17], 0x80 | (3 << 4) | 5);
        assert_eq!(bytes[18], 10);
    }

    #[test]
    fn operating_state_round_trips() {
        for state in [
            OperatingState::Idle,
            OperatingState::Dmr,
            OperatingState::P25,
            OperatingState::Nxdn,
            OperatingState::Cw,
            OperatingState::DmrCal,
        ] {
            assert_eq!(OperatingState::from_byte(state.to_byte()), Some(state));
        }
    }
}
