//! YAML configuration tree (spec.md §6 "CLI/config").
//!
//! Mirrors the documented key hierarchy exactly: `system`, `system.modem`,
//! `system.modem.protocol.uart`, `system.modem.hotspot`,
//! `system.modem.repeater`, `system.modem.softpot`, `system.iden_table`,
//! `system.cwId`, `system.config`, `log`, `protocols.{dmr,p25,nxdn}`. No key
//! is positional; every field has a name and, where the original protocol
//! has one, a sane default.

use serde::Deserialize;
use std::path::Path;

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    pub system: SystemConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub protocols: ProtocolsConfig,
}

impl HostConfig {
    /// Loads and parses a configuration file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let text = std::fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_ref.display().to_string(),
            source,
        })?;
        let cfg: HostConfig = serde_yaml::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.protocols.dmr.enabled && !self.protocols.p25.enabled && !self.protocols.nxdn.enabled
        {
            return Err(ConfigError::Invalid(
                "at least one of protocols.dmr, protocols.p25, protocols.nxdn must be enabled"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    #[serde(default)]
    pub duplex: bool,
    #[serde(default)]
    pub modem: ModemConfig,
    #[serde(default)]
    pub iden_table: IdenTableConfig,
    #[serde(rename = "cwId", default)]
    pub cw_id: CwIdConfig,
    #[serde(default)]
    pub config: InnerConfig,
    #[serde(default = "default_network")]
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModemConfig {
    #[serde(default)]
    pub protocol: ProtocolTransportConfig,
    #[serde(default)]
    pub hotspot: HotspotConfig,
    #[serde(default)]
    pub repeater: RepeaterConfig,
    #[serde(default)]
    pub softpot: SoftpotConfig,
    #[serde(default = "default_true")]
    pub rx_invert: bool,
    #[serde(default)]
    pub tx_invert: bool,
    #[serde(default)]
    pub ptt_invert: bool,
    #[serde(default)]
    pub dc_blocker: bool,
    #[serde(default)]
    pub cos_lockout: bool,
    #[serde(default)]
    pub fdma_preamble: u8,
    #[serde(default)]
    pub dmr_rx_delay: u8,
    #[serde(default)]
    pub p25_corr_count: u8,
    #[serde(default)]
    pub disable_o_flow_reset: bool,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolTransportConfig::default(),
            hotspot: HotspotConfig::default(),
            repeater: RepeaterConfig::default(),
            softpot: SoftpotConfig::default(),
            rx_invert: true,
            tx_invert: false,
            ptt_invert: false,
            dc_blocker: false,
            cos_lockout: false,
            fdma_preamble: 0,
            dmr_rx_delay: 7,
            p25_corr_count: 3,
            disable_o_flow_reset: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolTransportConfig {
    #[serde(default)]
    pub uart: UartConfig,
}

impl Default for ProtocolTransportConfig {
    fn default() -> Self {
        Self {
            uart: UartConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UartConfig {
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default = "default_baud")]
    pub speed: u32,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            speed: default_baud(),
        }
    }
}

fn default_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud() -> u32 {
    115_200
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HotspotConfig {
    #[serde(default)]
    pub rx_frequency: u32,
    #[serde(default)]
    pub tx_frequency: u32,
    #[serde(default)]
    pub rf_power: u8,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepeaterConfig {
    #[serde(default)]
    pub color_code: u8,
    #[serde(default)]
    pub nac: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SoftpotConfig {
    #[serde(default)]
    pub rx_coarse: u8,
    #[serde(default)]
    pub rx_fine: u8,
    #[serde(default)]
    pub tx_coarse: u8,
    #[serde(default)]
    pub tx_fine: u8,
    #[serde(default)]
    pub rssi_coarse: u8,
    #[serde(default)]
    pub rssi_fine: u8,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdenTableConfig {
    #[serde(default)]
    pub file: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CwIdConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub callsign: String,
    #[serde(default)]
    pub time_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InnerConfig {
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub rest_api_password: String,
    #[serde(default)]
    pub rest_api_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_fne_address")]
    pub address: String,
    #[serde(default = "default_fne_port")]
    pub port: u16,
    #[serde(default)]
    pub local_port: u16,
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_true")]
    pub dmr_enabled: bool,
    #[serde(default = "default_true")]
    pub p25_enabled: bool,
    #[serde(default = "default_true")]
    pub nxdn_enabled: bool,
}

fn default_network() -> NetworkConfig {
    NetworkConfig {
        enabled: true,
        address: default_fne_address(),
        port: default_fne_port(),
        local_port: 0,
        id: 0,
        password: String::new(),
        dmr_enabled: true,
        p25_enabled: true,
        nxdn_enabled: true,
    }
}

fn default_fne_address() -> String {
    "127.0.0.1".to_string()
}

fn default_fne_port() -> u16 {
    62031
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub display_level: u8,
    #[serde(default)]
    pub file_level: u8,
    #[serde(default)]
    pub file_path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProtocolsConfig {
    #[serde(default)]
    pub dmr: DmrProtoConfig,
    #[serde(default)]
    pub p25: P25ProtoConfig,
    #[serde(default)]
    pub nxdn: NxdnProtoConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DmrProtoConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub color_code: u8,
    #[serde(default)]
    pub call_hang: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct P25ProtoConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub nac: u32,
    #[serde(default)]
    pub control_channel: bool,
    #[serde(default)]
    pub lla_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NxdnProtoConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub ran: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let yaml = r#"
system:
  duplex: true
log: {}
protocols:
  dmr:
    enabled: true
    color_code: 1
"#;
        let cfg: HostConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(cfg.system.duplex);
        assert!(cfg.protocols.dmr.enabled);
        assert!(!cfg.protocols.p25.enabled);
        assert_eq!(cfg.system.modem.protocol.uart.speed, 115_200);
        assert_eq!(cfg.system.network.port, 62031);
    }

    #[test]
    fn rejects_config_with_no_enabled_protocol() {
        let yaml = r#"
system:
  duplex: false
protocols: {}
"#;
        let cfg: HostConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(cfg.validate().is_err());
    }
}
