//! Error types for the host and its components.

use thiserror::Error;

/// Failures from the modem session (serial/null port, framing, handshake).
#[derive(Error, Debug)]
pub enum ModemError {
    #[error("modem port unreachable: {0}")]
    Unreachable(String),
    #[error("unsupported modem protocol version {0} (need >= 2)")]
    ProtocolVersion(u8),
    #[error("no response from modem after {0} attempts")]
    NoResponse(u32),
    #[error("modem rejected configuration twice")]
    ConfigRejected,
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures from the FNE peer session.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("login rejected: {0}")]
    LoginRejected(String),
    #[error("peer is not running")]
    NotRunning,
}

/// Failures loading or validating the YAML configuration tree.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// The top-level error surfaced to `main`.
#[derive(Error, Debug)]
pub enum HostError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Modem(#[from] ModemError),
    #[error(transparent)]
    Network(#[from] NetworkError),
}
