//! `dvmhost`: loads configuration, opens the modem and (optionally) the FNE
//! network peer, then drives the cooperative `clock(ms)` scheduling loop
//! for the life of the process (spec.md §5, §6 "Exit codes").

use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use dvm_host::config::HostConfig;
use dvm_host::dmr;
use dvm_host::error::HostError;
use dvm_host::lookup::PermissiveLookup;
use dvm_host::modem::port::SerialPortImpl;
use dvm_host::modem::Modem;
use dvm_host::network::transport::UdpTransport;
use dvm_host::network::{Network, RptcPayload};
use dvm_host::nxdn;
use dvm_host::p25;
use dvm_host::rpc::{IccHandler, IccRequest, IccResponse};

const TICK_MS: u64 = 10;

/// No-op in-call-control handler: the real REST/RPC facade is an external
/// collaborator out of scope for this host (spec.md §1), so this simply
/// acknowledges every request.
struct LoggingIccHandler;

impl IccHandler for LoggingIccHandler {
    fn handle(&mut self, request: IccRequest) -> IccResponse {
        log::debug!(target: "dvm_host::main", "icc request: {request:?}");
        IccResponse::Ok
    }
}

fn config_path() -> String {
    std::env::args().nth(1).unwrap_or_else(|| "config.yml".to_string())
}

fn run() -> Result<(), HostError> {
    let cfg = HostConfig::load(config_path())?;

    let port = Box::new(SerialPortImpl::new(
        cfg.system.modem.protocol.uart.port.clone(),
        cfg.system.modem.protocol.uart.speed,
    ));
    let mut modem = Modem::new(port);
    modem.set_mode_params(
        cfg.protocols.dmr.enabled,
        cfg.protocols.p25.enabled,
        cfg.protocols.nxdn.enabled,
    );
    modem.set_dmr_color_code(cfg.protocols.dmr.color_code);
    modem.set_p25_nac(cfg.protocols.p25.nac as u16);
    modem.open()?;
    log::info!(target: "dvm_host::main", "modem open");

    let mut network = if cfg.system.network.enabled {
        let transport = Box::new(UdpTransport::new(
            cfg.system.network.address.clone(),
            cfg.system.network.port,
            cfg.system.network.local_port,
        ));
        let rptc = RptcPayload {
            identity: cfg.system.config.identity.clone(),
            rx_frequency: cfg.system.modem.hotspot.rx_frequency,
            tx_frequency: cfg.system.modem.hotspot.tx_frequency,
            latitude: 0.0,
            longitude: 0.0,
            height: 0,
            location: String::new(),
            tx_power: cfg.system.modem.hotspot.rf_power as u16,
            tx_offset_mhz: 0.0,
            channel_bandwidth_khz: 12.5,
            channel_id: 0,
            channel_no: 0,
            rest_api_password: cfg.system.config.rest_api_password.clone(),
            rest_api_port: cfg.system.config.rest_api_port,
            software_id: "dvmhost".to_string(),
            conventional: !cfg.protocols.p25.control_channel,
        };
        let mut net = Network::new(transport, &cfg.system.network, rptc, true);
        net.set_icc_handler(Box::new(LoggingIccHandler));
        net.open()?;
        log::info!(target: "dvm_host::main", "network open");
        Some(net)
    } else {
        None
    };

    let acl = PermissiveLookup::default();

    let mut dmr_control = if cfg.protocols.dmr.enabled {
        let site = dmr::SiteContext {
            site_id: cfg.system.modem.repeater.color_code as u16,
            color_code: cfg.protocols.dmr.color_code,
            git_hash: [0, 0, 0, 0],
        };
        Some(dmr::Control::new(site))
    } else {
        None
    };

    let mut p25_control = if cfg.protocols.p25.enabled {
        let mut control = p25::Control::new(0, 0);
        if cfg.protocols.p25.control_channel {
            control.start_control_channel();
        }
        Some(control)
    } else {
        None
    };

    let mut nxdn_control = if cfg.protocols.nxdn.enabled {
        Some(nxdn::Control::new(cfg.protocols.nxdn.ran as u16))
    } else {
        None
    };

    let mut icc = LoggingIccHandler;

    loop {
        modem.clock(TICK_MS);

        if let Some(net) = network.as_mut() {
            net.clock(TICK_MS);
        }

        if let Some(control) = dmr_control.as_mut() {
            control.clock(TICK_MS, &mut modem);
            if let Some(net) = network.as_mut() {
                control.pump_modem(&mut modem, net, &acl, &mut icc);
            }
        }

        if let Some(control) = p25_control.as_mut() {
            control.clock(TICK_MS, &mut modem, &mut icc);
            if let Some(net) = network.as_mut() {
                p25::pump_modem(control, &mut modem, net, &acl, &acl, &mut icc);
            }
        }

        if let Some(control) = nxdn_control.as_mut() {
            control.clock(TICK_MS);
            if let Some(net) = network.as_mut() {
                nxdn::pump_modem(control, &mut modem, net, &acl, &mut icc);
            }
        }

        thread::sleep(Duration::from_millis(TICK_MS));
    }
}

fn main() -> ExitCode {
    env_logger::init();

    match run() {
        Ok(()) => ExitCode::from(0),
        Err(HostError::Config(e)) => {
            log::error!(target: "dvm_host::main", "configuration error: {e}");
            ExitCode::from(1)
        }
        Err(HostError::Modem(e)) => {
            log::error!(target: "dvm_host::main", "modem open failed: {e}");
            ExitCode::from(1)
        }
        Err(HostError::Network(e)) => {
            log::error!(target: "dvm_host::main", "network open failed: {e}");
            ExitCode::from(2)
        }
    }
}
