//! System configuration parameters
//!
//! All tunable parameters for the PourLogic tap controller.
//! Values can be overridden via NVS (non-volatile storage).  The HMAC
//! passphrase and the WiFi password are credentials, not config, and are
//! kept in the NVS credential namespace instead.

use core::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::sensors::flow::{
    DEFAULT_CALIBRATION_PULSES, DEFAULT_LAST_PULSE_TIMEOUT_MS, DEFAULT_ML_PER_PULSE,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_TOTAL_TIMEOUT_MS, FlowCalibration, SessionTimeouts,
};

/// Copy `s` into a fixed-capacity string, truncating on overflow.
pub(crate) fn bounded<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// Where and how to reach the pour server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server IPv4 address (no DNS on the tap).
    pub ip: [u8; 4],
    pub port: u16,
    /// Sent in the `Host` header.
    pub hostname: heapless::String<64>,
    /// GET endpoint that grants a maximum volume.
    pub request_path: heapless::String<48>,
    /// POST endpoint that records the poured volume.
    pub result_path: heapless::String<48>,
    pub user_agent: heapless::String<48>,
    /// Socket read timeout (milliseconds).
    pub socket_timeout_ms: u32,
}

impl ServerConfig {
    pub fn ip_addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.ip)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: [10, 0, 0, 1],
            port: 80,
            hostname: bounded("pourlogic.com"),
            request_path: bounded("/pours/new/"),
            result_path: bounded("/pours/create/"),
            user_agent: bounded(concat!("pourlogic/", env!("CARGO_PKG_VERSION"), " esp-idf")),
            socket_timeout_ms: 2_000,
        }
    }
}

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Identity ---
    /// Client id sent in the auth header.
    pub client_id: u32,

    // --- Server ---
    pub server: ServerConfig,

    // --- Flow meter ---
    /// Millilitres per sensor pulse.
    pub ml_per_pulse: f32,
    /// Flow is considered stopped after this long without a pulse (ms).
    pub last_pulse_timeout_ms: u32,
    /// Hard cap on a single pour (ms).
    pub total_timeout_ms: u32,
    /// Pulse-count polling period (ms).
    pub poll_interval_ms: u32,
    /// Pulses a calibration run must observe.
    pub calibration_pulses: u32,

    // --- RFID ---
    /// Tag read timeout (ms); 0 waits indefinitely.
    pub rfid_timeout_ms: u32,

    // --- Persistence ---
    /// Offset of the OTP counter in the emulated EEPROM.
    pub counter_offset: u16,

    // --- Network ---
    pub wifi_ssid: heapless::String<32>,
}

impl SystemConfig {
    pub fn session_timeouts(&self) -> SessionTimeouts {
        SessionTimeouts {
            last_pulse_timeout_ms: self.last_pulse_timeout_ms,
            total_timeout_ms: self.total_timeout_ms,
            poll_interval_ms: self.poll_interval_ms,
        }
    }

    /// `None` if `ml_per_pulse` is not a positive finite number.
    pub fn flow_calibration(&self) -> Option<FlowCalibration> {
        FlowCalibration::new(self.ml_per_pulse)
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            client_id: 0,
            server: ServerConfig::default(),

            // Flow meter
            ml_per_pulse: DEFAULT_ML_PER_PULSE,
            last_pulse_timeout_ms: DEFAULT_LAST_PULSE_TIMEOUT_MS,
            total_timeout_ms: DEFAULT_TOTAL_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            calibration_pulses: DEFAULT_CALIBRATION_PULSES,

            // RFID
            rfid_timeout_ms: 0,

            counter_offset: 0,
            wifi_ssid: heapless::String::new(),
        }
    }
}
