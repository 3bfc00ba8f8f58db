//! WiFi station-mode adapter.
//!
//! The tap only needs an outbound route to the pour server, so this is a
//! station that joins one network and rejoins it when the link drops.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::wifi::BlockingWifi` over the
//!   modem peripheral.
//! - **all other targets**: simulation that records the join for host tests.

use core::fmt;
use log::{error, info, warn};

#[cfg(target_os = "espidf")]
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::modem::Modem,
    nvs::EspDefaultNvsPartition,
    wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi},
};

// ───────────────────────────────────────────────────────────────
// Errors
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    DriverInit,
    ConnectionFailed,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)"),
            Self::DriverInit => write!(f, "WiFi driver init failed"),
            Self::ConnectionFailed => write!(f, "WiFi connection failed"),
        }
    }
}

impl std::error::Error for ConnectivityError {}

// ───────────────────────────────────────────────────────────────
// Credentials
// ───────────────────────────────────────────────────────────────

/// Validated station credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    ssid: heapless::String<32>,
    password: heapless::String<64>,
}

impl WifiCredentials {
    pub fn new(ssid: &str, password: &str) -> Result<Self, ConnectivityError> {
        let printable = ssid.bytes().all(|b| b.is_ascii_graphic() || b == b' ');
        if ssid.is_empty() || ssid.len() > 32 || !printable {
            return Err(ConnectivityError::InvalidSsid);
        }
        if !password.is_empty() && !(8..=64).contains(&password.len()) {
            return Err(ConnectivityError::InvalidPassword);
        }
        Ok(Self {
            ssid: heapless::String::try_from(ssid).map_err(|_| ConnectivityError::InvalidSsid)?,
            password: heapless::String::try_from(password)
                .map_err(|_| ConnectivityError::InvalidPassword)?,
        })
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }
}

// ───────────────────────────────────────────────────────────────
// Adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    credentials: Option<WifiCredentials>,
    #[cfg(target_os = "espidf")]
    wifi: BlockingWifi<EspWifi<'static>>,
    #[cfg(not(target_os = "espidf"))]
    sim_connected: bool,
}

impl WifiAdapter {
    #[cfg(target_os = "espidf")]
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
    ) -> Result<Self, ConnectivityError> {
        let driver = EspWifi::new(modem, sysloop.clone(), Some(nvs)).map_err(|e| {
            error!("WiFi: driver init failed: {:?}", e);
            ConnectivityError::DriverInit
        })?;
        let wifi = BlockingWifi::wrap(driver, sysloop).map_err(|e| {
            error!("WiFi: event wrap failed: {:?}", e);
            ConnectivityError::DriverInit
        })?;
        Ok(Self {
            credentials: None,
            wifi,
        })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self {
            credentials: None,
            sim_connected: false,
        }
    }

    pub fn set_credentials(&mut self, credentials: WifiCredentials) {
        info!("WiFi: credentials updated (SSID='{}')", credentials.ssid());
        self.credentials = Some(credentials);
    }

    /// Join the configured network, blocking until the interface is up.
    pub fn connect(&mut self) -> Result<(), ConnectivityError> {
        let creds = self
            .credentials
            .clone()
            .ok_or(ConnectivityError::NoCredentials)?;
        info!("WiFi: connecting to '{}'", creds.ssid());
        self.platform_connect(&creds).inspect_err(|e| {
            error!("WiFi: connection failed: {}", e);
        })?;
        info!("WiFi: connected");
        Ok(())
    }

    /// Rejoin if the link dropped since the last call.
    pub fn ensure_connected(&mut self) -> Result<(), ConnectivityError> {
        if self.is_connected() {
            return Ok(());
        }
        warn!("WiFi: link down, reconnecting");
        self.connect()
    }

    #[cfg(target_os = "espidf")]
    pub fn is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn is_connected(&self) -> bool {
        self.sim_connected
    }

    #[cfg(target_os = "espidf")]
    pub fn disconnect(&mut self) {
        let _ = self.wifi.disconnect();
        info!("WiFi: disconnected");
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn disconnect(&mut self) {
        self.sim_connected = false;
        info!("WiFi(sim): disconnected");
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self, creds: &WifiCredentials) -> Result<(), ConnectivityError> {
        let config = Configuration::Client(ClientConfiguration {
            ssid: creds
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| ConnectivityError::InvalidSsid)?,
            password: creds
                .password
                .as_str()
                .try_into()
                .map_err(|_| ConnectivityError::InvalidPassword)?,
            auth_method: if creds.is_open() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        });
        let fail = |e| {
            warn!("WiFi: {:?}", e);
            ConnectivityError::ConnectionFailed
        };
        self.wifi.set_configuration(&config).map_err(fail)?;
        if !self.wifi.is_started().unwrap_or(false) {
            self.wifi.start().map_err(fail)?;
        }
        self.wifi.connect().map_err(fail)?;
        self.wifi.wait_netif_up().map_err(fail)?;
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self, creds: &WifiCredentials) -> Result<(), ConnectivityError> {
        info!("WiFi(sim): joined '{}'", creds.ssid());
        self.sim_connected = true;
        Ok(())
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
