//! NVS (Non-Volatile Storage) adapter.
//!
//! One backend serves three tenants:
//!
//! - the `postcard` encoded [`SystemConfig`] blob ([`ConfigPort`]),
//! - raw blobs for the emulated EEPROM ([`StoragePort`]),
//! - the `auth` namespace holding the HMAC passphrase and WiFi password.
//!
//! On ESP32 the `auth` namespace sits on the encrypted NVS partition when
//! `CONFIG_NVS_ENCRYPTION` is set; the host backend is a plaintext map.

use crate::adapters::eeprom::EEPROM_SIZE;
use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::auth::{DEFAULT_PASSPHRASE, counter};
use crate::config::SystemConfig;
use log::{info, warn};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "pourlogic";
const CONFIG_KEY: &str = "syscfg";
/// Upper bound of the encoded config; the heapless strings cap it well below.
const CONFIG_BLOB_MAX: usize = 512;
const CRED_NAMESPACE: &str = "auth";

/// Credential key of the HMAC passphrase.
pub const PASSPHRASE_KEY: &str = "passphrase";
/// Credential key of the WiFi station password.
pub const WIFI_PASSWORD_KEY: &str = "wifi_pw";
/// Longest accepted credential.
pub const MAX_CREDENTIAL_LEN: usize = 64;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<(String, String), Vec<u8>>>,
}

impl NvsAdapter {
    /// Initialise NVS flash, erasing the partition when its layout is stale.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from the main task before any NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES as i32
                || ret == ESP_ERR_NVS_NEW_VERSION_FOUND as i32
            {
                warn!("NVS: partition stale ({}), erasing", ret);
                if unsafe { nvs_flash_erase() } != ESP_OK as i32
                    || unsafe { nvs_flash_init() } != ESP_OK as i32
                {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK as i32 {
                return Err(ConfigError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self::unopened())
    }

    fn unopened() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn get(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let store = self.store.borrow();
        let data = store
            .get(&(namespace.to_owned(), key.to_owned()))
            .ok_or(StorageError::NotFound)?;
        if data.len() > buf.len() {
            return Err(StorageError::IoError);
        }
        buf[..data.len()].copy_from_slice(data);
        Ok(data.len())
    }

    #[cfg(not(target_os = "espidf"))]
    fn put(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.store
            .borrow_mut()
            .insert((namespace.to_owned(), key.to_owned()), data.to_vec());
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn get(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let key = nvs_name(key);
        with_handle(namespace, false, |handle| {
            let mut size = buf.len();
            let ret = unsafe {
                nvs_get_blob(handle, key.as_ptr().cast(), buf.as_mut_ptr().cast(), &mut size)
            };
            check(ret).map(|()| size)
        })
    }

    #[cfg(target_os = "espidf")]
    fn put(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let key = nvs_name(key);
        with_handle(namespace, true, |handle| {
            check(unsafe {
                nvs_set_blob(handle, key.as_ptr().cast(), data.as_ptr().cast(), data.len())
            })?;
            check(unsafe { nvs_commit(handle) })
        })
    }
}

/// NUL-terminated NVS name; NVS truncates names to 15 bytes.
#[cfg(target_os = "espidf")]
fn nvs_name(s: &str) -> [u8; 16] {
    let mut out = [0u8; 16];
    let len = s.len().min(15);
    out[..len].copy_from_slice(&s.as_bytes()[..len]);
    out
}

#[cfg(target_os = "espidf")]
fn check(ret: esp_err_t) -> Result<(), StorageError> {
    match ret {
        r if r == ESP_OK as i32 => Ok(()),
        r if r == ESP_ERR_NVS_NOT_FOUND as i32 => Err(StorageError::NotFound),
        r if r == ESP_ERR_NVS_NOT_ENOUGH_SPACE as i32 => Err(StorageError::Full),
        r => {
            warn!("NVS: error {}", r);
            Err(StorageError::IoError)
        }
    }
}

/// Open `namespace`, run `f` with the handle, then close it.
#[cfg(target_os = "espidf")]
fn with_handle<T>(
    namespace: &str,
    write: bool,
    f: impl FnOnce(nvs_handle_t) -> Result<T, StorageError>,
) -> Result<T, StorageError> {
    let name = nvs_name(namespace);
    let mode = if write {
        nvs_open_mode_t_NVS_READWRITE
    } else {
        nvs_open_mode_t_NVS_READONLY
    };
    let mut handle: nvs_handle_t = 0;
    // SAFETY: `name` is NUL-terminated and outlives the call.
    check(unsafe { nvs_open(name.as_ptr().cast(), mode, &mut handle) })?;
    let result = f(handle);
    unsafe { nvs_close(handle) };
    result
}

fn validate_config(cfg: &SystemConfig) -> Result<(), ConfigError> {
    if !(cfg.ml_per_pulse.is_finite() && cfg.ml_per_pulse > 0.0 && cfg.ml_per_pulse <= 100.0) {
        return Err(ConfigError::ValidationFailed(
            "ml_per_pulse must be > 0.0 and <= 100.0",
        ));
    }
    if !(100..=60_000).contains(&cfg.last_pulse_timeout_ms) {
        return Err(ConfigError::ValidationFailed(
            "last_pulse_timeout_ms must be 100..=60000",
        ));
    }
    if !(1_000..=600_000).contains(&cfg.total_timeout_ms) {
        return Err(ConfigError::ValidationFailed(
            "total_timeout_ms must be 1000..=600000",
        ));
    }
    if !(10..=5_000).contains(&cfg.poll_interval_ms) {
        return Err(ConfigError::ValidationFailed(
            "poll_interval_ms must be 10..=5000",
        ));
    }
    if cfg.poll_interval_ms >= cfg.last_pulse_timeout_ms {
        return Err(ConfigError::ValidationFailed(
            "poll_interval_ms must be < last_pulse_timeout_ms",
        ));
    }
    if cfg.calibration_pulses == 0 {
        return Err(ConfigError::ValidationFailed(
            "calibration_pulses must be > 0",
        ));
    }
    if cfg.counter_offset as usize + counter::FOOTPRINT > EEPROM_SIZE {
        return Err(ConfigError::ValidationFailed(
            "counter_offset leaves no room for the counter",
        ));
    }
    if cfg.server.port == 0 {
        return Err(ConfigError::ValidationFailed("server.port must be non-zero"));
    }
    if cfg.server.hostname.is_empty() {
        return Err(ConfigError::ValidationFailed("server.hostname must be set"));
    }
    if !cfg.server.request_path.starts_with('/') || !cfg.server.result_path.starts_with('/') {
        return Err(ConfigError::ValidationFailed(
            "server paths must start with '/'",
        ));
    }
    if cfg.server.request_path.contains('?') {
        return Err(ConfigError::ValidationFailed(
            "server.request_path must not carry a query",
        ));
    }
    if !(100..=30_000).contains(&cfg.server.socket_timeout_ms) {
        return Err(ConfigError::ValidationFailed(
            "server.socket_timeout_ms must be 100..=30000",
        ));
    }
    Ok(())
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        let mut buf = [0u8; CONFIG_BLOB_MAX];
        match self.get(CONFIG_NAMESPACE, CONFIG_KEY, &mut buf) {
            Ok(len) => {
                let cfg: SystemConfig =
                    postcard::from_bytes(&buf[..len]).map_err(|_| ConfigError::Corrupted)?;
                info!("NvsAdapter: loaded config ({} bytes)", len);
                Ok(cfg)
            }
            Err(StorageError::NotFound) => {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(SystemConfig::default())
            }
            Err(e) => {
                warn!("NvsAdapter: config read failed ({}), using defaults", e);
                Ok(SystemConfig::default())
            }
        }
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let mut buf = [0u8; CONFIG_BLOB_MAX];
        let bytes = postcard::to_slice(config, &mut buf).map_err(|_| ConfigError::IoError)?;
        self.put(CONFIG_NAMESPACE, CONFIG_KEY, bytes).map_err(|e| match e {
            StorageError::Full => ConfigError::StorageFull,
            _ => ConfigError::IoError,
        })?;
        info!("NvsAdapter: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.get(namespace, key, buf)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.put(namespace, key, data)
    }
}

// ── Credentials ─────────────────────────────────────────────────────

impl NvsAdapter {
    /// Store `value` under `key` in the `auth` namespace unless it is
    /// already there. `None` or an empty value leaves storage untouched.
    ///
    /// Returns `Ok(true)` when flash was written.
    pub fn provision_credential(
        &mut self,
        key: &str,
        value: Option<&str>,
    ) -> Result<bool, StorageError> {
        let Some(value) = value.filter(|v| !v.is_empty()) else {
            return Ok(false);
        };
        if value.len() > MAX_CREDENTIAL_LEN {
            warn!("NvsAdapter: credential '{}' longer than {} bytes, ignored", key, MAX_CREDENTIAL_LEN);
            return Err(StorageError::IoError);
        }
        let mut buf = [0u8; MAX_CREDENTIAL_LEN];
        if matches!(self.read_credential(key, &mut buf), Ok(len) if &buf[..len] == value.as_bytes())
        {
            return Ok(false);
        }
        self.put(CRED_NAMESPACE, key, value.as_bytes())?;
        info!("NvsAdapter: credential '{}' provisioned", key);
        Ok(true)
    }

    fn read_credential(&self, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.get(CRED_NAMESPACE, key, buf)
    }

    /// HMAC passphrase, or the factory default if none was provisioned.
    pub fn passphrase(&self) -> heapless::Vec<u8, MAX_CREDENTIAL_LEN> {
        let mut buf = [0u8; MAX_CREDENTIAL_LEN];
        match self.read_credential(PASSPHRASE_KEY, &mut buf) {
            Ok(len) if len > 0 => heapless::Vec::from_slice(&buf[..len]).unwrap_or_default(),
            _ => {
                warn!("NvsAdapter: no passphrase provisioned, using factory default");
                heapless::Vec::from_slice(DEFAULT_PASSPHRASE.as_bytes()).unwrap_or_default()
            }
        }
    }

    /// WiFi station password; empty for open networks or when unset.
    pub fn wifi_password(&self) -> heapless::String<MAX_CREDENTIAL_LEN> {
        let mut buf = [0u8; MAX_CREDENTIAL_LEN];
        let len = self.read_credential(WIFI_PASSWORD_KEY, &mut buf).unwrap_or(0);
        core::str::from_utf8(&buf[..len])
            .ok()
            .and_then(|s| heapless::String::try_from(s).ok())
            .unwrap_or_default()
    }
}

impl Default for NvsAdapter {
    fn default() -> Self {
        // Last-resort fallback: on target every later call reports IoError.
        Self::new().unwrap_or_else(|_| Self::unopened())
    }
}
