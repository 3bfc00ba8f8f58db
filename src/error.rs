//! Unified error type for the PourLogic firmware.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! boot sequence and the pour loop uniform.  All variants are `Copy` so
//! they can be logged and carried in events without allocation.

use core::fmt;

use crate::adapters::wifi::ConnectivityError;
use crate::app::ports::{ConfigError, StorageError};
use crate::client::ExchangeError;
use crate::drivers::hw_init::HwInitError;

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An authenticated exchange with the pour server failed.
    Exchange(ExchangeError),
    /// Persistent storage failed.
    Storage(StorageError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
    /// Peripheral initialisation failed.
    Hardware(HwInitError),
    /// The station could not join the network.
    Connectivity(ConnectivityError),
    /// A calibration run did not produce a usable constant.
    Calibration,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exchange(e) => write!(f, "exchange: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Hardware(e) => write!(f, "hardware: {e}"),
            Self::Connectivity(e) => write!(f, "wifi: {e}"),
            Self::Calibration => write!(f, "calibration failed"),
        }
    }
}

impl std::error::Error for Error {}

impl From<ExchangeError> for Error {
    fn from(e: ExchangeError) -> Self {
        Self::Exchange(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<HwInitError> for Error {
    fn from(e: HwInitError) -> Self {
        Self::Hardware(e)
    }
}

impl From<ConnectivityError> for Error {
    fn from(e: ConnectivityError) -> Self {
        Self::Connectivity(e)
    }
}

/// Convenience alias used throughout the firmware.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_preserve_source() {
        let e: Error = ExchangeError::Rejected(403).into();
        assert_eq!(e, Error::Exchange(ExchangeError::Rejected(403)));
        let e: Error = StorageError::Full.into();
        assert_eq!(e, Error::Storage(StorageError::Full));
    }

    #[test]
    fn display_prefixes_subsystem() {
        let e = Error::from(ExchangeError::BadSignature);
        assert_eq!(e.to_string(), "exchange: signature mismatch");
    }
}
