//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ PourStation / FlowMeter / OtpCounter (domain)
//! ```
//!
//! Driven adapters (valve, RFID reader, clock, storage, event sinks)
//! implement these traits.  The domain consumes them via generics, so the
//! pour logic never touches hardware directly and every piece can be
//! exercised on the host with mocks.
//!
//! ## Security notes
//!
//! - **ConfigPort** implementations MUST validate before persisting.
//! - The HMAC passphrase never goes through `ConfigPort`; `NvsAdapter`
//!   keeps it in a separate credential namespace.

use crate::config::SystemConfig;

use super::events::PourEvent;

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic millisecond clock plus a blocking delay.
///
/// The flow measurement loop samples `now_ms` once per poll and sleeps
/// between polls.  Test doubles advance virtual time inside `sleep_ms`.
pub trait Clock {
    /// Milliseconds since an arbitrary fixed origin (boot on target).
    fn now_ms(&self) -> u64;

    /// Block the calling task for `ms` milliseconds.
    fn sleep_ms(&mut self, ms: u32);
}

// ───────────────────────────────────────────────────────────────
// Byte-addressable non-volatile store (EEPROM semantics)
// ───────────────────────────────────────────────────────────────

/// Byte-addressable non-volatile memory.
///
/// Erased cells read back as `0xFF`.  Writes may be buffered until
/// [`commit`](ByteStore::commit); implementations that write through can
/// leave the default no-op.
pub trait ByteStore {
    /// Number of addressable bytes.
    fn capacity(&self) -> usize;

    /// Read one byte.  Out-of-range addresses read as erased (`0xFF`).
    fn read_byte(&self, addr: usize) -> u8;

    /// Write one byte.  Out-of-range addresses are ignored.
    fn write_byte(&mut self, addr: usize, value: u8);

    /// Flush buffered writes to the backing medium.
    fn commit(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Flow pulse interrupt (driven adapter: domain → GPIO ISR wiring)
// ───────────────────────────────────────────────────────────────

/// Enables and disables delivery of flow-sensor edges to
/// [`pulse_isr`](crate::sensors::flow::pulse_isr).
pub trait PulseInterrupt {
    /// Start delivering rising edges to the pulse handler.
    fn attach(&mut self);

    /// Stop delivering edges.  Must be idempotent.
    fn detach(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Actuator / identification ports
// ───────────────────────────────────────────────────────────────

/// Solenoid valve gating the tap.
pub trait ValvePort {
    fn open(&mut self);
    fn close(&mut self);
    fn is_open(&self) -> bool;
}

/// An RFID tag as read off the wire (ten ASCII characters for EM4100).
pub type RfidTag = heapless::String<{ crate::drivers::rfid::TAG_LEN }>;

/// Identifies the person pouring.
pub trait TagReader {
    /// Wait for a tag.  `timeout_ms == 0` waits indefinitely.
    /// Returns `None` when the timeout expires without a full frame.
    fn read_tag(&mut self, timeout_ms: u32) -> Option<RfidTag>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`PourEvent`]s through this port.
/// Adapters decide where they go (serial log, display, etc.).
pub trait EventSink {
    fn emit(&mut self, event: &PourEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// # Security
///
/// Implementations MUST validate config values before persisting.
/// Invalid ranges should be rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped.  A zero or negative flow calibration would make
/// every pour unbounded.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`SystemConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Namespaced blob storage backing the emulated EEPROM.
///
/// Writes MUST be atomic: a power loss leaves either the old or the new
/// blob, never a mix. The counter relies on this.
pub trait StoragePort {
    /// Read a blob into `buf`.  Returns the number of bytes written.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Replace a blob.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed integrity / deserialization check.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
