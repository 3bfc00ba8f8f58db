//! Persistent one-time-password counter.
//!
//! Layout in the byte store, relative to `base`:
//!
//! ```text
//!   base + 0      sentinel (0xAA once initialised)
//!   base + 1..5   counter, u32 little-endian
//! ```
//!
//! Every signed request increments the counter before signing, so the
//! server can reject anything it has already seen.  Only bytes that
//! actually change are rewritten to spare flash/EEPROM endurance.

use log::{info, warn};

use crate::app::ports::ByteStore;

const SENTINEL_OFFSET: usize = 0;
const COUNTER_OFFSET: usize = 1;

/// Sentinel marking an initialised counter.
pub const INITIALIZED: u8 = 0xAA;
/// Bytes of store occupied starting at `base`.
pub const FOOTPRINT: usize = COUNTER_OFFSET + core::mem::size_of::<u32>();

/// Monotonic replay-protection counter backed by a [`ByteStore`].
pub struct OtpCounter<S: ByteStore> {
    store: S,
    base: usize,
    count: u32,
}

impl<S: ByteStore> OtpCounter<S> {
    /// Load the counter at `base`, initialising it to 0 if the sentinel
    /// is absent.
    pub fn begin(store: S, base: usize) -> Self {
        let mut counter = Self {
            store,
            base,
            count: 0,
        };

        if counter.store.read_byte(base + SENTINEL_OFFSET) == INITIALIZED {
            counter.reload();
            info!("otp: loaded counter={} at offset {}", counter.count, base);
        } else {
            // Value first, sentinel last: losing power in between just
            // re-runs initialisation on the next boot.
            counter.set(0);
            counter.store.write_byte(base + SENTINEL_OFFSET, INITIALIZED);
            counter.commit();
            info!("otp: initialised counter at offset {}", base);
        }
        counter
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Advance and persist the counter, returning the new value.
    ///
    /// At `u32::MAX` the counter stays put and `None` is returned: a
    /// wrapped value would repeat one the server has already accepted.
    pub fn increment(&mut self) -> Option<u32> {
        let Some(next) = self.count.checked_add(1) else {
            warn!("otp: counter exhausted at {}", self.count);
            return None;
        };
        self.set(next);
        Some(next)
    }

    /// No further value can be issued.
    pub fn is_exhausted(&self) -> bool {
        self.count == u32::MAX
    }

    /// Persist `value`, writing only the bytes that differ.
    pub fn set(&mut self, value: u32) {
        self.count = value;
        let mut dirty = false;
        for (i, byte) in value.to_le_bytes().into_iter().enumerate() {
            let addr = self.base + COUNTER_OFFSET + i;
            if self.store.read_byte(addr) != byte {
                self.store.write_byte(addr, byte);
                dirty = true;
            }
        }
        if dirty {
            self.commit();
        }
    }

    /// Clear the sentinel so the next [`begin`](Self::begin) starts over.
    pub fn unset(&mut self) {
        self.store.write_byte(self.base + SENTINEL_OFFSET, 0xFF);
        self.commit();
    }

    /// Re-read the persisted value.
    pub fn reload(&mut self) {
        let mut bytes = [0u8; 4];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = self.store.read_byte(self.base + COUNTER_OFFSET + i);
        }
        self.count = u32::from_le_bytes(bytes);
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Give the store back, e.g. to simulate a power cycle.
    pub fn into_store(self) -> S {
        self.store
    }

    fn commit(&mut self) {
        if let Err(e) = self.store.commit() {
            warn!("otp: store commit failed: {}", e);
        }
    }
}
