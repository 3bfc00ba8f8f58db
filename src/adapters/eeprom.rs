//! Byte-addressable EEPROM emulated on top of a [`StoragePort`] blob.
//!
//! The ESP32 has no EEPROM.  The whole image is held in RAM, read once at
//! construction and written back as a single NVS blob on
//! [`commit`](ByteStore::commit), which NVS makes atomic.  Cells that
//! were never written read as `0xFF`, like erased EEPROM.

use log::{debug, warn};

use crate::app::ports::{ByteStore, StorageError, StoragePort};

/// Size of the emulated EEPROM image.
pub const EEPROM_SIZE: usize = 64;

const NAMESPACE: &str = "eeprom";
const IMAGE_KEY: &str = "image";

pub struct NvsEeprom<S: StoragePort> {
    storage: S,
    image: [u8; EEPROM_SIZE],
    dirty: bool,
}

impl<S: StoragePort> NvsEeprom<S> {
    /// Load the image from `storage`; a missing or unreadable blob yields
    /// an erased image.
    pub fn new(storage: S) -> Self {
        let mut image = [0xFF; EEPROM_SIZE];
        match storage.read(NAMESPACE, IMAGE_KEY, &mut image) {
            Ok(len) => debug!("eeprom: loaded {} bytes", len),
            Err(StorageError::NotFound) => debug!("eeprom: no image, starting erased"),
            Err(e) => {
                warn!("eeprom: image read failed ({}), starting erased", e);
                image = [0xFF; EEPROM_SIZE];
            }
        }
        Self {
            storage,
            image,
            dirty: false,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Drop the RAM image and hand back the backing storage.
    pub fn into_inner(self) -> S {
        self.storage
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl<S: StoragePort> ByteStore for NvsEeprom<S> {
    fn capacity(&self) -> usize {
        EEPROM_SIZE
    }

    fn read_byte(&self, addr: usize) -> u8 {
        self.image.get(addr).copied().unwrap_or(0xFF)
    }

    fn write_byte(&mut self, addr: usize, value: u8) {
        match self.image.get_mut(addr) {
            Some(cell) if *cell != value => {
                *cell = value;
                self.dirty = true;
            }
            Some(_) => {}
            None => warn!("eeprom: write past end (addr {})", addr),
        }
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        if !self.dirty {
            return Ok(());
        }
        self.storage.write(NAMESPACE, IMAGE_KEY, &self.image)?;
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::nvs::NvsAdapter;

    #[test]
    fn fresh_image_reads_erased() {
        let e = NvsEeprom::new(NvsAdapter::new().unwrap());
        assert_eq!(e.read_byte(0), 0xFF);
        assert_eq!(e.read_byte(EEPROM_SIZE - 1), 0xFF);
        assert_eq!(e.read_byte(EEPROM_SIZE), 0xFF);
        assert!(!e.is_dirty());
    }

    #[test]
    fn commit_persists_across_reload() {
        let mut e = NvsEeprom::new(NvsAdapter::new().unwrap());
        e.write_byte(3, 0x42);
        assert!(e.is_dirty());
        e.commit().unwrap();
        assert!(!e.is_dirty());

        let e = NvsEeprom::new(e.into_inner());
        assert_eq!(e.read_byte(3), 0x42);
    }

    #[test]
    fn uncommitted_writes_are_lost() {
        let mut e = NvsEeprom::new(NvsAdapter::new().unwrap());
        e.write_byte(0, 1);
        let e = NvsEeprom::new(e.into_inner());
        assert_eq!(e.read_byte(0), 0xFF);
    }

    #[test]
    fn rewriting_same_value_stays_clean() {
        let mut e = NvsEeprom::new(NvsAdapter::new().unwrap());
        e.write_byte(5, 0xFF);
        assert!(!e.is_dirty());
        e.write_byte(EEPROM_SIZE + 1, 0);
        assert!(!e.is_dirty());
    }
}
