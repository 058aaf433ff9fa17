//! Wear-leveled settings store
//!
//! Layout of the settings region:
//!
//! ```text
//! 0        4          8               4 + n * 4
//! | MAGIC  | slot 0   | slot 1 | ... | slot n-1 |
//! ```
//!
//! Every slot holds a 4-byte [`Settings`] record whose last byte is a
//! sentinel. Exactly one slot carries the valid sentinel; each store writes
//! the next slot first and only then zeroes the previous one, so an
//! interrupted store leaves two valid slots, never zero.

#[cfg(feature = "esp32-log")]
use esp_println::println;

use crate::brightness::MAX_SCALE;
use crate::buttons::MAX_DEMO_LEVEL;
use crate::error::{ConfigError, StorageError};

/// Marks an initialized settings region.
pub const STORE_MAGIC: u32 = 0xCAFE_D00D;

/// Last byte of a valid slot.
pub const SLOT_SENTINEL: u8 = 42;

/// Size of one settings slot in bytes.
pub const SLOT_SIZE: usize = 4;

const MAGIC_SIZE: usize = 4;
const EMPTY_SLOT: [u8; SLOT_SIZE] = [0; SLOT_SIZE];

/// Byte-addressable non-volatile memory holding the settings region.
pub trait SettingsStorage {
    /// Size of the region in bytes
    fn capacity(&self) -> usize;

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError>;

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError>;
}

/// Settings region backed by RAM.
#[derive(Debug, Clone)]
pub struct RamStorage<const SIZE: usize> {
    bytes: [u8; SIZE],
    writes: usize,
}

impl<const SIZE: usize> RamStorage<SIZE> {
    /// Region as it comes out of the factory (erased to `0xFF`)
    pub const fn erased() -> Self {
        Self {
            bytes: [0xFF; SIZE],
            writes: 0,
        }
    }

    pub const fn from_bytes(bytes: [u8; SIZE]) -> Self {
        Self { bytes, writes: 0 }
    }

    pub const fn bytes(&self) -> &[u8; SIZE] {
        &self.bytes
    }

    /// Number of `write` calls since creation
    pub const fn writes(&self) -> usize {
        self.writes
    }
}

impl<const SIZE: usize> SettingsStorage for RamStorage<SIZE> {
    fn capacity(&self) -> usize {
        SIZE
    }

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        let src = self
            .bytes
            .get(offset..offset + buf.len())
            .ok_or(StorageError { offset })?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        let dst = self
            .bytes
            .get_mut(offset..offset + data.len())
            .ok_or(StorageError { offset })?;
        dst.copy_from_slice(data);
        self.writes += 1;
        Ok(())
    }
}

/// Persisted user settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Settings {
    pub animation_id: u8,
    /// 0 = demo mode off, 1-5 = duration multiplier
    pub demo_level: u8,
    pub brightness_scale: u8,
}

impl Settings {
    /// Slot bytes, sentinel included
    pub const fn to_bytes(&self) -> [u8; SLOT_SIZE] {
        [
            self.animation_id,
            self.demo_level,
            self.brightness_scale,
            SLOT_SENTINEL,
        ]
    }

    /// Decode a slot; `None` unless the sentinel matches
    pub const fn from_bytes(bytes: [u8; SLOT_SIZE]) -> Option<Self> {
        if bytes[3] != SLOT_SENTINEL {
            return None;
        }
        Some(Self {
            animation_id: bytes[0],
            demo_level: bytes[1],
            brightness_scale: bytes[2],
        })
    }

    /// Reset every out-of-range field to 0
    pub const fn sanitized(self, animation_count: u8) -> Self {
        Self {
            animation_id: if self.animation_id < animation_count {
                self.animation_id
            } else {
                0
            },
            demo_level: if self.demo_level <= MAX_DEMO_LEVEL {
                self.demo_level
            } else {
                0
            },
            brightness_scale: if self.brightness_scale <= MAX_SCALE {
                self.brightness_scale
            } else {
                0
            },
        }
    }
}

/// Rotating settings store over a [`SettingsStorage`] region.
pub struct SettingsStore<S: SettingsStorage> {
    storage: S,
    slots: usize,
    animation_count: u8,
    /// Slot the next store writes to; `None` until loaded
    next: Option<usize>,
}

impl<S: SettingsStorage> SettingsStore<S> {
    /// Wrap a region. It must hold the magic word and at least two slots.
    pub fn new(storage: S, animation_count: u8) -> Result<Self, ConfigError> {
        let capacity = storage.capacity();
        let slots = capacity.saturating_sub(MAGIC_SIZE) / SLOT_SIZE;
        if slots < 2 {
            return Err(ConfigError::StorageTooSmall(capacity));
        }
        Ok(Self {
            storage,
            slots,
            animation_count,
            next: None,
        })
    }

    pub const fn slot_count(&self) -> usize {
        self.slots
    }

    /// Slot the next [`store`](Self::store) writes, once loaded
    pub const fn next_slot(&self) -> Option<usize> {
        self.next
    }

    pub const fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Find the current settings, initializing the region if needed.
    ///
    /// Falls back to defaults when no slot is valid.
    pub fn load(&mut self) -> Result<Settings, StorageError> {
        self.ensure_initialized()?;

        let mut found = None;
        for slot in 0..self.slots {
            if let Some(settings) = self.read_slot(slot) {
                found = Some((slot, settings));
                break;
            }
        }

        let settings = match found {
            Some((slot, settings)) => {
                self.next = Some((slot + 1) % self.slots);
                #[cfg(feature = "esp32-log")]
                println!(
                    "[SettingsStore.load] slot {}: {:?}, next slot {}",
                    slot,
                    settings,
                    (slot + 1) % self.slots
                );
                settings
            }
            None => {
                #[cfg(feature = "esp32-log")]
                println!("[SettingsStore.load] no valid slot, loading defaults");
                self.next = Some(0);
                Settings::default()
            }
        };

        Ok(settings.sanitized(self.animation_count))
    }

    /// Write `settings` to the next slot, then invalidate the one before it
    pub fn store(&mut self, settings: &Settings) -> Result<(), StorageError> {
        let slot = match self.next {
            Some(slot) => slot,
            None => {
                self.load()?;
                self.next.unwrap_or(0)
            }
        };
        let previous = (slot + self.slots - 1) % self.slots;

        self.storage
            .write(slot_offset(slot), &settings.to_bytes())?;
        self.next = Some((slot + 1) % self.slots);
        self.storage.write(slot_offset(previous), &EMPTY_SLOT)?;

        #[cfg(feature = "esp32-log")]
        println!(
            "[SettingsStore.store] {:?} at slot {}, cleared slot {}",
            settings, slot, previous
        );
        Ok(())
    }

    fn ensure_initialized(&mut self) -> Result<(), StorageError> {
        let mut magic = [0; MAGIC_SIZE];
        // An unreadable magic word counts as an uninitialized region
        if self.storage.read(0, &mut magic).is_ok() && u32::from_le_bytes(magic) == STORE_MAGIC {
            return Ok(());
        }

        #[cfg(feature = "esp32-log")]
        println!("[SettingsStore.load] initializing {} slots", self.slots);

        for slot in 0..self.slots {
            self.storage.write(slot_offset(slot), &EMPTY_SLOT)?;
        }
        self.storage.write(0, &STORE_MAGIC.to_le_bytes())
    }

    fn read_slot(&mut self, slot: usize) -> Option<Settings> {
        let mut bytes = EMPTY_SLOT;
        self.storage.read(slot_offset(slot), &mut bytes).ok()?;
        Settings::from_bytes(bytes)
    }
}

const fn slot_offset(slot: usize) -> usize {
    MAGIC_SIZE + slot * SLOT_SIZE
}
