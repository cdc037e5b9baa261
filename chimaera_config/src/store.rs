//! EEPROM port.
//!
//! The core only needs bulk reads and writes at byte offsets; the byte
//! primitives of the physical part live behind this trait.

use chimaera_common::consts::EEPROM_SIZE;

use crate::error::StoreError;

/// Byte-addressable persistent store.
pub trait Eeprom {
    /// Fill `buf` from `offset`.
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StoreError>;

    /// Write `data` at `offset`.
    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StoreError>;

    /// Capacity in bytes.
    fn capacity(&self) -> usize;
}

/// Reject accesses that do not fit `capacity`.
pub fn check_bounds(offset: usize, len: usize, capacity: usize) -> Result<(), StoreError> {
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(StoreError::OutOfBounds {
            offset,
            len,
            capacity,
        }),
    }
}

/// RAM-backed EEPROM, erased to `0xff` like a blank part.
#[derive(Debug, Clone)]
pub struct MemoryEeprom {
    bytes: Vec<u8>,
    writes: usize,
}

impl MemoryEeprom {
    /// Blank device of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: vec![0xff; capacity],
            writes: 0,
        }
    }

    /// Raw contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of write operations performed.
    pub fn write_count(&self) -> usize {
        self.writes
    }
}

impl Default for MemoryEeprom {
    fn default() -> Self {
        Self::new(EEPROM_SIZE)
    }
}

impl Eeprom for MemoryEeprom {
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StoreError> {
        check_bounds(offset, buf.len(), self.bytes.len())?;
        buf.copy_from_slice(&self.bytes[offset..offset + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StoreError> {
        check_bounds(offset, data.len(), self.bytes.len())?;
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
        self.writes += 1;
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_device_reads_erased() {
        let mut eeprom = MemoryEeprom::new(16);
        let mut buf = [0u8; 4];
        eeprom.read(0, &mut buf).unwrap();
        assert_eq!(buf, [0xff; 4]);
    }

    #[test]
    fn write_then_read() {
        let mut eeprom = MemoryEeprom::new(16);
        eeprom.write(4, &[1, 2, 3]).unwrap();
        let mut buf = [0u8; 5];
        eeprom.read(3, &mut buf).unwrap();
        assert_eq!(buf, [0xff, 1, 2, 3, 0xff]);
        assert_eq!(eeprom.write_count(), 1);
    }

    #[test]
    fn out_of_bounds_is_rejected() {
        let mut eeprom = MemoryEeprom::new(16);
        assert!(matches!(
            eeprom.write(14, &[0; 4]),
            Err(StoreError::OutOfBounds { offset: 14, len: 4, .. })
        ));
        let mut buf = [0u8; 2];
        assert!(eeprom.read(usize::MAX, &mut buf).is_err());
    }
}
