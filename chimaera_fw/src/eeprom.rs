//! File-backed EEPROM.
//!
//! The emulated part is one file of [`EEPROM_SIZE`] bytes. A missing file
//! is created erased to `0xff`, so a fresh install boots like a blank
//! device and restores the defaults.

use chimaera_common::consts::EEPROM_SIZE;
use chimaera_config::error::StoreError;
use chimaera_config::store::{Eeprom, check_bounds};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// EEPROM image kept in a regular file.
#[derive(Debug)]
pub struct FileEeprom {
    path: PathBuf,
    file: File,
    capacity: usize,
}

fn device_error(path: &Path, what: &str, e: std::io::Error) -> StoreError {
    StoreError::Device(format!("{what} {}: {e}", path.display()))
}

impl FileEeprom {
    /// Open the image at `path`, creating a blank one if needed.
    ///
    /// # Errors
    /// `StoreError::Device` if the file cannot be created or opened, or if
    /// an existing file has the wrong size.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::with_capacity(path, EEPROM_SIZE)
    }

    /// Open an image of `capacity` bytes.
    pub fn with_capacity<P: AsRef<Path>>(path: P, capacity: usize) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|e| device_error(parent, "cannot create", e))?;
            }
            fs::write(&path, vec![0xff; capacity]).map_err(|e| device_error(&path, "cannot create", e))?;
            info!("Created blank EEPROM image {:?} ({} bytes)", path, capacity);
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| device_error(&path, "cannot open", e))?;
        let len = file
            .metadata()
            .map_err(|e| device_error(&path, "cannot stat", e))?
            .len() as usize;
        if len != capacity {
            return Err(StoreError::Device(format!(
                "{} holds {len} bytes, expected {capacity}",
                path.display()
            )));
        }

        debug!("Opened EEPROM image {:?}", path);
        Ok(Self { path, file, capacity })
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Eeprom for FileEeprom {
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StoreError> {
        check_bounds(offset, buf.len(), self.capacity)?;
        self.file
            .seek(SeekFrom::Start(offset as u64))
            .and_then(|_| self.file.read_exact(buf))
            .map_err(|e| device_error(&self.path, "cannot read", e))
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StoreError> {
        check_bounds(offset, data.len(), self.capacity)?;
        self.file
            .seek(SeekFrom::Start(offset as u64))
            .and_then(|_| self.file.write_all(data))
            .and_then(|_| self.file.sync_data())
            .map_err(|e| device_error(&self.path, "cannot write", e))
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}
