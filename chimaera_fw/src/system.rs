//! Host system port.
//!
//! The battery-backed reset register is a one-byte file next to the
//! EEPROM image; the unique id is derived from the service name so that
//! every emulated device keeps a stable uid across restarts.

use chimaera_config::context::{ResetMode, SystemControl};
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File-backed reset register and derived uid.
#[derive(Debug, Clone)]
pub struct HostSystem {
    register: PathBuf,
    uid: String,
}

impl HostSystem {
    /// Register stored at `register`, uid derived from `service_name`.
    pub fn new<P: AsRef<Path>>(register: P, service_name: &str) -> Self {
        Self {
            register: register.as_ref().to_path_buf(),
            uid: derive_uid(service_name),
        }
    }

    /// Register file belonging to the EEPROM image at `eeprom`.
    pub fn register_path(eeprom: &Path) -> PathBuf {
        let mut name = eeprom.as_os_str().to_owned();
        name.push(".reset");
        PathBuf::from(name)
    }
}

/// 96-bit id as 24 hex digits.
fn derive_uid(service_name: &str) -> String {
    let mut hi = DefaultHasher::new();
    service_name.hash(&mut hi);
    let mut lo = DefaultHasher::new();
    (service_name, "uid").hash(&mut lo);
    format!("{:016x}{:08x}", hi.finish(), lo.finish() as u32)
}

impl SystemControl for HostSystem {
    fn uid(&self) -> String {
        self.uid.clone()
    }

    fn write_reset_mode(&mut self, mode: ResetMode) {
        if let Err(e) = fs::write(&self.register, [mode as u8]) {
            warn!("Reset register {:?} not written: {}", self.register, e);
        }
    }

    fn take_reset_mode(&mut self) -> Option<ResetMode> {
        let bytes = fs::read(&self.register).ok()?;
        if let Err(e) = fs::remove_file(&self.register) {
            warn!("Reset register {:?} not cleared: {}", self.register, e);
        }
        let mode = bytes.first().copied().and_then(ResetMode::from_code);
        debug!("Reset register held {:?}", mode);
        mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn mode_is_read_once() {
        let dir = tempdir().unwrap();
        let mut system = HostSystem::new(dir.path().join("reg"), "lab");
        assert_eq!(system.take_reset_mode(), None);

        system.write_reset_mode(ResetMode::Bootloader);
        assert_eq!(system.take_reset_mode(), Some(ResetMode::Bootloader));
        assert_eq!(system.take_reset_mode(), None);
    }

    #[test]
    fn uid_is_stable_per_service() {
        let a = HostSystem::new("/tmp/a", "left");
        let b = HostSystem::new("/tmp/b", "left");
        let c = HostSystem::new("/tmp/c", "right");
        assert_eq!(a.uid(), b.uid());
        assert_ne!(a.uid(), c.uid());
        assert_eq!(a.uid().len(), 24);
    }

    #[test]
    fn register_sits_next_to_eeprom() {
        assert_eq!(
            HostSystem::register_path(Path::new("/var/lib/chimaera.eeprom")),
            PathBuf::from("/var/lib/chimaera.eeprom.reset")
        );
    }
}
