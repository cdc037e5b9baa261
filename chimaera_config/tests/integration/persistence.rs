//! Integration test: configuration persistence across reboots.
//!
//! Validates: a blank or foreign image boots with defaults written back,
//! saved settings survive a reboot, `/config/load` discards unsaved
//! changes, and a hard reset restores the defaults on the next boot.

use chimaera_common::consts::{EEPROM_SIZE, FIRMWARE_VERSION};
use chimaera_common::osc::OscArg;
use chimaera_config::context::{Context, ResetMode};
use chimaera_config::error::StoreError;
use chimaera_config::registry::LoadOutcome;
use chimaera_config::sim::SimPorts;
use chimaera_config::store::{Eeprom, MemoryEeprom};
use std::cell::RefCell;
use std::rc::Rc;

use super::Device;

// ── Shared EEPROM ───────────────────────────────────────────────────

/// EEPROM surviving the contexts built on it.
#[derive(Clone)]
struct SharedEeprom(Rc<RefCell<MemoryEeprom>>);

impl SharedEeprom {
    fn blank() -> Self {
        Self(Rc::new(RefCell::new(MemoryEeprom::new(EEPROM_SIZE))))
    }
}

impl Eeprom for SharedEeprom {
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StoreError> {
        self.0.borrow_mut().read(offset, buf)
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StoreError> {
        self.0.borrow_mut().write(offset, data)
    }

    fn capacity(&self) -> usize {
        self.0.borrow().capacity()
    }
}

/// Boot a device on `eeprom`, keeping the reset register of `ports`.
fn boot(eeprom: &SharedEeprom, ports: SimPorts) -> (Device, LoadOutcome) {
    let mut ctx = Context::new(
        Box::new(eeprom.clone()),
        Box::new(ports.net.clone()),
        Box::new(ports.resolver.clone()),
        Box::new(ports.system.clone()),
        1,
    );
    let outcome = ctx.boot().unwrap();
    (Device::with_context(ctx, ports), outcome)
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn blank_device_boots_with_defaults_persisted() {
    let eeprom = SharedEeprom::blank();
    let (mut dev, outcome) = boot(&eeprom, SimPorts::default());
    assert_eq!(outcome, LoadOutcome::DefaultsRestored);
    assert_eq!(dev.query("/chimaera/name"), vec![OscArg::string("chimaera")]);

    let (_, outcome) = boot(&eeprom, SimPorts::default());
    assert_eq!(outcome, LoadOutcome::Loaded);
}

#[test]
fn saved_settings_survive_reboot() {
    let eeprom = SharedEeprom::blank();
    let (mut dev, _) = boot(&eeprom, SimPorts::default());
    dev.call("/chimaera/name", vec![OscArg::string("left-hand")]);
    dev.call("/chimaera/rate", vec![OscArg::Int(1000)]);
    dev.call("/chimaera/scsynth/instrument", vec![OscArg::string("grain")]);
    let replies = dev.call("/chimaera/config/save", vec![]);
    assert_eq!(replies[0].path, "/success");

    let (mut dev, outcome) = boot(&eeprom, SimPorts::default());
    assert_eq!(outcome, LoadOutcome::Loaded);
    assert_eq!(dev.query("/chimaera/name"), vec![OscArg::string("left-hand")]);
    assert_eq!(dev.query("/chimaera/rate"), vec![OscArg::Int(1000)]);
    assert_eq!(dev.query("/chimaera/scsynth/instrument"), vec![OscArg::string("grain")]);
}

#[test]
fn load_discards_unsaved_changes() {
    let eeprom = SharedEeprom::blank();
    let (mut dev, _) = boot(&eeprom, SimPorts::default());
    dev.call("/chimaera/interpolation/order", vec![OscArg::Int(0)]);
    dev.call("/chimaera/config/load", vec![]);
    assert_eq!(dev.query("/chimaera/interpolation/order"), vec![OscArg::Int(2)]);
}

#[test]
fn foreign_version_restores_defaults() {
    let eeprom = SharedEeprom::blank();
    let (mut dev, _) = boot(&eeprom, SimPorts::default());
    dev.call("/chimaera/name", vec![OscArg::string("stale")]);
    dev.call("/chimaera/config/save", vec![]);

    let (major, minor, patch) = FIRMWARE_VERSION;
    let mut header = [0u8; 5];
    eeprom.clone().read(0, &mut header).unwrap();
    assert_eq!(&header[1..4], &[major, minor, patch]);
    eeprom.clone().write(2, &[minor.wrapping_add(1)]).unwrap();

    let (mut dev, outcome) = boot(&eeprom, SimPorts::default());
    assert_eq!(outcome, LoadOutcome::DefaultsRestored);
    assert_eq!(dev.query("/chimaera/name"), vec![OscArg::string("chimaera")]);

    let (_, outcome) = boot(&eeprom, SimPorts::default());
    assert_eq!(outcome, LoadOutcome::Loaded);
}

#[test]
fn hard_reset_restores_defaults_on_next_boot() {
    let eeprom = SharedEeprom::blank();
    let ports = SimPorts::default();
    let (mut dev, _) = boot(&eeprom, ports.clone());
    dev.call("/chimaera/name", vec![OscArg::string("custom")]);
    dev.call("/chimaera/config/save", vec![]);

    let replies = dev.call("/chimaera/reset/hard", vec![]);
    assert_eq!(replies[0].path, "/success");
    assert_eq!(ports.system.stored_mode(), Some(ResetMode::Hard));
    assert!(dev.ctx.reset.is_some());

    let (mut dev, outcome) = boot(&eeprom, ports.clone());
    assert_eq!(outcome, LoadOutcome::DefaultsRestored);
    assert_eq!(dev.query("/chimaera/name"), vec![OscArg::string("chimaera")]);
    assert_eq!(ports.system.stored_mode(), None);
}
