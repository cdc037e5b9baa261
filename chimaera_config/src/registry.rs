//! Configuration registry.
//!
//! Lifecycle: compiled-in defaults at boot, replaced by the stored image
//! when its version header matches, mutated only through handlers and
//! persisted on request. A stored image with a foreign header is never
//! migrated: the defaults are loaded and written back.

pub mod image;
pub mod model;

pub use model::*;

use chimaera_common::consts::{EEPROM_CONFIG_OFFSET, EEPROM_CONFIG_REGION};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::store::Eeprom;
use image::{ConfigImage, HEADER_LEN, ImageHeader};

/// How [`load_config`] obtained its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Stored image was read.
    Loaded,
    /// Defaults were loaded and persisted.
    DefaultsRestored,
}

/// Persist `config` at the configuration offset.
///
/// # Errors
/// `StoreError::ImageTooLarge` if the image outgrows its region, or any
/// device error.
pub fn save_config(config: &Config, eeprom: &mut dyn Eeprom) -> Result<(), StoreError> {
    let bytes = image::encode(&ConfigImage::from(config))?;
    if bytes.len() > EEPROM_CONFIG_REGION {
        return Err(StoreError::ImageTooLarge {
            size: bytes.len(),
            region: EEPROM_CONFIG_REGION,
        });
    }
    eeprom.write(EEPROM_CONFIG_OFFSET, &bytes)?;
    debug!("Saved configuration image ({} bytes)", bytes.len());
    Ok(())
}

/// Read the stored configuration, restoring and persisting the defaults
/// when the stored version header does not match.
pub fn load_config(eeprom: &mut dyn Eeprom) -> Result<(Config, LoadOutcome), StoreError> {
    let mut header = [0u8; HEADER_LEN];
    eeprom.read(EEPROM_CONFIG_OFFSET, &mut header)?;

    if ImageHeader::matches(&header) {
        let mut bytes = vec![0u8; EEPROM_CONFIG_REGION];
        eeprom.read(EEPROM_CONFIG_OFFSET, &mut bytes)?;
        match image::decode::<ConfigImage>(&bytes) {
            Ok(img) => {
                info!("Loaded configuration image");
                return Ok((img.into_config(), LoadOutcome::Loaded));
            }
            Err(e) => warn!("Stored configuration unreadable, restoring defaults: {}", e),
        }
    } else {
        warn!(
            "Configuration version mismatch (stored {:02x?}, expected {:02x?}), restoring defaults",
            header,
            ImageHeader::current().to_bytes()
        );
    }

    let config = Config::default();
    save_config(&config, eeprom)?;
    Ok((config, LoadOutcome::DefaultsRestored))
}
