//! Versioned, fixed-size persisted images.
//!
//! The persisted schema is kept separate from the in-memory model so that
//! every field has a fixed width. Images are encoded with `bincode`'s
//! fixed-int little-endian encoding; the version header is serialized first
//! so a mismatch is detected from the leading bytes alone.
//!
//! ```text
//! ┌───────┬───────┬───────┬───────┬───────┬──────────────────────┐
//! │ magic │ major │ minor │ patch │ board │ payload ...          │
//! └───────┴───────┴───────┴───────┴───────┴──────────────────────┘
//! ```

use chimaera_common::consts::{
    BOARD_REVISION, CALIBRATION_SLOTS, CONFIG_MAGIC, CUSTOM_EXPR_LEN, CUSTOM_MAX_EXPR, CUSTOM_PATH_LEN,
    FIRMWARE_VERSION, NAME_LENGTH,
};
use chimaera_common::framing::Framing;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::net::Ipv4Addr;
use std::ops::RangeInclusive;
use tracing::warn;

use super::model::{
    AddAction, Comm, Config, Curve, INSTRUMENT_LENGTH, MovingAverage, OscMidi, SOCKET_KINDS,
    Scsynth, SocketConfig, Toggle, Tuio,
};
use crate::custom::{self, CustomItem, Destination};
use crate::error::StoreError;

/// Encoded size of [`ImageHeader`].
pub const HEADER_LEN: usize = 5;

/// Version header leading every persisted image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHeader {
    pub magic: u8,
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
    pub board: u8,
}

impl ImageHeader {
    /// Header of the running firmware.
    pub const fn current() -> Self {
        Self {
            magic: CONFIG_MAGIC,
            major: FIRMWARE_VERSION.0,
            minor: FIRMWARE_VERSION.1,
            patch: FIRMWARE_VERSION.2,
            board: BOARD_REVISION,
        }
    }

    /// Raw header bytes.
    pub const fn to_bytes(self) -> [u8; HEADER_LEN] {
        [self.magic, self.major, self.minor, self.patch, self.board]
    }

    /// Whether `bytes` start with the current header.
    pub fn matches(bytes: &[u8]) -> bool {
        bytes.get(..HEADER_LEN) == Some(&Self::current().to_bytes()[..])
    }
}

/// Encode `value` with the image codec.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(value).map_err(|e| StoreError::Codec(e.to_string()))
}

/// Decode `bytes` with the image codec; trailing bytes are ignored.
pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Codec(e.to_string()))
}

// ─── Configuration Image ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct SocketImage {
    ports: [u16; 2],
    ip: [u8; 4],
    enabled: bool,
    framing: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct CommImage {
    mac: [u8; 6],
    ip: [u8; 4],
    gateway: [u8; 4],
    subnet: [u8; 4],
    subnet_check: bool,
    locally: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct ScsynthImage {
    enabled: bool,
    instrument: [u8; INSTRUMENT_LENGTH],
    offset: u16,
    modulo: u16,
    prealloc: bool,
    addaction: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct OscMidiImage {
    enabled: bool,
    offset: f32,
    range: f32,
    effect: u8,
}

/// `0xff` marks a free slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct CustomItemImage {
    destination: u8,
    path: [u8; CUSTOM_PATH_LEN],
    expression: [u8; CUSTOM_EXPR_LEN],
}

/// Persisted configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigImage {
    header: ImageHeader,
    name: [u8; NAME_LENGTH],
    comm: CommImage,
    sockets: [SocketImage; SOCKET_KINDS],
    tuio: [u8; 3],
    dump: bool,
    scsynth: ScsynthImage,
    oscmidi: OscMidiImage,
    custom_enabled: bool,
    custom: [CustomItemImage; CUSTOM_MAX_EXPR],
    dummy: bool,
    output_offset: f64,
    config_rate: u8,
    sntp_tau: u8,
    rate: u16,
    movingaverage: [u8; 2],
    interpolation_order: u8,
    pacemaker: u8,
    curve: [f32; 3],
    calibration: u8,
    ipv4ll: bool,
}

impl ConfigImage {
    /// Header carried by this image.
    pub fn header(&self) -> ImageHeader {
        self.header
    }
}

impl From<&Config> for ConfigImage {
    fn from(config: &Config) -> Self {
        let socket = |s: &SocketConfig| SocketImage {
            ports: s.ports,
            ip: s.ip.octets(),
            enabled: s.enabled,
            framing: s.framing.into(),
        };
        let custom = |item: &CustomItem| CustomItemImage {
            destination: item.destination.map_or(0xff, |d| d as u8),
            path: to_fixed(item.path.as_str()),
            expression: to_fixed(item.expression.as_str()),
        };

        Self {
            header: ImageHeader::current(),
            name: to_fixed(config.name.as_str()),
            comm: CommImage {
                mac: config.comm.mac,
                ip: config.comm.ip.octets(),
                gateway: config.comm.gateway.octets(),
                subnet: config.comm.subnet.octets(),
                subnet_check: config.comm.subnet_check,
                locally: config.comm.locally,
            },
            sockets: std::array::from_fn(|i| socket(&config.sockets[i])),
            tuio: [
                config.tuio.enabled as u8,
                config.tuio.version,
                config.tuio.long_header as u8,
            ],
            dump: config.dump.enabled,
            scsynth: ScsynthImage {
                enabled: config.scsynth.enabled,
                instrument: to_fixed(config.scsynth.instrument.as_str()),
                offset: config.scsynth.offset,
                modulo: config.scsynth.modulo,
                prealloc: config.scsynth.prealloc,
                addaction: config.scsynth.addaction as u8,
            },
            oscmidi: OscMidiImage {
                enabled: config.oscmidi.enabled,
                offset: config.oscmidi.offset,
                range: config.oscmidi.range,
                effect: config.oscmidi.effect,
            },
            custom_enabled: config.custom.enabled,
            custom: std::array::from_fn(|i| custom(&config.custom.items[i])),
            dummy: config.dummy.enabled,
            output_offset: config.output_offset,
            config_rate: config.config_rate,
            sntp_tau: config.sntp_tau,
            rate: config.rate,
            movingaverage: [
                config.movingaverage.enabled as u8,
                config.movingaverage.bitshift,
            ],
            interpolation_order: config.interpolation_order,
            pacemaker: config.pacemaker,
            curve: [config.curve.a, config.curve.b, config.curve.c],
            calibration: config.calibration,
            ipv4ll: config.ipv4ll,
        }
    }
}

impl ConfigImage {
    /// Rebuild the in-memory model, recompiling custom expressions.
    ///
    /// Fields that do not decode cleanly or lie outside the range their
    /// handler accepts fall back to their defaults.
    pub fn into_config(self) -> Config {
        let defaults = Config::default();

        let sockets = std::array::from_fn(|i| {
            let img = &self.sockets[i];
            SocketConfig {
                id: defaults.sockets[i].id,
                ports: img.ports,
                ip: Ipv4Addr::from(img.ip),
                enabled: img.enabled,
                framing: Framing::try_from(img.framing).unwrap_or_default(),
            }
        });

        let items = std::array::from_fn(|i| restore_item(&self.custom[i]));

        let mut oscmidi = OscMidi {
            enabled: self.oscmidi.enabled,
            offset: self.oscmidi.offset,
            range: self.oscmidi.range,
            mul: 0.0,
            effect: bounded("oscmidi.effect", self.oscmidi.effect, 0..=127, defaults.oscmidi.effect),
        };
        oscmidi.update_mul();

        Config {
            name: from_fixed(&self.name).unwrap_or(defaults.name),
            comm: Comm {
                mac: self.comm.mac,
                ip: Ipv4Addr::from(self.comm.ip),
                gateway: Ipv4Addr::from(self.comm.gateway),
                subnet: Ipv4Addr::from(self.comm.subnet),
                subnet_check: self.comm.subnet_check,
                locally: self.comm.locally,
            },
            sockets,
            tuio: Tuio {
                enabled: self.tuio[0] != 0,
                version: bounded("tuio.version", self.tuio[1], 1..=2, defaults.tuio.version),
                long_header: self.tuio[2] != 0,
            },
            dump: Toggle {
                enabled: self.dump,
            },
            scsynth: Scsynth {
                enabled: self.scsynth.enabled,
                instrument: from_fixed(&self.scsynth.instrument)
                    .unwrap_or(defaults.scsynth.instrument),
                offset: self.scsynth.offset,
                modulo: bounded("scsynth.modulo", self.scsynth.modulo, 1..=u16::MAX, defaults.scsynth.modulo),
                prealloc: self.scsynth.prealloc,
                addaction: AddAction::from_code(self.scsynth.addaction),
            },
            oscmidi,
            custom: super::model::Custom {
                enabled: self.custom_enabled,
                items,
            },
            dummy: Toggle {
                enabled: self.dummy,
            },
            output_offset: self.output_offset,
            config_rate: bounded("config.rate", self.config_rate, 1..=10, defaults.config_rate),
            sntp_tau: bounded("sntp.tau", self.sntp_tau, 1..=10, defaults.sntp_tau),
            rate: self.rate,
            movingaverage: MovingAverage {
                enabled: self.movingaverage[0] != 0,
                bitshift: bounded(
                    "movingaverage.samples",
                    self.movingaverage[1],
                    1..=4,
                    defaults.movingaverage.bitshift,
                ),
            },
            interpolation_order: bounded(
                "interpolation.order",
                self.interpolation_order,
                0..=3,
                defaults.interpolation_order,
            ),
            pacemaker: self.pacemaker,
            curve: Curve {
                a: self.curve[0],
                b: self.curve[1],
                c: self.curve[2],
            },
            calibration: bounded(
                "calibration",
                self.calibration,
                0..=CALIBRATION_SLOTS - 1,
                defaults.calibration,
            ),
            ipv4ll: self.ipv4ll,
        }
    }
}

/// `value` if it lies in `range`, else `default`.
fn bounded<T: PartialOrd + Display + Copy>(field: &str, value: T, range: RangeInclusive<T>, default: T) -> T {
    if range.contains(&value) {
        value
    } else {
        warn!("Stored {} {} out of range, using {}", field, value, default);
        default
    }
}

fn restore_item(img: &CustomItemImage) -> CustomItem {
    let Some(destination) = Destination::from_code(img.destination) else {
        return CustomItem::default();
    };
    let (Some(path), Some(expression)) = (from_fixed(&img.path), from_fixed(&img.expression))
    else {
        return CustomItem::default();
    };
    match custom::compile(expression.as_str()) {
        Ok(program) => CustomItem {
            destination: Some(destination),
            path,
            expression,
            program,
        },
        Err(e) => {
            warn!("Dropping stored custom item {}: {}", path.as_str(), e);
            CustomItem::default()
        }
    }
}

/// Zero-padded copy of `s`, truncated to leave a terminator.
fn to_fixed<const N: usize>(s: &str) -> [u8; N] {
    let mut out = [0u8; N];
    let len = s.len().min(N - 1);
    out[..len].copy_from_slice(&s.as_bytes()[..len]);
    out
}

/// String up to the first NUL, if it is valid UTF-8.
fn from_fixed<const N: usize>(bytes: &[u8]) -> Option<heapless::String<N>> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let s = std::str::from_utf8(&bytes[..end]).ok()?;
    let mut out = heapless::String::new();
    out.push_str(s).ok()?;
    Some(out)
}
