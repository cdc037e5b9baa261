//! In-memory configuration model and compiled-in defaults.

use chimaera_common::consts::{CUSTOM_MAX_EXPR, NAME_LENGTH};
use chimaera_common::framing::Framing;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::custom::CustomItem;
use crate::error::ConfigError;

/// Number of socket kinds.
pub const SOCKET_KINDS: usize = 6;

/// Index of the local port in [`SocketConfig::ports`].
pub const SRC_PORT: usize = 0;
/// Index of the remote port in [`SocketConfig::ports`].
pub const DST_PORT: usize = 1;

/// Capacity of the synth instrument name.
pub const INSTRUMENT_LENGTH: usize = 8;

// ─── Sockets ────────────────────────────────────────────────────────

/// Network service sockets, numbered like the hardware socket slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketKind {
    Output = 1,
    Config = 2,
    Sntp = 3,
    Debug = 4,
    Mdns = 5,
    Dhcpc = 6,
}

impl SocketKind {
    /// All kinds in slot order.
    pub const ALL: [SocketKind; SOCKET_KINDS] = [
        SocketKind::Output,
        SocketKind::Config,
        SocketKind::Sntp,
        SocketKind::Debug,
        SocketKind::Mdns,
        SocketKind::Dhcpc,
    ];

    /// Sockets re-pointed by host-wide address changes.
    pub const SERVICES: [SocketKind; 4] = [
        SocketKind::Output,
        SocketKind::Config,
        SocketKind::Sntp,
        SocketKind::Debug,
    ];

    /// Zero-based table index.
    pub const fn index(self) -> usize {
        self as usize - 1
    }

    /// Hardware socket slot number.
    pub const fn slot(self) -> u8 {
        self as u8
    }

    /// Lowercase name, as used in paths.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Output => "output",
            Self::Config => "config",
            Self::Sntp => "sntp",
            Self::Debug => "debug",
            Self::Mdns => "mdns",
            Self::Dhcpc => "dhcpc",
        }
    }
}

impl fmt::Display for SocketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One socket descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketConfig {
    /// Hardware slot number.
    pub id: u8,
    /// `[local, remote]` ports.
    pub ports: [u16; 2],
    /// Remote address.
    pub ip: Ipv4Addr,
    /// Whether the socket is open.
    pub enabled: bool,
    /// Framing of outgoing messages.
    pub framing: Framing,
}

impl SocketConfig {
    const fn new(kind: SocketKind, src: u16, dst: u16, ip: Ipv4Addr, enabled: bool) -> Self {
        Self {
            id: kind.slot(),
            ports: [src, dst],
            ip,
            enabled,
            framing: Framing::Udp,
        }
    }

    /// Local port.
    pub fn local_port(&self) -> u16 {
        self.ports[SRC_PORT]
    }

    /// Remote port.
    pub fn remote_port(&self) -> u16 {
        self.ports[DST_PORT]
    }

    /// Remote endpoint.
    pub fn remote(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.ip, self.remote_port())
    }
}

// ─── Field Groups ───────────────────────────────────────────────────

/// Network identity of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comm {
    pub mac: [u8; 6],
    pub ip: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub subnet: Ipv4Addr,
    /// Stored only; no filtering is applied.
    pub subnet_check: bool,
    /// Locally administered MAC flag, stored only.
    pub locally: bool,
}

/// TUIO output engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tuio {
    pub enabled: bool,
    /// Protocol version, 1 or 2.
    pub version: u8,
    pub long_header: bool,
}

/// Engine with only an on/off switch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toggle {
    pub enabled: bool,
}

/// SuperCollider node add actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddAction {
    #[default]
    Head = 0,
    Tail = 1,
    Before = 2,
    After = 3,
    Replace = 4,
}

impl AddAction {
    /// All actions in wire order.
    pub const ALL: [AddAction; 5] = [
        AddAction::Head,
        AddAction::Tail,
        AddAction::Before,
        AddAction::After,
        AddAction::Replace,
    ];

    /// Lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Head => "head",
            Self::Tail => "tail",
            Self::Before => "before",
            Self::After => "after",
            Self::Replace => "replace",
        }
    }

    /// Action from its wire code, clamped to the last one.
    pub fn from_code(code: u8) -> Self {
        Self::ALL[(code as usize).min(Self::ALL.len() - 1)]
    }
}

/// SuperCollider synth engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scsynth {
    pub enabled: bool,
    pub instrument: heapless::String<INSTRUMENT_LENGTH>,
    /// First synth node id.
    pub offset: u16,
    /// Node id wrap-around.
    pub modulo: u16,
    pub prealloc: bool,
    pub addaction: AddAction,
}

/// OSC-MIDI engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OscMidi {
    pub enabled: bool,
    /// Lowest note.
    pub offset: f32,
    /// Note range over the full sensor length.
    pub range: f32,
    /// Pitch bend multiplier derived from `range`.
    pub mul: f32,
    /// Controller number of the pressure effect.
    pub effect: u8,
}

impl OscMidi {
    /// Recompute `mul` after a range change.
    pub fn update_mul(&mut self) {
        self.mul = if self.range > 0.0 {
            0x1fff as f32 / self.range
        } else {
            0.0
        };
    }
}

/// Custom expression engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Custom {
    pub enabled: bool,
    pub items: [CustomItem; CUSTOM_MAX_EXPR],
}

/// Moving average over `1 << bitshift` samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovingAverage {
    pub enabled: bool,
    pub bitshift: u8,
}

impl MovingAverage {
    /// Window length in samples.
    pub fn samples(&self) -> u32 {
        1 << self.bitshift
    }
}

/// Default response curve `y = a + b*x + c*x^2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    pub a: f32,
    pub b: f32,
    pub c: f32,
}

// ─── Registry ───────────────────────────────────────────────────────

/// Configuration registry contents.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub name: heapless::String<NAME_LENGTH>,
    pub comm: Comm,
    pub sockets: [SocketConfig; SOCKET_KINDS],
    pub tuio: Tuio,
    pub dump: Toggle,
    pub scsynth: Scsynth,
    pub oscmidi: OscMidi,
    pub custom: Custom,
    pub dummy: Toggle,
    /// Output timestamp offset in seconds.
    pub output_offset: f64,
    /// Config socket poll rate in Hz.
    pub config_rate: u8,
    /// Seconds between SNTP requests.
    pub sntp_tau: u8,
    /// Sample rate in Hz, 0 runs unthrottled.
    pub rate: u16,
    pub movingaverage: MovingAverage,
    pub interpolation_order: u8,
    /// Pacemaker period as a power of two in frames.
    pub pacemaker: u8,
    pub curve: Curve,
    /// Default calibration slot.
    pub calibration: u8,
    pub ipv4ll: bool,
}

impl Config {
    /// Socket descriptor of `kind`.
    pub fn socket(&self, kind: SocketKind) -> &SocketConfig {
        &self.sockets[kind.index()]
    }

    /// Mutable socket descriptor of `kind`.
    pub fn socket_mut(&mut self, kind: SocketKind) -> &mut SocketConfig {
        &mut self.sockets[kind.index()]
    }

    /// Replace the device name.
    ///
    /// # Errors
    /// `ConfigError::TooLong` if `name` does not leave room for the
    /// terminator of the persisted buffer.
    pub fn set_name(&mut self, name: &str) -> Result<(), ConfigError> {
        self.name = bounded_string(name)?;
        Ok(())
    }
}

/// Copy `s` into a fixed buffer, keeping one slot for the terminator.
pub fn bounded_string<const N: usize>(s: &str) -> Result<heapless::String<N>, ConfigError> {
    let max = N - 1;
    if s.len() > max {
        return Err(ConfigError::TooLong { len: s.len(), max });
    }
    let mut out = heapless::String::new();
    out.push_str(s)
        .map_err(|_| ConfigError::TooLong { len: s.len(), max })?;
    Ok(out)
}

const LAN_BROADCAST: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 255);
const LAN_HOST: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 10);

impl Default for Config {
    fn default() -> Self {
        let mut name = heapless::String::new();
        let _ = name.push_str("chimaera");
        let mut instrument = heapless::String::new();
        let _ = instrument.push_str("base");

        Self {
            name,
            comm: Comm {
                // locally administered unicast
                mac: [(0x1a | 0b10) & !0b1, 0x2b, 0x3c, 0x4d, 0x5e, 0x6f],
                ip: Ipv4Addr::new(192, 168, 1, 177),
                gateway: Ipv4Addr::new(192, 168, 1, 0),
                subnet: Ipv4Addr::new(255, 255, 255, 0),
                subnet_check: false,
                locally: false,
            },
            sockets: [
                SocketConfig::new(SocketKind::Output, 3333, 3333, LAN_BROADCAST, true),
                SocketConfig::new(SocketKind::Config, 4444, 4444, LAN_BROADCAST, true),
                SocketConfig::new(SocketKind::Sntp, 123, 123, LAN_HOST, true),
                SocketConfig::new(SocketKind::Debug, 6666, 6666, LAN_BROADCAST, true),
                SocketConfig::new(SocketKind::Mdns, 5353, 5353, Ipv4Addr::new(224, 0, 0, 251), true),
                SocketConfig::new(SocketKind::Dhcpc, 68, 67, Ipv4Addr::BROADCAST, false),
            ],
            tuio: Tuio {
                enabled: false,
                version: 2,
                long_header: false,
            },
            dump: Toggle::default(),
            scsynth: Scsynth {
                enabled: false,
                instrument,
                offset: 1000,
                modulo: 1000,
                prealloc: true,
                addaction: AddAction::Head,
            },
            oscmidi: OscMidi {
                enabled: false,
                offset: 23.5,
                range: 48.0,
                mul: 0x1fff as f32 / 48.0,
                effect: 0x07,
            },
            custom: Custom {
                enabled: false,
                items: std::array::from_fn(|_| CustomItem::default()),
            },
            dummy: Toggle::default(),
            output_offset: 0.001,
            config_rate: 10,
            sntp_tau: 4,
            rate: 2000,
            movingaverage: MovingAverage {
                enabled: true,
                bitshift: 3,
            },
            interpolation_order: 2,
            pacemaker: 0x0b,
            curve: Curve {
                a: 0.7700,
                b: 0.2289,
                c: 0.0,
            },
            calibration: 0,
            ipv4ll: false,
        }
    }
}
