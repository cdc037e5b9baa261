//! Address parsing and IPv4 arithmetic.
//!
//! Accepted textual forms:
//!
//! | form               | parser              |
//! |--------------------|---------------------|
//! | `a.b.c.d`          | [`parse_ipv4`]      |
//! | `a.b.c.d/n`        | [`parse_cidr`]      |
//! | `a.b.c.d:port`     | [`parse_socket_addr`] |
//! | `name.local:port`  | [`HostSpec::parse`] |
//! | `xx:xx:xx:xx:xx:xx`| [`parse_mac`]       |

use std::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;

use crate::consts::LOCAL_DOMAIN;

/// Address syntax errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddrError {
    /// Not a dotted-quad IPv4 address.
    #[error("invalid IPv4 address '{0}'")]
    Ipv4(String),

    /// Not an `a.b.c.d/n` string or prefix above 32.
    #[error("invalid CIDR address '{0}'")]
    Cidr(String),

    /// Not an `a.b.c.d:port` string.
    #[error("invalid socket address '{0}'")]
    SocketAddr(String),

    /// Not a colon-separated MAC address.
    #[error("invalid MAC address '{0}'")]
    Mac(String),

    /// Subnet mask bits are not contiguous.
    #[error("subnet mask {0} is not contiguous")]
    NonContiguousMask(Ipv4Addr),

    /// Host is neither a literal IPv4 address nor an mDNS name.
    #[error("can only resolve raw IP and mDNS addresses")]
    UnsupportedHost(String),
}

/// Parse a dotted-quad IPv4 address.
pub fn parse_ipv4(s: &str) -> Result<Ipv4Addr, AddrError> {
    s.trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| AddrError::Ipv4(s.to_string()))
}

/// Parse `a.b.c.d/n` into the address and prefix length.
pub fn parse_cidr(s: &str) -> Result<(Ipv4Addr, u8), AddrError> {
    let err = || AddrError::Cidr(s.to_string());
    let (ip, prefix) = s.trim().split_once('/').ok_or_else(err)?;
    let ip = ip.parse::<Ipv4Addr>().map_err(|_| err())?;
    let prefix = prefix.parse::<u8>().map_err(|_| err())?;
    if prefix > 32 {
        return Err(err());
    }
    Ok((ip, prefix))
}

/// Format an address with its prefix length.
pub fn format_cidr(ip: Ipv4Addr, prefix: u8) -> String {
    format!("{ip}/{prefix}")
}

/// Parse `a.b.c.d:port`.
pub fn parse_socket_addr(s: &str) -> Result<(Ipv4Addr, u16), AddrError> {
    let err = || AddrError::SocketAddr(s.to_string());
    let (ip, port) = s.trim().rsplit_once(':').ok_or_else(err)?;
    let ip = ip.parse::<Ipv4Addr>().map_err(|_| err())?;
    let port = port.parse::<u16>().map_err(|_| err())?;
    Ok((ip, port))
}

/// Format `a.b.c.d:port`.
pub fn format_socket_addr(ip: Ipv4Addr, port: u16) -> String {
    format!("{ip}:{port}")
}

/// Parse a colon-separated MAC address.
pub fn parse_mac(s: &str) -> Result<[u8; 6], AddrError> {
    let err = || AddrError::Mac(s.to_string());
    let mut mac = [0u8; 6];
    let mut parts = s.trim().split(':');
    for byte in mac.iter_mut() {
        let part = parts.next().ok_or_else(err)?;
        if part.is_empty() || part.len() > 2 {
            return Err(err());
        }
        *byte = u8::from_str_radix(part, 16).map_err(|_| err())?;
    }
    if parts.next().is_some() {
        return Err(err());
    }
    Ok(mac)
}

/// Format a MAC address as lowercase `xx:xx:xx:xx:xx:xx`.
pub fn format_mac(mac: &[u8; 6]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}

// ─── Mask Arithmetic ────────────────────────────────────────────────

/// Prefix length to dotted subnet mask.
pub fn cidr_to_mask(prefix: u8) -> Ipv4Addr {
    let bits = match prefix {
        0 => 0,
        p if p >= 32 => u32::MAX,
        p => u32::MAX << (32 - p),
    };
    Ipv4Addr::from(bits)
}

/// Dotted subnet mask to prefix length.
///
/// # Errors
/// `AddrError::NonContiguousMask` if the set bits are not a leading run.
pub fn mask_to_cidr(mask: Ipv4Addr) -> Result<u8, AddrError> {
    let bits = u32::from(mask);
    let ones = bits.leading_ones();
    if bits.checked_shl(ones).unwrap_or(0) != 0 {
        return Err(AddrError::NonContiguousMask(mask));
    }
    Ok(ones as u8)
}

/// Network address `ip & mask`.
pub fn network(ip: Ipv4Addr, mask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(ip) & u32::from(mask))
}

/// Directed broadcast address `ip | !mask`.
pub fn broadcast(ip: Ipv4Addr, mask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(ip) | !u32::from(mask))
}

// ─── Host Specifications ────────────────────────────────────────────

/// Target host of an address-setting call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSpec {
    /// Literal address, applied synchronously.
    Literal {
        /// Address
        ip: Ipv4Addr,
        /// Port, when given
        port: Option<u16>,
    },
    /// `.local` name, resolved through multicast DNS.
    Mdns {
        /// Full host name including the `.local` suffix
        name: String,
        /// Port, when given
        port: Option<u16>,
    },
}

impl HostSpec {
    /// Parse `host[:port]`. With `require_port` the port is mandatory.
    ///
    /// # Errors
    /// `AddrError::UnsupportedHost` for anything that is neither a literal
    /// IPv4 address nor a `.local` name, `AddrError::SocketAddr` for a
    /// missing or malformed port.
    pub fn parse(s: &str, require_port: bool) -> Result<Self, AddrError> {
        let s = s.trim();
        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| AddrError::SocketAddr(s.to_string()))?;
                (host, Some(port))
            }
            None if require_port => return Err(AddrError::SocketAddr(s.to_string())),
            None => (s, None),
        };

        if let Ok(ip) = host.parse::<Ipv4Addr>() {
            return Ok(Self::Literal { ip, port });
        }
        if is_mdns_name(host) {
            return Ok(Self::Mdns {
                name: host.to_string(),
                port,
            });
        }
        Err(AddrError::UnsupportedHost(s.to_string()))
    }

    /// Port, when one was given.
    pub fn port(&self) -> Option<u16> {
        match self {
            Self::Literal { port, .. } | Self::Mdns { port, .. } => *port,
        }
    }
}

impl fmt::Display for HostSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal { ip, port: Some(p) } => write!(f, "{ip}:{p}"),
            Self::Literal { ip, port: None } => write!(f, "{ip}"),
            Self::Mdns { name, port: Some(p) } => write!(f, "{name}:{p}"),
            Self::Mdns { name, port: None } => f.write_str(name),
        }
    }
}

/// Whether `host` is a resolvable `.local` name.
pub fn is_mdns_name(host: &str) -> bool {
    host.len() > LOCAL_DOMAIN.len()
        && host
            .get(host.len() - LOCAL_DOMAIN.len()..)
            .is_some_and(|suffix| suffix.eq_ignore_ascii_case(LOCAL_DOMAIN))
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}
