//! Reply framing for the service sockets.
//!
//! Three framings are supported per socket:
//!
//! | framing | layout                                                    |
//! |---------|-----------------------------------------------------------|
//! | `udp`   | the encoded message is the datagram                       |
//! | `tcp`   | 4-byte big-endian size preamble, then the message         |
//! | `slip`  | `END`, byte-stuffed message, `END` (RFC 1055)             |
//!
//! Encoding happens in place inside a bounded buffer; the size preamble of
//! the `tcp` framing is patched once the message length is known.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::osc::{OscError, OscMessage};

/// SLIP frame delimiter.
pub const SLIP_END: u8 = 0xc0;
/// SLIP escape byte.
pub const SLIP_ESC: u8 = 0xdb;
/// Escaped `END`.
pub const SLIP_ESC_END: u8 = 0xdc;
/// Escaped `ESC`.
pub const SLIP_ESC_ESC: u8 = 0xdd;

/// Size of the `tcp` framing preamble.
pub const TCP_PREAMBLE_LEN: usize = 4;

/// Errors raised while framing or de-framing replies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Encoding the OSC message failed.
    #[error(transparent)]
    Osc(#[from] OscError),

    /// Framed output does not fit the buffer.
    #[error("framed reply exceeds {0} bytes")]
    Overflow(usize),

    /// SLIP escape followed by an unexpected byte.
    #[error("invalid SLIP escape 0x{0:02x}")]
    InvalidEscape(u8),

    /// Unknown framing name.
    #[error("unknown framing '{0}'")]
    UnknownFraming(String),
}

/// Framing applied to a socket's outgoing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// Plain datagram.
    #[default]
    Udp,
    /// Length-prefixed stream.
    Tcp,
    /// SLIP byte-stuffed stream.
    Slip,
}

impl Framing {
    /// All framings, in wire order.
    pub const ALL: [Framing; 3] = [Framing::Udp, Framing::Tcp, Framing::Slip];

    /// Lowercase name as used on the configuration interface.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
            Self::Slip => "slip",
        }
    }
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Framing {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| FrameError::UnknownFraming(s.to_string()))
    }
}

impl From<Framing> for u8 {
    fn from(f: Framing) -> u8 {
        f as u8
    }
}

impl TryFrom<u8> for Framing {
    type Error = FrameError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(v as usize)
            .copied()
            .ok_or_else(|| FrameError::UnknownFraming(v.to_string()))
    }
}

/// Encode `msg` into `buf` using `framing`, returning the frame length.
///
/// # Errors
/// `FrameError::Osc` when the message does not fit, `FrameError::Overflow`
/// when SLIP stuffing grows it past the buffer.
pub fn frame_message(framing: Framing, msg: &OscMessage, buf: &mut [u8]) -> Result<usize, FrameError> {
    match framing {
        Framing::Udp => Ok(msg.encode(buf)?),
        Framing::Tcp => {
            if buf.len() < TCP_PREAMBLE_LEN {
                return Err(FrameError::Overflow(buf.len()));
            }
            let len = msg.encode(&mut buf[TCP_PREAMBLE_LEN..])?;
            buf[..TCP_PREAMBLE_LEN].copy_from_slice(&(len as u32).to_be_bytes());
            Ok(TCP_PREAMBLE_LEN + len)
        }
        Framing::Slip => {
            let raw = msg.to_bytes()?;
            slip_encode(&raw, buf)
        }
    }
}

/// SLIP-encode `data` into `out`, with `END` before and after.
pub fn slip_encode(data: &[u8], out: &mut [u8]) -> Result<usize, FrameError> {
    let mut pos = 0;
    let mut push = |byte: u8, pos: &mut usize| -> Result<(), FrameError> {
        let slot = out.get_mut(*pos).ok_or(FrameError::Overflow(data.len()))?;
        *slot = byte;
        *pos += 1;
        Ok(())
    };

    push(SLIP_END, &mut pos)?;
    for &byte in data {
        match byte {
            SLIP_END => {
                push(SLIP_ESC, &mut pos)?;
                push(SLIP_ESC_END, &mut pos)?;
            }
            SLIP_ESC => {
                push(SLIP_ESC, &mut pos)?;
                push(SLIP_ESC_ESC, &mut pos)?;
            }
            other => push(other, &mut pos)?,
        }
    }
    push(SLIP_END, &mut pos)?;
    Ok(pos)
}

/// Incremental SLIP decoder with a fixed-capacity frame buffer.
///
/// Empty frames (back-to-back `END`) are skipped.
#[derive(Debug, Default)]
pub struct SlipDecoder<const N: usize> {
    frame: heapless::Vec<u8, N>,
    escaped: bool,
    overflowed: bool,
}

impl<const N: usize> SlipDecoder<N> {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self {
            frame: heapless::Vec::new(),
            escaped: false,
            overflowed: false,
        }
    }

    /// Feed one byte. Returns a complete frame when `END` closes one.
    pub fn push(&mut self, byte: u8) -> Result<Option<heapless::Vec<u8, N>>, FrameError> {
        if self.escaped {
            self.escaped = false;
            let decoded = match byte {
                SLIP_ESC_END => SLIP_END,
                SLIP_ESC_ESC => SLIP_ESC,
                other => {
                    self.reset();
                    return Err(FrameError::InvalidEscape(other));
                }
            };
            self.store(decoded);
            return Ok(None);
        }

        match byte {
            SLIP_END => {
                let frame = std::mem::take(&mut self.frame);
                let overflowed = std::mem::take(&mut self.overflowed);
                if overflowed {
                    return Err(FrameError::Overflow(N));
                }
                Ok((!frame.is_empty()).then_some(frame))
            }
            SLIP_ESC => {
                self.escaped = true;
                Ok(None)
            }
            other => {
                self.store(other);
                Ok(None)
            }
        }
    }

    fn store(&mut self, byte: u8) {
        if self.frame.push(byte).is_err() {
            self.overflowed = true;
        }
    }

    fn reset(&mut self) {
        self.frame.clear();
        self.escaped = false;
        self.overflowed = false;
    }
}

/// Incremental decoder for the length-prefixed `tcp` framing.
#[derive(Debug, Default)]
pub struct StreamDecoder<const N: usize> {
    buf: heapless::Vec<u8, N>,
}

impl<const N: usize> StreamDecoder<N> {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self {
            buf: heapless::Vec::new(),
        }
    }

    /// Append received bytes.
    pub fn extend(&mut self, data: &[u8]) -> Result<(), FrameError> {
        self.buf
            .extend_from_slice(data)
            .map_err(|_| FrameError::Overflow(N))
    }

    /// Take the next complete frame, if buffered.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        if self.buf.len() < TCP_PREAMBLE_LEN {
            return None;
        }
        let mut size = [0u8; TCP_PREAMBLE_LEN];
        size.copy_from_slice(&self.buf[..TCP_PREAMBLE_LEN]);
        let len = u32::from_be_bytes(size) as usize;
        let end = TCP_PREAMBLE_LEN + len;
        if self.buf.len() < end {
            return None;
        }
        let frame = self.buf[TCP_PREAMBLE_LEN..end].to_vec();
        let rest: heapless::Vec<u8, N> = self.buf[end..].iter().copied().collect();
        self.buf = rest;
        Some(frame)
    }
}
