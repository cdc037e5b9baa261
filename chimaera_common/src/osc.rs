//! OSC 1.0 message codec.
//!
//! Messages are encoded into caller-provided buffers so that every reply
//! stays bounded by the buffer it is written to. Only single messages are
//! handled; bundles are rejected on decode.
//!
//! ```text
//! ┌────────────────┬──────────────────┬────────────────────────┐
//! │ path (padded)  │ ",tags" (padded) │ arguments (big endian) │
//! └────────────────┴──────────────────┴────────────────────────┘
//! ```

use std::fmt;
use thiserror::Error;

/// Errors raised while encoding or decoding OSC messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OscError {
    /// Output buffer cannot hold the encoded message.
    #[error("buffer too small: {needed} bytes needed, {available} available")]
    BufferTooSmall {
        /// Bytes required by the encoded message
        needed: usize,
        /// Bytes available in the output buffer
        available: usize,
    },

    /// Packet ended before the message was complete.
    #[error("truncated packet")]
    Truncated,

    /// Address pattern does not start with '/'.
    #[error("invalid address pattern")]
    InvalidPath,

    /// Type tag string missing or not starting with ','.
    #[error("missing type tag string")]
    MissingTypeTag,

    /// Type tag not understood by this codec.
    #[error("unknown type tag '{0}'")]
    UnknownTypeTag(char),

    /// String argument or path is not valid UTF-8.
    #[error("invalid string encoding")]
    InvalidString,

    /// Packet is a bundle.
    #[error("bundles are not supported")]
    BundleUnsupported,
}

/// One typed OSC argument.
#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    /// `i`: 32-bit integer
    Int(i32),
    /// `f`: 32-bit float
    Float(f32),
    /// `s`: string
    Str(String),
    /// `b`: blob
    Blob(Vec<u8>),
    /// `T`
    True,
    /// `F`
    False,
    /// `N`
    Nil,
    /// `I`
    Infinitum,
    /// `d`: 64-bit float
    Double(f64),
    /// `h`: 64-bit integer
    Long(i64),
    /// `t`: NTP timestamp, 32.32 fixed point
    Timestamp(u64),
    /// `m`: MIDI message
    Midi([u8; 4]),
}

impl OscArg {
    /// Type tag character of this argument.
    pub fn tag(&self) -> char {
        match self {
            Self::Int(_) => 'i',
            Self::Float(_) => 'f',
            Self::Str(_) => 's',
            Self::Blob(_) => 'b',
            Self::True => 'T',
            Self::False => 'F',
            Self::Nil => 'N',
            Self::Infinitum => 'I',
            Self::Double(_) => 'd',
            Self::Long(_) => 'h',
            Self::Timestamp(_) => 't',
            Self::Midi(_) => 'm',
        }
    }

    /// Integer payload, if this is an `i` argument.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float payload, if this is an `f` argument.
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// String payload, if this is an `s` argument.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Convenience constructor for string arguments.
    pub fn string(value: impl Into<String>) -> Self {
        Self::Str(value.into())
    }

    fn payload_len(&self) -> usize {
        match self {
            Self::Int(_) | Self::Float(_) | Self::Midi(_) => 4,
            Self::Double(_) | Self::Long(_) | Self::Timestamp(_) => 8,
            Self::Str(s) => padded_str_len(s.len()),
            Self::Blob(b) => 4 + padded(b.len()),
            Self::True | Self::False | Self::Nil | Self::Infinitum => 0,
        }
    }
}

impl fmt::Display for OscArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v:?}"),
            Self::Blob(v) => write!(f, "<blob {} bytes>", v.len()),
            Self::True => f.write_str("true"),
            Self::False => f.write_str("false"),
            Self::Nil => f.write_str("nil"),
            Self::Infinitum => f.write_str("inf"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Timestamp(v) => write!(f, "{v:#018x}"),
            Self::Midi(m) => write!(f, "midi {:02x}{:02x}{:02x}{:02x}", m[0], m[1], m[2], m[3]),
        }
    }
}

/// An OSC message: address pattern plus typed arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    /// Address pattern, e.g. `/chimaera/name`.
    pub path: String,
    /// Arguments in order.
    pub args: Vec<OscArg>,
}

impl OscMessage {
    /// Create a new message.
    pub fn new(path: impl Into<String>, args: Vec<OscArg>) -> Self {
        Self {
            path: path.into(),
            args,
        }
    }

    /// Type tags of all arguments, without the leading ','.
    pub fn format(&self) -> String {
        self.args.iter().map(OscArg::tag).collect()
    }

    /// Number of bytes `encode` will write.
    pub fn encoded_len(&self) -> usize {
        padded_str_len(self.path.len())
            + padded_str_len(self.args.len() + 1)
            + self.args.iter().map(OscArg::payload_len).sum::<usize>()
    }

    /// Encode into `out`, returning the number of bytes written.
    ///
    /// # Errors
    /// `OscError::BufferTooSmall` if `out` cannot hold the message,
    /// `OscError::InvalidPath` if the path does not start with '/'.
    pub fn encode(&self, out: &mut [u8]) -> Result<usize, OscError> {
        if !self.path.starts_with('/') {
            return Err(OscError::InvalidPath);
        }
        let needed = self.encoded_len();
        if needed > out.len() {
            return Err(OscError::BufferTooSmall {
                needed,
                available: out.len(),
            });
        }

        let mut w = Writer { buf: out, pos: 0 };
        w.put_str(&self.path);
        let mut tags = String::with_capacity(self.args.len() + 1);
        tags.push(',');
        tags.extend(self.args.iter().map(OscArg::tag));
        w.put_str(&tags);

        for arg in &self.args {
            match arg {
                OscArg::Int(v) => w.put(&v.to_be_bytes()),
                OscArg::Float(v) => w.put(&v.to_be_bytes()),
                OscArg::Str(s) => w.put_str(s),
                OscArg::Blob(b) => {
                    w.put(&(b.len() as u32).to_be_bytes());
                    w.put(b);
                    w.pad();
                }
                OscArg::Double(v) => w.put(&v.to_be_bytes()),
                OscArg::Long(v) => w.put(&v.to_be_bytes()),
                OscArg::Timestamp(v) => w.put(&v.to_be_bytes()),
                OscArg::Midi(m) => w.put(m),
                OscArg::True | OscArg::False | OscArg::Nil | OscArg::Infinitum => {}
            }
        }

        debug_assert_eq!(w.pos, needed);
        Ok(w.pos)
    }

    /// Encode into a freshly allocated vector.
    pub fn to_bytes(&self) -> Result<Vec<u8>, OscError> {
        let mut buf = vec![0u8; self.encoded_len()];
        let n = self.encode(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Decode one message from `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, OscError> {
        if buf.starts_with(b"#bundle") {
            return Err(OscError::BundleUnsupported);
        }

        let mut r = Reader { buf, pos: 0 };
        let path = r.take_str()?;
        if !path.starts_with('/') {
            return Err(OscError::InvalidPath);
        }

        // Messages without a type tag string carry no arguments.
        if r.pos == buf.len() {
            return Ok(Self::new(path, Vec::new()));
        }

        let tags = r.take_str()?;
        let tags = tags.strip_prefix(',').ok_or(OscError::MissingTypeTag)?;

        let mut args = Vec::with_capacity(tags.len());
        for tag in tags.chars() {
            let arg = match tag {
                'i' => OscArg::Int(i32::from_be_bytes(r.take_array()?)),
                'f' => OscArg::Float(f32::from_be_bytes(r.take_array()?)),
                's' | 'S' => OscArg::Str(r.take_str()?),
                'b' => {
                    let len = u32::from_be_bytes(r.take_array()?) as usize;
                    let data = r.take(len)?.to_vec();
                    r.skip(padded(len) - len)?;
                    OscArg::Blob(data)
                }
                'T' => OscArg::True,
                'F' => OscArg::False,
                'N' => OscArg::Nil,
                'I' => OscArg::Infinitum,
                'd' => OscArg::Double(f64::from_be_bytes(r.take_array()?)),
                'h' => OscArg::Long(i64::from_be_bytes(r.take_array()?)),
                't' => OscArg::Timestamp(u64::from_be_bytes(r.take_array()?)),
                'm' => OscArg::Midi(r.take_array()?),
                other => return Err(OscError::UnknownTypeTag(other)),
            };
            args.push(arg);
        }

        Ok(Self::new(path, args))
    }
}

impl fmt::Display for OscMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ,{}", self.path, self.format())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Convert seconds into an NTP 32.32 fixed-point timestamp.
pub fn seconds_to_timestamp(seconds: f64) -> u64 {
    if seconds <= 0.0 {
        return 0;
    }
    (seconds * 4_294_967_296.0) as u64
}

/// Convert an NTP 32.32 fixed-point timestamp into seconds.
pub fn timestamp_to_seconds(timestamp: u64) -> f64 {
    timestamp as f64 / 4_294_967_296.0
}

// ─── Wire Helpers ───────────────────────────────────────────────────

#[inline]
fn padded(len: usize) -> usize {
    (len + 3) & !3
}

/// String length including terminator and padding.
#[inline]
fn padded_str_len(len: usize) -> usize {
    padded(len + 1)
}

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl Writer<'_> {
    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn put_str(&mut self, s: &str) {
        self.put(s.as_bytes());
        self.buf[self.pos] = 0;
        self.pos += 1;
        self.pad();
    }

    fn pad(&mut self) {
        while self.pos % 4 != 0 {
            self.buf[self.pos] = 0;
            self.pos += 1;
        }
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], OscError> {
        let end = self.pos.checked_add(len).ok_or(OscError::Truncated)?;
        let slice = self.buf.get(self.pos..end).ok_or(OscError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], OscError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn skip(&mut self, len: usize) -> Result<(), OscError> {
        self.take(len).map(|_| ())
    }

    fn take_str(&mut self) -> Result<String, OscError> {
        let rest = self.buf.get(self.pos..).ok_or(OscError::Truncated)?;
        let nul = rest.iter().position(|&b| b == 0).ok_or(OscError::Truncated)?;
        let s = std::str::from_utf8(&rest[..nul])
            .map_err(|_| OscError::InvalidString)?
            .to_string();
        self.skip(padded_str_len(nul))?;
        Ok(s)
    }
}
