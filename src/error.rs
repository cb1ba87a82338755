//! Crate-wide error type.
//!
//! Mirrors the five-way taxonomy from the design: transport (I/O and TLS),
//! codec, protocol, configuration, and state-misuse failures. Every layer in
//! the stack propagates through this single enum instead of inventing its
//! own error type, so callers can match on [`Error`] regardless of which
//! layer raised it.

use std::fmt;
use std::io;

/// Errors produced by any layer of the client stack.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A failure of the underlying byte transport: connect, read, write,
    /// unexpected EOF, or a deadline firing mid-operation.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A TLS-specific failure: handshake, certificate verification, or
    /// record-layer error.
    #[error("tls error: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// An Avro binary encode/decode rejection: short buffer, invalid enum
    /// index, invalid boolean byte, or a type mismatch against a schema.
    #[error("codec error: {0}")]
    Codec(String),

    /// A semantic violation of the layered protocol itself, as opposed to a
    /// malformed individual value.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// An invalid configuration discovered at construction time: a bad
    /// compression level, an unresolvable address, or a bad TLS setup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An operation was attempted in the wrong lifecycle state, e.g.
    /// opening an already-open transport or reading from one never opened.
    #[error("state error: {0}")]
    StateMisuse(&'static str),
}

impl Error {
    pub fn tls(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Tls(Box::new(source))
    }

    pub fn codec(message: impl Into<String>) -> Self {
        Error::Codec(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }
}

/// Sub-cases of [`Error::Protocol`], kept distinguishable so callers can
/// match on them rather than pattern-matching a free-form string.
#[derive(Debug)]
pub enum ProtocolError {
    /// The framing layer's `recv_serial` did not match the serial of the
    /// request it was meant to answer.
    BadSerial { expected: u32, got: u32 },

    /// After parsing a response envelope, residual bytes remained in the
    /// buffer.
    ResponseBufferNotEmpty { len: usize, rest: Vec<u8> },

    /// `prepare_message`/`parse_message`/`parse_error` were called with a
    /// method name absent from the message catalog.
    UnknownMethod(String),

    /// The handshake response's `match` field was neither `BOTH`, `CLIENT`,
    /// nor `NONE`.
    UnknownMatch(String),

    /// The handshake looped (a second `NONE`, or a `CLIENT` while
    /// `need_client_protocol` was already set): the server is contradicting
    /// itself about whether it knows the client's protocol.
    UnknownClientProtocol,

    /// A handshake union field required to be present (e.g. `serverHash` on
    /// a `CLIENT` response) was missing or null.
    MissingField(&'static str),

    /// `send_message`'s final decoded value was not a string as Flume's
    /// `Status` enum always encodes to.
    BadStatusType,

    /// A miscellaneous wire-format violation with a free-form message,
    /// constructed via [`err_protocol!`](crate::err_protocol).
    Other(String),

    /// An application-level error message sent back by the server itself
    /// (the `errors` union's `string` branch), as opposed to a violation of
    /// the wire protocol.
    Remote(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::BadSerial { expected, got } => {
                write!(f, "bad serial: {} != {}", expected, got)
            }
            ProtocolError::ResponseBufferNotEmpty { len, rest } => {
                write!(
                    f,
                    "response buffer is not empty: len={}, rest=0x{}",
                    len,
                    hex(rest)
                )
            }
            ProtocolError::UnknownMethod(name) => write!(f, "unknown method name: {}", name),
            ProtocolError::UnknownMatch(value) => {
                write!(f, "unknown handshake response match field: {}", value)
            }
            ProtocolError::UnknownClientProtocol => {
                write!(f, "handshake failed: unknown client's protocol")
            }
            ProtocolError::MissingField(name) => write!(f, "missing field: {}", name),
            ProtocolError::BadStatusType => write!(f, "cannot convert status to string"),
            ProtocolError::Other(message) => f.write_str(message),
            ProtocolError::Remote(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for ProtocolError {}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

/// Builds an [`Error::Protocol`] carrying a free-form message, in the style
/// of `fmt::format!` plus `From`.
#[macro_export]
macro_rules! err_protocol {
    ($($arg:tt)*) => {
        $crate::error::Error::Protocol($crate::error::ProtocolError::Other(format!($($arg)*)))
    };
}

pub type Result<T> = std::result::Result<T, Error>;
