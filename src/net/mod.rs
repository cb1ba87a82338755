//! The layered transport stack: `socket → [zlib] → [tls] → [buffered]`.
//!
//! Each layer wraps anything implementing [`Transport`], mirroring the Go
//! client's interface-based composition (`avroipc.Transport`) rather than a
//! generic-heavy static stack, since which layers are present is a runtime
//! decision driven by [`crate::config::ClientOptions`].

mod buffered;
mod socket;
mod tls;
mod zlib;

pub use buffered::BufferedTransport;
pub use socket::Socket;
pub use tls::TlsTransport;
pub use zlib::ZlibTransport;

use std::io::{Read, Write};
use std::time::SystemTime;

use crate::error::Error;

/// A bidirectional byte stream with explicit open/close lifecycle and
/// deadline support, composable in layers.
pub trait Transport: Read + Write {
    /// Establishes the underlying connection. Fails if already open.
    fn open(&mut self) -> Result<(), Error>;

    /// Tears the connection down. Idempotent at the socket layer.
    fn close(&mut self) -> Result<(), Error>;

    /// Sets both the read and write deadline together.
    fn set_deadline(&mut self, deadline: SystemTime) -> Result<(), Error>;
}

impl Transport for Box<dyn Transport> {
    fn open(&mut self) -> Result<(), Error> {
        (**self).open()
    }

    fn close(&mut self) -> Result<(), Error> {
        (**self).close()
    }

    fn set_deadline(&mut self, deadline: SystemTime) -> Result<(), Error> {
        (**self).set_deadline(deadline)
    }
}
