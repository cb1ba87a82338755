//! A TLS client layer built on `rustls`. The handshake runs synchronously
//! at `open()` time, driven by hand via `complete_io` rather than relying
//! on an async runtime.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::SystemTime;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, StreamOwned};

use super::Transport;
use crate::error::Error;

enum State<T> {
    Pending(T),
    Established(StreamOwned<ClientConnection, T>),
    Closed,
}

pub struct TlsTransport<T> {
    config: Arc<ClientConfig>,
    server_name: ServerName<'static>,
    state: State<T>,
}

impl<T: Transport> TlsTransport<T> {
    pub fn new(trans: T, config: Arc<ClientConfig>, server_name: ServerName<'static>) -> Self {
        TlsTransport {
            config,
            server_name,
            state: State::Pending(trans),
        }
    }
}

impl<T: Transport> Transport for TlsTransport<T> {
    fn open(&mut self) -> Result<(), Error> {
        let prior = std::mem::replace(&mut self.state, State::Closed);
        let mut trans = match prior {
            State::Pending(trans) => trans,
            State::Established(_) => return Err(Error::StateMisuse("tls transport is already open")),
            State::Closed => return Err(Error::StateMisuse("tls transport is closed")),
        };

        trans.open()?;

        let conn = ClientConnection::new(self.config.clone(), self.server_name.clone())
            .map_err(Error::tls)?;
        let mut stream = StreamOwned::new(conn, trans);

        while stream.conn.is_handshaking() {
            stream.conn.complete_io(&mut stream.sock).map_err(Error::tls)?;
        }

        self.state = State::Established(stream);
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Established(mut stream) => {
                stream.conn.send_close_notify();
                // Best-effort: a peer that already hung up shouldn't keep
                // close() from tearing down the socket underneath it.
                let _ = stream.conn.complete_io(&mut stream.sock);
                stream.sock.close()
            }
            State::Pending(mut trans) => trans.close(),
            State::Closed => Ok(()),
        }
    }

    fn set_deadline(&mut self, deadline: SystemTime) -> Result<(), Error> {
        match &mut self.state {
            State::Established(stream) => stream.sock.set_deadline(deadline),
            State::Pending(trans) => trans.set_deadline(deadline),
            State::Closed => Err(Error::StateMisuse("tls transport is closed")),
        }
    }
}

impl<T: Transport> Read for TlsTransport<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.state {
            State::Established(stream) => stream.read(buf),
            _ => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "tls transport is not open",
            )),
        }
    }
}

impl<T: Transport> Write for TlsTransport<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.state {
            State::Established(stream) => stream.write(buf),
            _ => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "tls transport is not open",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.state {
            State::Established(stream) => stream.flush(),
            _ => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "tls transport is not open",
            )),
        }
    }
}
