//! The bottom of the transport stack: a plain TCP connection.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, SystemTime};

use super::Transport;
use crate::error::Error;

pub struct Socket {
    host: String,
    port: u16,
    connect_timeout: Option<Duration>,
    conn: Option<TcpStream>,
}

impl Socket {
    pub fn new(host: impl Into<String>, port: u16, connect_timeout: Option<Duration>) -> Self {
        Socket {
            host: host.into(),
            port,
            connect_timeout,
            conn: None,
        }
    }

    fn conn(&mut self) -> Result<&mut TcpStream, Error> {
        self.conn
            .as_mut()
            .ok_or(Error::StateMisuse("socket is not open"))
    }
}

impl Transport for Socket {
    fn open(&mut self) -> Result<(), Error> {
        if self.conn.is_some() {
            return Err(Error::StateMisuse("socket is already open"));
        }

        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::configuration(format!("bad address: {}:{}", self.host, self.port)))?;

        let stream = match self.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout)?,
            None => TcpStream::connect(addr)?,
        };

        self.conn = Some(stream);
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        // Dropping the TcpStream closes it; there's nothing more to flush at
        // this layer, and closing twice must not error.
        self.conn = None;
        Ok(())
    }

    fn set_deadline(&mut self, deadline: SystemTime) -> Result<(), Error> {
        let conn = self.conn()?;
        conn.set_read_timeout(Self::timeout_from(deadline))?;
        conn.set_write_timeout(Self::timeout_from(deadline))?;
        Ok(())
    }
}

impl Socket {
    fn timeout_from(deadline: SystemTime) -> Option<Duration> {
        deadline.duration_since(SystemTime::now()).ok()
    }
}

impl Read for Socket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.conn
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socket is not open"))?
            .read(buf)
    }
}

impl Write for Socket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.conn
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socket is not open"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        // The bare socket never buffers on its own; nothing to flush.
        Ok(())
    }
}
