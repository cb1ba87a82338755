//! A read/write buffering layer, usually placed outermost in the stack so
//! it absorbs the small framing-header writes instead of forwarding every
//! 4-byte write straight to the socket.

use std::io::{self, Read, Write};
use std::time::SystemTime;

use super::Transport;
use crate::error::Error;

pub struct BufferedTransport<T> {
    trans: T,
    capacity: usize,
    read_buf: Vec<u8>,
    read_pos: usize,
    write_buf: Vec<u8>,
}

impl<T: Transport> BufferedTransport<T> {
    pub fn new(trans: T, capacity: usize) -> Self {
        BufferedTransport {
            trans,
            capacity: capacity.max(1),
            read_buf: Vec::new(),
            read_pos: 0,
            write_buf: Vec::new(),
        }
    }
}

impl<T: Transport> Read for BufferedTransport<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.read_pos >= self.read_buf.len() {
            self.read_buf.resize(self.capacity, 0);
            let n = self.trans.read(&mut self.read_buf)?;
            self.read_buf.truncate(n);
            self.read_pos = 0;
        }

        let available = &self.read_buf[self.read_pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.read_pos += n;
        Ok(n)
    }
}

impl<T: Transport> Write for BufferedTransport<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.len() >= self.capacity {
            // Larger than the buffer itself: drain what's pending, then
            // write straight through rather than growing the buffer.
            self.flush()?;
            return self.trans.write(buf);
        }

        if self.write_buf.len() + buf.len() > self.capacity {
            self.flush()?;
        }

        self.write_buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.write_buf.is_empty() {
            self.trans.write_all(&self.write_buf)?;
            self.write_buf.clear();
        }
        self.trans.flush()
    }
}

impl<T: Transport> Transport for BufferedTransport<T> {
    fn open(&mut self) -> Result<(), Error> {
        self.trans.open()
    }

    fn close(&mut self) -> Result<(), Error> {
        self.flush()?;
        self.trans.close()
    }

    fn set_deadline(&mut self, deadline: SystemTime) -> Result<(), Error> {
        self.trans.set_deadline(deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::tests::MockTransport;

    #[test]
    fn write_does_not_reach_downstream_until_flush() {
        let mut buffered = BufferedTransport::new(MockTransport::new(), 1024);
        buffered.write_all(b"hello").unwrap();
        assert!(buffered.trans.written().is_empty());

        buffered.flush().unwrap();
        assert_eq!(buffered.trans.written(), b"hello");
    }

    #[test]
    fn write_larger_than_capacity_flushes_pending_first() {
        let mut buffered = BufferedTransport::new(MockTransport::new(), 4);
        buffered.write_all(b"ab").unwrap();
        buffered.write_all(b"0123456789").unwrap();
        assert_eq!(buffered.trans.written(), b"ab0123456789");
    }

    #[test]
    fn close_flushes_before_closing_downward() {
        let mut buffered = BufferedTransport::new(MockTransport::new(), 1024);
        buffered.write_all(b"pending").unwrap();
        buffered.close().unwrap();
        assert_eq!(buffered.trans.written(), b"pending");
    }
}
