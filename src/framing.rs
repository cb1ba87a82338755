//! Packs RPC messages into length-delimited frames and multiplexes them
//! onto a single byte stream, each direction carrying its own serial
//! counter so a response can be matched against the request it answers.

use std::io::{Read, Write};
use std::time::SystemTime;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, ProtocolError};
use crate::net::Transport;

/// Frames larger than this are split across multiple `(length, payload)`
/// entries within one framed message.
pub const MAX_FRAME_SIZE: usize = 10 * 1024;

pub struct FramingLayer<T> {
    trans: T,
    serial: u32,
    read_buf: Vec<u8>,
}

impl<T: Transport> FramingLayer<T> {
    pub fn new(trans: T) -> Self {
        FramingLayer {
            trans,
            serial: 0,
            read_buf: Vec::new(),
        }
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.trans
    }

    /// Writes one message, framing it as needed. `send_serial` is
    /// incremented unconditionally, matching `framing.go`: an empty message
    /// writes no bytes at all, not even a zeroed frame-count header, but
    /// the counter still advances so the server's expected serial for the
    /// *next* write stays in lockstep.
    pub fn write(&mut self, message: &[u8]) -> Result<(), Error> {
        self.serial = self.serial.wrapping_add(1);

        if message.is_empty() {
            return Ok(());
        }

        let frame_count = (message.len() - 1) / MAX_FRAME_SIZE + 1;

        self.trans.write_u32::<BigEndian>(self.serial)?;
        self.trans.write_u32::<BigEndian>(frame_count as u32)?;

        let mut rest = message;
        while rest.len() >= MAX_FRAME_SIZE {
            let (frame, tail) = rest.split_at(MAX_FRAME_SIZE);
            self.trans.write_u32::<BigEndian>(MAX_FRAME_SIZE as u32)?;
            self.trans.write_all(frame)?;
            rest = tail;
        }

        self.trans.write_u32::<BigEndian>(rest.len() as u32)?;
        self.trans.write_all(rest)?;

        Ok(())
    }

    /// Reads one message, reassembled from however many frames the peer
    /// split it into.
    pub fn read(&mut self) -> Result<Vec<u8>, Error> {
        self.read_buf.clear();

        let recv_serial = self.trans.read_u32::<BigEndian>()?;
        if recv_serial != self.serial {
            return Err(ProtocolError::BadSerial {
                expected: self.serial,
                got: recv_serial,
            }
            .into());
        }

        let frame_count = self.trans.read_u32::<BigEndian>()?;

        for _ in 0..frame_count {
            let size = self.trans.read_u32::<BigEndian>()? as usize;
            let offset = self.read_buf.len();
            self.read_buf.resize(offset + size, 0);
            self.trans.read_exact(&mut self.read_buf[offset..])?;
        }

        Ok(std::mem::take(&mut self.read_buf))
    }

    pub fn close(&mut self) -> Result<(), Error> {
        self.trans.close()
    }

    pub fn set_deadline(&mut self, deadline: SystemTime) -> Result<(), Error> {
        self.trans.set_deadline(deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::tests::MockTransport;

    #[test]
    fn write_empty_message_emits_nothing_but_still_advances_serial() {
        let mut framing = FramingLayer::new(MockTransport::new());
        framing.write(&[]).unwrap();
        assert!(framing.transport_mut().written().is_empty());
        assert_eq!(framing.serial, 1);
    }

    #[test]
    fn write_then_read_roundtrip() {
        let mut framing = FramingLayer::new(MockTransport::new());
        framing.write(b"hello").unwrap();

        let written = framing.transport_mut().written().to_vec();
        let mut reader = FramingLayer::new(MockTransport::with_read_data(written));
        reader.serial = 1;
        let message = reader.read().unwrap();
        assert_eq!(message, b"hello");
    }

    #[test]
    fn read_rejects_mismatched_serial() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&99u32.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());

        let mut framing = FramingLayer::new(MockTransport::with_read_data(buf));
        let err = framing.read().unwrap_err();
        assert!(err.to_string().contains("bad serial: 0 != 99"));
    }

    #[test]
    fn write_splits_large_messages_into_multiple_frames() {
        let mut framing = FramingLayer::new(MockTransport::new());
        let message = vec![0xAB; MAX_FRAME_SIZE + 10];
        framing.write(&message).unwrap();

        let written = framing.transport_mut().written().to_vec();
        let mut reader = FramingLayer::new(MockTransport::with_read_data(written));
        // Need to bump the reader's expected serial to match what we wrote.
        reader.serial = 1;
        let roundtripped = reader.read().unwrap();
        assert_eq!(roundtripped, message);
    }
}
