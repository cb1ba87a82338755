//! A raw-zlib compression layer. The writer is built eagerly; the reader
//! is built lazily on first read, because constructing a zlib reader
//! consumes the stream header immediately and would block if the peer
//! hasn't written anything yet.

use std::io::{self, Read, Write};
use std::time::SystemTime;

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use super::Transport;
use crate::error::Error;

/// How much spare output capacity each compress/decompress attempt is given.
/// `Compress::compress_vec`/`Decompress::decompress_vec` only ever write
/// into a `Vec`'s *existing* spare capacity (`capacity() - len()`) — they
/// never grow the vector themselves — so every call site below must reserve
/// before calling, and re-reserve in a loop if one reservation wasn't enough
/// to consume all the input.
const CHUNK: usize = 8 * 1024;

pub struct ZlibTransport<T> {
    trans: T,
    compressor: Compress,
    decompressor: Option<Decompress>,
    read_buf: Vec<u8>,
    read_pos: usize,
}

impl<T: Transport> ZlibTransport<T> {
    pub fn new(trans: T, level: u32) -> Self {
        ZlibTransport {
            trans,
            compressor: Compress::new(Compression::new(level), true),
            decompressor: None,
            read_buf: Vec::new(),
            read_pos: 0,
        }
    }

    fn drain_read_buf(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = &self.read_buf[self.read_pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.read_pos += n;
        Ok(n)
    }
}

fn zlib_err(e: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e.to_string())
}

/// Runs `compressor` over all of `input`, appending the compressed output to
/// `out`. Reserves spare capacity before every call and keeps calling until
/// the compressor has consumed all of `input` and, for [`FlushCompress::Finish`],
/// until it reports `Status::StreamEnd`.
fn compress_all(
    compressor: &mut Compress,
    mut input: &[u8],
    flush: FlushCompress,
    out: &mut Vec<u8>,
) -> io::Result<()> {
    loop {
        let before_in = compressor.total_in();
        let before_out = compressor.total_out();
        out.reserve(CHUNK);
        let spare = out.capacity() - out.len();

        let status = compressor.compress_vec(input, out, flush).map_err(zlib_err)?;

        let consumed = (compressor.total_in() - before_in) as usize;
        let produced = (compressor.total_out() - before_out) as usize;
        input = &input[consumed..];

        // If this call filled every byte of spare capacity we gave it,
        // there may be more compressed output still buffered internally
        // (this matters for Sync/Finish flushes, which can take several
        // calls to fully drain once input is exhausted).
        let more_pending = spare > 0 && produced >= spare;

        let done = match flush {
            FlushCompress::Finish => status == Status::StreamEnd,
            _ => input.is_empty() && !more_pending,
        };
        if done {
            return Ok(());
        }
    }
}

/// Mirror of [`compress_all`] for decompression.
fn decompress_all(
    decompressor: &mut Decompress,
    mut input: &[u8],
    flush: FlushDecompress,
    out: &mut Vec<u8>,
) -> io::Result<()> {
    loop {
        let before_in = decompressor.total_in();
        let before_out = decompressor.total_out();
        out.reserve(CHUNK);
        let spare = out.capacity() - out.len();

        let status = decompressor
            .decompress_vec(input, out, flush)
            .map_err(zlib_err)?;

        let consumed = (decompressor.total_in() - before_in) as usize;
        let produced = (decompressor.total_out() - before_out) as usize;
        input = &input[consumed..];

        let more_pending = spare > 0 && produced >= spare;

        if status == Status::StreamEnd || (input.is_empty() && !more_pending) {
            return Ok(());
        }
    }
}

impl<T: Transport> Read for ZlibTransport<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.read_pos < self.read_buf.len() {
            return self.drain_read_buf(buf);
        }

        if self.decompressor.is_none() {
            self.decompressor = Some(Decompress::new(true));
        }

        let mut input = [0u8; 4096];
        loop {
            let n = self.trans.read(&mut input)?;
            if n == 0 {
                return Ok(0);
            }

            let mut out = Vec::new();
            decompress_all(
                self.decompressor.as_mut().unwrap(),
                &input[..n],
                FlushDecompress::None,
                &mut out,
            )?;

            if !out.is_empty() {
                self.read_buf = out;
                self.read_pos = 0;
                return self.drain_read_buf(buf);
            }
        }
    }
}

impl<T: Transport> Write for ZlibTransport<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = Vec::new();
        // Each write is immediately partial-flushed (Z_SYNC_FLUSH) so the
        // peer's decompressor can make progress without waiting for more
        // input than this one write will ever supply.
        compress_all(&mut self.compressor, buf, FlushCompress::Sync, &mut out)?;
        self.trans.write_all(&out)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut out = Vec::new();
        compress_all(&mut self.compressor, &[], FlushCompress::Sync, &mut out)?;
        if !out.is_empty() {
            self.trans.write_all(&out)?;
        }
        self.trans.flush()
    }
}

impl<T: Transport> Transport for ZlibTransport<T> {
    fn open(&mut self) -> Result<(), Error> {
        self.trans.open()
    }

    fn close(&mut self) -> Result<(), Error> {
        let mut out = Vec::new();
        compress_all(&mut self.compressor, &[], FlushCompress::Finish, &mut out)
            .map_err(|e| Error::codec(e.to_string()))?;
        if !out.is_empty() {
            self.trans.write_all(&out).map_err(Error::from)?;
        }
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
    fn write_then_read_roundtrip_through_a_shared_buffer() {
        let mut writer = ZlibTransport::new(MockTransport::new(), 6);
        writer.write_all(b"hello, flume").unwrap();
        writer.flush().unwrap();

        let compressed = writer.trans.written().to_vec();
        assert!(!compressed.is_empty());

        let mut reader = ZlibTransport::new(MockTransport::with_read_data(compressed), 6);
        let mut out = [0u8; 12];
        let mut filled = 0;
        while filled < out.len() {
            let n = reader.read(&mut out[filled..]).unwrap();
            assert!(n > 0, "reader returned EOF before all data arrived");
            filled += n;
        }
        assert_eq!(&out, b"hello, flume");
    }

    #[test]
    fn write_larger_than_one_chunk_still_reaches_the_transport() {
        let payload = vec![b'x'; CHUNK * 3];
        let mut writer = ZlibTransport::new(MockTransport::new(), 6);
        writer.write_all(&payload).unwrap();
        writer.flush().unwrap();

        let compressed = writer.trans.written().to_vec();
        assert!(!compressed.is_empty());

        let mut reader = ZlibTransport::new(MockTransport::with_read_data(compressed), 6);
        let mut out = vec![0u8; payload.len()];
        let mut filled = 0;
        while filled < out.len() {
            let n = reader.read(&mut out[filled..]).unwrap();
            assert!(n > 0, "reader returned EOF before all data arrived");
            filled += n;
        }
        assert_eq!(out, payload);
    }
}
