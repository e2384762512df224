//! Drive a [`CipherBlock`] from `std::io` pipelines

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::block::CipherBlock;
use crate::error::CipherError;

#[derive(Debug, Error)]
pub enum CipherIoError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Cipher(#[from] CipherError),
}

/// Byte counts for one [`cipher_copy`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// Pump `reader` through `codec` into `writer`, `buffer_size` bytes at a time.
///
/// The codec is flushed exactly once, after the reader is exhausted.
pub fn cipher_copy<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    mut codec: CipherBlock,
    buffer_size: usize,
) -> Result<CopyStats, CipherIoError> {
    let mut input = vec![0u8; buffer_size.max(1)];
    let mut output = Vec::with_capacity(codec.process_size(input.len()));
    let mut stats = CopyStats::default();

    loop {
        let n = match reader.read(&mut input) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        stats.bytes_in += n as u64;

        output.clear();
        codec.process(&input[..n], &mut output)?;
        writer.write_all(&output)?;
        stats.bytes_out += output.len() as u64;
    }

    output.clear();
    codec.flush(&mut output)?;
    writer.write_all(&output)?;
    writer.flush()?;
    stats.bytes_out += output.len() as u64;

    tracing::debug!(
        mode = ?codec.mode(),
        bytes_in = stats.bytes_in,
        bytes_out = stats.bytes_out,
        "cipher copy complete"
    );

    Ok(stats)
}

/// A `Write` adapter that runs everything written through a codec.
///
/// Call [`CipherWriter::finish`] to emit the final block. Dropping the
/// writer without finishing leaves the stream incomplete.
pub struct CipherWriter<W: Write> {
    codec: CipherBlock,
    inner: W,
    buf: Vec<u8>,
}

impl<W: Write> CipherWriter<W> {
    pub fn new(codec: CipherBlock, inner: W) -> Self {
        Self {
            codec,
            inner,
            buf: Vec::new(),
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Flush the codec, write the final block and return the inner writer.
    pub fn finish(mut self) -> Result<W, CipherIoError> {
        self.buf.clear();
        self.codec.flush(&mut self.buf)?;
        self.inner.write_all(&self.buf)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for CipherWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.clear();
        self.codec
            .process(data, &mut self.buf)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.inner.write_all(&self.buf)?;
        Ok(data.len())
    }

    // Only flushes the inner writer; the codec is finalized by `finish`
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
