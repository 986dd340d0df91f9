//! Blocking in-memory pipe between a producer and a consumer thread.
//!
//! Built on a zero-capacity channel: each chunk written blocks until the
//! reader takes it.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::io::{self, BufRead, Read, Write};

/// Create a connected writer/reader pair.
pub fn pipe() -> (PipeWriter, PipeReader) {
    let (tx, rx) = bounded(0);
    (
        PipeWriter { tx },
        PipeReader {
            rx,
            chunk: Vec::new(),
            pos: 0,
            done: false,
        },
    )
}

/// Writing half. Dropping it ends the stream.
pub struct PipeWriter {
    tx: Sender<io::Result<Vec<u8>>>,
}

impl PipeWriter {
    /// Hand `err` to the reader in place of further data.
    pub fn fail(self, err: io::Error) {
        // A reader that is already gone has nothing left to report to.
        let _ = self.tx.send(Err(err));
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .send(Ok(buf.to_vec()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Reading half.
pub struct PipeReader {
    rx: Receiver<io::Result<Vec<u8>>>,
    chunk: Vec<u8>,
    pos: usize,
    done: bool,
}

impl BufRead for PipeReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        while self.pos >= self.chunk.len() && !self.done {
            match self.rx.recv() {
                Ok(Ok(chunk)) => {
                    self.chunk = chunk;
                    self.pos = 0;
                }
                Ok(Err(err)) => {
                    self.done = true;
                    return Err(err);
                }
                // Writer dropped: end of stream
                Err(_) => self.done = true,
            }
        }

        if self.pos >= self.chunk.len() {
            return Ok(&[]);
        }
        Ok(&self.chunk[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.chunk.len());
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_transfers_all_chunks() {
        let (mut writer, mut reader) = pipe();
        let producer = thread::spawn(move || {
            for chunk in ["<a>", "text", "</a>"] {
                writer.write_all(chunk.as_bytes()).unwrap();
            }
        });

        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        producer.join().unwrap();
        assert_eq!(out, "<a>text</a>");
    }

    #[test]
    fn test_writer_failure_reaches_reader() {
        let (mut writer, mut reader) = pipe();
        let producer = thread::spawn(move || {
            writer.write_all(b"partial").unwrap();
            writer.fail(io::Error::new(io::ErrorKind::InvalidData, "serialization failed"));
        });

        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        producer.join().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(out, b"partial");
    }

    #[test]
    fn test_closed_reader_breaks_writer() {
        let (mut writer, reader) = pipe();
        drop(reader);
        let err = writer.write(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
