//! An in-memory duplex pipe standing in for a state transfer channel.

use bytes::{Buf, Bytes, BytesMut};
use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Bytes buffered by a writer before they are sent without a flush.
const CHUNK_SIZE: usize = 8 * 1024;

/// Creates a connected writer and reader.
///
/// Reads block until data arrives; with `read_timeout` set, a read that
/// waits longer fails with [`io::ErrorKind::TimedOut`]. Dropping the writer
/// flushes it and then ends the stream.
pub fn pipe(read_timeout: Option<Duration>) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel();
    (
        PipeWriter {
            tx,
            buf: BytesMut::with_capacity(CHUNK_SIZE),
        },
        PipeReader {
            rx,
            current: Bytes::new(),
            read_timeout,
        },
    )
}

/// The writing end of a [`pipe`].
#[derive(Debug)]
pub struct PipeWriter {
    tx: Sender<Bytes>,
    buf: BytesMut,
}

impl PipeWriter {
    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = self.buf.split().freeze();
        self.tx
            .send(chunk)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader dropped"))
    }
}

impl Write for PipeWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        if self.buf.len() >= CHUNK_SIZE {
            self.send_buffered()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        let _ = self.send_buffered();
    }
}

/// The reading end of a [`pipe`].
#[derive(Debug)]
pub struct PipeReader {
    rx: Receiver<Bytes>,
    current: Bytes,
    read_timeout: Option<Duration>,
}

impl PipeReader {
    fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        let received = match self.read_timeout {
            Some(timeout) => self.rx.recv_timeout(timeout),
            None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(chunk) => Ok(Some(chunk)),
            Err(RecvTimeoutError::Disconnected) => Ok(None),
            Err(RecvTimeoutError::Timeout) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "timed out waiting for state",
            )),
        }
    }
}

impl Read for PipeReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        while self.current.is_empty() {
            match self.next_chunk()? {
                Some(chunk) => self.current = chunk,
                None => return Ok(0),
            }
        }
        let n = out.len().min(self.current.len());
        out[..n].copy_from_slice(&self.current[..n]);
        self.current.advance(n);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn bytes_cross_threads_in_order() {
        let (mut writer, mut reader) = pipe(Some(Duration::from_secs(5)));
        let handle = thread::spawn(move || {
            for i in 0..100u32 {
                writer.write_all(&i.to_be_bytes()).unwrap();
            }
        });

        let mut data = Vec::new();
        reader.read_to_end(&mut data).unwrap();
        handle.join().unwrap();

        assert_eq!(data.len(), 400);
        assert_eq!(&data[396..], &99u32.to_be_bytes());
    }

    #[test]
    fn flush_makes_data_visible() {
        let (mut writer, mut reader) = pipe(Some(Duration::from_secs(5)));
        writer.write_all(b"abc").unwrap();
        writer.flush().unwrap();

        let mut buf = [0u8; 3];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abc");
    }

    #[test]
    fn read_times_out() {
        let (_writer, mut reader) = pipe(Some(Duration::from_millis(20)));
        let mut buf = [0u8; 1];
        let err = reader.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn write_after_reader_dropped_fails() {
        let (mut writer, reader) = pipe(None);
        drop(reader);
        writer.write_all(b"x").unwrap();
        assert_eq!(
            writer.flush().unwrap_err().kind(),
            io::ErrorKind::BrokenPipe
        );
    }
}
