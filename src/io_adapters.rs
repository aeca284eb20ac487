//! Stream implementations for the real process streams, OS pipes, and
//! in-memory buffers.

use crate::command::{Stdin, Stdout, Streams};
use std::io::{self, Cursor, PipeReader, PipeWriter, Read, Result as IoResult, Write};
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

impl Stdin for io::Stdin {
    fn stdio(&mut self) -> IoResult<Option<Stdio>> {
        Ok(Some(Stdio::inherit()))
    }
}

impl Stdout for io::Stdout {
    fn stdio(&mut self) -> IoResult<Option<Stdio>> {
        self.flush()?;
        Ok(Some(Stdio::inherit()))
    }
}

impl Stdout for io::Stderr {
    fn stdio(&mut self) -> IoResult<Option<Stdio>> {
        self.flush()?;
        Ok(Some(Stdio::inherit()))
    }
}

/// The child gets a duplicate of the read end; ours stays open until the
/// stage drops it.
impl Stdin for PipeReader {
    fn stdio(&mut self) -> IoResult<Option<Stdio>> {
        Ok(Some(self.try_clone()?.into()))
    }
}

/// The child gets a duplicate of the write end, so the reader sees EOF only
/// once both the child and the stage have let go of it.
impl Stdout for PipeWriter {
    fn stdio(&mut self) -> IoResult<Option<Stdio>> {
        Ok(Some(self.try_clone()?.into()))
    }
}

/// Memory-backed reader.
///
/// Clones share one read position, like several handles onto one stream.
#[derive(Clone, Default)]
pub struct MemReader {
    cursor: Arc<Mutex<Cursor<Vec<u8>>>>,
}

impl MemReader {
    /// Create a MemReader that will read from the provided buffer.
    pub fn new(buf: impl Into<Vec<u8>>) -> Self {
        Self {
            cursor: Arc::new(Mutex::new(Cursor::new(buf.into()))),
        }
    }
}

impl Read for MemReader {
    fn read(&mut self, out: &mut [u8]) -> IoResult<usize> {
        self.cursor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .read(out)
    }
}

impl Stdin for MemReader {
    fn stdio(&mut self) -> IoResult<Option<Stdio>> {
        Ok(None)
    }
}

/// Memory-backed writer for capturing output.
///
/// Clones append to the same buffer.
#[derive(Clone, Default)]
pub struct MemWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemWriter {
    /// Public constructor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, decoded lossily.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.buf.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.lock().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

impl Stdout for MemWriter {
    fn stdio(&mut self) -> IoResult<Option<Stdio>> {
        Ok(None)
    }
}

/// The streams of the current process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessStreams;

impl Streams for ProcessStreams {
    fn stdin(&self) -> Box<dyn Stdin> {
        Box::new(io::stdin())
    }

    fn stdout(&self) -> Box<dyn Stdout> {
        Box::new(io::stdout())
    }

    fn stderr(&self) -> Box<dyn Stdout> {
        Box::new(io::stderr())
    }
}

/// In-memory shell streams: a fixed input plus captured output and errors.
#[derive(Clone, Default)]
pub struct MemStreams {
    input: MemReader,
    output: MemWriter,
    errors: MemWriter,
}

impl MemStreams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Streams whose stdin yields `input` once, shared by every reader.
    pub fn with_input(input: impl Into<Vec<u8>>) -> Self {
        Self {
            input: MemReader::new(input),
            ..Self::default()
        }
    }

    /// Everything written to stdout so far.
    pub fn output(&self) -> String {
        self.output.contents()
    }

    /// Everything written to stderr so far.
    pub fn errors(&self) -> String {
        self.errors.contents()
    }
}

impl Streams for MemStreams {
    fn stdin(&self) -> Box<dyn Stdin> {
        Box::new(self.input.clone())
    }

    fn stdout(&self) -> Box<dyn Stdout> {
        Box::new(self.output.clone())
    }

    fn stderr(&self) -> Box<dyn Stdout> {
        Box::new(self.errors.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mem_reader_clones_share_position() {
        let mut a = MemReader::new("abcdef");
        let mut b = a.clone();

        let mut buf = [0u8; 3];
        a.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abc");

        let mut rest = String::new();
        b.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "def");
    }

    #[test]
    fn test_mem_writer_clones_share_buffer() {
        let mut w = MemWriter::new();
        let mut other = w.clone();
        write!(w, "hello ").unwrap();
        write!(other, "world").unwrap();
        assert_eq!(w.contents(), "hello world");
        assert_eq!(other.contents(), "hello world");
    }

    #[test]
    fn test_memory_streams_have_no_os_handle() {
        assert!(MemReader::default().stdio().unwrap().is_none());
        assert!(MemWriter::default().stdio().unwrap().is_none());
    }

    #[test]
    fn test_pipe_ends_have_os_handles() {
        let (mut r, mut w) = io::pipe().unwrap();
        assert!(Stdin::stdio(&mut r).unwrap().is_some());
        assert!(Stdout::stdio(&mut w).unwrap().is_some());
    }

    #[test]
    fn test_mem_streams_capture_output_and_errors() {
        let streams = MemStreams::with_input("in");
        write!(streams.stdout(), "out").unwrap();
        write!(streams.stderr(), "err").unwrap();

        let mut input = String::new();
        streams.stdin().read_to_string(&mut input).unwrap();

        assert_eq!(input, "in");
        assert_eq!(streams.output(), "out");
        assert_eq!(streams.errors(), "err");
    }
}
