use crate::env::Environment;
use std::io::{self, Read, Write};
use std::process::Stdio;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Readable stream handed to a pipeline stage.
///
/// Besides plain reads, a stream backed by an OS handle (a pipe, the process
/// stdin) can give a child process its own [`Stdio`] for the same source, so
/// external programs read it directly instead of through a copy loop.
pub trait Stdin: Read + Send {
    /// Return a [`Stdio`] reading from the same source, or `None` for streams
    /// that only live in memory.
    fn stdio(&mut self) -> io::Result<Option<Stdio>>;
}

/// Writable stream handed to a pipeline stage.
///
/// See [`Stdin`] for the meaning of [`Stdout::stdio`].
pub trait Stdout: Write + Send {
    /// Return a [`Stdio`] writing to the same sink, or `None` for streams
    /// that only live in memory. Buffered bytes are flushed first.
    fn stdio(&mut self) -> io::Result<Option<Stdio>>;
}

/// The uniform capability every builtin and the external-program fallback
/// implement.
///
/// A command reports failures on `stderr` and through its exit code; it never
/// returns an error to the caller. Implementations must be shareable across
/// threads because every pipeline stage runs on its own thread.
pub trait Command: Send + Sync {
    fn execute(
        &self,
        args: &[String],
        env: &Environment,
        stdin: &mut dyn Stdin,
        stdout: &mut dyn Stdout,
        stderr: &mut dyn Stdout,
    ) -> ExitCode;
}

/// The shell's own standard streams.
///
/// Every pipeline asks for fresh handles: stage 0 reads [`Streams::stdin`],
/// the last stage writes [`Streams::stdout`], and each stage reports on its
/// own [`Streams::stderr`] handle.
pub trait Streams: Send + Sync {
    fn stdin(&self) -> Box<dyn Stdin>;
    fn stdout(&self) -> Box<dyn Stdout>;
    fn stderr(&self) -> Box<dyn Stdout>;
}
