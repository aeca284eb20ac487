//! Concurrent execution of one pipeline.
//!
//! For `a | b | c` the executor creates two OS pipes up front, then starts one
//! thread per stage: `a` reads the shell's stdin and writes the first pipe,
//! `b` reads the first pipe and writes the second, `c` reads the second pipe
//! and writes the shell's stdout. Each stage owns the write end it feeds, and
//! that end is closed when the stage ends, however it ends. That close is the
//! only EOF the next stage ever sees.

use crate::command::{Command, ExitCode, Stdin, Stdout, Streams};
use crate::env::Environment;
use crate::parser::Pipeline;
use crate::registry::Registry;
use anyhow::{Context, Result};
use std::io::{self, Write};
use std::iter;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// How a pipeline run ended, as far as the caller can tell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Every stage finished; exit codes in stage order.
    Completed(Vec<ExitCode>),
    /// Backgrounded: the stages were started and left running.
    Detached,
}

/// Runs pipelines against a command registry and the shared environment.
#[derive(Clone)]
pub struct Executor {
    registry: Arc<Registry>,
    env: Arc<Environment>,
}

impl Executor {
    pub fn new(registry: Arc<Registry>, env: Arc<Environment>) -> Self {
        Self { registry, env }
    }

    /// Start every stage of `pipeline` and, unless it is backgrounded, wait for
    /// all of them.
    ///
    /// Stage failures never surface here: each stage reports a non-zero exit
    /// code on its own stderr handle as `<name>: exit code <n>`. An `Err` means
    /// the pipeline could not be set up (pipe creation or thread spawn failed).
    pub fn run(&self, pipeline: &Pipeline, streams: &dyn Streams) -> Result<Outcome> {
        let stages = pipeline.stages();

        let mut readers = Vec::with_capacity(stages.len().saturating_sub(1));
        let mut writers = Vec::with_capacity(stages.len().saturating_sub(1));
        for _ in 1..stages.len() {
            let (reader, writer) = io::pipe().context("cannot create pipe")?;
            readers.push(reader);
            writers.push(writer);
        }

        let inputs = iter::once(streams.stdin())
            .chain(readers.into_iter().map(|r| Box::new(r) as Box<dyn Stdin>));
        let outputs = writers
            .into_iter()
            .map(|w| Box::new(w) as Box<dyn Stdout>)
            .chain(iter::once(streams.stdout()));

        let mut handles = Vec::with_capacity(stages.len());
        for (idx, ((item, stdin), stdout)) in stages.iter().zip(inputs).zip(outputs).enumerate() {
            let (command, args) = self.registry.dispatch(item);
            let stage = Stage {
                name: item.name().to_owned(),
                command,
                args,
                env: Arc::clone(&self.env),
                stdin,
                stdout: Outbound(stdout),
                stderr: streams.stderr(),
            };
            match stage.spawn(idx) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // The unspawned stages' pipe ends are dropped on return,
                    // so the stages already running still see EOF.
                    if !pipeline.is_background() {
                        join_all(handles);
                    }
                    return Err(e);
                }
            }
        }

        if pipeline.is_background() {
            tracing::debug!(stages = stages.len(), "pipeline detached");
            return Ok(Outcome::Detached);
        }
        Ok(Outcome::Completed(join_all(handles)))
    }
}

fn join_all(handles: Vec<JoinHandle<ExitCode>>) -> Vec<ExitCode> {
    handles
        .into_iter()
        .map(|handle| handle.join().unwrap_or(1))
        .collect()
}

/// Write end of a stage.
///
/// Flushed and released on drop, which runs on every way out of the stage
/// thread, panics included.
struct Outbound(Box<dyn Stdout>);

impl Drop for Outbound {
    fn drop(&mut self) {
        if let Err(e) = self.0.flush() {
            tracing::debug!(error = %e, "flushing stage output failed");
        }
    }
}

struct Stage {
    name: String,
    command: Arc<dyn Command>,
    args: Vec<String>,
    env: Arc<Environment>,
    stdin: Box<dyn Stdin>,
    stdout: Outbound,
    stderr: Box<dyn Stdout>,
}

impl Stage {
    fn spawn(self, idx: usize) -> Result<JoinHandle<ExitCode>> {
        // Not the command name: thread names must not contain NUL.
        let thread_name = format!("stage-{idx}");
        tracing::trace!(stage = %self.name, idx, args = ?self.args, "spawning stage");
        thread::Builder::new()
            .name(thread_name)
            .spawn(move || self.run())
            .context("cannot spawn stage thread")
    }

    fn run(self) -> ExitCode {
        let Stage {
            name,
            command,
            args,
            env,
            mut stdin,
            mut stdout,
            mut stderr,
        } = self;

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            command.execute(&args, &env, stdin.as_mut(), stdout.0.as_mut(), stderr.as_mut())
        }));
        // Downstream is waiting on this close; release it before anything else.
        drop(stdout);
        drop(stdin);

        let code = result.unwrap_or_else(|_| {
            tracing::warn!(stage = %name, "stage panicked");
            1
        });
        tracing::trace!(stage = %name, code, "stage finished");
        if code != 0 {
            let _ = writeln!(stderr, "{name}: exit code {code}");
            let _ = stderr.flush();
        }
        code
    }
}
