use crate::command::{ExitCode, Stdout, Streams};
use crate::env::Environment;
use crate::interrupt::InterruptListener;
use crate::parser::{self, ParseError, Pipeline};
use crate::pipeline::{Executor, Outcome};
use crate::registry::Registry;
use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use std::sync::Arc;

/// Exit code of a line that failed to parse.
const PARSE_ERROR_CODE: ExitCode = 2;

/// The shell's read-parse-execute loop.
///
/// The interpreter owns the shared [`Environment`] and a [`Registry`] of
/// commands. Each input line is split into words, grouped into pipelines, and
/// the pipelines are run in order; foreground pipelines are waited for,
/// background ones are not.
///
/// Example
/// ```
/// use pipeshell::Interpreter;
/// use pipeshell::env::Environment;
/// use pipeshell::io_adapters::MemStreams;
/// use std::sync::Arc;
///
/// let sh = Interpreter::new(Environment::from_vars([("PWD", "/")]), Default::default());
/// let streams = Arc::new(MemStreams::new());
/// sh.run(&mut "echo hello\nexit\n".as_bytes(), streams.clone()).unwrap();
/// assert!(streams.output().contains("hello"));
/// ```
pub struct Interpreter {
    env: Arc<Environment>,
    registry: Arc<Registry>,
    executor: Executor,
    split: fn(&str) -> Vec<String>,
    banner: bool,
    interrupts: bool,
}

impl Interpreter {
    /// Create an interpreter with the given environment and commands.
    ///
    /// By default the help banner is printed on start, words are split on
    /// whitespace, and SIGINT is left alone (see [`Interpreter::with_interrupts`]).
    pub fn new(env: Environment, registry: Registry) -> Self {
        let env = Arc::new(env);
        let registry = Arc::new(registry);
        Self {
            executor: Executor::new(Arc::clone(&registry), Arc::clone(&env)),
            env,
            registry,
            split: parser::split_words,
            banner: true,
            interrupts: false,
        }
    }

    /// Whether [`Interpreter::run`] starts by running the `help` command.
    pub fn with_banner(mut self, banner: bool) -> Self {
        self.banner = banner;
        self
    }

    /// Whether [`Interpreter::run`] installs the SIGINT listener that redraws
    /// the prompt. Only one loop per process can have this enabled at a time.
    pub fn with_interrupts(mut self, interrupts: bool) -> Self {
        self.interrupts = interrupts;
        self
    }

    /// Replace the function that splits a line into words.
    pub fn with_splitter(mut self, split: fn(&str) -> Vec<String>) -> Self {
        self.split = split;
        self
    }

    /// The environment shared with every command.
    pub fn env(&self) -> &Arc<Environment> {
        &self.env
    }

    /// Split and parse one line.
    pub fn parse(&self, line: &str) -> Result<Vec<Pipeline>, ParseError> {
        parser::parse_pipelines(&(self.split)(line))
    }

    /// Read lines from `input` until `exit` or end of input.
    ///
    /// Parse errors and failing stages are reported on the error stream and the
    /// loop carries on. Only failing to read `input` or to write the prompt
    /// ends the loop with an error.
    pub fn run(&self, input: &mut dyn BufRead, streams: Arc<dyn Streams>) -> Result<()> {
        let _listener = if self.interrupts {
            let env = Arc::clone(&self.env);
            let streams = Arc::clone(&streams);
            Some(InterruptListener::start(move || {
                if let Err(e) = write_prompt(&env, streams.stdout().as_mut()) {
                    tracing::debug!(error = %e, "cannot redraw prompt");
                }
            })?)
        } else {
            None
        };

        if self.banner {
            self.print_banner(streams.as_ref());
        }

        let mut stdout = streams.stdout();
        write_prompt(&self.env, stdout.as_mut())?;

        let mut buf = Vec::new();
        loop {
            buf.clear();
            if input.read_until(b'\n', &mut buf).context("cannot read input")? == 0 {
                tracing::debug!("end of input");
                return Ok(());
            }
            // Invalid UTF-8 becomes U+FFFD rather than ending the session.
            let decoded = String::from_utf8_lossy(&buf);
            let line = decoded.trim_end_matches(['\n', '\r']);

            if line == "exit" {
                writeln!(stdout, "Goodbye! :(")?;
                stdout.flush()?;
                return Ok(());
            }

            self.run_line(line, streams.as_ref());
            write_prompt(&self.env, stdout.as_mut())?;
        }
    }

    /// Parse and execute a single line; returns the exit code of the last
    /// foreground stage.
    ///
    /// A parse error is reported and gives [`PARSE_ERROR_CODE`]; a line whose last
    /// pipeline was backgrounded, or an empty line, gives 0.
    pub fn run_line(&self, line: &str, streams: &dyn Streams) -> ExitCode {
        let pipelines = match self.parse(line) {
            Ok(pipelines) => pipelines,
            Err(e) => {
                tracing::debug!(line, error = %e, "parse error");
                report(streams, &e.to_string());
                return PARSE_ERROR_CODE;
            }
        };

        let mut last = 0;
        for pipeline in &pipelines {
            last = match self.executor.run(pipeline, streams) {
                Ok(Outcome::Completed(codes)) => codes.last().copied().unwrap_or(0),
                Ok(Outcome::Detached) => 0,
                Err(e) => {
                    tracing::warn!(error = %e, "pipeline setup failed");
                    report(streams, &format!("sh: {e:#}"));
                    1
                }
            };
        }
        last
    }

    fn print_banner(&self, streams: &dyn Streams) {
        let Some(help) = self.registry.lookup("help") else {
            return;
        };
        let mut stdout = streams.stdout();
        help.execute(
            &[],
            &self.env,
            streams.stdin().as_mut(),
            stdout.as_mut(),
            streams.stderr().as_mut(),
        );
        let _ = stdout.flush();
    }
}

fn write_prompt(env: &Environment, stdout: &mut dyn Stdout) -> Result<()> {
    let pwd = env.get_var("PWD").unwrap_or_default();
    write!(stdout, "\n{pwd} $ ")?;
    stdout.flush()?;
    Ok(())
}

fn report(streams: &dyn Streams, message: &str) {
    let mut stderr = streams.stderr();
    let _ = writeln!(stderr, "{message}");
    let _ = stderr.flush();
}
