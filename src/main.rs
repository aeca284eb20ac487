use anyhow::{Context, Result};
use argh::FromArgs;
use pipeshell::Interpreter;
use pipeshell::Registry;
use pipeshell::env::Environment;
use pipeshell::io_adapters::ProcessStreams;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(FromArgs)]
/// A minimal interactive shell with pipes and background pipelines.
struct Args {
    #[argh(option, short = 'c')]
    /// run a single line and exit with its status
    command: Option<String>,

    #[argh(switch)]
    /// do not print the help text on startup
    no_banner: bool,

    #[argh(option)]
    /// log filter in RUST_LOG syntax; defaults to RUST_LOG, or "warn"
    log: Option<String>,
}

fn main() -> ExitCode {
    let args: Args = argh::from_env();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    init_tracing(args.log.as_deref())?;

    let env = Environment::from_process()?;
    let sh = Interpreter::new(env, Registry::default()).with_banner(!args.no_banner);

    if let Some(line) = args.command {
        let code = sh.run_line(&line, &ProcessStreams);
        return Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)));
    }

    // Not `stdin().lock()`: stages may read stdin while the loop waits on them.
    let mut input = io::BufReader::new(io::stdin());
    sh.with_interrupts(true)
        .run(&mut input, Arc::new(ProcessStreams))?;
    Ok(ExitCode::SUCCESS)
}

fn init_tracing(filter: Option<&str>) -> Result<()> {
    let filter = match filter {
        Some(filter) => EnvFilter::try_new(filter).context("invalid --log filter")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
    Ok(())
}
