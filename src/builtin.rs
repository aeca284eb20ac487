use crate::command::{Command, ExitCode, Stdin, Stdout};
use crate::env::Environment;
use anyhow::{Context, Result, bail};
use argh::{EarlyExit, FromArgs};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::env;
use std::fs;
use std::io::{Read, Write};
use std::marker::PhantomData;
use std::path::{Component, Path, PathBuf};

/// Built-in commands that take options.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "kill" or "cd".
    fn name() -> &'static str;

    /// Executes the command using provided IO streams and environment.
    ///
    /// An `Err` is written to the stage's error stream and becomes exit code 1.
    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &Environment,
    ) -> Result<ExitCode>;
}

/// Adapts a [`BuiltinCommand`] to the [`Command`] capability: parses the
/// arguments, runs the command, and turns errors into messages plus exit code 1.
pub(crate) struct Builtin<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Default for Builtin<T> {
    fn default() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T: BuiltinCommand> Command for Builtin<T> {
    fn execute(
        &self,
        args: &[String],
        env: &Environment,
        stdin: &mut dyn Stdin,
        stdout: &mut dyn Stdout,
        stderr: &mut dyn Stdout,
    ) -> ExitCode {
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        let result = match T::from_args(&[T::name()], &argv) {
            Ok(cmd) => cmd.execute(stdin, stdout, env),
            Err(EarlyExit {
                output,
                status: Ok(()),
            }) => writeln!(stdout, "{}", output.trim_end())
                .map(|()| 0)
                .map_err(Into::into),
            Err(EarlyExit {
                output,
                status: Err(()),
            }) => Err(anyhow::anyhow!("{}: {}", T::name(), output.trim_end())),
        };
        match result {
            Ok(code) => code,
            Err(e) => {
                let _ = writeln!(stderr, "{e:#}");
                1
            }
        }
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _env: &Environment,
    ) -> Result<ExitCode> {
        let cwd = env::current_dir().context("pwd")?;
        writeln!(stdout, "{}", cwd.display())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory in HOME.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to PWD. Defaults to HOME when omitted.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        env: &Environment,
    ) -> Result<ExitCode> {
        let target = match self.target {
            Some(t) => PathBuf::from(t),
            None => PathBuf::from(env.get_var("HOME").context("cd: HOME not set")?),
        };

        let resolved = match env.get_var("PWD") {
            Some(pwd) if target.is_relative() => clean(&Path::new(&pwd).join(&target)),
            _ => clean(&target),
        };
        if !resolved.is_absolute() {
            bail!("cd: cannot enter {}", resolved.display());
        }

        let meta = fs::metadata(&resolved)
            .with_context(|| format!("cd: no such file or directory: {}", resolved.display()))?;
        if !meta.is_dir() {
            bail!("cd: not a directory: {}", resolved.display());
        }

        env::set_current_dir(&resolved)
            .with_context(|| format!("cd: can't chdir to {}", resolved.display()))?;
        env.set_var("PWD", resolved.to_string_lossy());
        Ok(0)
    }
}

/// Lexically normalize `path`: drop `.`, fold `name/..`, and keep `..` at the
/// root. Symlinks are not consulted, so `link/..` folds to the link's parent
/// directory rather than the target's.
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

#[derive(FromArgs)]
/// Terminate a process by its id.
pub struct Kill {
    #[argh(positional)]
    /// id of the process to terminate.
    pub pid: String,
}

impl BuiltinCommand for Kill {
    fn name() -> &'static str {
        "kill"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        _env: &Environment,
    ) -> Result<ExitCode> {
        let pid: i32 = self
            .pid
            .parse()
            .with_context(|| format!("kill: invalid process id {:?}", self.pid))?;
        // 0 and negative ids address whole process groups, the shell's own included.
        if pid <= 0 {
            bail!("kill: invalid process id {pid}");
        }
        kill(Pid::from_raw(pid), Signal::SIGKILL).with_context(|| format!("kill: {pid}"))?;
        Ok(0)
    }
}

/// Write the arguments to standard output, separated by spaces. No newline is
/// added and no option is recognized.
pub struct Echo;

impl Command for Echo {
    fn execute(
        &self,
        args: &[String],
        _env: &Environment,
        _stdin: &mut dyn Stdin,
        stdout: &mut dyn Stdout,
        stderr: &mut dyn Stdout,
    ) -> ExitCode {
        match write!(stdout, "{}", args.join(" ")) {
            Ok(()) => 0,
            Err(e) => {
                let _ = writeln!(stderr, "echo: {e}");
                1
            }
        }
    }
}

const HELP: &str = "\
pipeshell, a tiny shell. Available commands:
  help                  - show this message
  exit                  - leave the shell
  cd [path]             - change directory
  pwd                   - print the current directory
  echo [args...]        - print the arguments
  kill <pid>            - kill a process by id
  <any PATH executable> - run a program found on PATH
  <cmd1> | <cmd2>       - feed the output of <cmd1> to <cmd2>
  <cmd1> &              - run <cmd1> in the background";

/// Print the usage block.
pub struct Help;

impl Command for Help {
    fn execute(
        &self,
        _args: &[String],
        _env: &Environment,
        _stdin: &mut dyn Stdin,
        stdout: &mut dyn Stdout,
        stderr: &mut dyn Stdout,
    ) -> ExitCode {
        match stdout.write_all(HELP.as_bytes()) {
            Ok(()) => 0,
            Err(e) => {
                let _ = writeln!(stderr, "help: {e}");
                1
            }
        }
    }
}
