use crate::command::{Command, ExitCode, Stdin, Stdout};
use crate::env::Environment;
use anyhow::{Context, Result};
use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{self, Stdio};
use std::thread;

/// Launches an external program: `exec <program> [args...]`.
///
/// This is also the registry's fallback, so `ls -l` reaches it as
/// `["ls", "-l"]`. The program runs in `PWD` with the shell's variables added
/// to its environment. Streams that carry an OS handle are given to the child
/// as-is; in-memory streams are copied through on helper threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exec;

impl Command for Exec {
    fn execute(
        &self,
        args: &[String],
        env: &Environment,
        stdin: &mut dyn Stdin,
        stdout: &mut dyn Stdout,
        stderr: &mut dyn Stdout,
    ) -> ExitCode {
        let Some((name, rest)) = args.split_first() else {
            let _ = writeln!(stderr, "exec: empty call");
            return 1;
        };

        let search_paths = env
            .get_var("PATH")
            .map(OsString::from)
            .or_else(|| std::env::var_os("PATH"))
            .unwrap_or_default();
        let cwd = env.current_dir();
        let Some(program) = find_command_path(&search_paths, &cwd, Path::new(name)) else {
            let _ = writeln!(stderr, "exec: command not found: {name}");
            return 1;
        };

        tracing::debug!(program = %program.display(), "spawning external command");
        match run_child(&program, rest, &cwd, env, stdin, stdout, stderr) {
            Ok(Some(code)) => code,
            Ok(None) => {
                tracing::debug!(program = %program.display(), "terminated without exit code");
                1
            }
            Err(e) => {
                let _ = writeln!(stderr, "exec: command error: {e:#}");
                1
            }
        }
    }
}

/// Run `program` to completion and return its exit code, `None` when it was
/// killed by a signal.
fn run_child(
    program: &Path,
    args: &[String],
    cwd: &Path,
    env: &Environment,
    stdin: &mut dyn Stdin,
    stdout: &mut dyn Stdout,
    stderr: &mut dyn Stdout,
) -> Result<Option<ExitCode>> {
    let child_stdin = stdin.stdio().context("cannot hand over stdin")?;
    let child_stdout = stdout.stdio().context("cannot hand over stdout")?;
    let child_stderr = stderr.stdio().context("cannot hand over stderr")?;

    let mut child = process::Command::new(program)
        .args(args)
        .current_dir(cwd)
        .envs(env.snapshot())
        .stdin(child_stdin.unwrap_or_else(Stdio::piped))
        .stdout(child_stdout.unwrap_or_else(Stdio::piped))
        .stderr(child_stderr.unwrap_or_else(Stdio::piped))
        .spawn()
        .with_context(|| format!("failed to spawn {}", program.display()))?;

    // Only the piped (in-memory) streams show up here.
    let to_child = child.stdin.take();
    let from_child = child.stdout.take();
    let errors_from_child = child.stderr.take();

    let status = thread::scope(|s| {
        if let Some(mut sink) = to_child {
            s.spawn(move || pump(stdin, &mut sink));
        }
        if let Some(mut source) = from_child {
            s.spawn(move || pump(&mut source, stdout));
        }
        if let Some(mut source) = errors_from_child {
            s.spawn(move || pump(&mut source, stderr));
        }
        child.wait()
    })
    .context("failed to wait for child")?;

    Ok(status.code())
}

/// Copy until EOF; the sink is dropped (closed) by the caller when this returns.
fn pump(source: &mut (impl Read + ?Sized), sink: &mut (impl Write + ?Sized)) {
    if let Err(e) = io::copy(source, sink).and_then(|_| sink.flush()) {
        tracing::debug!(error = %e, "stream copy to or from child stopped");
    }
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it is a file.
/// - Path with a separator (`bin/sh`, `./foo`): resolved against `cwd`, returned
///   if it is a file.
/// - Single path component: search each directory in `search_paths` (PATH)
///   and return the first file found. Empty PATH entries are skipped.
/// - Empty path: returns `None`.
///
/// Returns either a borrowed reference to the provided `path` or an owned `PathBuf`
/// when the result is discovered relative to `cwd` or via PATH lookup.
pub fn find_command_path<'a>(
    search_paths: &OsStr,
    cwd: &Path,
    path: &'a Path,
) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        // Empty path -> not found
        (None, _) => None,
        // Single component -> search in PATH
        (Some(std::path::Component::Normal(x)), None) => {
            find_in_path(search_paths, x).map(Cow::Owned)
        }
        // Anything else (./foo, ../foo, bin/sh) -> relative to cwd
        _ => {
            let joined = cwd.join(path);
            find_by_path(&joined)?;
            Some(Cow::Owned(joined))
        }
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(cmd))
        .find(|path| path.is_file())
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.is_file() { Some(path) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_adapters::{MemReader, MemWriter};
    use std::fs::File;

    fn osstr(s: &str) -> &OsStr {
        OsStr::new(s)
    }

    fn run(args: &[&str], input: &str, env: &Environment) -> (ExitCode, String, String) {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let mut out = MemWriter::new();
        let mut err = MemWriter::new();
        let code = Exec.execute(&args, env, &mut MemReader::new(input), &mut out, &mut err);
        (code, out.contents(), err.contents())
    }

    fn env_with_path() -> Environment {
        Environment::from_vars([("PWD", "/"), ("PATH", "/usr/bin:/bin")])
    }

    #[test]
    fn absolute_existing_true() {
        let path = Path::new("/bin/sh");
        let res = find_command_path(osstr("/bin"), Path::new("/"), path);
        assert!(res.is_some(), "Expected to find /bin/sh via absolute path");
        let found = res.unwrap();
        assert_eq!(found.as_ref(), path);
    }

    #[test]
    fn absolute_nonexisting() {
        let path = Path::new("/bin/nonexisting");
        let res = find_command_path(osstr("/bin"), Path::new("/"), path);
        assert!(
            res.is_none(),
            "Expected not to find /bin/nonexisting via absolute path"
        );
    }

    #[test]
    fn single_component_found_in_path() {
        // Search for "sh" in PATH that includes /bin
        let res = find_command_path(osstr("/nonexisting:/bin"), Path::new("/"), Path::new("sh"));
        let found = res.expect("Expected to find 'sh' in /bin via PATH search");
        assert_eq!(found.as_ref(), Path::new("/bin/sh"));
    }

    #[test]
    fn single_component_not_found_in_path() {
        let res = find_command_path(osstr("/bin"), Path::new("/"), Path::new("nonexisting"));
        assert!(res.is_none(), "Expected not to find 'nonexisting' in PATH");
    }

    #[test]
    fn directories_are_not_commands() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("tool")).unwrap();
        let res = find_command_path(tmp.path().as_os_str(), Path::new("/"), Path::new("tool"));
        assert!(res.is_none());
    }

    #[test]
    fn relative_paths_resolve_against_cwd() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("bin")).unwrap();
        File::create(tmp.path().join("bin").join("sh")).unwrap();
        File::create(tmp.path().join("foo")).unwrap();

        let found = find_command_path(osstr("/does/not/matter"), tmp.path(), Path::new("bin/sh"))
            .expect("Expected to find relative 'bin/sh' in cwd");
        assert_eq!(found.as_ref(), tmp.path().join("bin/sh"));

        let found = find_command_path(osstr("/bin"), tmp.path(), Path::new("./foo"))
            .expect("Expected to find './foo' in cwd");
        assert!(found.as_ref().ends_with("foo"));
        assert!(found.as_ref().starts_with(tmp.path()));
    }

    #[test]
    fn empty_path_is_none() {
        let res = find_command_path(osstr("/bin"), Path::new("/"), Path::new(""));
        assert!(res.is_none(), "Empty path should not resolve to anything");
    }

    #[test]
    fn exec_without_args_fails() {
        let (code, _, err) = run(&[], "", &env_with_path());
        assert_eq!(code, 1);
        assert_eq!(err, "exec: empty call\n");
    }

    #[test]
    fn exec_unknown_command_fails() {
        let (code, out, err) = run(&["definitely-not-a-command-4242"], "", &env_with_path());
        assert_eq!(code, 1);
        assert!(out.is_empty());
        assert_eq!(err, "exec: command not found: definitely-not-a-command-4242\n");
    }

    #[test]
    fn exec_pumps_memory_streams() {
        let (code, out, _) = run(&["cat"], "piped through\n", &env_with_path());
        assert_eq!(code, 0);
        assert_eq!(out, "piped through\n");
    }

    #[test]
    fn exec_propagates_exit_code_and_stderr() {
        let (code, out, err) = run(
            &["sh", "-c", "echo out; echo err >&2; exit 3"],
            "",
            &env_with_path(),
        );
        assert_eq!(code, 3);
        assert_eq!(out, "out\n");
        assert_eq!(err, "err\n");
    }

    #[test]
    fn exec_runs_in_pwd_with_shell_vars() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = std::fs::canonicalize(tmp.path()).unwrap();
        let env = Environment::from_vars([
            ("PWD", dir.to_string_lossy().into_owned()),
            ("PATH", "/usr/bin:/bin".to_string()),
            ("GREETING", "hi".to_string()),
        ]);

        let (code, out, _) = run(&["sh", "-c", "pwd -P; echo $GREETING"], "", &env);
        assert_eq!(code, 0);
        assert_eq!(out, format!("{}\nhi\n", dir.display()));
    }

    #[test]
    fn exec_signal_death_is_exit_code_one() {
        let (code, _, _) = run(&["sh", "-c", "kill -9 $$"], "", &env_with_path());
        assert_eq!(code, 1);
    }

    #[test]
    fn exec_hands_pipe_to_child() {
        let (mut reader, mut writer) = io::pipe().unwrap();
        let args = vec!["echo".to_string(), "via pipe".to_string()];
        let code = Exec.execute(
            &args,
            &env_with_path(),
            &mut MemReader::default(),
            &mut writer,
            &mut MemWriter::new(),
        );
        drop(writer);
        assert_eq!(code, 0);

        let mut got = String::new();
        reader.read_to_string(&mut got).unwrap();
        assert_eq!(got, "via pipe\n");
    }
}
