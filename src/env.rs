use anyhow::{Context, Result};
use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Shared string-to-string state visible to every command, e.g. `PWD` and `HOME`.
///
/// One instance lives for the whole shell session and is shared by reference
/// (`Arc<Environment>`) with every pipeline stage. Each access locks the map
/// for the duration of a single read or write; two stages running at the same
/// time (a background `cd` and the next prompt, say) still race in the order
/// they touch it.
#[derive(Debug, Default)]
pub struct Environment {
    vars: Mutex<HashMap<String, String>>,
}

impl Environment {
    /// Seed `PWD` from the process working directory and `HOME` from `$HOME`.
    pub fn from_process() -> Result<Self> {
        let pwd = stdenv::current_dir().context("cannot determine the working directory")?;
        let home = stdenv::var("HOME").context("cannot determine the home directory")?;
        Ok(Self::from_vars([
            ("PWD".to_string(), pwd.to_string_lossy().into_owned()),
            ("HOME".to_string(), home),
        ]))
    }

    /// Build an environment holding exactly the given variables.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            vars: Mutex::new(vars),
        }
    }

    /// Get the value of a variable.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    /// Set or override a variable.
    pub fn set_var(&self, key: impl Into<String>, val: impl Into<String>) {
        self.lock().insert(key.into(), val.into());
    }

    /// The directory commands run in: `PWD` when set, the process working
    /// directory otherwise.
    pub fn current_dir(&self) -> PathBuf {
        match self.get_var("PWD") {
            Some(pwd) if !pwd.is_empty() => PathBuf::from(pwd),
            _ => stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
        }
    }

    /// Copy of every variable, for handing to child processes.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.vars.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
