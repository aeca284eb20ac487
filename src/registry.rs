use crate::builtin::{Builtin, Cd, Echo, Help, Kill, Pwd};
use crate::command::Command;
use crate::external::Exec;
use crate::parser::PipeItem;
use std::collections::HashMap;
use std::sync::Arc;

/// Name-to-command table with a fallback for every name it doesn't know.
///
/// The fallback receives the unknown name as its first argument, which is how
/// an unrecognized word turns into an external program lookup.
pub struct Registry {
    commands: HashMap<String, Arc<dyn Command>>,
    fallback: Arc<dyn Command>,
}

impl Registry {
    /// Create an empty registry that sends every name to `fallback`.
    pub fn new(fallback: impl Command + 'static) -> Self {
        Self {
            commands: HashMap::new(),
            fallback: Arc::new(fallback),
        }
    }

    /// Register `command` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, command: impl Command + 'static) {
        self.commands.insert(name.into(), Arc::new(command));
    }

    /// The command registered under `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.get(name).cloned()
    }

    /// Resolve a stage to the command that runs it and the arguments it gets.
    pub fn dispatch(&self, item: &PipeItem) -> (Arc<dyn Command>, Vec<String>) {
        match self.lookup(item.name()) {
            Some(command) => (command, item.args().to_vec()),
            None => {
                tracing::trace!(name = item.name(), "no builtin, using fallback");
                let mut args = Vec::with_capacity(item.args().len() + 1);
                args.push(item.name().to_owned());
                args.extend_from_slice(item.args());
                (Arc::clone(&self.fallback), args)
            }
        }
    }
}

impl Default for Registry {
    /// Create a registry with the default set of commands:
    /// - built-ins: `cd`, `pwd`, `echo`, `help`, `kill`
    /// - `exec`, which is also the fallback for unknown names
    fn default() -> Self {
        let mut registry = Self::new(Exec);
        registry.register("cd", Builtin::<Cd>::default());
        registry.register("pwd", Builtin::<Pwd>::default());
        registry.register("echo", Echo);
        registry.register("help", Help);
        registry.register("kill", Builtin::<Kill>::default());
        registry.register("exec", Exec);
        registry
    }
}
