//! A minimal interactive command shell.
//!
//! A line of input is split into words, grouped into pipelines by `|` and `&`,
//! and every stage of a pipeline runs on its own thread, wired to its
//! neighbours with OS pipes. Stages dispatch by name through a [`Registry`] of
//! builtins; any unknown name falls back to launching an external program
//! found on `PATH`. Pipelines ending in `&` run in the background while the
//! shell moves on to the next prompt.
//!
//! The main entry point is [`Interpreter`], which owns the read-parse-execute
//! loop. The public modules [`command`] and [`env`] expose the traits and types
//! needed to implement your own commands, and [`io_adapters`] provides stream
//! implementations for the real process streams and for in-memory capture.

mod builtin;
pub mod command;
pub mod env;
mod external;
pub mod interrupt;
mod interpreter;
pub mod io_adapters;
pub mod parser;
pub mod pipeline;
pub mod registry;

pub use external::Exec;
/// Just a convenient re-export of the interactive shell loop.
///
/// See [`Interpreter`] for the high-level API.
pub use interpreter::Interpreter;
pub use registry::Registry;
