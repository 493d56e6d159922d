//! A small interactive shell with real pipelines.
//!
//! A command line goes through [`lexer::tokenize`] and [`parser::plan`] and
//! is then run by the [`Interpreter`], which starts every stage of the
//! pipeline at once: external programs as child processes, builtins on their
//! own threads behind OS pipes. The [`Repl`] ties this to a raw-mode
//! [`editor::LineEditor`] with command-name completion and history.
//!
//! The public modules expose the pieces for embedding and testing; the
//! [`command::Process`] trait is the seam between the orchestrator and the
//! stages it runs.

mod builtin;
pub mod command;
pub mod completion;
pub mod config;
pub mod editor;
pub mod error;
mod external;
mod interpreter;
pub mod io_adapters;
pub mod lexer;
pub mod logging;
pub mod parser;
mod repl;
pub mod session;
mod terminal;

pub use builtin::{BUILTIN_NAMES, is_builtin};
pub use config::ShellConfig;
pub use error::{ShellError, ShellResult};
pub use external::find_command_path;
/// Just a convenient re-export of the pipeline runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::Interpreter;
pub use repl::Repl;
pub use session::{Session, SessionState};
