use std::io;
use thiserror::Error;

/// Every failure a single command line can produce.
///
/// None of these are fatal to the shell: the REPL prints the message and
/// goes back to the prompt.
#[derive(Error, Debug)]
pub enum ShellError {
    /// Malformed pipeline or redirection. Holds the offending token.
    #[error("syntax error near unexpected token `{0}'")]
    Syntax(String),

    /// The program could not be found or is not executable.
    #[error("{name}: not found")]
    Spawn { name: String },

    /// A builtin failed in a way it could not report on its own stderr.
    #[error("{0}")]
    Builtin(String),

    /// A redirection target could not be opened.
    #[error("{path}: {}", io_message(.source))]
    Redirect {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("{}", io_message(.0))]
    Io(#[from] io::Error),

    #[error("empty pipeline")]
    EmptyPipeline,
}

pub type ShellResult<T> = Result<T, ShellError>;

/// The text of an I/O error without the `(os error N)` suffix.
pub fn io_message(err: &io::Error) -> String {
    let text = err.to_string();
    match text.rfind(" (os error ") {
        Some(idx) if text.ends_with(')') => text[..idx].to_string(),
        _ => text,
    }
}
