use crate::error::ShellResult;
use crate::io_adapters::{Sink, Source};
use crate::lexer::TargetFd;
use crate::session::Session;
use std::fs::File;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// Stages killed by a signal report `128 + signal`.
pub type ExitCode = i32;

/// Exit code of a stage that could not be started.
pub const NOT_FOUND_EXIT: ExitCode = 127;

/// One running (or runnable) stage of a pipeline.
///
/// External programs and builtins both implement this, so the orchestrator
/// wires them up the same way. The lifecycle is:
/// `redirect*` → `start` → take `stdin`/`stdout`/`stderr` → `wait`.
///
/// Each stream handle can be taken once. A stream that was redirected to a
/// file has no handle.
pub trait Process: Send {
    /// Name the stage was invoked by, for diagnostics.
    fn name(&self) -> &str;

    /// Rebinds stdout or stderr to `file`. Must be called before [`start`](Self::start).
    fn redirect(&mut self, fd: TargetFd, file: File);

    fn start(&mut self) -> ShellResult<()>;

    fn stdin(&mut self) -> Option<Sink>;

    fn stdout(&mut self) -> Option<Source>;

    fn stderr(&mut self) -> Option<Source>;

    /// Blocks until the stage finishes. Any stdin handle still held by the
    /// process itself is closed first.
    fn wait(&mut self) -> ShellResult<ExitCode>;
}

/// Factory that tries to create a stage from its argument vector.
///
/// Returns `None` when the factory doesn't recognize `argv[0]`.
pub trait ProcessFactory {
    fn try_create(&self, session: &Session, argv: &[String]) -> Option<Box<dyn Process>>;
}
