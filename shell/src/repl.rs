use crate::builtin::BUILTIN_NAMES;
use crate::command::ExitCode;
use crate::completion::ExecutableIndex;
use crate::config::{PROMPT, ShellConfig};
use crate::editor::{LineEditor, ReadOutcome};
use crate::interpreter::Interpreter;
use crate::terminal::RawModeGuard;
use anyhow::{Context, Result};
use std::ffi::OsString;
use std::io::{self, Read, Write};

/// The interactive read-eval-print loop.
pub struct Repl {
    interpreter: Interpreter,
    editor: LineEditor,
    config: ShellConfig,
}

impl Repl {
    pub fn new(config: ShellConfig) -> Self {
        Self::with_interpreter(config, Interpreter::default())
    }

    /// Loads `HISTFILE` into the interpreter's session, if configured.
    pub fn with_interpreter(config: ShellConfig, interpreter: Interpreter) -> Self {
        if let Some(path) = &config.histfile {
            if let Err(err) = interpreter.session().lock().load_startup_history(path) {
                log::warn!("could not load history from {}: {err}", path.display());
            }
        }
        Self {
            interpreter,
            editor: LineEditor::new(PROMPT),
            config,
        }
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Runs on the process's terminal until `exit` or end of input.
    pub fn run(&mut self) -> Result<ExitCode> {
        self.run_loop(&mut io::stdin(), &mut io::stdout(), true)
    }

    /// Runs over arbitrary streams with the terminal left untouched.
    pub fn run_with<R: Read, W: Write>(&mut self, input: &mut R, output: &mut W) -> Result<ExitCode> {
        self.run_loop(input, output, false)
    }

    fn run_loop<R: Read, W: Write>(
        &mut self,
        input: &mut R,
        output: &mut W,
        raw_mode: bool,
    ) -> Result<ExitCode> {
        loop {
            // Rebuilt every prompt: PATH or the directories on it may have changed.
            let index = self.build_index();
            let outcome = {
                let _guard = if raw_mode {
                    RawModeGuard::enable().context("switching the terminal to raw mode")?
                } else {
                    None
                };
                self.editor
                    .read_line(input, output, &index, self.interpreter.session())
                    .context("reading input")?
            };

            let line = match outcome {
                ReadOutcome::Line(line) => line,
                ReadOutcome::Interrupted => continue,
                ReadOutcome::Eof => {
                    self.shutdown();
                    return Ok(0);
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            self.interpreter.session().lock().record(line.as_str());
            match self.interpreter.run_line(&line) {
                Ok(code) => log::debug!("`{line}` exited with {code}"),
                Err(err) => self.interpreter.report(&err),
            }

            let exit = self.interpreter.session().lock().exit_requested();
            if let Some(code) = exit {
                self.shutdown();
                return Ok(code);
            }
        }
    }

    fn build_index(&self) -> ExecutableIndex {
        let search_paths = self
            .interpreter
            .session()
            .lock()
            .get_var("PATH")
            .map(OsString::from)
            .unwrap_or_default();
        ExecutableIndex::from_search_path(&search_paths, BUILTIN_NAMES)
    }

    fn shutdown(&self) {
        let Some(path) = &self.config.histfile else {
            return;
        };
        if let Err(err) = self.interpreter.session().lock().write_history_file(path) {
            log::warn!("could not save history to {}: {err}", path.display());
        }
    }
}
