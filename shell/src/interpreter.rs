use crate::command::{ExitCode, NOT_FOUND_EXIT, Process, ProcessFactory};
use crate::error::{ShellError, ShellResult};
use crate::io_adapters::{SharedWriter, Sink, Source};
use crate::lexer::{self, RedirectMode};
use crate::parser::{self, Command, Pipeline, RedirectionSpec};
use crate::session::Session;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::thread::{self, JoinHandle};

/// Factory allows creating instances of [`Process`].
///
/// Only supports stages defined in this crate: builtins and external programs.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// Runs command lines as pipelines of concurrently executing stages.
///
/// The interpreter owns the [`Session`] shared with every builtin and a list
/// of [`ProcessFactory`] objects that are queried, in order, to create a stage
/// for each command. The shell's own stdout and stderr are injectable, which
/// is how tests capture output.
///
/// Example
/// ```no_run
/// use pipeshell::Interpreter;
/// let sh = Interpreter::default();
/// let code = sh.run_line("echo hello | tr a-z A-Z").unwrap();
/// assert_eq!(code, 0);
/// ```
pub struct Interpreter {
    session: Session,
    factories: Vec<Box<dyn ProcessFactory>>,
    stdout: SharedWriter,
    stderr: SharedWriter,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of stage factories.
    pub fn new(session: Session, factories: Vec<Box<dyn ProcessFactory>>) -> Self {
        Self {
            session,
            factories,
            stdout: SharedWriter::stdout(),
            stderr: SharedWriter::stderr(),
        }
    }

    /// Replaces the writers the last stage's output and every stage's
    /// diagnostics end up in.
    pub fn with_output(mut self, stdout: SharedWriter, stderr: SharedWriter) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    /// Builtins first, then the external launcher, which accepts any name.
    pub fn default_factories() -> Vec<Box<dyn ProcessFactory>> {
        use crate::builtin::*;
        use crate::external::ExternalProcess;
        vec![
            Box::new(Factory::<Cd>::default()),
            Box::new(Factory::<Echo>::default()),
            Box::new(Factory::<Exit>::default()),
            Box::new(Factory::<History>::default()),
            Box::new(Factory::<Pwd>::default()),
            Box::new(Factory::<Type>::default()),
            Box::new(Factory::<ExternalProcess>::default()),
        ]
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Tokenizes, plans and executes one line.
    pub fn run_line(&self, line: &str) -> ShellResult<ExitCode> {
        let pipeline = parser::plan(lexer::tokenize(line))?;
        self.execute(&pipeline)
    }

    /// Prints an error the way the shell reports every per-command failure.
    pub fn report(&self, err: &ShellError) {
        let mut stderr = self.stderr.clone();
        let _ = writeln!(stderr, "{err}");
        let _ = stderr.flush();
    }

    fn create(&self, command: &Command) -> ShellResult<Box<dyn Process>> {
        self.factories
            .iter()
            .find_map(|factory| factory.try_create(&self.session, command.argv()))
            .ok_or_else(|| ShellError::Spawn {
                name: command.name().to_string(),
            })
    }

    /// Runs every stage of `pipeline` concurrently and returns the exit code
    /// of the last one.
    ///
    /// A redirection that cannot be opened fails the whole pipeline before
    /// anything starts. A stage that cannot be started is reported and counts
    /// as exited with 127; the other stages still run.
    pub fn execute(&self, pipeline: &Pipeline) -> ShellResult<ExitCode> {
        let commands = pipeline.commands();
        if commands.is_empty() {
            return Err(ShellError::EmptyPipeline);
        }

        let mut stages = commands
            .iter()
            .map(|command| self.create(command))
            .collect::<ShellResult<Vec<_>>>()?;

        let cwd = self.session.lock().cwd.clone();
        for (stage, command) in stages.iter_mut().zip(commands) {
            for spec in command.redirections() {
                stage.redirect(spec.target_fd, open_redirect(&cwd, spec)?);
            }
        }

        let started: Vec<bool> = stages
            .iter_mut()
            .map(|stage| match stage.start() {
                Ok(()) => true,
                Err(err) => {
                    self.report(&err);
                    false
                }
            })
            .collect();

        // Nothing is forwarded from the terminal.
        drop(stages[0].stdin());

        let mut pumps = Vec::new();
        for i in 0..stages.len() {
            if let Some(src) = stages[i].stderr() {
                let label = format!("{} stderr", stages[i].name());
                pumps.push(pump(label, src, Box::new(self.stderr.clone())));
            }

            let src = stages[i].stdout();
            let label = format!("{} stdout", stages[i].name());
            if let Some(next) = stages.get_mut(i + 1) {
                match (src, next.stdin()) {
                    (Some(src), Some(dst)) => pumps.push(pump(label, src, dst)),
                    (Some(src), None) => pumps.push(pump(label, src, Box::new(io::sink()))),
                    (None, dst) => drop(dst),
                }
            } else if let Some(src) = src {
                pumps.push(pump(label, src, Box::new(self.stdout.clone())));
            }
        }

        let mut last = 0;
        for (stage, started) in stages.iter_mut().zip(started) {
            last = if started {
                stage.wait().unwrap_or_else(|err| {
                    self.report(&err);
                    1
                })
            } else {
                NOT_FOUND_EXIT
            };
        }

        for handle in pumps {
            if handle.join().is_err() {
                log::warn!("pump thread panicked");
            }
        }

        let _ = self.stdout.clone().flush();
        let _ = self.stderr.clone().flush();
        Ok(last)
    }
}

impl Default for Interpreter {
    /// Create an interpreter over the current process state with the default
    /// factories, writing to the real stdout and stderr.
    fn default() -> Self {
        Self::new(Session::default(), Self::default_factories())
    }
}

fn open_redirect(cwd: &Path, spec: &RedirectionSpec) -> ShellResult<File> {
    let path = cwd.join(&spec.path);
    let redirect_error = |source: io::Error| ShellError::Redirect {
        path: spec.path.clone(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(redirect_error)?;
    }

    let mut options = OpenOptions::new();
    options.create(true);
    match spec.mode {
        RedirectMode::Truncate => options.write(true).truncate(true),
        RedirectMode::Append => options.append(true),
    };
    options.open(&path).map_err(redirect_error)
}

/// Copies `src` into `dst` on a thread of its own, closing both at the end.
fn pump(label: String, mut src: Source, mut dst: Sink) -> JoinHandle<()> {
    thread::spawn(move || {
        let copied = io::copy(&mut src, &mut dst).and_then(|n| dst.flush().map(|()| n));
        match copied {
            Ok(n) => log::debug!("{label}: pumped {n} bytes"),
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                log::debug!("{label}: reader closed early")
            }
            Err(err) => log::warn!("{label}: {err}"),
        }
    })
}
