use crate::command::{ExitCode, Process, ProcessFactory};
use crate::error::{ShellError, ShellResult};
use crate::interpreter::Factory;
use crate::io_adapters::{Sink, Source};
use crate::lexer::TargetFd;
use crate::session::Session;
use std::ffi::OsStr;
use std::fs::File;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};

/// A program found on disk, run as a child process.
pub struct ExternalProcess {
    name: String,
    args: Vec<String>,
    session: Session,
    stdout_file: Option<File>,
    stderr_file: Option<File>,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

impl ExternalProcess {
    pub fn new(session: Session, argv: &[String]) -> Self {
        let (name, args) = match argv.split_first() {
            Some((name, args)) => (name.clone(), args.to_vec()),
            None => (String::new(), Vec::new()),
        };
        Self {
            name,
            args,
            session,
            stdout_file: None,
            stderr_file: None,
            child: None,
            stdin: None,
            stdout: None,
            stderr: None,
        }
    }

    fn spawn_error(&self) -> ShellError {
        ShellError::Spawn {
            name: self.name.clone(),
        }
    }
}

impl ProcessFactory for Factory<ExternalProcess> {
    fn try_create(&self, session: &Session, argv: &[String]) -> Option<Box<dyn Process>> {
        Some(Box::new(ExternalProcess::new(session.clone(), argv)))
    }
}

fn output_stdio(file: Option<File>) -> Stdio {
    match file {
        Some(file) => Stdio::from(file),
        None => Stdio::piped(),
    }
}

impl Process for ExternalProcess {
    fn name(&self) -> &str {
        &self.name
    }

    fn redirect(&mut self, fd: TargetFd, file: File) {
        match fd {
            TargetFd::Stdout => self.stdout_file = Some(file),
            TargetFd::Stderr => self.stderr_file = Some(file),
        }
    }

    fn start(&mut self) -> ShellResult<()> {
        let (vars, cwd) = {
            let state = self.session.lock();
            (state.vars.clone(), state.cwd.clone())
        };
        let search_paths = vars.get("PATH").map(String::as_str).unwrap_or_default();

        let program = find_command_path(OsStr::new(search_paths), &cwd, Path::new(&self.name))
            .ok_or_else(|| self.spawn_error())?;

        let mut child = Command::new(&program)
            .arg0(&self.name)
            .args(&self.args)
            .envs(&vars)
            .current_dir(&cwd)
            .stdin(Stdio::piped())
            .stdout(output_stdio(self.stdout_file.take()))
            .stderr(output_stdio(self.stderr_file.take()))
            .spawn()
            .map_err(|err| {
                log::warn!("failed to spawn {}: {err}", program.display());
                self.spawn_error()
            })?;

        log::debug!("spawned {} as pid {}", program.display(), child.id());
        self.stdin = child.stdin.take();
        self.stdout = child.stdout.take();
        self.stderr = child.stderr.take();
        self.child = Some(child);
        Ok(())
    }

    fn stdin(&mut self) -> Option<Sink> {
        self.stdin.take().map(|s| Box::new(s) as Sink)
    }

    fn stdout(&mut self) -> Option<Source> {
        self.stdout.take().map(|s| Box::new(s) as Source)
    }

    fn stderr(&mut self) -> Option<Source> {
        self.stderr.take().map(|s| Box::new(s) as Source)
    }

    fn wait(&mut self) -> ShellResult<ExitCode> {
        drop(self.stdin.take());
        let child = self.child.as_mut().ok_or_else(|| ShellError::Spawn {
            name: self.name.clone(),
        })?;
        let exit_status = child.wait()?;
        let code = exit_status
            .code()
            .unwrap_or_else(|| terminated_by_signal(exit_status));
        log::debug!("{} exited with {code}", self.name);
        Ok(code)
    }
}

fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = exit_status.signal() {
        128 + signal
    } else if exit_status.core_dumped() {
        255
    } else {
        -1
    }
}

/// Whether `path` is a regular file with an execute bit set.
pub fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it is executable.
/// - Relative with multiple components (e.g., `bin/sh`) or `./`-prefixed:
///   resolved against `cwd`.
/// - Single path component: search each directory in `search_paths` (PATH)
///   and return the first executable match. Relative PATH entries are taken
///   relative to `cwd`.
/// - Empty path: returns `None`.
pub fn find_command_path(search_paths: &OsStr, cwd: &Path, path: &Path) -> Option<PathBuf> {
    if path.is_absolute() {
        return find_by_path(path.to_path_buf());
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        (None, _) => None,
        (Some(x), None) if !path.starts_with("./") => {
            find_in_path(search_paths, cwd, x.as_os_str())
        }
        _ => find_by_path(cwd.join(path)),
    }
}

fn find_in_path(search_paths: &OsStr, cwd: &Path, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths).find_map(|dir| find_by_path(cwd.join(dir).join(cmd)))
}

fn find_by_path(path: PathBuf) -> Option<PathBuf> {
    if is_executable(&path) { Some(path) } else { None }
}
