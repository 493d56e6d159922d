use crate::command::{ExitCode, Process, ProcessFactory};
use crate::error::{ShellError, ShellResult};
use crate::external::find_command_path;
use crate::interpreter::Factory;
use crate::io_adapters::{Sink, Source};
use crate::lexer::TargetFd;
use crate::session::{Session, normalize_lexically};
use anyhow::{Context, Result, anyhow, bail};
use argh::{EarlyExit, FromArgs};
use nix::unistd::{Uid, User};
use os_pipe::{PipeReader, PipeWriter};
use std::any::Any;
use std::ffi::OsStr;
use std::fs::File;
use std::io::{self, Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::thread::{self, JoinHandle};

/// Names dispatched to builtins instead of programs on disk.
pub const BUILTIN_NAMES: [&str; 6] = ["cd", "echo", "exit", "history", "pwd", "type"];

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed on a
/// thread of their own, wired to the rest of the pipeline through OS pipes.
pub(crate) trait BuiltinCommand: Sized + FromArgs + Send + 'static {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Executes the command using provided IO streams and the shared session.
    ///
    /// An `Err` is printed to the builtin's stderr and the exit code becomes 1.
    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        session: &Session,
    ) -> Result<ExitCode>;
}

type Body = Box<dyn FnOnce(&mut dyn Read, &mut dyn Write, &mut dyn Write) -> Result<ExitCode> + Send>;

/// A builtin running as a pipeline stage.
pub struct BuiltinProcess {
    name: String,
    body: Option<Body>,
    stdout_file: Option<File>,
    stderr_file: Option<File>,
    stdin: Option<PipeWriter>,
    stdout: Option<PipeReader>,
    stderr: Option<PipeReader>,
    worker: Option<JoinHandle<ExitCode>>,
}

impl BuiltinProcess {
    pub(crate) fn from_body<F>(name: &str, body: F) -> Self
    where
        F: FnOnce(&mut dyn Read, &mut dyn Write, &mut dyn Write) -> Result<ExitCode> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            body: Some(Box::new(body)),
            stdout_file: None,
            stderr_file: None,
            stdin: None,
            stdout: None,
            stderr: None,
            worker: None,
        }
    }

    fn not_started(&self) -> ShellError {
        ShellError::Builtin(format!("{}: not started", self.name))
    }
}

/// Returns the sink the builtin writes to, keeping the read end when it is a pipe.
fn output_sink(file: Option<File>, reader: &mut Option<PipeReader>) -> io::Result<Sink> {
    match file {
        Some(file) => Ok(Box::new(file)),
        None => {
            let (r, w) = os_pipe::pipe()?;
            *reader = Some(r);
            Ok(Box::new(w))
        }
    }
}

impl Process for BuiltinProcess {
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
        let body = self
            .body
            .take()
            .ok_or_else(|| ShellError::Builtin(format!("{}: already started", self.name)))?;

        let (stdin_reader, stdin_writer) = os_pipe::pipe()?;
        let stdout = output_sink(self.stdout_file.take(), &mut self.stdout)?;
        let stderr = output_sink(self.stderr_file.take(), &mut self.stderr)?;
        self.stdin = Some(stdin_writer);

        silence_worker_panics();
        let worker = thread::Builder::new()
            .name(format!("{WORKER_PREFIX}{}", self.name))
            .spawn(move || run_body(body, stdin_reader, stdout, stderr))?;
        log::debug!("started builtin {}", self.name);
        self.worker = Some(worker);
        Ok(())
    }

    fn stdin(&mut self) -> Option<Sink> {
        self.stdin.take().map(|w| Box::new(w) as Sink)
    }

    fn stdout(&mut self) -> Option<Source> {
        self.stdout.take().map(|r| Box::new(r) as Source)
    }

    fn stderr(&mut self) -> Option<Source> {
        self.stderr.take().map(|r| Box::new(r) as Source)
    }

    fn wait(&mut self) -> ShellResult<ExitCode> {
        drop(self.stdin.take());
        let worker = self.worker.take().ok_or_else(|| self.not_started())?;
        // run_body catches panics from the body, so join only fails if the
        // error reporting itself panicked.
        let code = worker.join().unwrap_or(1);
        log::debug!("builtin {} exited with {code}", self.name);
        Ok(code)
    }
}

const WORKER_PREFIX: &str = "builtin-";

fn is_builtin_worker(thread_name: Option<&str>) -> bool {
    thread_name.is_some_and(|name| name.starts_with(WORKER_PREFIX))
}

/// Stops the panic hook from printing on the terminal for builtin workers.
/// `run_body` reports those panics on the stage's own stderr.
fn silence_worker_panics() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if is_builtin_worker(thread::current().name()) {
                log::debug!("{info}");
            } else {
                previous(info);
            }
        }));
    });
}

fn run_body(body: Body, mut stdin: PipeReader, mut stdout: Sink, mut stderr: Sink) -> ExitCode {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        body(&mut stdin, &mut stdout, &mut stderr)
    }));
    let code = match outcome {
        Ok(Ok(code)) => code,
        Ok(Err(err)) if is_broken_pipe(&err) => 1,
        Ok(Err(err)) => {
            let _ = writeln!(stderr, "{err:#}");
            1
        }
        Err(payload) => {
            let _ = writeln!(stderr, "internal error: {}", panic_message(payload.as_ref()));
            1
        }
    };
    let _ = stdout.flush();
    let _ = stderr.flush();
    code
}

fn is_broken_pipe(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<io::Error>()
            .is_some_and(|e| e.kind() == io::ErrorKind::BrokenPipe)
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

impl<T: BuiltinCommand> ProcessFactory for Factory<T> {
    fn try_create(&self, session: &Session, argv: &[String]) -> Option<Box<dyn Process>> {
        let (name, args) = argv.split_first()?;
        if name != T::name() {
            return None;
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let process = match T::from_args(&[name.as_str()], &args) {
            Ok(cmd) => {
                let session = session.clone();
                BuiltinProcess::from_body(name, move |stdin, stdout, stderr| {
                    cmd.execute(stdin, stdout, stderr, &session)
                })
            }
            Err(EarlyExit { output, status }) => {
                BuiltinProcess::from_body(name, move |_stdin, stdout, stderr| {
                    if status.is_err() {
                        stderr.write_all(output.as_bytes())?;
                        Ok(1)
                    } else {
                        stdout.write_all(output.as_bytes())?;
                        Ok(0)
                    }
                })
            }
        };
        Some(Box::new(process))
    }
}

/// Write the arguments to standard output, separated by single spaces.
///
/// Every argument is printed as-is, dashes included, so parsing is done by hand.
pub struct Echo {
    pub args: Vec<String>,
}

impl FromArgs for Echo {
    fn from_args(_command_name: &[&str], args: &[&str]) -> Result<Self, EarlyExit> {
        Ok(Echo {
            args: args.iter().map(|a| a.to_string()).collect(),
        })
    }
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        _session: &Session,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", self.args.join(" "))?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        session: &Session,
    ) -> Result<ExitCode> {
        let cwd = session.lock().cwd.clone();
        writeln!(stdout, "{}", cwd.display())?;
        Ok(0)
    }
}

/// Change the current working directory.
/// If no target is provided, changes to `$HOME`, or the account home directory when it is unset.
///
/// Parsed by hand so that extra operands are reported the way shells usually do.
pub struct Cd {
    pub args: Vec<String>,
}

impl FromArgs for Cd {
    fn from_args(_command_name: &[&str], args: &[&str]) -> Result<Self, EarlyExit> {
        Ok(Cd {
            args: args.iter().map(|a| a.to_string()).collect(),
        })
    }
}

fn expand_tilde(arg: &str, home: Option<&Path>) -> Option<PathBuf> {
    let home = home?;
    if arg == "~" {
        Some(home.to_path_buf())
    } else {
        arg.strip_prefix("~/").map(|rest| home.join(rest))
    }
}

/// Home directory from the user database, for when `$HOME` is unset.
fn account_home() -> Option<PathBuf> {
    match User::from_uid(Uid::current()) {
        Ok(user) => user.map(|user| user.dir),
        Err(err) => {
            log::debug!("user database lookup failed: {err}");
            None
        }
    }
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        session: &Session,
    ) -> Result<ExitCode> {
        let mut state = session.lock();
        let home = state.home().or_else(account_home);

        let (shown, target) = match self.args.as_slice() {
            [] => {
                let home = home.ok_or_else(|| anyhow!("cd: HOME not set"))?;
                (home.display().to_string(), home)
            }
            [arg] => match expand_tilde(arg, home.as_deref()) {
                Some(path) => (arg.clone(), path),
                None => (arg.clone(), PathBuf::from(arg)),
            },
            _ => bail!("cd: too many arguments"),
        };

        let new_dir = normalize_lexically(&state.cwd, &target.to_string_lossy());
        if !new_dir.is_dir() {
            bail!("cd: {shown}: No such file or directory");
        }
        log::debug!("cd {} -> {}", state.cwd.display(), new_dir.display());
        state.cwd = new_dir;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Describe how each name would be interpreted as a command.
pub struct Type {
    #[argh(positional, greedy)]
    /// command names to look up.
    pub names: Vec<String>,
}

impl BuiltinCommand for Type {
    fn name() -> &'static str {
        "type"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        session: &Session,
    ) -> Result<ExitCode> {
        let (search_paths, cwd) = {
            let state = session.lock();
            (state.get_var("PATH").unwrap_or_default().to_string(), state.cwd.clone())
        };

        let mut code = 0;
        for name in &self.names {
            if is_builtin(name) {
                writeln!(stdout, "{name} is a shell builtin")?;
                continue;
            }
            match find_command_path(OsStr::new(&search_paths), &cwd, Path::new(name)) {
                Some(path) => writeln!(stdout, "{name} is {}", path.display())?,
                None => {
                    writeln!(stdout, "{name} not found")?;
                    code = 1;
                }
            }
        }
        Ok(code)
    }
}

#[derive(FromArgs)]
/// Exit the shell.
pub struct Exit {
    #[argh(positional)]
    /// exit status, 0 when omitted.
    pub code: Option<i32>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        session: &Session,
    ) -> Result<ExitCode> {
        let code = self.code.unwrap_or(0);
        session.lock().request_exit(code);
        Ok(code)
    }
}

#[derive(FromArgs)]
/// Display or manipulate the history list.
pub struct History {
    #[argh(option, short = 'r')]
    /// append the lines of a file to the history list.
    pub read: Option<String>,

    #[argh(option, short = 'w')]
    /// overwrite a file with the history list.
    pub write: Option<String>,

    #[argh(option, short = 'a')]
    /// append entries added since the last append to a file.
    pub append: Option<String>,

    #[argh(positional)]
    /// show only the last N entries.
    pub count: Option<String>,
}

impl BuiltinCommand for History {
    fn name() -> &'static str {
        "history"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _stderr: &mut dyn Write,
        session: &Session,
    ) -> Result<ExitCode> {
        if let Some(file) = &self.read {
            let mut state = session.lock();
            let path = state.resolve_path(file);
            state
                .read_history_file(&path)
                .with_context(|| format!("history: {file}"))?;
            return Ok(0);
        }
        if let Some(file) = &self.write {
            let mut state = session.lock();
            let path = state.resolve_path(file);
            state
                .write_history_file(&path)
                .with_context(|| format!("history: {file}"))?;
            return Ok(0);
        }
        if let Some(file) = &self.append {
            let mut state = session.lock();
            let path = state.resolve_path(file);
            state
                .append_history_file(&path)
                .with_context(|| format!("history: {file}"))?;
            return Ok(0);
        }

        let limit = match &self.count {
            Some(arg) => Some(
                arg.parse::<usize>()
                    .map_err(|_| anyhow!("history: {arg}: numeric argument required"))?,
            ),
            None => None,
        };

        // Format under the lock, write after releasing it.
        let listing = {
            let state = session.lock();
            let entries = state.history();
            let skip = limit.map_or(0, |n| entries.len().saturating_sub(n));
            entries
                .iter()
                .enumerate()
                .skip(skip)
                .map(|(i, entry)| format!("{:>5}  {}\n", i + 1, entry))
                .collect::<String>()
        };
        stdout.write_all(listing.as_bytes())?;
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use std::collections::HashMap;
    use std::fs;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn session_in(cwd: &Path) -> Session {
        let mut vars = HashMap::new();
        vars.insert("PATH".to_string(), "/bin:/usr/bin".to_string());
        Session::new(SessionState::from_parts(cwd.to_path_buf(), vars))
    }

    fn argv(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    /// Runs a builtin directly, returning (stdout, result).
    fn exec<T: BuiltinCommand>(cmd: T, session: &Session) -> (String, Result<ExitCode>) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let res = cmd.execute(&mut Cursor::new(Vec::new()), &mut out, &mut err, session);
        (String::from_utf8(out).unwrap(), res)
    }

    /// Runs a stage to completion, returning (stdout, stderr, code).
    fn run_process(mut process: Box<dyn Process>) -> (String, String, ExitCode) {
        process.start().unwrap();
        drop(process.stdin());
        let mut stdout = process.stdout().unwrap();
        let mut stderr = process.stderr().unwrap();
        let err_reader = thread::spawn(move || {
            let mut s = String::new();
            stderr.read_to_string(&mut s).unwrap();
            s
        });
        let mut out = String::new();
        stdout.read_to_string(&mut out).unwrap();
        let err = err_reader.join().unwrap();
        let code = process.wait().unwrap();
        (out, err, code)
    }

    fn create(session: &Session, words: &[&str]) -> Box<dyn Process> {
        let factories: Vec<Box<dyn ProcessFactory>> = vec![
            Box::new(Factory::<Echo>::default()),
            Box::new(Factory::<Pwd>::default()),
            Box::new(Factory::<Cd>::default()),
            Box::new(Factory::<Type>::default()),
            Box::new(Factory::<Exit>::default()),
            Box::new(Factory::<History>::default()),
        ];
        let argv = argv(words);
        factories
            .iter()
            .find_map(|f| f.try_create(session, &argv))
            .expect("builtin")
    }

    #[test]
    fn test_echo_joins_arguments() {
        let session = session_in(Path::new("/"));
        let (out, res) = exec(
            Echo {
                args: argv(&["hello", "-n", "world"]),
            },
            &session,
        );
        assert_eq!(res.unwrap(), 0);
        assert_eq!(out, "hello -n world\n");
    }

    #[test]
    fn test_pwd_prints_session_dir() {
        let session = session_in(Path::new("/usr"));
        let (out, res) = exec(Pwd {}, &session);
        assert_eq!(res.unwrap(), 0);
        assert_eq!(out, "/usr\n");
    }

    #[test]
    fn test_cd_dot_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let session = session_in(dir.path());
        let (_, res) = exec(Cd { args: argv(&["."]) }, &session);
        assert_eq!(res.unwrap(), 0);
        assert_eq!(session.lock().cwd, dir.path());
    }

    #[test]
    fn test_cd_relative_and_parent() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a").join("b")).unwrap();
        let session = session_in(dir.path());

        exec(Cd { args: argv(&["a/b"]) }, &session).1.unwrap();
        assert_eq!(session.lock().cwd, dir.path().join("a").join("b"));

        exec(Cd { args: argv(&["../.."]) }, &session).1.unwrap();
        assert_eq!(session.lock().cwd, dir.path());
    }

    #[test]
    fn test_cd_lexical_equivalence() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("x").join("y")).unwrap();
        let session = session_in(dir.path());

        exec(Cd { args: argv(&["x/./y/../y"]) }, &session).1.unwrap();
        let first = session.lock().cwd.clone();

        session.lock().cwd = dir.path().to_path_buf();
        exec(Cd { args: argv(&["x/y"]) }, &session).1.unwrap();
        assert_eq!(session.lock().cwd, first);
    }

    #[test]
    fn test_cd_home_and_tilde() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        let session = session_in(Path::new("/"));
        session
            .lock()
            .set_var("HOME", dir.path().to_string_lossy().to_string());

        exec(Cd { args: Vec::new() }, &session).1.unwrap();
        assert_eq!(session.lock().cwd, dir.path());

        session.lock().cwd = PathBuf::from("/");
        exec(Cd { args: argv(&["~/sub"]) }, &session).1.unwrap();
        assert_eq!(session.lock().cwd, dir.path().join("sub"));
    }

    #[test]
    fn test_cd_without_home_var_uses_account_home() {
        let dir = TempDir::new().unwrap();
        let session = session_in(dir.path());
        let res = exec(Cd { args: Vec::new() }, &session).1;
        match account_home() {
            Some(home) if home.is_dir() => {
                assert_eq!(res.unwrap(), 0);
                assert_eq!(session.lock().cwd, normalize_lexically(dir.path(), &home.to_string_lossy()));
            }
            Some(_) => assert!(res.is_err()),
            None => assert_eq!(res.unwrap_err().to_string(), "cd: HOME not set"),
        }
    }

    #[test]
    fn test_cd_errors() {
        let dir = TempDir::new().unwrap();
        let session = session_in(dir.path());

        let err = exec(Cd { args: argv(&["a", "b"]) }, &session).1.unwrap_err();
        assert_eq!(err.to_string(), "cd: too many arguments");

        let err = exec(Cd { args: argv(&["missing"]) }, &session).1.unwrap_err();
        assert_eq!(err.to_string(), "cd: missing: No such file or directory");
        assert_eq!(session.lock().cwd, dir.path());
    }

    #[test]
    fn test_type_reports_each_name() {
        let session = session_in(Path::new("/"));
        let (out, res) = exec(
            Type {
                names: argv(&["cd", "sh", "doesnotexist123"]),
            },
            &session,
        );
        assert_eq!(res.unwrap(), 1);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "cd is a shell builtin");
        assert!(lines[1].starts_with("sh is /"), "got {}", lines[1]);
        assert_eq!(lines[2], "doesnotexist123 not found");
    }

    #[test]
    fn test_type_without_names_succeeds() {
        let session = session_in(Path::new("/"));
        let (out, res) = exec(Type { names: Vec::new() }, &session);
        assert_eq!(res.unwrap(), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_exit_flags_session() {
        let session = session_in(Path::new("/"));
        exec(Exit { code: Some(4) }, &session).1.unwrap();
        assert_eq!(session.lock().exit_requested(), Some(4));
    }

    fn history_with(entries: &[&str]) -> Session {
        let session = session_in(Path::new("/"));
        for entry in entries {
            session.lock().record(*entry);
        }
        session
    }

    fn list(count: Option<&str>) -> History {
        History {
            read: None,
            write: None,
            append: None,
            count: count.map(str::to_string),
        }
    }

    #[test]
    fn test_history_lists_all_entries() {
        let session = history_with(&["echo a", "pwd"]);
        let (out, res) = exec(list(None), &session);
        assert_eq!(res.unwrap(), 0);
        assert_eq!(out, "    1  echo a\n    2  pwd\n");
    }

    #[test]
    fn test_history_last_n_keeps_absolute_indices() {
        let session = history_with(&["one", "two", "three", "history 2"]);
        let (out, _) = exec(list(Some("2")), &session);
        assert_eq!(out, "    3  three\n    4  history 2\n");

        let (out, _) = exec(list(Some("10")), &session);
        assert_eq!(out.lines().count(), 4);
    }

    #[test]
    fn test_history_rejects_non_numeric() {
        let session = history_with(&["one"]);
        let err = exec(list(Some("abc")), &session).1.unwrap_err();
        assert_eq!(err.to_string(), "history: abc: numeric argument required");
    }

    #[test]
    fn test_history_file_options_resolve_against_cwd() {
        let dir = TempDir::new().unwrap();
        let session = session_in(dir.path());
        session.lock().record("echo one");

        let mut write = list(None);
        write.write = Some("saved".to_string());
        exec(write, &session).1.unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("saved")).unwrap(), "echo one\n");

        session.lock().record("echo two");
        let mut append = list(None);
        append.append = Some("saved".to_string());
        exec(append, &session).1.unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("saved")).unwrap(),
            "echo one\necho two\n"
        );

        let mut read = list(None);
        read.read = Some("saved".to_string());
        exec(read, &session).1.unwrap();
        assert_eq!(session.lock().history().len(), 4);
    }

    #[test]
    fn test_factory_matches_by_name() {
        let session = session_in(Path::new("/"));
        let factory = Factory::<Echo>::default();
        assert!(factory.try_create(&session, &argv(&["echo", "x"])).is_some());
        assert!(factory.try_create(&session, &argv(&["pwd"])).is_none());
        assert!(factory.try_create(&session, &[]).is_none());
    }

    #[test]
    fn test_process_streams_output() {
        let session = session_in(Path::new("/"));
        let (out, err, code) = run_process(create(&session, &["echo", "via", "pipe"]));
        assert_eq!(out, "via pipe\n");
        assert_eq!(err, "");
        assert_eq!(code, 0);
    }

    #[test]
    fn test_process_reports_errors_on_stderr() {
        let session = session_in(Path::new("/"));
        let (out, err, code) = run_process(create(&session, &["cd", "/no/such/dir"]));
        assert_eq!(out, "");
        assert_eq!(err, "cd: /no/such/dir: No such file or directory\n");
        assert_eq!(code, 1);
    }

    #[test]
    fn test_invalid_arguments_exit_one() {
        let session = session_in(Path::new("/"));
        let (out, err, code) = run_process(create(&session, &["exit", "abc"]));
        assert_eq!(out, "");
        assert!(!err.is_empty());
        assert_eq!(code, 1);
    }

    #[test]
    fn test_help_goes_to_stdout() {
        let session = session_in(Path::new("/"));
        let (out, _, code) = run_process(create(&session, &["type", "--help"]));
        assert!(out.contains("Usage: type"), "got {out}");
        assert_eq!(code, 0);
    }

    #[test]
    fn test_panic_is_reported() {
        let process = BuiltinProcess::from_body("boom", |_, _, _| panic!("kaboom"));
        let (_, err, code) = run_process(Box::new(process));
        assert_eq!(err, "internal error: kaboom\n");
        assert_eq!(code, 1);
    }

    #[test]
    fn test_only_builtin_workers_are_silenced() {
        assert!(is_builtin_worker(Some("builtin-echo")));
        assert!(!is_builtin_worker(Some("main")));
        assert!(!is_builtin_worker(None));
    }

    #[test]
    fn test_broken_pipe_is_quiet() {
        let mut process = BuiltinProcess::from_body("yes", |_, stdout, _| loop {
            stdout.write_all(&[b'y'; 4096])?;
        });
        process.start().unwrap();
        drop(process.stdout());
        let mut stderr = process.stderr().unwrap();
        let mut err = String::new();
        stderr.read_to_string(&mut err).unwrap();
        assert_eq!(process.wait().unwrap(), 1);
        assert_eq!(err, "");
    }

    #[test]
    fn test_stdout_redirected_to_file() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.txt");
        let session = session_in(dir.path());
        let mut process = create(&session, &["echo", "to", "file"]);
        process.redirect(TargetFd::Stdout, File::create(&target).unwrap());
        process.start().unwrap();
        assert!(process.stdout().is_none());
        assert_eq!(process.wait().unwrap(), 0);
        assert_eq!(fs::read_to_string(target).unwrap(), "to file\n");
    }
}
