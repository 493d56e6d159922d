use std::collections::HashMap;
use std::env as stdenv;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Everything the shell remembers between command lines.
///
/// `vars` is the variable snapshot handed to every spawned program and
/// consulted for `PATH` and `HOME`. `cwd` is the shell's notion of the
/// working directory; the process working directory is never changed.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub vars: HashMap<String, String>,
    pub cwd: PathBuf,
    history: Vec<String>,
    history_cursor: Option<usize>,
    /// Per-file index of the first entry `history -a` has not written yet.
    appended: HashMap<PathBuf, usize>,
    /// Number of entries loaded at startup, the default `-a` offset.
    history_baseline: usize,
    exit_requested: Option<i32>,
}

impl SessionState {
    /// Capture the current process state.
    pub fn new() -> Self {
        let vars = stdenv::vars().collect();
        let cwd = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        Self::from_parts(cwd, vars)
    }

    pub fn from_parts(cwd: PathBuf, vars: HashMap<String, String>) -> Self {
        Self {
            vars,
            cwd,
            history: Vec::new(),
            history_cursor: None,
            appended: HashMap::new(),
            history_baseline: 0,
            exit_requested: None,
        }
    }

    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// `$HOME`, if set and non-empty.
    pub fn home(&self) -> Option<PathBuf> {
        self.get_var("HOME")
            .filter(|h| !h.is_empty())
            .map(PathBuf::from)
    }

    /// Resolves a user supplied path against the session working directory.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        self.cwd.join(path)
    }

    /// Appends a submitted line to history and resets the navigation cursor.
    pub fn record(&mut self, line: impl Into<String>) {
        self.history.push(line.into());
        self.history_cursor = None;
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Moves the cursor one entry back. Stays on the oldest entry once there.
    pub fn history_prev(&mut self) -> Option<&str> {
        if self.history.is_empty() {
            return None;
        }
        let idx = match self.history_cursor {
            None => self.history.len() - 1,
            Some(i) => i.saturating_sub(1),
        };
        self.history_cursor = Some(idx);
        self.history.get(idx).map(String::as_str)
    }

    /// Moves the cursor one entry forward. Returns `None` once past the newest
    /// entry, which also puts the cursor back at the end.
    pub fn history_next(&mut self) -> Option<&str> {
        let idx = self.history_cursor? + 1;
        if idx >= self.history.len() {
            self.history_cursor = None;
            return None;
        }
        self.history_cursor = Some(idx);
        self.history.get(idx).map(String::as_str)
    }

    /// True while Up/Down navigation is on a recalled entry.
    pub fn is_browsing_history(&self) -> bool {
        self.history_cursor.is_some()
    }

    pub fn history_reset_cursor(&mut self) {
        self.history_cursor = None;
    }

    /// Loads `HISTFILE` at startup. A missing file is not an error.
    pub fn load_startup_history(&mut self, path: &Path) -> io::Result<()> {
        match self.read_history_file(path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
        self.history_baseline = self.history.len();
        Ok(())
    }

    /// Appends every non-empty line of `path` to the in-memory history.
    pub fn read_history_file(&mut self, path: &Path) -> io::Result<()> {
        let contents = fs::read_to_string(path)?;
        let before = self.history.len();
        self.history.extend(
            contents
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string),
        );
        self.history_cursor = None;
        log::debug!(
            "read {} history entries from {}",
            self.history.len() - before,
            path.display()
        );
        Ok(())
    }

    /// Overwrites `path` with the full history.
    pub fn write_history_file(&mut self, path: &Path) -> io::Result<()> {
        let mut file = fs::File::create(path)?;
        write_entries(&mut file, &self.history)?;
        self.appended.insert(path.to_path_buf(), self.history.len());
        log::debug!("wrote {} history entries to {}", self.history.len(), path.display());
        Ok(())
    }

    /// Appends to `path` the entries recorded since the last append to it.
    pub fn append_history_file(&mut self, path: &Path) -> io::Result<()> {
        let start = self
            .appended
            .get(path)
            .copied()
            .unwrap_or(self.history_baseline)
            .min(self.history.len());
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        write_entries(&mut file, &self.history[start..])?;
        self.appended.insert(path.to_path_buf(), self.history.len());
        log::debug!(
            "appended {} history entries to {}",
            self.history.len() - start,
            path.display()
        );
        Ok(())
    }

    pub fn request_exit(&mut self, code: i32) {
        self.exit_requested = Some(code);
    }

    pub fn exit_requested(&self) -> Option<i32> {
        self.exit_requested
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

fn write_entries(file: &mut fs::File, entries: &[String]) -> io::Result<()> {
    let mut out = io::BufWriter::new(file);
    for entry in entries {
        writeln!(out, "{entry}")?;
    }
    out.flush()
}

/// Joins `target` onto `base` and folds `.` and `..` segments without
/// touching the filesystem. `..` at the root stays at the root.
pub fn normalize_lexically(base: &Path, target: &str) -> PathBuf {
    let mut out = PathBuf::new();
    for component in base.join(target).components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(segment) => out.push(segment),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(Component::RootDir.as_os_str());
    }
    out
}

/// Shared handle to the session, cloned into every builtin of a pipeline.
#[derive(Debug, Clone)]
pub struct Session(Arc<Mutex<SessionState>>);

impl Session {
    pub fn new(state: SessionState) -> Self {
        Session(Arc::new(Mutex::new(state)))
    }

    /// Locks the state. A builtin that panicked while holding the lock leaves
    /// the state usable.
    pub fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new(SessionState::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn empty_state() -> SessionState {
        SessionState::from_parts(PathBuf::from("/"), HashMap::new())
    }

    #[test]
    fn test_set_and_get_var() {
        let mut state = empty_state();
        assert_eq!(state.get_var("SOME_RANDOM_ENV_VAR_12345"), None);
        state.set_var("KEY", "VALUE");
        assert_eq!(state.get_var("KEY"), Some("VALUE"));
    }

    #[test]
    fn test_home_ignores_empty_value() {
        let mut state = empty_state();
        assert_eq!(state.home(), None);
        state.set_var("HOME", "");
        assert_eq!(state.home(), None);
        state.set_var("HOME", "/home/me");
        assert_eq!(state.home(), Some(PathBuf::from("/home/me")));
    }

    #[test]
    fn test_normalize_lexically() {
        let base = Path::new("/a/b");
        assert_eq!(normalize_lexically(base, "."), PathBuf::from("/a/b"));
        assert_eq!(normalize_lexically(base, ".."), PathBuf::from("/a"));
        assert_eq!(normalize_lexically(base, "../c/./d"), PathBuf::from("/a/c/d"));
        assert_eq!(normalize_lexically(base, "/x/../y"), PathBuf::from("/y"));
        assert_eq!(normalize_lexically(base, "../../../.."), PathBuf::from("/"));
    }

    #[test]
    fn test_history_navigation() {
        let mut state = empty_state();
        assert_eq!(state.history_prev(), None);

        state.record("one");
        state.record("two");
        state.record("three");

        assert_eq!(state.history_prev(), Some("three"));
        assert_eq!(state.history_prev(), Some("two"));
        assert_eq!(state.history_prev(), Some("one"));
        assert_eq!(state.history_prev(), Some("one"));
        assert_eq!(state.history_next(), Some("two"));
        assert_eq!(state.history_next(), Some("three"));
        assert_eq!(state.history_next(), None);
        assert_eq!(state.history_next(), None);
        assert_eq!(state.history_prev(), Some("three"));
    }

    #[test]
    fn test_record_resets_cursor() {
        let mut state = empty_state();
        state.record("one");
        state.record("two");
        state.history_prev();
        state.history_prev();
        state.record("three");
        assert_eq!(state.history_prev(), Some("three"));
    }

    #[test]
    fn test_history_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hist");

        let mut state = empty_state();
        state.record("echo a");
        state.record("echo b");
        state.write_history_file(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "echo a\necho b\n");

        let mut other = empty_state();
        other.record("first");
        other.read_history_file(&path).unwrap();
        assert_eq!(other.history(), ["first", "echo a", "echo b"]);
    }

    #[test]
    fn test_read_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hist");
        fs::write(&path, "ls\n\n   \npwd\n").unwrap();

        let mut state = empty_state();
        state.read_history_file(&path).unwrap();
        assert_eq!(state.history(), ["ls", "pwd"]);
    }

    #[test]
    fn test_append_writes_only_new_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hist");

        let mut state = empty_state();
        state.record("one");
        state.append_history_file(&path).unwrap();
        state.record("two");
        state.record("three");
        state.append_history_file(&path).unwrap();
        state.append_history_file(&path).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\nthree\n");
    }

    #[test]
    fn test_append_skips_startup_entries() {
        let dir = TempDir::new().unwrap();
        let startup = dir.path().join("startup");
        let target = dir.path().join("target");
        fs::write(&startup, "old1\nold2\n").unwrap();

        let mut state = empty_state();
        state.load_startup_history(&startup).unwrap();
        state.record("new");
        state.append_history_file(&target).unwrap();

        assert_eq!(state.history(), ["old1", "old2", "new"]);
        assert_eq!(fs::read_to_string(&target).unwrap(), "new\n");
    }

    #[test]
    fn test_missing_startup_history_is_fine() {
        let dir = TempDir::new().unwrap();
        let mut state = empty_state();
        state
            .load_startup_history(&dir.path().join("nope"))
            .unwrap();
        assert!(state.history().is_empty());
    }

    #[test]
    fn test_exit_request() {
        let session = Session::new(empty_state());
        assert_eq!(session.lock().exit_requested(), None);
        session.clone().lock().request_exit(3);
        assert_eq!(session.lock().exit_requested(), Some(3));
    }
}
