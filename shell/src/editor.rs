//! Byte-at-a-time line editor for a terminal in raw mode.
//!
//! The editor only ever appends to or removes from the end of the line; there
//! is no cursor movement within the line. Left and right arrows are
//! recognised so that their escape sequences do not leak into the buffer.

use crate::completion::{Completion, ExecutableIndex};
use crate::session::Session;
use std::io::{self, Read, Write};

const BELL: &[u8] = b"\x07";
const ESC: u8 = 0x1b;
const CTRL_C: u8 = 0x03;
const CTRL_D: u8 = 0x04;
const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7f;

/// How a call to [`LineEditor::read_line`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A committed line, without the terminator.
    Line(String),
    /// Ctrl-C; the partial line was discarded.
    Interrupted,
    /// Ctrl-D on an empty line, or the input stream ended.
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditorState {
    Normal,
    EscapeSeen,
    BracketSeen,
}

pub struct LineEditor {
    prompt: String,
    buffer: String,
    state: EditorState,
    /// The previous key was a Tab that found several candidates.
    tab_pending: bool,
    /// Bytes of a UTF-8 sequence that is not complete yet.
    partial: Vec<u8>,
}

impl LineEditor {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            buffer: String::new(),
            state: EditorState::Normal,
            tab_pending: false,
            partial: Vec::new(),
        }
    }

    /// Prints the prompt and edits one line.
    ///
    /// Tab completes command names from `index`; Up and Down walk the history
    /// kept in `session`.
    pub fn read_line<R: Read, W: Write>(
        &mut self,
        input: &mut R,
        output: &mut W,
        index: &ExecutableIndex,
        session: &Session,
    ) -> io::Result<ReadOutcome> {
        self.buffer.clear();
        self.partial.clear();
        self.state = EditorState::Normal;
        self.tab_pending = false;

        output.write_all(self.prompt.as_bytes())?;
        output.flush()?;

        let mut byte = [0u8; 1];
        loop {
            let n = match input.read(&mut byte) {
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            };
            if n == 0 {
                output.write_all(b"\n")?;
                output.flush()?;
                if self.buffer.is_empty() {
                    return Ok(ReadOutcome::Eof);
                }
                return Ok(ReadOutcome::Line(std::mem::take(&mut self.buffer)));
            }

            let outcome = self.feed(byte[0], output, index, session)?;
            output.flush()?;
            if let Some(outcome) = outcome {
                return Ok(outcome);
            }
        }
    }

    fn feed<W: Write>(
        &mut self,
        byte: u8,
        output: &mut W,
        index: &ExecutableIndex,
        session: &Session,
    ) -> io::Result<Option<ReadOutcome>> {
        match self.state {
            EditorState::Normal => {}
            // A control key cancels a pending sequence and is handled as usual.
            _ if is_control(byte) => self.state = EditorState::Normal,
            EditorState::EscapeSeen => {
                // `ESC O` is the application-mode form of the arrow keys.
                self.state = if byte == b'[' || byte == b'O' {
                    EditorState::BracketSeen
                } else {
                    EditorState::Normal
                };
                return Ok(None);
            }
            EditorState::BracketSeen => {
                match byte {
                    // Parameter bytes, e.g. the `1;5` in `ESC [ 1 ; 5 A`.
                    0x30..=0x3f => {}
                    b'A' => {
                        self.state = EditorState::Normal;
                        self.history_up(output, session)?;
                    }
                    b'B' => {
                        self.state = EditorState::Normal;
                        self.history_down(output, session)?;
                    }
                    // Right, left and anything unbound.
                    _ => self.state = EditorState::Normal,
                }
                return Ok(None);
            }
        }

        if byte != b'\t' {
            self.tab_pending = false;
        }

        match byte {
            b'\r' | b'\n' => {
                output.write_all(b"\n")?;
                session.lock().history_reset_cursor();
                return Ok(Some(ReadOutcome::Line(std::mem::take(&mut self.buffer))));
            }
            ESC => self.state = EditorState::EscapeSeen,
            b'\t' => self.complete(output, index)?,
            DELETE | BACKSPACE => {
                if self.buffer.pop().is_some() {
                    self.redraw(output)?;
                }
            }
            CTRL_C => {
                output.write_all(b"^C\n")?;
                self.buffer.clear();
                session.lock().history_reset_cursor();
                return Ok(Some(ReadOutcome::Interrupted));
            }
            CTRL_D if self.buffer.is_empty() => {
                output.write_all(b"\n")?;
                return Ok(Some(ReadOutcome::Eof));
            }
            b if b < 0x20 => {}
            b => self.insert(b, output)?,
        }
        Ok(None)
    }

    fn insert<W: Write>(&mut self, byte: u8, output: &mut W) -> io::Result<()> {
        self.partial.push(byte);
        match std::str::from_utf8(&self.partial) {
            Ok(text) => {
                self.buffer.push_str(text);
                output.write_all(&self.partial)?;
                self.partial.clear();
            }
            // Incomplete sequence, wait for more bytes.
            Err(err) if err.error_len().is_none() => {}
            Err(_) => self.partial.clear(),
        }
        Ok(())
    }

    fn complete<W: Write>(&mut self, output: &mut W, index: &ExecutableIndex) -> io::Result<()> {
        if self.buffer.is_empty() || self.buffer.contains(char::is_whitespace) {
            return output.write_all(BELL);
        }

        match index.complete(&self.buffer) {
            Completion::Unique(suffix) | Completion::Extend(suffix) => {
                self.tab_pending = false;
                self.buffer.push_str(&suffix);
                output.write_all(suffix.as_bytes())
            }
            Completion::NoMatch => {
                self.tab_pending = false;
                output.write_all(BELL)
            }
            Completion::Ambiguous(candidates) if self.tab_pending => {
                self.tab_pending = false;
                write!(output, "\n{}\n", candidates.join("  "))?;
                self.redraw(output)
            }
            Completion::Ambiguous(_) => {
                self.tab_pending = true;
                output.write_all(BELL)
            }
        }
    }

    fn history_up<W: Write>(&mut self, output: &mut W, session: &Session) -> io::Result<()> {
        let entry = session.lock().history_prev().map(str::to_string);
        if let Some(entry) = entry {
            self.buffer = entry;
            self.redraw(output)?;
        }
        Ok(())
    }

    fn history_down<W: Write>(&mut self, output: &mut W, session: &Session) -> io::Result<()> {
        {
            let mut state = session.lock();
            // Nothing newer than the line being typed.
            if !state.is_browsing_history() {
                return Ok(());
            }
            match state.history_next() {
                Some(entry) => self.buffer = entry.to_string(),
                None => self.buffer.clear(),
            }
        }
        self.redraw(output)
    }

    fn redraw<W: Write>(&self, output: &mut W) -> io::Result<()> {
        write!(output, "\r\x1b[2K{}{}", self.prompt, self.buffer)
    }
}

fn is_control(byte: u8) -> bool {
    byte < 0x20 || byte == DELETE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn session_with(history: &[&str]) -> Session {
        let mut state = SessionState::from_parts(PathBuf::from("/"), HashMap::new());
        for entry in history {
            state.record(*entry);
        }
        Session::new(state)
    }

    fn index() -> ExecutableIndex {
        let mut index = ExecutableIndex::new();
        for name in ["git", "grep", "grpc-tool", "echo", "exit"] {
            index.insert(name);
        }
        index
    }

    /// Feeds `keys` to a fresh editor and returns the outcome and everything echoed.
    fn edit(keys: &[u8], session: &Session) -> (ReadOutcome, String) {
        edit_with(keys, session, &index())
    }

    fn edit_with(keys: &[u8], session: &Session, index: &ExecutableIndex) -> (ReadOutcome, String) {
        let mut editor = LineEditor::new("$ ");
        let mut input = Cursor::new(keys.to_vec());
        let mut output = Vec::new();
        let outcome = editor
            .read_line(&mut input, &mut output, index, session)
            .unwrap();
        (outcome, String::from_utf8(output).unwrap())
    }

    fn line(s: &str) -> ReadOutcome {
        ReadOutcome::Line(s.to_string())
    }

    #[test]
    fn test_plain_line_is_echoed() {
        let (outcome, out) = edit(b"echo hi\r", &session_with(&[]));
        assert_eq!(outcome, line("echo hi"));
        assert_eq!(out, "$ echo hi\n");
    }

    #[test]
    fn test_backspace_and_delete() {
        let (outcome, out) = edit(b"ecx\x7fhoo\x08\n", &session_with(&[]));
        assert_eq!(outcome, line("echo"));
        assert!(out.contains("\r\x1b[2K$ ec"));
    }

    #[test]
    fn test_backspace_on_empty_is_ignored() {
        let (outcome, out) = edit(b"\x7f\x7fa\n", &session_with(&[]));
        assert_eq!(outcome, line("a"));
        assert_eq!(out, "$ a\n");
    }

    #[test]
    fn test_unique_completion() {
        let (outcome, out) = edit(b"gi\tstatus\n", &session_with(&[]));
        assert_eq!(outcome, line("git status"));
        assert_eq!(out, "$ git status\n");
    }

    #[test]
    fn test_ambiguous_completion_rings_then_lists() {
        let (outcome, out) = edit(b"gr\t\t\n", &session_with(&[]));
        assert_eq!(outcome, line("gr"));
        assert_eq!(out, "$ gr\x07\ngrep  grpc-tool\n\r\x1b[2K$ gr\n");
    }

    #[test]
    fn test_common_prefix_extends_without_bell() {
        let mut index = ExecutableIndex::new();
        index.insert("git-lfs");
        index.insert("git-shell");

        let (outcome, out) = edit_with(b"g\t\n", &session_with(&[]), &index);
        assert_eq!(outcome, line("git-"));
        assert_eq!(out, "$ git-\n");

        let (_, out) = edit_with(b"g\t\t\t\n", &session_with(&[]), &index);
        assert_eq!(out, "$ git-\x07\ngit-lfs  git-shell\n\r\x1b[2K$ git-\n");
    }

    #[test]
    fn test_tab_needs_fresh_second_press() {
        let (_, out) = edit(b"gr\ta\x7f\t\n", &session_with(&[]));
        assert_eq!(out.matches('\x07').count(), 2);
        assert!(!out.contains("grpc-tool"));
    }

    #[test]
    fn test_no_match_and_whitespace_ring_bell() {
        let (outcome, out) = edit(b"zz\t\n", &session_with(&[]));
        assert_eq!(outcome, line("zz"));
        assert_eq!(out, "$ zz\x07\n");

        let (outcome, out) = edit(b"echo g\t\n", &session_with(&[]));
        assert_eq!(outcome, line("echo g"));
        assert!(out.contains('\x07'));

        let (_, out) = edit(b"\t\n", &session_with(&[]));
        assert_eq!(out, "$ \x07\n");
    }

    #[test]
    fn test_history_up_and_down() {
        let session = session_with(&["ls", "pwd"]);
        let (outcome, _) = edit(b"\x1b[A\x1b[A\n", &session);
        assert_eq!(outcome, line("ls"));

        let (outcome, _) = edit(b"\x1b[A\x1b[A\x1b[A\x1b[B\n", &session);
        assert_eq!(outcome, line("pwd"));

        let (outcome, out) = edit(b"\x1b[A\x1b[B\n", &session);
        assert_eq!(outcome, line(""));
        assert!(out.ends_with("\r\x1b[2K$ \n"));
    }

    #[test]
    fn test_up_with_empty_history_keeps_buffer() {
        let (outcome, _) = edit(b"ab\x1b[A\n", &session_with(&[]));
        assert_eq!(outcome, line("ab"));
    }

    #[test]
    fn test_other_escapes_are_discarded() {
        let session = session_with(&["ls"]);
        let (outcome, _) = edit(b"ab\x1b[C\x1b[D\x1b[1;5C\n", &session);
        assert_eq!(outcome, line("ab"));

        let (outcome, _) = edit(b"a\x1bOx\n", &session);
        assert_eq!(outcome, line("a"));

        let (outcome, _) = edit(b"a\x1bxb\n", &session);
        assert_eq!(outcome, line("ab"));
    }

    #[test]
    fn test_application_mode_arrows() {
        let session = session_with(&["pwd"]);
        let (outcome, _) = edit(b"ls\x1bOA\n", &session);
        assert_eq!(outcome, line("pwd"));

        let (outcome, _) = edit(b"ls\x1bOA\x1bOB\n", &session);
        assert_eq!(outcome, line(""));
    }

    #[test]
    fn test_control_key_ends_escape_sequence() {
        let session = session_with(&[]);
        let (outcome, _) = edit(b"ls\x1b\rx\n", &session);
        assert_eq!(outcome, line("ls"));

        let (outcome, _) = edit(b"ls\x1b[\x7f\n", &session);
        assert_eq!(outcome, line("l"));

        let (outcome, _) = edit(b"ls\x1b\x1b[C\n", &session);
        assert_eq!(outcome, line("ls"));
    }

    #[test]
    fn test_down_without_browsing_keeps_typed_text() {
        let session = session_with(&["pwd"]);
        let (outcome, out) = edit(b"echo typed\x1b[B\n", &session);
        assert_eq!(outcome, line("echo typed"));
        assert_eq!(out, "$ echo typed\n");
    }

    #[test]
    fn test_ctrl_c_discards_line() {
        let (outcome, out) = edit(b"echo\x03more", &session_with(&[]));
        assert_eq!(outcome, ReadOutcome::Interrupted);
        assert_eq!(out, "$ echo^C\n");
    }

    #[test]
    fn test_ctrl_d_only_on_empty_line() {
        let (outcome, _) = edit(b"\x04", &session_with(&[]));
        assert_eq!(outcome, ReadOutcome::Eof);

        let (outcome, _) = edit(b"ab\x04c\n", &session_with(&[]));
        assert_eq!(outcome, line("abc"));
    }

    #[test]
    fn test_end_of_input() {
        let (outcome, _) = edit(b"", &session_with(&[]));
        assert_eq!(outcome, ReadOutcome::Eof);

        let (outcome, _) = edit(b"partial", &session_with(&[]));
        assert_eq!(outcome, line("partial"));
    }

    #[test]
    fn test_multibyte_input() {
        let (outcome, out) = edit("echo héllo\x7f\x7fo\n".as_bytes(), &session_with(&[]));
        assert_eq!(outcome, line("echo hélo"));
        assert!(out.starts_with("$ echo héllo"));
    }

    #[test]
    fn test_consecutive_lines_from_one_stream() {
        let session = session_with(&[]);
        let mut editor = LineEditor::new("> ");
        let mut input = Cursor::new(b"one\ntwo\n".to_vec());
        let mut output = Vec::new();
        let idx = index();
        assert_eq!(
            editor.read_line(&mut input, &mut output, &idx, &session).unwrap(),
            line("one")
        );
        assert_eq!(
            editor.read_line(&mut input, &mut output, &idx, &session).unwrap(),
            line("two")
        );
        assert_eq!(
            editor.read_line(&mut input, &mut output, &idx, &session).unwrap(),
            ReadOutcome::Eof
        );
        assert_eq!(String::from_utf8(output).unwrap(), "> one\n> two\n> \n");
    }
}
