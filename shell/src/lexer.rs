//! Lexical analysis of a single input line.
//!
//! The lexer is a small finite state machine over the characters of the line.
//! Quoting and escaping are fully resolved here, so the words handed to the
//! planner carry their final text, and operators that appeared inside quotes
//! or behind a backslash never come out as operator tokens.

use std::fmt;

/// How the text of a word was quoted in the input.
///
/// A word assembled from several fragments (`fo"o"`) reports the class of its
/// first quoted fragment, or `Unquoted` when no fragment was quoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quoting {
    Unquoted,
    Single,
    Double,
}

/// File descriptor a redirection operator rebinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetFd {
    Stdout,
    Stderr,
}

/// Whether a redirection replaces or extends the target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    Truncate,
    Append,
}

/// One of `>`, `1>`, `>>`, `1>>`, `2>`, `2>>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectOp {
    pub fd: TargetFd,
    pub mode: RedirectMode,
}

/// A word with all quotes and escapes already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub text: String,
    pub quoting: Quoting,
}

/// Represents a token resulting from lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// An argument, program name or file name.
    Word(Word),
    /// The pipe operator, `|`.
    Pipe,
    /// An output redirection operator.
    Redirect(RedirectOp),
}

impl Token {
    /// The word text, if this token is a word.
    pub fn as_word(&self) -> Option<&str> {
        match self {
            Token::Word(word) => Some(&word.text),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(word) => f.write_str(&word.text),
            Token::Pipe => f.write_str("|"),
            Token::Redirect(op) => {
                let text = match (op.fd, op.mode) {
                    (TargetFd::Stdout, RedirectMode::Truncate) => ">",
                    (TargetFd::Stdout, RedirectMode::Append) => ">>",
                    (TargetFd::Stderr, RedirectMode::Truncate) => "2>",
                    (TargetFd::Stderr, RedirectMode::Append) => "2>>",
                };
                f.write_str(text)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
    ReadingSingleQuote,
    ReadingDoubleQuote,
}

struct LexingFSM {
    input: Vec<char>,
    pos: usize,
    state: LexingState,
    buffer: String,
    quoting: Quoting,
    /// A word has been started, possibly an empty quoted one.
    in_word: bool,
    /// The current word so far consists only of plain unquoted characters.
    plain: bool,
}

impl LexingFSM {
    fn new(line: &str) -> Self {
        LexingFSM {
            input: line.chars().collect(),
            pos: 0,
            state: LexingState::Start,
            buffer: String::new(),
            quoting: Quoting::Unquoted,
            in_word: false,
            plain: true,
        }
    }

    /// Runs the machine to the end of the input.
    ///
    /// An unterminated quote simply runs to the end of the line; the text
    /// collected so far becomes the last word.
    fn make_tokens(mut self) -> Vec<Token> {
        let mut out = Vec::new();

        while let Some(ch) = self.read_char() {
            match self.state {
                LexingState::Start | LexingState::ReadingWord => self.handle_unquoted(ch, &mut out),
                LexingState::ReadingSingleQuote => self.handle_single_quote(ch),
                LexingState::ReadingDoubleQuote => self.handle_double_quote(ch),
            }
        }

        self.finish_word(&mut out);
        out
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn handle_unquoted(&mut self, ch: char, out: &mut Vec<Token>) {
        match ch {
            c if c.is_whitespace() => {
                self.finish_word(out);
                self.state = LexingState::Start;
            }
            '|' => {
                self.finish_word(out);
                out.push(Token::Pipe);
                self.state = LexingState::Start;
            }
            '>' => {
                let fd = self.take_fd_prefix().unwrap_or_else(|| {
                    self.finish_word(out);
                    TargetFd::Stdout
                });
                let mode = if self.peek_char() == Some('>') {
                    self.read_char();
                    RedirectMode::Append
                } else {
                    RedirectMode::Truncate
                };
                out.push(Token::Redirect(RedirectOp { fd, mode }));
                self.state = LexingState::Start;
            }
            '\'' => {
                self.start_quoted(Quoting::Single);
                self.state = LexingState::ReadingSingleQuote;
            }
            '"' => {
                self.start_quoted(Quoting::Double);
                self.state = LexingState::ReadingDoubleQuote;
            }
            '\\' => {
                self.in_word = true;
                self.plain = false;
                // A trailing backslash has nothing to escape and is dropped.
                if let Some(next) = self.read_char() {
                    self.buffer.push(next);
                }
                self.state = LexingState::ReadingWord;
            }
            c => {
                self.in_word = true;
                self.buffer.push(c);
                self.state = LexingState::ReadingWord;
            }
        }
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => self.state = LexingState::ReadingWord,
            c => self.buffer.push(c),
        }
    }

    fn handle_double_quote(&mut self, ch: char) {
        match ch {
            '"' => self.state = LexingState::ReadingWord,
            '\\' => match self.peek_char() {
                Some(next @ ('"' | '\\')) => {
                    self.read_char();
                    self.buffer.push(next);
                }
                None => {}
                Some(_) => self.buffer.push('\\'),
            },
            c => self.buffer.push(c),
        }
    }

    fn start_quoted(&mut self, quoting: Quoting) {
        if self.quoting == Quoting::Unquoted {
            self.quoting = quoting;
        }
        self.in_word = true;
        self.plain = false;
    }

    /// Consumes the current word when it is a bare `1` or `2` glued to `>`.
    fn take_fd_prefix(&mut self) -> Option<TargetFd> {
        if !self.in_word || !self.plain {
            return None;
        }
        let fd = match self.buffer.as_str() {
            "1" => TargetFd::Stdout,
            "2" => TargetFd::Stderr,
            _ => return None,
        };
        self.reset_word();
        Some(fd)
    }

    fn finish_word(&mut self, out: &mut Vec<Token>) {
        if self.in_word {
            out.push(Token::Word(Word {
                text: std::mem::take(&mut self.buffer),
                quoting: self.quoting,
            }));
        }
        self.reset_word();
    }

    fn reset_word(&mut self) {
        self.buffer.clear();
        self.quoting = Quoting::Unquoted;
        self.in_word = false;
        self.plain = true;
    }
}

/// Splits an input line into tokens.
///
/// Never fails: malformed quoting is resolved by consuming to the end of the
/// line.
pub fn tokenize(line: &str) -> Vec<Token> {
    LexingFSM::new(line).make_tokens()
}
