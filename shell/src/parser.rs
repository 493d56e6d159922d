use crate::error::{ShellError, ShellResult};
use crate::lexer::{RedirectMode, TargetFd, Token};

/// A single output redirection attached to a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectionSpec {
    pub target_fd: TargetFd,
    pub path: String,
    pub mode: RedirectMode,
}

/// One stage of a pipeline: the argument vector and its redirections.
///
/// The argument vector is never empty and holds at most one redirection per
/// target descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    argv: Vec<String>,
    redirections: Vec<RedirectionSpec>,
}

impl Command {
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// The program or builtin name, `argv[0]`.
    pub fn name(&self) -> &str {
        &self.argv[0]
    }

    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    pub fn redirections(&self) -> &[RedirectionSpec] {
        &self.redirections
    }

    pub fn redirection_for(&self, fd: TargetFd) -> Option<&RedirectionSpec> {
        self.redirections.iter().find(|r| r.target_fd == fd)
    }
}

/// An ordered, non-empty list of commands connected by `|`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    commands: Vec<Command>,
}

impl Pipeline {
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

struct PipelinePlanner {
    tokens: Vec<Token>,
    pos: usize,
}

impl PipelinePlanner {
    fn from(tokens: Vec<Token>) -> Self {
        PipelinePlanner { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn unexpected(token: Option<&Token>) -> ShellError {
        match token {
            Some(token) => ShellError::Syntax(token.to_string()),
            None => ShellError::Syntax("newline".to_string()),
        }
    }

    /// Parse a pipeline: command ('|' command)*
    fn parse_pipeline(mut self) -> ShellResult<Pipeline> {
        if self.tokens.is_empty() {
            return Err(ShellError::EmptyPipeline);
        }

        let mut commands = vec![self.parse_command()?];
        while let Some(Token::Pipe) = self.peek() {
            self.consume();
            commands.push(self.parse_command()?);
        }

        // parse_command stops only at a pipe or at the end, so nothing is left.
        debug_assert!(self.peek().is_none());
        Ok(Pipeline { commands })
    }

    /// Parse a command: (word | redirect word)+
    fn parse_command(&mut self) -> ShellResult<Command> {
        let mut argv = Vec::new();
        let mut redirections: Vec<RedirectionSpec> = Vec::new();

        while let Some(token) = self.peek() {
            match token {
                Token::Pipe => break,
                Token::Word(_) => {
                    if let Some(Token::Word(word)) = self.consume() {
                        argv.push(word.text);
                    }
                }
                Token::Redirect(op) => {
                    let op = *op;
                    self.consume();
                    let path = match self.consume() {
                        Some(Token::Word(word)) => word.text,
                        other => return Err(Self::unexpected(other.as_ref())),
                    };
                    // Last redirection for a descriptor wins.
                    redirections.retain(|r| r.target_fd != op.fd);
                    redirections.push(RedirectionSpec {
                        target_fd: op.fd,
                        path,
                        mode: op.mode,
                    });
                }
            }
        }

        if argv.is_empty() {
            return Err(Self::unexpected(self.peek()));
        }

        Ok(Command { argv, redirections })
    }
}

/// Groups a token stream into a [`Pipeline`].
///
/// Fails with [`ShellError::EmptyPipeline`] for an empty stream and with
/// [`ShellError::Syntax`] when a stage has no words, or a redirection operator
/// is not followed by a word.
pub fn plan(tokens: Vec<Token>) -> ShellResult<Pipeline> {
    PipelinePlanner::from(tokens).parse_pipeline()
}
