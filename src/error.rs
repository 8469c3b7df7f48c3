use std::io;

use thiserror::Error;

use crate::jobs::Pid;

/// Unrecoverable shell errors. Any of these ends the session with a
/// non-zero exit code.
#[derive(Debug, Error)]
pub enum ShellError {
    /// The kernel refused to create a child process.
    #[error("fork: {0}")]
    Fork(#[source] io::Error),

    /// A pipe between two pipeline stages could not be created.
    #[error("pipe: {0}")]
    Pipe(#[source] io::Error),

    /// A status change arrived for a pid the job table does not track.
    #[error("cannot find process {0}")]
    UnknownProcess(Pid),

    #[error("{0}")]
    Io(#[from] io::Error),
}

/// Syntax errors from the command-line front end. The offending line is
/// dropped and the shell keeps running.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("syntax error near unexpected token `{0}'")]
    EmptyCommand(String),

    #[error("syntax error: expected filename after '{0}'")]
    MissingRedirectTarget(String),

    #[error("syntax error: '{0}' is not allowed in this pipeline position")]
    MisplacedRedirect(String),

    #[error("input is not valid UTF-8")]
    InvalidUtf8,
}
