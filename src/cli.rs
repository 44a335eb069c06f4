//! CLI utilities for calcq.
//!
//! The utilities present in this module are used by the interactive client.
use std::io::{self, BufRead, Write};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("unrecognized command '{0}'")]
    UnrecognizedCommand(String),

    #[error("no expression provided")]
    Empty,

    #[error("terminal error: {0}")]
    Io(#[from] io::Error),
}

/// Possible commands from a user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Exit command `.exit`
    Exit,
    /// Expression to send to the server
    Expression(String),
}

/// Prompt user for a command.
///
/// End of input is treated as `.exit`.
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> Result<Command, CliError>
where
    R: BufRead,
    W: Write,
{
    let mut s = String::default();
    write!(&mut writer, "> ")?;
    writer.flush()?;

    if reader.read_line(&mut s)? == 0 {
        return Ok(Command::Exit);
    }

    match s.trim() {
        ".exit" => Ok(Command::Exit),
        "" => Err(CliError::Empty),
        s if !s.starts_with('.') => Ok(Command::Expression(s.to_string())),
        s => Err(CliError::UnrecognizedCommand(s.to_string())),
    }
}
