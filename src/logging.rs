//! Process-wide log output.
//!
//! Records go through the [`log`] facade and are formatted by `env_logger` as
//! `<timestamp> | <LEVEL> | <message>`. Every line is written to stdout and, when a log
//! file is bound, appended to that file as well. The filter is read from `RUST_LOG` and
//! defaults to `info`.
use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::Path,
};

use env_logger::{Builder, Env, Target};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to bind log output: {0}")]
    Bind(#[from] io::Error),

    #[error(transparent)]
    AlreadyInitialized(#[from] log::SetLoggerError),
}

/// Writer duplicating everything into two sinks.
pub struct Tee<A: Write, B: Write> {
    primary: A,
    secondary: Option<B>,
}

impl<A: Write, B: Write> Tee<A, B> {
    pub fn new(primary: A, secondary: Option<B>) -> Self {
        Self { primary, secondary }
    }
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.primary.write_all(buf)?;
        if let Some(secondary) = self.secondary.as_mut() {
            secondary.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.primary.flush()?;
        if let Some(secondary) = self.secondary.as_mut() {
            secondary.flush()?;
        }
        Ok(())
    }
}

/// Opens `path` for appending, creating it when missing.
pub fn bind_output(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Installs the global logger.
pub fn init(log_file: Option<&Path>) -> Result<(), LoggingError> {
    let file = log_file.map(bind_output).transpose()?;
    let sink = Tee::new(io::stdout(), file);

    Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} | {:<5} | {}",
                buf.timestamp(),
                record.level(),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(sink)))
        .try_init()?;

    if let Some(path) = log_file {
        log::info!("bound to output file {}", path.display());
    }
    Ok(())
}
