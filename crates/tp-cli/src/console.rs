//! User-facing output with file transcripts.
//!
//! Every line printed to the console is appended to the log file. Warnings
//! are additionally appended to the warnings file so they can be reviewed
//! after a long batch.

use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::{self, Stdout, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::Config;

/// Console writer mirroring its output into transcript files.
#[derive(Debug)]
pub struct Console<W: Write> {
    out: W,
    log: Option<File>,
    warnings: Option<File>,
}

fn append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))
}

impl Console<Stdout> {
    /// Opens the transcripts named by the configuration and prints to stdout.
    pub fn open(config: &Config) -> Result<Self> {
        Ok(Self::new(
            io::stdout(),
            config.log_file.as_deref().map(append).transpose()?,
            config.warn_file.as_deref().map(append).transpose()?,
        ))
    }
}

impl<W: Write> Console<W> {
    pub const fn new(out: W, log: Option<File>, warnings: Option<File>) -> Self {
        Self { out, log, warnings }
    }

    /// Prints a line and records it in the log.
    pub fn line(&mut self, message: impl Display) -> io::Result<()> {
        let text = message.to_string();
        writeln!(self.out, "{text}")?;
        if let Some(log) = &mut self.log {
            writeln!(log, "{text}")?;
        }
        Ok(())
    }

    /// Prints a warning and records it in both transcripts.
    pub fn warn(&mut self, message: impl Display) -> io::Result<()> {
        let text = format!("WARN {message}");
        self.line(&text)?;
        if let Some(warnings) = &mut self.warnings {
            writeln!(warnings, "{text}")?;
        }
        Ok(())
    }

    /// Records a fatal error in the log only; the caller reports it on stderr.
    pub fn error(&mut self, message: impl Display) -> io::Result<()> {
        if let Some(log) = &mut self.log {
            writeln!(log, "ERROR {message}")?;
        }
        Ok(())
    }

    /// Consumes the console, returning the inner writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}
