use crate::config::LoggingConfig;
use env_logger::{Builder, Target};
use log::LevelFilter;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::str::FromStr;

/// Copies every log line to stderr and an append-only file.
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

/// `None` leaves the level to `RUST_LOG`.
pub fn resolve_level(
    verbose: bool,
    rust_log: Option<&str>,
    configured: Option<&str>,
) -> Option<LevelFilter> {
    if verbose {
        return Some(LevelFilter::Debug);
    }
    if rust_log.is_some_and(|value| !value.trim().is_empty()) {
        return None;
    }
    Some(
        configured
            .and_then(|level| LevelFilter::from_str(level).ok())
            .unwrap_or(LevelFilter::Info),
    )
}

pub fn init(verbose: bool, config: &LoggingConfig) -> io::Result<()> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let mut builder = Builder::from_default_env();
    if let Some(level) = resolve_level(verbose, rust_log.as_deref(), config.level.as_deref()) {
        builder.filter_level(level);
    }

    if let Some(path) = &config.file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(Target::Pipe(Box::new(TeeWriter { file })));
    }

    builder.init();
    Ok(())
}
