//! Root logger construction for the binary and the integration tests.
use slog::Drain;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;

pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Parses a `LOG_LEVEL` value. Unset or unrecognized values mean `Info`.
pub fn parse_level(value: Option<&str>) -> slog::Level {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("debug") => slog::Level::Debug,
        Some("error") => slog::Level::Error,
        _ => slog::Level::Info,
    }
}

pub fn level_from_env() -> slog::Level {
    parse_level(std::env::var(LOG_LEVEL_ENV).ok().as_deref())
}

pub fn create_root_logger_for_stdout(level: slog::Level) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = drain.filter_level(level).fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!())
}

/// Logs to stdout at `level`, and every record at any level to the file at `path`, appending.
pub fn create_root_logger_with_file(level: slog::Level, path: impl AsRef<Path>) -> Result<slog::Logger, io::Error> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    let term = slog_term::FullFormat::new(slog_term::TermDecorator::new().build())
        .build()
        .filter_level(level)
        .fuse();
    let file = slog_term::FullFormat::new(slog_term::PlainDecorator::new(file))
        .build()
        .fuse();
    let drain = slog::Duplicate::new(term, file).fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    Ok(slog::Logger::root(drain, slog::o!()))
}
