use chrono::Local;
use colored::*;
use env_logger::{Builder, Env};
use std::io::Write;

/// Installs the process-wide logger: `[timestamp] [LEVEL] message`, levels
/// colored. `RUST_LOG` wins over `verbose`.
pub fn init_logger(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };

    // A second call (tests, embedding) keeps the first logger.
    let _ = Builder::from_env(Env::default().default_filter_or(default_filter))
        .format(|buf, record| {
            let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
            writeln!(
                buf,
                "[{}] [{}] {}",
                timestamp,
                colored_level(record.level()),
                record.args()
            )
        })
        .try_init();
}

fn colored_level(level: log::Level) -> ColoredString {
    match level {
        log::Level::Error => level.to_string().red(),
        log::Level::Warn => level.to_string().yellow(),
        log::Level::Info => level.to_string().green(),
        log::Level::Debug => level.to_string().blue(),
        log::Level::Trace => level.to_string().white(),
    }
}
