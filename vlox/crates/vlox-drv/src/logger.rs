//! Minimal stderr logger behind the `log` facade.
//!
//! The runtime crates log through `log` (GC cycles at `debug!`,
//! instruction traces at `trace!`); this sink turns those on when the
//! user asks via `VLOX_LOG`.

use log::{Level, LevelFilter, Log, Metadata, Record};

struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            if record.level() <= Level::Debug {
                eprintln!("[{}] {}", record.level().as_str().to_lowercase(), record.args());
            } else {
                eprintln!("{}", record.args());
            }
        }
    }

    fn flush(&self) {}
}

/// Installs the logger if `VLOX_LOG` names a level
/// (`error`, `warn`, `info`, `debug`, `trace`). Unset or unrecognized
/// values leave logging off.
pub(crate) fn init_from_env() {
    let Ok(value) = std::env::var("VLOX_LOG") else {
        return;
    };

    let level = match value.to_ascii_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => return,
    };

    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_respects_max_level() {
        let metadata = Metadata::builder().level(Level::Error).build();
        // Before init, max_level is Off, so nothing is enabled.
        if log::max_level() == LevelFilter::Off {
            assert!(!LOGGER.enabled(&metadata));
        }
    }
}
