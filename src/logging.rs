use crate::args;

use args::{LOG_LEVEL, VERBOSITY};
use clap::ArgMatches;
use slog::{o, Drain, Duplicate, Level, Logger, OwnedKVList, Record};
use slog_async::Async;
use slog_gcplog::Hook;
use slog_term::{CompactFormat, TermDecorator};
use std::sync::Arc;
use std::{fmt::Display, result::Result};

#[derive(Clone)]
struct FallbackToStderr<D: Drain> {
    drain: D,
}

impl<D: Drain> Drain for FallbackToStderr<D>
where
    D::Err: Display,
{
    type Ok = ();
    type Err = ();
    fn log(&self, record: &Record, logger_values: &OwnedKVList) -> Result<(), ()> {
        if let Err(err) = self.drain.log(record, logger_values) {
            eprint!("A drain could not log to its destination: {}", err);
        }
        Ok(())
    }

    #[inline]
    fn is_enabled(&self, level: Level) -> bool {
        self.drain.is_enabled(level)
    }
}

fn min_log_level(arg_matches: &ArgMatches) -> Result<Level, String> {
    let min_log_level = match arg_matches.occurrences_of(VERBOSITY) {
        0 => Level::Warning,
        1 => Level::Info,
        2 => Level::Debug,
        _ => Level::Trace,
    };

    Ok(match arg_matches.value_of(LOG_LEVEL) {
        Some(level) => match level
            .parse::<args::LogLevelType>()
            .map_err(|e| format!("invalid log level '{}': {}", level, e))?
        {
            args::LogLevelType::error => Level::Error,
            args::LogLevelType::warn => Level::Warning,
            args::LogLevelType::info => Level::Info,
            args::LogLevelType::debug => Level::Debug,
            args::LogLevelType::trace => Level::Trace,
        },
        None => min_log_level,
    })
}

/// Creates the tool's own logger. With a `forward` hook, records also go to Google Cloud
/// Logging, subject to the hook's own minimum level.
pub fn create_logger(
    arg_matches: &ArgMatches,
    forward: Option<Arc<Hook>>,
) -> Result<slog::Logger, String> {
    let min_log_level = min_log_level(arg_matches)?;

    let decorator = TermDecorator::new().stderr().build();
    let term_drain = CompactFormat::new(decorator)
        .build()
        .filter_level(min_log_level)
        .map(|drain| FallbackToStderr { drain })
        .fuse();

    let drain = match forward {
        Some(hook) => {
            let both = Duplicate::new(hook, term_drain).fuse();
            Async::new(both).build().fuse()
        }
        None => Async::new(term_drain).build().fuse(),
    };
    let root = Logger::root(drain, o!());
    Ok(root.new(o!()))
}

#[cfg(test)]
mod tests {
    use super::min_log_level;
    use crate::args::clap_app;
    use slog::Level;

    fn level_for(flags: &[&str]) -> Level {
        let mut argv = vec!["gcplog", "--project-id", "p"];
        argv.extend_from_slice(flags);
        min_log_level(&clap_app().try_get_matches_from(argv).unwrap()).unwrap()
    }

    #[test]
    fn verbosity_raises_the_level() {
        assert_eq!(level_for(&[]), Level::Warning);
        assert_eq!(level_for(&["-v"]), Level::Info);
        assert_eq!(level_for(&["-vv"]), Level::Debug);
        assert_eq!(level_for(&["-vvvv"]), Level::Trace);
    }

    #[test]
    fn log_level_overrides_verbosity() {
        assert_eq!(level_for(&["-vvv", "--log-level", "error"]), Level::Error);
    }
}
