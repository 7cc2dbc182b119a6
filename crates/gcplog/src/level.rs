use std::fmt;
use std::str::FromStr;

/// The levels a hook is called with, from least to most verbose.
///
/// A hook configured with minimum level `Info` accepts `Error`, `Warn` and `Info` calls and
/// drops `Debug` and `Trace` before any formatting happens.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

const LEVEL_NAMES: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

impl Level {
    /// Numeric form, 1 (`Error`) through 5 (`Trace`).
    pub fn as_usize(self) -> usize {
        match self {
            Level::Error => 1,
            Level::Warn => 2,
            Level::Info => 3,
            Level::Debug => 4,
            Level::Trace => 5,
        }
    }

    /// Inverse of [`as_usize`](Level::as_usize). Anything outside 1..=5 is not a level.
    pub fn from_usize(n: usize) -> Option<Level> {
        match n {
            1 => Some(Level::Error),
            2 => Some(Level::Warn),
            3 => Some(Level::Info),
            4 => Some(Level::Debug),
            5 => Some(Level::Trace),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        LEVEL_NAMES[self.as_usize() - 1]
    }

    /// True when a call at this level passes a hook whose minimum level is `threshold`.
    #[inline]
    pub fn is_at_least(self, threshold: Level) -> bool {
        self.as_usize() <= threshold.as_usize()
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Level::Error),
            "warn" | "warning" => Ok(Level::Warn),
            "info" => Ok(Level::Info),
            "debug" => Ok(Level::Debug),
            "trace" => Ok(Level::Trace),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

impl From<slog::Level> for Level {
    fn from(level: slog::Level) -> Self {
        match level {
            slog::Level::Critical | slog::Level::Error => Level::Error,
            slog::Level::Warning => Level::Warn,
            slog::Level::Info => Level::Info,
            slog::Level::Debug => Level::Debug,
            slog::Level::Trace => Level::Trace,
        }
    }
}

impl From<Level> for slog::Level {
    fn from(level: Level) -> Self {
        match level {
            Level::Error => slog::Level::Error,
            Level::Warn => slog::Level::Warning,
            Level::Info => slog::Level::Info,
            Level::Debug => slog::Level::Debug,
            Level::Trace => slog::Level::Trace,
        }
    }
}

/// The severity of a Google Cloud Logging entry.
///
/// See <https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry#logseverity>
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Default,
    Debug,
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Default => "DEFAULT",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }

    /// Maps a raw level number to a severity. Numbers that are not a [`Level`] become `Default`.
    pub fn from_raw_level(n: usize) -> Severity {
        Level::from_usize(n).map_or(Severity::Default, Severity::from)
    }
}

impl From<Level> for Severity {
    fn from(level: Level) -> Self {
        // Trace has no counterpart in Cloud Logging
        match level {
            Level::Trace => Severity::Default,
            Level::Debug => Severity::Debug,
            Level::Info => Severity::Info,
            Level::Warn => Severity::Warning,
            Level::Error => Severity::Error,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::{Level, Severity};

    #[test]
    fn every_level_has_a_severity() {
        assert_eq!(Severity::from(Level::Trace), Severity::Default);
        assert_eq!(Severity::from(Level::Debug), Severity::Debug);
        assert_eq!(Severity::from(Level::Info), Severity::Info);
        assert_eq!(Severity::from(Level::Warn), Severity::Warning);
        assert_eq!(Severity::from(Level::Error), Severity::Error);
    }

    #[test]
    fn unknown_raw_levels_map_to_default() {
        for n in [0, 6, 42, usize::MAX] {
            assert_eq!(Severity::from_raw_level(n), Severity::Default);
        }
        assert_eq!(Severity::from_raw_level(4), Severity::Debug);
        assert_eq!(Severity::from_raw_level(1), Severity::Error);
    }

    #[test]
    fn raw_level_numbers_round_trip() {
        for n in 1..=5 {
            assert_eq!(Level::from_usize(n).map(Level::as_usize), Some(n));
        }
    }

    #[test]
    fn gating_follows_verbosity() {
        assert!(Level::Error.is_at_least(Level::Info));
        assert!(Level::Info.is_at_least(Level::Info));
        assert!(!Level::Debug.is_at_least(Level::Info));
        assert!(!Level::Trace.is_at_least(Level::Debug));
        assert!(Level::Trace.is_at_least(Level::Trace));
    }

    #[test]
    fn severity_names_match_cloud_logging() {
        assert_eq!(Severity::Warning.to_string(), "WARNING");
        assert_eq!(Severity::Default.as_str(), "DEFAULT");
    }

    #[test]
    fn parses_level_names() {
        assert_eq!("WARNING".parse::<Level>(), Ok(Level::Warn));
        assert_eq!("trace".parse::<Level>(), Ok(Level::Trace));
        assert!("verbose".parse::<Level>().is_err());
    }

    #[test]
    fn slog_critical_is_an_error() {
        assert_eq!(Level::from(slog::Level::Critical), Level::Error);
        assert_eq!(slog::Level::from(Level::Warn), slog::Level::Warning);
    }
}
