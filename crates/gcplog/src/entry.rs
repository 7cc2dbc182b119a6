use crate::labels::TypeLabels;
use crate::level::{Level, Severity};

use chrono::{DateTime, Utc};
use std::collections::HashMap;

pub const LOG_PROJECT: &str = "logProject";
pub const ENVIRONMENT: &str = "environment";
pub const CODE_VERSION: &str = "codeVersion";
pub const SERVICE: &str = "service";
pub const SERVER_ROOT: &str = "serverRoot";
pub const CALLER_FUNCTION: &str = "caller_function";
pub const CALLER_FILE: &str = "caller_file";
pub const CALLER_LINE: &str = "caller_line";

/// Where a log call came from. Empty strings and line `0` mean unknown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Caller<'a> {
    pub function: &'a str,
    pub file: &'a str,
    pub line: u32,
}

impl<'a> Caller<'a> {
    pub fn new(function: &'a str, file: &'a str, line: u32) -> Self {
        Self {
            function,
            file,
            line,
        }
    }

    fn apply(&self, labels: &mut HashMap<String, String>) {
        if !self.function.is_empty() {
            labels.insert(CALLER_FUNCTION.to_string(), self.function.to_string());
        }
        if !self.file.is_empty() {
            labels.insert(CALLER_FILE.to_string(), self.file.to_string());
        }
        if self.line > 0 {
            labels.insert(CALLER_LINE.to_string(), self.line.to_string());
        }
    }
}

/// A log entry ready to hand to a [`Sink`](crate::connection::Sink).
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub severity: Severity,
    pub payload: serde_json::Map<String, serde_json::Value>,
    pub labels: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    /// Builds the entry for one log call.
    ///
    /// The message becomes the payload when it is a JSON object, otherwise the payload is
    /// empty. Labels are the `static_labels`, the known parts of the `caller` and whatever
    /// the payload's `"type"` field yields.
    pub fn new(
        level: Level,
        static_labels: &HashMap<String, String>,
        caller: Option<&Caller<'_>>,
        message: &str,
    ) -> LogEntry {
        let payload = decode_payload(message);
        let mut labels = static_labels.clone();

        if let Some(caller) = caller {
            caller.apply(&mut labels);
        }

        if let Some(type_labels) = TypeLabels::from_payload(&payload) {
            type_labels.apply(&mut labels);
        }

        LogEntry {
            severity: Severity::from(level),
            payload,
            labels,
            timestamp: Utc::now(),
        }
    }
}

fn decode_payload(message: &str) -> serde_json::Map<String, serde_json::Value> {
    serde_json::from_str(message).unwrap_or_default()
}
