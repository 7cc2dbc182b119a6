//! A logging hook and [`slog::Drain`](https://slog-rs.github.io/slog/slog/trait.Drain.html) for [Google Cloud Logging](https://cloud.google.com/logging).
//!
//! # Usage
//!
//! Configure a [`Hook`](hook::Hook) with the [`Builder`](hook::Builder) and log through the
//! [`LoggerHook`](hook::LoggerHook) methods, their [`CallerLoggerHook`](hook::CallerLoggerHook)
//! counterparts, or by making the hook the drain of a `slog::Logger`.
//!
//! ```
//! use slog_gcplog::{args, Builder, Level, LoggerHook};
//!
//! let (hook, requests) = Builder::new("my-project", "my-log")
//!     .with_service("billing")
//!     .with_level(Level::Debug)
//!     .build_with_channel();
//!
//! hook.info(args!(r#"{"type":"billing:Invoice.send#render","invoice":42}"#));
//!
//! let request = requests.try_recv().unwrap();
//! assert_eq!(request.log_name.as_deref(), Some("projects/my-project/logs/my-log"));
//! ```
//!
//! Every entry carries the hook's static labels (`logProject`, `environment`, `codeVersion`,
//! `service`, `serverRoot`). When a message is a JSON object it becomes the entry's payload,
//! and a `"type"` field in the form `package:Class.method#section!action` is broken down into
//! `log_*` labels.
//!
//! The log stream is opened lazily on the first delivered call. If that fails, the failure is
//! printed to stderr once and the hook drops everything from then on. Logging never returns an
//! error to the caller.
//!
//! Depending on how the entries should reach Google, pick one of the build methods:
//!
//! 1. [`build()`](hook::Builder::build): ships to the Google Logging API from a background
//!    thread, authenticating through the metadata server. (Requires the `shipper` feature.)
//! 2. [`build_with_channel()`](hook::Builder::build_with_channel): hands
//!    [`WriteLogEntries`](https://cloud.google.com/logging/docs/reference/v2/rpc/google.logging.v2#google.logging.v2.LoggingServiceV2.WriteLogEntries)
//!    requests over a channel and leaves transport to you.
//! 3. [`build_with_connector()`](hook::Builder::build_with_connector): plugs in your own
//!    [`Connector`](connection::Connector).

/// A connector that delivers requests over a channel
pub mod channel;

/// The connection state machine and the connector/sink seams
pub mod connection;

/// Log entries and their labels
pub mod entry;

/// gcplog Error types
pub mod error;

/// printf-style formatting of log arguments
pub mod format;

/// The hook and its slog Drain implementation
pub mod hook;

/// Labels derived from a payload's type field
pub mod labels;

/// Hook levels and Cloud Logging severities
pub mod level;

mod request;

/// An optional background process that ships the entries for you
#[cfg(feature = "shipper")]
pub mod shipper;

pub use channel::ChannelConnector;
pub use connection::{Connector, Sink};
pub use entry::{Caller, LogEntry};
pub use error::Error;
pub use format::{log_string, sprintf, Arg};
pub use hook::{Builder, CallerLoggerHook, Hook, HookConfig, LoggerHook};
pub use level::{Level, Severity};
