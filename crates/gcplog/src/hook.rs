use crate::channel::ChannelConnector;
use crate::connection::{Connection, Connector, Sink};
use crate::entry::{self, Caller, LogEntry};
use crate::error::Error;
use crate::format::{log_string, Arg};
use crate::level::Level;

#[cfg(feature = "shipper")]
use crate::shipper::GoogleConnector;

use google_logging2::api::{MonitoredResource, WriteLogEntriesRequest};
use slog::{Drain, Key, Never, OwnedKVList, Record, KV};

use std::collections::HashMap;
use std::fmt;
use std::fmt::Write;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

/// Builder for the [`Hook`]
#[derive(Default, Debug)]
pub struct Builder {
    project_id: String,
    log_name: String,
    environment: String,
    code_version: String,
    service: String,
    server_root: String,
    level: Level,
    resource_type: String,
    resource_labels: Option<HashMap<String, String>>,
}

/// The settings of a [`Hook`], fixed once the hook is built.
#[derive(Clone, Debug)]
pub struct HookConfig {
    pub project_id: String,
    pub log_name: String,
    pub environment: String,
    pub code_version: String,
    pub service: String,
    pub server_root: String,
    /// The most verbose level that is still shipped.
    pub level: Level,
    pub resource: MonitoredResource,
    static_labels: HashMap<String, String>,
}

impl HookConfig {
    /// The labels every entry starts out with.
    pub fn static_labels(&self) -> &HashMap<String, String> {
        &self.static_labels
    }
}

impl Builder {
    /// Creates a Builder object.
    ///
    /// # Parameters
    /// - `project_id`: The Google Cloud project that receives the log entries.
    /// - `log_name`: The log stream within the project, e.g. `my-service`. It also ends up in
    ///   the `logProject` label of every entry.
    ///
    /// The minimum level defaults to `Info` and the monitored resource to `global`.
    ///
    /// # Example
    ///
    /// ```
    /// use slog_gcplog::hook::Builder;
    /// use slog_gcplog::Level;
    /// let (hook, _) = Builder::new("my-gcp-project", "my-log-id")
    ///     .with_environment("production")
    ///     .with_level(Level::Debug)
    ///     .build_with_channel();
    /// ```
    #[must_use = "The builder must be used"]
    pub fn new(project_id: &str, log_name: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            log_name: log_name.to_string(),
            resource_type: "global".to_string(),
            ..Default::default()
        }
    }

    /// Sets the `environment` label, e.g. `production`.
    #[must_use = "The builder must be used"]
    pub fn with_environment(self, environment: &str) -> Self {
        Self {
            environment: environment.to_string(),
            ..self
        }
    }

    /// Sets the `codeVersion` label.
    #[must_use = "The builder must be used"]
    pub fn with_code_version(self, code_version: &str) -> Self {
        Self {
            code_version: code_version.to_string(),
            ..self
        }
    }

    /// Sets the `service` label.
    #[must_use = "The builder must be used"]
    pub fn with_service(self, service: &str) -> Self {
        Self {
            service: service.to_string(),
            ..self
        }
    }

    /// Sets the `serverRoot` label.
    #[must_use = "The builder must be used"]
    pub fn with_server_root(self, server_root: &str) -> Self {
        Self {
            server_root: server_root.to_string(),
            ..self
        }
    }

    /// Sets the most verbose level that is still shipped. More verbose calls return
    /// immediately, without formatting their message.
    #[must_use = "The builder must be used"]
    pub fn with_level(self, level: Level) -> Self {
        Self { level, ..self }
    }

    /// Sets the `type` of the [MonitoredResource](https://cloud.google.com/logging/docs/reference/v2/rest/v2/MonitoredResource)
    /// the entries are written for, for example `k8s_container`.
    #[must_use = "The builder must be used"]
    pub fn with_resource_type(self, resource_type: &str) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            ..self
        }
    }

    /// Sets resource labels to be applied.
    ///
    /// These labels populate the `labels` field of the monitored resource. Without them the
    /// resource carries only the `project_id`.
    ///
    /// # Example
    ///
    /// ```
    /// use serde_json::json;
    /// use slog_gcplog::hook::Builder;
    ///
    /// let resource_labels = json!(
    /// {
    ///     "location": "europe-west1-b",
    ///     "container_name": "my-app",
    ///     "project_id": "my-gcp-project",
    ///     "cluster_name": "my-gke-cluster",
    ///     "namespace_name": "my-gke-namespace"
    /// });
    ///
    /// let (hook, _) = Builder::new("my-gcp-project", "my-log-id")
    ///     .with_resource_type("k8s_container")
    ///     .with_resource_labels(resource_labels)
    ///     .unwrap()
    ///     .build_with_channel();
    /// ```
    ///
    /// # Errors
    ///
    /// Will return `Err` if `labels` is not an object of strings.
    pub fn with_resource_labels(self, labels: serde_json::Value) -> Result<Self, Error> {
        Ok(Self {
            resource_labels: Some(
                serde_json::from_value(labels).map_err(Error::ResourceLabelsError)?,
            ),
            ..self
        })
    }

    fn config(self) -> HookConfig {
        let static_labels = HashMap::from([
            (entry::LOG_PROJECT.to_string(), self.log_name.clone()),
            (entry::ENVIRONMENT.to_string(), self.environment.clone()),
            (entry::CODE_VERSION.to_string(), self.code_version.clone()),
            (entry::SERVICE.to_string(), self.service.clone()),
            (entry::SERVER_ROOT.to_string(), self.server_root.clone()),
        ]);
        let resource_labels = self.resource_labels.unwrap_or_else(|| {
            HashMap::from([("project_id".to_string(), self.project_id.clone())])
        });

        HookConfig {
            project_id: self.project_id,
            log_name: self.log_name,
            environment: self.environment,
            code_version: self.code_version,
            service: self.service,
            server_root: self.server_root,
            level: self.level,
            resource: MonitoredResource {
                type_: Some(self.resource_type),
                labels: Some(resource_labels),
            },
            static_labels,
        }
    }

    /// Builds a hook that opens its log stream through `connector` on first use.
    #[must_use = "The hook must be used to handle logging correctly"]
    pub fn build_with_connector<C: Connector + 'static>(self, connector: C) -> Hook {
        Hook {
            config: self.config(),
            connector: Box::new(connector),
            connection: Connection::new(),
        }
    }

    /// This returns a tuple with a [`Hook`] and a [`std::sync::mpsc::Receiver`] channel.
    /// The hook sends the [`WriteLogEntries`](https://cloud.google.com/logging/docs/reference/v2/rpc/google.logging.v2#google.logging.v2.LoggingServiceV2.WriteLogEntries)
    /// requests it creates to this channel.
    ///
    /// For instance you could output these to the console, if you have an external agent that
    /// reads the process' output and ships it to Google Logging.
    #[must_use = "The hook and receiver must be used to handle logging correctly"]
    pub fn build_with_channel(self) -> (Hook, Receiver<WriteLogEntriesRequest>) {
        let config = self.config();
        let (connector, rx) = ChannelConnector::new(config.resource.clone());
        (
            Hook {
                config,
                connector: Box::new(connector),
                connection: Connection::new(),
            },
            rx,
        )
    }

    /// Builds a hook that writes to the [Google Logging API](https://cloud.google.com/logging/docs/reference/v2/rest)
    /// from a background shipper thread, started on first use.
    ///
    /// Credentials come from the metadata server, so this only works in the context of
    /// [workload identity](https://cloud.google.com/iam/docs/workload-identity-federation).
    #[cfg(feature = "shipper")]
    #[must_use = "The hook must be used to handle logging correctly"]
    pub fn build(self) -> Hook {
        let config = self.config();
        let connector = GoogleConnector::new(config.resource.clone());
        Hook {
            config,
            connector: Box::new(connector),
            connection: Connection::new(),
        }
    }
}

/// The basic hook contract: one entry point per level.
pub trait LoggerHook {
    fn trace(&self, args: &[Arg]);
    fn debug(&self, args: &[Arg]);
    fn info(&self, args: &[Arg]);
    fn warn(&self, args: &[Arg]);
    fn error(&self, args: &[Arg]);
}

/// The hook contract for callers that know where the call came from.
pub trait CallerLoggerHook: LoggerHook {
    fn trace_with_caller(&self, caller: &Caller<'_>, args: &[Arg]);
    fn debug_with_caller(&self, caller: &Caller<'_>, args: &[Arg]);
    fn info_with_caller(&self, caller: &Caller<'_>, args: &[Arg]);
    fn warn_with_caller(&self, caller: &Caller<'_>, args: &[Arg]);
    fn error_with_caller(&self, caller: &Caller<'_>, args: &[Arg]);
}

/// Ships log calls to Google Cloud Logging.
///
/// None of the logging methods return an error or panic on a backend problem: logging must not
/// break the application. The log stream is opened on the first call that passes the level
/// filter. If that fails, the error is printed to stderr once and every later call is dropped.
pub struct Hook {
    config: HookConfig,
    connector: Box<dyn Connector>,
    connection: Connection,
}

impl Hook {
    pub fn config(&self) -> &HookConfig {
        &self.config
    }

    /// True once the log stream has been opened successfully.
    pub fn is_connected(&self) -> bool {
        self.connection.current().is_some()
    }

    /// Sends an already formatted message. Skips the level filter, the entry points apply it.
    pub fn send(&self, level: Level, caller: Option<&Caller<'_>>, message: &str) {
        self.dispatch(level, caller, message, None);
    }

    /// Waits for the sink to deliver what it was handed. Does nothing when not connected.
    pub fn flush(&self) {
        if let Some(sink) = self.connection.current() {
            sink.flush();
        }
    }

    fn sink(&self) -> Option<Arc<dyn Sink>> {
        self.connection.get_or_connect(|| {
            match self
                .connector
                .connect(&self.config.project_id, &self.config.log_name)
            {
                Ok(sink) => Some(sink),
                Err(e) => {
                    eprintln!("Google Cloud Logging is unavailable, log entries will be dropped: {e}");
                    None
                }
            }
        })
    }

    fn dispatch(
        &self,
        level: Level,
        caller: Option<&Caller<'_>>,
        message: &str,
        extra_labels: Option<HashMap<String, String>>,
    ) {
        let Some(sink) = self.sink() else {
            return;
        };

        let mut log_entry = LogEntry::new(level, &self.config.static_labels, caller, message);
        if let Some(extra_labels) = extra_labels {
            for (key, value) in extra_labels {
                log_entry.labels.entry(key).or_insert(value);
            }
        }
        sink.log(log_entry);
    }

    #[inline]
    fn enabled(&self, level: Level) -> bool {
        level.is_at_least(self.config.level)
    }

    fn log_args(&self, level: Level, caller: Option<&Caller<'_>>, args: &[Arg]) {
        if !self.enabled(level) {
            return;
        }
        self.send(level, caller, &log_string(args));
    }
}

impl LoggerHook for Hook {
    fn trace(&self, args: &[Arg]) {
        self.log_args(Level::Trace, None, args);
    }

    fn debug(&self, args: &[Arg]) {
        self.log_args(Level::Debug, None, args);
    }

    fn info(&self, args: &[Arg]) {
        self.log_args(Level::Info, None, args);
    }

    fn warn(&self, args: &[Arg]) {
        self.log_args(Level::Warn, None, args);
    }

    fn error(&self, args: &[Arg]) {
        self.log_args(Level::Error, None, args);
    }
}

impl CallerLoggerHook for Hook {
    fn trace_with_caller(&self, caller: &Caller<'_>, args: &[Arg]) {
        self.log_args(Level::Trace, Some(caller), args);
    }

    fn debug_with_caller(&self, caller: &Caller<'_>, args: &[Arg]) {
        self.log_args(Level::Debug, Some(caller), args);
    }

    fn info_with_caller(&self, caller: &Caller<'_>, args: &[Arg]) {
        self.log_args(Level::Info, Some(caller), args);
    }

    fn warn_with_caller(&self, caller: &Caller<'_>, args: &[Arg]) {
        self.log_args(Level::Warn, Some(caller), args);
    }

    fn error_with_caller(&self, caller: &Caller<'_>, args: &[Arg]) {
        self.log_args(Level::Error, Some(caller), args);
    }
}

// Collects the key/value pairs of a slog record as extra labels
#[derive(Debug)]
struct Serializer {
    map: HashMap<String, String>,
}

impl Serializer {
    fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }
}

impl slog::Serializer for Serializer {
    fn emit_arguments(&mut self, key: Key, val: &fmt::Arguments) -> slog::Result {
        let mut value = String::new();
        write!(value, "{val}")?;
        self.map.insert(key.into(), value);
        Ok(())
    }
}

impl Drain for Hook {
    type Ok = ();
    type Err = Never;

    fn log(&self, record: &Record<'_>, values: &OwnedKVList) -> Result<Self::Ok, Self::Err> {
        let level = Level::from(record.level());
        if !self.enabled(level) {
            return Ok(());
        }

        let mut serializer = Serializer::new();
        let _ = record.kv().serialize(record, &mut serializer);
        let _ = values.serialize(record, &mut serializer);

        let function = match record.function() {
            "" => record.module(),
            function => function,
        };
        let caller = Caller::new(function, record.file(), record.line());

        self.dispatch(
            level,
            Some(&caller),
            format!("{}", record.msg()).as_str(),
            Some(serializer.map),
        );
        Ok(())
    }

    #[inline]
    fn is_enabled(&self, level: slog::Level) -> bool {
        self.enabled(Level::from(level))
    }
}
