use crate::connection::{Connector, Sink};
use crate::entry::LogEntry;
use crate::error::Error;
use crate::request::LogTarget;

use google_logging2::api::{MonitoredResource, WriteLogEntriesRequest};

use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};

const CHANNEL_CAPACITY: usize = 100;

/// Hands `WriteLogEntries` requests to a [`Receiver`] instead of shipping them.
///
/// The sender side is taken on connect, so the connector can open exactly one stream.
pub struct ChannelConnector {
    resource: MonitoredResource,
    sync_tx: Mutex<Option<SyncSender<WriteLogEntriesRequest>>>,
}

impl ChannelConnector {
    pub fn new(resource: MonitoredResource) -> (Self, Receiver<WriteLogEntriesRequest>) {
        let (sync_tx, sync_rx) = sync_channel::<WriteLogEntriesRequest>(CHANNEL_CAPACITY);
        (
            ChannelConnector {
                resource,
                sync_tx: Mutex::new(Some(sync_tx)),
            },
            sync_rx,
        )
    }
}

impl Connector for ChannelConnector {
    fn connect(&self, project_id: &str, log_name: &str) -> Result<Arc<dyn Sink>, Error> {
        let connect_error = |reason: &str| Error::ConnectError {
            project_id: project_id.to_string(),
            log_name: log_name.to_string(),
            reason: reason.to_string(),
        };

        if project_id.is_empty() {
            return Err(connect_error("no project id configured"));
        }
        let sync_tx = self
            .sync_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| connect_error("the channel is already in use"))?;

        Ok(Arc::new(ChannelSink {
            target: LogTarget::new(project_id, log_name, self.resource.clone()),
            sync_tx,
        }))
    }
}

struct ChannelSink {
    target: LogTarget,
    sync_tx: SyncSender<WriteLogEntriesRequest>,
}

impl Sink for ChannelSink {
    fn log(&self, entry: LogEntry) {
        // A full or abandoned channel drops the entry, the caller never waits
        match self.sync_tx.try_send(self.target.request(entry)) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => {
                eprintln!(
                    "Log channel for {} is full, dropping log entry",
                    self.target.log_name()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::args;
    use crate::hook::{Builder, LoggerHook};
    use crate::level::Level;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn entries_arrive_as_write_requests() {
        let (hook, rx) = Builder::new("test-project", "test-log")
            .with_service("test-service")
            .build_with_channel();

        hook.info(args!(r#"{"type":"pkg:Struct.Method","data":"jsData"}"#));

        let request = rx.try_recv().unwrap();
        assert_eq!(
            request.log_name.as_deref(),
            Some("projects/test-project/logs/test-log")
        );
        let entries = request.entries.unwrap();
        let entry = &entries[0];
        assert_eq!(entry.severity.as_deref(), Some("INFO"));
        let labels = entry.labels.as_ref().unwrap();
        assert_eq!(labels["service"], "test-service");
        assert_eq!(labels["log_class"], "Struct");
        assert!(hook.is_connected());
    }

    #[test]
    fn requests_serialize_for_the_api() {
        let (hook, rx) = Builder::new("p", "l")
            .with_level(Level::Debug)
            .build_with_channel();
        hook.debug(args!(r#"{"n":1}"#));

        let body = serde_json::to_value(rx.try_recv().unwrap()).unwrap();
        assert_eq!(body["logName"], json!("projects/p/logs/l"));
        assert_eq!(body["entries"][0]["jsonPayload"], json!({"n": 1}));
        assert_eq!(body["entries"][0]["severity"], json!("DEBUG"));
        assert_eq!(body["entries"][0]["resource"]["type"], json!("global"));
    }

    #[test]
    fn missing_project_disables_the_hook() {
        let (hook, rx) = Builder::new("", "l").build_with_channel();
        hook.error(args!("lost"));
        hook.error(args!("lost too"));

        assert!(rx.try_recv().is_err());
        assert!(!hook.is_connected());
    }

    #[test]
    fn dropped_receiver_does_not_disturb_callers() {
        let (hook, rx) = Builder::new("p", "l").build_with_channel();
        drop(rx);
        hook.info(args!("nobody listens"));
        assert!(hook.is_connected());
    }
}
