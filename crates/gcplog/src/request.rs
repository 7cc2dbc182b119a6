use crate::entry::LogEntry;

use google_logging2::api::{LogEntry as ApiLogEntry, MonitoredResource, WriteLogEntriesRequest};

use std::collections::HashMap;

/// Where entries are written: the full log name and the monitored resource.
#[derive(Clone, Debug)]
pub(crate) struct LogTarget {
    log_name: String,
    resource: MonitoredResource,
}

impl LogTarget {
    pub(crate) fn new(project_id: &str, log_name: &str, resource: MonitoredResource) -> Self {
        // https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry: the log id
        // must be URL-encoded within the log name
        LogTarget {
            log_name: format!(
                "projects/{}/logs/{}",
                project_id,
                log_name.replace('/', "%2F")
            ),
            resource,
        }
    }

    pub(crate) fn log_name(&self) -> &str {
        &self.log_name
    }

    /// Wraps a single entry in a [`WriteLogEntries`](https://cloud.google.com/logging/docs/reference/v2/rpc/google.logging.v2#google.logging.v2.LoggingServiceV2.WriteLogEntries) request.
    pub(crate) fn request(&self, entry: LogEntry) -> WriteLogEntriesRequest {
        let json_payload: HashMap<String, serde_json::Value> = entry.payload.into_iter().collect();

        let log_entry = ApiLogEntry {
            json_payload: Some(json_payload),
            labels: Some(entry.labels),
            severity: Some(entry.severity.as_str().to_string()),
            timestamp: Some(entry.timestamp),
            resource: Some(self.resource.clone()),
            ..Default::default()
        };

        WriteLogEntriesRequest {
            log_name: Some(self.log_name.clone()),
            entries: Some(vec![log_entry]),
            ..Default::default()
        }
    }
}
