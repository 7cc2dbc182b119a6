#[cfg(feature = "shipper")]
use reqwest::{self, StatusCode};

/// Errors raised while configuring the hook or connecting it to Google Cloud Logging.
///
/// None of these ever reach a caller of the logging entry points: a failed
/// connection is printed once and the hook goes quiet.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed to read the 'resource_labels' object from the JSON value, is it a flat string map? Parse error: {0}")]
    ResourceLabelsError(serde_json::Error),
    #[error("Connector for project '{project_id}' could not open log '{log_name}': {reason}")]
    ConnectError {
        project_id: String,
        log_name: String,
        reason: String,
    },
    #[error("Could not start the log shipper: {0}")]
    ShipperStartError(#[source] std::io::Error),
    #[cfg(feature = "shipper")]
    #[error("Serde JSON serialization failed with context '{context}'. Error: {source}")]
    ShipperSerializeError {
        context: String,
        source: serde_json::Error,
    },
    #[cfg(feature = "shipper")]
    #[error("Reqwest error with context '{context}'. Error: {source}")]
    ShipperReqwestError {
        context: String,
        source: reqwest::Error,
    },
    #[cfg(feature = "shipper")]
    #[error("unsuccessful HTTP response error with context '{context}'. HTTP status code: '{status}', body: '{body}'")]
    HttpResponseError {
        context: String,
        status: StatusCode,
        body: String,
    },
}

#[cfg(feature = "shipper")]
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::ShipperReqwestError {
            context: "Error sending HTTP request".to_string(),
            source: err,
        }
    }
}
