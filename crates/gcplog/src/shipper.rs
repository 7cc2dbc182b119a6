use crate::connection::{Connector, Sink};
use crate::entry::LogEntry;
use crate::error::Error;
use crate::request::LogTarget;

use std::sync::mpsc as sync_mpsc;
use tokio::sync::mpsc as async_mpsc;
use tokio::sync::mpsc::error::TrySendError;

use google_logging2::api::{MonitoredResource, WriteLogEntriesRequest};

use chrono::{DateTime, TimeDelta, Utc};

use reqwest::{Client, Response};
use serde::Deserialize;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const ENTRIES_WRITE_URL: &str = "https://logging.googleapis.com/v2/entries:write";
const USER_AGENT: &str = concat!("slog-gcplog/", env!("CARGO_PKG_VERSION"));

const CHANNEL_CAPACITY: usize = 10_000;
// Entries merged into a single entries:write call
const MAX_BATCH: usize = 1_000;
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const TOKEN_RENEW_MARGIN_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Token caching
#[derive(Default)]
struct Token {
    token: Option<String>,
    renew_after: DateTime<Utc>,
}

async fn get_error_response(response: Response, context: String) -> Error {
    let status = response.status();

    let body = match response.bytes().await {
        Ok(bytes) => match serde_json::from_slice::<String>(&bytes) {
            Ok(json) => json,
            Err(_) => String::from_utf8_lossy(&bytes).to_string(),
        },
        Err(e) => format!("could not decode body of HTTP Error response: {e}"),
    };

    Error::HttpResponseError {
        context,
        status,
        body,
    }
}

impl Token {
    fn renew_after_from_expires_in(expires_in: u64) -> DateTime<Utc> {
        let renew_after =
            TimeDelta::seconds(expires_in.saturating_sub(TOKEN_RENEW_MARGIN_SECS) as i64);
        Utc::now() + renew_after
    }

    async fn fetch_access_token(&mut self, client: &Client, url: &str) -> Result<String, Error> {
        if let Some(token) = &self.token {
            if Utc::now() < self.renew_after {
                return Ok(token.clone());
            }
        }

        let response = client
            .get(url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| Error::ShipperReqwestError {
                context: "performing HTTP GET token credentials from metadata server".to_string(),
                source: e,
            })?;

        if !response.status().is_success() {
            return Err(get_error_response(response, "fetching token".to_string()).await);
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::ShipperReqwestError {
                context: "consuming response body of access token request".to_string(),
                source: e,
            })?;
        let token_data: TokenResponse =
            serde_json::from_str(&body).map_err(|e| Error::ShipperSerializeError {
                context: "deserializing token data".to_string(),
                source: e,
            })?;

        self.renew_after = Self::renew_after_from_expires_in(token_data.expires_in);
        self.token = Some(token_data.access_token.clone());
        Ok(token_data.access_token)
    }
}

enum Command {
    Write(WriteLogEntriesRequest),
    Flush(sync_mpsc::SyncSender<()>),
}

/// Connects a hook to the Google Cloud Logging API.
///
/// Credentials come from the GCE metadata server, so this works out of the box on GCE, GKE
/// and Cloud Run. Connecting starts a background thread that owns a single-threaded tokio
/// runtime. Entries queued while a call is in flight go out together in the next
/// `entries:write` call. The first access token is fetched while connecting: if that fails
/// the connection fails.
pub struct GoogleConnector {
    resource: MonitoredResource,
    token_url: String,
    write_url: String,
    timeout: Duration,
}

impl GoogleConnector {
    pub fn new(resource: MonitoredResource) -> Self {
        GoogleConnector {
            resource,
            token_url: METADATA_TOKEN_URL.to_string(),
            write_url: ENTRIES_WRITE_URL.to_string(),
            timeout: REQUEST_TIMEOUT,
        }
    }

    /// Points the connector at other token and `entries:write` endpoints.
    #[must_use]
    pub fn with_endpoints(self, token_url: &str, write_url: &str) -> Self {
        GoogleConnector {
            token_url: token_url.to_string(),
            write_url: write_url.to_string(),
            ..self
        }
    }

    /// Limits how long a single token or `entries:write` request may take. Defaults to 30s.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        GoogleConnector { timeout, ..self }
    }
}

impl Connector for GoogleConnector {
    fn connect(&self, project_id: &str, log_name: &str) -> Result<Arc<dyn Sink>, Error> {
        if project_id.is_empty() {
            return Err(Error::ConnectError {
                project_id: project_id.to_string(),
                log_name: log_name.to_string(),
                reason: "no project id configured".to_string(),
            });
        }

        let (ready_tx, ready_rx) = sync_mpsc::sync_channel::<Result<(), Error>>(1);
        let (async_tx, async_rx) = async_mpsc::channel::<Command>(CHANNEL_CAPACITY);
        let token_url = self.token_url.clone();
        let write_url = self.write_url.clone();
        let timeout = self.timeout;

        // The runtime lives on its own thread so connecting works from inside another runtime
        thread::Builder::new()
            .name("gcplog-shipper".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(Error::ShipperStartError(e)));
                        return;
                    }
                };
                runtime.block_on(Shipper::start(
                    token_url, write_url, timeout, async_rx, ready_tx,
                ));
            })
            .map_err(Error::ShipperStartError)?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Arc::new(ShipperSink {
                target: LogTarget::new(project_id, log_name, self.resource.clone()),
                async_tx,
            })),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::ConnectError {
                project_id: project_id.to_string(),
                log_name: log_name.to_string(),
                reason: "the log shipper stopped before it was ready".to_string(),
            }),
        }
    }
}

struct ShipperSink {
    target: LogTarget,
    async_tx: async_mpsc::Sender<Command>,
}

impl Sink for ShipperSink {
    fn log(&self, entry: LogEntry) {
        match self
            .async_tx
            .try_send(Command::Write(self.target.request(entry)))
        {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => {
                eprintln!(
                    "Log shipper for {} is falling behind, dropping log entry",
                    self.target.log_name()
                );
            }
        }
    }

    fn flush(&self) {
        let deadline = Instant::now() + FLUSH_TIMEOUT;
        let (ack_tx, ack_rx) = sync_mpsc::sync_channel::<()>(1);
        let mut command = Command::Flush(ack_tx);

        loop {
            match self.async_tx.try_send(command) {
                Ok(()) => break,
                Err(TrySendError::Closed(_)) => return,
                Err(TrySendError::Full(returned)) => {
                    if Instant::now() >= deadline {
                        return;
                    }
                    command = returned;
                    thread::sleep(Duration::from_millis(10));
                }
            }
        }

        let _ = ack_rx.recv_timeout(deadline.saturating_duration_since(Instant::now()));
    }
}

/// Sends the log entries to the Google Logging API
struct Shipper {
    client: Client,
    token: Token,
    token_url: String,
    write_url: String,
    async_rx: async_mpsc::Receiver<Command>,
}

impl Shipper {
    /// Fetches the first token, reports the outcome on `ready` and, when that worked,
    /// ships until every sender is gone.
    async fn start(
        token_url: String,
        write_url: String,
        timeout: Duration,
        async_rx: async_mpsc::Receiver<Command>,
        ready: sync_mpsc::SyncSender<Result<(), Error>>,
    ) {
        let client = match Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                let _ = ready.send(Err(e.into()));
                return;
            }
        };
        let mut shipper = Shipper {
            client,
            token: Token::default(),
            token_url,
            write_url,
            async_rx,
        };

        if let Err(e) = shipper
            .token
            .fetch_access_token(&shipper.client, &shipper.token_url)
            .await
        {
            let _ = ready.send(Err(e));
            return;
        }
        if ready.send(Ok(())).is_err() {
            return;
        }
        shipper.run_log_shipper().await;
    }

    async fn send_log_entries(
        &self,
        token: &str,
        body: WriteLogEntriesRequest,
    ) -> Result<(), Error> {
        let response = self
            .client
            .post(&self.write_url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::ShipperReqwestError {
                context: "performing HTTP POST request to the Google Logging API".to_string(),
                source: e,
            })?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(get_error_response(
                response,
                "response when sending log entries to Google Logging API".to_string(),
            )
            .await)
        }
    }

    async fn ship(&mut self, batch: WriteLogEntriesRequest) {
        match self
            .token
            .fetch_access_token(&self.client, &self.token_url)
            .await
        {
            Ok(token) => {
                if let Err(e) = self.send_log_entries(&token, batch).await {
                    eprintln!("Failed to send log entries: {}", e);
                }
            }
            Err(e) => {
                eprintln!("Failed to fetch access token: {}", e);
            }
        }
    }

    /// Receives commands until every sender is gone. Writes that are already queued are
    /// merged into one request, flush markers are acknowledged once that request is done.
    async fn run_log_shipper(mut self) {
        let mut commands = Vec::with_capacity(MAX_BATCH);
        while self.async_rx.recv_many(&mut commands, MAX_BATCH).await > 0 {
            let mut batch: Option<WriteLogEntriesRequest> = None;
            let mut acks = Vec::new();

            for command in commands.drain(..) {
                match command {
                    Command::Write(request) => match &mut batch {
                        Some(batch) => batch
                            .entries
                            .get_or_insert_with(Vec::new)
                            .extend(request.entries.unwrap_or_default()),
                        None => batch = Some(request),
                    },
                    Command::Flush(ack) => acks.push(ack),
                }
            }

            if let Some(batch) = batch {
                self.ship(batch).await;
            }
            for ack in acks {
                let _ = ack.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{GoogleConnector, Token, TokenResponse};
    use crate::args;
    use crate::connection::Connector;
    use crate::hook::{Builder, LoggerHook};

    use chrono::{TimeDelta, Utc};
    use google_logging2::api::MonitoredResource;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    type Recorded = Arc<Mutex<Vec<(String, serde_json::Value)>>>;

    /// A stand-in for the metadata server and the logging API on a local port.
    /// Answers one request per connection and records every POST body.
    fn fake_google(token_status: u16) -> (String, Recorded) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let recorded: Recorded = Arc::default();
        let writes = Arc::clone(&recorded);

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let Some((head, body)) = read_request(&mut stream) else {
                    continue;
                };
                let (status, response) = if head.starts_with("get /token") {
                    if token_status == 200 {
                        (
                            200,
                            r#"{"access_token":"secret","expires_in":3600,"token_type":"Bearer"}"#
                                .to_string(),
                        )
                    } else {
                        (token_status, r#""no service account""#.to_string())
                    }
                } else {
                    writes
                        .lock()
                        .unwrap()
                        .push((head, serde_json::from_slice(&body).unwrap()));
                    (200, "{}".to_string())
                };
                let reply = format!(
                    "HTTP/1.1 {status} Fake\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{response}",
                    response.len()
                );
                let _ = stream.write_all(reply.as_bytes());
            }
        });

        (base, recorded)
    }

    // Returns the lowercased request head and the raw body
    fn read_request(stream: &mut TcpStream) -> Option<(String, Vec<u8>)> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            let n = stream.read(&mut chunk).ok()?;
            if n == 0 {
                return None;
            }
            buf.extend_from_slice(&chunk[..n]);
        };
        let head = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
        let length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buf.len() < header_end + length {
            let n = stream.read(&mut chunk).ok()?;
            if n == 0 {
                return None;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        Some((head, buf[header_end..header_end + length].to_vec()))
    }

    fn connector(base: &str) -> GoogleConnector {
        GoogleConnector::new(MonitoredResource {
            type_: Some("global".to_string()),
            ..Default::default()
        })
        .with_endpoints(&format!("{base}/token"), &format!("{base}/write"))
    }

    #[test]
    fn token_is_renewed_a_minute_early() {
        let renew_after = Token::renew_after_from_expires_in(3600);
        let expected = Utc::now() + TimeDelta::seconds(3540);
        assert!((renew_after - expected).num_seconds().abs() <= 1);
    }

    #[test]
    fn short_lived_token_is_renewed_right_away() {
        assert!(Token::renew_after_from_expires_in(30) <= Utc::now());
    }

    #[test]
    fn parses_metadata_token_response() {
        let token: TokenResponse = serde_json::from_str(
            r#"{"access_token":"ya29.abc","expires_in":3599,"token_type":"Bearer"}"#,
        )
        .unwrap();
        assert_eq!(token.access_token, "ya29.abc");
        assert_eq!(token.expires_in, 3599);

        assert!(serde_json::from_str::<TokenResponse>(r#"{"expires_in":3599}"#).is_err());
    }

    #[test]
    fn empty_project_id_fails_to_connect() {
        let (base, _) = fake_google(200);
        assert!(connector(&base).connect("", "log").is_err());
    }

    #[test]
    fn token_failure_fails_to_connect() {
        let (base, recorded) = fake_google(404);
        assert!(connector(&base).connect("project", "log").is_err());
        assert!(recorded.lock().unwrap().is_empty());
    }

    #[test]
    fn ships_entries_with_bearer_token() {
        let (base, recorded) = fake_google(200);
        let hook = Builder::new("project", "app/requests")
            .with_service("svc")
            .build_with_connector(connector(&base));

        hook.info(args!(r#"{"type":"web:Router.route","path":"/"}"#));
        assert!(hook.is_connected());
        hook.flush();

        let writes = recorded.lock().unwrap();
        assert_eq!(writes.len(), 1);
        let (head, body) = &writes[0];
        assert!(head.starts_with("post /write"));
        assert!(head.contains("authorization: bearer secret"));
        assert_eq!(body["logName"], "projects/project/logs/app%2Frequests");
        let entry = &body["entries"][0];
        assert_eq!(entry["severity"], "INFO");
        assert_eq!(
            entry["jsonPayload"],
            json!({"type": "web:Router.route", "path": "/"})
        );
        assert_eq!(entry["labels"]["service"], "svc");
        assert_eq!(entry["labels"]["log_package"], "web");
        assert_eq!(entry["resource"]["type"], "global");
    }

    #[test]
    fn queued_entries_are_shipped_together() {
        let (base, recorded) = fake_google(200);
        let hook = Builder::new("project", "burst").build_with_connector(connector(&base));

        for n in 0..300 {
            hook.info(args!(r#"{"line":%d}"#, n));
        }
        hook.flush();

        let writes = recorded.lock().unwrap();
        let lines: Vec<u64> = writes
            .iter()
            .flat_map(|(_, body)| body["entries"].as_array().cloned().unwrap_or_default())
            .map(|entry| entry["jsonPayload"]["line"].as_u64().unwrap())
            .collect();
        assert_eq!(lines, (0..300).collect::<Vec<u64>>());
        assert!(writes.len() < 300);
        for (_, body) in writes.iter() {
            assert_eq!(body["logName"], "projects/project/logs/burst");
        }
    }

    #[test]
    fn unresponsive_metadata_server_fails_to_connect() {
        // Connections queue up in the backlog but nothing ever answers
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let started = Instant::now();
        let result = connector(&base)
            .with_timeout(Duration::from_millis(200))
            .connect("project", "log");

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(10));
        drop(listener);
    }
}
