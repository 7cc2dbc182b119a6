use crate::entry::LogEntry;
use crate::error::Error;

use std::panic::{RefUnwindSafe, UnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// An open log stream in the logging backend.
///
/// `log` is fire-and-forget: buffering, batching and delivery are up to the implementation.
pub trait Sink: Send + Sync {
    fn log(&self, entry: LogEntry);

    /// Blocks until entries handed to `log` so far have been delivered or dropped.
    fn flush(&self) {}
}

/// Opens the [`Sink`] for a log stream. A hook calls this at most once in its lifetime.
///
/// The unwind safety bounds let a hook be the root drain of a `slog::Logger`.
pub trait Connector: Send + Sync + RefUnwindSafe + UnwindSafe {
    fn connect(&self, project_id: &str, log_name: &str) -> Result<Arc<dyn Sink>, Error>;
}

enum State {
    Uninitialized,
    Initializing,
    Ready(Arc<dyn Sink>),
    Failed,
}

/// One-shot, lazily initialized connection.
///
/// The first caller of [`get_or_connect`](Connection::get_or_connect) runs the connect
/// function, without holding the lock. Callers arriving in the meantime wait on the condvar
/// until it settles, so every caller sees the same `Ready` or `Failed` outcome. Neither
/// outcome is ever revisited.
pub(crate) struct Connection {
    state: Mutex<State>,
    settled: Condvar,
}

impl Connection {
    pub(crate) fn new() -> Self {
        Connection {
            state: Mutex::new(State::Uninitialized),
            settled: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the sink, running `connect` if nobody has tried yet. `None` means the
    /// connection failed, now or earlier.
    pub(crate) fn get_or_connect<F>(&self, connect: F) -> Option<Arc<dyn Sink>>
    where
        F: FnOnce() -> Option<Arc<dyn Sink>>,
    {
        let mut state = self.lock();
        loop {
            match &*state {
                State::Ready(sink) => return Some(Arc::clone(sink)),
                State::Failed => return None,
                State::Uninitialized => break,
                State::Initializing => {}
            }
            state = self
                .settled
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *state = State::Initializing;
        drop(state);

        let mut guard = SettleOnUnwind {
            connection: self,
            armed: true,
        };
        let sink = connect();
        guard.armed = false;

        self.settle(match &sink {
            Some(sink) => State::Ready(Arc::clone(sink)),
            None => State::Failed,
        });
        sink
    }

    /// The sink if the connection is up, without ever connecting.
    pub(crate) fn current(&self) -> Option<Arc<dyn Sink>> {
        match &*self.lock() {
            State::Ready(sink) => Some(Arc::clone(sink)),
            _ => None,
        }
    }

    fn settle(&self, outcome: State) {
        *self.lock() = outcome;
        self.settled.notify_all();
    }
}

// A panicking connect function counts as a failed connection, waiters must not hang
struct SettleOnUnwind<'a> {
    connection: &'a Connection,
    armed: bool,
}

impl Drop for SettleOnUnwind<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.connection.settle(State::Failed);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{Connector, Sink};
    use crate::entry::LogEntry;
    use crate::error::Error;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Records every entry it receives.
    #[derive(Default)]
    pub(crate) struct SpySink {
        pub(crate) entries: Mutex<Vec<LogEntry>>,
        pub(crate) flushes: AtomicUsize,
    }

    impl SpySink {
        pub(crate) fn count(&self) -> usize {
            self.entries.lock().unwrap().len()
        }

        pub(crate) fn last(&self) -> LogEntry {
            self.entries.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl Sink for SpySink {
        fn log(&self, entry: LogEntry) {
            self.entries.lock().unwrap().push(entry);
        }

        fn flush(&self) {
            self.flushes.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Hands out a shared [`SpySink`], counting connection attempts. Optionally fails or
    /// dawdles to widen the window for concurrent first calls.
    pub(crate) struct CountingConnector {
        pub(crate) sink: Arc<SpySink>,
        pub(crate) attempts: Arc<AtomicUsize>,
        pub(crate) fail: bool,
        pub(crate) delay: Duration,
    }

    impl CountingConnector {
        pub(crate) fn new() -> Self {
            CountingConnector {
                sink: Arc::new(SpySink::default()),
                attempts: Arc::new(AtomicUsize::new(0)),
                fail: false,
                delay: Duration::ZERO,
            }
        }

        pub(crate) fn failing() -> Self {
            CountingConnector {
                fail: true,
                ..Self::new()
            }
        }

        pub(crate) fn slow(delay: Duration) -> Self {
            CountingConnector {
                delay,
                ..Self::new()
            }
        }
    }

    impl Connector for CountingConnector {
        fn connect(&self, project_id: &str, log_name: &str) -> Result<Arc<dyn Sink>, Error> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            if self.fail {
                return Err(Error::ConnectError {
                    project_id: project_id.to_string(),
                    log_name: log_name.to_string(),
                    reason: "no credentials".to_string(),
                });
            }
            let sink: Arc<dyn Sink> = self.sink.clone();
            Ok(sink)
        }
    }
}
