//! Logging utilities
//!
//! Console logging goes through `env_logger` (configured with `RUST_LOG`).
//! Every record at `info` level or above is also kept in a bounded
//! `LogQueue`, which the Telnet `dmesg` command prints.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use jiff::Timestamp;
use log::{Level, LevelFilter, Log, Metadata, Record};

pub const DEFAULT_LOG_QUEUE_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Increases by one with every message ever queued.
    pub sequence: u64,
    /// Milliseconds since the queue was created.
    pub uptime_millis: u64,
    pub time: Timestamp,
    pub message: String,
}

/// Circular buffer of the most recent log messages. When full the oldest
/// entry is dropped.
pub struct LogQueue {
    capacity: usize,
    started: Instant,
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    entries: VecDeque<LogEntry>,
    next_sequence: u64,
}

impl Default for LogQueue {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_QUEUE_SIZE)
    }
}

impl LogQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            started: Instant::now(),
            state: Mutex::new(QueueState::default()),
        }
    }

    pub fn push(&self, message: impl Into<String>) {
        let uptime_millis = self.started.elapsed().as_millis() as u64;
        let mut state = self.lock();
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        if state.entries.len() == self.capacity {
            state.entries.pop_front();
        }
        state.entries.push_back(LogEntry {
            sequence,
            uptime_millis,
            time: Timestamp::now(),
            message: message.into(),
        });
    }

    /// Snapshot of the queued entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().entries.iter().cloned().collect()
    }

    /// Entries queued after the one numbered `sequence`.
    pub fn entries_after(&self, sequence: u64) -> Vec<LogEntry> {
        self.lock()
            .entries
            .iter()
            .filter(|entry| entry.sequence > sequence)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panic while holding the lock leaves the entries consistent.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Forwards to the console logger and copies messages into the queue.
struct QueueLogger {
    console: env_logger::Logger,
    queue: Arc<LogQueue>,
}

impl Log for QueueLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info || self.console.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if self.console.matches(record) {
            self.console.log(record);
        }
        if record.level() <= Level::Info {
            self.queue
                .push(format!("[{}] {}", short_target(record.target()), record.args()));
        }
    }

    fn flush(&self) {
        self.console.flush();
    }
}

/// Last path segment of a module path target, `lwnet::net::listener`
/// becomes `listener`.
fn short_target(target: &str) -> &str {
    target.rsplit("::").next().unwrap_or(target)
}

/// Installs the logger. Console output honours `RUST_LOG`; the queue always
/// receives `info` and above.
pub fn init(queue: Arc<LogQueue>) -> Result<(), log::SetLoggerError> {
    let console = env_logger::Builder::from_default_env().build();
    let max_level = console.filter().max(LevelFilter::Info);
    log::set_boxed_logger(Box::new(QueueLogger { console, queue }))?;
    log::set_max_level(max_level);
    Ok(())
}
