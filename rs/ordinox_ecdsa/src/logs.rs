//! Canister logs, kept in two in-memory ring buffers and served on `/logs`.


use crate::MessageId;
use ic_canister_log::{declare_log_buffer, export, GlobalBuffer, Sink};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

declare_log_buffer!(name = INFO_BUF, capacity = 1000);
declare_log_buffer!(name = DEBUG_BUF, capacity = 1000);

/// Committee setup, signatures, signing failures, upgrades.
pub const INFO: PrintProxySink = PrintProxySink(Priority::Info);
/// Message creation, single endorsements, lock contention.
pub const DEBUG: PrintProxySink = PrintProxySink(Priority::Debug);

/// Forwards log entries to the replica log in addition to the in-memory buffer.
pub struct PrintProxySink(Priority);

impl Sink for PrintProxySink {
    fn append(&self, entry: ic_canister_log::LogEntry) {
        ic_cdk::println!(
            "{} {}:{} {}",
            self.0.label(),
            entry.file,
            entry.line,
            entry.message
        );
        self.0.buffer().append(entry)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Priority {
    Info,
    Debug,
}

impl Priority {
    const ALL: [Priority; 2] = [Priority::Info, Priority::Debug];

    fn label(self) -> &'static str {
        match self {
            Priority::Info => "INFO",
            Priority::Debug => "DEBUG",
        }
    }

    fn buffer(self) -> &'static GlobalBuffer {
        match self {
            Priority::Info => &INFO_BUF,
            Priority::Debug => &DEBUG_BUF,
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Priority::Info),
            "debug" => Ok(Priority::Debug),
            _ => Err(format!("unknown priority {s}")),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: u64,
    pub priority: Priority,
    pub file: String,
    pub line: u32,
    pub message: String,
    pub counter: u64,
}

impl LogEntry {
    /// Whether the entry is about message `id`, e.g. "endorsed message 12".
    pub fn mentions_message(&self, id: MessageId) -> bool {
        let needle = format!("message {id}");
        self.message.match_indices(&needle).any(|(start, _)| {
            !self.message[start + needle.len()..]
                .starts_with(|c: char| c.is_ascii_digit())
        })
    }
}

/// Selection of log entries requested on `/logs`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LogFilter {
    /// Both buffers when absent.
    pub priority: Option<Priority>,
    /// Entries older than this timestamp, in nanoseconds, are skipped.
    pub since: u64,
    /// Only entries about this message.
    pub message: Option<MessageId>,
    pub newest_first: bool,
}

impl LogFilter {
    /// Builds the filter from the `priority`, `time`, `message` and `sort` query
    /// parameters. Unknown priorities and sort orders are ignored. Entries are
    /// oldest first unless `time` is set or `sort=desc` is given.
    pub fn from_query<'a>(param: impl Fn(&str) -> Option<&'a str>) -> Result<Self, String> {
        let since = match param("time") {
            Some(time) => time
                .parse::<u64>()
                .map_err(|_| "failed to parse the 'time' parameter".to_string())?,
            None => 0,
        };
        let message = match param("message") {
            Some(id) => Some(
                id.parse::<MessageId>()
                    .map_err(|_| "failed to parse the 'message' parameter".to_string())?,
            ),
            None => None,
        };
        let newest_first = match param("sort").map(str::to_ascii_lowercase).as_deref() {
            Some("asc") => false,
            Some("desc") => true,
            _ => since > 0,
        };
        Ok(Self {
            priority: param("priority").and_then(|p| p.parse().ok()),
            since,
            message,
            newest_first,
        })
    }

    fn accepts(&self, entry: &LogEntry) -> bool {
        entry.timestamp >= self.since
            && self
                .message
                .map_or(true, |id| entry.mentions_message(id))
    }

    /// Applies the filter to the entries of the in-memory buffers.
    pub fn select(&self) -> Vec<LogEntry> {
        let entries = Priority::ALL
            .into_iter()
            .filter(|priority| self.priority.map_or(true, |wanted| wanted == *priority))
            .flat_map(|priority| {
                export(priority.buffer())
                    .into_iter()
                    .map(move |entry| LogEntry {
                        timestamp: entry.timestamp,
                        priority,
                        file: entry.file.to_string(),
                        line: entry.line,
                        message: entry.message,
                        counter: entry.counter,
                    })
            });
        self.arrange(entries)
    }

    fn arrange(&self, entries: impl Iterator<Item = LogEntry>) -> Vec<LogEntry> {
        let mut entries: Vec<_> = entries.filter(|entry| self.accepts(entry)).collect();
        entries.sort_by_key(|entry| (entry.timestamp, entry.counter));
        if self.newest_first {
            entries.reverse();
        }
        entries
    }
}

/// Renders `{"entries":[...]}` keeping the longest prefix of `entries` that fits
/// in `max_body_size` bytes.
pub fn render_entries(entries: &[LogEntry], max_body_size: usize) -> String {
    const OPEN: &str = "{\"entries\":[";
    const CLOSE: &str = "]}";

    let mut body = String::from(OPEN);
    for (i, entry) in entries.iter().enumerate() {
        let json = serde_json::to_string(entry).expect("BUG: failed to serialize a log entry");
        let separator = usize::from(i > 0);
        if body.len() + separator + json.len() + CLOSE.len() > max_body_size {
            break;
        }
        if i > 0 {
            body.push(',');
        }
        body.push_str(&json);
    }
    body.push_str(CLOSE);
    body
}
