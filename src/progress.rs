//! Progress reporting for orchestration runs.
//!
//! The supervisor emits human-readable status lines through an injected
//! [`ProgressSink`]. Background jobs bind the sink to a chat's entry in the
//! [`StatusLogStore`]; synchronous endpoints use the plain tracing sink.
//! Everything also lands in tracing.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

/// One progress entry as seen by status pollers and stream consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusLine {
    pub message: String,
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
}

impl StatusLine {
    pub fn new(message: impl Into<String>, level: LogLevel) -> Self {
        Self {
            message: message.into(),
            level,
            timestamp: Utc::now(),
        }
    }
}

/// Destination for supervisor progress lines.
pub trait ProgressSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    fn warning(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

/// Sink that only forwards to tracing. Used by the synchronous endpoints.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Info => info!("{}", message),
            LogLevel::Warning => warn!("{}", message),
            LogLevel::Error => error!("{}", message),
        }
    }
}

/// Sink appending to one chat's status log.
pub struct StatusLogSink {
    store: Arc<StatusLogStore>,
    chat_id: String,
}

impl StatusLogSink {
    pub fn new(store: Arc<StatusLogStore>, chat_id: impl Into<String>) -> Self {
        Self {
            store,
            chat_id: chat_id.into(),
        }
    }
}

impl ProgressSink for StatusLogSink {
    fn log(&self, level: LogLevel, message: &str) {
        TracingSink.log(level, message);
        self.store.append(&self.chat_id, StatusLine::new(message, level));
    }
}

#[derive(Debug, Default)]
struct ChatLog {
    lines: Vec<StatusLine>,
    cursor: usize,
}

/// Keyed store of per-chat status logs with read cursors.
///
/// Appends and cursor reads for the same chat id are serialized by the map
/// entry lock; distinct chat ids never contend.
#[derive(Debug, Default)]
pub struct StatusLogStore {
    logs: DashMap<String, ChatLog>,
}

impl StatusLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, chat_id: &str, line: StatusLine) {
        let mut entry = self.logs.entry(chat_id.to_string()).or_default();
        entry.lines.push(line);
    }

    /// Return the lines appended since the previous call for this chat id
    /// and advance the cursor past them.
    pub fn drain_new(&self, chat_id: &str) -> Vec<StatusLine> {
        let Some(mut entry) = self.logs.get_mut(chat_id) else {
            return Vec::new();
        };
        let fresh: Vec<StatusLine> = entry.lines[entry.cursor..].to_vec();
        entry.cursor = entry.lines.len();
        fresh
    }

    /// Drop a chat's log and its cursor.
    pub fn clear(&self, chat_id: &str) {
        self.logs.remove(chat_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_new_returns_only_fresh_lines() {
        let store = StatusLogStore::new();
        store.append("chat-1", StatusLine::new("first", LogLevel::Info));
        store.append("chat-1", StatusLine::new("second", LogLevel::Info));

        let fresh = store.drain_new("chat-1");
        assert_eq!(fresh.len(), 2);
        assert_eq!(fresh[0].message, "first");

        assert!(store.drain_new("chat-1").is_empty());

        store.append("chat-1", StatusLine::new("third", LogLevel::Warning));
        let fresh = store.drain_new("chat-1");
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].message, "third");
    }

    #[test]
    fn chats_do_not_share_logs_or_cursors() {
        let store = StatusLogStore::new();
        store.append("a", StatusLine::new("for a", LogLevel::Info));
        store.append("b", StatusLine::new("for b", LogLevel::Info));

        assert_eq!(store.drain_new("a").len(), 1);
        assert_eq!(store.drain_new("b").len(), 1);
    }

    #[test]
    fn clear_resets_log_and_cursor() {
        let store = StatusLogStore::new();
        store.append("chat-1", StatusLine::new("old", LogLevel::Info));
        store.drain_new("chat-1");
        store.clear("chat-1");

        store.append("chat-1", StatusLine::new("new", LogLevel::Info));
        let fresh = store.drain_new("chat-1");
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].message, "new");
    }

    #[test]
    fn draining_unknown_chat_is_empty() {
        let store = StatusLogStore::new();
        assert!(store.drain_new("nope").is_empty());
    }
}
