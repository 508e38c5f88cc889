//! Run logging.
//!
//! Every log line goes through [`LOG_BROADCASTER`], which prints it to the
//! console, appends it to the run log file (when one is attached) and
//! broadcasts it to SSE clients of the HTTP server.

use chrono::Local;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Log level, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    fn label(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Success => "SUCCESS",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

/// A single log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// Nesting level for sub-steps
    #[serde(default)]
    pub indent: u8,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self { level, message: message.into(), indent: 0 }
    }

    pub fn debug(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Debug, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    pub fn with_indent(mut self, indent: u8) -> Self {
        self.indent = indent;
        self
    }
}

/// Log file name for a run started now: `alma_export_<YYYYMMDD>_<HHMMSS>.log`.
pub fn log_file_name() -> String {
    format!("alma_export_{}.log", Local::now().format("%Y%m%d_%H%M%S"))
}

/// Global log broadcaster
pub static LOG_BROADCASTER: Lazy<LogBroadcaster> = Lazy::new(LogBroadcaster::new);

/// Fans log entries out to the console, the log file and SSE subscribers.
pub struct LogBroadcaster {
    sender: broadcast::Sender<LogEntry>,
    file: Mutex<Option<(PathBuf, File)>>,
    console_level: Mutex<LogLevel>,
}

impl LogBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self {
            sender,
            file: Mutex::new(None),
            console_level: Mutex::new(LogLevel::Info),
        }
    }

    /// Send a log entry to all sinks
    pub fn log(&self, entry: LogEntry) {
        if self.console_enabled(entry.level) {
            let prefix = match entry.level {
                LogLevel::Debug => "   ·",
                LogLevel::Info => "   ",
                LogLevel::Success => "   ✓",
                LogLevel::Warning => "   ⚠️",
                LogLevel::Error => "   ❌",
            };
            let indent = "   ".repeat(entry.indent as usize);
            println!("{}{} {}", indent, prefix, entry.message);
        }

        if let Ok(mut guard) = self.file.lock() {
            if let Some((_, file)) = guard.as_mut() {
                let _ = writeln!(
                    file,
                    "{} - {} - {}{}",
                    Local::now().format("%Y-%m-%d %H:%M:%S"),
                    entry.level.label(),
                    "  ".repeat(entry.indent as usize),
                    entry.message
                );
            }
        }

        // No receivers is fine
        let _ = self.sender.send(entry);
    }

    /// Receiver for SSE streaming
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.sender.subscribe()
    }

    /// Minimum level printed to the console. The log file records everything.
    pub fn set_console_level(&self, level: LogLevel) {
        if let Ok(mut guard) = self.console_level.lock() {
            *guard = level;
        }
    }

    fn console_enabled(&self, level: LogLevel) -> bool {
        self.console_level
            .lock()
            .map(|min| level >= *min)
            .unwrap_or(true)
    }

    /// Start appending to a new timestamped log file inside `dir`.
    ///
    /// The directory is created if needed. Replaces any previously attached
    /// file and returns the new file's path.
    pub fn attach_log_file(&self, dir: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(log_file_name());
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        if let Ok(mut guard) = self.file.lock() {
            *guard = Some((path.clone(), file));
        }
        Ok(path)
    }

    /// Path of the attached log file, if any.
    pub fn log_file(&self) -> Option<PathBuf> {
        self.file
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|(path, _)| path.clone()))
    }
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Attach a run log file to the global broadcaster.
pub fn init_file_logging(dir: &Path) -> io::Result<PathBuf> {
    LOG_BROADCASTER.attach_log_file(dir)
}

pub fn log_debug(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::debug(msg));
}

pub fn log_info(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::info(msg));
}

pub fn log_success(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::success(msg));
}

pub fn log_warning(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::warning(msg));
}

pub fn log_error(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::error(msg));
}

pub fn log_info_indent(msg: impl Into<String>, indent: u8) {
    LOG_BROADCASTER.log(LogEntry::info(msg).with_indent(indent));
}

pub fn log_warning_indent(msg: impl Into<String>, indent: u8) {
    LOG_BROADCASTER.log(LogEntry::warning(msg).with_indent(indent));
}

pub fn log_debug_indent(msg: impl Into<String>, indent: u8) {
    LOG_BROADCASTER.log(LogEntry::debug(msg).with_indent(indent));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Warning < LogLevel::Error);
    }

    #[test]
    fn test_entry_serializes_camel_case() {
        let entry = LogEntry::warning("Malformed XML").with_indent(1);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["level"], "warning");
        assert_eq!(json["message"], "Malformed XML");
        assert_eq!(json["indent"], 1);
    }

    #[test]
    fn test_file_sink_records_every_level() {
        let dir = tempdir().unwrap();
        let broadcaster = LogBroadcaster::new();
        broadcaster.set_console_level(LogLevel::Error);

        let path = broadcaster.attach_log_file(&dir.path().join("logs")).unwrap();
        broadcaster.log(LogEntry::debug("fetching 991"));
        broadcaster.log(LogEntry::warning("no embedded XML fragment").with_indent(1));

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("alma_export_") && name.ends_with(".log"));
        assert_eq!(broadcaster.log_file(), Some(path.clone()));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" - DEBUG - fetching 991"));
        assert!(lines[1].ends_with(" - WARNING -   no embedded XML fragment"));
    }

    #[tokio::test]
    async fn test_subscribers_receive_entries() {
        let broadcaster = LogBroadcaster::new();
        broadcaster.set_console_level(LogLevel::Error);
        let mut rx = broadcaster.subscribe();

        broadcaster.log(LogEntry::success("done"));
        let entry = rx.recv().await.unwrap();
        assert_eq!(entry.level, LogLevel::Success);
        assert_eq!(entry.message, "done");
    }
}
