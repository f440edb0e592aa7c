//! Human-readable activity log
//!
//! Append-only text file with one `[RFC3339] message` line per entry, backing
//! the `/logs` viewer. Writing is best effort: a failed append is reported via
//! tracing and never interrupts a cycle.

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Appender for the activity log file
pub struct ActivityLog {
    file_path: PathBuf,
    // Serializes appends from the scheduler and the HTTP trigger
    write_lock: Mutex<()>,
}

impl ActivityLog {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self { file_path: file_path.into(), write_lock: Mutex::new(()) }
    }

    /// Append a timestamped entry
    /// Returns true if successful, false otherwise
    pub fn record(&self, message: &str) -> bool {
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let line = format!("[{}] {}", stamp, message);

        let _guard = self.write_lock.lock();
        match self.append_line(&line) {
            Ok(()) => true,
            Err(e) => {
                error!(file = %self.file_path.display(), error = %e, "activity_log_write_failed");
                false
            }
        }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = self.file_path.as_path();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        debug!(file = %path.display(), bytes = %line.len(), "activity_log_written");

        Ok(())
    }

    /// Last `limit` lines, oldest first; empty when the log does not exist yet
    pub fn tail(&self, limit: usize) -> Vec<String> {
        if limit == 0 {
            return Vec::new();
        }

        let file = match File::open(&self.file_path) {
            Ok(file) => file,
            Err(_) => return Vec::new(),
        };

        let mut lines = VecDeque::with_capacity(limit);
        for line in BufReader::new(file).lines().map_while(Result::ok) {
            if lines.len() == limit {
                lines.pop_front();
            }
            lines.push_back(line);
        }
        lines.into_iter().collect()
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}
