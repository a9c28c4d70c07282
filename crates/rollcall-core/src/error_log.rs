//! Append-only plain-text error log.

use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// One `<timestamp>: <message>` line per recorded failure.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `message` stamped with the current local time.
    ///
    /// Write failures are reported via tracing and otherwise ignored.
    pub fn record(&self, message: &str) {
        self.record_at(Local::now(), message);
    }

    pub fn record_at(&self, at: DateTime<Local>, message: &str) {
        tracing::error!(log = %self.path.display(), "{message}");

        let line = format!("{}: {message}\n", at.format(TIMESTAMP_FORMAT));
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(line.as_bytes()));

        if let Err(e) = result {
            tracing::warn!(log = %self.path.display(), error = %e, "failed to write error log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(dir.path().join("error_log.txt"));
        let at = Local.with_ymd_and_hms(2024, 3, 5, 8, 15, 0).unwrap();

        log.record_at(at, "first");
        log.record_at(at, "second");

        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(
            contents,
            "2024-03-05 08:15:00.000000: first\n2024-03-05 08:15:00.000000: second\n"
        );
    }

    #[test]
    fn test_record_unwritable_path_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(dir.path().join("missing/dir/error_log.txt"));
        log.record("ignored");
        assert!(!log.path().exists());
    }
}
