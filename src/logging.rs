//! Append-only timestamped log sink
//!
//! Every notable server event is appended to `<dir>/YYYYMMDD_HHMMSS.log`,
//! one line per event, each prefixed with the wall-clock time of the write.
//! Writers are serialized; a failed open degrades the sink to a no-op so the
//! server keeps running without file logging.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;

/// Thread-safe append-only log file with timestamp-prefixed lines.
pub struct LogSink {
    file: Mutex<Option<File>>,
}

impl LogSink {
    /// Open a log file under `dir`, creating the directory if absent.
    ///
    /// The filename is derived from the wall-clock start time
    /// (`YYYYMMDD_HHMMSS.log`). On failure the error is reported to stderr
    /// once and the sink becomes a no-op.
    pub fn open(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        if let Err(e) = create_log_dir(dir) {
            eprintln!("log: could not create {}: {}", dir.display(), e);
            return Self::disabled();
        }

        let path = log_file_path(dir);
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => Self {
                file: Mutex::new(Some(file)),
            },
            Err(e) => {
                eprintln!("log: could not open {}: {}", path.display(), e);
                Self::disabled()
            }
        }
    }

    /// A sink that drops every line. Used when opening fails and in tests.
    pub fn disabled() -> Self {
        Self {
            file: Mutex::new(None),
        }
    }

    /// Whether the sink has an open file behind it.
    pub fn is_enabled(&self) -> bool {
        self.file.lock().map(|f| f.is_some()).unwrap_or(false)
    }

    /// Append one line, prefixed with `YYYY-MM-DD HH:MM:SS - `, and flush.
    ///
    /// Concurrent callers are serialized. Write failures are swallowed;
    /// logging is best-effort.
    pub fn write(&self, line: &str) {
        let Ok(mut guard) = self.file.lock() else {
            return;
        };
        if let Some(file) = guard.as_mut() {
            let ts = Local::now().format("%Y-%m-%d %H:%M:%S");
            let _ = writeln!(file, "{} - {}", ts, line);
            let _ = file.flush();
        }
    }

    /// Close the underlying file. Idempotent.
    pub fn close(&self) {
        if let Ok(mut guard) = self.file.lock() {
            *guard = None;
        }
    }
}

fn log_file_path(dir: &Path) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("{}.log", stamp))
}

#[cfg(unix)]
fn create_log_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    if dir.is_dir() {
        return Ok(());
    }
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o755)
        .create(dir)
}

#[cfg(not(unix))]
fn create_log_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("parlor-log-test-{}", Uuid::new_v4()))
    }

    #[test]
    fn test_open_creates_dir_and_file() {
        let dir = scratch_dir();
        let sink = LogSink::open(&dir);
        assert!(sink.is_enabled());
        sink.write("server started");
        sink.close();

        let entries: Vec<_> = std::fs::read_dir(&dir)
            .expect("log dir exists")
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(entries.len(), 1);
        let name = entries[0].file_name().into_string().unwrap();
        assert!(name.ends_with(".log"));

        let contents = std::fs::read_to_string(entries[0].path()).unwrap();
        assert!(contents.ends_with("server started\n"));
        // "YYYY-MM-DD HH:MM:SS - " prefix is 22 bytes
        assert_eq!(&contents[19..22], " - ");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = scratch_dir();
        let sink = LogSink::open(&dir);
        sink.close();
        sink.close();
        assert!(!sink.is_enabled());
        // Writes after close are dropped without panicking.
        sink.write("ignored");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_disabled_sink_is_noop() {
        let sink = LogSink::disabled();
        assert!(!sink.is_enabled());
        sink.write("nothing happens");
        sink.close();
    }

    #[test]
    fn test_concurrent_writers_serialize() {
        let dir = scratch_dir();
        let sink = std::sync::Arc::new(LogSink::open(&dir));

        let mut handles = Vec::new();
        for i in 0..8 {
            let sink = std::sync::Arc::clone(&sink);
            handles.push(std::thread::spawn(move || {
                for j in 0..50 {
                    sink.write(&format!("writer {} line {}", i, j));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        sink.close();

        let entry = std::fs::read_dir(&dir).unwrap().next().unwrap().unwrap();
        let contents = std::fs::read_to_string(entry.path()).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 400);
        for line in lines {
            // Every line is whole: timestamp prefix then a writer tag.
            assert_eq!(&line[19..22], " - ");
            assert!(line[22..].starts_with("writer "));
        }

        std::fs::remove_dir_all(&dir).ok();
    }
}
