//! ## tidsmaskin-core::state
//! **Persisted offset-clock state**
//!
//! A state file holds a single timestamp line. Each write records a time that
//! is two write intervals ahead of the clock, so a process that dies right
//! after a write still finds a value in the future of everything it observed.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{self, Sender};
use tracing::{debug, warn};

use crate::error::ClockError;
use crate::format;

pub const DEFAULT_WRITE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetState {
    path: PathBuf,
    interval: Duration,
}

impl OffsetState {
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Result<Self, ClockError> {
        if interval.is_zero() {
            return Err(ClockError::invalid("State write interval must be positive"));
        }
        Ok(Self {
            path: path.into(),
            interval,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Reads the persisted wall time. `Ok(None)` when no state file exists yet.
    pub fn read(&self) -> Result<Option<i64>, ClockError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(self.read_error(source)),
        };
        let line = contents.lines().next().unwrap_or_default();
        format::parse_date(line)
            .map(Some)
            .map_err(|err| self.read_error(io::Error::new(io::ErrorKind::InvalidData, err)))
    }

    /// Persists `wall_millis` pushed two intervals ahead. Returns the stored instant.
    pub fn write(&self, wall_millis: i64) -> Result<i64, ClockError> {
        let ahead = i64::try_from(self.interval.as_millis().saturating_mul(2)).unwrap_or(i64::MAX);
        let stored = wall_millis.saturating_add(ahead);
        let line = format::format_date_ceil(stored)?;
        self.replace_contents(&line)
            .map_err(|source| ClockError::StateWrite {
                path: self.path.clone(),
                source,
            })?;
        debug!(path = %self.path.display(), stored = %line, "offset clock state written");
        Ok(stored)
    }

    fn replace_contents(&self, line: &str) -> io::Result<()> {
        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        let mut file = fs::File::create(&tmp_path)?;
        writeln!(file, "{line}")?;
        file.sync_all()?;
        fs::rename(&tmp_path, &self.path)
    }

    fn read_error(&self, source: io::Error) -> ClockError {
        ClockError::StateRead {
            path: self.path.clone(),
            source,
        }
    }
}

/// Background thread rewriting an [`OffsetState`] at its interval.
///
/// The first write happens immediately. Dropping the writer stops the thread.
pub struct StateWriter {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StateWriter {
    pub fn spawn<F>(state: OffsetState, now: F) -> Result<Self, ClockError>
    where
        F: Fn() -> i64 + Send + 'static,
    {
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let path = state.path().to_path_buf();
        let handle = std::thread::Builder::new()
            .name("offset-clock-state-writer".into())
            .spawn(move || {
                let ticker = channel::tick(state.interval());
                loop {
                    write_or_warn(&state, now());
                    channel::select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {}
                    }
                }
            })
            .map_err(|source| ClockError::StateWrite { path, source })?;
        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }
}

/// One periodic tick: a failed write is logged and otherwise ignored.
pub(crate) fn write_or_warn(state: &OffsetState, wall_millis: i64) -> bool {
    match state.write(wall_millis) {
        Ok(_) => true,
        Err(err) => {
            warn!(error = %err, "offset clock keeps its in-memory offset");
            false
        }
    }
}

impl Drop for StateWriter {
    fn drop(&mut self) {
        // Disconnecting the channel wakes the select.
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;
    use tracing_test::traced_test;

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let state = OffsetState::new(dir.path().join("clock.state"), DEFAULT_WRITE_INTERVAL).unwrap();
        assert_eq!(state.read().unwrap(), None);
    }

    #[test]
    fn write_stores_two_intervals_ahead() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clock.state");
        let state = OffsetState::new(&path, Duration::from_secs(10)).unwrap();

        let now = format::parse_date("20250101T000000").unwrap();
        let stored = state.write(now + 250).unwrap();
        assert_eq!(stored, now + 20_250);

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "20250101T000021\n");
        assert_eq!(state.read().unwrap(), Some(now + 21_000));
        assert!(!dir.path().join("clock.state.tmp").exists());
    }

    #[test]
    fn garbage_state_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clock.state");
        fs::write(&path, "yesterday\n").unwrap();
        let state = OffsetState::new(&path, DEFAULT_WRITE_INTERVAL).unwrap();
        assert!(matches!(state.read(), Err(ClockError::StateRead { .. })));
    }

    #[test]
    fn rejects_zero_interval() {
        assert!(OffsetState::new("x", Duration::ZERO).is_err());
    }

    #[test]
    fn writer_rewrites_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clock.state");
        let state = OffsetState::new(&path, Duration::from_millis(10)).unwrap();

        let base = format::parse_date("20250101T000000").unwrap();
        let now = Arc::new(AtomicI64::new(base));
        let writer = {
            let now = Arc::clone(&now);
            StateWriter::spawn(state.clone(), move || now.fetch_add(5_000, Ordering::SeqCst)).unwrap()
        };
        while now.load(Ordering::SeqCst) < base + 15_000 {
            std::thread::sleep(Duration::from_millis(5));
        }
        drop(writer);

        let written = state.read().unwrap().unwrap();
        assert!(written >= base + 5_000);
        let after_stop = now.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(now.load(Ordering::SeqCst), after_stop);
    }

    #[traced_test]
    #[test]
    fn write_failures_are_logged_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let state = OffsetState::new(
            dir.path().join("missing").join("clock.state"),
            Duration::from_millis(10),
        )
        .unwrap();
        assert!(!write_or_warn(&state, 0));
        assert!(logs_contain("offset clock keeps its in-memory offset"));
    }
}
