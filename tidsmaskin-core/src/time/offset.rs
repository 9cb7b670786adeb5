//! ## tidsmaskin-core::time::offset
//! **Wall time shifted by a fixed amount**
//!
//! Only wall-clock and process-start reads are shifted. Monotonic time is only
//! meaningful as a difference, so it passes through, as do all blocking calls.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::info;

use crate::error::{ClockError, Interrupted};
use crate::host;
use crate::monitor::MonitorWait;
use crate::state::{OffsetState, StateWriter};
use crate::time::{Clock, ManualClock, ParkTimeout};

pub struct OffsetClock {
    source: Arc<dyn Clock>,
    offset: i64,
    state: Option<OffsetState>,
    writer: Mutex<Option<StateWriter>>,
}

impl OffsetClock {
    /// Shifts `source` by `offset` milliseconds.
    pub fn new(source: Arc<dyn Clock>, offset: i64) -> Self {
        Self {
            source,
            offset,
            state: None,
            writer: Mutex::new(None),
        }
    }

    /// Shifts `source` so that this process appears to have started at `target`.
    pub fn starting_at(source: Arc<dyn Clock>, target: i64) -> Self {
        let start = source.process_start_millis(host::process_start_millis());
        Self::new(source, target.saturating_sub(start))
    }

    /// Resumes from persisted state if the state file exists, otherwise starts
    /// with no offset. Once installed, the clock keeps the file up to date.
    pub fn persisted(source: Arc<dyn Clock>, state: OffsetState) -> Result<Self, ClockError> {
        let offset = match state.read()? {
            Some(persisted) => {
                let start = source.process_start_millis(host::process_start_millis());
                let offset = persisted.saturating_sub(start);
                info!(path = %state.path().display(), offset, "offset clock resumed from state");
                offset
            }
            None => 0,
        };
        Ok(Self {
            source,
            offset,
            state: Some(state),
            writer: Mutex::new(None),
        })
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn state(&self) -> Option<&OffsetState> {
        self.state.as_ref()
    }

    /// Whether the periodic state writer is running.
    pub fn is_persisting(&self) -> bool {
        self.writer.lock().is_some()
    }

    /// Stops the periodic state writer, if any. The last written state stays on disk.
    pub fn stop_persisting(&self) {
        self.writer.lock().take();
    }
}

impl fmt::Display for OffsetClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OffsetClock{{source={} offset={}", self.source, self.offset)?;
        if let Some(state) = &self.state {
            write!(f, " state={}", state.path().display())?;
        }
        f.write_str("}")
    }
}

impl fmt::Debug for OffsetClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OffsetClock")
            .field("source", &self.source)
            .field("offset", &self.offset)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Clock for OffsetClock {
    fn wall_millis(&self) -> i64 {
        self.source.wall_millis().saturating_add(self.offset)
    }

    fn monotonic_nanos(&self) -> u64 {
        self.source.monotonic_nanos()
    }

    fn process_start_millis(&self, host_start: i64) -> i64 {
        self.source
            .process_start_millis(host_start)
            .saturating_add(self.offset)
    }

    fn wait(&self, monitor: &mut dyn MonitorWait, timeout: Duration) -> Result<(), Interrupted> {
        self.source.wait(monitor, timeout)
    }

    fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        self.source.sleep(duration)
    }

    fn park(&self, timeout: ParkTimeout) {
        self.source.park(timeout);
    }

    fn after_install(&self) {
        self.source.after_install();
        let Some(state) = self.state.clone() else {
            return;
        };
        let source = Arc::clone(&self.source);
        let offset = self.offset;
        match StateWriter::spawn(state, move || source.wall_millis().saturating_add(offset)) {
            Ok(writer) => *self.writer.lock() = Some(writer),
            Err(err) => tracing::warn!(error = %err, "offset clock state will not be persisted"),
        }
    }

    fn as_manual(&self) -> Option<&ManualClock> {
        self.source.as_manual()
    }
}
