//! # tidsmaskin-core
//!
//! Virtual time for a running process.
//! Clock readings and timed blocking calls are routed through a single active
//! clock, which may shift, scale or fully control the timeline the process sees.
//!
//! ### Expectations:
//! - The active clock is installed once, before any redirected call runs
//! - With no clock installed every redirect point behaves like the host
//! - A manual clock never wakes a thread before virtual time reaches its deadline
//!
//! ### Key Submodules:
//! - `time`: the `Clock` contract and its system, offset, scaled and manual implementations
//! - `intercept`: the six redirect points and the allow-list that gates them
//! - `active`: the process-wide clock slot
//! - `signal` / `monitor`: interruptible per-thread blocking primitives
//! - `state`: persisted offset state for offset clocks that survive restarts

pub mod active;
pub mod error;
pub mod format;
pub mod host;
pub mod intercept;
pub mod monitor;
pub mod signal;
pub mod state;
pub mod time;

#[cfg(test)]
mod testing;

pub mod prelude {
    pub use crate::error::*;
    pub use crate::intercept::{CallSite, InterceptSet, Interceptor};
    pub use crate::monitor::{Monitor, MonitorGuard, MonitorWait};
    pub use crate::signal::ThreadHandle;
    pub use crate::state::OffsetState;
    pub use crate::time::*;
}

pub use error::{ClockError, Interrupted};
