//! ## tidsmaskin-core::active
//! **The process-wide active clock**
//!
//! Set once, during startup, before any redirected call site runs. There is no
//! way to replace it afterwards: a second `install` fails. Until a clock is
//! installed every redirect point behaves like the host.

use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use tracing::info;

use crate::error::ClockError;
use crate::format;
use crate::host;
use crate::intercept::{InterceptSet, Interceptor};
use crate::time::{Clock, ManualClock, SystemClock};

static ACTIVE: OnceCell<Interceptor> = OnceCell::new();
static PASSTHROUGH: Lazy<Interceptor> =
    Lazy::new(|| Interceptor::new(Arc::new(SystemClock), InterceptSet::all()));

/// Makes `clock` the active clock for the call sites in `sites`, then runs its
/// `after_install` hook.
pub fn install(clock: Arc<dyn Clock>, sites: InterceptSet) -> Result<&'static Interceptor, ClockError> {
    // Pin the host process start before any virtual reading is derived from it.
    host::process_start_millis();

    ACTIVE
        .set(Interceptor::new(clock, sites))
        .map_err(|_| ClockError::AlreadyInstalled)?;
    let active = ACTIVE.get().ok_or(ClockError::AlreadyInstalled)?;

    let clock = active.clock();
    let now = clock.wall_millis();
    info!(
        clock = %clock,
        now = %format::format_date(now).unwrap_or_else(|_| now.to_string()),
        sites = ?active.sites(),
        "virtual time: using global clock"
    );
    clock.after_install();
    Ok(active)
}

pub fn is_installed() -> bool {
    ACTIVE.get().is_some()
}

/// The installed interceptor, or a passthrough one when nothing is installed.
pub fn interceptor() -> &'static Interceptor {
    ACTIVE.get().unwrap_or_else(|| &*PASSTHROUGH)
}

pub fn clock() -> &'static Arc<dyn Clock> {
    interceptor().clock()
}

/// The active manual clock, for the thread that drives virtual time.
pub fn manual() -> Option<&'static ManualClock> {
    clock().as_manual()
}
