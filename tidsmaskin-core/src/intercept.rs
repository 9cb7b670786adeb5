//! ## tidsmaskin-core::intercept
//! **The six redirect points**
//!
//! Call sites that should perceive virtual time use these functions instead
//! of the standard library's clock and blocking calls. Each one forwards to the
//! active clock, unless the installed [`InterceptSet`] excludes it, in which
//! case the host behavior is used.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::active;
use crate::error::{ClockError, Interrupted};
use crate::host;
use crate::monitor::MonitorWait;
use crate::time::{Clock, ParkTimeout, SystemClock};

static SYSTEM: SystemClock = SystemClock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallSite {
    CurrentTimeMillis,
    NanoTime,
    ProcessStart,
    Wait,
    Sleep,
    Park,
}

impl CallSite {
    pub const ALL: [CallSite; 6] = [
        CallSite::CurrentTimeMillis,
        CallSite::NanoTime,
        CallSite::ProcessStart,
        CallSite::Wait,
        CallSite::Sleep,
        CallSite::Park,
    ];

    /// Name used in the `includesMethods` allow-list.
    pub fn method_name(self) -> &'static str {
        match self {
            CallSite::CurrentTimeMillis => "currentTimeMillis",
            CallSite::NanoTime => "nanoTime",
            CallSite::ProcessStart => "getStartTime",
            CallSite::Wait => "wait",
            CallSite::Sleep => "sleep",
            CallSite::Park => "park",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method_name())
    }
}

impl FromStr for CallSite {
    type Err = ClockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CallSite::ALL
            .into_iter()
            .find(|site| site.method_name() == s)
            .ok_or_else(|| ClockError::invalid(format!("Unknown intercepted method '{s}'")))
    }
}

/// Set of call sites redirected to the active clock.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct InterceptSet(u8);

impl InterceptSet {
    pub fn all() -> Self {
        Self::from_sites(CallSite::ALL)
    }

    pub fn none() -> Self {
        Self(0)
    }

    pub fn from_sites(sites: impl IntoIterator<Item = CallSite>) -> Self {
        Self(sites.into_iter().fold(0, |bits, site| bits | site.bit()))
    }

    /// Parses a `:`-separated list of method names, e.g. `sleep:park`.
    pub fn parse_list(list: &str) -> Result<Self, ClockError> {
        list.split(':')
            .filter(|name| !name.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<CallSite>, _>>()
            .map(Self::from_sites)
    }

    pub fn contains(self, site: CallSite) -> bool {
        self.0 & site.bit() != 0
    }

    pub fn sites(self) -> impl Iterator<Item = CallSite> {
        CallSite::ALL.into_iter().filter(move |site| self.contains(*site))
    }
}

impl Default for InterceptSet {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Debug for InterceptSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.sites()).finish()
    }
}

/// A clock together with the call sites it governs.
#[derive(Debug, Clone)]
pub struct Interceptor {
    clock: Arc<dyn Clock>,
    sites: InterceptSet,
}

impl Interceptor {
    pub fn new(clock: Arc<dyn Clock>, sites: InterceptSet) -> Self {
        Self { clock, sites }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn sites(&self) -> InterceptSet {
        self.sites
    }

    fn route(&self, site: CallSite) -> &dyn Clock {
        if self.sites.contains(site) {
            self.clock.as_ref()
        } else {
            &SYSTEM
        }
    }

    pub fn current_time_millis(&self) -> i64 {
        self.route(CallSite::CurrentTimeMillis).wall_millis()
    }

    pub fn nano_time(&self) -> u64 {
        self.route(CallSite::NanoTime).monotonic_nanos()
    }

    pub fn process_start_millis(&self) -> i64 {
        self.route(CallSite::ProcessStart)
            .process_start_millis(host::process_start_millis())
    }

    pub fn wait(&self, monitor: &mut dyn MonitorWait, timeout: Duration) -> Result<(), Interrupted> {
        self.route(CallSite::Wait).wait(monitor, timeout)
    }

    pub fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        self.route(CallSite::Sleep).sleep(duration)
    }

    pub fn park(&self, timeout: ParkTimeout) {
        self.route(CallSite::Park).park(timeout);
    }
}

/// Wall-clock time of the active clock, in milliseconds since the epoch.
pub fn current_time_millis() -> i64 {
    active::interceptor().current_time_millis()
}

/// Monotonic time of the active clock, in nanoseconds.
pub fn nano_time() -> u64 {
    active::interceptor().nano_time()
}

/// Process start time as seen through the active clock.
pub fn process_start_millis() -> i64 {
    active::interceptor().process_start_millis()
}

/// Waits on `monitor` for up to `timeout` of active-clock time; zero waits without limit.
pub fn wait(monitor: &mut dyn MonitorWait, timeout: Duration) -> Result<(), Interrupted> {
    active::interceptor().wait(monitor, timeout)
}

pub fn sleep(duration: Duration) -> Result<(), Interrupted> {
    active::interceptor().sleep(duration)
}

pub fn park(timeout: ParkTimeout) {
    active::interceptor().park(timeout);
}
