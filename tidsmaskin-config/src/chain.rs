//! Composition of parsed clock parameters into a single clock.

use std::fmt;
use std::sync::Arc;

use tidsmaskin_core::active;
use tidsmaskin_core::intercept::{InterceptSet, Interceptor};
use tidsmaskin_core::time::{Clock, ManualClock, SystemClock};
use tracing::{debug, warn};

use crate::{ClockSpec, ConfigError};

/// A composed clock ready to be installed.
#[derive(Debug, Clone)]
pub struct ClockChain {
    clock: Arc<dyn Clock>,
    manual: Option<Arc<ManualClock>>,
    intercepts: InterceptSet,
}

impl ClockChain {
    /// Applies `specs` in order, starting from the system clock.
    ///
    /// Each offset or scaled entry wraps the clock built so far. A manual entry
    /// replaces it.
    pub fn build(specs: &[ClockSpec], intercepts: InterceptSet) -> Result<Self, ConfigError> {
        let mut clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let mut manual = None;
        let mut layers = 0usize;

        for spec in specs {
            match spec {
                ClockSpec::Manual(start) => {
                    if layers > 0 {
                        warn!(discarded = %clock, "manual clock replaces the previously configured clock");
                    }
                    let driven = Arc::new(ManualClock::new(*start)?);
                    clock = driven.clone();
                    manual = Some(driven);
                }
                _ => clock = spec.decorate(clock)?,
            }
            layers += 1;
            debug!(%spec, %clock, "clock chain extended");
        }

        Ok(Self {
            clock,
            manual,
            intercepts,
        })
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// The manual clock at the bottom of the chain, for the thread driving it.
    pub fn manual(&self) -> Option<&Arc<ManualClock>> {
        self.manual.as_ref()
    }

    pub fn intercepts(&self) -> InterceptSet {
        self.intercepts
    }

    /// The chain as an interceptor, without touching the process-wide slot.
    pub fn interceptor(&self) -> Interceptor {
        Interceptor::new(Arc::clone(&self.clock), self.intercepts)
    }

    /// Makes this chain the process-wide active clock.
    pub fn install(self) -> Result<&'static Interceptor, ConfigError> {
        Ok(active::install(self.clock, self.intercepts)?)
    }
}

impl fmt::Display for ClockChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.clock, f)
    }
}
