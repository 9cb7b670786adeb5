//! ## tidsmaskin-telemetry::logging
//! **fmt subscriber with env filtering**
//!
//! ### Expectations:
//! - Installed once, as the first step of a binary
//! - `RUST_LOG` overrides the default `info` level
//! - Thread names are included in every line

use tidsmaskin_core::format;
use tidsmaskin_core::intercept::Interceptor;
use tracing::info_span;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone)]
pub struct ClockLogger;

impl ClockLogger {
    pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_thread_names(true)
            .with_span_events(FmtSpan::ENTER)
            .try_init()
    }

    /// Logs what `interceptor` currently reports for each clock reading.
    pub fn log_reading(interceptor: &Interceptor) {
        let span = info_span!("clock_reading", clock = %interceptor.clock());
        let _entered = span.enter();

        let wall = interceptor.current_time_millis();
        tracing::info!(
            wall,
            date = %format::format_date(wall).unwrap_or_else(|_| wall.to_string()),
            monotonic_nanos = interceptor.nano_time(),
            process_start = interceptor.process_start_millis(),
            sites = ?interceptor.sites(),
            "Clock reading"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tidsmaskin_core::intercept::InterceptSet;
    use tidsmaskin_core::time::ManualClock;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn logs_clock_reading() {
        let clock = Arc::new(ManualClock::new(86_400_000).unwrap());
        ClockLogger::log_reading(&Interceptor::new(clock, InterceptSet::all()));
        assert!(logs_contain("Clock reading"));
        assert!(logs_contain("wall=86400000"));
        assert!(logs_contain("process_start=86400000"));
    }
}
