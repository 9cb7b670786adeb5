//! Parsing of single `key=value` clock parameters.
//!
//! - `offset=<millis>` shifts wall time by a fixed amount
//! - `offset=@<yyyyMMdd'T'HHmmss>` shifts it so the process appears to start then
//! - `offset=#<path>[#<intervalMillis>]` resumes from and keeps writing a state file
//! - `scaled=<factor>` runs time faster or slower than its source
//! - `manual=<millis>` / `manual=@<timestamp>` hands time to a driver thread

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tidsmaskin_core::format;
use tidsmaskin_core::state::{OffsetState, DEFAULT_WRITE_INTERVAL};
use tidsmaskin_core::time::{Clock, OffsetClock, ScaledClock};

use crate::ConfigError;

#[derive(Debug, Clone, PartialEq)]
pub enum OffsetSpec {
    /// Fixed number of milliseconds added to wall time.
    Millis(i64),
    /// Wall-clock instant the process should appear to have started at.
    StartAt(i64),
    /// State file to resume from, rewritten every `interval`.
    Persisted { path: PathBuf, interval: Duration },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClockSpec {
    Offset(OffsetSpec),
    Scaled(f64),
    /// Start time of a manual clock, in milliseconds since the epoch.
    Manual(i64),
}

impl ClockSpec {
    pub fn parse(key: &str, value: &str) -> Result<Self, ConfigError> {
        match key {
            "offset" => parse_offset(value).map(ClockSpec::Offset),
            "scaled" => value
                .trim()
                .parse::<f64>()
                .map(ClockSpec::Scaled)
                .map_err(|err| ConfigError::invalid_value(key, value, err)),
            "manual" => parse_instant(key, value).map(ClockSpec::Manual),
            other => Err(ConfigError::UnsupportedKey(other.to_string())),
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            ClockSpec::Offset(_) => "offset",
            ClockSpec::Scaled(_) => "scaled",
            ClockSpec::Manual(_) => "manual",
        }
    }

    /// Wraps `source` in the clock this parameter describes. Not meaningful for
    /// `Manual`, which has no source; the chain builder handles it.
    pub(crate) fn decorate(&self, source: Arc<dyn Clock>) -> Result<Arc<dyn Clock>, ConfigError> {
        let clock: Arc<dyn Clock> = match self {
            ClockSpec::Offset(OffsetSpec::Millis(offset)) => Arc::new(OffsetClock::new(source, *offset)),
            ClockSpec::Offset(OffsetSpec::StartAt(target)) => {
                Arc::new(OffsetClock::starting_at(source, *target))
            }
            ClockSpec::Offset(OffsetSpec::Persisted { path, interval }) => {
                let state = OffsetState::new(path.clone(), *interval)?;
                Arc::new(OffsetClock::persisted(source, state)?)
            }
            ClockSpec::Scaled(scale) => Arc::new(ScaledClock::new(source, *scale)?),
            ClockSpec::Manual(_) => source,
        };
        Ok(clock)
    }
}

impl FromStr for ClockSpec {
    type Err = ConfigError;

    fn from_str(entry: &str) -> Result<Self, Self::Err> {
        let (key, value) = entry.split_once('=').unwrap_or((entry, ""));
        ClockSpec::parse(key.trim(), value)
    }
}

impl fmt::Display for ClockSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockSpec::Offset(OffsetSpec::Millis(offset)) => write!(f, "offset={offset}"),
            ClockSpec::Offset(OffsetSpec::StartAt(at)) => write!(f, "offset=@{}", display_date(*at)),
            ClockSpec::Offset(OffsetSpec::Persisted { path, interval }) => {
                write!(f, "offset=#{}#{}", path.display(), interval.as_millis())
            }
            ClockSpec::Scaled(scale) => write!(f, "scaled={scale}"),
            ClockSpec::Manual(start) => write!(f, "manual={start}"),
        }
    }
}

fn display_date(millis: i64) -> String {
    format::format_date(millis).unwrap_or_else(|_| millis.to_string())
}

fn parse_offset(value: &str) -> Result<OffsetSpec, ConfigError> {
    if let Some(state) = value.strip_prefix('#') {
        return parse_persisted(value, state);
    }
    if let Some(date) = value.strip_prefix('@') {
        return Ok(OffsetSpec::StartAt(format::parse_date(date)?));
    }
    value
        .trim()
        .parse::<i64>()
        .map(OffsetSpec::Millis)
        .map_err(|err| ConfigError::invalid_value("offset", value, err))
}

fn parse_persisted(value: &str, state: &str) -> Result<OffsetSpec, ConfigError> {
    let (path, interval) = match state.rsplit_once('#') {
        Some((path, millis)) => {
            let millis = millis
                .trim()
                .parse::<u64>()
                .map_err(|err| ConfigError::invalid_value("offset", value, err))?;
            (path, Duration::from_millis(millis))
        }
        None => (state, DEFAULT_WRITE_INTERVAL),
    };
    if path.is_empty() {
        return Err(ConfigError::invalid_value("offset", value, "missing state file path"));
    }
    if interval.is_zero() {
        return Err(ConfigError::invalid_value("offset", value, "write interval must be positive"));
    }
    Ok(OffsetSpec::Persisted {
        path: PathBuf::from(path),
        interval,
    })
}

fn parse_instant(key: &str, value: &str) -> Result<i64, ConfigError> {
    match value.strip_prefix('@') {
        Some(date) => Ok(format::parse_date(date)?),
        None => value
            .trim()
            .parse::<i64>()
            .map_err(|err| ConfigError::invalid_value(key, value, err)),
    }
}
