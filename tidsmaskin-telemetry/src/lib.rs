//! # Tidsmaskin Telemetry
//!
//! Crate for logging setup and structured clock diagnostics.

pub mod logging;

pub use logging::ClockLogger;
