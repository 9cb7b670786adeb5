use thiserror::Error;
use tidsmaskin_config::ConfigError;
use tidsmaskin_core::{ClockError, Interrupted};

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Clock(#[from] ClockError),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),

    #[error("A manual clock only moves when driven; use `drive` instead")]
    ManualSleep,

    #[error("Clock chain has no manual clock to drive")]
    NotManual,

    #[error("Sleeper thread did not report its wake-up")]
    SleeperLost,

    #[error("Unable to spawn sleeper thread: {0}")]
    Spawn(#[source] std::io::Error),
}
