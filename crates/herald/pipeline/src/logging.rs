//! Settings for the pipeline `log` tap.

use serde::{Deserialize, Serialize};

/// Level at which a `log` tap emits events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    /// Tap is silent.
    Off,
}

/// Explicit settings passed to each `log` operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default)]
    pub level: LogLevel,

    /// Also print the accumulated trace entries.
    #[serde(default)]
    pub include_trace: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}

impl LogSettings {
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            include_trace: false,
        }
    }

    pub fn disabled() -> Self {
        Self::new(LogLevel::Off)
    }

    pub fn with_trace(mut self) -> Self {
        self.include_trace = true;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.level != LogLevel::Off
    }
}
