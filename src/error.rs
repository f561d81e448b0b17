/// Errors surfaced synchronously to direct callers of the telemetry core.
///
/// Unsupported signal sources surface as `is_supported() == false` and
/// malformed samples are clamped and counted, so neither has a variant.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// A metric name with no entry in the rating threshold table.
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    /// Configuration values outside their accepted range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A timer was requested outside of a tokio runtime.
    #[error("No tokio runtime available to drive the timer")]
    NoRuntime,

    /// Configuration document could not be parsed.
    #[error("Config parse error: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
