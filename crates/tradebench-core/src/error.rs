use serde::Serialize;

/// Failure reported by a collaborator service (trading, market data, ...).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// Bad or missing configuration. Fatal: aborts the run before any scenario.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A scenario could not acquire its fixtures or service handles.
    #[error("Setup error: {0}")]
    Setup(String),

    /// A single timed operation failed inside `execute`.
    #[error("Iteration error: {0}")]
    Iteration(String),

    /// A scenario's workload failed as a whole.
    #[error("Execution error: {0}")]
    Execution(String),

    /// Best-effort resource release failed.
    #[error("Cleanup error: {0}")]
    Cleanup(String),

    /// A report artifact could not be written or read.
    #[error("Reporting error: {0}")]
    Reporting(String),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),
}

impl BenchError {
    /// Only configuration errors abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BenchError::Config(_))
    }
}

impl Serialize for BenchError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
