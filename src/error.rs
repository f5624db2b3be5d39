//! Error types for configuration, load runs and streaming validation.

use thiserror::Error;

/// Invalid settings, rejected before any request is dispatched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no URLs provided")]
    NoUrls,

    #[error("concurrency must be at least 1, got {0}")]
    InvalidConcurrency(usize),

    #[error("requests per URL must be at least 1, got {0}")]
    InvalidRequestCount(usize),

    #[error("invalid HTTP method '{0}'")]
    InvalidMethod(String),

    #[error("invalid header '{0}': expected 'Key: Value'")]
    InvalidHeader(String),

    #[error("invalid --resolve entry '{entry}': {reason}")]
    InvalidResolve { entry: String, reason: String },

    #[error("invalid --connect-to entry '{entry}': {reason}")]
    InvalidConnectTo { entry: String, reason: String },

    #[error("invalid duration '{0}'")]
    InvalidDuration(String),
}

/// Failures of a load run as a whole. Individual request failures are
/// recorded in their samples and never surface here.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("job queue closed before all jobs were enqueued")]
    QueueClosed,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("worker thread {0} panicked")]
    WorkerPanicked(usize),
}

/// Reasons a response failed the `--expect-streaming` check.
#[derive(Debug, Error, PartialEq)]
pub enum StreamingError {
    #[error("streaming validation failed: no buffering analysis available")]
    NoAnalysis,

    #[error("streaming validation failed: {chunks} chunk(s) is not enough to show progressive delivery")]
    InsufficientData { chunks: usize },

    #[error("streaming validation failed: buffering detected (pattern: {pattern}, CV: {cv:.2})")]
    BufferingDetected { pattern: String, cv: f64 },

    #[error("streaming validation failed: response headers do not indicate streaming")]
    HeadersNotStreaming,
}
