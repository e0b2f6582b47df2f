//! Error types for the pipeline.
//!
//! Two variants are signals rather than failures: [`Error::Skip`] drops a
//! single item without reporting it, and [`Error::Cancelled`] is what a stage
//! emits when the shared cancellation token fires. Producer exhaustion is not
//! an error at all; producers return `Ok(None)`.

use std::sync::Arc;

/// The main error type for the pipeline.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Drop this item: do not forward it and do not report it.
    #[error("item skipped")]
    Skip,

    /// The pipeline's cancellation token fired
    #[error("pipeline was cancelled")]
    Cancelled,

    /// A producer failed to pull an item
    #[error("producer error: {0}")]
    Producer(#[source] Arc<dyn std::error::Error + Send + Sync>),

    /// A transform function failed on an item
    #[error("transform error: {0}")]
    Transform(#[source] Arc<dyn std::error::Error + Send + Sync>),

    /// A sink function failed on an item
    #[error("sink error: {0}")]
    Sink(#[source] Arc<dyn std::error::Error + Send + Sync>),

    /// A custom error with a message
    #[error("{0}")]
    Custom(String),

    /// Several items failed (a batch window, or a drained completion stream)
    #[error("{} errors occurred: {}", .0.len(), join(.0))]
    Multiple(Vec<Error>),
}

fn join(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| format!("[{}]", e))
        .collect::<Vec<_>>()
        .join(", ")
}

// Convenience constructors
impl Error {
    /// Create a producer error from any error type
    pub fn producer<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Error::Producer(Arc::new(error))
    }

    /// Create a transform error from any error type
    pub fn transform<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Error::Transform(Arc::new(error))
    }

    /// Create a sink error from any error type
    pub fn sink<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Error::Sink(Arc::new(error))
    }

    /// Create a custom error with a message
    pub fn custom<S: Into<String>>(message: S) -> Self {
        Error::Custom(message.into())
    }

    /// Aggregate errors into one, flattening nested aggregates.
    pub fn multiple<I>(errors: I) -> Self
    where
        I: IntoIterator<Item = Error>,
    {
        let mut flat = Vec::new();
        for error in errors {
            match error {
                Error::Multiple(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        Error::Multiple(flat)
    }

    /// True for the skip marker.
    pub fn is_skip(&self) -> bool {
        matches!(self, Error::Skip)
    }

    /// True for the cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// The individual errors behind this one. A single error yields itself.
    pub fn errors(&self) -> &[Error] {
        match self {
            Error::Multiple(errors) => errors,
            other => std::slice::from_ref(other),
        }
    }
}

// Common conversions
impl From<Box<dyn std::error::Error + Send + Sync>> for Error {
    fn from(e: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Error::Custom(e.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Custom(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Custom(s.to_string())
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Helper trait for converting foreign errors into our Error type
pub trait IntoError<T> {
    fn into_producer_error(self) -> Result<T>;
    fn into_transform_error(self) -> Result<T>;
    fn into_sink_error(self) -> Result<T>;
}

impl<T, E> IntoError<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn into_producer_error(self) -> Result<T> {
        self.map_err(Error::producer)
    }

    fn into_transform_error(self) -> Result<T> {
        self.map_err(Error::transform)
    }

    fn into_sink_error(self) -> Result<T> {
        self.map_err(Error::sink)
    }
}
