//! Stage configuration.

use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::Error;

/// Called with every error a stage drops instead of forwarding. Workers call
/// it concurrently, so any state it keeps must be safe to share.
pub type ErrorHandler = Arc<dyn Fn(Error) + Send + Sync>;

/// Sizing knobs for a stage, loadable from a caller's own configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PipelineConfig {
    /// Capacity of the stage's output queue
    pub buffer_size: usize,
    /// Number of concurrent workers for transform, expand and sink stages
    pub parallelism: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1,
            parallelism: 1,
        }
    }
}

impl PipelineConfig {
    /// Set the buffer size
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set the number of workers
    pub fn parallelism(mut self, workers: usize) -> Self {
        self.parallelism = workers;
        self
    }
}

/// Everything a stage needs besides its own work: sizing, the shared
/// cancellation token and the error handler.
///
/// A child stage starts from a copy of its parent's configuration.
#[derive(Clone, Default)]
pub struct StageConfig {
    settings: PipelineConfig,
    token: CancellationToken,
    on_error: Option<ErrorHandler>,
}

impl StageConfig {
    /// Output queue capacity, clamped to what a tokio queue can hold.
    pub fn buffer_size(&self) -> usize {
        self.settings.buffer_size.clamp(1, Semaphore::MAX_PERMITS)
    }

    /// Worker count, never below 1.
    pub fn parallelism(&self) -> usize {
        self.settings.parallelism.max(1)
    }

    pub fn settings(&self) -> PipelineConfig {
        self.settings
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn error_handler(&self) -> Option<&ErrorHandler> {
        self.on_error.as_ref()
    }

    pub(crate) fn set_settings(&mut self, settings: PipelineConfig) {
        self.settings = settings;
    }

    pub(crate) fn set_buffer_size(&mut self, size: usize) {
        self.settings.buffer_size = size;
    }

    pub(crate) fn set_parallelism(&mut self, workers: usize) {
        self.settings.parallelism = workers;
    }

    pub(crate) fn set_token(&mut self, token: CancellationToken) {
        self.token = token;
    }

    pub(crate) fn set_error_handler(&mut self, handler: ErrorHandler) {
        self.on_error = Some(handler);
    }

    /// Hand a dropped error to the handler, if there is one.
    pub(crate) fn report(&self, error: Error) {
        match &self.on_error {
            Some(handler) => handler(error),
            None => tracing::debug!(%error, "dropping error with no handler installed"),
        }
    }
}

impl fmt::Debug for StageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageConfig")
            .field("buffer_size", &self.settings.buffer_size)
            .field("parallelism", &self.settings.parallelism)
            .field("cancelled", &self.token.is_cancelled())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
