//! # A bounded, cancellable stream pipeline
//!
//! This crate gathers and persists large volumes of items (test results
//! listed from a bucket, pages from a rate-limited API) with bounded
//! parallelism, backpressure, batching and per-item error recovery.
//!
//! ## Core Concepts
//!
//! - **Producer**: pulls items on demand; exhaustion ends the stream
//! - **Transform**: applies an async function with N concurrent workers
//! - **Batch / Expand**: groups records into windows and flattens them back
//! - **Sink**: hands each item to a side-effecting function and reports a
//!   completion per item
//! - **Cancellation**: one token shared by every stage stops them all
//!
//! Errors never halt a pipeline. An upstream error is handed to the stage's
//! error handler and the item is dropped; [`Error::Skip`] drops an item
//! silently. The caller decides from the handler and the completion stream
//! whether the run as a whole failed.
//!
//! ## Example
//!
//! ```rust
//! use gatherpipe::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let saved = pipeline::from_iter(1..=100)
//!         .with_buffer(10)
//!         .transform(|run: u32| async move { Ok(format!("run-{run}")) })
//!         .with_parallelism(8)
//!         .batch(25)
//!         .to(|batch: Vec<String>| async move {
//!             assert!(batch.len() <= 25);
//!             Ok(())
//!         })
//!         .go()
//!         .finish()
//!         .await?;
//!
//!     assert_eq!(saved, 4);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod outlet;
pub mod pipeline;
pub mod record;
pub mod sources;
pub mod traits;

// Re-export commonly used items
pub mod prelude {
    pub use crate::config::{ErrorHandler, PipelineConfig, StageConfig};
    pub use crate::error::{Error, IntoError, Result};
    pub use crate::outlet::Outlet;
    pub use crate::pipeline::{self, Configure, Pipeline, Source, Stage, StageState};
    pub use crate::record::{Completion, Item, Record};
    pub use crate::sources::*;
    pub use crate::traits::{Producer, ProducerExt};
    pub use tokio_util::sync::CancellationToken;
}

// Re-export main error type
pub use error::{Error, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
