//! Pipeline construction and execution.
//!
//! A pipeline is built back to front as nested stage values: each stage owns
//! its upstream, its own work and a [`StageConfig`]. Building is synchronous
//! and does nothing. Calling [`Stage::go`] (or [`To::go`] on a sink)
//! materializes the whole chain: every stage asks its upstream for its output
//! queue, spawns its own tasks on it and hands back its output queue
//! immediately. The work then happens in the background.
//!
//! ```rust
//! use gatherpipe::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let batches = gatherpipe::pipeline::from_iter(vec!["pr/1/", "pr/2/", "pr/x/"])
//!     .with_buffer(10)
//!     .transform(|path| async move {
//!         let number = path.split('/').nth(1).unwrap_or_default();
//!         number.parse::<u32>().map_err(|_| Error::Skip)
//!     })
//!     .on_error(|e| eprintln!("{e}"))
//!     .with_parallelism(4)
//!     .batch(50)
//!     .to(|batch: Vec<u32>| async move {
//!         println!("saving {} results", batch.len());
//!         Ok(())
//!     })
//!     .go()
//!     .finish()
//!     .await?;
//! assert_eq!(batches, 1);
//! # Ok(())
//! # }
//! ```

mod batch;
mod expand;
mod sink;
mod transform;
pub(crate) mod worker;

pub use batch::Batch;
pub use expand::Expand;
pub use sink::To;
pub use transform::Transform;

use futures_core::Stream;
use std::fmt;
use std::future::Future;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::{PipelineConfig, StageConfig};
use crate::error::{Error, Result};
use crate::outlet::Outlet;
use crate::record::{Item, Record};
use crate::sources::{FnProducer, IterProducer, ReceiverProducer, StreamProducer};
use crate::traits::Producer;
use worker::{Emitter, Flow};

/// Where a stage is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// Built, nothing running
    Configured,
    /// Asking upstream for its output
    Materializing,
    /// Workers active
    Running,
    /// Upstream closed, workers finishing in-flight items
    Draining,
    /// Output queue closed
    Closed,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageState::Configured => "configured",
            StageState::Materializing => "materializing",
            StageState::Running => "running",
            StageState::Draining => "draining",
            StageState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Chainable configuration shared by every stage, sinks included.
///
/// Each method consumes the stage and returns it reconfigured; the last call
/// wins. Stages are `Clone` whenever their parts are, so a stage can be
/// cloned before configuring to seed several independent pipelines.
pub trait Configure: Sized {
    fn config(&self) -> &StageConfig;

    fn config_mut(&mut self) -> &mut StageConfig;

    /// Stop this stage, and the stages built on it, when `token` is cancelled.
    fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.config_mut().set_token(token);
        self
    }

    /// Capacity of this stage's output queue.
    fn with_buffer(mut self, size: usize) -> Self {
        self.config_mut().set_buffer_size(size);
        self
    }

    /// Number of concurrent workers for this stage.
    fn with_parallelism(mut self, workers: usize) -> Self {
        self.config_mut().set_parallelism(workers);
        self
    }

    /// Apply buffer size and parallelism in one go.
    fn with_config(mut self, settings: PipelineConfig) -> Self {
        self.config_mut().set_settings(settings);
        self
    }

    /// Receive every error this stage drops instead of forwarding.
    fn on_error<H>(mut self, handler: H) -> Self
    where
        H: Fn(Error) + Send + Sync + 'static,
    {
        self.config_mut().set_error_handler(std::sync::Arc::new(handler));
        self
    }
}

/// A stage whose output is a stream of records.
pub trait Stage: Configure + Send + 'static {
    /// The upstream value each output record was produced from
    type Input: Send + 'static;
    /// The value each output record carries
    type Output: Send + 'static;

    /// Materialize this stage and everything upstream of it.
    ///
    /// Returns at once; the stage's tasks run in the background until its
    /// output queue closes. Consuming `self` means a stage can only be
    /// materialized once.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    fn go(self) -> Outlet<Record<Self::Input, Self::Output>>;
}

/// The stage combinators, available on every [`Stage`].
pub trait Pipeline: Stage {
    /// Apply `f` to every clean value, `parallelism` items at a time.
    ///
    /// Upstream errors go to the error handler and never reach `f`. When `f`
    /// returns [`Error::Skip`] the item is dropped.
    fn transform<F, Fut, R>(self, f: F) -> Transform<Self, F>
    where
        Self::Output: Clone,
        F: Fn(Self::Output) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: Send + 'static,
    {
        Transform::new(self, f)
    }

    /// Group records into windows of `size`.
    fn batch(self, size: usize) -> Batch<Self> {
        Batch::new(self, size)
    }

    /// Flatten every sequence value into one record per element.
    fn expand(self) -> Expand<Self>
    where
        Self::Input: Clone,
        Self::Output: IntoIterator,
        <Self::Output as IntoIterator>::Item: Send + 'static,
    {
        Expand::new(self)
    }

    /// End the pipeline in the side-effecting `f`.
    fn to<F, Fut>(self, f: F) -> To<Self, F>
    where
        Self::Output: Clone,
        F: Fn(Self::Output) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        To::new(self, f)
    }
}

impl<S: Stage> Pipeline for S {}

/// The first stage of every pipeline: drains a [`Producer`].
#[derive(Clone)]
pub struct Source<P> {
    producer: P,
    config: StageConfig,
}

impl<P: Producer> Source<P> {
    pub fn new(producer: P) -> Self {
        trace!(stage = "source", state = %StageState::Configured, "stage built");
        Self {
            producer,
            config: StageConfig::default(),
        }
    }
}

impl<P> Configure for Source<P> {
    fn config(&self) -> &StageConfig {
        &self.config
    }

    fn config_mut(&mut self) -> &mut StageConfig {
        &mut self.config
    }
}

impl<P: Producer + 'static> Stage for Source<P> {
    type Input = ();
    type Output = P::Item;

    fn go(self) -> Outlet<Item<P::Item>> {
        let (tx, rx) = mpsc::channel(self.config.buffer_size());
        let out = Emitter::new("source", tx, self.config.token().clone());
        debug!(
            stage = "source",
            buffer = self.config.buffer_size(),
            state = %StageState::Running,
            "stage materialized"
        );
        tokio::spawn(run_source(self.producer, out));
        Outlet::new(rx)
    }
}

async fn run_source<P: Producer>(mut producer: P, out: Emitter<Item<P::Item>>) {
    if let Err(error) = producer.setup().await {
        warn!(stage = out.stage(), %error, "producer setup failed");
        out.emit(Record::err(error)).await;
        return;
    }

    loop {
        let pulled = tokio::select! {
            biased;
            _ = out.token().cancelled() => {
                out.report_cancelled();
                return;
            }
            pulled = producer.produce() => pulled,
        };

        let record = match pulled {
            Ok(Some(value)) => Record::ok(value),
            Ok(None) => break,
            Err(Error::Skip) => {
                trace!(stage = out.stage(), "pull skipped");
                continue;
            }
            Err(error) => Record::err(error),
        };

        if out.emit(record).await == Flow::Closed {
            return;
        }
    }

    debug!(stage = out.stage(), state = %StageState::Closed, "producer exhausted");
}

/// Start a pipeline from any [`Producer`].
pub fn from<P: Producer + 'static>(producer: P) -> Source<P> {
    Source::new(producer)
}

/// Start a pipeline from a pull function.
///
/// The function is called until it returns `Ok(None)`; `Err(Error::Skip)`
/// drops one pull.
pub fn from_fn<F, Fut, T>(pull: F) -> Source<FnProducer<F>>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Option<T>>> + Send,
    T: Send + 'static,
{
    Source::new(FnProducer::new(pull))
}

/// Start a pipeline from the elements of an iterator.
pub fn from_iter<C>(items: C) -> Source<IterProducer<C::IntoIter>>
where
    C: IntoIterator,
    C::IntoIter: Send + 'static,
    C::Item: Send + 'static,
{
    Source::new(IterProducer::new(items))
}

/// Start a pipeline from a queue that something else fills.
pub fn from_receiver<T: Send + 'static>(rx: mpsc::Receiver<Result<T>>) -> Source<ReceiverProducer<T>> {
    Source::new(ReceiverProducer::new(rx))
}

/// Start a pipeline from an async stream.
pub fn from_stream<S, T>(stream: S) -> Source<StreamProducer<S>>
where
    S: Stream<Item = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    Source::new(StreamProducer::new(stream))
}
