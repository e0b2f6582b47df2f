use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;
use tracing::{debug, trace};

use super::worker::{self, Emitter, Flow, Work};
use super::{Configure, Stage, StageState};
use crate::config::StageConfig;
use crate::error::{Error, Result};
use crate::metrics::{self, Outcome};
use crate::outlet::Outlet;
use crate::record::{Completion, Record};

/// The end of a pipeline: hands every clean value to a side-effecting
/// function and reports one [`Completion`] per value handled.
///
/// Upstream errors go to the error handler and produce no completion.
#[derive(Clone)]
pub struct To<S, F> {
    upstream: S,
    f: F,
    config: StageConfig,
}

impl<S: Stage, F> To<S, F> {
    pub(crate) fn new(upstream: S, f: F) -> Self {
        trace!(stage = "sink", state = %StageState::Configured, "stage built");
        let config = upstream.config().clone();
        Self {
            upstream,
            f,
            config,
        }
    }
}

impl<S, F> Configure for To<S, F> {
    fn config(&self) -> &StageConfig {
        &self.config
    }

    fn config_mut(&mut self) -> &mut StageConfig {
        &mut self.config
    }
}

impl<S, F, Fut> To<S, F>
where
    S: Stage,
    S::Output: Clone,
    F: Fn(S::Output) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    /// Materialize the pipeline and return its completion stream.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn go(self) -> Outlet<Completion<S::Output>> {
        debug!(stage = "sink", state = %StageState::Materializing, "materializing upstream");
        let upstream = self.upstream.go();
        let deliver = Deliver {
            f: self.f,
            config: self.config.clone(),
            _records: PhantomData,
        };
        worker::launch("sink", &self.config, upstream, deliver)
    }
}

struct Deliver<I, T, F> {
    f: F,
    config: StageConfig,
    _records: PhantomData<fn(I, T)>,
}

#[async_trait]
impl<I, T, F, Fut> Work for Deliver<I, T, F>
where
    I: Send + 'static,
    T: Clone + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    type In = Record<I, T>;
    type Out = Completion<T>;

    async fn process(&self, record: Record<I, T>, out: &Emitter<Completion<T>>) -> Flow {
        let value = match record.split() {
            Ok((_, value)) => value,
            Err(error) => {
                metrics::record(out.stage(), Outcome::Dropped);
                self.config.report(error);
                return Flow::Continue;
            }
        };

        let error = match (self.f)(value.clone()).await {
            Ok(()) => None,
            Err(Error::Skip) => {
                trace!(stage = out.stage(), "item skipped");
                metrics::record(out.stage(), Outcome::Skipped);
                return Flow::Continue;
            }
            Err(error) => Some(error),
        };
        metrics::record(out.stage(), Outcome::Emitted);
        out.emit(Completion::new(Some(value), error)).await
    }
}
