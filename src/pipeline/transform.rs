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
use crate::record::Record;

/// Applies an async function to every clean value of its upstream.
///
/// Each output record carries the value `f` was called with as its input.
#[derive(Clone)]
pub struct Transform<S, F> {
    upstream: S,
    f: F,
    config: StageConfig,
}

impl<S: Stage, F> Transform<S, F> {
    pub(crate) fn new(upstream: S, f: F) -> Self {
        trace!(stage = "transform", state = %StageState::Configured, "stage built");
        let config = upstream.config().clone();
        Self {
            upstream,
            f,
            config,
        }
    }
}

impl<S, F> Configure for Transform<S, F> {
    fn config(&self) -> &StageConfig {
        &self.config
    }

    fn config_mut(&mut self) -> &mut StageConfig {
        &mut self.config
    }
}

impl<S, F, Fut, R> Stage for Transform<S, F>
where
    S: Stage,
    S::Output: Clone,
    F: Fn(S::Output) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
    R: Send + 'static,
{
    type Input = S::Output;
    type Output = R;

    fn go(self) -> Outlet<Record<S::Output, R>> {
        debug!(stage = "transform", state = %StageState::Materializing, "materializing upstream");
        let upstream = self.upstream.go();
        let apply = Apply {
            f: self.f,
            config: self.config.clone(),
            _records: PhantomData,
        };
        worker::launch("transform", &self.config, upstream, apply)
    }
}

struct Apply<I, T, F> {
    f: F,
    config: StageConfig,
    _records: PhantomData<fn(I, T)>,
}

#[async_trait]
impl<I, T, F, Fut, R> Work for Apply<I, T, F>
where
    I: Send + 'static,
    T: Clone + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
    R: Send + 'static,
{
    type In = Record<I, T>;
    type Out = Record<T, R>;

    async fn process(&self, record: Record<I, T>, out: &Emitter<Record<T, R>>) -> Flow {
        let value = match record.split() {
            Ok((_, value)) => value,
            Err(error) => {
                metrics::record(out.stage(), Outcome::Dropped);
                self.config.report(error);
                return Flow::Continue;
            }
        };

        match (self.f)(value.clone()).await {
            Err(Error::Skip) => {
                trace!(stage = out.stage(), "item skipped");
                metrics::record(out.stage(), Outcome::Skipped);
                Flow::Continue
            }
            result => {
                metrics::record(out.stage(), Outcome::Emitted);
                out.emit(Record::from_result(result).with_input(value)).await
            }
        }
    }
}
