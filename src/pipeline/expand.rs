use async_trait::async_trait;
use std::marker::PhantomData;
use tracing::{debug, trace};

use super::worker::{self, Emitter, Flow, Work};
use super::{Configure, Stage, StageState};
use crate::config::StageConfig;
use crate::metrics::{self, Outcome};
use crate::outlet::Outlet;
use crate::record::Record;

/// Flattens sequence values into one record per element, the inverse of
/// [`Batch`](super::Batch).
///
/// Every element keeps the input of the record it came from. Elements of one
/// record go out in order; with more than one worker, elements of different
/// records may interleave.
#[derive(Clone)]
pub struct Expand<S> {
    upstream: S,
    config: StageConfig,
}

impl<S: Stage> Expand<S> {
    pub(crate) fn new(upstream: S) -> Self {
        trace!(stage = "expand", state = %StageState::Configured, "stage built");
        let config = upstream.config().clone();
        Self { upstream, config }
    }
}

impl<S> Configure for Expand<S> {
    fn config(&self) -> &StageConfig {
        &self.config
    }

    fn config_mut(&mut self) -> &mut StageConfig {
        &mut self.config
    }
}

impl<S> Stage for Expand<S>
where
    S: Stage,
    S::Input: Clone,
    S::Output: IntoIterator,
    <S::Output as IntoIterator>::Item: Send + 'static,
{
    type Input = S::Input;
    type Output = <S::Output as IntoIterator>::Item;

    fn go(self) -> Outlet<Record<Self::Input, Self::Output>> {
        debug!(stage = "expand", state = %StageState::Materializing, "materializing upstream");
        let upstream = self.upstream.go();
        let spread = Spread {
            config: self.config.clone(),
            _records: PhantomData,
        };
        worker::launch("expand", &self.config, upstream, spread)
    }
}

struct Spread<I, C> {
    config: StageConfig,
    _records: PhantomData<fn(I, C)>,
}

#[async_trait]
impl<I, C> Work for Spread<I, C>
where
    I: Clone + Send + 'static,
    C: IntoIterator + Send + 'static,
    C::Item: Send + 'static,
{
    type In = Record<I, C>;
    type Out = Record<I, C::Item>;

    async fn process(&self, record: Record<I, C>, out: &Emitter<Record<I, C::Item>>) -> Flow {
        let (input, sequence) = match record.split() {
            Ok(parts) => parts,
            Err(error) => {
                metrics::record(out.stage(), Outcome::Dropped);
                self.config.report(error);
                return Flow::Continue;
            }
        };

        let elements: Vec<C::Item> = sequence.into_iter().collect();
        for element in elements {
            let mut expanded = Record::ok(element);
            if let Some(input) = &input {
                expanded = expanded.with_input(input.clone());
            }
            metrics::record(out.stage(), Outcome::Emitted);
            if out.emit(expanded).await == Flow::Closed {
                return Flow::Closed;
            }
        }
        Flow::Continue
    }
}
