use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::worker::{Emitter, Flow};
use super::{Configure, Stage, StageState};
use crate::config::StageConfig;
use crate::error::Error;
use crate::metrics::{self, Outcome};
use crate::outlet::Outlet;
use crate::record::{Item, Record};

// Larger windows grow on demand.
const WINDOW_PREALLOC: usize = 1024;

/// Groups its upstream into windows of `size` records.
///
/// A single task does the grouping, so windows keep arrival order. Each
/// window carries the successful values in order and, when some members
/// failed, all of their errors aggregated into one [`Error::Multiple`]. A
/// shorter final window is emitted when upstream closes.
#[derive(Clone)]
pub struct Batch<S> {
    upstream: S,
    size: usize,
    config: StageConfig,
}

impl<S: Stage> Batch<S> {
    pub(crate) fn new(upstream: S, size: usize) -> Self {
        trace!(stage = "batch", state = %StageState::Configured, "stage built");
        let config = upstream.config().clone();
        Self {
            upstream,
            size: size.max(1),
            config,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl<S> Configure for Batch<S> {
    fn config(&self) -> &StageConfig {
        &self.config
    }

    fn config_mut(&mut self) -> &mut StageConfig {
        &mut self.config
    }
}

impl<S: Stage> Stage for Batch<S> {
    type Input = ();
    type Output = Vec<S::Output>;

    fn go(self) -> Outlet<Item<Vec<S::Output>>> {
        debug!(stage = "batch", state = %StageState::Materializing, "materializing upstream");
        let upstream = self.upstream.go();
        let (tx, rx) = mpsc::channel(self.config.buffer_size());
        let out = Emitter::new("batch", tx, self.config.token().clone());
        debug!(
            stage = "batch",
            size = self.size,
            buffer = self.config.buffer_size(),
            state = %StageState::Running,
            "stage materialized"
        );
        tokio::spawn(run_batch(upstream.into_inner(), out, self.size));
        Outlet::new(rx)
    }
}

async fn run_batch<I, T>(
    mut input: mpsc::Receiver<Record<I, T>>,
    out: Emitter<Item<Vec<T>>>,
    size: usize,
) where
    I: Send + 'static,
    T: Send + 'static,
{
    loop {
        let mut values = Vec::with_capacity(size.min(WINDOW_PREALLOC));
        let mut errors = Vec::new();
        let mut taken = 0;
        let mut exhausted = false;

        while taken < size {
            let next = tokio::select! {
                biased;
                _ = out.token().cancelled() => {
                    out.report_cancelled();
                    return;
                }
                next = input.recv() => next,
            };
            match next {
                Some(record) => {
                    taken += 1;
                    match record.split() {
                        Ok((_, value)) => values.push(value),
                        Err(error) => errors.push(error),
                    }
                }
                None => {
                    exhausted = true;
                    break;
                }
            }
        }

        if taken > 0 {
            let error = if errors.is_empty() {
                None
            } else {
                Some(Error::multiple(errors))
            };
            metrics::record(out.stage(), Outcome::Emitted);
            if out.emit(Record::window(values, error)).await == Flow::Closed {
                return;
            }
        }

        if exhausted {
            debug!(stage = out.stage(), state = %StageState::Closed, "stage closed");
            return;
        }
    }
}
