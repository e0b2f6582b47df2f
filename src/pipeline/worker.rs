//! The bounded worker pool behind the transform, expand and sink stages.
//!
//! Every worker of a stage reads from the same upstream queue and writes to
//! the same downstream queue. The downstream queue closes when the last
//! worker drops its sender; a supervisor task joins the workers to log the
//! stage's end and any panic.

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use super::StageState;
use crate::config::StageConfig;
use crate::error::Error;
use crate::outlet::Outlet;
use crate::record::FromError;

/// Whether a worker should keep pulling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Closed,
}

/// The per-item logic of a stage.
#[async_trait]
pub(crate) trait Work: Send + Sync + 'static {
    type In: Send + 'static;
    type Out: FromError + Send + 'static;

    async fn process(&self, item: Self::In, out: &Emitter<Self::Out>) -> Flow;
}

/// The writing end of a stage's output queue.
///
/// Clones share one cancellation flag, so a stage reports cancellation once
/// no matter how many of its workers observe it.
pub(crate) struct Emitter<T> {
    stage: &'static str,
    tx: mpsc::Sender<T>,
    token: CancellationToken,
    // Shared by all workers of one stage, so cancellation is reported once.
    cancel_reported: Arc<AtomicBool>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            stage: self.stage,
            tx: self.tx.clone(),
            token: self.token.clone(),
            cancel_reported: self.cancel_reported.clone(),
        }
    }
}

impl<T: FromError + Send> Emitter<T> {
    pub(crate) fn new(stage: &'static str, tx: mpsc::Sender<T>, token: CancellationToken) -> Self {
        Self {
            stage,
            tx,
            token,
            cancel_reported: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn stage(&self) -> &'static str {
        self.stage
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Write one record downstream, waiting for room in the queue.
    ///
    /// Gives up when the pipeline is cancelled or the reader has gone away.
    pub(crate) async fn emit(&self, item: T) -> Flow {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                self.report_cancelled();
                Flow::Closed
            }
            sent = self.tx.send(item) => match sent {
                Ok(()) => Flow::Continue,
                Err(_) => {
                    debug!(stage = self.stage, "downstream reader dropped");
                    Flow::Closed
                }
            },
        }
    }

    /// One non-blocking attempt to tell downstream the stage was cancelled.
    pub(crate) fn report_cancelled(&self) {
        if self.cancel_reported.swap(true, Ordering::AcqRel) {
            return;
        }
        warn!(stage = self.stage, "stage cancelled");
        if self.tx.try_send(T::from_error(Error::Cancelled)).is_err() {
            trace!(stage = self.stage, "cancellation record dropped, queue full");
        }
    }
}

/// Spawn the stage's workers over `upstream` and return the stage's output.
pub(crate) fn launch<W: Work>(
    stage: &'static str,
    config: &StageConfig,
    upstream: Outlet<W::In>,
    work: W,
) -> Outlet<W::Out> {
    let workers = config.parallelism();
    let (tx, rx) = mpsc::channel(config.buffer_size());
    let out = Emitter::new(stage, tx, config.token().clone());
    let input = Arc::new(Mutex::new(upstream.into_inner()));
    let work = Arc::new(work);

    debug!(
        stage,
        workers,
        buffer = config.buffer_size(),
        state = %StageState::Running,
        "stage materialized"
    );

    let handles: Vec<JoinHandle<()>> = (0..workers)
        .map(|worker| {
            tokio::spawn(run_worker(
                worker,
                work.clone(),
                input.clone(),
                out.clone(),
            ))
        })
        .collect();
    drop(out);

    tokio::spawn(supervise(stage, handles));
    Outlet::new(rx)
}

async fn run_worker<W: Work>(
    worker: usize,
    work: Arc<W>,
    input: Arc<Mutex<mpsc::Receiver<W::In>>>,
    out: Emitter<W::Out>,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = out.token().cancelled() => {
                out.report_cancelled();
                return;
            }
            next = recv_shared(&input) => next,
        };

        let Some(item) = next else {
            trace!(stage = out.stage(), worker, state = %StageState::Draining, "upstream closed");
            return;
        };

        if work.process(item, &out).await == Flow::Closed {
            return;
        }
    }
}

async fn recv_shared<T>(input: &Mutex<mpsc::Receiver<T>>) -> Option<T> {
    input.lock().await.recv().await
}

async fn supervise(stage: &'static str, handles: Vec<JoinHandle<()>>) {
    for joined in join_all(handles).await {
        if let Err(e) = joined {
            error!(stage, error = %e, "worker task failed");
        }
    }
    debug!(stage, state = %StageState::Closed, "stage closed");
}
