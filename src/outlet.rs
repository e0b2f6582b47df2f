//! The live output of a materialized stage.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{Error, Result};
use crate::record::{Completion, Record};

/// The bounded output queue of a running stage.
///
/// The queue closes once every worker of the stage has exited, so draining
/// it to the end means the stage, and everything upstream of it, is done.
#[derive(Debug)]
pub struct Outlet<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> Outlet<T> {
    pub(crate) fn new(rx: mpsc::Receiver<T>) -> Self {
        Self { rx }
    }

    /// Wait for the next record, or `None` once the stage has closed.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn into_inner(self) -> mpsc::Receiver<T> {
        self.rx
    }

    pub fn into_stream(self) -> ReceiverStream<T> {
        ReceiverStream::new(self.rx)
    }
}

impl<T> Stream for Outlet<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

impl<I, T> Outlet<Record<I, T>> {
    /// Collect every value, failing on the first error record.
    pub async fn collect_values(mut self) -> Result<Vec<T>> {
        let mut values = Vec::new();
        while let Some(record) = self.rx.recv().await {
            values.push(record.into_result()?);
        }
        Ok(values)
    }
}

impl<I> Outlet<Completion<I>> {
    /// Drain the completion stream.
    ///
    /// Returns the number of items the sink handled cleanly, or every failure
    /// aggregated into one [`Error::Multiple`].
    pub async fn finish(mut self) -> Result<usize> {
        let mut succeeded = 0;
        let mut failures = Vec::new();
        while let Some(done) = self.rx.recv().await {
            match done.into_result() {
                Ok(_) => succeeded += 1,
                Err(error) => failures.push(error),
            }
        }
        if failures.is_empty() {
            Ok(succeeded)
        } else {
            Err(Error::multiple(failures))
        }
    }
}
