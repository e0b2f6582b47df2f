//! Built-in producers.
//!
//! Each one adapts a common way of holding data (a pull function, an
//! iterator, a queue filled by someone else, an async stream) to the
//! [`Producer`] trait.

use async_trait::async_trait;
use futures_core::Stream;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;

use crate::error::Result;
use crate::traits::Producer;

/// A producer created from a pull function
#[derive(Clone)]
pub struct FnProducer<F> {
    f: F,
}

impl<F> FnProducer<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut, T> Producer for FnProducer<F>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<Option<T>>> + Send,
    T: Send + 'static,
{
    type Item = T;

    async fn produce(&mut self) -> Result<Option<Self::Item>> {
        (self.f)().await
    }
}

/// A producer that yields every element of an iterator
#[derive(Clone)]
pub struct IterProducer<I> {
    iter: I,
}

impl<I: Iterator> IterProducer<I> {
    pub fn new<C>(items: C) -> Self
    where
        C: IntoIterator<IntoIter = I>,
    {
        Self {
            iter: items.into_iter(),
        }
    }
}

#[async_trait]
impl<I> Producer for IterProducer<I>
where
    I: Iterator + Send,
    I::Item: Send + 'static,
{
    type Item = I::Item;

    async fn produce(&mut self) -> Result<Option<Self::Item>> {
        Ok(self.iter.next())
    }
}

/// A producer draining a queue that something else fills.
///
/// The stream ends when every sender has been dropped.
pub struct ReceiverProducer<T> {
    rx: mpsc::Receiver<Result<T>>,
}

impl<T> ReceiverProducer<T> {
    pub fn new(rx: mpsc::Receiver<Result<T>>) -> Self {
        Self { rx }
    }
}

#[async_trait]
impl<T: Send + 'static> Producer for ReceiverProducer<T> {
    type Item = T;

    async fn produce(&mut self) -> Result<Option<Self::Item>> {
        self.rx.recv().await.transpose()
    }
}

/// A producer draining an async stream, such as a paginated listing.
pub struct StreamProducer<S> {
    stream: Pin<Box<S>>,
}

impl<S> StreamProducer<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: Box::pin(stream),
        }
    }
}

#[async_trait]
impl<S, T> Producer for StreamProducer<S>
where
    S: Stream<Item = Result<T>> + Send,
    T: Send + 'static,
{
    type Item = T;

    async fn produce(&mut self) -> Result<Option<Self::Item>> {
        self.stream.next().await.transpose()
    }
}
