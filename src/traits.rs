//! The producer trait and its extensions.
//!
//! A [`Producer`] is the pull side of a pipeline. The source stage calls
//! [`Producer::setup`] once, then [`Producer::produce`] until it returns
//! `Ok(None)`, forwarding every value and every error downstream.

use async_trait::async_trait;
use std::future::Future;

use crate::error::Result;

/// A producer generates items on demand.
///
/// - `Ok(Some(item))` forwards the item.
/// - `Ok(None)` signals exhaustion and closes the stream.
/// - `Err(Error::Skip)` drops this pull silently; the next pull follows.
/// - Any other error is forwarded as an error record. Producers are never
///   retried by the pipeline.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use gatherpipe::error::Result;
/// use gatherpipe::traits::Producer;
///
/// struct PageProducer {
///     pages: Vec<Vec<String>>,
/// }
///
/// #[async_trait]
/// impl Producer for PageProducer {
///     type Item = Vec<String>;
///
///     async fn produce(&mut self) -> Result<Option<Self::Item>> {
///         Ok(self.pages.pop())
///     }
/// }
/// ```
#[async_trait]
pub trait Producer: Send {
    /// The type of items this producer generates
    type Item: Send + 'static;

    /// Runs once, before the first pull. A failure becomes the only record
    /// of the stream.
    async fn setup(&mut self) -> Result<()> {
        Ok(())
    }

    /// Produce the next item, or None if the producer is exhausted.
    async fn produce(&mut self) -> Result<Option<Self::Item>>;
}

/// Extension trait for producers.
pub trait ProducerExt: Producer + Sized {
    /// Run `setup` once before the first pull, ahead of the producer's own
    /// setup.
    fn with_setup<S, Fut>(self, setup: S) -> WithSetup<Self, S>
    where
        S: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<()>> + Send,
    {
        WithSetup {
            producer: self,
            setup: Some(setup),
        }
    }
}

impl<P: Producer> ProducerExt for P {}

/// A producer with an extra one-time setup step.
#[derive(Clone)]
pub struct WithSetup<P, S> {
    producer: P,
    setup: Option<S>,
}

#[async_trait]
impl<P, S, Fut> Producer for WithSetup<P, S>
where
    P: Producer,
    S: FnOnce() -> Fut + Send,
    Fut: Future<Output = Result<()>> + Send,
{
    type Item = P::Item;

    async fn setup(&mut self) -> Result<()> {
        if let Some(setup) = self.setup.take() {
            setup().await?;
        }
        self.producer.setup().await
    }

    async fn produce(&mut self) -> Result<Option<Self::Item>> {
        self.producer.produce().await
    }
}
