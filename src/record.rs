//! The records that flow between stages.

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
enum Payload<T> {
    Value(T),
    Error(Error),
    // Only a batch window carries both.
    Partial(T, Error),
}

/// One unit of data flowing through a pipeline: a value or an error, plus
/// the upstream input that produced it when there is one.
///
/// A record fresh from a producer has no input. A transform records the value
/// it was called with, so a consumer can correlate every output with its
/// input after batching and expansion have regrouped the stream.
#[derive(Debug, Clone)]
pub struct Record<I, T> {
    input: Option<I>,
    payload: Payload<T>,
}

/// A record with no input, as emitted by producers and batch windows.
pub type Item<T> = Record<(), T>;

impl<I, T> Record<I, T> {
    /// A successful record
    pub fn ok(value: T) -> Self {
        Self {
            input: None,
            payload: Payload::Value(value),
        }
    }

    /// A failed record
    pub fn err(error: Error) -> Self {
        Self {
            input: None,
            payload: Payload::Error(error),
        }
    }

    /// Build a record from the outcome of a fallible call.
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::ok(value),
            Err(error) => Self::err(error),
        }
    }

    /// Attach the upstream input this record was produced from.
    pub fn with_input(mut self, input: I) -> Self {
        self.input = Some(input);
        self
    }

    pub fn input(&self) -> Option<&I> {
        self.input.as_ref()
    }

    pub fn value(&self) -> Option<&T> {
        match &self.payload {
            Payload::Value(value) | Payload::Partial(value, _) => Some(value),
            Payload::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match &self.payload {
            Payload::Error(error) | Payload::Partial(_, error) => Some(error),
            Payload::Value(_) => None,
        }
    }

    /// True when the record carries no error.
    pub fn is_ok(&self) -> bool {
        matches!(self.payload, Payload::Value(_))
    }

    pub fn is_err(&self) -> bool {
        !self.is_ok()
    }

    /// The record as a plain result. An error wins over a value.
    pub fn into_result(self) -> Result<T> {
        match self.payload {
            Payload::Value(value) => Ok(value),
            Payload::Error(error) | Payload::Partial(_, error) => Err(error),
        }
    }

    /// The input and value of a clean record, or its error. A batch window
    /// with failures yields its error.
    pub fn split(self) -> Result<(Option<I>, T)> {
        match self.payload {
            Payload::Value(value) => Ok((self.input, value)),
            Payload::Error(error) | Payload::Partial(_, error) => Err(error),
        }
    }

    /// Split the record into input, value and error.
    pub fn into_parts(self) -> (Option<I>, Option<T>, Option<Error>) {
        match self.payload {
            Payload::Value(value) => (self.input, Some(value), None),
            Payload::Error(error) => (self.input, None, Some(error)),
            Payload::Partial(value, error) => (self.input, Some(value), Some(error)),
        }
    }
}

impl<T> Item<Vec<T>> {
    /// A batch window: the successful values in arrival order, plus the
    /// aggregated error of the members that failed.
    pub(crate) fn window(values: Vec<T>, error: Option<Error>) -> Self {
        let payload = match error {
            Some(error) => Payload::Partial(values, error),
            None => Payload::Value(values),
        };
        Self {
            input: None,
            payload,
        }
    }
}

/// What a sink emits for every item it handled: the input and, if the sink
/// function failed, its error.
#[derive(Debug, Clone)]
pub struct Completion<I> {
    input: Option<I>,
    error: Option<Error>,
}

impl<I> Completion<I> {
    pub(crate) fn new(input: Option<I>, error: Option<Error>) -> Self {
        Self { input, error }
    }

    pub fn input(&self) -> Option<&I> {
        self.input.as_ref()
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<Option<I>> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.input),
        }
    }
}

/// Records a stage can emit on its own, without an upstream item.
pub(crate) trait FromError {
    fn from_error(error: Error) -> Self;
}

impl<I, T> FromError for Record<I, T> {
    fn from_error(error: Error) -> Self {
        Record::err(error)
    }
}

impl<I> FromError for Completion<I> {
    fn from_error(error: Error) -> Self {
        Completion::new(None, Some(error))
    }
}
