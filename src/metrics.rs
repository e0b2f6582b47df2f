//! Per-stage item counters, recorded through the `metrics` facade when the
//! `metrics` feature is enabled and compiled away otherwise.

/// What happened to one item in a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Written downstream
    Emitted,
    /// Dropped on the skip marker
    Skipped,
    /// An upstream error handed to the error handler
    Dropped,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Emitted => "emitted",
            Outcome::Skipped => "skipped",
            Outcome::Dropped => "dropped",
        }
    }
}

#[cfg(feature = "metrics")]
pub(crate) fn record(stage: &'static str, outcome: Outcome) {
    ::metrics::counter!(
        "gatherpipe_items_total",
        "stage" => stage,
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub(crate) fn record(_stage: &'static str, _outcome: Outcome) {}
