//! This module takes care of scheduling the analysis work, encapsulating use
//! of multiple threads

#[cfg(feature = "multi-threading")]
mod multi_threading;
#[cfg(not(feature = "multi-threading"))]
mod sequential;

use crate::{errors::Result, resacc::ResultsAccumulator};

use std::ops::Range;

/// Size of the analysed event batches
///
/// Events are grouped in batches of a certain size in order to reduce
/// accumulation error and achieve perfect reproducibility between sequential
/// and parallel runs of the analysis.
///
pub const EVENT_BATCH_SIZE: usize = 10_000;

/// Split a run into consecutive batches of event indices
fn batches(num_events: usize) -> impl Iterator<Item = Range<usize>> {
    (0..num_events)
        .step_by(EVENT_BATCH_SIZE)
        .map(move |start| start..(start + EVENT_BATCH_SIZE).min(num_events))
}

/// Run the analysis in the manner that was configured at build time.
///
/// Takes as parameters the total number of events to be analysed, and a
/// kernel that analyses a batch of events, given by their index range.
///
/// Returns the merged, not yet finalized results. The batches are merged in
/// index order whatever the execution order, so the floating-point sums do
/// not depend on thread scheduling.
///
pub fn run_analysis(
    num_events: usize,
    analyse_batch: impl Send + Sync + Fn(Range<usize>) -> Result<ResultsAccumulator>,
) -> Result<ResultsAccumulator> {
    // Check that the caller is being reasonable (should have already been
    // checked at configuration time, but bugs can happen...)
    assert!(num_events > 0, "Must analyse at least one event");

    // ...in sequential mode
    #[cfg(not(feature = "multi-threading"))]
    {
        sequential::run_analysis_impl(num_events, analyse_batch)
    }

    // ...in multi-threaded mode
    #[cfg(feature = "multi-threading")]
    {
        multi_threading::run_analysis_impl(num_events, analyse_batch)
    }
}
