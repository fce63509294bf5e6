//! Sequential back-end of the analysis

use crate::{errors::Result, resacc::ResultsAccumulator, scheduling::batches};

use std::ops::Range;

/// Analyse events in sequential mode
///
/// We use batched logic even in sequential mode, in order to achieve
/// reproducibility with respect to multi-threaded runs.
///
/// Note that this is anyways generally a good thing to do when accumulating
/// lots of results, as otherwise the accumulator will eventually grow much
/// larger than the accumulated values and numerical accumulation errors
/// will start to blow up.
///
pub fn run_analysis_impl(
    num_events: usize,
    analyse_batch: impl Fn(Range<usize>) -> Result<ResultsAccumulator>,
) -> Result<ResultsAccumulator> {
    let mut batches = batches(num_events);

    // Initialize the accumulator with the first batch of events
    let first_batch = batches.next().expect("There should be at least one batch");
    let mut accumulator = analyse_batch(first_batch)?;

    // Analyse and integrate the other batches
    for batch in batches {
        accumulator.merge(analyse_batch(batch)?)?;
    }
    Ok(accumulator)
}
