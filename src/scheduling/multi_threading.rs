//! Multi-threaded back-end of the analysis

use crate::{errors::Result, resacc::ResultsAccumulator, scheduling::batches};

use std::{ops::Range, sync::Mutex};

/// Analyse events in multi-threaded mode
///
/// Every batch is analysed by its own task. Results are merged in batch order
/// once all tasks are done, which makes them reproducible.
///
pub fn run_analysis_impl(
    num_events: usize,
    analyse_batch: impl Send + Sync + Fn(Range<usize>) -> Result<ResultsAccumulator>,
) -> Result<ResultsAccumulator> {
    let batches = batches(num_events).collect::<Vec<_>>();
    let accumulator = ReproducibleAccumulator::new(batches.len());

    // This function is a synchronization scope: it will only return
    // once all inner tasks have been executed
    rayon::scope(|scope| {
        for (batch_id, batch) in batches.into_iter().enumerate() {
            let accumulator_ref = &accumulator;
            let analyse_batch_ref = &analyse_batch;
            scope.spawn(move |_| {
                let result = analyse_batch_ref(batch);
                accumulator_ref.set_task_result(batch_id, result);
            });
        }
    });

    // Extract the results from the accumulator
    accumulator.get_merged_result()
}

/// Reproducibility-optimized results accumulation mechanism
struct ReproducibleAccumulator {
    /// Storage for the intermediary analysis results of parallel tasks
    results: Box<[Mutex<Option<Result<ResultsAccumulator>>>]>,
}
//
impl ReproducibleAccumulator {
    /// Set up results storage for N parallel tasks
    fn new(num_tasks: usize) -> Self {
        assert!(num_tasks > 0, "There should be at least one task");
        Self {
            results: (0..num_tasks)
                .map(|_| Mutex::new(None))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
        }
    }

    /// Integrate the results of the n-th analysis task
    fn set_task_result(&self, task_id: usize, result: Result<ResultsAccumulator>) {
        let mut lock = self.results[task_id]
            .lock()
            .expect("Mutex data should be valid");
        assert!(lock.is_none(), "Tasks should not report results twice");
        *lock = Some(result);
    }

    /// Aggregate the results in a reproducible fashion
    fn get_merged_result(self) -> Result<ResultsAccumulator> {
        // Start iterating over the task results
        let mut results_iter = self.results.into_vec().into_iter().map(|entry| {
            entry
                .into_inner()
                .expect("Mutex data should be valid")
                .expect("Result should be ready")
        });

        // Initialize results storage with the result of the first task
        let first_result = results_iter
            .next()
            .expect("There should be at least one task")?;

        // Merge the results of the other tasks
        results_iter.try_fold(first_result, |mut r1, r2| {
            r1.merge(r2?)?;
            Ok(r1)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analyser::{Calibration, FlowAnalyser},
        config::AnalysisConfig,
        event::Event,
    };

    #[test]
    fn results_are_merged_whatever_the_completion_order() {
        let analyser =
            FlowAnalyser::new(AnalysisConfig::default(), Calibration::default()).unwrap();
        let accumulator = ReproducibleAccumulator::new(3);
        for task_id in [2, 0, 1] {
            let events = (0..=task_id)
                .map(|id| Event::new(id as u64, Vec::new()))
                .collect::<Vec<_>>();
            accumulator.set_task_result(task_id, analyser.accumulate(&events));
        }
        let merged = accumulator.get_merged_result().unwrap();
        assert_eq!(merged.num_events(), 6);
    }
}
