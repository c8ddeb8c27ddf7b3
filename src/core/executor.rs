//! Batch executor — snapshot the queue, dispatch concurrently, publish.
//!
//! Dispatch uses a worker pool sized `min(max_workers, batch length)` and a
//! full-batch barrier: workers compute outcomes and return them, and only
//! the driver thread publishes into the result cache once every call in the
//! batch has finished. No partial publication, no ordering among calls in
//! one batch, no cancellation of an in-flight call.

use crate::core::fingerprint::Fingerprint;
use crate::core::scheduler::Scheduler;
use crate::core::types::{BatchReport, CallOutcome, EngineError, TraceEvent, Value};
use std::time::Instant;

/// Outcome of one dispatched call, as computed on a worker thread.
struct Completed {
    fingerprint: Fingerprint,
    outcome: CallOutcome,
    duration_seconds: f64,
}

/// Dispatch every queued call concurrently and publish the outcomes.
/// An empty queue is a no-op.
pub fn execute(sched: &Scheduler) -> Result<BatchReport, EngineError> {
    use rayon::prelude::*;

    let start = Instant::now();
    let batch = sched.take_batch();
    if batch.is_empty() {
        return Ok(BatchReport::default());
    }

    let batch_index = sched.next_batch_index();
    sched.trace(TraceEvent::BatchDispatched {
        run_id: sched.run_id().to_string(),
        batch: batch_index,
        calls: batch.len(),
    });

    let workers = batch.len().min(sched.config().max_workers);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| EngineError::Pool(e.to_string()))?;

    let completed: Vec<Completed> = pool.install(|| {
        batch
            .par_iter()
            .map(|call| {
                let call_start = Instant::now();
                let outcome = match call.callable.call(&call.args) {
                    Ok(Value::List(items)) if call.callable.yields_sequence() => {
                        CallOutcome::Sequence(items.as_ref().clone())
                    }
                    Ok(value) => CallOutcome::Value(value),
                    Err(message) => CallOutcome::Failed(message),
                };
                Completed {
                    fingerprint: call.fingerprint.clone(),
                    outcome,
                    duration_seconds: call_start.elapsed().as_secs_f64(),
                }
            })
            .collect()
    });

    // Single-writer publication, after the full-batch barrier.
    let mut failed = 0u32;
    for done in completed {
        match &done.outcome {
            CallOutcome::Failed(error) => {
                failed += 1;
                sched.trace(TraceEvent::CallFailed {
                    run_id: sched.run_id().to_string(),
                    fingerprint: done.fingerprint.to_string(),
                    error: error.clone(),
                });
            }
            _ => {
                sched.trace(TraceEvent::CallResolved {
                    run_id: sched.run_id().to_string(),
                    fingerprint: done.fingerprint.to_string(),
                    duration_seconds: done.duration_seconds,
                });
            }
        }
        sched.publish(done.fingerprint, done.outcome);
    }
    let dispatched = batch.len() as u32;
    sched.record_dispatch(u64::from(dispatched), u64::from(failed));

    Ok(BatchReport {
        dispatched,
        failed,
        total_duration: start.elapsed(),
    })
}
