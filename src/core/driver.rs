//! Replay driver — the fixed-point convergence loop.
//!
//! One round: run the body from the top; a `NotReady` outcome aborts the
//! pass, and the driver compares the queue size against the previous pass.
//! Growth means the body pushed further, so replay immediately; a fixed
//! point (no new call discovered) means it is safe to dispatch a batch.
//! The round ends when the body completes cleanly.
//!
//! Contract: the body must be safely re-runnable — idempotent up to its
//! first unresolved dependency — because every pass re-executes it from the
//! start. A body that queues calls it never consumes converges with those
//! calls still queued; `flush` or `reset` them afterwards.

use crate::core::executor;
use crate::core::scheduler::Scheduler;
use crate::core::types::{EngineError, RoundReport, TraceEvent};
use std::time::Instant;

/// Drive a body to convergence, returning its value plus round counters.
pub fn converge<T, F>(sched: &Scheduler, mut body: F) -> Result<RoundReport<T>, EngineError>
where
    F: FnMut(&Scheduler) -> Result<T, EngineError>,
{
    let start = Instant::now();
    sched.begin_round();
    sched.trace(TraceEvent::RoundStarted {
        run_id: sched.run_id().to_string(),
        engine_version: env!("CARGO_PKG_VERSION").to_string(),
    });

    let mut passes = 0u32;
    let mut batches = 0u32;
    let mut prev_queue: Option<usize> = None;
    let mut stable = 0u32;

    loop {
        passes += 1;
        match body(sched) {
            Ok(value) => {
                sched.trace(TraceEvent::RoundConverged {
                    run_id: sched.run_id().to_string(),
                    passes,
                    batches,
                    total_seconds: start.elapsed().as_secs_f64(),
                });
                return Ok(RoundReport {
                    value,
                    passes,
                    batches,
                    total_duration: start.elapsed(),
                });
            }
            Err(EngineError::NotReady { .. }) => {
                let queued = sched.queued();
                sched.trace(TraceEvent::PassObserved {
                    run_id: sched.run_id().to_string(),
                    pass: passes,
                    queued,
                });

                if prev_queue == Some(queued) {
                    stable += 1;
                } else {
                    stable = 0;
                }
                prev_queue = Some(queued);

                if stable >= sched.config().stabilization_passes {
                    if batches >= sched.config().max_batches {
                        return Err(EngineError::RoundLimit {
                            limit: sched.config().max_batches,
                        });
                    }
                    executor::execute(sched)?;
                    batches += 1;
                    stable = 0;
                    prev_queue = None;
                }
            }
            Err(other) => return Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Callable, Member, Object};
    use crate::core::config::SchedulerConfig;
    use crate::core::types::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Network-ish collaborator: every method sleeps, then answers.
    struct SlowService {
        delay: Duration,
        invocations: Arc<AtomicUsize>,
    }

    impl Object for SlowService {
        fn type_name(&self) -> &'static str {
            "slow-service"
        }

        fn member(&self, name: &str) -> Option<Member> {
            match name {
                "add_one" => Some(Member::Method(Arc::new(AddOneFn {
                    delay: self.delay,
                    invocations: self.invocations.clone(),
                }))),
                "echo" => Some(Member::Method(Arc::new(EchoFn {
                    delay: self.delay,
                    invocations: self.invocations.clone(),
                }))),
                _ => None,
            }
        }

        fn token(&self) -> Option<String> {
            Some("slow-service".to_string())
        }
    }

    struct AddOneFn {
        delay: Duration,
        invocations: Arc<AtomicUsize>,
    }

    impl Callable for AddOneFn {
        fn token(&self) -> String {
            "slow-service:add_one".to_string()
        }

        fn call(&self, args: &[Value]) -> Result<Value, String> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            let n = args
                .first()
                .and_then(Value::as_int)
                .ok_or_else(|| "add_one expects an integer".to_string())?;
            Ok(Value::Int(n + 1))
        }
    }

    struct EchoFn {
        delay: Duration,
        invocations: Arc<AtomicUsize>,
    }

    impl Callable for EchoFn {
        fn token(&self) -> String {
            "slow-service:echo".to_string()
        }

        fn call(&self, args: &[Value]) -> Result<Value, String> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            args.first()
                .cloned()
                .ok_or_else(|| "echo expects one argument".to_string())
        }
    }

    struct Boom;

    impl Callable for Boom {
        fn token(&self) -> String {
            "boom".to_string()
        }

        fn call(&self, _args: &[Value]) -> Result<Value, String> {
            Err("boom".to_string())
        }
    }

    fn service_sched(delay_ms: u64) -> (Scheduler, Arc<AtomicUsize>) {
        let invocations = Arc::new(AtomicUsize::new(0));
        let mut sched = Scheduler::with_defaults();
        sched.bind(
            "service",
            Value::object(SlowService {
                delay: Duration::from_millis(delay_ms),
                invocations: invocations.clone(),
            }),
        );
        (sched, invocations)
    }

    #[test]
    fn test_body_without_deferred_calls_converges_in_one_pass() {
        let sched = Scheduler::with_defaults();
        let report = converge(&sched, |_| Ok(42)).unwrap();
        assert_eq!(report.value, 42);
        assert_eq!(report.passes, 1);
        assert_eq!(report.batches, 0);
    }

    #[test]
    fn test_two_dependency_levels_take_two_batches() {
        let (sched, invocations) = service_sched(1);

        let report = converge(&sched, |s| {
            let service = s.name("service")?;
            let first = service.get("add_one")?.call(vec![Value::Int(1)])?;
            let second = service.get("add_one")?.call(vec![first.value()])?;
            Ok(second.value())
        })
        .unwrap();

        assert_eq!(report.value.as_int(), Some(3));
        assert_eq!(report.batches, 2);
        assert_eq!(invocations.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dedup_single_dispatch() {
        let (sched, invocations) = service_sched(1);

        let report = converge(&sched, |s| {
            let echo = s.name("service")?.get("echo")?;
            let a = echo.call(vec![Value::Int(5)])?;
            let b = echo.call(vec![Value::Int(5)])?;
            Ok((a.value(), b.value()))
        })
        .unwrap();

        let (a, b) = report.value;
        assert_eq!(a.as_int(), Some(5));
        assert_eq!(b.as_int(), Some(5));
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
        assert_eq!(sched.stats().dispatched, 1);
    }

    #[test]
    fn test_loop_over_sequence_batches_once() {
        let (sched, invocations) = service_sched(50);

        let start = Instant::now();
        let report = converge(&sched, |s| {
            let echo = s.name("service")?.get("echo")?;
            let numbers = s.name("range")?.call(vec![Value::Int(40)])?;
            let mut total = 0i64;
            for item in numbers.iter()?.take(40) {
                let out = echo.call(vec![item.value()])?;
                total += out.value().as_int().unwrap_or(0);
            }
            Ok(total)
        })
        .unwrap();
        let elapsed = start.elapsed();

        // 0 + 1 + ... + 39, regardless of cursor rotation
        assert_eq!(report.value, 780);
        // One batch for range, one for all forty echoes
        assert_eq!(report.batches, 2);
        assert_eq!(invocations.load(Ordering::SeqCst), 40);
        // Serial execution would need 2 seconds of sleeping
        assert!(
            elapsed < Duration::from_secs(1),
            "round took {:?}, expected one batch of concurrent calls",
            elapsed
        );
    }

    #[test]
    fn test_cache_reuse_across_rounds() {
        let (sched, invocations) = service_sched(1);

        let body = |s: &Scheduler| {
            let out = s.name("service")?.get("echo")?.call(vec![Value::Int(9)])?;
            Ok(out.value())
        };

        let first = converge(&sched, body).unwrap();
        assert_eq!(first.batches, 1);
        assert_eq!(invocations.load(Ordering::SeqCst), 1);

        // Second round: the fingerprint is already resolved
        let second = converge(&sched, body).unwrap();
        assert_eq!(second.value.as_int(), Some(9));
        assert_eq!(second.passes, 1);
        assert_eq!(second.batches, 0);
        assert_eq!(invocations.load(Ordering::SeqCst), 1);

        // Until the caches are cleared
        sched.clear_caches();
        let third = converge(&sched, body).unwrap();
        assert_eq!(third.batches, 1);
        assert_eq!(invocations.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_callee_failure_propagates_without_retry() {
        let mut sched = Scheduler::with_defaults();
        sched.bind("boom", Value::callable(Boom));

        let body = |s: &Scheduler| {
            let out = s.name("boom")?.call(vec![])?;
            Ok(out.value())
        };

        for _ in 0..2 {
            let result = converge(&sched, body);
            assert!(matches!(
                result,
                Err(EngineError::CallFailed { ref message, .. }) if message == "boom"
            ));
        }
        assert_eq!(sched.stats().dispatched, 1);
    }

    #[test]
    fn test_unresolved_name_escapes() {
        let sched = Scheduler::with_defaults();
        let result = converge(&sched, |s| {
            let out = s.name("no_such_service")?.call(vec![])?;
            Ok(out.value())
        });
        assert!(matches!(result, Err(EngineError::UnresolvedName { .. })));
    }

    #[test]
    fn test_round_limit_stops_unresolvable_round() {
        let sched = Scheduler::new(SchedulerConfig {
            max_batches: 3,
            ..SchedulerConfig::default()
        })
        .unwrap();

        // The body reports NotReady forever without queueing anything, so
        // every stabilization fixed point dispatches an empty batch.
        let result: Result<RoundReport<()>, _> = converge(&sched, |_| {
            Err(EngineError::NotReady {
                path: "stuck".to_string(),
            })
        });
        assert!(matches!(
            result,
            Err(EngineError::RoundLimit { limit: 3 })
        ));
    }

    #[test]
    fn test_stabilization_threshold_delays_dispatch() {
        let mut sched = Scheduler::new(SchedulerConfig {
            stabilization_passes: 3,
            ..SchedulerConfig::default()
        })
        .unwrap();
        sched.bind(
            "service",
            Value::object(SlowService {
                delay: Duration::from_millis(1),
                invocations: Arc::new(AtomicUsize::new(0)),
            }),
        );

        let report = converge(&sched, |s| {
            let out = s.name("service")?.get("echo")?.call(vec![Value::Int(1)])?;
            Ok(out.value())
        })
        .unwrap();

        // 1 discovery pass + 3 stable passes + 1 converging pass
        assert_eq!(report.passes, 5);
        assert_eq!(report.batches, 1);
    }
}
