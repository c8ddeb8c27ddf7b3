//! The scheduler — single owner of the queue, caches, and capture scope.
//!
//! One instance per batching context, with an explicit per-round lifecycle:
//! each round starts with a fresh queue and attribute cache, while the
//! result cache accumulates until explicitly cleared. All shared state is
//! mutated on the driver thread only; worker threads compute call outcomes
//! and hand them back for publication.

use crate::core::config::{self, SchedulerConfig};
use crate::core::driver;
use crate::core::executor;
use crate::core::fingerprint::{fingerprint_member, Fingerprint};
use crate::core::handle::{Handle, HandleCore, Mode};
use crate::core::queue::{CallQueue, PendingCall};
use crate::core::resolver::{self, Scope};
use crate::core::types::{
    BatchReport, CallOutcome, EngineError, EngineStats, RoundReport, TraceEvent, Value,
};
use crate::trace::eventlog;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::sync::Arc;

pub struct Scheduler {
    config: SchedulerConfig,
    scope: Scope,
    queue: RefCell<CallQueue>,
    results: RefCell<FxHashMap<Fingerprint, CallOutcome>>,
    attrs: RefCell<FxHashMap<Fingerprint, Arc<HandleCore>>>,
    stats: RefCell<EngineStats>,
    run_id: String,
}

impl Scheduler {
    /// Build a scheduler from a validated config.
    pub fn new(config: SchedulerConfig) -> Result<Self, EngineError> {
        let issues = config::validate_config(&config);
        if !issues.is_empty() {
            let messages: Vec<String> = issues.iter().map(|e| e.to_string()).collect();
            return Err(EngineError::Config(messages.join("; ")));
        }
        Ok(Self::build(config))
    }

    /// Build a scheduler with default configuration.
    pub fn with_defaults() -> Self {
        Self::build(SchedulerConfig::default())
    }

    fn build(config: SchedulerConfig) -> Self {
        Self {
            config,
            scope: Scope::new(),
            queue: RefCell::new(CallQueue::default()),
            results: RefCell::new(FxHashMap::default()),
            attrs: RefCell::new(FxHashMap::default()),
            stats: RefCell::new(EngineStats::default()),
            run_id: eventlog::generate_run_id(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn default_mode(&self) -> Mode {
        if self.config.serial {
            Mode::Serial
        } else {
            Mode::Deferred
        }
    }

    // ------------------------------------------------------------------
    // Captures and roots
    // ------------------------------------------------------------------

    /// Bind a named capture in the innermost scope frame.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.scope.bind(name, value);
    }

    /// Open a nested capture frame.
    pub fn push_scope(&mut self) {
        self.scope.push();
    }

    /// Close the innermost capture frame.
    pub fn pop_scope(&mut self) {
        self.scope.pop();
    }

    /// Wrap an arbitrary value as a deferred root.
    pub fn root(&self, value: Value) -> Handle<'_> {
        self.root_with_mode(value, self.default_mode())
    }

    /// Wrap a value as a root with an explicit resolution mode.
    pub fn root_with_mode(&self, value: Value, mode: Mode) -> Handle<'_> {
        Handle::from_core(
            self,
            Arc::new(HandleCore::new(value, String::new(), mode)),
        )
    }

    /// Resolve a free name (scope, then builtins) into a root handle.
    /// Cached per name, so repeated resolution within a round shares one
    /// handle core.
    pub fn name(&self, name: &str) -> Result<Handle<'_>, EngineError> {
        let key = fingerprint_member("scope", name);
        if let Some(core) = self.cached_attr(&key) {
            return Ok(Handle::from_core(self, core));
        }
        let value = resolver::resolve_name(&self.scope, name)?;
        let core = Arc::new(HandleCore::new(
            value,
            name.to_string(),
            self.default_mode(),
        ));
        self.cache_attr(key, core.clone());
        Ok(Handle::from_core(self, core))
    }

    // ------------------------------------------------------------------
    // Round operations
    // ------------------------------------------------------------------

    /// Drive a body to convergence.
    pub fn auto<T, F>(&self, body: F) -> Result<RoundReport<T>, EngineError>
    where
        F: FnMut(&Scheduler) -> Result<T, EngineError>,
    {
        driver::converge(self, body)
    }

    /// Dispatch every queued call once, without the replay machinery.
    pub fn flush(&self) -> Result<BatchReport, EngineError> {
        executor::execute(self)
    }

    /// Clear the pending queue for a fresh round. Resolved results are
    /// kept.
    pub fn reset(&self) {
        self.queue.borrow_mut().clear();
    }

    /// Discard the result and attribute caches.
    pub fn clear_caches(&self) {
        self.results.borrow_mut().clear();
        self.attrs.borrow_mut().clear();
    }

    /// Queued calls awaiting dispatch.
    pub fn queued(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Snapshot of the cumulative counters.
    pub fn stats(&self) -> EngineStats {
        self.stats.borrow().clone()
    }

    // ------------------------------------------------------------------
    // Engine internals (driver thread only)
    // ------------------------------------------------------------------

    /// Start a round: fresh queue, fresh attribute cache.
    pub(crate) fn begin_round(&self) {
        self.queue.borrow_mut().clear();
        self.attrs.borrow_mut().clear();
    }

    pub(crate) fn enqueue(&self, call: PendingCall) {
        let inserted = self.queue.borrow_mut().insert(call);
        let mut stats = self.stats.borrow_mut();
        if inserted {
            stats.calls_enqueued += 1;
        } else {
            stats.dedup_hits += 1;
        }
    }

    pub(crate) fn take_batch(&self) -> Vec<PendingCall> {
        self.queue.borrow_mut().take_batch()
    }

    pub(crate) fn cached_result(&self, fingerprint: &Fingerprint) -> Option<CallOutcome> {
        self.results.borrow().get(fingerprint).cloned()
    }

    pub(crate) fn publish(&self, fingerprint: Fingerprint, outcome: CallOutcome) {
        self.results.borrow_mut().insert(fingerprint, outcome);
    }

    pub(crate) fn cached_attr(&self, key: &Fingerprint) -> Option<Arc<HandleCore>> {
        self.attrs.borrow().get(key).cloned()
    }

    pub(crate) fn cache_attr(&self, key: Fingerprint, core: Arc<HandleCore>) {
        self.attrs.borrow_mut().insert(key, core);
    }

    pub(crate) fn note_cache_hit(&self) {
        self.stats.borrow_mut().cache_hits += 1;
    }

    pub(crate) fn next_batch_index(&self) -> u64 {
        let mut stats = self.stats.borrow_mut();
        stats.batches += 1;
        stats.batches
    }

    pub(crate) fn record_dispatch(&self, dispatched: u64, failed: u64) {
        let mut stats = self.stats.borrow_mut();
        stats.dispatched += dispatched;
        stats.failed += failed;
    }

    pub(crate) fn trace(&self, event: TraceEvent) {
        if let Some(dir) = &self.config.trace_dir {
            let _ = eventlog::append_event(dir, event);
        }
    }
}
