//! Append-only JSONL trace event log.

use crate::core::types::{TimestampedEvent, TraceEvent};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Current time as unix epoch seconds.
pub fn now_epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Generate a run ID, unique within the process.
pub fn generate_run_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let seq = RUN_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("b-{:012x}-{:04x}", nanos & 0xFFFF_FFFF_FFFF, seq & 0xFFFF)
}

/// Derive the event log path within the trace directory.
pub fn event_log_path(trace_dir: &Path) -> PathBuf {
    trace_dir.join("events.jsonl")
}

/// Append an event to the trace log, one JSON object per line.
pub fn append_event(trace_dir: &Path, event: TraceEvent) -> Result<(), String> {
    let path = event_log_path(trace_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create trace dir: {}", e))?;
    }

    let te = TimestampedEvent {
        ts: now_epoch_seconds(),
        event,
    };
    let json = serde_json::to_string(&te).map_err(|e| format!("JSON serialize error: {}", e))?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| format!("cannot open trace log {}: {}", path.display(), e))?;

    writeln!(file, "{}", json).map_err(|e| format!("write error: {}", e))?;

    Ok(())
}
