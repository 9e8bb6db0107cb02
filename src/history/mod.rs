//! SF-013: Run history. JSONL run events and BLAKE3 digests.

pub mod eventlog;
pub mod hasher;

use crate::core::types::RunMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One entry in a run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        run_id: String,
        plan_hash: String,
        mode: RunMode,
        steps: usize,
        sopflow_version: String,
    },
    StepCompleted {
        run_id: String,
        step: String,
        tool: String,
        duration_seconds: f64,
        output_hash: String,
    },
    StepSkipped {
        run_id: String,
        step: String,
        activate: String,
    },
    RunCompleted {
        run_id: String,
        steps_executed: usize,
        steps_skipped: usize,
        total_seconds: f64,
    },
    RunFailed {
        run_id: String,
        error: String,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: RunEvent,
}

/// Log handle for a single run. Write failures are logged, never fatal.
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
    run_id: String,
}

impl RunLog {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            run_id: eventlog::generate_run_id(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, event: RunEvent) {
        if let Err(e) = eventlog::append_event(&self.path, event) {
            tracing::warn!("run log {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sf013_event_tagging() {
        let te = TimestampedEvent {
            ts: "2026-01-01T00:00:00Z".to_string(),
            event: RunEvent::StepSkipped {
                run_id: "r-1".to_string(),
                step: "book".to_string(),
                activate: "0 > 0".to_string(),
            },
        };
        let json = serde_json::to_string(&te).unwrap();
        assert!(json.contains(r#""event":"step_skipped""#));
        assert!(json.contains(r#""ts":"2026-01-01T00:00:00Z""#));

        let back: TimestampedEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event, te.event);
    }

    #[test]
    fn test_sf013_run_log_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs/run.jsonl");
        let log = RunLog::new(&path);
        assert!(log.run_id().starts_with("r-"));
        log.record(RunEvent::RunFailed {
            run_id: log.run_id().to_string(),
            error: "boom".to_string(),
        });
        let content = std::fs::read_to_string(log.path()).unwrap();
        assert!(content.contains("run_failed"));
        assert!(content.contains("boom"));
    }

    #[test]
    fn test_sf013_run_log_unwritable_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        // a directory cannot be opened for append
        let log = RunLog::new(dir.path());
        log.record(RunEvent::RunFailed {
            run_id: log.run_id().to_string(),
            error: "x".to_string(),
        });
    }
}
