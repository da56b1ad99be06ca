//! crates/finance_tracker_core/src/progress.rs
//!
//! Advisory, in-process progress reporting for long-running mailbox syncs.
//! The registry lives in ordinary process memory: it is lost on restart and
//! is not a source of truth, only polled UI feedback. Reads never block on
//! writes; concurrent syncs for one user interleave last-write-wins.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

/// Coarse state of a sync run. `Error` is terminal and reachable from any
/// non-idle state; `Idle` is what an observer sees when no run has ever
/// been recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Starting,
    Searching,
    Downloading,
    Extracting,
    Completed,
    Error,
}

/// One user's most recent progress report, overwritten on every update.
#[derive(Debug, Clone, Serialize)]
pub struct SyncProgress {
    pub status: SyncStatus,
    pub current_step: String,
    pub total_steps: usize,
    pub completed_steps: usize,
    pub timestamp: DateTime<Utc>,
}

impl SyncProgress {
    fn idle() -> Self {
        Self {
            status: SyncStatus::Idle,
            current_step: String::new(),
            total_steps: 0,
            completed_steps: 0,
            timestamp: Utc::now(),
        }
    }
}

/// Process-wide progress map keyed by user id. Stale entries persist until
/// the next run overwrites them, which is acceptable for advisory state.
#[derive(Default)]
pub struct SyncProgressRegistry {
    inner: DashMap<i64, SyncProgress>,
}

impl SyncProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(
        &self,
        user_id: i64,
        status: SyncStatus,
        current_step: impl Into<String>,
        total_steps: usize,
        completed_steps: usize,
    ) {
        self.inner.insert(
            user_id,
            SyncProgress {
                status,
                current_step: current_step.into(),
                total_steps,
                completed_steps,
                timestamp: Utc::now(),
            },
        );
    }

    /// Current progress for a user, defaulting to an idle report when no
    /// run has ever been recorded.
    pub fn snapshot(&self, user_id: i64) -> SyncProgress {
        self.inner
            .get(&user_id)
            .map(|entry| entry.clone())
            .unwrap_or_else(SyncProgress::idle)
    }
}
