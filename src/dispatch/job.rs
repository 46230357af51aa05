use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::proto;

/// Phase of a two-phase batch computation. All map jobs complete before any
/// reduce job starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Map,
    Reduce,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Map => write!(f, "map"),
            Phase::Reduce => write!(f, "reduce"),
        }
    }
}

impl From<Phase> for proto::Phase {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Map => proto::Phase::Map,
            Phase::Reduce => proto::Phase::Reduce,
        }
    }
}

/// One unit of work. Not stored anywhere; it exists for the duration of a
/// dispatch attempt (or chain of retry attempts).
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub input: String,
    pub phase: Phase,
    pub job_number: u32,
    /// Count of jobs in the other phase, so the worker knows how many
    /// output partitions to produce or read.
    pub other_phase_count: u32,
}

impl JobSpec {
    pub fn to_request(&self) -> proto::AssignJobRequest {
        proto::AssignJobRequest {
            input: self.input.clone(),
            phase: proto::Phase::from(self.phase) as i32,
            job_number: self.job_number,
            other_phase_count: self.other_phase_count,
        }
    }
}

/// Jobs completed by one worker, as reported in its shutdown reply.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerReport {
    pub address: String,
    pub jobs_completed: u64,
}

/// Outcome of a full run: per-worker job counts plus wall-clock bounds.
/// Workers unreachable during shutdown are absent from `reports`.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchSummary {
    pub reports: Vec<WorkerReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DispatchSummary {
    pub fn total_jobs(&self) -> u64 {
        self.reports.iter().map(|r| r.jobs_completed).sum()
    }
}
