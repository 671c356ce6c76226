//! Run summary exposed by the status endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the most recent sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// No run has started since the process came up
    Idle,
    Running,
    Completed,
    Error,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Idle => "idle",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Snapshot of the last (or current) run.
///
/// Serialises as
/// `{status, timestamp, processedCount, totalRecordings, failedCount, skippedCount, error}`
/// with `runId` added once a run has started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub status: RunStatus,
    /// Time of the last status transition or progress update
    pub timestamp: DateTime<Utc>,
    /// Recordings newly transferred in this run
    pub processed_count: u32,
    /// Recordings returned by the provider
    pub total_recordings: u32,
    pub failed_count: u32,
    /// Recordings not ready or without a download locator
    pub skipped_count: u32,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl RunSummary {
    pub fn idle(now: DateTime<Utc>) -> Self {
        Self {
            status: RunStatus::Idle,
            timestamp: now,
            processed_count: 0,
            total_recordings: 0,
            failed_count: 0,
            skipped_count: 0,
            error: None,
            run_id: None,
        }
    }

    /// Fresh summary for a run that just started. Counters reset.
    pub fn started(run_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            status: RunStatus::Running,
            run_id: Some(run_id.into()),
            ..Self::idle(now)
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }

    pub(crate) fn complete(&mut self, now: DateTime<Utc>) {
        self.status = RunStatus::Completed;
        self.timestamp = now;
        self.error = None;
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        self.status = RunStatus::Error;
        self.timestamp = now;
        self.error = Some(message.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_summary_json_shape() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut summary = RunSummary::started("run-1", now);
        summary.processed_count = 1;
        summary.total_recordings = 2;
        summary.complete(now);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["processedCount"], 1);
        assert_eq!(json["totalRecordings"], 2);
        assert_eq!(json["failedCount"], 0);
        assert_eq!(json["skippedCount"], 0);
        assert!(json["error"].is_null());
        assert_eq!(json["runId"], "run-1");
        assert_eq!(json["timestamp"], "2024-05-01T12:00:00Z");
    }

    #[test]
    fn test_idle_summary_omits_run_id() {
        let json = serde_json::to_value(RunSummary::idle(Utc::now())).unwrap();
        assert_eq!(json["status"], "idle");
        assert!(json.get("runId").is_none());
        assert!(json.as_object().unwrap().contains_key("error"));
    }

    #[test]
    fn test_fail_records_message() {
        let now = Utc::now();
        let mut summary = RunSummary::started("run-2", now);
        summary.fail("Authentication failed: invalid_grant", now);
        assert_eq!(summary.status, RunStatus::Error);
        assert_eq!(
            summary.error.as_deref(),
            Some("Authentication failed: invalid_grant")
        );
        assert!(!summary.is_running());
    }
}
