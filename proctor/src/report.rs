//! Run reports: the per-suite result handed to the surrounding runner.

use chrono::{DateTime, Utc};
use proctor_common::{BatchKind, Failure, SuiteName};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of one method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MethodStatus {
    Passed,
    Failed { failure: Failure },
    Skipped { reason: String },
}

impl MethodStatus {
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Failed { failure } => Some(failure),
            _ => None,
        }
    }
}

/// Report for one method of the suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodReport {
    pub name: String,
    #[serde(flatten)]
    pub status: MethodStatus,
    pub duration_ms: u64,
}

/// Aggregated counts over a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Full result of running one suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub suite: SuiteName,
    pub batch: BatchKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub methods: Vec<MethodReport>,
    /// Suite-level failure: setup, teardown or leak invariant. Method
    /// failures stay with their methods and are never folded in here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite_error: Option<Failure>,
}

impl RunReport {
    /// Whether everything passed: no failed method, no suite error.
    /// Skipped methods do not fail a run.
    pub fn passed(&self) -> bool {
        self.suite_error.is_none() && !self.methods.iter().any(|m| m.status.is_failed())
    }

    pub fn counts(&self) -> RunCounts {
        let mut counts = RunCounts {
            passed: 0,
            failed: 0,
            skipped: 0,
        };
        for method in &self.methods {
            match method.status {
                MethodStatus::Passed => counts.passed += 1,
                MethodStatus::Failed { .. } => counts.failed += 1,
                MethodStatus::Skipped { .. } => counts.skipped += 1,
            }
        }
        counts
    }

    /// Look up a method's report by name.
    pub fn method(&self, name: &str) -> Option<&MethodReport> {
        self.methods.iter().find(|m| m.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_with(statuses: Vec<(&str, MethodStatus)>) -> RunReport {
        RunReport {
            run_id: Uuid::new_v4(),
            suite: SuiteName::new("S"),
            batch: BatchKind::Unbatched,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            methods: statuses
                .into_iter()
                .map(|(name, status)| MethodReport {
                    name: name.to_string(),
                    status,
                    duration_ms: 1,
                })
                .collect(),
            suite_error: None,
        }
    }

    #[test]
    fn test_counts_and_passed() {
        let report = report_with(vec![
            ("a", MethodStatus::Passed),
            (
                "b",
                MethodStatus::Skipped {
                    reason: "disabled".to_string(),
                },
            ),
            (
                "c",
                MethodStatus::Failed {
                    failure: Failure::assertion("boom"),
                },
            ),
        ]);

        let counts = report.counts();
        assert_eq!(counts.passed, 1);
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.failed, 1);
        assert!(!report.passed());
    }

    #[test]
    fn test_skips_do_not_fail_a_run() {
        let report = report_with(vec![(
            "only",
            MethodStatus::Skipped {
                reason: "env".to_string(),
            },
        )]);
        assert!(report.passed());
    }

    #[test]
    fn test_suite_error_fails_the_run() {
        let mut report = report_with(vec![("a", MethodStatus::Passed)]);
        assert!(report.passed());
        report.suite_error = Some(Failure::leak("still alive"));
        assert!(!report.passed());
    }

    #[test]
    fn test_json_shape_tags_statuses() {
        let report = report_with(vec![
            ("ok", MethodStatus::Passed),
            (
                "bad",
                MethodStatus::Failed {
                    failure: Failure::assertion("boom"),
                },
            ),
        ]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["methods"][0]["status"], "passed");
        assert_eq!(json["methods"][1]["status"], "failed");
        assert_eq!(json["methods"][1]["failure"]["message"], "boom");
        // Round trip.
        let back: RunReport = serde_json::from_value(json).unwrap();
        assert_eq!(back, report);
    }
}
