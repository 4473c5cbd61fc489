//! Bookkeeping for background retrain jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ml::QualityTier;
use crate::training::TrainingReport;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrainJobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// The job overran its deadline and was abandoned; no model was installed.
    TimedOut,
}

impl RetrainJobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::TimedOut)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrainRequest {
    pub days: u32,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrainSummary {
    pub total_orders: usize,
    pub accuracy: f64,
    pub macro_f1: f64,
    pub quality: QualityTier,
    pub model_version: u64,
}

impl RetrainSummary {
    pub fn from_report(report: &TrainingReport, model_version: u64) -> Self {
        Self {
            total_orders: report.total_orders,
            accuracy: report.evaluation.accuracy,
            macro_f1: report.evaluation.macro_f1,
            quality: report.quality(),
            model_version,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrainJobRecord {
    pub job_id: Uuid,
    pub state: RetrainJobState,
    pub request: RetrainRequest,
    pub requested_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub summary: Option<RetrainSummary>,
    pub error: Option<String>,
}

impl RetrainJobRecord {
    pub fn pending(request: RetrainRequest) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            state: RetrainJobState::Pending,
            request,
            requested_at: Utc::now(),
            started_at: None,
            finished_at: None,
            summary: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = RetrainJobState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_succeeded(&mut self, summary: RetrainSummary) {
        self.finish(RetrainJobState::Succeeded);
        self.summary = Some(summary);
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.finish(RetrainJobState::Failed);
        self.error = Some(error.into());
    }

    pub fn mark_timed_out(&mut self, timeout_secs: u64) {
        self.finish(RetrainJobState::TimedOut);
        self.error = Some(format!("retrain exceeded {timeout_secs}s and was abandoned"));
    }

    fn finish(&mut self, state: RetrainJobState) {
        self.state = state;
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::{RetrainJobRecord, RetrainJobState, RetrainRequest};

    #[test]
    fn lifecycle_timestamps_follow_state_changes() {
        let mut record = RetrainJobRecord::pending(RetrainRequest { days: 30, seed: Some(1) });
        assert_eq!(record.state, RetrainJobState::Pending);
        assert!(record.started_at.is_none());

        record.mark_running();
        assert!(record.started_at.is_some());
        assert!(!record.state.is_terminal());

        record.mark_timed_out(60);
        assert_eq!(record.state, RetrainJobState::TimedOut);
        assert!(record.state.is_terminal());
        assert!(record.finished_at.is_some());
        assert!(record.error.as_deref().is_some_and(|error| error.contains("60s")));
    }

    #[test]
    fn states_serialize_in_snake_case() {
        let json = serde_json::to_string(&RetrainJobState::TimedOut).expect("serialize");
        assert_eq!(json, "\"timed_out\"");
        assert_eq!(RetrainJobState::TimedOut.as_str(), "timed_out");
    }
}
