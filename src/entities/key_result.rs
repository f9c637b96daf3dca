// 🔑 Key Result Entity - measurable target + its checkpoints
//
// total_target and current_value are VALUES; progress and tier are always
// derived from them on read (see progress.rs), never stored as ground truth.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{OkrError, OkrResult};
use crate::locale::{format_br, format_br_date, format_compact};
use crate::progress::{checkpoint_status, classify_status_on, compute_progress, Tier};
use crate::schedule::{generate_checkpoints, CheckpointPlan, Frequency};

// ============================================================================
// KEY RESULT ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyResult {
    /// Stable identity (UUID) - NEVER changes
    pub id: String,
    pub objective_id: String,
    pub title: String,
    /// "R$", "%", "clientes", ...
    pub unit: String,
    pub total_target: f64,
    pub current_value: f64,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl KeyResult {
    /// Create a key result; the schedule it implies must be valid too
    pub fn new(
        objective_id: &str,
        title: &str,
        unit: &str,
        total_target: f64,
        frequency: Frequency,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> OkrResult<Self> {
        let title = title.trim();

        if title.is_empty() {
            return Err(OkrError::validation("title", "Required field is empty"));
        }

        if !(total_target.is_finite() && total_target > 0.0) {
            return Err(OkrError::validation(
                "total_target",
                format!("Must be greater than zero, got {}", total_target),
            ));
        }

        let kr = KeyResult {
            id: uuid::Uuid::new_v4().to_string(),
            objective_id: objective_id.to_string(),
            title: title.to_string(),
            unit: unit.trim().to_string(),
            total_target,
            current_value: 0.0,
            frequency,
            start_date,
            end_date,
            created_at: Utc::now(),
        };

        // Rejects end <= start before anything gets persisted
        kr.plan_checkpoints()?;

        Ok(kr)
    }

    pub fn progress(&self) -> f64 {
        compute_progress(self.current_value, self.total_target)
    }

    pub fn tier_on(&self, today: NaiveDate) -> Tier {
        classify_status_on(self.progress(), Some(self.end_date), today)
    }

    /// Checkpoint schedule for the current target / range / frequency
    pub fn plan_checkpoints(&self) -> OkrResult<Vec<CheckpointPlan>> {
        Ok(generate_checkpoints(
            self.total_target,
            self.start_date,
            self.end_date,
            self.frequency,
        )?)
    }

    /// Dashboard row with derived values and Brazilian display strings
    pub fn summary_on(&self, today: NaiveDate) -> KeyResultSummary {
        let progress = self.progress();
        let tier = self.tier_on(today);

        KeyResultSummary {
            id: self.id.clone(),
            objective_id: self.objective_id.clone(),
            title: self.title.clone(),
            unit: self.unit.clone(),
            frequency: self.frequency,
            total_target: self.total_target,
            current_value: self.current_value,
            total_target_display: format_br(self.total_target),
            current_value_display: format_br(self.current_value),
            progress,
            progress_display: format!("{}%", format_compact(progress, 1)),
            tier,
            tier_label: tier.label().to_string(),
            end_date: self.end_date,
            end_date_display: format_br_date(self.end_date),
        }
    }
}

/// Read model for dashboards and the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyResultSummary {
    pub id: String,
    pub objective_id: String,
    pub title: String,
    pub unit: String,
    pub frequency: Frequency,
    pub total_target: f64,
    pub current_value: f64,
    pub total_target_display: String,
    pub current_value_display: String,
    pub progress: f64,
    pub progress_display: String,
    pub tier: Tier,
    pub tier_label: String,
    pub end_date: NaiveDate,
    pub end_date_display: String,
}

// ============================================================================
// CHECKPOINT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Pending,
    InProgress,
    Completed,
    Overdue,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::Pending => "pending",
            CheckpointStatus::InProgress => "in_progress",
            CheckpointStatus::Completed => "completed",
            CheckpointStatus::Overdue => "overdue",
        }
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointStatus {
    type Err = OkrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CheckpointStatus::Pending),
            "in_progress" => Ok(CheckpointStatus::InProgress),
            "completed" => Ok(CheckpointStatus::Completed),
            "overdue" => Ok(CheckpointStatus::Overdue),
            other => Err(OkrError::validation(
                "status",
                format!("Unknown checkpoint status '{}'", other),
            )),
        }
    }
}

/// A dated, cumulative partial target of a key result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub key_result_id: String,
    /// 1-based position in the schedule; never reordered
    pub period_index: u32,
    pub period_label: String,
    pub target_value: f64,
    pub actual_value: Option<f64>,
    pub due_date: NaiveDate,
    pub status: CheckpointStatus,
}

impl Checkpoint {
    pub fn from_plan(key_result_id: &str, plan: CheckpointPlan) -> Self {
        Checkpoint {
            id: uuid::Uuid::new_v4().to_string(),
            key_result_id: key_result_id.to_string(),
            period_index: plan.period_index,
            period_label: plan.period_label,
            target_value: plan.target_value,
            actual_value: None,
            due_date: plan.due_date,
            status: plan.status,
        }
    }

    pub fn progress(&self) -> f64 {
        compute_progress(self.actual_value.unwrap_or(0.0), self.target_value)
    }

    pub fn tier_on(&self, today: NaiveDate) -> Tier {
        classify_status_on(self.progress(), Some(self.due_date), today)
    }

    /// Record a measured value and re-derive the status
    pub fn record(&mut self, actual: f64, today: NaiveDate) {
        self.actual_value = Some(actual);
        self.refresh_status(today);
    }

    pub fn refresh_status(&mut self, today: NaiveDate) {
        self.status = checkpoint_status(self.actual_value, self.target_value, self.due_date, today);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample() -> KeyResult {
        KeyResult::new(
            "obj-1",
            "Novos contratos",
            "R$",
            2500.0,
            Frequency::Quarterly,
            date(2025, 1, 1),
            date(2025, 9, 30),
        )
        .unwrap()
    }

    #[test]
    fn test_key_result_creation() {
        let kr = sample();

        assert!(!kr.id.is_empty());
        assert_eq!(kr.current_value, 0.0);
        assert_eq!(kr.progress(), 0.0);
        assert_eq!(kr.plan_checkpoints().unwrap().len(), 3);
    }

    #[test]
    fn test_key_result_validation() {
        let start = date(2025, 1, 1);
        let end = date(2025, 12, 31);

        let zero = KeyResult::new("o", "KR", "", 0.0, Frequency::Monthly, start, end);
        assert!(matches!(zero, Err(OkrError::Validation { .. })));

        let blank = KeyResult::new("o", " ", "", 10.0, Frequency::Monthly, start, end);
        assert!(matches!(blank, Err(OkrError::Validation { .. })));

        let backwards = KeyResult::new("o", "KR", "", 10.0, Frequency::Monthly, end, start);
        assert!(matches!(backwards, Err(OkrError::Schedule(_))));
    }

    #[test]
    fn test_summary_display_values() {
        let mut kr = sample();
        kr.current_value = 2187.5;

        let summary = kr.summary_on(date(2025, 8, 1));

        assert_eq!(summary.total_target_display, "2.500,00");
        assert_eq!(summary.current_value_display, "2.187,50");
        assert_eq!(summary.progress, 87.5);
        assert_eq!(summary.progress_display, "87,5%");
        assert_eq!(summary.tier, Tier::AlmostThere);
        assert_eq!(summary.tier_label, "Quase lá");
        assert_eq!(summary.end_date_display, "30/09/2025");
    }

    #[test]
    fn test_untouched_key_result_awaits_period() {
        let kr = sample();
        assert_eq!(kr.tier_on(date(2025, 2, 1)), Tier::AwaitingPeriod);
        assert_eq!(kr.tier_on(date(2025, 10, 1)), Tier::NeedsAttention);
    }

    #[test]
    fn test_checkpoint_record() {
        let kr = sample();
        let plan = kr.plan_checkpoints().unwrap().remove(0);
        let mut cp = Checkpoint::from_plan(&kr.id, plan);

        assert_eq!(cp.status, CheckpointStatus::Pending);
        assert_eq!(cp.target_value, 833.33);

        cp.record(400.0, date(2025, 2, 15));
        assert_eq!(cp.status, CheckpointStatus::InProgress);

        cp.refresh_status(date(2025, 4, 15));
        assert_eq!(cp.status, CheckpointStatus::Overdue);

        cp.record(900.0, date(2025, 4, 15));
        assert_eq!(cp.status, CheckpointStatus::Completed);
        assert_eq!(cp.progress(), 100.0);
        assert_eq!(cp.tier_on(date(2025, 4, 15)), Tier::GoalMet);
    }

    #[test]
    fn test_checkpoint_status_str() {
        for status in [
            CheckpointStatus::Pending,
            CheckpointStatus::InProgress,
            CheckpointStatus::Completed,
            CheckpointStatus::Overdue,
        ] {
            assert_eq!(status.as_str().parse::<CheckpointStatus>().unwrap(), status);
        }
        assert!("done".parse::<CheckpointStatus>().is_err());
    }
}
