// 📈 Progress Aggregator - percentages and status tiers
// Pure functions: never fail, every edge case has a defined output

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::entities::CheckpointStatus;

/// Threshold for "almost there". Fixed policy, not configurable.
pub const ALMOST_THERE_THRESHOLD: f64 = 85.0;
pub const GOAL_MET_THRESHOLD: f64 = 100.0;

// ============================================================================
// TIER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    /// Due date still ahead and nothing measured yet
    AwaitingPeriod,
    NeedsAttention,
    AlmostThere,
    GoalMet,
}

impl Tier {
    pub fn all() -> [Tier; 4] {
        [Tier::AwaitingPeriod, Tier::NeedsAttention, Tier::AlmostThere, Tier::GoalMet]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tier::AwaitingPeriod => "Aguardando período",
            Tier::NeedsAttention => "Precisa de atenção",
            Tier::AlmostThere => "Quase lá",
            Tier::GoalMet => "Meta atingida",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Tier::AwaitingPeriod => "AWAITING_PERIOD",
            Tier::NeedsAttention => "NEEDS_ATTENTION",
            Tier::AlmostThere => "ALMOST_THERE",
            Tier::GoalMet => "GOAL_MET",
        }
    }
}

// ============================================================================
// PROGRESS
// ============================================================================

/// Percentage of `target` reached by `current`, clamped to 0..=100.
///
/// `target <= 0` yields 0 rather than a division by zero.
pub fn compute_progress(current: f64, target: f64) -> f64 {
    if target <= 0.0 || !current.is_finite() || !target.is_finite() {
        return 0.0;
    }

    let ratio = current / target * 100.0;

    // Explicit lower clamp: negative actuals never show as negative progress
    ratio.max(0.0).min(GOAL_MET_THRESHOLD)
}

/// Objective progress: mean of its key results' progress (empty = 0)
pub fn rollup_progress(progresses: &[f64]) -> f64 {
    if progresses.is_empty() {
        return 0.0;
    }

    let sum: f64 = progresses.iter().map(|p| p.max(0.0).min(GOAL_MET_THRESHOLD)).sum();
    sum / progresses.len() as f64
}

// ============================================================================
// CLASSIFICATION
// ============================================================================

/// Classify against today's local date
pub fn classify_status(progress: f64, due_date: Option<NaiveDate>) -> Tier {
    classify_status_on(progress, due_date, Local::now().date_naive())
}

/// Classify against an explicit "today".
///
/// The future-date check runs before the thresholds: a checkpoint due next
/// quarter at 0% is awaiting its period, not in trouble.
pub fn classify_status_on(progress: f64, due_date: Option<NaiveDate>, today: NaiveDate) -> Tier {
    let in_future = due_date.map(|d| d > today).unwrap_or(false);

    if in_future && progress == 0.0 {
        Tier::AwaitingPeriod
    } else if progress >= GOAL_MET_THRESHOLD {
        Tier::GoalMet
    } else if progress >= ALMOST_THERE_THRESHOLD {
        Tier::AlmostThere
    } else {
        Tier::NeedsAttention
    }
}

/// Lifecycle status of a checkpoint from its recorded value and due date
pub fn checkpoint_status(
    actual: Option<f64>,
    target: f64,
    due_date: NaiveDate,
    today: NaiveDate,
) -> CheckpointStatus {
    match actual {
        Some(value) if value >= target => CheckpointStatus::Completed,
        _ if due_date < today => CheckpointStatus::Overdue,
        Some(_) => CheckpointStatus::InProgress,
        None => CheckpointStatus::Pending,
    }
}
