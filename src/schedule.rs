// 📅 Checkpoint Distributor - target split across periods
// Cumulative linear targets, the last period always lands on the total

use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::entities::CheckpointStatus;

// ============================================================================
// FREQUENCY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Weekly,
    Monthly,
    Quarterly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
        }
    }

    /// Portuguese name shown in the dashboard
    pub fn label(&self) -> &'static str {
        match self {
            Frequency::Weekly => "Semanal",
            Frequency::Monthly => "Mensal",
            Frequency::Quarterly => "Trimestral",
        }
    }

    /// End date (inclusive) of the period `index` for a schedule starting at `start`.
    /// Month arithmetic is always relative to `start` so month-end clamping can't drift.
    fn period_end(&self, start: NaiveDate, index: u32) -> Option<NaiveDate> {
        let next_start = match self {
            Frequency::Weekly => start.checked_add_signed(Duration::days(7 * (index as i64 + 1))),
            Frequency::Monthly => start.checked_add_months(Months::new(index + 1)),
            Frequency::Quarterly => start.checked_add_months(Months::new(3 * (index + 1))),
        }?;
        next_start.pred_opt()
    }

    fn period_label(&self, index: u32, period_start: NaiveDate) -> String {
        match self {
            Frequency::Weekly => format!("Semana {}", index + 1),
            Frequency::Monthly => format!(
                "{}/{}",
                MONTH_ABBREVIATIONS[period_start.month0() as usize],
                period_start.year()
            ),
            Frequency::Quarterly => {
                format!("T{}/{}", period_start.month0() / 3 + 1, period_start.year())
            }
        }
    }
}

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "jan", "fev", "mar", "abr", "mai", "jun", "jul", "ago", "set", "out", "nov", "dez",
];

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weekly" | "semanal" => Ok(Frequency::Weekly),
            "monthly" | "mensal" => Ok(Frequency::Monthly),
            "quarterly" | "trimestral" => Ok(Frequency::Quarterly),
            other => Err(ScheduleError::UnknownFrequency(other.to_string())),
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// A malformed schedule is a data-integrity problem, so nothing here fails soft
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScheduleError {
    #[error("invalid date range: end {end} must be after start {start}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("invalid total target {0}: must be a finite, non-negative number")]
    InvalidTarget(f64),

    #[error("unknown frequency '{0}' (expected weekly, monthly or quarterly)")]
    UnknownFrequency(String),
}

// ============================================================================
// CHECKPOINT PLAN
// ============================================================================

/// One generated checkpoint, before it gets an identity in the database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointPlan {
    /// 1-based period ordinal
    pub period_index: u32,
    pub period_label: String,
    pub period_start: NaiveDate,
    pub due_date: NaiveDate,
    /// Cumulative target at the end of this period
    pub target_value: f64,
    pub status: CheckpointStatus,
}

/// Round half away from zero to 2 places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Split `total_target` across the periods between `start` and `end`.
///
/// # Strategy:
/// 1. Walk periods from `start` stepping by `frequency`; the final one is cut at `end`
/// 2. Every period but the last gets `round2(total / n * (i + 1))`
/// 3. The last period gets `total_target` itself, so rounding never drifts
///
/// # Example:
/// ```
/// use chrono::NaiveDate;
/// use okr_tracker::schedule::{generate_checkpoints, Frequency};
///
/// let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
/// let end = NaiveDate::from_ymd_opt(2025, 9, 30).unwrap();
/// let plan = generate_checkpoints(2500.0, start, end, Frequency::Quarterly).unwrap();
/// let targets: Vec<f64> = plan.iter().map(|c| c.target_value).collect();
/// assert_eq!(targets, vec![833.33, 1666.67, 2500.0]);
/// ```
pub fn generate_checkpoints(
    total_target: f64,
    start: NaiveDate,
    end: NaiveDate,
    frequency: Frequency,
) -> Result<Vec<CheckpointPlan>, ScheduleError> {
    if end <= start {
        return Err(ScheduleError::InvalidDateRange { start, end });
    }

    if !total_target.is_finite() || total_target < 0.0 {
        return Err(ScheduleError::InvalidTarget(total_target));
    }

    let periods = period_bounds(start, end, frequency);
    let n = periods.len();

    let checkpoints = periods
        .into_iter()
        .enumerate()
        .map(|(i, (period_start, due_date))| {
            let target_value = if i + 1 == n {
                total_target
            } else {
                // Only reachable above the total when the total has more than 2 places
                round2(total_target / n as f64 * (i + 1) as f64).min(total_target)
            };

            CheckpointPlan {
                period_index: i as u32 + 1,
                period_label: frequency.period_label(i as u32, period_start),
                period_start,
                due_date,
                target_value,
                status: CheckpointStatus::Pending,
            }
        })
        .collect();

    Ok(checkpoints)
}

/// (period_start, period_end) pairs, both inclusive. Always at least one.
fn period_bounds(
    start: NaiveDate,
    end: NaiveDate,
    frequency: Frequency,
) -> Vec<(NaiveDate, NaiveDate)> {
    let mut bounds = Vec::new();
    let mut period_start = start;
    let mut index = 0;

    loop {
        let period_end = match frequency.period_end(start, index) {
            Some(d) if d < end => d,
            _ => end,
        };

        bounds.push((period_start, period_end));

        if period_end >= end {
            break;
        }

        match period_end.succ_opt() {
            Some(next) => period_start = next,
            None => break,
        }
        index += 1;
    }

    bounds
}
