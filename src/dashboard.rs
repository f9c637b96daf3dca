// 📊 Dashboard - tier counts and rollups over a set of key results

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;

use crate::entities::{KeyResult, KeyResultSummary, Objective};
use crate::locale::format_compact;
use crate::progress::{rollup_progress, Tier};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierCount {
    pub tier: Tier,
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectiveProgress {
    pub objective_id: String,
    pub title: String,
    pub unit_path: String,
    pub key_results: usize,
    pub progress: f64,
    pub progress_display: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_objectives: usize,
    pub total_key_results: usize,
    pub average_progress: f64,
    pub average_progress_display: String,
    /// Always all four tiers, in display order
    pub by_tier: Vec<TierCount>,
    pub objectives: Vec<ObjectiveProgress>,
}

impl DashboardStats {
    pub fn build(objectives: &[Objective], key_results: &[KeyResult], today: NaiveDate) -> Self {
        let summaries: Vec<KeyResultSummary> =
            key_results.iter().map(|kr| kr.summary_on(today)).collect();

        let mut tier_counts: HashMap<Tier, usize> = HashMap::new();
        for summary in &summaries {
            *tier_counts.entry(summary.tier).or_insert(0) += 1;
        }

        let by_tier = Tier::all()
            .into_iter()
            .map(|tier| TierCount {
                tier,
                label: tier.label().to_string(),
                count: tier_counts.get(&tier).copied().unwrap_or(0),
            })
            .collect();

        let objectives: Vec<ObjectiveProgress> = objectives
            .iter()
            .map(|objective| {
                let progresses: Vec<f64> = summaries
                    .iter()
                    .filter(|s| s.objective_id == objective.id)
                    .map(|s| s.progress)
                    .collect();
                let progress = rollup_progress(&progresses);

                ObjectiveProgress {
                    objective_id: objective.id.clone(),
                    title: objective.title.clone(),
                    unit_path: objective.org_unit.path(),
                    key_results: progresses.len(),
                    progress,
                    progress_display: percent(progress),
                }
            })
            .collect();

        let all_progress: Vec<f64> = summaries.iter().map(|s| s.progress).collect();
        let average_progress = rollup_progress(&all_progress);

        DashboardStats {
            total_objectives: objectives.len(),
            total_key_results: summaries.len(),
            average_progress,
            average_progress_display: percent(average_progress),
            by_tier,
            objectives,
        }
    }

    pub fn count_for(&self, tier: Tier) -> usize {
        self.by_tier
            .iter()
            .find(|t| t.tier == tier)
            .map(|t| t.count)
            .unwrap_or(0)
    }
}

fn percent(value: f64) -> String {
    format!("{}%", format_compact(value, 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::OrgUnit;
    use crate::schedule::Frequency;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn kr(objective: &Objective, target: f64, current: f64) -> KeyResult {
        let mut kr = KeyResult::new(
            &objective.id,
            "KR",
            "",
            target,
            Frequency::Monthly,
            date(2025, 1, 1),
            date(2025, 12, 31),
        )
        .unwrap();
        kr.current_value = current;
        kr
    }

    #[test]
    fn test_dashboard_counts_and_rollups() {
        let sales = Objective::new("Vendas", OrgUnit::new("Sul")).unwrap();
        let costs = Objective::new("Custos", OrgUnit::new("Sul")).unwrap();
        let empty = Objective::new("Sem KRs", OrgUnit::new("Norte")).unwrap();

        let krs = vec![
            kr(&sales, 100.0, 100.0), // met
            kr(&sales, 100.0, 90.0),  // almost there
            kr(&costs, 100.0, 10.0),  // needs attention
            kr(&costs, 100.0, 0.0),   // awaiting (end date in the future)
        ];

        let objectives = [sales.clone(), costs.clone(), empty];
        let stats = DashboardStats::build(&objectives, &krs, date(2025, 6, 1));

        assert_eq!(stats.total_objectives, 3);
        assert_eq!(stats.total_key_results, 4);
        assert_eq!(stats.count_for(Tier::GoalMet), 1);
        assert_eq!(stats.count_for(Tier::AlmostThere), 1);
        assert_eq!(stats.count_for(Tier::NeedsAttention), 1);
        assert_eq!(stats.count_for(Tier::AwaitingPeriod), 1);
        assert_eq!(stats.by_tier.len(), 4);

        assert_eq!(stats.average_progress, 50.0);
        assert_eq!(stats.average_progress_display, "50%");

        assert_eq!(stats.objectives[0].progress, 95.0);
        assert_eq!(stats.objectives[1].progress, 5.0);
        assert_eq!(stats.objectives[2].key_results, 0);
        assert_eq!(stats.objectives[2].progress, 0.0);
    }

    #[test]
    fn test_empty_dashboard() {
        let stats = DashboardStats::build(&[], &[], date(2025, 6, 1));

        assert_eq!(stats.total_key_results, 0);
        assert_eq!(stats.average_progress, 0.0);
        assert!(stats.by_tier.iter().all(|t| t.count == 0));
    }
}
