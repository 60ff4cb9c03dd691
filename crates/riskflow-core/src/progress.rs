use serde::{Deserialize, Serialize};

use crate::record::ChecklistRecord;
use crate::score::{Grade, MatrixBound, ScoreView};
use crate::workflow::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Progress {
    pub done: usize,
    pub total: usize,
    pub pct: u32,
}

impl Progress {
    pub fn new(done: usize, total: usize) -> Self {
        Self {
            done,
            total,
            pct: percent(done, total),
        }
    }
}

/// `round(done / total * 100)`, halves rounding up; 0 for an empty set.
pub fn percent(done: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    let done = done as u64;
    let total = total as u64;
    ((done * 200 + total) / (total * 2)) as u32
}

/// `total` is the length of `records`; pass the full snapshot, never a
/// filtered or paged view.
pub fn stage_progress<'a, I, P>(records: I, is_done: P) -> Progress
where
    I: IntoIterator<Item = &'a ChecklistRecord>,
    P: Fn(&ChecklistRecord) -> bool,
{
    let mut done = 0;
    let mut total = 0;
    for record in records {
        total += 1;
        if is_done(record) {
            done += 1;
        }
    }
    Progress::new(done, total)
}

impl Stage {
    pub fn progress(self, all_records: &[ChecklistRecord]) -> Progress {
        stage_progress(
            all_records
                .iter()
                .filter(|record| self.is_eligible(record)),
            |record| self.is_done(record),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GradeDistribution {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub very_high: usize,
}

impl GradeDistribution {
    fn record(&mut self, grade: Grade) {
        match grade {
            Grade::Low => self.low += 1,
            Grade::Medium => self.medium += 1,
            Grade::High => self.high += 1,
            Grade::VeryHigh => self.very_high += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: Stage,
    pub progress: Progress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dashboard {
    pub control_count: usize,
    pub vulnerable_count: usize,
    pub stages: Vec<StageSummary>,
    pub grades: GradeDistribution,
    pub residual_grades: GradeDistribution,
    pub unacceptable_count: usize,
}

impl Dashboard {
    pub fn build(records: &[ChecklistRecord], bound: MatrixBound, accept_threshold: u32) -> Self {
        let stages = Stage::ALL
            .into_iter()
            .map(|stage| StageSummary {
                stage,
                progress: stage.progress(records),
            })
            .collect();

        let mut grades = GradeDistribution::default();
        let mut residual_grades = GradeDistribution::default();
        let mut unacceptable_count = 0;
        for record in records
            .iter()
            .filter(|record| Stage::RiskEvaluation.is_eligible(record))
        {
            if let Some(view) =
                ScoreView::from_fields(&record.impact, &record.likelihood, bound, accept_threshold)
            {
                grades.record(view.grade);
                if !view.acceptable {
                    unacceptable_count += 1;
                }
            }
            if let Some(view) = ScoreView::from_fields(
                &record.residual_impact,
                &record.residual_likelihood,
                bound,
                accept_threshold,
            ) {
                residual_grades.record(view.grade);
            }
        }

        Self {
            control_count: records.len(),
            vulnerable_count: Stage::RiskEvaluation.progress(records).total,
            stages,
            grades,
            residual_grades,
            unacceptable_count,
        }
    }

    pub fn stage(&self, stage: Stage) -> Progress {
        self.stages
            .iter()
            .find(|summary| summary.stage == stage)
            .map(|summary| summary.progress)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Field;

    #[test]
    fn percent_rounds_half_up_and_handles_empty() {
        assert_eq!(percent(0, 0), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(1, 8), 13);
        assert_eq!(percent(1, 200), 1);
        assert_eq!(percent(5, 5), 100);
    }

    #[test]
    fn implementation_progress_counts_status_over_all_records() {
        let records = vec![
            ChecklistRecord::new("1").with(Field::Status, "done"),
            ChecklistRecord::new("2"),
            ChecklistRecord::new("3").with(Field::Status, "partial"),
            ChecklistRecord::new("4"),
        ];

        assert_eq!(
            Stage::Implementation.progress(&records),
            Progress {
                done: 2,
                total: 4,
                pct: 50
            }
        );
    }

    #[test]
    fn vulnerability_progress_accepts_both_results() {
        let records = vec![
            ChecklistRecord::new("1").with(Field::Result, "양호"),
            ChecklistRecord::new("2").with(Field::Result, "취약"),
            ChecklistRecord::new("3").with(Field::Result, "N/A"),
        ];

        let progress = Stage::Vulnerability.progress(&records);
        assert_eq!((progress.done, progress.total), (2, 3));
    }

    #[test]
    fn dashboard_counts_grades_for_scored_vulnerabilities() {
        let vulnerable = |code: &str, impact: &str, likelihood: &str| {
            ChecklistRecord::new(code)
                .with(Field::Result, "취약")
                .with(Field::Impact, impact)
                .with(Field::Likelihood, likelihood)
        };
        let records = vec![
            vulnerable("1", "5", "5"),
            vulnerable("2", "4", "3"),
            vulnerable("3", "1", "2"),
            vulnerable("4", "", ""),
            ChecklistRecord::new("5").with(Field::Result, "양호"),
        ];

        let dashboard = Dashboard::build(&records, MatrixBound::Five, 7);

        assert_eq!(dashboard.control_count, 5);
        assert_eq!(dashboard.vulnerable_count, 4);
        assert_eq!(
            dashboard.grades,
            GradeDistribution {
                low: 1,
                medium: 1,
                high: 0,
                very_high: 1,
            }
        );
        assert_eq!(dashboard.unacceptable_count, 2);
        assert_eq!(
            dashboard.stage(Stage::RiskEvaluation),
            Progress::new(3, 4)
        );
        assert_eq!(dashboard.stage(Stage::Treatment), Progress::new(0, 3));
    }
}
