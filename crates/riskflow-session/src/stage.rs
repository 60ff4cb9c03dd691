use riskflow_core::{
    ChecklistRecord, Field, Level, MatrixBound, Progress, RecordKey, ResidualLevels, ScoreView,
    Stage, Strategy, derive_residual, recommend_strategy,
};

use crate::DraftError;

/// What one workflow stage lets the user touch and what saving it implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageRules {
    pub stage: Stage,
    pub editable_fields: &'static [Field],
    pub required_fields: &'static [Field],
    /// Written alongside the user's edits on every save.
    pub completion: &'static [(Field, &'static str)],
}

const IMPLEMENTATION: StageRules = StageRules {
    stage: Stage::Implementation,
    editable_fields: &[Field::Status],
    required_fields: &[],
    completion: &[],
};

const VULNERABILITY: StageRules = StageRules {
    stage: Stage::Vulnerability,
    editable_fields: &[Field::Result, Field::ResultDetail],
    required_fields: &[],
    completion: &[],
};

const RISK_EVALUATION: StageRules = StageRules {
    stage: Stage::RiskEvaluation,
    editable_fields: &[Field::Impact, Field::Likelihood],
    required_fields: &[],
    completion: &[],
};

const TREATMENT: StageRules = StageRules {
    stage: Stage::Treatment,
    editable_fields: &[
        Field::TreatmentStrategy,
        Field::TreatmentPlan,
        Field::TreatmentOwner,
        Field::TreatmentDueDate,
        Field::TreatmentStatus,
        Field::AcceptReason,
    ],
    required_fields: &[],
    completion: &[(Field::TreatmentStatus, "Done")],
};

const RESIDUAL: StageRules = StageRules {
    stage: Stage::Residual,
    editable_fields: &[
        Field::ResidualImpact,
        Field::ResidualLikelihood,
        Field::ResidualDetail,
        Field::ResidualStatus,
    ],
    required_fields: &[Field::ResidualImpact, Field::ResidualLikelihood],
    completion: &[(Field::ResidualStatus, "Done")],
};

pub fn stage_rules(stage: Stage) -> &'static StageRules {
    match stage {
        Stage::Implementation => &IMPLEMENTATION,
        Stage::Vulnerability => &VULNERABILITY,
        Stage::RiskEvaluation => &RISK_EVALUATION,
        Stage::Treatment => &TREATMENT,
        Stage::Residual => &RESIDUAL,
    }
}

impl StageRules {
    pub fn is_editable(&self, field: Field) -> bool {
        self.editable_fields.contains(&field)
    }

    pub fn check_editable(&self, field: Field) -> Result<(), DraftError> {
        if self.is_editable(field) {
            Ok(())
        } else {
            Err(DraftError::FieldNotEditable {
                stage: self.stage,
                field,
            })
        }
    }

    pub fn progress(&self, all_records: &[ChecklistRecord]) -> Progress {
        self.stage.progress(all_records)
    }

    /// Builds the display row for one record.
    ///
    /// `committed` decides whether the record is done; `current` is what the
    /// user sees, draft included, and drives the live score.
    pub fn row(
        &self,
        committed: &ChecklistRecord,
        current: ChecklistRecord,
        pending: Vec<Field>,
        saving: bool,
        bound: MatrixBound,
        accept_threshold: u32,
    ) -> StageRow {
        let score = ScoreView::from_fields(
            &current.impact,
            &current.likelihood,
            bound,
            accept_threshold,
        );
        let residual_score = ScoreView::from_fields(
            &current.residual_impact,
            &current.residual_likelihood,
            bound,
            accept_threshold,
        );

        let recommended_strategy = match self.stage {
            Stage::RiskEvaluation | Stage::Treatment => {
                score.map(|view| recommend_strategy(view.score))
            }
            _ => None,
        };
        let suggested_residual = match self.stage {
            Stage::Treatment | Stage::Residual => score.map(|view| {
                derive_residual(view.impact, view.likelihood, current.strategy(), bound)
            }),
            _ => None,
        };

        StageRow {
            key: current.code.clone(),
            done: self.stage.is_done(committed),
            record: current,
            pending,
            saving,
            score,
            residual_score,
            recommended_strategy,
            suggested_residual,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRow {
    pub key: RecordKey,
    pub record: ChecklistRecord,
    /// Fields with unsaved edits.
    pub pending: Vec<Field>,
    pub saving: bool,
    pub done: bool,
    pub score: Option<ScoreView>,
    pub residual_score: Option<ScoreView>,
    pub recommended_strategy: Option<Strategy>,
    pub suggested_residual: Option<ResidualLevels>,
}

impl StageRow {
    pub fn residual_levels_or_suggested(&self) -> Option<(Level, Level)> {
        self.residual_score
            .map(|view| (view.impact, view.likelihood))
            .or_else(|| {
                self.suggested_residual
                    .map(|levels| (levels.impact, levels.likelihood))
            })
    }
}
