use serde::{Deserialize, Serialize};

use crate::record::{ChecklistRecord, ResidualStatus, TreatmentStatus, VulnResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Implementation,
    Vulnerability,
    RiskEvaluation,
    Treatment,
    Residual,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Implementation,
        Stage::Vulnerability,
        Stage::RiskEvaluation,
        Stage::Treatment,
        Stage::Residual,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Implementation => "implementation",
            Self::Vulnerability => "vulnerability",
            Self::RiskEvaluation => "risk_evaluation",
            Self::Treatment => "treatment",
            Self::Residual => "residual",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Implementation => "통제 이행 점검",
            Self::Vulnerability => "취약 도출",
            Self::RiskEvaluation => "위험 평가",
            Self::Treatment => "위험 처리",
            Self::Residual => "잔여 위험 평가",
        }
    }

    pub fn is_eligible(self, record: &ChecklistRecord) -> bool {
        match self {
            Self::Implementation | Self::Vulnerability => true,
            Self::RiskEvaluation => is_vulnerable(record),
            Self::Treatment => is_vulnerable(record) && record.has_risk_evaluation(),
            Self::Residual => {
                Self::Treatment.is_eligible(record)
                    && record.treatment_state() == Some(TreatmentStatus::Done)
            }
        }
    }

    pub fn is_done(self, record: &ChecklistRecord) -> bool {
        match self {
            Self::Implementation => !record.status.trim().is_empty(),
            Self::Vulnerability => record.vuln_result().is_some(),
            Self::RiskEvaluation => record.has_risk_evaluation(),
            Self::Treatment => record.treatment_state() == Some(TreatmentStatus::Done),
            Self::Residual => record.residual_state() == Some(ResidualStatus::Done),
        }
    }

    pub fn next(self) -> Option<Self> {
        match self {
            Self::Implementation => Some(Self::Vulnerability),
            Self::Vulnerability => Some(Self::RiskEvaluation),
            Self::RiskEvaluation => Some(Self::Treatment),
            Self::Treatment => Some(Self::Residual),
            Self::Residual => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "implementation" | "status" => Ok(Self::Implementation),
            "vulnerability" | "vuln" => Ok(Self::Vulnerability),
            "risk_evaluation" | "risk" | "analysis" => Ok(Self::RiskEvaluation),
            "treatment" => Ok(Self::Treatment),
            "residual" => Ok(Self::Residual),
            other => Err(format!(
                "invalid stage '{other}', expected one of: implementation, vulnerability, risk_evaluation, treatment, residual"
            )),
        }
    }
}

fn is_vulnerable(record: &ChecklistRecord) -> bool {
    record.vuln_result() == Some(VulnResult::Vulnerable)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    Unassessed,
    Implemented,
    Good,
    Vulnerable,
    RiskEvaluated,
    Treated,
    ResidualEvaluated,
}

impl RecordState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unassessed => "unassessed",
            Self::Implemented => "implemented",
            Self::Good => "good",
            Self::Vulnerable => "vulnerable",
            Self::RiskEvaluated => "risk_evaluated",
            Self::Treated => "treated",
            Self::ResidualEvaluated => "residual_evaluated",
        }
    }
}

pub fn derive_state(record: &ChecklistRecord) -> RecordState {
    if Stage::Residual.is_eligible(record) {
        if Stage::Residual.is_done(record) {
            return RecordState::ResidualEvaluated;
        }
        return RecordState::Treated;
    }
    if Stage::Treatment.is_eligible(record) {
        return RecordState::RiskEvaluated;
    }
    match record.vuln_result() {
        Some(VulnResult::Vulnerable) => RecordState::Vulnerable,
        Some(VulnResult::Good) => RecordState::Good,
        None if Stage::Implementation.is_done(record) => RecordState::Implemented,
        None => RecordState::Unassessed,
    }
}

pub fn eligible_stages(record: &ChecklistRecord) -> Vec<Stage> {
    Stage::ALL
        .into_iter()
        .filter(|stage| stage.is_eligible(record))
        .collect()
}
