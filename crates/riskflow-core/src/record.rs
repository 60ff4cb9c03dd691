use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::Field;

pub type RecordKey = String;

pub const DEFAULT_RECORD_TYPE: &str = "ISMS";

/// One control/audit item from the checklist sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistRecord {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub area: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub code: String,
    #[serde(rename = "itemCode", default)]
    pub item_code: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub result_detail: String,
    #[serde(default)]
    pub impact: String,
    #[serde(default)]
    pub likelihood: String,
    #[serde(default)]
    pub treatment_strategy: String,
    #[serde(default)]
    pub treatment_plan: String,
    #[serde(default)]
    pub treatment_owner: String,
    #[serde(default)]
    pub treatment_due_date: String,
    #[serde(default)]
    pub treatment_status: String,
    #[serde(default)]
    pub accept_reason: String,
    #[serde(default)]
    pub residual_impact: String,
    #[serde(default)]
    pub residual_likelihood: String,
    #[serde(default)]
    pub residual_detail: String,
    #[serde(default)]
    pub residual_status: String,
}

impl ChecklistRecord {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            kind: DEFAULT_RECORD_TYPE.to_owned(),
            code: code.into(),
            ..Self::default()
        }
    }

    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::Type => &self.kind,
            Field::Area => &self.area,
            Field::Domain => &self.domain,
            Field::Code => &self.code,
            Field::ItemCode => &self.item_code,
            Field::Status => &self.status,
            Field::Result => &self.result,
            Field::ResultDetail => &self.result_detail,
            Field::Impact => &self.impact,
            Field::Likelihood => &self.likelihood,
            Field::TreatmentStrategy => &self.treatment_strategy,
            Field::TreatmentPlan => &self.treatment_plan,
            Field::TreatmentOwner => &self.treatment_owner,
            Field::TreatmentDueDate => &self.treatment_due_date,
            Field::TreatmentStatus => &self.treatment_status,
            Field::AcceptReason => &self.accept_reason,
            Field::ResidualImpact => &self.residual_impact,
            Field::ResidualLikelihood => &self.residual_likelihood,
            Field::ResidualDetail => &self.residual_detail,
            Field::ResidualStatus => &self.residual_status,
        }
    }

    fn slot_mut(&mut self, field: Field) -> &mut String {
        match field {
            Field::Type => &mut self.kind,
            Field::Area => &mut self.area,
            Field::Domain => &mut self.domain,
            Field::Code => &mut self.code,
            Field::ItemCode => &mut self.item_code,
            Field::Status => &mut self.status,
            Field::Result => &mut self.result,
            Field::ResultDetail => &mut self.result_detail,
            Field::Impact => &mut self.impact,
            Field::Likelihood => &mut self.likelihood,
            Field::TreatmentStrategy => &mut self.treatment_strategy,
            Field::TreatmentPlan => &mut self.treatment_plan,
            Field::TreatmentOwner => &mut self.treatment_owner,
            Field::TreatmentDueDate => &mut self.treatment_due_date,
            Field::TreatmentStatus => &mut self.treatment_status,
            Field::AcceptReason => &mut self.accept_reason,
            Field::ResidualImpact => &mut self.residual_impact,
            Field::ResidualLikelihood => &mut self.residual_likelihood,
            Field::ResidualDetail => &mut self.residual_detail,
            Field::ResidualStatus => &mut self.residual_status,
        }
    }

    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        *self.slot_mut(field) = value.into();
    }

    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    /// Returns `None` when the row has no usable `code`.
    pub fn from_row(row: &Map<String, Value>) -> Option<Self> {
        let mut record = Self::default();
        for field in Field::ALL {
            let raw = field
                .columns()
                .iter()
                .filter_map(|column| row.get(*column))
                .map(stringify_cell)
                .find(|value| !value.trim().is_empty())
                .unwrap_or_default();

            let value = if field.preserves_whitespace() {
                raw
            } else {
                raw.trim().to_owned()
            };
            record.set(field, value);
        }

        if record.code.is_empty() {
            return None;
        }
        if record.kind.is_empty() {
            record.kind = DEFAULT_RECORD_TYPE.to_owned();
        }
        record.result = normalize_result(&record.result);

        Some(record)
    }

    pub fn vuln_result(&self) -> Option<VulnResult> {
        VulnResult::parse(&self.result)
    }

    pub fn strategy(&self) -> Option<Strategy> {
        self.treatment_strategy.parse().ok()
    }

    pub fn treatment_state(&self) -> Option<TreatmentStatus> {
        self.treatment_status.parse().ok()
    }

    pub fn residual_state(&self) -> Option<ResidualStatus> {
        self.residual_status.parse().ok()
    }

    pub fn has_risk_evaluation(&self) -> bool {
        !self.impact.trim().is_empty() && !self.likelihood.trim().is_empty()
    }
}

fn stringify_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        other => other.to_string(),
    }
}

pub fn normalize_result(value: &str) -> String {
    let trimmed = value.trim();
    match VulnResult::parse(trimmed) {
        Some(result) => result.as_str().to_owned(),
        None => trimmed.to_owned(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VulnResult {
    #[serde(rename = "양호")]
    Good,
    #[serde(rename = "취약")]
    Vulnerable,
}

impl VulnResult {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Good => "양호",
            Self::Vulnerable => "취약",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value == "양호" || value.eq_ignore_ascii_case("good") {
            return Some(Self::Good);
        }
        if value == "취약"
            || value.eq_ignore_ascii_case("vuln")
            || value.eq_ignore_ascii_case("vulnerable")
        {
            return Some(Self::Vulnerable);
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    Mitigate,
    Transfer,
    Avoid,
    Accept,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Mitigate,
        Strategy::Transfer,
        Strategy::Avoid,
        Strategy::Accept,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mitigate => "Mitigate",
            Self::Transfer => "Transfer",
            Self::Avoid => "Avoid",
            Self::Accept => "Accept",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Mitigate => "감소(Mitigate)",
            Self::Transfer => "이전(Transfer)",
            Self::Avoid => "회피(Avoid)",
            Self::Accept => "수용(Accept)",
        }
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| {
                format!(
                    "invalid treatment strategy '{value}', expected one of: Mitigate, Transfer, Avoid, Accept"
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreatmentStatus {
    Planned,
    InProgress,
    Done,
    OnHold,
}

impl TreatmentStatus {
    pub const ALL: [TreatmentStatus; 4] = [
        TreatmentStatus::Planned,
        TreatmentStatus::InProgress,
        TreatmentStatus::Done,
        TreatmentStatus::OnHold,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "Planned",
            Self::InProgress => "InProgress",
            Self::Done => "Done",
            Self::OnHold => "OnHold",
        }
    }
}

impl std::str::FromStr for TreatmentStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| {
                format!(
                    "invalid treatment status '{value}', expected one of: Planned, InProgress, Done, OnHold"
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResidualStatus {
    Pending,
    Reduced,
    Accepted,
    #[serde(rename = "Not Reduced")]
    NotReduced,
    Done,
}

impl ResidualStatus {
    pub const ALL: [ResidualStatus; 5] = [
        ResidualStatus::Pending,
        ResidualStatus::Reduced,
        ResidualStatus::Accepted,
        ResidualStatus::NotReduced,
        ResidualStatus::Done,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Reduced => "Reduced",
            Self::Accepted => "Accepted",
            Self::NotReduced => "Not Reduced",
            Self::Done => "Done",
        }
    }
}

impl std::str::FromStr for ResidualStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| {
                format!(
                    "invalid residual status '{value}', expected one of: Pending, Reduced, Accepted, Not Reduced, Done"
                )
            })
    }
}
