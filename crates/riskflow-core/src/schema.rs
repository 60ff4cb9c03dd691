use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    #[serde(rename = "type")]
    Type,
    #[serde(rename = "area")]
    Area,
    #[serde(rename = "domain")]
    Domain,
    #[serde(rename = "code")]
    Code,
    #[serde(rename = "itemCode")]
    ItemCode,
    #[serde(rename = "status")]
    Status,
    #[serde(rename = "result")]
    Result,
    #[serde(rename = "result_detail")]
    ResultDetail,
    #[serde(rename = "impact")]
    Impact,
    #[serde(rename = "likelihood")]
    Likelihood,
    #[serde(rename = "treatment_strategy")]
    TreatmentStrategy,
    #[serde(rename = "treatment_plan")]
    TreatmentPlan,
    #[serde(rename = "treatment_owner")]
    TreatmentOwner,
    #[serde(rename = "treatment_due_date")]
    TreatmentDueDate,
    #[serde(rename = "treatment_status")]
    TreatmentStatus,
    #[serde(rename = "accept_reason")]
    AcceptReason,
    #[serde(rename = "residual_impact")]
    ResidualImpact,
    #[serde(rename = "residual_likelihood")]
    ResidualLikelihood,
    #[serde(rename = "residual_detail")]
    ResidualDetail,
    #[serde(rename = "residual_status")]
    ResidualStatus,
}

impl Field {
    pub const ALL: [Field; 20] = [
        Field::Type,
        Field::Area,
        Field::Domain,
        Field::Code,
        Field::ItemCode,
        Field::Status,
        Field::Result,
        Field::ResultDetail,
        Field::Impact,
        Field::Likelihood,
        Field::TreatmentStrategy,
        Field::TreatmentPlan,
        Field::TreatmentOwner,
        Field::TreatmentDueDate,
        Field::TreatmentStatus,
        Field::AcceptReason,
        Field::ResidualImpact,
        Field::ResidualLikelihood,
        Field::ResidualDetail,
        Field::ResidualStatus,
    ];

    pub fn column(self) -> &'static str {
        self.columns()[0]
    }

    /// Accepted column names in probe order; the canonical name comes first.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Self::Type => &["type"],
            Self::Area => &["area"],
            Self::Domain => &["domain"],
            Self::Code => &["code"],
            Self::ItemCode => &["itemCode", "item"],
            Self::Status => &["status"],
            Self::Result => &[
                "result",
                "vuln_result",
                "vulnResult",
                "finding",
                "assessment",
            ],
            Self::ResultDetail => &["result_detail", "resultDetail", "reason"],
            Self::Impact => &["impact"],
            Self::Likelihood => &["likelihood"],
            Self::TreatmentStrategy => &["treatment_strategy"],
            Self::TreatmentPlan => &["treatment_plan"],
            Self::TreatmentOwner => &["treatment_owner"],
            Self::TreatmentDueDate => &["treatment_due_date"],
            Self::TreatmentStatus => &["treatment_status"],
            Self::AcceptReason => &["accept_reason"],
            Self::ResidualImpact => &["residual_impact"],
            Self::ResidualLikelihood => &["residual_likelihood"],
            Self::ResidualDetail => &["residual_detail"],
            Self::ResidualStatus => &["residual_status"],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Type => "유형",
            Self::Area => "영역",
            Self::Domain => "분야",
            Self::Code => "코드",
            Self::ItemCode => "항목",
            Self::Status => "현황",
            Self::Result => "결과",
            Self::ResultDetail => "사유",
            Self::Impact => "Impact",
            Self::Likelihood => "Likelihood",
            Self::TreatmentStrategy => "처리 전략",
            Self::TreatmentPlan => "처리 방안",
            Self::TreatmentOwner => "책임자",
            Self::TreatmentDueDate => "목표 완료일",
            Self::TreatmentStatus => "처리 상태",
            Self::AcceptReason => "수용 사유",
            Self::ResidualImpact => "잔여 Impact",
            Self::ResidualLikelihood => "잔여 Likelihood",
            Self::ResidualDetail => "비고/근거",
            Self::ResidualStatus => "잔여 위험 상태",
        }
    }

    pub fn preserves_whitespace(self) -> bool {
        matches!(
            self,
            Self::TreatmentPlan | Self::AcceptReason | Self::ResidualDetail
        )
    }

    pub fn is_level(self) -> bool {
        matches!(
            self,
            Self::Impact | Self::Likelihood | Self::ResidualImpact | Self::ResidualLikelihood
        )
    }

    pub fn from_column(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|field| field.columns().contains(&name))
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

impl std::str::FromStr for Field {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_column(value).ok_or_else(|| format!("unknown checklist field '{}'", value.trim()))
    }
}
