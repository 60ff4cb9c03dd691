use thiserror::Error;

pub mod policy;
pub mod progress;
pub mod record;
pub mod schema;
pub mod score;
pub mod view;
pub mod workflow;

pub use policy::{FieldPayload, canonical_value, validate_save, validate_value};
pub use progress::{Dashboard, GradeDistribution, Progress, StageSummary, percent, stage_progress};
pub use record::{
    ChecklistRecord, DEFAULT_RECORD_TYPE, RecordKey, ResidualStatus, Strategy, TreatmentStatus,
    VulnResult, normalize_result,
};
pub use schema::Field;
pub use score::{
    Grade, Level, MatrixBound, ResidualLevels, ScoreView, compute_score, derive_residual,
    grade_from_score, is_acceptable, recommend_strategy, strategy_deltas,
};
pub use view::{
    DEFAULT_PAGE_SIZE, Page, ViewFilter, domains, filter_records, group_by_domain, paginate,
};
pub use workflow::{RecordState, Stage, derive_state, eligible_stages};

/// A save rejected before it reaches the backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("accept_reason is required when treatment_strategy is Accept")]
    AcceptReasonRequired,
    #[error("{field} must be an integer, got '{value}'")]
    NotAnInteger { field: Field, value: String },
    #[error("{field} must be between 1 and {max}, got {value}")]
    LevelOutOfRange { field: Field, value: i64, max: u8 },
    #[error("{field} does not accept '{value}'")]
    InvalidValue { field: Field, value: String },
    #[error("{field} is required")]
    MissingRequired { field: Field },
    #[error("{field} cannot be changed")]
    ReadOnly { field: Field },
}

impl ValidationError {
    pub fn field(&self) -> Field {
        match self {
            Self::AcceptReasonRequired => Field::AcceptReason,
            Self::NotAnInteger { field, .. }
            | Self::LevelOutOfRange { field, .. }
            | Self::InvalidValue { field, .. }
            | Self::MissingRequired { field }
            | Self::ReadOnly { field } => *field,
        }
    }
}
