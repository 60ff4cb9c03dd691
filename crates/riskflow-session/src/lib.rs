use riskflow_core::{Field, RecordKey, Stage, ValidationError};
use riskflow_store::UpdateError;
use thiserror::Error;

pub mod draft;
pub mod session;
pub mod stage;

pub use draft::{CommitOutcome, DraftSynchronizer, ReconcileReport};
pub use session::{AssessmentSession, SessionOptions};
pub use stage::{StageRow, StageRules, stage_rules};

#[derive(Debug, Error)]
pub enum DraftError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("update failed: {0}")]
    Update(#[from] UpdateError),
    #[error("a save for {0} is already in progress")]
    CommitInFlight(RecordKey),
    #[error("unknown record {0}")]
    UnknownRecord(RecordKey),
    #[error("{field} cannot be edited in the {stage} stage")]
    FieldNotEditable { stage: Stage, field: Field },
    #[error("record {key} is not part of the {stage} stage")]
    NotEligible { stage: Stage, key: RecordKey },
}
