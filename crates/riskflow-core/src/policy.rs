use std::collections::BTreeMap;

use crate::ValidationError;
use crate::record::{ChecklistRecord, ResidualStatus, Strategy, TreatmentStatus, VulnResult};
use crate::schema::Field;
use crate::score::{Level, MatrixBound};

pub type FieldPayload = BTreeMap<Field, String>;

/// Checks a pending save before anything is sent.
pub fn validate_save(
    merged: &ChecklistRecord,
    payload: &FieldPayload,
    required: &[Field],
    bound: MatrixBound,
) -> Result<(), ValidationError> {
    for (field, value) in payload {
        validate_value(*field, value, bound)?;
    }

    for field in required {
        if merged.get(*field).trim().is_empty() {
            return Err(ValidationError::MissingRequired { field: *field });
        }
    }

    if merged.strategy() == Some(Strategy::Accept) && merged.accept_reason.trim().is_empty() {
        return Err(ValidationError::AcceptReasonRequired);
    }

    Ok(())
}

pub fn validate_value(field: Field, value: &str, bound: MatrixBound) -> Result<(), ValidationError> {
    if field == Field::Code {
        return Err(ValidationError::ReadOnly { field });
    }

    if field.is_level() {
        Level::parse_field(field, value, bound)?;
        return Ok(());
    }

    let value = value.trim();
    if value.is_empty() {
        return Ok(());
    }

    let recognized = match field {
        Field::Result => VulnResult::parse(value).is_some(),
        Field::TreatmentStrategy => value.parse::<Strategy>().is_ok(),
        Field::TreatmentStatus => value.parse::<TreatmentStatus>().is_ok(),
        Field::ResidualStatus => value.parse::<ResidualStatus>().is_ok(),
        _ => true,
    };

    if recognized {
        Ok(())
    } else {
        Err(ValidationError::InvalidValue {
            field,
            value: value.to_owned(),
        })
    }
}

pub fn canonical_value(field: Field, value: &str) -> String {
    let trimmed = value.trim();
    match field {
        Field::Result => VulnResult::parse(trimmed)
            .map(|result| result.as_str().to_owned())
            .unwrap_or_else(|| trimmed.to_owned()),
        Field::TreatmentStrategy => trimmed
            .parse::<Strategy>()
            .map(|strategy| strategy.as_str().to_owned())
            .unwrap_or_else(|_| trimmed.to_owned()),
        _ if field.is_level() => trimmed
            .parse::<i64>()
            .map(|level| level.to_string())
            .unwrap_or_else(|_| trimmed.to_owned()),
        _ if field.preserves_whitespace() => value.to_owned(),
        _ => trimmed.to_owned(),
    }
}
