use std::collections::HashSet;

use async_trait::async_trait;
use riskflow_core::{ChecklistRecord, FieldPayload};
use serde_json::Value;
use thiserror::Error;

pub mod cache;
pub mod memory;

pub use cache::{CACHE_FILE_NAME, CHECKLIST_CACHE_SLOT, CacheError, SnapshotCache};
pub use memory::{MemoryRecordStore, UpdateCall};

/// Marker the backend puts in its error text when a write names a column
/// the sheet does not have.
pub const COLUMN_NOT_FOUND_MARKER: &str = "COLUMN_NOT_FOUND";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("{0}")]
    Remote(String),
    #[error("malformed response: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("column not found: {0}")]
    ColumnNotFound(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("{0}")]
    Remote(String),
}

impl UpdateError {
    /// Classifies an `ok: false` message from the backend.
    pub fn from_remote_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains(COLUMN_NOT_FOUND_MARKER) {
            Self::ColumnNotFound(message)
        } else {
            Self::Remote(message)
        }
    }

    pub fn is_column_not_found(&self) -> bool {
        matches!(self, Self::ColumnNotFound(_))
    }
}

/// The sheet that holds the checklist.
///
/// Every call is independent and made at most once; implementations never
/// retry and never batch across calls.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn fetch_all(&self, sheet: &str) -> Result<Vec<ChecklistRecord>, FetchError>;

    /// Writes exactly the fields in `fields` for the record `key`, all or
    /// nothing.
    async fn update_fields(
        &self,
        sheet: &str,
        key: &str,
        fields: &FieldPayload,
    ) -> Result<(), UpdateError>;

    fn store_name(&self) -> &str;
}

/// Turns the `data` array of a read response into records.
///
/// Rows that are not objects or carry no code are skipped. When a code
/// repeats, the first row wins.
pub fn decode_records(rows: &[Value]) -> Vec<ChecklistRecord> {
    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(rows.len());

    for (index, row) in rows.iter().enumerate() {
        let Some(object) = row.as_object() else {
            tracing::warn!(row = index, "skipping non-object checklist row");
            continue;
        };
        let Some(record) = ChecklistRecord::from_row(object) else {
            tracing::warn!(row = index, "skipping checklist row without code");
            continue;
        };
        if !seen.insert(record.code.clone()) {
            tracing::warn!(row = index, code = %record.code, "skipping duplicate checklist code");
            continue;
        }
        records.push(record);
    }

    records
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decode_skips_malformed_and_duplicate_rows() {
        let rows = vec![
            json!({"code": "1.1", "domain": "관리체계", "vuln_result": "vulnerable"}),
            json!("not a row"),
            json!({"domain": "접근통제"}),
            json!({"code": "  "}),
            json!({"code": "1.1", "domain": "duplicate"}),
            json!({"code": 2, "impact": 3}),
        ];

        let records = decode_records(&rows);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].code, "1.1");
        assert_eq!(records[0].domain, "관리체계");
        assert_eq!(records[0].result, "취약");
        assert_eq!(records[1].code, "2");
        assert_eq!(records[1].impact, "3");
    }

    #[test]
    fn remote_messages_with_marker_map_to_column_not_found() {
        let error = UpdateError::from_remote_message("COLUMN_NOT_FOUND: residual_detail");
        assert!(error.is_column_not_found());

        let error = UpdateError::from_remote_message("sheet locked");
        assert!(!error.is_column_not_found());
        assert_eq!(error.to_string(), "sheet locked");
    }
}
