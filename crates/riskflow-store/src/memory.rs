use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use riskflow_core::{ChecklistRecord, Field, FieldPayload};

use crate::{COLUMN_NOT_FOUND_MARKER, FetchError, RecordStore, UpdateError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCall {
    pub sheet: String,
    pub key: String,
    pub fields: FieldPayload,
}

#[derive(Debug, Default)]
struct MemoryState {
    sheets: HashMap<String, Vec<ChecklistRecord>>,
    missing_columns: HashSet<Field>,
    fetch_failure: Option<String>,
    update_failure: Option<String>,
    fetch_count: usize,
    update_calls: Vec<UpdateCall>,
}

/// In-process checklist backend.
///
/// Records every `update_fields` call (including rejected ones) so callers
/// can assert on what would have gone over the wire.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    state: Mutex<MemoryState>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(sheet: impl Into<String>, records: Vec<ChecklistRecord>) -> Self {
        let store = Self::new();
        store.replace_sheet(sheet, records);
        store
    }

    pub fn replace_sheet(&self, sheet: impl Into<String>, records: Vec<ChecklistRecord>) {
        self.lock().sheets.insert(sheet.into(), records);
    }

    /// Makes the sheet behave as if `field` had no column.
    pub fn drop_column(&self, field: Field) {
        self.lock().missing_columns.insert(field);
    }

    pub fn fail_next_fetch(&self, message: impl Into<String>) {
        self.lock().fetch_failure = Some(message.into());
    }

    pub fn fail_next_update(&self, message: impl Into<String>) {
        self.lock().update_failure = Some(message.into());
    }

    pub fn records(&self, sheet: &str) -> Vec<ChecklistRecord> {
        self.lock().sheets.get(sheet).cloned().unwrap_or_default()
    }

    pub fn record(&self, sheet: &str, key: &str) -> Option<ChecklistRecord> {
        self.lock()
            .sheets
            .get(sheet)
            .and_then(|records| records.iter().find(|record| record.code == key).cloned())
    }

    pub fn update_calls(&self) -> Vec<UpdateCall> {
        self.lock().update_calls.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.lock().fetch_count
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn fetch_all(&self, sheet: &str) -> Result<Vec<ChecklistRecord>, FetchError> {
        let mut state = self.lock();
        state.fetch_count += 1;
        if let Some(message) = state.fetch_failure.take() {
            return Err(FetchError::Remote(message));
        }
        Ok(state.sheets.get(sheet).cloned().unwrap_or_default())
    }

    async fn update_fields(
        &self,
        sheet: &str,
        key: &str,
        fields: &FieldPayload,
    ) -> Result<(), UpdateError> {
        let mut state = self.lock();
        state.update_calls.push(UpdateCall {
            sheet: sheet.to_owned(),
            key: key.to_owned(),
            fields: fields.clone(),
        });

        if let Some(message) = state.update_failure.take() {
            return Err(UpdateError::from_remote_message(message));
        }
        if let Some(field) = fields
            .keys()
            .find(|field| state.missing_columns.contains(*field))
        {
            return Err(UpdateError::ColumnNotFound(format!(
                "{COLUMN_NOT_FOUND_MARKER}: {}",
                field.column()
            )));
        }

        let record = state
            .sheets
            .get_mut(sheet)
            .and_then(|records| records.iter_mut().find(|record| record.code == key))
            .ok_or_else(|| UpdateError::Remote(format!("record not found: {key}")))?;
        for (field, value) in fields {
            record.set(*field, value.clone());
        }

        Ok(())
    }

    fn store_name(&self) -> &str {
        "memory"
    }
}
