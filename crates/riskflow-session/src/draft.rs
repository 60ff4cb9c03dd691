//! Unsaved edits layered over the last committed values.
//!
//! Every record has a committed copy (what the sheet last returned or what
//! this process last wrote successfully) and an optional draft holding the
//! fields the user touched since. Reads see the draft first. A commit sends
//! the draft plus any completion fields, and only a successful write moves
//! them into the committed copy; a failed one leaves the draft exactly as it
//! was so the user can retry.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use riskflow_core::{
    ChecklistRecord, Field, FieldPayload, MatrixBound, RecordKey, canonical_value, validate_save,
};
use riskflow_store::RecordStore;

use crate::DraftError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Nothing differed from the committed record; no call was made.
    Unchanged,
    Saved(FieldPayload),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub updated: usize,
    pub kept_pending: Vec<RecordKey>,
    pub dropped: usize,
}

#[derive(Debug, Default)]
struct DraftState {
    committed: HashMap<RecordKey, ChecklistRecord>,
    drafts: HashMap<RecordKey, FieldPayload>,
    in_flight: HashSet<RecordKey>,
}

impl DraftState {
    fn is_protected(&self, key: &str) -> bool {
        self.in_flight.contains(key) || self.drafts.get(key).is_some_and(|draft| !draft.is_empty())
    }

    fn merged(&self, key: &str) -> Option<ChecklistRecord> {
        let mut record = self.committed.get(key)?.clone();
        if let Some(draft) = self.drafts.get(key) {
            for (field, value) in draft {
                record.set(*field, value.clone());
            }
        }
        Some(record)
    }
}

pub struct DraftSynchronizer {
    store: Arc<dyn RecordStore>,
    sheet: String,
    bound: MatrixBound,
    state: Mutex<DraftState>,
}

impl DraftSynchronizer {
    pub fn new(store: Arc<dyn RecordStore>, sheet: impl Into<String>, bound: MatrixBound) -> Self {
        Self {
            store,
            sheet: sheet.into(),
            bound,
            state: Mutex::new(DraftState::default()),
        }
    }

    pub fn sheet(&self) -> &str {
        &self.sheet
    }

    pub fn bound(&self) -> MatrixBound {
        self.bound
    }

    /// Draft value if one is pending, else the committed value, else "".
    pub fn read_field(&self, key: &str, field: Field) -> String {
        let state = self.lock();
        if let Some(value) = state.drafts.get(key).and_then(|draft| draft.get(&field)) {
            return value.clone();
        }
        state
            .committed
            .get(key)
            .map(|record| record.get(field).to_owned())
            .unwrap_or_default()
    }

    /// The record as the user currently sees it.
    pub fn record(&self, key: &str) -> Option<ChecklistRecord> {
        self.lock().merged(key)
    }

    pub fn committed(&self, key: &str) -> Option<ChecklistRecord> {
        self.lock().committed.get(key).cloned()
    }

    pub fn draft(&self, key: &str) -> FieldPayload {
        self.lock().drafts.get(key).cloned().unwrap_or_default()
    }

    pub fn has_pending(&self, key: &str) -> bool {
        self.lock()
            .drafts
            .get(key)
            .is_some_and(|draft| !draft.is_empty())
    }

    pub fn pending_keys(&self) -> Vec<RecordKey> {
        let state = self.lock();
        let mut keys = state
            .drafts
            .iter()
            .filter(|(_, draft)| !draft.is_empty())
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();
        keys.sort();
        keys
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.lock().in_flight.contains(key)
    }

    /// Buffers an edit locally. Setting a field back to its committed value
    /// clears that draft entry.
    pub fn set_draft_field(
        &self,
        key: &str,
        field: Field,
        value: impl Into<String>,
    ) -> Result<(), DraftError> {
        let value = value.into();
        let mut state = self.lock();
        if state.in_flight.contains(key) {
            return Err(DraftError::CommitInFlight(key.to_owned()));
        }
        let committed_value = state
            .committed
            .get(key)
            .map(|record| record.get(field).to_owned())
            .ok_or_else(|| DraftError::UnknownRecord(key.to_owned()))?;

        let draft = state.drafts.entry(key.to_owned()).or_default();
        if value == committed_value {
            draft.remove(&field);
        } else {
            draft.insert(field, value);
        }
        if draft.is_empty() {
            state.drafts.remove(key);
        }
        Ok(())
    }

    /// Drops every pending edit for `key`. Returns whether anything was
    /// dropped.
    pub fn discard(&self, key: &str) -> Result<bool, DraftError> {
        let mut state = self.lock();
        if state.in_flight.contains(key) {
            return Err(DraftError::CommitInFlight(key.to_owned()));
        }
        Ok(state
            .drafts
            .remove(key)
            .is_some_and(|draft| !draft.is_empty()))
    }

    pub async fn commit(&self, key: &str) -> Result<CommitOutcome, DraftError> {
        self.commit_with(key, &[], &[]).await
    }

    /// Sends the draft for `key` together with `completion`, after checking
    /// the merged record against the save policy and `required`.
    ///
    /// Completion values that already match the committed record are not
    /// resent, so a commit with no draft on an already-completed record makes
    /// no call at all.
    pub async fn commit_with(
        &self,
        key: &str,
        completion: &[(Field, &str)],
        required: &[Field],
    ) -> Result<CommitOutcome, DraftError> {
        let payload = {
            let mut state = self.lock();
            if state.in_flight.contains(key) {
                return Err(DraftError::CommitInFlight(key.to_owned()));
            }
            let committed = state
                .committed
                .get(key)
                .cloned()
                .ok_or_else(|| DraftError::UnknownRecord(key.to_owned()))?;

            let mut payload = state
                .drafts
                .get(key)
                .map(|draft| {
                    draft
                        .iter()
                        .map(|(field, value)| (*field, canonical_value(*field, value)))
                        .collect::<FieldPayload>()
                })
                .unwrap_or_default();
            for (field, value) in completion {
                if committed.get(*field) != *value || payload.contains_key(field) {
                    payload.insert(*field, (*value).to_owned());
                }
            }
            if payload.is_empty() {
                return Ok(CommitOutcome::Unchanged);
            }

            let mut merged = committed;
            for (field, value) in &payload {
                merged.set(*field, value.clone());
            }
            if let Err(err) = validate_save(&merged, &payload, required, self.bound) {
                tracing::warn!(key, error = %err, "rejected save before sending");
                return Err(err.into());
            }

            state.in_flight.insert(key.to_owned());
            payload
        };

        let _in_flight = InFlightGuard {
            state: &self.state,
            key,
        };
        if let Err(err) = self.store.update_fields(&self.sheet, key, &payload).await {
            tracing::warn!(key, error = %err, "save failed; keeping draft");
            return Err(err.into());
        }

        let mut state = self.lock();
        if let Some(record) = state.committed.get_mut(key) {
            for (field, value) in &payload {
                record.set(*field, value.clone());
            }
        }
        if let Some(draft) = state.drafts.get_mut(key) {
            for field in payload.keys() {
                draft.remove(field);
            }
            if draft.is_empty() {
                state.drafts.remove(key);
            }
        }
        tracing::info!(key, fields = payload.len(), "saved record");

        Ok(CommitOutcome::Saved(payload))
    }

    /// Replaces committed values with a fresh fetch.
    ///
    /// Keys with pending drafts or an in-flight commit are left alone, and
    /// keys missing from `fresh` are dropped unless they are protected the
    /// same way.
    pub fn reconcile(&self, fresh: &[ChecklistRecord]) -> ReconcileReport {
        let mut state = self.lock();
        let mut report = ReconcileReport::default();
        let mut seen = HashSet::with_capacity(fresh.len());

        for record in fresh {
            seen.insert(record.code.as_str());
            if state.is_protected(&record.code) {
                report.kept_pending.push(record.code.clone());
                continue;
            }
            state.committed.insert(record.code.clone(), record.clone());
            report.updated += 1;
        }

        let stale = state
            .committed
            .keys()
            .filter(|key| !seen.contains(key.as_str()))
            .cloned()
            .collect::<Vec<_>>();
        for key in stale {
            if state.is_protected(&key) {
                report.kept_pending.push(key);
            } else {
                state.committed.remove(&key);
                report.dropped += 1;
            }
        }

        report.kept_pending.sort();
        report
    }

    fn lock(&self) -> MutexGuard<'_, DraftState> {
        lock_state(&self.state)
    }
}

fn lock_state(state: &Mutex<DraftState>) -> MutexGuard<'_, DraftState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Clears the in-flight mark for a key when the commit finishes, whichever
/// way it finishes.
struct InFlightGuard<'a> {
    state: &'a Mutex<DraftState>,
    key: &'a str,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        lock_state(self.state).in_flight.remove(self.key);
    }
}
