use std::sync::Arc;

use riskflow_config::RiskflowConfig;
use riskflow_core::{
    ChecklistRecord, Dashboard, Field, MatrixBound, Progress, Stage, ViewFilter,
};
use riskflow_store::{CHECKLIST_CACHE_SLOT, CacheError, FetchError, RecordStore, SnapshotCache};

use crate::DraftError;
use crate::draft::{CommitOutcome, DraftSynchronizer};
use crate::stage::{StageRow, stage_rules};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub sheet: String,
    pub bound: MatrixBound,
    pub accept_threshold: u32,
}

impl SessionOptions {
    pub fn from_config(config: &RiskflowConfig) -> Self {
        Self {
            sheet: config.backend.sheet.clone(),
            bound: MatrixBound::from_max_level(config.matrix.size.max_level())
                .unwrap_or_default(),
            accept_threshold: config.matrix.accept_threshold,
        }
    }
}

/// One sheet's checklist, its unsaved edits and the views over it.
///
/// The record list is an immutable snapshot replaced wholesale on reload or
/// after a save; every view is computed from it plus the draft overlay.
pub struct AssessmentSession {
    drafts: DraftSynchronizer,
    store: Arc<dyn RecordStore>,
    cache: Option<SnapshotCache>,
    options: SessionOptions,
    snapshot: Arc<[ChecklistRecord]>,
}

impl AssessmentSession {
    pub fn new(store: Arc<dyn RecordStore>, options: SessionOptions) -> Self {
        Self {
            drafts: DraftSynchronizer::new(store.clone(), options.sheet.clone(), options.bound),
            store,
            cache: None,
            options,
            snapshot: Arc::from(Vec::new()),
        }
    }

    pub fn with_cache(mut self, cache: SnapshotCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn store_name(&self) -> &str {
        self.store.store_name()
    }

    pub fn drafts(&self) -> &DraftSynchronizer {
        &self.drafts
    }

    /// Committed records in sheet order.
    pub fn records(&self) -> Arc<[ChecklistRecord]> {
        self.snapshot.clone()
    }

    /// Loads the cached snapshot when nothing has been fetched yet. Returns
    /// the number of records shown.
    pub fn show_cached(&mut self) -> Result<usize, CacheError> {
        if !self.snapshot.is_empty() {
            return Ok(self.snapshot.len());
        }
        let Some(cache) = &self.cache else {
            return Ok(0);
        };
        let Some(records) = cache.load(CHECKLIST_CACHE_SLOT)? else {
            return Ok(0);
        };
        if records.is_empty() {
            return Ok(0);
        }

        tracing::info!(records = records.len(), "showing cached checklist");
        self.install(records);
        Ok(self.snapshot.len())
    }

    /// Fetches the sheet, caches it and reconciles it with pending edits.
    /// On failure the previous snapshot stays in place.
    pub async fn refresh(&mut self) -> Result<usize, FetchError> {
        let records = self.store.fetch_all(&self.options.sheet).await?;

        if let Some(cache) = &self.cache {
            if let Err(err) = cache.store(CHECKLIST_CACHE_SLOT, &records) {
                tracing::warn!(error = %err, "failed to write checklist cache");
            }
        }

        tracing::info!(
            sheet = %self.options.sheet,
            records = records.len(),
            "loaded checklist"
        );
        self.install(records);
        Ok(self.snapshot.len())
    }

    fn install(&mut self, fresh: Vec<ChecklistRecord>) {
        let report = self.drafts.reconcile(&fresh);
        if !report.kept_pending.is_empty() {
            tracing::info!(
                keys = ?report.kept_pending,
                "kept local edits over fetched values"
            );
        }

        let mut records = fresh
            .into_iter()
            .map(|record| self.drafts.committed(&record.code).unwrap_or(record))
            .collect::<Vec<_>>();
        for key in &report.kept_pending {
            if !records.iter().any(|record| &record.code == key) {
                if let Some(record) = self.drafts.committed(key) {
                    records.push(record);
                }
            }
        }
        self.snapshot = Arc::from(records);
    }

    fn sync_snapshot_record(&mut self, key: &str) {
        let Some(updated) = self.drafts.committed(key) else {
            return;
        };
        let records = self
            .snapshot
            .iter()
            .map(|record| {
                if record.code == key {
                    updated.clone()
                } else {
                    record.clone()
                }
            })
            .collect::<Vec<_>>();
        self.snapshot = Arc::from(records);
    }

    /// Records eligible for `stage` that pass `filter`, with drafts applied.
    pub fn rows(&self, stage: Stage, filter: &ViewFilter) -> Vec<StageRow> {
        let rules = stage_rules(stage);
        self.snapshot
            .iter()
            .filter(|record| stage.is_eligible(record) && filter.matches(record))
            .map(|record| {
                let current = self
                    .drafts
                    .record(&record.code)
                    .unwrap_or_else(|| record.clone());
                let pending = self.drafts.draft(&record.code).into_keys().collect();
                rules.row(
                    record,
                    current,
                    pending,
                    self.drafts.is_in_flight(&record.code),
                    self.options.bound,
                    self.options.accept_threshold,
                )
            })
            .collect()
    }

    pub fn row(&self, stage: Stage, key: &str) -> Option<StageRow> {
        let record = self.snapshot.iter().find(|record| record.code == key)?;
        if !stage.is_eligible(record) {
            return None;
        }
        let current = self.drafts.record(key).unwrap_or_else(|| record.clone());
        Some(stage_rules(stage).row(
            record,
            current,
            self.drafts.draft(key).into_keys().collect(),
            self.drafts.is_in_flight(key),
            self.options.bound,
            self.options.accept_threshold,
        ))
    }

    pub fn edit(
        &self,
        stage: Stage,
        key: &str,
        field: Field,
        value: impl Into<String>,
    ) -> Result<(), DraftError> {
        stage_rules(stage).check_editable(field)?;
        self.check_eligible(stage, key)?;
        self.drafts.set_draft_field(key, field, value)
    }

    /// Saves the stage's edits for `key`, then reloads the sheet.
    ///
    /// A failed reload after a successful write is logged and does not fail
    /// the save.
    pub async fn save(&mut self, stage: Stage, key: &str) -> Result<CommitOutcome, DraftError> {
        self.check_eligible(stage, key)?;
        let rules = stage_rules(stage);

        let outcome = self
            .drafts
            .commit_with(key, rules.completion, rules.required_fields)
            .await?;

        if let CommitOutcome::Saved(_) = &outcome {
            self.sync_snapshot_record(key);
            if let Err(err) = self.refresh().await {
                tracing::warn!(key, error = %err, "reload after save failed");
            }
        }
        Ok(outcome)
    }

    pub fn discard(&self, key: &str) -> Result<bool, DraftError> {
        self.drafts.discard(key)
    }

    pub fn progress(&self, stage: Stage) -> Progress {
        stage_rules(stage).progress(&self.snapshot)
    }

    pub fn dashboard(&self) -> Dashboard {
        Dashboard::build(
            &self.snapshot,
            self.options.bound,
            self.options.accept_threshold,
        )
    }

    fn check_eligible(&self, stage: Stage, key: &str) -> Result<(), DraftError> {
        let record = self
            .snapshot
            .iter()
            .find(|record| record.code == key)
            .ok_or_else(|| DraftError::UnknownRecord(key.to_owned()))?;
        if stage.is_eligible(record) {
            Ok(())
        } else {
            Err(DraftError::NotEligible {
                stage,
                key: key.to_owned(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use riskflow_store::MemoryRecordStore;
    use tempfile::tempdir;

    use super::*;

    const SHEET: &str = "Checklist";

    fn options() -> SessionOptions {
        SessionOptions {
            sheet: SHEET.to_owned(),
            bound: MatrixBound::Five,
            accept_threshold: 7,
        }
    }

    #[test]
    fn options_follow_matrix_config() {
        let mut config = RiskflowConfig::default();
        config.matrix.size = riskflow_config::MatrixSize::ThreeByThree;
        config.matrix.accept_threshold = 4;

        let options = SessionOptions::from_config(&config);
        assert_eq!(options.bound, MatrixBound::Three);
        assert_eq!(options.accept_threshold, 4);
        assert_eq!(options.sheet, "Checklist");
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot() {
        let store = Arc::new(MemoryRecordStore::with_records(
            SHEET,
            vec![ChecklistRecord::new("1.1"), ChecklistRecord::new("1.2")],
        ));
        let mut session = AssessmentSession::new(store.clone(), options());
        assert_eq!(session.refresh().await.expect("first refresh"), 2);

        store.fail_next_fetch("quota exceeded");
        let err = session.refresh().await.expect_err("refresh fails");

        assert_eq!(err.to_string(), "quota exceeded");
        assert_eq!(session.records().len(), 2);
    }

    #[tokio::test]
    async fn cached_snapshot_is_shown_before_first_fetch() {
        let temp = tempdir().expect("tempdir");
        let store = Arc::new(MemoryRecordStore::with_records(
            SHEET,
            vec![ChecklistRecord::new("1.1").with(Field::Status, "cached")],
        ));

        let mut first = AssessmentSession::new(store.clone(), options())
            .with_cache(SnapshotCache::open(temp.path()).expect("open cache"));
        first.refresh().await.expect("refresh");
        drop(first);

        let offline = Arc::new(MemoryRecordStore::new());
        let mut second = AssessmentSession::new(offline, options())
            .with_cache(SnapshotCache::open(temp.path()).expect("reopen cache"));
        assert_eq!(second.show_cached().expect("show cached"), 1);
        assert_eq!(second.records()[0].status, "cached");
        assert_eq!(second.progress(Stage::Implementation), Progress::new(1, 1));
    }

    #[tokio::test]
    async fn edits_are_scoped_to_the_stage_and_eligible_records() {
        let store = Arc::new(MemoryRecordStore::with_records(
            SHEET,
            vec![ChecklistRecord::new("1.1").with(Field::Result, "양호")],
        ));
        let mut session = AssessmentSession::new(store, options());
        session.refresh().await.expect("refresh");

        assert!(matches!(
            session.edit(Stage::Vulnerability, "1.1", Field::Impact, "3"),
            Err(DraftError::FieldNotEditable { .. })
        ));
        assert!(matches!(
            session.edit(Stage::RiskEvaluation, "1.1", Field::Impact, "3"),
            Err(DraftError::NotEligible { .. })
        ));
        assert!(matches!(
            session.edit(Stage::Implementation, "9.9", Field::Status, "x"),
            Err(DraftError::UnknownRecord(_))
        ));
        session
            .edit(Stage::Vulnerability, "1.1", Field::ResultDetail, "MFA missing")
            .expect("edit detail");

        let rows = session.rows(Stage::Vulnerability, &ViewFilter::default());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].record.result_detail, "MFA missing");
        assert_eq!(rows[0].pending, vec![Field::ResultDetail]);
        assert!(rows[0].done);
    }
}
