use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use riskflow_config::{RiskflowConfig, ensure_workspace_config, validate_config};
use riskflow_core::{ChecklistRecord, Field, ScoreView, Stage, derive_state, eligible_stages, paginate};
use riskflow_session::{AssessmentSession, CommitOutcome, SessionOptions, StageRow};
use riskflow_sheets::load_record_store_from_config;
use riskflow_store::{MemoryRecordStore, SnapshotCache};
use serde_json::{Value, json};
use tokio::runtime::Runtime;

use crate::cli::{
    Cli, Commands, ExportArgs, ListArgs, OutputFormat, ProgressArgs, SaveArgs, ShowArgs,
};
use crate::export::write_checklist_csv;

/// Runs one command against the workspace named on the command line,
/// writing its report to `out`.
pub fn run(cli: Cli, out: &mut dyn Write) -> Result<()> {
    let workspace = cli.workspace.canonicalize().with_context(|| {
        format!(
            "failed to resolve workspace path {}",
            cli.workspace.display()
        )
    })?;
    let config = ensure_workspace_config(&workspace).context("failed to load workspace config")?;
    for warning in validate_config(&config) {
        eprintln!(
            "riskflowd config warning [{}]: {}",
            warning.code, warning.message
        );
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    if cli.offline && matches!(cli.command, Commands::Save(_)) {
        bail!("save needs the checklist backend; run it without --offline");
    }
    let mut session = if cli.offline {
        open_offline_session(&workspace, &config)?
    } else {
        open_session(&workspace, &config)?
    };
    load_checklist(&runtime, &mut session, cli.offline)?;

    match cli.command {
        Commands::Progress(args) => run_progress(&session, &args, out),
        Commands::List(args) => run_list(&session, &args, out),
        Commands::Show(args) => run_show(&session, &args, out),
        Commands::Save(args) => run_save(&runtime, &mut session, &args, out),
        Commands::Export(args) => run_export(&session, &args, out),
    }
}

fn open_session(workspace: &Path, config: &RiskflowConfig) -> Result<AssessmentSession> {
    let loaded = load_record_store_from_config(workspace)
        .context("failed to set up checklist backend")?;
    tracing::debug!(store = %loaded.store_name, sheet = %loaded.sheet, "backend ready");

    let session = AssessmentSession::new(loaded.store, SessionOptions::from_config(config));
    if !config.cache.enabled {
        return Ok(session);
    }
    let cache = SnapshotCache::open(workspace).context("failed to open checklist cache")?;
    Ok(session.with_cache(cache))
}

/// Reads only the cached snapshot; the backend is never built, so a missing
/// endpoint or API key does not matter.
fn open_offline_session(workspace: &Path, config: &RiskflowConfig) -> Result<AssessmentSession> {
    let cache = SnapshotCache::open(workspace).context("failed to open checklist cache")?;
    let session = AssessmentSession::new(
        Arc::new(MemoryRecordStore::new()),
        SessionOptions::from_config(config),
    );
    Ok(session.with_cache(cache))
}

/// Shows the cached snapshot first, then fetches. A failed fetch is fatal
/// only when there is nothing cached to fall back on.
fn load_checklist(runtime: &Runtime, session: &mut AssessmentSession, offline: bool) -> Result<()> {
    let cached = match session.show_cached() {
        Ok(count) => count,
        Err(err) => {
            tracing::warn!(error = %err, "ignoring unreadable checklist cache");
            0
        }
    };

    if offline {
        if cached == 0 {
            bail!("no cached checklist; run once without --offline");
        }
        return Ok(());
    }

    match runtime.block_on(session.refresh()) {
        Ok(_) => Ok(()),
        Err(err) if cached > 0 => {
            tracing::warn!(error = %err, cached, "fetch failed, showing cached checklist");
            Ok(())
        }
        Err(err) => Err(err).context("failed to load checklist"),
    }
}

fn run_progress(session: &AssessmentSession, args: &ProgressArgs, out: &mut dyn Write) -> Result<()> {
    let dashboard = session.dashboard();
    if args.output == OutputFormat::Json {
        return write_json(out, &serde_json::to_value(&dashboard)?);
    }

    writeln!(out, "stage\tdone\ttotal\tpct")?;
    for summary in &dashboard.stages {
        writeln!(
            out,
            "{}\t{}\t{}\t{}%",
            summary.stage.as_str(),
            summary.progress.done,
            summary.progress.total,
            summary.progress.pct
        )?;
    }
    writeln!(
        out,
        "controls={} vulnerable={} unacceptable={}",
        dashboard.control_count, dashboard.vulnerable_count, dashboard.unacceptable_count
    )?;
    let grades = dashboard.grades;
    writeln!(
        out,
        "grades: low={} medium={} high={} very_high={}",
        grades.low, grades.medium, grades.high, grades.very_high
    )?;
    let residual = dashboard.residual_grades;
    writeln!(
        out,
        "residual grades: low={} medium={} high={} very_high={}",
        residual.low, residual.medium, residual.high, residual.very_high
    )?;
    Ok(())
}

fn run_list(session: &AssessmentSession, args: &ListArgs, out: &mut dyn Write) -> Result<()> {
    let rows = session.rows(args.stage, &args.view.filter());
    let progress = session.progress(args.stage);
    let page = paginate(&rows, args.page, args.page_size);

    if args.output == OutputFormat::Json {
        let value = json!({
            "stage": args.stage,
            "progress": progress,
            "page": page.page,
            "page_count": page.page_count,
            "matched": rows.len(),
            "rows": page.items.iter().map(row_json).collect::<Vec<_>>(),
        });
        return write_json(out, &value);
    }

    writeln!(
        out,
        "{}: {}/{} done ({}%), page {}/{}",
        args.stage.title(),
        progress.done,
        progress.total,
        progress.pct,
        page.page,
        page.page_count
    )?;
    if page.items.is_empty() {
        writeln!(out, "no matching records")?;
        return Ok(());
    }

    writeln!(out, "code\tdomain\titem\tresult\tscore\tgrade\tdone")?;
    for row in &page.items {
        let (score, grade) = score_cells(row.score);
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            normalize_table_field(&row.key),
            normalize_table_field(&row.record.domain),
            normalize_table_field(&row.record.item_code),
            normalize_table_field(&row.record.result),
            score,
            grade,
            if row.done { "yes" } else { "no" }
        )?;
    }
    Ok(())
}

fn run_show(session: &AssessmentSession, args: &ShowArgs, out: &mut dyn Write) -> Result<()> {
    let records = session.records();
    let Some(record) = records.iter().find(|record| record.code == args.code) else {
        bail!("no checklist record with code {}", args.code);
    };
    let options = session.options();

    for field in Field::ALL {
        writeln!(
            out,
            "{} ({}): {}",
            field.label(),
            field.column(),
            normalize_table_field(record.get(field))
        )?;
    }
    writeln!(out, "state: {}", derive_state(record).as_str())?;
    let stages = eligible_stages(record)
        .into_iter()
        .map(Stage::as_str)
        .collect::<Vec<_>>();
    writeln!(out, "stages: {}", stages.join(", "))?;

    let score = ScoreView::from_fields(
        &record.impact,
        &record.likelihood,
        options.bound,
        options.accept_threshold,
    );
    if let Some(view) = score {
        writeln!(
            out,
            "score: {} ({}){}",
            view.score,
            view.grade.label(),
            if view.acceptable { "" } else { ", above acceptance threshold" }
        )?;
    }
    if let Some(row) = session.row(Stage::Treatment, &record.code) {
        if let Some((impact, likelihood)) = row.residual_levels_or_suggested() {
            writeln!(out, "residual: impact {impact}, likelihood {likelihood}")?;
        }
    }
    Ok(())
}

fn run_save(
    runtime: &Runtime,
    session: &mut AssessmentSession,
    args: &SaveArgs,
    out: &mut dyn Write,
) -> Result<()> {
    for assignment in &args.assignments {
        session
            .edit(args.stage, &args.code, assignment.field, assignment.value.as_str())
            .with_context(|| format!("cannot set {} on {}", assignment.field, args.code))?;
    }

    if args.stage == Stage::Treatment
        && session
            .drafts()
            .read_field(&args.code, Field::TreatmentStrategy)
            .trim()
            .is_empty()
    {
        if let Some(strategy) = session
            .row(Stage::Treatment, &args.code)
            .and_then(|row| row.recommended_strategy)
        {
            session
                .edit(
                    Stage::Treatment,
                    &args.code,
                    Field::TreatmentStrategy,
                    strategy.as_str(),
                )
                .with_context(|| format!("cannot set recommended strategy on {}", args.code))?;
            writeln!(out, "{}: using recommended strategy {}", args.code, strategy.as_str())?;
        }
    }

    let outcome = runtime
        .block_on(session.save(args.stage, &args.code))
        .with_context(|| format!("failed to save {} for {}", args.stage.as_str(), args.code))?;

    match outcome {
        CommitOutcome::Unchanged => writeln!(out, "{}: nothing to save", args.code)?,
        CommitOutcome::Saved(fields) => {
            let columns = fields
                .keys()
                .map(|field| field.column())
                .collect::<Vec<_>>();
            writeln!(out, "{}: saved {}", args.code, columns.join(", "))?;
        }
    }
    Ok(())
}

fn run_export(session: &AssessmentSession, args: &ExportArgs, out: &mut dyn Write) -> Result<()> {
    let records = session.records();
    let filter = args.view.filter();
    let selected = records
        .iter()
        .filter(|record| args.stage.is_none_or(|stage| stage.is_eligible(record)))
        .filter(|record| filter.matches(record))
        .collect::<Vec<&ChecklistRecord>>();
    let options = session.options();

    match &args.output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            write_checklist_csv(&mut writer, &selected, options.bound, options.accept_threshold)
                .with_context(|| format!("failed to write {}", path.display()))?;
            writeln!(out, "exported {} records to {}", selected.len(), path.display())?;
        }
        None => {
            write_checklist_csv(out, &selected, options.bound, options.accept_threshold)
                .context("failed to write CSV to stdout")?;
        }
    }
    Ok(())
}

fn row_json(row: &StageRow) -> Value {
    json!({
        "code": row.key,
        "domain": row.record.domain,
        "item_code": row.record.item_code,
        "result": row.record.result,
        "done": row.done,
        "pending": row.pending,
        "score": row.score,
        "residual_score": row.residual_score,
        "recommended_strategy": row.recommended_strategy.map(|strategy| strategy.as_str()),
    })
}

fn score_cells(score: Option<ScoreView>) -> (String, &'static str) {
    match score {
        Some(view) => (view.score.to_string(), view.grade.code()),
        None => ("-".to_owned(), "-"),
    }
}

fn write_json(out: &mut dyn Write, value: &Value) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value).context("failed to serialize JSON output")?;
    writeln!(out)?;
    Ok(())
}

pub fn normalize_table_field(value: &str) -> String {
    value
        .chars()
        .map(|ch| match ch {
            '\t' | '\n' | '\r' => ' ',
            other => other,
        })
        .collect::<String>()
}
