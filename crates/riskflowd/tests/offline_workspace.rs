use std::fs;
use std::path::Path;

use clap::Parser;
use riskflow_config::{config_path, ensure_workspace_config};
use riskflow_core::{ChecklistRecord, Field};
use riskflow_store::{CHECKLIST_CACHE_SLOT, SnapshotCache};
use riskflowd::cli::Cli;
use riskflowd::commands::run;
use riskflowd::export::CSV_BOM;
use tempfile::TempDir;

fn memory_workspace() -> Result<TempDir, Box<dyn std::error::Error>> {
    let temp = tempfile::tempdir()?;
    ensure_workspace_config(temp.path())?;
    fs::write(
        config_path(temp.path()),
        "[backend]\nprovider = \"memory\"\n\n[matrix]\nsize = \"5x5\"\naccept_threshold = 7\n",
    )?;
    SnapshotCache::open(temp.path())?.store(
        CHECKLIST_CACHE_SLOT,
        &[
            ChecklistRecord::new("1.1.1.1")
                .with(Field::Domain, "관리체계")
                .with(Field::ItemCode, "정책 수립")
                .with(Field::Result, "취약"),
            ChecklistRecord::new("1.1.1.2")
                .with(Field::Domain, "관리체계")
                .with(Field::Result, "양호"),
            ChecklistRecord::new("2.1.1.1").with(Field::Domain, "접근통제"),
        ],
    )?;
    Ok(temp)
}

fn riskflowd(workspace: &Path, args: &[&str]) -> Result<String, anyhow::Error> {
    let workspace = workspace.to_string_lossy().into_owned();
    let argv = ["riskflowd", "--workspace", workspace.as_str()]
        .into_iter()
        .chain(args.iter().copied());
    let cli = Cli::try_parse_from(argv)?;
    let mut out = Vec::new();
    run(cli, &mut out)?;
    Ok(String::from_utf8(out)?)
}

#[test]
fn progress_reports_full_set_totals() -> Result<(), Box<dyn std::error::Error>> {
    let temp = memory_workspace()?;

    let table = riskflowd(temp.path(), &["progress"])?;
    assert!(table.starts_with("stage\tdone\ttotal\tpct\n"));
    assert!(table.contains("vulnerability\t2\t3\t67%"));
    assert!(table.contains("risk_evaluation\t0\t1\t0%"));
    assert!(table.contains("controls=3 vulnerable=1 unacceptable=0"));

    let json: serde_json::Value =
        serde_json::from_str(&riskflowd(temp.path(), &["progress", "--output", "json"])?)?;
    assert_eq!(json["control_count"], 3);
    assert_eq!(json["vulnerable_count"], 1);
    Ok(())
}

#[test]
fn saves_persist_across_runs() -> Result<(), Box<dyn std::error::Error>> {
    let temp = memory_workspace()?;

    let saved = riskflowd(
        temp.path(),
        &["save", "risk", "1.1.1.1", "impact=4", "likelihood=3"],
    )?;
    assert_eq!(saved, "1.1.1.1: saved impact, likelihood\n");

    let shown = riskflowd(temp.path(), &["show", "1.1.1.1"])?;
    assert!(shown.contains("Impact (impact): 4"));
    assert!(shown.contains("state: risk_evaluated"));
    assert!(shown.contains("score: 12 (Medium), above acceptance threshold"));
    assert!(shown.contains("residual: impact 3, likelihood 2"));

    let treated = riskflowd(temp.path(), &["save", "treatment", "1.1.1.1"])?;
    assert!(treated.contains("using recommended strategy Mitigate"));
    assert!(treated.contains("treatment_strategy"));
    assert!(treated.contains("treatment_status"));

    let listed: serde_json::Value = serde_json::from_str(&riskflowd(
        temp.path(),
        &["--offline", "list", "residual", "--output", "json"],
    )?)?;
    assert_eq!(listed["matched"], 1);
    assert_eq!(listed["rows"][0]["code"], "1.1.1.1");
    assert_eq!(listed["rows"][0]["done"], false);
    Ok(())
}

#[test]
fn accept_without_reason_fails_and_writes_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let temp = memory_workspace()?;
    riskflowd(
        temp.path(),
        &["save", "risk", "1.1.1.1", "impact=2", "likelihood=2"],
    )?;

    let err = riskflowd(
        temp.path(),
        &["save", "treatment", "1.1.1.1", "treatment_strategy=Accept"],
    )
    .expect_err("accept without a reason is rejected");
    assert!(format!("{err:#}").contains("accept_reason is required"));

    let listed = riskflowd(temp.path(), &["list", "treatment"])?;
    assert!(listed.contains("0/1 done"));
    assert!(listed.contains("1.1.1.1\t관리체계\t정책 수립\t취약\t4\tL\tno"));
    Ok(())
}

#[test]
fn edits_outside_the_stage_are_refused() -> Result<(), Box<dyn std::error::Error>> {
    let temp = memory_workspace()?;

    let err = riskflowd(temp.path(), &["save", "risk", "1.1.1.2", "impact=3"])
        .expect_err("good control is not risk-evaluated");
    assert!(format!("{err:#}").contains("cannot set impact on 1.1.1.2"));

    let err = riskflowd(temp.path(), &["save", "vulnerability", "1.1.1.2", "impact=3"])
        .expect_err("impact is not a vulnerability field");
    assert!(format!("{err:#}").contains("cannot set impact"));
    Ok(())
}

#[test]
fn export_writes_bom_prefixed_csv() -> Result<(), Box<dyn std::error::Error>> {
    let temp = memory_workspace()?;
    let target = temp.path().join("out").join("checklist.csv");
    let target_arg = target.to_string_lossy().into_owned();

    let report = riskflowd(
        temp.path(),
        &["export", "--domain", "관리체계", "--output", target_arg.as_str()],
    )?;
    assert!(report.starts_with("exported 2 records"));

    let csv = fs::read_to_string(&target)?;
    assert!(csv.starts_with(CSV_BOM));
    assert_eq!(csv.split('\n').count(), 3);
    assert!(!csv.contains("2.1.1.1"));
    Ok(())
}

#[test]
fn offline_run_without_cache_fails() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempfile::tempdir()?;
    ensure_workspace_config(temp.path())?;
    fs::write(config_path(temp.path()), "[backend]\nprovider = \"memory\"\n")?;

    let err = riskflowd(temp.path(), &["--offline", "progress"]).expect_err("nothing cached");
    assert!(err.to_string().contains("no cached checklist"));
    Ok(())
}

#[test]
fn offline_reads_the_cache_under_the_default_http_config() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempfile::tempdir()?;
    ensure_workspace_config(temp.path())?;
    SnapshotCache::open(temp.path())?.store(
        CHECKLIST_CACHE_SLOT,
        &[ChecklistRecord::new("1.1.1.1").with(Field::Result, "취약")],
    )?;

    let table = riskflowd(temp.path(), &["--offline", "progress"])?;
    assert!(table.contains("controls=1 vulnerable=1 unacceptable=0"));

    let err = riskflowd(temp.path(), &["progress"]).expect_err("no endpoint configured");
    assert!(format!("{err:#}").contains("backend endpoint is not configured"));

    let err = riskflowd(
        temp.path(),
        &["--offline", "save", "risk", "1.1.1.1", "impact=3"],
    )
    .expect_err("saves need the backend");
    assert!(err.to_string().contains("run it without --offline"));
    Ok(())
}
