use std::ffi::OsStr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use riskflow_core::{DEFAULT_PAGE_SIZE, Field, Stage, ViewFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid log format '{other}', expected one of: human, json"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid output format '{other}', expected one of: table, json"
            )),
        }
    }
}

/// One `field=value` pair from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub field: Field,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ViewArgs {
    #[arg(long, help = "Only include records in this domain")]
    pub domain: Option<String>,

    #[arg(long, help = "Case-insensitive text search over code, domain and item")]
    pub query: Option<String>,
}

impl ViewArgs {
    pub fn filter(&self) -> ViewFilter {
        ViewFilter {
            domain: self.domain.clone(),
            query: self.query.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ProgressArgs {
    #[arg(
        long,
        default_value = "table",
        value_parser = parse_output_format,
        help = "Output format: table or json"
    )]
    pub output: OutputFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ListArgs {
    #[arg(value_parser = parse_stage, help = "Stage whose eligible records to list")]
    pub stage: Stage,

    #[command(flatten)]
    pub view: ViewArgs,

    #[arg(long, default_value_t = 1, help = "1-based page number")]
    pub page: usize,

    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    #[arg(
        long,
        default_value = "table",
        value_parser = parse_output_format,
        help = "Output format: table or json"
    )]
    pub output: OutputFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ShowArgs {
    #[arg(help = "Control code, e.g. 1.1.1.1")]
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct SaveArgs {
    #[arg(value_parser = parse_stage)]
    pub stage: Stage,

    pub code: String,

    #[arg(
        value_parser = parse_assignment,
        value_name = "FIELD=VALUE",
        help = "Fields to write, by column name"
    )]
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ExportArgs {
    #[arg(
        long,
        value_parser = parse_stage,
        help = "Only export records eligible for this stage"
    )]
    pub stage: Option<Stage>,

    #[command(flatten)]
    pub view: ViewArgs,

    #[arg(long, short, help = "Write to this file instead of stdout")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Show progress for every stage
    Progress(ProgressArgs),
    /// List the records of one stage
    List(ListArgs),
    /// Show every field of one record
    Show(ShowArgs),
    /// Write fields for one record through a stage and mark the stage done
    Save(SaveArgs),
    /// Export the checklist as CSV
    Export(ExportArgs),
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Risk assessment checklist workflow")]
pub struct Cli {
    #[arg(
        long,
        global = true,
        default_value = ".",
        help = "Workspace root holding .riskflow/"
    )]
    pub workspace: PathBuf,

    #[arg(
        long,
        global = true,
        default_value = "human",
        value_parser = parse_log_format,
        help = "Log format: human or json"
    )]
    pub log_format: LogFormat,

    #[arg(
        long,
        global = true,
        help = "Read the cached checklist without building or contacting the backend"
    )]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Commands,
}

pub fn parse_cli() -> Cli {
    let mut args: Vec<_> = std::env::args_os().collect();
    if args.get(1).is_some_and(|arg| arg == OsStr::new("--")) {
        args.remove(1);
    }

    Cli::parse_from(args)
}

fn parse_stage(value: &str) -> Result<Stage, String> {
    value.parse()
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse()
}

fn parse_output_format(value: &str) -> Result<OutputFormat, String> {
    value.parse()
}

fn parse_assignment(value: &str) -> Result<Assignment, String> {
    let (field, value) = value
        .split_once('=')
        .ok_or_else(|| format!("invalid assignment '{value}', expected FIELD=VALUE"))?;
    Ok(Assignment {
        field: field.trim().parse()?,
        value: value.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn save_parses_stage_code_and_assignments() {
        let cli = Cli::try_parse_from([
            "riskflowd",
            "--workspace",
            "/tmp/audit",
            "save",
            "treatment",
            "1.1.1.1",
            "treatment_strategy=Accept",
            "accept_reason=cost, approved by CISO",
        ])
        .expect("save should parse");

        assert_eq!(cli.workspace, PathBuf::from("/tmp/audit"));
        match cli.command {
            Commands::Save(args) => {
                assert_eq!(args.stage, Stage::Treatment);
                assert_eq!(args.code, "1.1.1.1");
                assert_eq!(
                    args.assignments,
                    vec![
                        Assignment {
                            field: Field::TreatmentStrategy,
                            value: "Accept".to_owned(),
                        },
                        Assignment {
                            field: Field::AcceptReason,
                            value: "cost, approved by CISO".to_owned(),
                        },
                    ]
                );
            }
            other => panic!("expected save command, got {other:?}"),
        }
    }

    #[test]
    fn list_accepts_stage_aliases_and_view_flags() {
        let cli = Cli::try_parse_from([
            "riskflowd",
            "list",
            "risk",
            "--domain",
            "접근통제",
            "--page",
            "2",
            "--output",
            "json",
            "--log-format",
            "json",
        ])
        .expect("list should parse");

        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Commands::List(args) => {
                assert_eq!(args.stage, Stage::RiskEvaluation);
                assert_eq!(args.view.domain.as_deref(), Some("접근통제"));
                assert_eq!(args.page, 2);
                assert_eq!(args.page_size, DEFAULT_PAGE_SIZE);
                assert_eq!(args.output.as_str(), "json");
            }
            other => panic!("expected list command, got {other:?}"),
        }
    }

    #[test]
    fn malformed_assignments_are_rejected() {
        assert!(parse_assignment("result").is_err());
        assert!(parse_assignment("no_such_column=1").is_err());
        assert_eq!(
            parse_assignment("treatment_plan= keep = spacing ").expect("assignment"),
            Assignment {
                field: Field::TreatmentPlan,
                value: " keep = spacing ".to_owned(),
            }
        );
    }
}
