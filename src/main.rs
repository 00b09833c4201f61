mod telemetry;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use price_analysis::config::{AppConfig, EngineConfig};
use price_analysis::error::AppError;
use price_analysis::stats::{self, safe, Coercion, Sample, StatValue};
use price_analysis::valuation::{SurveyImporter, Worksheet, WorksheetSpec, WorksheetSummary};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "price-analysis",
    about = "Settle appraisal price-analysis worksheets and run spreadsheet regressions",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a worksheet description, settle every derived field and print the result
    Evaluate(EvaluateArgs),
    /// Print SLOPE, INTERCEPT, RSQ, STEYX and optionally FORECAST for two sample lists
    Regress(RegressArgs),
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    /// Worksheet description (JSON)
    #[arg(long)]
    worksheet: PathBuf,
    /// Long-format survey export (CSV) appended to the worksheet's surveys
    #[arg(long)]
    surveys: Option<PathBuf>,
    /// Appraisal date (YYYY-MM-DD), overrides the worksheet's
    #[arg(long, value_parser = parse_date)]
    appraisal_date: Option<NaiveDate>,
    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

#[derive(Args, Debug)]
struct RegressArgs {
    /// Comma-separated known y values; empty entries are blanks
    #[arg(long)]
    known_y: String,
    /// Comma-separated known x values; empty entries are blanks
    #[arg(long)]
    known_x: String,
    /// Predict y at this x
    #[arg(long)]
    at: Option<f64>,
    /// Reject text entries instead of coercing them
    #[arg(long)]
    strict: bool,
}

#[derive(Debug, Serialize)]
struct RegressionReport {
    pairs: usize,
    slope: StatValue,
    intercept: StatValue,
    rsq: StatValue,
    steyx: StatValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    forecast: Option<StatValue>,
}

fn main() {
    if let Err(err) = run_cli() {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = AppConfig::load().map_err(AppError::from)?;
    telemetry::init(&config.telemetry, config.environment)?;

    match cli.command {
        Command::Evaluate(args) => run_evaluate(args, &config.engine)?,
        Command::Regress(args) => run_regress(args)?,
    }
    Ok(())
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

fn run_evaluate(args: EvaluateArgs, engine: &EngineConfig) -> Result<(), AppError> {
    let raw = std::fs::read_to_string(&args.worksheet)?;
    let mut spec: WorksheetSpec = serde_json::from_str(&raw)?;
    if let Some(path) = &args.surveys {
        let imported = SurveyImporter::from_path(path)?;
        info!(path = %path.display(), surveys = imported.len(), "imported comparable surveys");
        spec.surveys.extend(imported);
    }
    if args.appraisal_date.is_some() {
        spec.appraisal_date = args.appraisal_date;
    }

    let summary = evaluate(spec, engine)?;
    let rendered = if args.pretty {
        serde_json::to_string_pretty(&summary)?
    } else {
        serde_json::to_string(&summary)?
    };
    println!("{rendered}");
    Ok(())
}

fn evaluate(spec: WorksheetSpec, engine: &EngineConfig) -> Result<WorksheetSummary, AppError> {
    let method = spec.method;
    let worksheet = Worksheet::from_spec(spec, engine)?;
    let summary = worksheet.summary();
    info!(
        ?method,
        surveys = summary.surveys.len(),
        converged = summary.settle.map_or(true, |report| report.converged),
        "worksheet settled"
    );
    Ok(summary)
}

fn run_regress(args: RegressArgs) -> Result<(), AppError> {
    let known_y = parse_samples(&args.known_y);
    let known_x = parse_samples(&args.known_x);
    if known_y.len() != known_x.len() {
        return Err(AppError::Input(format!(
            "known_y has {} entries but known_x has {}",
            known_y.len(),
            known_x.len()
        )));
    }
    let coercion = if args.strict {
        Coercion::Strict
    } else {
        Coercion::Lenient
    };

    let report = regress(&known_y, &known_x, args.at, coercion);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn regress(known_y: &[Sample], known_x: &[Sample], at: Option<f64>, coercion: Coercion) -> RegressionReport {
    RegressionReport {
        pairs: known_y
            .iter()
            .zip(known_x)
            .filter(|(y, x)| !y.is_blank() && !x.is_blank())
            .count(),
        slope: safe(|| stats::slope(known_y, known_x, coercion)),
        intercept: safe(|| stats::intercept(known_y, known_x, coercion)),
        rsq: safe(|| stats::rsq(known_y, known_x, coercion)),
        steyx: safe(|| stats::steyx(known_y, known_x, coercion)),
        forecast: at.map(|x| safe(|| stats::forecast(x, known_y, known_x, coercion))),
    }
}

/// Splits a comma-separated list; numbers parse, empty entries are blank, anything else is text.
fn parse_samples(raw: &str) -> Vec<Sample> {
    raw.split(',')
        .map(str::trim)
        .map(|entry| {
            if entry.is_empty() {
                Sample::Blank
            } else {
                entry
                    .parse::<f64>()
                    .map_or_else(|_| Sample::from(entry), Sample::from)
            }
        })
        .collect()
}
