//! Rabet CLI - Command-line interface for the behavior timeline engine
//!
//! Commands:
//! - analyze: Aggregate annotation files into a summary CSV or JSON report
//! - replay: Drive a recording session from a recorded host-signal script
//! - validate: Check annotation files for readable sections and rows
//! - metrics: Print, check or write a metrics configuration

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use rabet_timeline::analysis::pipeline::default_behaviors;
use rabet_timeline::analysis::{analyze_files, Analyzer, MetricsConfig};
use rabet_timeline::format::{read_annotation_file, write_annotations, write_summary};
use rabet_timeline::replay::replay;
use rabet_timeline::{ActionMap, SessionConfig, TimelineError, VERSION};

/// Rabet - record and analyze behavior event timelines
#[derive(Parser)]
#[command(name = "rabet")]
#[command(version = VERSION)]
#[command(about = "Record and analyze behavior event timelines", long_about = None)]
struct Cli {
    /// More log output (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate annotation files
    Analyze {
        /// Annotation files to analyze
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Metrics configuration (JSON); built-in defaults otherwise
        #[arg(long)]
        metrics: Option<PathBuf>,

        /// Interval width in seconds for the interval breakdown
        #[arg(long)]
        interval: Option<f64>,

        /// Comma-separated labels to report instead of defaults plus discovered
        #[arg(long, value_delimiter = ',')]
        labels: Option<Vec<String>>,

        /// Test duration for files without one
        #[arg(long, default_value = "300")]
        default_test_duration: f64,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "csv")]
        format: ReportFormat,
    },

    /// Replay a newline-delimited JSON host-signal script
    Replay {
        /// Script path (use - for stdin)
        script: PathBuf,

        /// Action map (JSON object of key to label); built-in defaults otherwise
        #[arg(long)]
        map: Option<PathBuf>,

        /// Keep events on rewind, only finalizing open ones
        #[arg(long)]
        preserve_on_rewind: bool,

        /// Backward jump tolerated as jitter, in milliseconds
        #[arg(long, default_value = "100")]
        epsilon_ms: u64,

        /// Annotation file to write (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Print replay statistics as JSON on stderr
        #[arg(long)]
        stats: bool,
    },

    /// Check annotation files
    Validate {
        /// Annotation files to check
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print or check a metrics configuration
    Metrics {
        /// Configuration to validate; defaults are printed otherwise
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the (validated or default) configuration to this path
        #[arg(long)]
        write: Option<PathBuf>,
    },
}

#[derive(Clone, ValueEnum)]
enum ReportFormat {
    /// Aggregate summary CSV
    Csv,
    /// Full analysis report as pretty-printed JSON
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn run(cli: Cli) -> Result<(), RabetCliError> {
    match cli.command {
        Commands::Analyze {
            files,
            metrics,
            interval,
            labels,
            default_test_duration,
            output,
            format,
        } => cmd_analyze(
            &files,
            metrics.as_deref(),
            interval,
            labels,
            default_test_duration,
            &output,
            format,
        ),

        Commands::Replay {
            script,
            map,
            preserve_on_rewind,
            epsilon_ms,
            output,
            stats,
        } => cmd_replay(&script, map.as_deref(), preserve_on_rewind, epsilon_ms, &output, stats),

        Commands::Validate { files, json } => cmd_validate(&files, json),

        Commands::Metrics { config, write } => cmd_metrics(config.as_deref(), write.as_deref()),
    }
}

fn cmd_analyze(
    files: &[PathBuf],
    metrics: Option<&Path>,
    interval: Option<f64>,
    labels: Option<Vec<String>>,
    default_test_duration: f64,
    output: &Path,
    format: ReportFormat,
) -> Result<(), RabetCliError> {
    let config = match metrics {
        Some(path) => MetricsConfig::load_from_file(path)?,
        None => MetricsConfig::default(),
    };

    let mut analyzer = Analyzer::new(config).with_default_test_duration(default_test_duration);
    if let Some(width) = interval {
        analyzer = analyzer.with_interval(width)?;
    }
    if let Some(labels) = labels {
        let labels: Vec<String> = labels
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        analyzer = analyzer.with_tracked_labels(labels);
    }

    let report = analyze_files(files, &analyzer)?;
    if report.results.is_empty() {
        return Err(RabetCliError::NoInputs(report.skipped_sources.len()));
    }

    let mut out = open_output(output)?;
    match format {
        ReportFormat::Csv => write_summary(&mut out, &report)?,
        ReportFormat::Json => {
            serde_json::to_writer_pretty(&mut out, &report)?;
            writeln!(out)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn cmd_replay(
    script: &Path,
    map: Option<&Path>,
    preserve_on_rewind: bool,
    epsilon_ms: u64,
    output: &Path,
    stats: bool,
) -> Result<(), RabetCliError> {
    let action_map = match map {
        Some(path) => ActionMap::load_from_file(path)?,
        None => ActionMap::default(),
    };
    let config = SessionConfig {
        rewind_epsilon_ms: epsilon_ms,
        preserve_on_rewind,
        ..SessionConfig::default()
    };

    // default behaviors first, then anything else the map binds
    let mut summary_labels = default_behaviors();
    for label in action_map.labels() {
        if !summary_labels.contains(&label) {
            summary_labels.push(label);
        }
    }
    let outcome = if script.to_string_lossy() == "-" {
        replay(io::stdin().lock(), config, action_map)?
    } else {
        replay(BufReader::new(fs::File::open(script)?), config, action_map)?
    };

    let mut out = open_output(output)?;
    write_annotations(
        &mut out,
        &outcome.timeline.snapshot(),
        outcome.timeline.test_duration_secs(),
        &summary_labels,
    )?;

    if stats {
        eprintln!("{}", serde_json::to_string_pretty(&outcome.stats)?);
    }
    Ok(())
}

fn cmd_validate(files: &[PathBuf], json: bool) -> Result<(), RabetCliError> {
    let reports: Vec<FileReport> = files.iter().map(|path| validate_file(path)).collect();
    let invalid = reports.iter().filter(|r| !r.is_valid()).count();

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        println!("Validation Report");
        println!("=================");
        for report in &reports {
            match &report.error {
                Some(error) => println!("  - {}: {}", report.file, error),
                None => println!(
                    "  - {}: {} events, {} summary rows, {} skipped, test duration {}",
                    report.file,
                    report.events,
                    report.summary_rows,
                    report.skipped_rows,
                    report
                        .test_duration_secs
                        .map_or("unknown".to_string(), |secs| format!("{}s", secs))
                ),
            }
        }
        println!("Valid files:   {}", reports.len() - invalid);
        println!("Invalid files: {}", invalid);
    }

    if invalid > 0 {
        Err(RabetCliError::ValidationFailed(invalid))
    } else {
        Ok(())
    }
}

fn validate_file(path: &Path) -> FileReport {
    let file = path.display().to_string();
    match read_annotation_file(path) {
        Ok(parsed) => FileReport {
            file,
            events: parsed.events.as_ref().map_or(0, Vec::len),
            summary_rows: parsed.summary.as_ref().map_or(0, |s| s.len()),
            skipped_rows: parsed.skipped_rows,
            test_duration_secs: parsed.test_duration_secs,
            error: None,
        },
        Err(e) => FileReport {
            file,
            events: 0,
            summary_rows: 0,
            skipped_rows: 0,
            test_duration_secs: None,
            error: Some(e.to_string()),
        },
    }
}

fn cmd_metrics(config: Option<&Path>, write: Option<&Path>) -> Result<(), RabetCliError> {
    let metrics = match config {
        Some(path) => MetricsConfig::load_from_file(path)?,
        None => MetricsConfig::default(),
    };
    match write {
        Some(path) => metrics.save_to_file(path)?,
        None => println!("{}", metrics.to_json()?),
    }
    Ok(())
}

fn open_output(output: &Path) -> Result<Box<dyn Write>, RabetCliError> {
    if output.to_string_lossy() == "-" {
        Ok(Box::new(io::stdout().lock()))
    } else {
        Ok(Box::new(io::BufWriter::new(fs::File::create(output)?)))
    }
}

// Error types

#[derive(Debug)]
enum RabetCliError {
    Io(io::Error),
    Timeline(TimelineError),
    Json(serde_json::Error),
    NoInputs(usize),
    ValidationFailed(usize),
}

impl From<io::Error> for RabetCliError {
    fn from(e: io::Error) -> Self {
        RabetCliError::Io(e)
    }
}

impl From<TimelineError> for RabetCliError {
    fn from(e: TimelineError) -> Self {
        RabetCliError::Timeline(e)
    }
}

impl From<serde_json::Error> for RabetCliError {
    fn from(e: serde_json::Error) -> Self {
        RabetCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<RabetCliError> for CliError {
    fn from(e: RabetCliError) -> Self {
        match e {
            RabetCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            RabetCliError::Timeline(e) => {
                let hint = match &e {
                    TimelineError::InvalidConfig(_)
                    | TimelineError::DuplicateMetric(_)
                    | TimelineError::LastMetric(_) => "Run 'rabet metrics' to see a valid configuration",
                    TimelineError::InvalidInterval(_) => "Intervals must be at least 1 second",
                    TimelineError::InvalidMapping(_) => "Map single-character keys to non-blank labels",
                    TimelineError::ParseError(_) | TimelineError::JsonError(_) => {
                        "Check the script holds one JSON record per line"
                    }
                    _ => "Run 'rabet validate' on the input files",
                };
                CliError {
                    code: "TIMELINE_ERROR".to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            RabetCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            RabetCliError::NoInputs(skipped) => CliError {
                code: "NO_INPUTS".to_string(),
                message: format!("No readable annotation files ({} skipped)", skipped),
                hint: Some("Files need an event list or a summary section".to_string()),
            },
            RabetCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} files failed validation", count),
                hint: Some("Fix the reported rows and retry".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct FileReport {
    file: String,
    events: usize,
    summary_rows: usize,
    skipped_rows: usize,
    test_duration_secs: Option<f64>,
    error: Option<String>,
}

impl FileReport {
    fn is_valid(&self) -> bool {
        self.error.is_none() && self.skipped_rows == 0
    }
}
