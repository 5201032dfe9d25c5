use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ocr_table_rebuild::{
    ExtractionReport, OutputFormat, PageFrame, PageSelection, QualityMode, ReconstructOptions,
    Skew, SyntheticTable, TableProfile, extract_ocr_file, write_blocks_json,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "ocr2table",
    version,
    about = "Rebuild labeled tables from OCR bounding boxes"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Rebuild tables from OCR JSON and write CSV or JSON output.
    Extract(ExtractArgs),
    /// Write a synthetic, optionally skewed, freight invoice as OCR JSON.
    Synth(SynthArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Csv,
    Json,
}

#[derive(Debug, Args)]
struct ExtractArgs {
    /// Input OCR JSON path.
    #[arg(short, long)]
    input: PathBuf,

    /// Output path.
    #[arg(short, long)]
    output: PathBuf,

    /// Output format.
    #[arg(long, value_enum, default_value_t = Format::Csv)]
    format: Format,

    /// Table profile JSON with header and termination vocabulary.
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Page selection like 1-3,5.
    #[arg(long)]
    pages: Option<String>,

    /// Page rectangle as left,top,right,bottom; derived from the boxes when absent.
    #[arg(long, allow_hyphen_values = true)]
    page_frame: Option<String>,

    /// Output delimiter character for CSV.
    #[arg(long, default_value = ",")]
    delimiter: char,

    /// Fail when a table is too ambiguous.
    #[arg(long, conflicts_with = "skip_ambiguous")]
    strict: bool,

    /// Drop tables that are too ambiguous instead of exporting them.
    #[arg(long, conflicts_with = "strict")]
    skip_ambiguous: bool,

    /// Enable verbose warning output.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Args)]
struct SynthArgs {
    /// Output OCR JSON path.
    #[arg(short, long)]
    output: PathBuf,

    /// Skew in degrees.
    #[arg(long, default_value_t = 4.0, allow_negative_numbers = true)]
    skew: f64,

    /// Draw an independent skew per quadrant, bounded by --skew.
    #[arg(long)]
    per_quadrant: bool,

    /// Seed for the per-quadrant skew.
    #[arg(long, default_value_t = 7)]
    seed: u64,
}

fn parse_options(args: &ExtractArgs) -> Result<(ReconstructOptions, OutputFormat)> {
    let pages = args
        .pages
        .as_deref()
        .map(PageSelection::parse)
        .transpose()
        .context("failed to parse --pages")?;

    let page_frame = args
        .page_frame
        .as_deref()
        .map(str::parse::<PageFrame>)
        .transpose()
        .map_err(|reason| anyhow!("failed to parse --page-frame: {reason}"))?;

    let profile = match &args.profile {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read profile '{}'", path.display()))?;
            TableProfile::from_json_str(&json)
                .with_context(|| format!("failed to load profile '{}'", path.display()))?
        }
        None => TableProfile::default(),
    };

    let quality_mode = if args.strict {
        QualityMode::Strict
    } else if args.skip_ambiguous {
        QualityMode::SkipAmbiguous
    } else {
        QualityMode::BestEffort
    };

    if !args.delimiter.is_ascii() {
        anyhow::bail!("delimiter must be a single ASCII character");
    }
    let format = match args.format {
        Format::Csv => OutputFormat::Csv {
            delimiter: u8::try_from(args.delimiter)
                .map_err(|_| anyhow!("delimiter must be a single ASCII character"))?,
        },
        Format::Json => OutputFormat::Json,
    };

    Ok((
        ReconstructOptions {
            profile,
            pages,
            page_frame,
            quality_mode,
            ..ReconstructOptions::default()
        },
        format,
    ))
}

fn log_report(report: &ExtractionReport, verbose: bool) {
    if report.warnings.is_empty() {
        return;
    }

    eprintln!("warning: {} issue(s) detected", report.warnings.len());
    if verbose {
        for warning in &report.warnings {
            eprintln!(
                "  - {:?} page={:?} row={:?} confidence={:?}: {}",
                warning.code, warning.page, warning.row, warning.confidence, warning.message
            );
        }
    }
}

fn run_extract(args: &ExtractArgs) -> Result<ExtractionReport> {
    let (options, format) = parse_options(args)?;
    extract_ocr_file(&args.input, &args.output, &options, format)
        .with_context(|| format!("failed to rebuild tables from '{}'", args.input.display()))
}

fn run_synth(args: &SynthArgs) -> Result<usize> {
    let skew = if args.per_quadrant {
        Skew::PerQuadrant {
            max_deg: args.skew,
            seed: args.seed,
        }
    } else {
        Skew::Uniform(args.skew)
    };
    let boxes = SyntheticTable::freight_sample()
        .boxes(skew)
        .context("failed to lay out the synthetic table")?;
    write_blocks_json(&args.output, &boxes)
        .with_context(|| format!("failed to write '{}'", args.output.display()))?;
    Ok(boxes.len())
}

fn main() -> ExitCode {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ocr_table_rebuild=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Extract(args) => match run_extract(&args) {
            Ok(report) => {
                log_report(&report, args.verbose);
                if report.row_count > 0 {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::from(2)
                }
            }
            Err(error) => {
                eprintln!("error: {error:#}");
                ExitCode::from(1)
            }
        },
        Commands::Synth(args) => match run_synth(&args) {
            Ok(count) => {
                eprintln!("wrote {count} boxes to '{}'", args.output.display());
                ExitCode::SUCCESS
            }
            Err(error) => {
                eprintln!("error: {error:#}");
                ExitCode::from(1)
            }
        },
    }
}
