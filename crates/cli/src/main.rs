//! CLI tool for turning a Markdown document into a slide deck.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use deck_core::{
    AssignmentRequest, DecisionService, IntermediateStore, Pipeline, RetryPolicy, RewriteContext,
    RewriteService, RunFailure, RunReport, RunTimestamp, SelectionRequest, ServiceError,
    ServiceResult, TemplateCatalog,
};
use deck_llm::{LlmServices, ServiceConfig};
use deck_pptx::PptxRenderer;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

/// Pause between attempts of a failed service call.
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Generate a PowerPoint deck from Markdown using slide templates.
#[derive(Parser, Debug)]
#[command(name = "md2deck")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input Markdown file; slides are separated by lines containing only `---`
    #[arg(required_unless_present = "replay")]
    input: Option<PathBuf>,

    /// Output file (default: output/generated_slides_<timestamp>.pptx)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Verbose logging
    #[arg(long)]
    debug: bool,

    /// Directory holding one subdirectory per template
    #[arg(long, default_value = "templates")]
    templates: PathBuf,

    /// Directory for per-stage intermediate files
    #[arg(long, default_value = "intermediate")]
    intermediate: PathBuf,

    /// Attempts per service call before the run fails
    #[arg(long, default_value = "3", value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: u32,

    /// Worker threads for per-slide service calls
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Render the content assignment file of an earlier run instead of processing input
    #[arg(long, value_name = "TIMESTAMP", conflicts_with = "input")]
    replay: Option<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    if let Ok(path) = dotenvy::dotenv() {
        log::debug!("Loaded environment from {}", path.display());
    }

    match run(&args) {
        Ok(report) => {
            print_report(&report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            match e.downcast_ref::<RunFailure>() {
                Some(failure) => print_failure(failure),
                None => eprintln!("Error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<RunReport> {
    let retry = RetryPolicy::new()
        .with_max_attempts(args.max_attempts)
        .with_backoff(RETRY_BACKOFF);
    let store = IntermediateStore::new(&args.intermediate);
    let renderer = PptxRenderer::new();

    if let Some(value) = &args.replay {
        let timestamp = RunTimestamp::parse(value)
            .ok_or_else(|| anyhow!("Invalid timestamp '{}', expected YYYYMMDDHHMMSS", value))?;
        let catalog = load_catalog(args)?;

        let pipeline = Pipeline::new(&catalog, &Offline, &Offline, &renderer, store);
        return Ok(pipeline.replay(&timestamp, args.output.as_deref())?);
    }

    let input = args.input.as_ref().context("No input file given")?;
    let config = ServiceConfig::from_env()?;
    let catalog = load_catalog(args)?;
    let markdown = fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let services = LlmServices::from_config(&config)?;
    let mut pipeline =
        Pipeline::new(&catalog, &services, &services, &renderer, store).with_retry(retry);
    if let Some(jobs) = args.jobs {
        pipeline = pipeline.with_threads(jobs)?;
    }

    Ok(pipeline.run(&markdown, args.output.as_deref())?)
}

fn load_catalog(args: &Args) -> Result<TemplateCatalog> {
    let catalog = TemplateCatalog::load(&args.templates).with_context(|| {
        format!("Failed to load templates from {}", args.templates.display())
    })?;
    log::debug!("Templates: {}", catalog.ids().join(", "));
    Ok(catalog)
}

fn print_report(report: &RunReport) {
    println!(
        "Generated {} slides: {}",
        report.assignments.len(),
        report.output.display()
    );
    for assignment in &report.assignments {
        println!(
            "  slide {}: {}",
            assignment.block_index + 1,
            assignment.template_id
        );
    }

    if !report.snapshots.is_empty() {
        println!("Intermediate files:");
        for path in &report.snapshots {
            println!("  {}", path.display());
        }
    }
}

fn print_failure(failure: &RunFailure) {
    eprintln!("Error: {}", failure);
    if let Some(block) = failure.error.block_index() {
        eprintln!("  block: {}", block);
    }

    if !failure.snapshots.is_empty() {
        eprintln!("Intermediate files kept:");
        for path in &failure.snapshots {
            eprintln!("  {}", path.display());
        }
    }
}

/// Service stand-in for replays, which never call it.
struct Offline;

impl Offline {
    fn unavailable() -> ServiceError {
        ServiceError::Transport("no service is configured for replay".to_string())
    }
}

impl RewriteService for Offline {
    fn rewrite(&self, _text: &str, _context: &RewriteContext) -> ServiceResult<String> {
        Err(Self::unavailable())
    }
}

impl DecisionService for Offline {
    fn choose_template(&self, _request: &SelectionRequest<'_>) -> ServiceResult<String> {
        Err(Self::unavailable())
    }

    fn assign_content(
        &self,
        _request: &AssignmentRequest<'_>,
    ) -> ServiceResult<BTreeMap<String, String>> {
        Err(Self::unavailable())
    }
}
