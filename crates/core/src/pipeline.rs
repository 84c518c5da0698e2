//! Pipeline orchestration.
//!
//! A run moves strictly forward through
//! `Segmenting -> Formatting -> Selecting -> Assigning -> Rendering -> Done`.
//! Any error moves it to `Failed` and stops it; snapshots already written
//! stay on disk.

use crate::assign::{validate_plan, ContentAssigner};
use crate::catalog::TemplateCatalog;
use crate::format::ContentFormatter;
use crate::render::{RenderPlan, Renderer};
use crate::select::TemplateSelector;
use crate::service::{DecisionService, RetryPolicy, RewriteService};
use crate::store::IntermediateStore;
use crate::{
    segment, AssignmentResult, Error, FormattedBlock, Result, RunTimestamp, SelectionResult,
    SlideBlock, Stage,
};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Default directory for rendered decks.
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// States of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Segmenting,
    Formatting,
    Selecting,
    Assigning,
    Rendering,
    Done,
    Failed,
}

impl PipelineState {
    /// The state entered when this one succeeds.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Segmenting => Some(Self::Formatting),
            Self::Formatting => Some(Self::Selecting),
            Self::Selecting => Some(Self::Assigning),
            Self::Assigning => Some(Self::Rendering),
            Self::Rendering => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Segmenting => "segmenting",
            Self::Formatting => "formatting",
            Self::Selecting => "selecting",
            Self::Assigning => "assigning",
            Self::Rendering => "rendering",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// State of one invocation. Discarded when the run ends; only snapshots persist.
#[derive(Debug)]
struct PipelineRun {
    timestamp: RunTimestamp,
    state: PipelineState,
    blocks: Vec<SlideBlock>,
    formatted: Vec<FormattedBlock>,
    selections: Vec<SelectionResult>,
    assignments: Vec<AssignmentResult>,
    snapshots: Vec<PathBuf>,
}

impl PipelineRun {
    fn new(timestamp: RunTimestamp) -> Self {
        Self {
            timestamp,
            state: PipelineState::Segmenting,
            blocks: Vec::new(),
            formatted: Vec::new(),
            selections: Vec::new(),
            assignments: Vec::new(),
            snapshots: Vec::new(),
        }
    }

    fn advance(&mut self) {
        if let Some(next) = self.state.next() {
            log::info!("Pipeline {} -> {}", self.state, next);
            self.state = next;
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub timestamp: RunTimestamp,
    pub output: PathBuf,
    pub selections: Vec<SelectionResult>,
    pub assignments: Vec<AssignmentResult>,
    pub snapshots: Vec<PathBuf>,
}

/// A run that ended in `Failed`.
#[derive(Debug)]
pub struct RunFailure {
    pub timestamp: RunTimestamp,

    /// State the run was in when the error occurred.
    pub stage: PipelineState,
    pub error: Error,

    /// Snapshots written before the failure.
    pub snapshots: Vec<PathBuf>,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} during {}: {}", self.error.kind(), self.stage, self.error)
    }
}

impl std::error::Error for RunFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Sequences the stages and persists their outputs.
pub struct Pipeline<'a> {
    catalog: &'a TemplateCatalog,
    rewriter: &'a dyn RewriteService,
    decider: &'a dyn DecisionService,
    renderer: &'a dyn Renderer,
    store: IntermediateStore,
    retry: RetryPolicy,
    output_dir: PathBuf,
    pool: Option<rayon::ThreadPool>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        catalog: &'a TemplateCatalog,
        rewriter: &'a dyn RewriteService,
        decider: &'a dyn DecisionService,
        renderer: &'a dyn Renderer,
        store: IntermediateStore,
    ) -> Self {
        Self {
            catalog,
            rewriter,
            decider,
            renderer,
            store,
            retry: RetryPolicy::default(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            pool: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Directory used when no output path is given.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Dispatch per-block calls on a dedicated pool of `threads` workers.
    pub fn with_threads(mut self, threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| Error::Config(format!("failed to build worker pool: {}", e)))?;
        self.pool = Some(pool);
        Ok(self)
    }

    /// `<output_dir>/generated_slides_<timestamp>.<ext>`
    pub fn default_output_path(&self, timestamp: &RunTimestamp) -> PathBuf {
        self.output_dir.join(format!(
            "generated_slides_{}.{}",
            timestamp,
            self.renderer.extension()
        ))
    }

    /// Run the full pipeline with a fresh timestamp.
    pub fn run(
        &self,
        markdown: &str,
        output: Option<&Path>,
    ) -> std::result::Result<RunReport, RunFailure> {
        self.run_at(markdown, RunTimestamp::now(), output)
    }

    /// Run the full pipeline keyed by `timestamp`.
    pub fn run_at(
        &self,
        markdown: &str,
        timestamp: RunTimestamp,
        output: Option<&Path>,
    ) -> std::result::Result<RunReport, RunFailure> {
        let output = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.default_output_path(&timestamp));

        let mut run = PipelineRun::new(timestamp);
        log::info!("Starting run {}", run.timestamp);

        match self.execute(&mut run, markdown, &output) {
            Ok(()) => Ok(RunReport {
                timestamp: run.timestamp,
                output,
                selections: run.selections,
                assignments: run.assignments,
                snapshots: run.snapshots,
            }),
            Err(error) => Err(self.fail(run, error)),
        }
    }

    /// Render the content assignment snapshot of an earlier run without calling any service.
    pub fn replay(
        &self,
        source: &RunTimestamp,
        output: Option<&Path>,
    ) -> std::result::Result<RunReport, RunFailure> {
        let output = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.default_output_path(source));

        let mut run = PipelineRun::new(source.clone());
        run.state = PipelineState::Rendering;
        log::info!("Replaying run {}", source);

        let result = self
            .store
            .read::<AssignmentResult>(Stage::ContentAssignment, source)
            .and_then(|assignments| {
                validate_plan(&assignments, self.catalog)?;
                run.assignments = assignments;
                self.render(&run.assignments, &output)
            });

        match result {
            Ok(()) => {
                run.advance();
                Ok(RunReport {
                    timestamp: run.timestamp,
                    output,
                    selections: Vec::new(),
                    assignments: run.assignments,
                    snapshots: Vec::new(),
                })
            }
            Err(error) => Err(self.fail(run, error)),
        }
    }

    fn execute(&self, run: &mut PipelineRun, markdown: &str, output: &Path) -> Result<()> {
        run.blocks = segment(markdown)?;
        self.snapshot(run, Stage::Parsed, |r| &r.blocks)?;
        run.advance();

        let formatter = ContentFormatter::new(self.rewriter, self.retry);
        let blocks = &run.blocks;
        run.formatted = self.dispatch(|| formatter.format_all(blocks))?;
        self.snapshot(run, Stage::Formatted, |r| &r.formatted)?;
        run.advance();

        let selector = TemplateSelector::new(self.decider, self.retry);
        let formatted = &run.formatted;
        run.selections = self.dispatch(|| selector.select_all(formatted, self.catalog))?;
        self.snapshot(run, Stage::TemplateSelection, |r| &r.selections)?;
        run.advance();

        let assigner = ContentAssigner::new(self.decider, self.retry);
        let (formatted, selections) = (&run.formatted, &run.selections);
        run.assignments =
            self.dispatch(|| assigner.assign_all(formatted, selections, self.catalog))?;
        self.snapshot(run, Stage::ContentAssignment, |r| &r.assignments)?;
        run.advance();

        self.render(&run.assignments, output)?;
        run.advance();
        Ok(())
    }

    fn render(&self, assignments: &[AssignmentResult], output: &Path) -> Result<()> {
        let plan = RenderPlan::resolve(assignments, self.catalog)?;
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        log::info!("Rendering {} slides to {}", plan.len(), output.display());
        self.renderer.render(&plan, output)
    }

    /// Persist the complete output of a stage and record where it went.
    fn snapshot<T: Serialize>(
        &self,
        run: &mut PipelineRun,
        stage: Stage,
        records: impl FnOnce(&PipelineRun) -> &Vec<T>,
    ) -> Result<()> {
        let path = self.store.write(stage, &run.timestamp, records(run))?;
        run.snapshots.push(path);
        Ok(())
    }

    fn dispatch<T: Send>(&self, op: impl FnOnce() -> T + Send) -> T {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    fn fail(&self, run: PipelineRun, error: Error) -> RunFailure {
        let stage = run.state;
        log::info!("Pipeline {} -> {}", stage, PipelineState::Failed);
        log::error!("Run {} failed during {}: {}", run.timestamp, stage, error);
        RunFailure {
            timestamp: run.timestamp,
            stage,
            error,
            snapshots: run.snapshots,
        }
    }
}
