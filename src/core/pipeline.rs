use serde::Serialize;
use std::fmt::Display;
use std::time::Instant;

use crate::error::{Error, Hint, Result};

/// One step of a sequential pipeline over a shared context `C`.
pub trait Stage<C> {
    fn title(&self) -> &str;

    /// Reason to omit this stage, evaluated right before it would run.
    fn skip(&self, _ctx: &C) -> Option<String> {
        None
    }

    /// Cleanup stages still run after an earlier stage failed.
    fn is_cleanup(&self) -> bool {
        false
    }

    fn run(&self, ctx: &mut C, out: &StageOutput) -> Result<()>;
}

/// Progress sink handed to a running stage.
pub struct StageOutput<'a> {
    title: &'a str,
}

impl StageOutput<'_> {
    pub fn line(&self, message: impl Display) {
        eprintln!("[pipeline]   {} > {}", self.title, message);
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStepStatus {
    Success,
    Failed,
    Skipped,
    NotRun,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineStepResult {
    pub title: String,
    pub status: PipelineStepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<Hint>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineRunStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineRunSummary {
    pub total_steps: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub not_run: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineRunResult {
    pub steps: Vec<PipelineStepResult>,
    pub status: PipelineRunStatus,
    pub summary: PipelineRunSummary,
    /// First failure, tagged with its stage title.
    #[serde(skip)]
    pub failure: Option<Error>,
}

impl PipelineRunResult {
    pub fn is_success(&self) -> bool {
        self.status == PipelineRunStatus::Success
    }

    pub fn into_result(self) -> Result<PipelineRunResult> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

/// Run `stages` in order against `ctx`.
///
/// The first failing stage stops every later non-cleanup stage. Cleanup
/// stages always run; a cleanup failure after an earlier failure is recorded
/// but does not replace it.
pub fn run<C>(stages: &[&dyn Stage<C>], ctx: &mut C) -> PipelineRunResult {
    let mut results = Vec::with_capacity(stages.len());
    let mut failure: Option<Error> = None;

    for stage in stages {
        let title = stage.title();

        if failure.is_some() && !stage.is_cleanup() {
            results.push(step_result(title, PipelineStepStatus::NotRun, 0));
            continue;
        }

        if let Some(reason) = stage.skip(ctx) {
            eprintln!("[pipeline] {} (skipped: {})", title, reason);
            let mut result = step_result(title, PipelineStepStatus::Skipped, 0);
            result.skip_reason = Some(reason);
            results.push(result);
            continue;
        }

        eprintln!("[pipeline] {}...", title);
        let started = Instant::now();
        let outcome = stage.run(ctx, &StageOutput { title });
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => {
                eprintln!("[pipeline] {} done ({} ms)", title, duration_ms);
                results.push(step_result(title, PipelineStepStatus::Success, duration_ms));
            }
            Err(err) => {
                let err = err.with_stage(title);
                eprintln!("[pipeline] {} failed: {}", title, err.message);

                let mut result = step_result(title, PipelineStepStatus::Failed, duration_ms);
                result.error = Some(err.message.clone());
                result.hints = err.hints.clone();
                results.push(result);

                if failure.is_none() {
                    failure = Some(err);
                }
            }
        }
    }

    let status = if failure.is_some() {
        PipelineRunStatus::Failed
    } else {
        PipelineRunStatus::Success
    };
    let summary = build_summary(&results);

    PipelineRunResult {
        steps: results,
        status,
        summary,
        failure,
    }
}

fn step_result(title: &str, status: PipelineStepStatus, duration_ms: u64) -> PipelineStepResult {
    PipelineStepResult {
        title: title.to_string(),
        status,
        skip_reason: None,
        error: None,
        hints: Vec::new(),
        duration_ms,
    }
}

fn build_summary(results: &[PipelineStepResult]) -> PipelineRunSummary {
    let count = |status: PipelineStepStatus| results.iter().filter(|r| r.status == status).count();
    PipelineRunSummary {
        total_steps: results.len(),
        succeeded: count(PipelineStepStatus::Success),
        failed: count(PipelineStepStatus::Failed),
        skipped: count(PipelineStepStatus::Skipped),
        not_run: count(PipelineStepStatus::NotRun),
    }
}
