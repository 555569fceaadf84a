//! End-to-end device flows
//!
//! Every flow runs inside [`DeviceSession::scoped`], so the session is
//! released on success and on every error path. Multi-device flows are
//! sequential: one device is finished and disconnected before the next one
//! is contacted.

use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use super::health::{HealthEvaluator, HealthReport};
use super::report::{report_path, write_report, ReportError, ReportFormat};
use super::runner::{DiagnosticBundle, DiagnosticError, DiagnosticRunner};
use super::session::DeviceSession;
use super::transport::Connector;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Diagnostic(#[from] DiagnosticError),

    #[error("Failed to write report: {0}")]
    Report(#[from] ReportError),
}

impl WorkflowError {
    /// The device could not be reached at all
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, WorkflowError::Diagnostic(DiagnosticError::ConnectFailed(_)))
    }
}

/// What a single-device run does after connecting
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Commands to run; `None` means the configured defaults
    pub commands: Option<Vec<String>>,
    pub format: ReportFormat,
    /// Explicit report path, overrides the generated file name
    pub output: Option<PathBuf>,
    /// Directory for generated file names
    pub output_dir: Option<PathBuf>,
    /// Also write a JSON copy when the main format is text
    pub also_json: bool,
    /// Run the health probes after the diagnostics
    pub check_health: bool,
}

/// Result of one completed device run
#[derive(Debug, Clone)]
pub struct DeviceOutcome {
    pub bundle: DiagnosticBundle,
    pub reports: Vec<PathBuf>,
    pub health: Option<HealthReport>,
}

/// Per-device result of a batch
#[derive(Debug)]
pub enum BatchOutcome {
    Completed(DeviceOutcome),
    /// Connect failed, nothing was run
    Skipped { device: String },
    Failed { device: String, error: WorkflowError },
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub outcomes: Vec<BatchOutcome>,
}

impl BatchSummary {
    pub fn completed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, BatchOutcome::Completed(_)))
            .count()
    }

    /// True when every device completed
    pub fn all_completed(&self) -> bool {
        self.completed() == self.outcomes.len()
    }
}

/// Diagnostics, reports and (optionally) health for one device, then disconnect
pub async fn run_device<C: Connector>(
    session: &mut DeviceSession<C>,
    runner: &DiagnosticRunner,
    evaluator: &HealthEvaluator,
    options: &RunOptions,
) -> Result<DeviceOutcome, WorkflowError> {
    let runner = runner.clone();
    let evaluator = evaluator.clone();
    let options = options.clone();

    session
        .scoped(move |s| {
            Box::pin(async move {
                let bundle = runner
                    .run_diagnostics(s, options.commands.as_deref())
                    .await?;

                let mut reports = Vec::new();
                let path = report_path(
                    &bundle,
                    options.format,
                    options.output.as_deref(),
                    options.output_dir.as_deref(),
                );
                reports.push(write_report(&bundle, options.format, &path).await?);

                if options.also_json && options.format != ReportFormat::Json {
                    let json_path =
                        report_path(&bundle, ReportFormat::Json, None, options.output_dir.as_deref());
                    reports.push(write_report(&bundle, ReportFormat::Json, &json_path).await?);
                }

                let health = if options.check_health {
                    Some(evaluator.check_health(s).await?)
                } else {
                    None
                };

                Ok::<_, WorkflowError>(DeviceOutcome {
                    bundle,
                    reports,
                    health,
                })
            })
        })
        .await
}

/// Health probes only, then disconnect
pub async fn check_device<C: Connector>(
    session: &mut DeviceSession<C>,
    evaluator: &HealthEvaluator,
) -> Result<HealthReport, DiagnosticError> {
    let evaluator = evaluator.clone();
    session
        .scoped(move |s| Box::pin(async move { evaluator.check_health(s).await }))
        .await
}

/// Run every session in turn; devices that cannot be reached are skipped
pub async fn run_batch<C: Connector>(
    sessions: Vec<DeviceSession<C>>,
    runner: &DiagnosticRunner,
    evaluator: &HealthEvaluator,
    options: &RunOptions,
) -> BatchSummary {
    let mut summary = BatchSummary::default();

    for mut session in sessions {
        let device = session.address().to_string();
        info!("Checking device: {}", device);

        let outcome = match run_device(&mut session, runner, evaluator, options).await {
            Ok(outcome) => BatchOutcome::Completed(outcome),
            Err(e) if e.is_connect_failure() => {
                warn!("Skipping {} - connection failed", device);
                BatchOutcome::Skipped { device }
            }
            Err(error) => {
                warn!("{}: {}", device, error);
                BatchOutcome::Failed { device, error }
            }
        };
        summary.outcomes.push(outcome);
    }

    info!(
        "Batch finished: {}/{} devices completed",
        summary.completed(),
        summary.outcomes.len()
    );
    summary
}

/// Health probes on every session in turn. `None` marks a skipped device.
pub async fn check_batch<C: Connector>(
    sessions: Vec<DeviceSession<C>>,
    evaluator: &HealthEvaluator,
) -> Vec<(String, Option<HealthReport>)> {
    let mut results = Vec::with_capacity(sessions.len());

    for mut session in sessions {
        let device = session.address().to_string();
        info!("Checking device: {}", device);

        match check_device(&mut session, evaluator).await {
            Ok(report) => results.push((device, Some(report))),
            Err(_) => {
                warn!("Skipping {} - connection failed", device);
                results.push((device, None));
            }
        }
    }
    results
}
