//! Diagnostic session and health-evaluation pipeline
//!
//! connect → authenticate → run command batch → parse probe outputs → report.
//! Everything here talks to the device through [`Connector`] / [`RemoteShell`],
//! so the pipeline is exercised in tests against a scripted device.

pub mod health;
pub mod report;
mod runner;
mod session;
mod transport;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

pub use health::{HealthEvaluator, HealthReport, HealthStatus, HealthThresholds};
pub use report::{ReportError, ReportFormat};
pub use runner::{DiagnosticBundle, DiagnosticError, DiagnosticRunner};
pub use session::{CommandOutput, DeviceSession};
pub use transport::{ConnectError, Connector, RemoteShell};
