//! Device Health Check Module
//!
//! Runs three targeted probes (CPU, memory, interfaces) and scrapes their
//! output into a `healthy` / `warning` verdict with human-readable issues.
//! Probes are best-effort: output that does not parse is skipped without
//! raising an issue.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::runner::DiagnosticError;
use super::session::{CommandOutput, DeviceSession};
use super::transport::Connector;

pub const CPU_PROBE: &str = "show processes cpu | include CPU";
pub const MEMORY_PROBE: &str = "show memory statistics | include Processor";
pub const INTERFACE_PROBE: &str = "show ip interface brief | include down";

/// Issue recorded when no probe found anything
pub const NO_ISSUES: &str = "No issues detected";

const FIVE_MINUTE_MARKER: &str = "five minutes:";
const ERROR_MARKER: &str = "Error";

/// Device health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    #[default]
    Healthy,
    Warning,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => f.write_str("healthy"),
            HealthStatus::Warning => f.write_str("warning"),
        }
    }
}

/// Health check thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    /// Five-minute CPU average above this is a warning (percent)
    pub max_cpu_percent: u32,
    /// Free processor memory below this is a warning (bytes)
    pub min_free_memory_bytes: u64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            max_cpu_percent: 80,
            min_free_memory_bytes: 10_000_000, // 10 MB
        }
    }
}

/// Health verdict for one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub device: String,
    pub hostname: String,
    pub status: HealthStatus,
    pub issues: Vec<String>,
}

impl HealthReport {
    fn new(device: &str, hostname: &str) -> Self {
        Self {
            device: device.to_string(),
            hostname: hostname.to_string(),
            status: HealthStatus::Healthy,
            issues: Vec::new(),
        }
    }

    fn warn(&mut self, issue: String) {
        self.issues.push(issue);
        self.status = HealthStatus::Warning;
    }
}

/// Output a probe must not parse: a transport-level failure, or device text
/// carrying the error marker
fn is_error_output(output: &CommandOutput) -> bool {
    match output {
        CommandOutput::Completed(text) => text.contains(ERROR_MARKER),
        _ => true,
    }
}

/// `... five minutes: 85%` → 85
fn five_minute_cpu(line: &str) -> Option<u32> {
    let (_, rest) = line.split_once(FIVE_MINUTE_MARKER)?;
    let (value, _) = rest.split_once('%')?;
    value.trim().parse().ok()
}

/// Last whitespace-separated token of a `... Free: N` line
fn free_memory(text: &str) -> Option<u64> {
    if !text.contains("Free") {
        return None;
    }
    text.split_whitespace().last()?.parse().ok()
}

/// Number of lines in a filtered `show ip interface brief`, `None` when empty
fn down_interfaces(text: &str) -> Option<usize> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.split('\n').count())
}

#[derive(Debug, Clone, Default)]
pub struct HealthEvaluator {
    thresholds: HealthThresholds,
}

impl HealthEvaluator {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self { thresholds }
    }

    /// Run the probes on the device, connecting first if needed
    pub async fn check_health<C: Connector>(
        &self,
        session: &mut DeviceSession<C>,
    ) -> Result<HealthReport, DiagnosticError> {
        let hostname = session
            .connect()
            .await
            .map_err(DiagnosticError::ConnectFailed)?;

        let cpu = session.run_command(CPU_PROBE).await;
        let memory = session.run_command(MEMORY_PROBE).await;
        let interfaces = session.run_command(INTERFACE_PROBE).await;

        Ok(self.evaluate(session.address(), &hostname, &cpu, &memory, &interfaces))
    }

    /// Derive the verdict from already collected probe outputs
    pub fn evaluate(
        &self,
        device: &str,
        hostname: &str,
        cpu: &CommandOutput,
        memory: &CommandOutput,
        interfaces: &CommandOutput,
    ) -> HealthReport {
        let mut report = HealthReport::new(device, hostname);

        if let CommandOutput::Completed(text) = cpu {
            if !is_error_output(cpu) {
                for value in text.lines().filter_map(five_minute_cpu) {
                    if value > self.thresholds.max_cpu_percent {
                        report.warn(format!("High CPU usage: {}%", value));
                    }
                }
            }
        }

        if let CommandOutput::Completed(text) = memory {
            if !is_error_output(memory) {
                if let Some(free) = free_memory(text) {
                    if free < self.thresholds.min_free_memory_bytes {
                        report.warn("Low memory".to_string());
                    }
                }
            }
        }

        // Down interfaces are reported but do not change the status
        if let CommandOutput::Completed(text) = interfaces {
            if !is_error_output(interfaces) {
                if let Some(count) = down_interfaces(text) {
                    report.issues.push(format!("{} interfaces down", count));
                }
            }
        }

        if report.issues.is_empty() {
            report.issues.push(NO_ISSUES.to_string());
        }

        debug!(
            "Health[{}]: {} ({} issues)",
            report.hostname,
            report.status,
            report.issues.len()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::testing::ScriptedConnector;
    use crate::diag::ConnectError;

    const CPU_HIGH: &str =
        "  CPU utilization for five seconds: 10%/0%; one minute: 12%; five minutes: 85%";
    const CPU_LOW: &str =
        "CPU utilization for five seconds: 3%/0%; one minute: 4%; five minutes: 5%";
    const MEM_LOW: &str = "Processor Pool Total: 50000000 Used: 49000000 Free: 1000000";
    const MEM_OK: &str = "Processor Pool Total: 500000000 Used: 100000000 Free: 400000000";
    const THREE_DOWN: &str = "GigabitEthernet0/1  unassigned  YES unset  down  down\n\
                              GigabitEthernet0/2  unassigned  YES unset  down  down\n\
                              GigabitEthernet0/3  unassigned  YES unset  administratively down  down";

    fn done(text: &str) -> CommandOutput {
        CommandOutput::Completed(text.to_string())
    }

    fn evaluate(cpu: &str, memory: &str, interfaces: &str) -> HealthReport {
        HealthEvaluator::default().evaluate(
            "10.0.0.1",
            "r1",
            &done(cpu),
            &done(memory),
            &done(interfaces),
        )
    }

    #[test]
    fn test_high_cpu() {
        let report = evaluate(CPU_HIGH, MEM_OK, "");
        assert_eq!(report.issues, vec!["High CPU usage: 85%"]);
        assert_eq!(report.status, HealthStatus::Warning);
    }

    #[test]
    fn test_cpu_at_threshold_is_fine() {
        let report = evaluate("five minutes: 80%", MEM_OK, "");
        assert_eq!(report.issues, vec![NO_ISSUES]);
        assert_eq!(report.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_low_memory() {
        let report = evaluate(CPU_LOW, MEM_LOW, "");
        assert_eq!(report.issues, vec!["Low memory"]);
        assert_eq!(report.status, HealthStatus::Warning);
    }

    #[test]
    fn test_down_interfaces_do_not_change_status() {
        let report = evaluate(CPU_LOW, MEM_OK, THREE_DOWN);
        assert_eq!(report.issues, vec!["3 interfaces down"]);
        assert_eq!(report.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_no_issues() {
        let report = evaluate(CPU_LOW, MEM_OK, "   \n");
        assert_eq!(report.issues, vec!["No issues detected"]);
        assert_eq!(report.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_issue_order_follows_probes() {
        let report = evaluate(CPU_HIGH, MEM_LOW, THREE_DOWN);
        assert_eq!(
            report.issues,
            vec!["High CPU usage: 85%", "Low memory", "3 interfaces down"]
        );
        assert_eq!(report.status, HealthStatus::Warning);
    }

    #[test]
    fn test_unparsable_output_is_skipped() {
        let report = evaluate(
            "CPU utilization for five minutes: n/a%",
            "Processor Pool Free: unknown",
            "",
        );
        assert_eq!(report.issues, vec![NO_ISSUES]);

        // One bad probe does not hide the others
        let report = evaluate("five minutes: lots%", MEM_LOW, THREE_DOWN);
        assert_eq!(report.issues, vec!["Low memory", "3 interfaces down"]);
    }

    #[test]
    fn test_error_outputs_are_ignored() {
        let evaluator = HealthEvaluator::default();
        let report = evaluator.evaluate(
            "10.0.0.1",
            "r1",
            &CommandOutput::Failed("Timeout: No prompt after 60 seconds".into()),
            &CommandOutput::NotConnected,
            &done("% Error: invalid input\nline 2"),
        );
        assert_eq!(report.issues, vec![NO_ISSUES]);
        assert_eq!(report.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_custom_thresholds() {
        let evaluator = HealthEvaluator::new(HealthThresholds {
            max_cpu_percent: 50,
            min_free_memory_bytes: 1_000,
        });
        let report = evaluator.evaluate(
            "10.0.0.1",
            "r1",
            &done("five minutes: 60%"),
            &done(MEM_LOW),
            &done(""),
        );
        assert_eq!(report.issues, vec!["High CPU usage: 60%"]);
    }

    #[tokio::test]
    async fn test_check_health_runs_probes() {
        let connector = ScriptedConnector::new("core-sw#")
            .reply(CPU_PROBE, CPU_HIGH)
            .reply(MEMORY_PROBE, MEM_OK)
            .reply(INTERFACE_PROBE, THREE_DOWN);
        let log = connector.log();
        let mut session = connector.session();

        let report = HealthEvaluator::default()
            .check_health(&mut session)
            .await
            .unwrap();

        assert_eq!(report.hostname, "core-sw");
        assert_eq!(report.device, "10.0.0.1");
        assert_eq!(report.issues, vec!["High CPU usage: 85%", "3 interfaces down"]);
        assert_eq!(report.status, HealthStatus::Warning);
        assert_eq!(
            log.lock().commands,
            vec![CPU_PROBE, MEMORY_PROBE, INTERFACE_PROBE]
        );
    }

    #[tokio::test]
    async fn test_check_health_connect_failure() {
        let connector =
            ScriptedConnector::new("r1#").refuse(ConnectError::Transport("refused".into()));
        let mut session = connector.session();

        let err = HealthEvaluator::default()
            .check_health(&mut session)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to connect to device");
    }

    #[test]
    fn test_report_serializes_status_lowercase() {
        let report = evaluate(CPU_HIGH, MEM_OK, "");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "warning");
        assert_eq!(json["issues"][0], "High CPU usage: 85%");
    }
}
