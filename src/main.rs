//! netdiag CLI
//!
//! Connects to network devices over SSH, collects diagnostic output into
//! reports and runs quick health checks.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use dialoguer::{Input, Password};
use tracing::error;

use netdiag::config::{ConfigStorage, DeviceEntry, DiagConfig};
use netdiag::diag::workflow::{self, BatchOutcome, RunOptions};
use netdiag::diag::{
    DeviceSession, DiagnosticRunner, HealthEvaluator, HealthReport, ReportFormat,
};
use netdiag::ssh::{AuthMethod, KnownHostsStore, SshConfig, SshConnector};

#[derive(Parser)]
#[command(
    name = "netdiag",
    about = "Diagnostics and health checks for network devices over SSH",
    version
)]
struct Cli {
    /// Configuration file path (default: ~/.netdiag/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full run: diagnostics, text and JSON reports, health check
    Run(RunArgs),

    /// Run diagnostic commands and write a single report
    Diagnose(DiagnoseArgs),

    /// Health check only
    Health(HealthArgs),

    /// Every device listed in the config, one after another
    Batch(BatchArgs),

    /// Write a config file populated with the defaults
    InitConfig {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Args)]
struct DeviceArgs {
    /// Device IP address or hostname (prompted when omitted)
    host: Option<String>,

    /// Username (prompted when omitted)
    #[arg(short, long)]
    username: Option<String>,

    /// Password (prompted when neither this nor an identity file is given)
    #[arg(short, long, env = "NETDIAG_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Private key file for public key authentication
    #[arg(short, long)]
    identity: Option<String>,

    /// SSH port (overrides the config)
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    device: DeviceArgs,

    /// Directory for the generated reports
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Args)]
struct DiagnoseArgs {
    #[command(flatten)]
    device: DeviceArgs,

    /// Command to run (repeatable; default: the configured list)
    #[arg(short = 'C', long = "command")]
    commands: Vec<String>,

    /// Report format: text or json (default: from config)
    #[arg(short, long)]
    format: Option<ReportFormat>,

    /// Report file path (default: generated name)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct HealthArgs {
    #[command(flatten)]
    device: DeviceArgs,

    /// Print the health report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct BatchArgs {
    /// Run only the health check on each device
    #[arg(long)]
    health_only: bool,

    /// Password for devices whose entry has neither password nor key
    #[arg(short, long, env = "NETDIAG_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Directory for the generated reports
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    netdiag::init_logging(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let storage = match cli.config {
        Some(path) => ConfigStorage::with_path(path),
        None => ConfigStorage::new()?,
    };
    let known_hosts = || Arc::new(KnownHostsStore::open_default());

    match cli.command {
        Commands::InitConfig { force } => cmd_init_config(&storage, force).await,
        Commands::Run(args) => cmd_run(&load_config(&storage).await?, known_hosts(), args).await,
        Commands::Diagnose(args) => {
            cmd_diagnose(&load_config(&storage).await?, known_hosts(), args).await
        }
        Commands::Health(args) => {
            cmd_health(&load_config(&storage).await?, known_hosts(), args).await
        }
        Commands::Batch(args) => {
            cmd_batch(&load_config(&storage).await?, known_hosts(), args).await
        }
    }
}

async fn load_config(storage: &ConfigStorage) -> Result<DiagConfig> {
    storage
        .load()
        .await
        .with_context(|| format!("Failed to load config {}", storage.path().display()))
}

fn connector(config: &DiagConfig, known_hosts: Arc<KnownHostsStore>) -> SshConnector {
    SshConnector::new(known_hosts, config.session_setup_commands.clone())
}

/// Fill in whatever the command line left out by prompting
fn resolve_target(config: &DiagConfig, args: DeviceArgs) -> Result<SshConfig> {
    let host = match args.host {
        Some(host) => host,
        None => Input::<String>::new()
            .with_prompt("Device IP")
            .interact_text()?,
    };
    let username = match args.username {
        Some(username) => username,
        None => Input::<String>::new()
            .with_prompt("Username")
            .interact_text()?,
    };
    let auth = match (args.identity, args.password) {
        (Some(key_path), _) => AuthMethod::key(key_path, None),
        (None, Some(password)) => AuthMethod::password(password),
        (None, None) => AuthMethod::password(Password::new().with_prompt("Password").interact()?),
    };

    let mut target = config.ssh_target(host.trim(), username.trim(), auth);
    if let Some(port) = args.port {
        target.port = port;
    }
    Ok(target)
}

fn entry_auth(entry: &DeviceEntry, fallback: Option<&str>) -> Result<AuthMethod> {
    if let Some(key_path) = &entry.key_path {
        return Ok(AuthMethod::key(key_path.clone(), None));
    }
    if let Some(password) = entry.password.as_deref().or(fallback) {
        return Ok(AuthMethod::password(password));
    }
    let password = Password::new()
        .with_prompt(format!("Password for {}@{}", entry.username, entry.host))
        .interact()?;
    Ok(AuthMethod::password(password))
}

fn print_health(report: &HealthReport) {
    println!("Health Status: {}", report.status);
    for issue in &report.issues {
        println!("  - {}", issue);
    }
}

async fn cmd_run(
    config: &DiagConfig,
    known_hosts: Arc<KnownHostsStore>,
    args: RunArgs,
) -> Result<bool> {
    let target = resolve_target(config, args.device)?;
    let mut session = DeviceSession::new(
        connector(config, known_hosts),
        target,
        config.command_timeout(),
    );

    let options = RunOptions {
        format: config.report_format,
        output_dir: args.output_dir.or_else(|| config.output_dir.clone()),
        also_json: true,
        check_health: true,
        ..Default::default()
    };
    let outcome = workflow::run_device(
        &mut session,
        &DiagnosticRunner::new(config),
        &HealthEvaluator::new(config.health.clone()),
        &options,
    )
    .await?;

    for path in &outcome.reports {
        println!("Report saved to: {}", path.display());
    }
    if let Some(health) = &outcome.health {
        print_health(health);
    }
    Ok(true)
}

async fn cmd_diagnose(
    config: &DiagConfig,
    known_hosts: Arc<KnownHostsStore>,
    args: DiagnoseArgs,
) -> Result<bool> {
    let target = resolve_target(config, args.device)?;
    let mut session = DeviceSession::new(
        connector(config, known_hosts),
        target,
        config.command_timeout(),
    );

    let options = RunOptions {
        commands: Some(args.commands).filter(|c| !c.is_empty()),
        format: args.format.unwrap_or(config.report_format),
        output: args.output,
        output_dir: config.output_dir.clone(),
        ..Default::default()
    };
    let outcome = workflow::run_device(
        &mut session,
        &DiagnosticRunner::new(config),
        &HealthEvaluator::default(),
        &options,
    )
    .await?;

    for path in &outcome.reports {
        println!("Report saved to: {}", path.display());
    }
    Ok(true)
}

async fn cmd_health(
    config: &DiagConfig,
    known_hosts: Arc<KnownHostsStore>,
    args: HealthArgs,
) -> Result<bool> {
    let target = resolve_target(config, args.device)?;
    let mut session = DeviceSession::new(
        connector(config, known_hosts),
        target,
        config.command_timeout(),
    );

    let report =
        workflow::check_device(&mut session, &HealthEvaluator::new(config.health.clone())).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_health(&report);
    }
    Ok(true)
}

async fn cmd_batch(
    config: &DiagConfig,
    known_hosts: Arc<KnownHostsStore>,
    args: BatchArgs,
) -> Result<bool> {
    if config.devices.is_empty() {
        bail!("No devices configured; add a \"devices\" list to the config file");
    }

    let mut sessions = Vec::with_capacity(config.devices.len());
    for entry in &config.devices {
        let auth = entry_auth(entry, args.password.as_deref())?;
        sessions.push(DeviceSession::new(
            connector(config, known_hosts.clone()),
            config.entry_target(entry, auth),
            config.command_timeout(),
        ));
    }
    let evaluator = HealthEvaluator::new(config.health.clone());

    if args.health_only {
        let results = workflow::check_batch(sessions, &evaluator).await;
        let all_ok = results.iter().all(|(_, report)| report.is_some());
        for (device, report) in results {
            match report {
                Some(report) => {
                    println!("{} ({}):", device, report.hostname);
                    print_health(&report);
                }
                None => println!("{}: skipped (connection failed)", device),
            }
        }
        return Ok(all_ok);
    }

    let options = RunOptions {
        format: config.report_format,
        output_dir: args.output_dir.or_else(|| config.output_dir.clone()),
        check_health: true,
        ..Default::default()
    };
    let summary = workflow::run_batch(
        sessions,
        &DiagnosticRunner::new(config),
        &evaluator,
        &options,
    )
    .await;

    for outcome in &summary.outcomes {
        match outcome {
            BatchOutcome::Completed(done) => {
                println!("{} ({}):", done.bundle.device(), done.bundle.hostname());
                for path in &done.reports {
                    println!("  Report saved to: {}", path.display());
                }
                if let Some(health) = &done.health {
                    print_health(health);
                }
            }
            BatchOutcome::Skipped { device } => {
                println!("{}: skipped (connection failed)", device)
            }
            BatchOutcome::Failed { device, error } => println!("{}: {}", device, error),
        }
    }
    Ok(summary.all_completed())
}

async fn cmd_init_config(storage: &ConfigStorage, force: bool) -> Result<bool> {
    if storage.exists().await && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            storage.path().display()
        );
    }
    storage.save(&DiagConfig::default()).await?;
    println!("Wrote default config to {}", storage.path().display());
    Ok(true)
}
