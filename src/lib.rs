//! netdiag - diagnostics and health checks for network devices
//!
//! Connects to a device over SSH, runs a batch of show commands, renders the
//! raw outputs into text/JSON reports and derives a quick health verdict from
//! a few targeted probes.

pub mod config;
pub mod diag;
pub mod ssh;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging
///
/// `RUST_LOG` wins when set; otherwise the level follows the number of `-v`
/// flags given on the command line.
pub fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
