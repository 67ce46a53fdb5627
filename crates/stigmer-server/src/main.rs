//! The stigmer-server binary.
//!
//! Exit codes: 0 normal, 1 fatal config error, 2 failed to acquire the
//! daemon lock, 3 failed to bind the gRPC port.

use clap::Parser;
use stigmer_config::Config;
use stigmer_server::Daemon;
use stigmer_telemetry::{LogConfig, LogFormat, LogTarget, setup_logging};
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "stigmer-server", version, about = "Stigmer control-plane daemon")]
struct Cli {
    /// Emit JSON logs (default: pretty to stderr).
    #[arg(long)]
    json_logs: bool,

    /// Write logs to the configured log directory instead of stderr.
    #[arg(long)]
    log_to_file: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("stigmer-server: {err}");
            std::process::exit(1);
        }
    };

    let mut log_config = LogConfig::new(config.log_level.clone());
    if cli.json_logs {
        log_config = log_config.with_format(LogFormat::Json);
    }
    if cli.log_to_file {
        log_config.target = LogTarget::File(config.log_dir.clone());
    }
    if let Err(err) = setup_logging(&log_config) {
        eprintln!("stigmer-server: logging setup failed: {err}");
        std::process::exit(1);
    }

    let daemon = match Daemon::start(config).await {
        Ok(daemon) => daemon,
        Err(err) => {
            error!(error = %err, "startup failed");
            std::process::exit(err.exit_code());
        }
    };
    info!(addr = %daemon.tcp_addr, "stigmer-server running");

    wait_for_signal().await;
    daemon.shutdown().await;
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        ) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                error!(error = %err, "cannot install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
