//! Tenant concentrator daemon entry point.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use tc_concentrator::{Concentrator, ConcentratorConfig};
use tc_dhcp::DnsmasqLauncher;
use tc_netdev::NetlinkBackend;

#[derive(Parser)]
#[command(name = "concentratord", about = "Tenant concentrator daemon")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "/etc/tenant-concentrator/config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    info!("starting concentratord");

    let config = match ConcentratorConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let backend = match NetlinkBackend::new() {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            error!("failed to open netlink connection: {}", e);
            std::process::exit(1);
        }
    };
    let launcher = Arc::new(DnsmasqLauncher::new(config.dhcp_state_dir.clone()));

    let concentrator = Concentrator::new(config, backend, launcher);
    if let Err(e) = concentrator.init().await {
        error!("initialization failed: {}", e);
        std::process::exit(1);
    }

    info!("concentratord initialized successfully");

    wait_for_shutdown_signal().await;

    info!("shutting down");
    if let Err(e) = concentrator.shutdown().await {
        error!("shutdown finished with errors: {}", e);
        std::process::exit(1);
    }
}

async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!("failed to install SIGTERM handler: {}", e);
            std::process::exit(1);
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}
