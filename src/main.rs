//! debrid-mount entry point

use std::path::PathBuf;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use debrid_mount::config::Config;
use debrid_mount::orchestrator::Orchestrator;
use debrid_mount::organize::scan_roots;
use debrid_mount::supervisor::MountState;

/// Print usage information
fn print_usage() {
    eprintln!("Usage: debrid-mount [config.yaml]");
    eprintln!();
    eprintln!("debrid-mount - Supervised rclone WebDAV mounts for debrid providers");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  config.yaml    Path to configuration file (default: read environment)");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  debrid-mount /etc/debrid-mount/config.yaml");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 2 || args.iter().any(|a| a == "-h" || a == "--help") {
        print_usage();
        std::process::exit(1);
    }

    let config_path = args.get(1).map(PathBuf::from);

    let loaded = match &config_path {
        Some(path) => Config::from_file(path),
        None => Config::from_env(),
    };
    let config = match loaded {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("debrid-mount starting");
    match &config_path {
        Some(path) => info!("Loaded configuration from {:?}", path),
        None => info!("Loaded configuration from environment"),
    }

    let orchestrator = Orchestrator::new(config);
    let mut handles = match orchestrator.run().await {
        Ok(handles) => handles,
        Err(e) => {
            error!("Orchestration failed: {}", e);
            std::process::exit(1);
        }
    };

    let mut running = Vec::new();
    for handle in &mut handles {
        match handle.settled().await {
            MountState::Running { verified, .. } => {
                if verified != Some(true) {
                    warn!(
                        "{} started but its mount point did not verify; see {:?}",
                        handle.target().remote_id,
                        handle.target().log_file
                    );
                }
                running.push(handle.target().provider);
            }
            MountState::Skipped => warn!("{} skipped", handle.target().remote_id),
            MountState::Failed { reason } => {
                error!("{} failed: {}", handle.target().remote_id, reason)
            }
            other => warn!("{} ended in {:?}", handle.target().remote_id, other),
        }
    }

    if running.is_empty() {
        error!("No mounts are running");
        std::process::exit(1);
    }

    info!("{} mount(s) running", running.len());
    for root in scan_roots(&orchestrator.config().mount.base_dir, running) {
        info!("Scan root: {:?}", root);
    }

    // Daemon-mode rclone detaches quickly; surface late failures before exit
    let mut failed = 0;
    for handle in handles {
        let remote = handle.target().remote_id.clone();
        if let MountState::Failed { reason } = handle.finished().await {
            error!("{} failed: {}", remote, reason);
            failed += 1;
        }
    }
    if failed > 0 {
        warn!("{} mount process(es) exited with an error", failed);
    }

    info!("Mount pass complete, exiting");
    Ok(())
}
